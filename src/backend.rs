//! The seams between the runtime and the things it coordinates.
//!
//! A backend (headless, winit, ...) implements [`DisplayContext`],
//! [`OutputControl`] and [`RendererFactory`] and feeds [`BackendEvent`]s into
//! the runtime. The seat is handed in separately.

use std::fmt;

use crate::{
    error::{Result, SeatFault},
    object::{InputDevice, InputInfo, Mode, OutputInfo, SurfaceKind},
    registry::NativeHandle,
};

/// A protocol global published on the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GlobalId(u32);

impl GlobalId {
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn as_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for GlobalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "global#{}", self.0)
    }
}

/// Notifications the backend emits on the loop thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    NewSurface {
        handle: NativeHandle,
        kind: SurfaceKind,
    },
    /// The surface is about to be destroyed; the handle is still valid.
    SurfaceDestroying(NativeHandle),
    OutputAdded(OutputInfo),
    OutputRemoved(NativeHandle),
    /// The output is ready for a new frame.
    OutputFrame(NativeHandle),
    InputAdded(InputInfo),
    InputRemoved(NativeHandle),
}

pub trait DisplayContext {
    /// Fails with `BackendUnavailable` when the display cannot allocate it.
    fn register_global(&mut self, interface: &'static str, version: u32) -> Result<GlobalId>;

    fn remove_global(&mut self, global: GlobalId);
}

/// Mode and enablement state of the backend's outputs.
///
/// `set_mode` and `set_enabled` only stage state; `commit` applies it.
pub trait OutputControl {
    fn current_mode(&self, output: NativeHandle) -> Option<Mode>;

    fn preferred_mode(&self, output: NativeHandle) -> Option<Mode>;

    fn set_mode(&mut self, output: NativeHandle, mode: Mode);

    fn set_enabled(&mut self, output: NativeHandle, enabled: bool);

    /// Returns `false` when the backend rejected the staged state.
    fn commit(&mut self, output: NativeHandle) -> bool;
}

pub trait RendererFactory {
    type Renderer;

    /// Called once at startup. Failure is fatal.
    fn create_renderer(&mut self) -> Result<Self::Renderer>;
}

/// Everything the runtime needs from a backend.
pub trait Backend: DisplayContext + OutputControl + RendererFactory {}

impl<T: DisplayContext + OutputControl + RendererFactory> Backend for T {}

/// The single active seat.
pub trait Seat {
    fn name(&self) -> &str;

    /// A refusal leaves the device detached.
    fn attach_input_device(&mut self, device: &InputDevice) -> Result<(), SeatFault>;

    fn detach_input_device(&mut self, device: &InputDevice);
}
