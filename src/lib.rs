//! Protocol-object lifecycle for the Nuthatch compositor.
//!
//! The [`Runtime`] sits between a display backend and a UI layer. It owns one
//! wrapper per backend object (shell surfaces, outputs, input devices), keeps
//! the live set of each kind in creation order, tells the UI layer about every
//! addition and removal, and disposes of wrappers only at the end of the loop
//! iteration that removed them.
//!
//! [`headless`] provides an in-memory backend. With the `winit` feature the
//! same runtime runs as a nested smithay compositor.

pub mod backend;
pub mod config;
pub mod cursor;
pub mod disposal;
pub mod error;
pub mod headless;
pub mod hotplug;
pub mod layout;
pub mod object;
pub mod protocol;
pub mod readiness;
pub mod registry;
pub mod runtime;
pub mod surface;
pub mod ui;

#[cfg(feature = "winit")]
pub mod state;
#[cfg(feature = "winit")]
pub mod winit;

pub use backend::{Backend, BackendEvent, DisplayContext, GlobalId, OutputControl, RendererFactory, Seat};
pub use config::{BackendKind, RuntimeConfig};
pub use error::{ErrorCategory, LifecycleError, Result, SeatFault};
pub use object::{InputDevice, Mode, Output, Surface, SurfaceKind};
pub use registry::{NativeHandle, Registry};
pub use runtime::Runtime;
pub use ui::{InitProperties, PropertyValue, UiLayer};
