//! Logical wrappers the runtime keeps for backend objects.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicU32, Ordering},
};

use crate::{backend::GlobalId, registry::NativeHandle};

/// Identity of one runtime instance.
///
/// Wrappers carry it instead of a reference back to the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuntimeId(u32);

impl RuntimeId {
    pub fn next() -> Self {
        static NEXT: AtomicU32 = AtomicU32::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceKind {
    Toplevel,
    Popup,
}

impl SurfaceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SurfaceKind::Toplevel => "toplevel",
            SurfaceKind::Popup => "popup",
        }
    }
}

/// Fires once, when the backend says the surface is going away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DestroyWatch {
    pub(crate) global: GlobalId,
}

/// A client shell surface.
#[derive(Debug)]
pub struct Surface {
    handle: NativeHandle,
    kind: SurfaceKind,
    interface: &'static str,
    runtime: RuntimeId,
    destroy_watch: Option<DestroyWatch>,
}

impl Surface {
    pub(crate) fn new(
        handle: NativeHandle,
        kind: SurfaceKind,
        interface: &'static str,
        runtime: RuntimeId,
    ) -> Self {
        Self {
            handle,
            kind,
            interface,
            runtime,
            destroy_watch: None,
        }
    }

    pub fn handle(&self) -> NativeHandle {
        self.handle
    }

    pub fn kind(&self) -> SurfaceKind {
        self.kind
    }

    pub fn is_popup(&self) -> bool {
        self.kind == SurfaceKind::Popup
    }

    /// Interface name of the protocol global that created this surface.
    pub fn interface(&self) -> &'static str {
        self.interface
    }

    pub fn runtime(&self) -> RuntimeId {
        self.runtime
    }

    /// Whether the destroy watch has not fired yet.
    pub fn is_watched(&self) -> bool {
        self.destroy_watch.is_some()
    }

    pub(crate) fn arm_destroy_watch(&mut self, global: GlobalId) {
        self.destroy_watch = Some(DestroyWatch { global });
    }

    pub(crate) fn take_destroy_watch(&mut self) -> Option<DestroyWatch> {
        self.destroy_watch.take()
    }
}

/// Display mode. `refresh` is in millihertz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Mode {
    pub width: i32,
    pub height: i32,
    pub refresh: i32,
}

impl Mode {
    pub const fn new(width: i32, height: i32, refresh: i32) -> Self {
        Self {
            width,
            height,
            refresh,
        }
    }
}

/// What the backend tells us about a freshly attached output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputInfo {
    pub handle: NativeHandle,
    pub name: String,
    pub make: String,
    pub model: String,
}

impl OutputInfo {
    pub fn new(handle: NativeHandle, name: impl Into<String>) -> Self {
        Self {
            handle,
            name: name.into(),
            make: "Nuthatch".into(),
            model: "Unknown".into(),
        }
    }
}

#[derive(Debug)]
pub struct Output {
    handle: NativeHandle,
    name: String,
    make: String,
    model: String,
    runtime: RuntimeId,
}

impl Output {
    pub(crate) fn new(info: OutputInfo, runtime: RuntimeId) -> Self {
        Self {
            handle: info.handle,
            name: info.name,
            make: info.make,
            model: info.model,
            runtime,
        }
    }

    pub fn handle(&self) -> NativeHandle {
        self.handle
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn make(&self) -> &str {
        &self.make
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn runtime(&self) -> RuntimeId {
        self.runtime
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceCapability {
    Keyboard,
    Pointer,
    Touch,
    TabletTool,
    TabletPad,
    Gesture,
    Switch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputInfo {
    pub handle: NativeHandle,
    pub name: String,
    pub capabilities: Vec<DeviceCapability>,
}

impl InputInfo {
    pub fn new(
        handle: NativeHandle,
        name: impl Into<String>,
        capabilities: impl IntoIterator<Item = DeviceCapability>,
    ) -> Self {
        Self {
            handle,
            name: name.into(),
            capabilities: capabilities.into_iter().collect(),
        }
    }
}

#[derive(Debug)]
pub struct InputDevice {
    handle: NativeHandle,
    name: String,
    capabilities: Vec<DeviceCapability>,
    runtime: RuntimeId,
}

impl InputDevice {
    pub(crate) fn new(info: InputInfo, runtime: RuntimeId) -> Self {
        Self {
            handle: info.handle,
            name: info.name,
            capabilities: info.capabilities,
            runtime,
        }
    }

    pub fn handle(&self) -> NativeHandle {
        self.handle
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capabilities(&self) -> &[DeviceCapability] {
        &self.capabilities
    }

    pub fn has_capability(&self, capability: DeviceCapability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn runtime(&self) -> RuntimeId {
        self.runtime
    }
}

/// How many attached devices provide each capability.
///
/// A seat keeps a capability while at least one attached device still has it.
#[derive(Debug, Default, Clone)]
pub struct CapabilityCounts {
    counts: HashMap<DeviceCapability, usize>,
}

impl CapabilityCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the capabilities the device brings in for the first time.
    pub fn acquire(&mut self, device: &InputDevice) -> Vec<DeviceCapability> {
        let mut gained = Vec::new();
        for capability in device.capabilities() {
            let count = self.counts.entry(*capability).or_default();
            *count += 1;
            if *count == 1 {
                gained.push(*capability);
            }
        }
        gained
    }

    /// Returns the capabilities no remaining device provides.
    pub fn release(&mut self, device: &InputDevice) -> Vec<DeviceCapability> {
        let mut lost = Vec::new();
        for capability in device.capabilities() {
            let Some(count) = self.counts.get_mut(capability) else {
                continue;
            };
            *count -= 1;
            if *count == 0 {
                self.counts.remove(capability);
                lost.push(*capability);
            }
        }
        lost
    }

    pub fn provides(&self, capability: DeviceCapability) -> bool {
        self.counts.contains_key(&capability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(raw: u64, capabilities: &[DeviceCapability]) -> InputDevice {
        InputDevice::new(
            InputInfo::new(NativeHandle::from_raw(raw), "dev", capabilities.iter().copied()),
            RuntimeId::next(),
        )
    }

    #[test]
    fn capability_stays_while_another_device_provides_it() {
        let laptop_kbd = device(1, &[DeviceCapability::Keyboard]);
        let usb_kbd = device(2, &[DeviceCapability::Keyboard, DeviceCapability::Pointer]);
        let mut counts = CapabilityCounts::new();

        assert_eq!(counts.acquire(&laptop_kbd), vec![DeviceCapability::Keyboard]);
        assert_eq!(counts.acquire(&usb_kbd), vec![DeviceCapability::Pointer]);

        assert_eq!(counts.release(&laptop_kbd), vec![]);
        assert!(counts.provides(DeviceCapability::Keyboard));
        assert_eq!(
            counts.release(&usb_kbd),
            vec![DeviceCapability::Keyboard, DeviceCapability::Pointer]
        );
        assert!(!counts.provides(DeviceCapability::Keyboard));
    }
}
