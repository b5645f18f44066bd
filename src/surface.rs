//! Surface lifecycle controller.
//!
//! Drives every shell surface through observed → live → destroying →
//! destroyed:
//!
//! - on "new surface" a wrapper is registered, its destroy watch armed, and it
//!   is appended to the global's live set before `surface_added` goes out;
//! - on "destroying" it leaves the live set, `surface_removed` goes out, and
//!   only then is it queued for disposal at the end of the cycle.

use tracing::debug;

use crate::{
    backend::DisplayContext,
    disposal::{Disposal, DisposalQueue},
    error::{LifecycleError, Result},
    object::{RuntimeId, Surface, SurfaceKind},
    protocol::{ProtocolGlobal, ShellProtocol},
    registry::{NativeHandle, Registry},
    ui::{InitProperties, PropertyValue, UiLayer},
};

/// What a controller needs to touch while handling one event.
pub struct SurfaceCx<'a> {
    pub surfaces: &'a mut Registry<Surface>,
    pub ui: &'a mut dyn UiLayer,
    pub disposal: &'a mut DisposalQueue,
}

#[derive(Debug)]
pub struct SurfaceController<P> {
    global: ProtocolGlobal<P>,
    runtime: RuntimeId,
}

impl<P: ShellProtocol> SurfaceController<P> {
    pub fn new(global: ProtocolGlobal<P>, runtime: RuntimeId) -> Self {
        Self { global, runtime }
    }

    pub fn global(&self) -> &ProtocolGlobal<P> {
        &self.global
    }

    pub fn live_surfaces(&self) -> &[NativeHandle] {
        self.global.live_surfaces()
    }

    pub fn on_new_surface(
        &mut self,
        cx: &mut SurfaceCx<'_>,
        handle: NativeHandle,
        kind: SurfaceKind,
    ) -> Result<()> {
        let wrapper = Surface::new(handle, kind, P::INTERFACE_NAME, self.runtime);
        let surface = cx.surfaces.register(handle, wrapper)?;
        surface.arm_destroy_watch(self.global.global());
        self.global.live_mut().insert(handle)?;

        debug!(%handle, kind = kind.as_str(), interface = P::INTERFACE_NAME, "🪟 surface added");
        let properties = surface_properties(surface);
        cx.ui.surface_added(surface, &properties);
        Ok(())
    }

    pub fn on_surface_destroying(
        &mut self,
        cx: &mut SurfaceCx<'_>,
        handle: NativeHandle,
    ) -> Result<()> {
        let surface = cx
            .surfaces
            .lookup_mut(handle)
            .ok_or(LifecycleError::UnknownSurface(handle))?;
        self.global.live_mut().remove(handle)?;

        // A watch bound to another global means the event was routed here by mistake.
        match surface.take_destroy_watch() {
            Some(watch) if watch.global == self.global.global() => {}
            _ => return Err(LifecycleError::NotLive(handle)),
        }

        debug!(%handle, interface = P::INTERFACE_NAME, "surface removed");
        cx.ui.surface_removed(surface);
        cx.disposal.schedule(Disposal::Surface(handle))
    }

    /// Destroys the protocol global, tearing down every surface still live.
    pub fn shutdown(self, display: &mut dyn DisplayContext, cx: &mut SurfaceCx<'_>) -> Result<usize> {
        self.global.destroy(display, cx.surfaces, cx.ui, cx.disposal)
    }
}

fn surface_properties(surface: &Surface) -> InitProperties {
    InitProperties::new()
        .with("type", PropertyValue::Text(surface.kind().as_str().into()))
        .with("surface", PropertyValue::Handle(surface.handle()))
        .with("interface", PropertyValue::Text(surface.interface().into()))
}
