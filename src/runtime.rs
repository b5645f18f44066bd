//! The runtime instance: owns every registry, live set and queue, and routes
//! backend events to the component responsible for them.

use tracing::{debug, error, info, trace, warn};

use crate::{
    backend::{Backend, BackendEvent, Seat},
    config::RuntimeConfig,
    cursor::CursorContext,
    disposal::{Disposal, DisposalQueue},
    error::{LifecycleError, Result},
    hotplug::{HotplugCoordinator, HotplugCx, SeatBinding},
    layout::OutputLayout,
    object::{InputDevice, Output, RuntimeId, Surface},
    protocol::{ProtocolGlobal, ShellProtocol, XdgShell},
    readiness::RenderReadiness,
    registry::{NativeHandle, Registry},
    surface::{SurfaceController, SurfaceCx},
    ui::UiLayer,
};

pub struct Runtime<B: Backend> {
    id: RuntimeId,
    config: RuntimeConfig,
    backend: B,
    renderer: Option<B::Renderer>,
    surfaces: Registry<Surface>,
    outputs: Registry<Output>,
    inputs: Registry<InputDevice>,
    xdg_shell: Option<SurfaceController<XdgShell>>,
    hotplug: HotplugCoordinator,
    readiness: RenderReadiness,
    disposal: DisposalQueue,
    ui: Box<dyn UiLayer>,
    faults: Vec<LifecycleError>,
}

impl<B: Backend> Runtime<B> {
    pub fn new(config: RuntimeConfig, backend: B, ui: Box<dyn UiLayer>, seat: Box<dyn Seat>) -> Self {
        let id = RuntimeId::next();
        let cursor = CursorContext::load(&config.cursor.theme, config.cursor.size);
        Self {
            id,
            hotplug: HotplugCoordinator::new(id, seat, cursor),
            config,
            backend,
            renderer: None,
            surfaces: Registry::new("surface"),
            outputs: Registry::new("output"),
            inputs: Registry::new("input device"),
            xdg_shell: None,
            readiness: RenderReadiness::new(),
            disposal: DisposalQueue::new(),
            ui,
            faults: Vec::new(),
        }
    }

    /// Creates the renderer and publishes the shell global.
    ///
    /// Both failures are fatal to startup and are returned as is.
    pub fn start(&mut self) -> Result<()> {
        if self.renderer.is_some() {
            return Ok(());
        }
        info!("🐦 Starting runtime {:?}", self.id);

        let renderer = self.backend.create_renderer().inspect_err(|err| {
            error!("Failed to create renderer: {}", err);
        })?;
        self.renderer = Some(renderer);
        info!("✅ Renderer initialized");

        let global = ProtocolGlobal::<XdgShell>::create(&mut self.backend, self.config.xdg_shell_version)
            .inspect_err(|err| error!("Failed to create {}: {}", XdgShell::INTERFACE_NAME, err))?;
        self.xdg_shell = Some(SurfaceController::new(global, self.id));
        Ok(())
    }

    /// Handles one backend event.
    ///
    /// Transient failures are logged and recorded in [`Runtime::faults`];
    /// anything else is returned and should stop the loop.
    pub fn dispatch(&mut self, event: BackendEvent) -> Result<()> {
        trace!(?event, "dispatch");
        let result = match event {
            BackendEvent::NewSurface { handle, kind } => self.surface_event(
                LifecycleError::BackendUnavailable {
                    interface: XdgShell::INTERFACE_NAME,
                    version: self.config.xdg_shell_version,
                },
                |controller, cx| controller.on_new_surface(cx, handle, kind),
            ),
            BackendEvent::SurfaceDestroying(handle) => self.surface_event(
                LifecycleError::UnknownSurface(handle),
                |controller, cx| controller.on_surface_destroying(cx, handle),
            ),
            BackendEvent::OutputAdded(info) => {
                self.hotplug_event(|hotplug, cx| hotplug.on_output_added(cx, info))
            }
            BackendEvent::OutputRemoved(handle) => {
                self.hotplug_event(|hotplug, cx| hotplug.on_output_removed(cx, handle))
            }
            BackendEvent::OutputFrame(handle) => self.readiness.frame(handle).map(|renderable| {
                if renderable {
                    trace!(%handle, "output renderable");
                }
            }),
            BackendEvent::InputAdded(info) => {
                self.hotplug_event(|hotplug, cx| hotplug.on_input_added(cx, info))
            }
            BackendEvent::InputRemoved(handle) => {
                self.hotplug_event(|hotplug, cx| hotplug.on_input_removed(cx, handle))
            }
        };
        self.absorb(result)
    }

    /// The render window attached a viewport for `output`.
    pub fn viewport_initialized(&mut self, output: NativeHandle) -> Result<()> {
        let result = self
            .readiness
            .viewport_initialized(output, &mut self.backend)
            .map(|_| ());
        self.absorb(result)
    }

    /// Runs the disposals scheduled during this cycle. Call once per loop iteration.
    pub fn end_cycle(&mut self) -> Result<usize> {
        let pending = self.disposal.take()?;
        for disposal in &pending {
            match *disposal {
                Disposal::Surface(handle) => {
                    let surface = self.surfaces.unregister(handle)?;
                    trace!(%handle, kind = surface.kind().as_str(), "surface disposed");
                }
                Disposal::Output(handle) => {
                    let output = self.outputs.unregister(handle)?;
                    trace!(%handle, name = output.name(), "output disposed");
                }
                Disposal::InputDevice(handle) => {
                    let device = self.inputs.unregister(handle)?;
                    trace!(%handle, name = device.name(), "input device disposed");
                }
            }
        }
        Ok(pending.len())
    }

    /// Destroys the shell global, removes every device and output, and runs
    /// the resulting disposals. Returns how many surfaces were torn down.
    pub fn shutdown(&mut self) -> Result<usize> {
        info!("🔽 Shutting down runtime {:?}", self.id);
        let mut removed = 0;
        if let Some(controller) = self.xdg_shell.take() {
            let Self {
                backend,
                surfaces,
                ui,
                disposal,
                ..
            } = self;
            let mut cx = SurfaceCx {
                surfaces,
                ui: ui.as_mut(),
                disposal,
            };
            removed = controller.shutdown(backend, &mut cx)?;
        }
        self.hotplug_event(|hotplug, cx| hotplug.shutdown(cx))?;
        self.end_cycle()?;
        self.renderer = None;
        info!("✅ Runtime shutdown complete");
        Ok(removed)
    }

    fn surface_event(
        &mut self,
        missing: LifecycleError,
        f: impl FnOnce(&mut SurfaceController<XdgShell>, &mut SurfaceCx<'_>) -> Result<()>,
    ) -> Result<()> {
        let Self {
            xdg_shell,
            surfaces,
            ui,
            disposal,
            ..
        } = self;
        let Some(controller) = xdg_shell.as_mut() else {
            return Err(missing);
        };
        let mut cx = SurfaceCx {
            surfaces,
            ui: ui.as_mut(),
            disposal,
        };
        f(controller, &mut cx)
    }

    fn hotplug_event(
        &mut self,
        f: impl FnOnce(&mut HotplugCoordinator, &mut HotplugCx<'_>) -> Result<()>,
    ) -> Result<()> {
        let Self {
            hotplug,
            outputs,
            inputs,
            readiness,
            backend,
            ui,
            disposal,
            ..
        } = self;
        let mut cx = HotplugCx {
            outputs,
            inputs,
            readiness,
            control: &*backend,
            ui: ui.as_mut(),
            disposal,
        };
        f(hotplug, &mut cx)
    }

    fn absorb(&mut self, result: Result<()>) -> Result<()> {
        match result {
            Err(err) if !err.is_fatal() => {
                warn!("⚠️ {}", err);
                self.faults.push(err);
                Ok(())
            }
            Err(err) => {
                error!("❌ {}", err);
                Err(err)
            }
            Ok(()) => Ok(()),
        }
    }

    pub fn id(&self) -> RuntimeId {
        self.id
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn renderer(&self) -> Option<&B::Renderer> {
        self.renderer.as_ref()
    }

    pub fn renderer_mut(&mut self) -> Option<&mut B::Renderer> {
        self.renderer.as_mut()
    }

    pub fn surfaces(&self) -> &Registry<Surface> {
        &self.surfaces
    }

    pub fn outputs(&self) -> &Registry<Output> {
        &self.outputs
    }

    pub fn inputs(&self) -> &Registry<InputDevice> {
        &self.inputs
    }

    pub fn xdg_shell(&self) -> Option<&SurfaceController<XdgShell>> {
        self.xdg_shell.as_ref()
    }

    /// Live xdg surfaces in creation order.
    pub fn live_surfaces(&self) -> &[NativeHandle] {
        self.xdg_shell
            .as_ref()
            .map(SurfaceController::live_surfaces)
            .unwrap_or(&[])
    }

    pub fn live_outputs(&self) -> &[NativeHandle] {
        self.hotplug.live_outputs()
    }

    pub fn live_inputs(&self) -> &[NativeHandle] {
        self.hotplug.live_inputs()
    }

    pub fn readiness(&self) -> &RenderReadiness {
        &self.readiness
    }

    pub fn renderable_outputs(&self) -> Vec<NativeHandle> {
        self.readiness.renderable_outputs()
    }

    pub fn layout(&self) -> &OutputLayout {
        self.hotplug.layout()
    }

    pub fn seat(&self) -> &SeatBinding {
        self.hotplug.seat()
    }

    pub fn pending_disposals(&self) -> usize {
        self.disposal.len()
    }

    /// Transient failures recorded so far, oldest first.
    pub fn faults(&self) -> &[LifecycleError] {
        &self.faults
    }

    pub fn is_started(&self) -> bool {
        self.renderer.is_some()
    }
}

impl<B: Backend> Drop for Runtime<B> {
    fn drop(&mut self) {
        if !self.surfaces.is_empty() || !self.outputs.is_empty() || !self.inputs.is_empty() {
            debug!(
                surfaces = self.surfaces.len(),
                outputs = self.outputs.len(),
                inputs = self.inputs.len(),
                "runtime dropped with live wrappers"
            );
        }
    }
}
