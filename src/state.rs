//! Smithay state for the nested (winit) compositor.
//!
//! Smithay owns the protocol objects; this module maps them onto native
//! handles, forwards their lifecycle to the [`Runtime`], and applies what the
//! runtime tells the UI layer to the desktop [`Space`].

use std::{cell::RefCell, collections::HashMap, rc::Rc, time::Instant};

use smithay::{
    backend::{
        renderer::{gles::GlesRenderer, utils::on_commit_buffer_handler},
        winit::WinitGraphicsBackend,
    },
    delegate_compositor, delegate_data_device, delegate_output, delegate_seat, delegate_shm,
    delegate_xdg_shell,
    desktop::{Space, Window},
    input::{SeatHandler, SeatState, keyboard::XkbConfig, pointer::CursorImageStatus},
    output::Output as SmithayOutput,
    reexports::{
        calloop::{EventLoop, LoopSignal},
        wayland_server::{
            Client, Display, DisplayHandle, Resource,
            backend::{ClientData, ClientId, DisconnectReason, GlobalId as WlGlobalId, ObjectId},
            protocol::{wl_buffer::WlBuffer, wl_seat::WlSeat, wl_surface::WlSurface},
        },
    },
    utils::{Clock, Monotonic, Physical, Serial, Size},
    wayland::{
        buffer::BufferHandler,
        compositor::{CompositorClientState, CompositorHandler, CompositorState},
        output::{OutputHandler, OutputManagerState},
        selection::{
            SelectionHandler,
            data_device::{ClientDndGrabHandler, DataDeviceHandler, DataDeviceState, ServerDndGrabHandler},
        },
        shell::xdg::{PopupSurface, PositionerState, ToplevelSurface, XdgShellHandler, XdgShellState},
        shm::{ShmHandler, ShmState},
    },
};
use tracing::{debug, error, info, trace, warn};

use crate::{
    backend::{BackendEvent, DisplayContext, GlobalId, OutputControl, RendererFactory, Seat},
    config::RuntimeConfig,
    error::{LifecycleError, Result, SeatFault},
    layout::OutputLayout,
    object::{CapabilityCounts, DeviceCapability, InputDevice, Mode, Output, Surface, SurfaceKind},
    protocol::{ShellProtocol, XdgShell},
    registry::NativeHandle,
    runtime::Runtime,
    ui::{InitProperties, UiLayer},
};

/// Assigns native handles to smithay protocol objects.
#[derive(Debug, Default)]
pub struct HandleTable {
    next: u64,
    by_object: HashMap<ObjectId, NativeHandle>,
}

impl HandleTable {
    /// A handle for something that is not a protocol object (outputs, devices).
    pub fn allocate(&mut self) -> NativeHandle {
        self.next += 1;
        NativeHandle::from_raw(self.next)
    }

    pub fn insert(&mut self, object: ObjectId) -> NativeHandle {
        let handle = self.allocate();
        self.by_object.insert(object, handle);
        handle
    }

    pub fn remove(&mut self, object: &ObjectId) -> Option<NativeHandle> {
        self.by_object.remove(object)
    }
}

struct WinitOutput {
    output: SmithayOutput,
    global: WlGlobalId,
    enabled: bool,
    pending_mode: Option<Mode>,
    pending_enabled: Option<bool>,
}

/// The winit window as a runtime backend.
pub struct WinitBackend {
    dh: DisplayHandle,
    next_global: u32,
    available: HashMap<&'static str, WlGlobalId>,
    published: HashMap<GlobalId, WlGlobalId>,
    outputs: HashMap<NativeHandle, WinitOutput>,
    graphics: Option<WinitGraphicsBackend<GlesRenderer>>,
}

impl WinitBackend {
    fn new(dh: DisplayHandle, xdg_global: WlGlobalId, graphics: WinitGraphicsBackend<GlesRenderer>) -> Self {
        Self {
            dh,
            next_global: 1,
            available: HashMap::from([(XdgShell::INTERFACE_NAME, xdg_global)]),
            published: HashMap::new(),
            outputs: HashMap::new(),
            graphics: Some(graphics),
        }
    }

    pub fn add_output(&mut self, handle: NativeHandle, output: SmithayOutput, preferred: Mode) {
        let global = output.create_global::<NuthatchState>(&self.dh);
        output.set_preferred(to_smithay_mode(preferred));
        self.outputs.insert(
            handle,
            WinitOutput {
                output,
                global,
                enabled: false,
                pending_mode: None,
                pending_enabled: None,
            },
        );
    }

    pub fn remove_output(&mut self, handle: NativeHandle) {
        if let Some(entry) = self.outputs.remove(&handle) {
            self.dh.remove_global::<NuthatchState>(entry.global);
        }
    }

    pub fn output(&self, handle: NativeHandle) -> Option<&SmithayOutput> {
        self.outputs.get(&handle).map(|entry| &entry.output)
    }

    pub fn resize(&mut self, handle: NativeHandle, size: Size<i32, Physical>) {
        if let Some(entry) = self.outputs.get(&handle) {
            let mode = smithay::output::Mode { size, refresh: 60_000 };
            entry.output.change_current_state(Some(mode), None, None, None);
            entry.output.set_preferred(mode);
        }
    }
}

fn to_smithay_mode(mode: Mode) -> smithay::output::Mode {
    smithay::output::Mode {
        size: (mode.width, mode.height).into(),
        refresh: mode.refresh,
    }
}

fn from_smithay_mode(mode: smithay::output::Mode) -> Mode {
    Mode::new(mode.size.w, mode.size.h, mode.refresh)
}

impl DisplayContext for WinitBackend {
    fn register_global(&mut self, interface: &'static str, version: u32) -> Result<GlobalId> {
        let wl_global = self
            .available
            .remove(interface)
            .ok_or(LifecycleError::BackendUnavailable { interface, version })?;
        let id = GlobalId::from_raw(self.next_global);
        self.next_global += 1;
        self.published.insert(id, wl_global);
        Ok(id)
    }

    fn remove_global(&mut self, global: GlobalId) {
        if let Some(wl_global) = self.published.remove(&global) {
            self.dh.remove_global::<NuthatchState>(wl_global);
        }
    }
}

impl OutputControl for WinitBackend {
    fn current_mode(&self, output: NativeHandle) -> Option<Mode> {
        self.outputs
            .get(&output)
            .and_then(|entry| entry.output.current_mode())
            .map(from_smithay_mode)
    }

    fn preferred_mode(&self, output: NativeHandle) -> Option<Mode> {
        self.outputs
            .get(&output)
            .and_then(|entry| entry.output.preferred_mode())
            .map(from_smithay_mode)
    }

    fn set_mode(&mut self, output: NativeHandle, mode: Mode) {
        if let Some(entry) = self.outputs.get_mut(&output) {
            entry.pending_mode = Some(mode);
        }
    }

    fn set_enabled(&mut self, output: NativeHandle, enabled: bool) {
        if let Some(entry) = self.outputs.get_mut(&output) {
            entry.pending_enabled = Some(enabled);
        }
    }

    fn commit(&mut self, output: NativeHandle) -> bool {
        let Some(entry) = self.outputs.get_mut(&output) else {
            return false;
        };
        let enabled = entry.pending_enabled.take().unwrap_or(entry.enabled);
        let mode = entry.pending_mode.take();
        if enabled && mode.is_none() && entry.output.current_mode().is_none() {
            return false;
        }
        if let Some(mode) = mode {
            entry
                .output
                .change_current_state(Some(to_smithay_mode(mode)), None, None, Some((0, 0).into()));
        }
        entry.enabled = enabled;
        true
    }
}

impl RendererFactory for WinitBackend {
    type Renderer = WinitGraphicsBackend<GlesRenderer>;

    fn create_renderer(&mut self) -> Result<Self::Renderer> {
        self.graphics
            .take()
            .ok_or_else(|| LifecycleError::RendererUnavailable("winit graphics already in use".into()))
    }
}

/// The smithay seat. Devices map onto its keyboard, pointer and touch capabilities.
struct WaylandSeat {
    seat: smithay::input::Seat<NuthatchState>,
    name: String,
    capabilities: CapabilityCounts,
}

impl Seat for WaylandSeat {
    fn name(&self) -> &str {
        &self.name
    }

    fn attach_input_device(&mut self, device: &InputDevice) -> Result<(), SeatFault> {
        // The keymap is the only part that can fail, so it goes first.
        if device.has_capability(DeviceCapability::Keyboard) && self.seat.get_keyboard().is_none() {
            self.seat
                .add_keyboard(XkbConfig::default(), 200, 25)
                .map_err(|err| {
                    error!("Failed to add keyboard to {}: {}", self.name, err);
                    SeatFault::Refused(err.to_string())
                })?;
        }
        for capability in self.capabilities.acquire(device) {
            match capability {
                DeviceCapability::Pointer if self.seat.get_pointer().is_none() => {
                    self.seat.add_pointer();
                }
                DeviceCapability::Touch if self.seat.get_touch().is_none() => {
                    self.seat.add_touch();
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn detach_input_device(&mut self, device: &InputDevice) {
        for capability in self.capabilities.release(device) {
            match capability {
                DeviceCapability::Keyboard => self.seat.remove_keyboard(),
                DeviceCapability::Pointer => self.seat.remove_pointer(),
                DeviceCapability::Touch => self.seat.remove_touch(),
                _ => {}
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum SceneChange {
    MapWindow(NativeHandle),
    UnmapWindow(NativeHandle),
    MapOutput { output: NativeHandle, x: i32, y: i32 },
    UnmapOutput(NativeHandle),
}

/// Records what the runtime asked for; the state applies it to the space.
struct SceneUi {
    changes: Rc<RefCell<Vec<SceneChange>>>,
}

impl UiLayer for SceneUi {
    fn surface_added(&mut self, surface: &Surface, _properties: &InitProperties) {
        if !surface.is_popup() {
            self.changes
                .borrow_mut()
                .push(SceneChange::MapWindow(surface.handle()));
        }
    }

    fn surface_removed(&mut self, surface: &Surface) {
        self.changes
            .borrow_mut()
            .push(SceneChange::UnmapWindow(surface.handle()));
    }

    fn output_added(&mut self, output: &Output, layout: &OutputLayout, _: &InitProperties) {
        let (x, y) = layout
            .placement(output.handle())
            .map(|placement| (placement.x, placement.y))
            .unwrap_or_default();
        self.changes.borrow_mut().push(SceneChange::MapOutput {
            output: output.handle(),
            x,
            y,
        });
    }

    fn output_removed(&mut self, output: &Output) {
        self.changes
            .borrow_mut()
            .push(SceneChange::UnmapOutput(output.handle()));
    }
}

pub struct NuthatchState {
    pub start_time: Instant,
    pub display_handle: DisplayHandle,
    pub loop_signal: LoopSignal,
    pub space: Space<Window>,
    pub clock: Clock<Monotonic>,
    pub compositor_state: CompositorState,
    pub xdg_shell_state: XdgShellState,
    pub shm_state: ShmState,
    pub output_manager_state: OutputManagerState,
    pub seat_state: SeatState<Self>,
    pub data_device_state: DataDeviceState,
    pub runtime: Runtime<WinitBackend>,
    pub handles: HandleTable,
    /// First fatal runtime error; the loop stops when it is set.
    pub fatal: Option<LifecycleError>,
    windows: HashMap<NativeHandle, Window>,
    scene: Rc<RefCell<Vec<SceneChange>>>,
}

impl NuthatchState {
    pub fn new(
        display: &mut Display<Self>,
        event_loop: &EventLoop<'static, Self>,
        config: RuntimeConfig,
        graphics: WinitGraphicsBackend<GlesRenderer>,
    ) -> Self {
        let dh = display.handle();
        let clock = Clock::<Monotonic>::new();
        let start_time = Instant::now();

        // Initialize Wayland protocols
        let compositor_state = CompositorState::new::<Self>(&dh);
        let xdg_shell_state = XdgShellState::new::<Self>(&dh);
        let shm_state = ShmState::new::<Self>(&dh, vec![]);
        let output_manager_state = OutputManagerState::new_with_xdg_output::<Self>(&dh);
        let mut seat_state = SeatState::new();
        let data_device_state = DataDeviceState::new::<Self>(&dh);

        // Capabilities are added as the runtime attaches devices
        let seat = seat_state.new_wl_seat(&dh, config.seat_name.clone());
        let wayland_seat = WaylandSeat {
            seat,
            name: config.seat_name.clone(),
            capabilities: CapabilityCounts::new(),
        };

        let scene = Rc::new(RefCell::new(Vec::new()));
        let ui = SceneUi {
            changes: scene.clone(),
        };
        let backend = WinitBackend::new(dh.clone(), xdg_shell_state.global(), graphics);
        let runtime = Runtime::new(config, backend, Box::new(ui), Box::new(wayland_seat));

        Self {
            start_time,
            display_handle: dh,
            loop_signal: event_loop.get_signal(),
            space: Space::default(),
            clock,
            compositor_state,
            xdg_shell_state,
            shm_state,
            output_manager_state,
            seat_state,
            data_device_state,
            runtime,
            handles: HandleTable::default(),
            fatal: None,
            windows: HashMap::new(),
            scene,
        }
    }

    /// Feeds one event to the runtime and applies the resulting scene changes.
    pub fn dispatch(&mut self, event: BackendEvent) {
        let result = self.runtime.dispatch(event);
        self.fail_on(result);
        self.apply_scene();
    }

    pub fn viewport_initialized(&mut self, output: NativeHandle) {
        let result = self.runtime.viewport_initialized(output);
        self.fail_on(result);
    }

    /// Per-iteration tail: run pending disposals.
    pub fn end_cycle(&mut self) {
        let result = self.runtime.end_cycle().map(|disposed| {
            if disposed > 0 {
                trace!(disposed, "disposed wrappers");
            }
        });
        self.fail_on(result);
    }

    /// Handles a redraw request for `output`; draws only once it is renderable.
    pub fn redraw(&mut self, output: NativeHandle) {
        self.dispatch(BackendEvent::OutputFrame(output));
        let renderable = self.runtime.readiness().is_renderable(output);
        let Some(graphics) = self.runtime.renderer_mut() else {
            return;
        };
        if renderable {
            if let Err(err) = graphics.bind() {
                warn!("Failed to bind winit surface: {}", err);
                return;
            }
            if let Err(err) = graphics.submit(None) {
                warn!("Failed to submit frame: {}", err);
            }
        }
        graphics.window().request_redraw();
    }

    /// Tears the runtime down, then the globals that still belong to outputs.
    pub fn shutdown(&mut self) -> Result<()> {
        let removed = self.runtime.shutdown()?;
        self.apply_scene();
        debug!(removed, "xdg surfaces removed at shutdown");
        Ok(())
    }

    fn fail_on(&mut self, result: Result<()>) {
        if let Err(err) = result {
            error!("Stopping compositor: {}", err);
            self.fatal.get_or_insert(err);
            self.loop_signal.stop();
        }
    }

    fn apply_scene(&mut self) {
        let changes = std::mem::take(&mut *self.scene.borrow_mut());
        for change in changes {
            match change {
                SceneChange::MapWindow(handle) => {
                    if let Some(window) = self.windows.get(&handle) {
                        self.space.map_element(window.clone(), (0, 0), false);
                    }
                }
                SceneChange::UnmapWindow(handle) => {
                    if let Some(window) = self.windows.remove(&handle) {
                        self.space.unmap_elem(&window);
                    }
                }
                SceneChange::MapOutput { output, x, y } => {
                    if let Some(output) = self.runtime.backend().output(output) {
                        self.space.map_output(output, (x, y));
                    }
                }
                SceneChange::UnmapOutput(handle) => {
                    if let Some(output) = self.runtime.backend().output(handle).cloned() {
                        self.space.unmap_output(&output);
                    }
                    self.runtime.backend_mut().remove_output(handle);
                }
            }
        }
    }

    fn surface_destroyed(&mut self, surface: &WlSurface) {
        match self.handles.remove(&surface.id()) {
            Some(handle) => self.dispatch(BackendEvent::SurfaceDestroying(handle)),
            None => warn!("Destroyed surface {:?} was never announced", surface.id()),
        }
    }
}

// Compositor handler
impl CompositorHandler for NuthatchState {
    fn compositor_state(&mut self) -> &mut CompositorState {
        &mut self.compositor_state
    }

    fn client_compositor_state<'a>(&self, client: &'a Client) -> &'a CompositorClientState {
        match client.get_data::<ClientState>() {
            Some(state) => &state.compositor_state,
            None => panic!("client {:?} was inserted without ClientState", client.id()),
        }
    }

    fn commit(&mut self, surface: &WlSurface) {
        trace!("Surface committed: {:?}", surface);
        on_commit_buffer_handler::<Self>(surface);

        let window = self
            .windows
            .values()
            .find(|window| window.toplevel().is_some_and(|toplevel| toplevel.wl_surface() == surface));
        if let Some(window) = window {
            window.on_commit();
            if let Some(toplevel) = window.toplevel() {
                if !toplevel.is_initial_configure_sent() {
                    toplevel.send_configure();
                }
            }
        }
    }
}

// XDG Shell handler
impl XdgShellHandler for NuthatchState {
    fn xdg_shell_state(&mut self) -> &mut XdgShellState {
        &mut self.xdg_shell_state
    }

    fn new_toplevel(&mut self, surface: ToplevelSurface) {
        info!("🪟 New window created");
        let handle = self.handles.insert(surface.wl_surface().id());
        self.windows
            .insert(handle, Window::new_wayland_window(surface));
        self.dispatch(BackendEvent::NewSurface {
            handle,
            kind: SurfaceKind::Toplevel,
        });
    }

    fn new_popup(&mut self, surface: PopupSurface, _positioner: PositionerState) {
        trace!("New popup created");
        let handle = self.handles.insert(surface.wl_surface().id());
        self.dispatch(BackendEvent::NewSurface {
            handle,
            kind: SurfaceKind::Popup,
        });
    }

    fn toplevel_destroyed(&mut self, surface: ToplevelSurface) {
        self.surface_destroyed(surface.wl_surface());
    }

    fn popup_destroyed(&mut self, surface: PopupSurface) {
        self.surface_destroyed(surface.wl_surface());
    }

    fn grab(&mut self, _surface: PopupSurface, _seat: WlSeat, _serial: Serial) {}

    fn reposition_request(&mut self, _surface: PopupSurface, _positioner: PositionerState, _token: u32) {}
}

// SHM handler
impl ShmHandler for NuthatchState {
    fn shm_state(&self) -> &ShmState {
        &self.shm_state
    }
}

// Seat handler
impl SeatHandler for NuthatchState {
    type KeyboardFocus = WlSurface;
    type PointerFocus = WlSurface;
    type TouchFocus = WlSurface;

    fn seat_state(&mut self) -> &mut SeatState<Self> {
        &mut self.seat_state
    }

    fn focus_changed(&mut self, _seat: &smithay::input::Seat<Self>, focused: Option<&WlSurface>) {
        trace!("Focus changed: {:?}", focused);
    }

    fn cursor_image(&mut self, _seat: &smithay::input::Seat<Self>, _image: CursorImageStatus) {}
}

// Data device handler
impl DataDeviceHandler for NuthatchState {
    fn data_device_state(&self) -> &DataDeviceState {
        &self.data_device_state
    }
}

impl SelectionHandler for NuthatchState {
    type SelectionUserData = ();
}

impl ClientDndGrabHandler for NuthatchState {}
impl ServerDndGrabHandler for NuthatchState {}

impl BufferHandler for NuthatchState {
    fn buffer_destroyed(&mut self, _buffer: &WlBuffer) {}
}

impl OutputHandler for NuthatchState {}

#[derive(Default)]
pub struct ClientState {
    pub compositor_state: CompositorClientState,
}

impl ClientData for ClientState {
    fn initialized(&self, client_id: ClientId) {
        debug!("Client {:?} connected", client_id);
    }

    fn disconnected(&self, client_id: ClientId, reason: DisconnectReason) {
        debug!("Client {:?} disconnected: {:?}", client_id, reason);
    }
}

delegate_compositor!(NuthatchState);
delegate_xdg_shell!(NuthatchState);
delegate_shm!(NuthatchState);
delegate_output!(NuthatchState);
delegate_seat!(NuthatchState);
delegate_data_device!(NuthatchState);
