//! In-memory backend and a scripted session driven by calloop.
//!
//! Nothing here touches a GPU or a display server, which makes it the default
//! backend of the binary and the one every test runs against.

use std::{
    collections::{BTreeMap, HashMap},
    time::Duration,
};

use anyhow::{Context, anyhow};
use calloop::{
    EventLoop, LoopSignal,
    channel::{self, Event},
};
use tracing::{debug, error, info, warn};

use crate::{
    backend::{BackendEvent, DisplayContext, GlobalId, OutputControl, RendererFactory, Seat},
    error::{LifecycleError, Result, SeatFault},
    object::{
        CapabilityCounts, DeviceCapability, InputDevice, InputInfo, Mode, OutputInfo, SurfaceKind,
    },
    registry::NativeHandle,
    runtime::Runtime,
};

#[derive(Debug, Default)]
struct HeadlessOutput {
    preferred: Option<Mode>,
    current: Option<Mode>,
    enabled: bool,
    pending_mode: Option<Mode>,
    pending_enabled: Option<bool>,
    commits: u32,
}

#[derive(Debug)]
pub struct HeadlessBackend {
    next_global: u32,
    globals: BTreeMap<GlobalId, (&'static str, u32)>,
    global_capacity: Option<usize>,
    renderer_available: bool,
    outputs: HashMap<NativeHandle, HeadlessOutput>,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self {
            next_global: 1,
            globals: BTreeMap::new(),
            global_capacity: None,
            renderer_available: true,
            outputs: HashMap::new(),
        }
    }

    /// Caps the number of globals the display can hold at once.
    pub fn with_global_capacity(mut self, capacity: usize) -> Self {
        self.global_capacity = Some(capacity);
        self
    }

    /// Makes renderer creation fail.
    pub fn without_renderer(mut self) -> Self {
        self.renderer_available = false;
        self
    }

    /// Plugs in an output. It starts disabled with no current mode.
    pub fn connect_output(&mut self, output: NativeHandle, preferred: Option<Mode>) {
        self.outputs.insert(
            output,
            HeadlessOutput {
                preferred,
                ..HeadlessOutput::default()
            },
        );
    }

    pub fn disconnect_output(&mut self, output: NativeHandle) {
        self.outputs.remove(&output);
    }

    pub fn has_global(&self, global: GlobalId) -> bool {
        self.globals.contains_key(&global)
    }

    pub fn global_count(&self) -> usize {
        self.globals.len()
    }

    /// Interface and version of every published global.
    pub fn globals(&self) -> impl Iterator<Item = (&'static str, u32)> + '_ {
        self.globals.values().copied()
    }

    /// Successful commits on `output`.
    pub fn commit_count(&self, output: NativeHandle) -> u32 {
        self.outputs.get(&output).map_or(0, |state| state.commits)
    }

    pub fn is_enabled(&self, output: NativeHandle) -> bool {
        self.outputs.get(&output).is_some_and(|state| state.enabled)
    }
}

impl DisplayContext for HeadlessBackend {
    fn register_global(&mut self, interface: &'static str, version: u32) -> Result<GlobalId> {
        if self
            .global_capacity
            .is_some_and(|capacity| self.globals.len() >= capacity)
        {
            return Err(LifecycleError::BackendUnavailable { interface, version });
        }
        let id = GlobalId::from_raw(self.next_global);
        self.next_global += 1;
        self.globals.insert(id, (interface, version));
        Ok(id)
    }

    fn remove_global(&mut self, global: GlobalId) {
        if self.globals.remove(&global).is_none() {
            warn!("Removing unknown {}", global);
        }
    }
}

impl OutputControl for HeadlessBackend {
    fn current_mode(&self, output: NativeHandle) -> Option<Mode> {
        self.outputs.get(&output).and_then(|state| state.current)
    }

    fn preferred_mode(&self, output: NativeHandle) -> Option<Mode> {
        self.outputs.get(&output).and_then(|state| state.preferred)
    }

    fn set_mode(&mut self, output: NativeHandle, mode: Mode) {
        if let Some(state) = self.outputs.get_mut(&output) {
            state.pending_mode = Some(mode);
        }
    }

    fn set_enabled(&mut self, output: NativeHandle, enabled: bool) {
        if let Some(state) = self.outputs.get_mut(&output) {
            state.pending_enabled = Some(enabled);
        }
    }

    fn commit(&mut self, output: NativeHandle) -> bool {
        let Some(state) = self.outputs.get_mut(&output) else {
            return false;
        };
        let mode = state.pending_mode.take().or(state.current);
        let enabled = state.pending_enabled.take().unwrap_or(state.enabled);
        // An enabled output needs a mode to scan out.
        if enabled && mode.is_none() {
            return false;
        }
        state.current = mode;
        state.enabled = enabled;
        state.commits += 1;
        true
    }
}

/// Counts what would have been drawn.
#[derive(Debug, Default)]
pub struct HeadlessRenderer {
    frames: HashMap<NativeHandle, u64>,
}

impl HeadlessRenderer {
    pub fn render(&mut self, output: NativeHandle) {
        *self.frames.entry(output).or_default() += 1;
    }

    pub fn frames(&self, output: NativeHandle) -> u64 {
        self.frames.get(&output).copied().unwrap_or_default()
    }

    pub fn total_frames(&self) -> u64 {
        self.frames.values().sum()
    }
}

impl RendererFactory for HeadlessBackend {
    type Renderer = HeadlessRenderer;

    fn create_renderer(&mut self) -> Result<HeadlessRenderer> {
        if !self.renderer_available {
            return Err(LifecycleError::RendererUnavailable(
                "headless renderer disabled".into(),
            ));
        }
        Ok(HeadlessRenderer::default())
    }
}

/// Seat that only logs and remembers its devices.
#[derive(Debug)]
pub struct HeadlessSeat {
    name: String,
    devices: Vec<String>,
    capabilities: CapabilityCounts,
}

impl HeadlessSeat {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            devices: Vec::new(),
            capabilities: CapabilityCounts::new(),
        }
    }

    pub fn devices(&self) -> &[String] {
        &self.devices
    }

    pub fn has_capability(&self, capability: DeviceCapability) -> bool {
        self.capabilities.provides(capability)
    }
}

impl Seat for HeadlessSeat {
    fn name(&self) -> &str {
        &self.name
    }

    fn attach_input_device(&mut self, device: &InputDevice) -> Result<(), SeatFault> {
        let gained = self.capabilities.acquire(device);
        debug!(seat = %self.name, device = device.name(), ?gained, "attach");
        self.devices.push(device.name().to_string());
        Ok(())
    }

    fn detach_input_device(&mut self, device: &InputDevice) {
        let lost = self.capabilities.release(device);
        debug!(seat = %self.name, device = device.name(), ?lost, "detach");
        self.devices.retain(|name| name != device.name());
    }
}

/// One step of a scripted session.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Plugs the output into the backend, then announces it.
    ConnectOutput {
        info: OutputInfo,
        preferred: Option<Mode>,
    },
    /// Announces the removal, then unplugs the output.
    DisconnectOutput(NativeHandle),
    /// The render window attached a viewport for the output.
    ViewportInitialized(NativeHandle),
    Backend(BackendEvent),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub steps: usize,
    pub renderable_outputs: Vec<NativeHandle>,
    pub frames_rendered: u64,
    pub surfaces_removed_at_shutdown: usize,
    pub faults: Vec<LifecycleError>,
}

struct HeadlessSession {
    runtime: Runtime<HeadlessBackend>,
    signal: LoopSignal,
    fatal: Option<LifecycleError>,
    steps: usize,
}

impl HeadlessSession {
    fn apply(&mut self, step: ScriptStep) {
        if self.fatal.is_some() {
            return;
        }
        self.steps += 1;
        let result = match step {
            ScriptStep::ConnectOutput { info, preferred } => {
                self.runtime.backend_mut().connect_output(info.handle, preferred);
                self.runtime.dispatch(BackendEvent::OutputAdded(info))
            }
            ScriptStep::DisconnectOutput(output) => {
                let result = self.runtime.dispatch(BackendEvent::OutputRemoved(output));
                self.runtime.backend_mut().disconnect_output(output);
                result
            }
            ScriptStep::ViewportInitialized(output) => self.runtime.viewport_initialized(output),
            ScriptStep::Backend(BackendEvent::OutputFrame(output)) => {
                let result = self.runtime.dispatch(BackendEvent::OutputFrame(output));
                if self.runtime.readiness().is_renderable(output) {
                    if let Some(renderer) = self.runtime.renderer_mut() {
                        renderer.render(output);
                    }
                }
                result
            }
            ScriptStep::Backend(event) => self.runtime.dispatch(event),
        };
        self.fail_on(result);
    }

    fn end_cycle(&mut self) {
        let result = self.runtime.end_cycle().map(|disposed| {
            if disposed > 0 {
                debug!(disposed, "disposed wrappers");
            }
        });
        self.fail_on(result);
    }

    fn fail_on(&mut self, result: Result<()>) {
        if let Err(err) = result {
            error!("Stopping session: {}", err);
            self.fatal.get_or_insert(err);
            self.signal.stop();
        }
    }
}

/// Starts `runtime`, feeds `script` through a calloop channel and shuts down
/// once the script is exhausted.
pub fn run_session(
    mut runtime: Runtime<HeadlessBackend>,
    script: impl IntoIterator<Item = ScriptStep>,
) -> anyhow::Result<SessionReport> {
    let mut event_loop: EventLoop<HeadlessSession> =
        EventLoop::try_new().context("Failed to create event loop")?;
    let (sender, steps) = channel::channel::<ScriptStep>();

    event_loop
        .handle()
        .insert_source(steps, |event, _, session| match event {
            Event::Msg(step) => session.apply(step),
            Event::Closed => session.signal.stop(),
        })
        .map_err(|e| anyhow!("Failed to insert script source: {}", e.error))?;

    runtime.start().context("Failed to start runtime")?;
    for step in script {
        sender
            .send(step)
            .map_err(|_| anyhow!("Script channel closed early"))?;
    }
    drop(sender);

    let mut session = HeadlessSession {
        runtime,
        signal: event_loop.get_signal(),
        fatal: None,
        steps: 0,
    };

    info!("🐦 Running headless session");
    event_loop
        .run(Some(Duration::from_millis(16)), &mut session, |session| {
            session.end_cycle()
        })
        .context("Event loop failed")?;

    if let Some(err) = session.fatal.take() {
        return Err(err).context("Session stopped on a fatal error");
    }

    let renderable_outputs = session.runtime.renderable_outputs();
    let frames_rendered = session
        .runtime
        .renderer()
        .map_or(0, HeadlessRenderer::total_frames);
    let surfaces_removed_at_shutdown = session
        .runtime
        .shutdown()
        .context("Failed to shut down runtime")?;

    Ok(SessionReport {
        steps: session.steps,
        renderable_outputs,
        frames_rendered,
        surfaces_removed_at_shutdown,
        faults: session.runtime.faults().to_vec(),
    })
}

/// A short session: two outputs (one without a usable mode), a keyboard, and
/// a toplevel with a popup that comes and goes.
pub fn demo_script() -> Vec<ScriptStep> {
    let primary = NativeHandle::from_raw(0x10);
    let secondary = NativeHandle::from_raw(0x11);
    let keyboard = NativeHandle::from_raw(0x20);
    let toplevel = NativeHandle::from_raw(0x100);
    let popup = NativeHandle::from_raw(0x101);

    vec![
        ScriptStep::ConnectOutput {
            info: OutputInfo::new(primary, "HEADLESS-1"),
            preferred: Some(Mode::new(1920, 1080, 60_000)),
        },
        ScriptStep::ViewportInitialized(primary),
        ScriptStep::Backend(BackendEvent::OutputFrame(primary)),
        ScriptStep::ConnectOutput {
            info: OutputInfo::new(secondary, "HEADLESS-2"),
            preferred: None,
        },
        ScriptStep::ViewportInitialized(secondary),
        ScriptStep::Backend(BackendEvent::InputAdded(InputInfo::new(
            keyboard,
            "virtual-keyboard",
            [DeviceCapability::Keyboard],
        ))),
        ScriptStep::Backend(BackendEvent::NewSurface {
            handle: toplevel,
            kind: SurfaceKind::Toplevel,
        }),
        ScriptStep::Backend(BackendEvent::NewSurface {
            handle: popup,
            kind: SurfaceKind::Popup,
        }),
        ScriptStep::Backend(BackendEvent::OutputFrame(primary)),
        ScriptStep::Backend(BackendEvent::SurfaceDestroying(popup)),
        ScriptStep::Backend(BackendEvent::OutputFrame(primary)),
        ScriptStep::DisconnectOutput(secondary),
    ]
}
