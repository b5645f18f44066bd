//! Backend hotplug: outputs and input devices coming and going.

use tracing::{debug, info, warn};

use crate::{
    backend::{OutputControl, Seat},
    cursor::CursorContext,
    disposal::{Disposal, DisposalQueue},
    error::{LifecycleError, Result, SeatFault},
    layout::{OutputLayout, Placement},
    object::{InputDevice, InputInfo, Output, OutputInfo, RuntimeId},
    protocol::LiveSet,
    readiness::RenderReadiness,
    registry::{LoopAffinity, NativeHandle, Registry},
    ui::{InitProperties, PropertyValue, UiLayer},
};

/// The seat plus the set of devices currently attached to it.
pub struct SeatBinding {
    seat: Box<dyn Seat>,
    attached: Vec<NativeHandle>,
    affinity: LoopAffinity,
}

impl SeatBinding {
    pub fn new(seat: Box<dyn Seat>) -> Self {
        Self {
            seat,
            attached: Vec::new(),
            affinity: LoopAffinity::current(),
        }
    }

    pub fn name(&self) -> &str {
        self.seat.name()
    }

    pub fn attach(&mut self, device: &InputDevice) -> Result<()> {
        self.affinity.check("seat")?;
        let handle = device.handle();
        if self.attached.contains(&handle) {
            return Err(LifecycleError::InvalidSeatOperation {
                device: handle,
                fault: SeatFault::AlreadyAttached,
            });
        }
        self.seat
            .attach_input_device(device)
            .map_err(|fault| LifecycleError::InvalidSeatOperation {
                device: handle,
                fault,
            })?;
        self.attached.push(handle);
        Ok(())
    }

    pub fn detach(&mut self, device: &InputDevice) -> Result<()> {
        self.affinity.check("seat")?;
        let handle = device.handle();
        let Some(index) = self.attached.iter().position(|h| *h == handle) else {
            return Err(LifecycleError::InvalidSeatOperation {
                device: handle,
                fault: SeatFault::NotAttached,
            });
        };
        self.attached.remove(index);
        self.seat.detach_input_device(device);
        Ok(())
    }

    pub fn is_attached(&self, device: NativeHandle) -> bool {
        self.attached.contains(&device)
    }

    pub fn attached(&self) -> &[NativeHandle] {
        &self.attached
    }
}

/// What the coordinator needs to touch while handling one event.
pub struct HotplugCx<'a> {
    pub outputs: &'a mut Registry<Output>,
    pub inputs: &'a mut Registry<InputDevice>,
    pub readiness: &'a mut RenderReadiness,
    pub control: &'a dyn OutputControl,
    pub ui: &'a mut dyn UiLayer,
    pub disposal: &'a mut DisposalQueue,
}

pub struct HotplugCoordinator {
    runtime: RuntimeId,
    layout: OutputLayout,
    cursor: CursorContext,
    seat: SeatBinding,
    live_outputs: LiveSet,
    live_inputs: LiveSet,
}

impl HotplugCoordinator {
    pub fn new(runtime: RuntimeId, seat: Box<dyn Seat>, cursor: CursorContext) -> Self {
        Self {
            runtime,
            layout: OutputLayout::new(),
            cursor,
            seat: SeatBinding::new(seat),
            live_outputs: LiveSet::new(),
            live_inputs: LiveSet::new(),
        }
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    pub fn cursor(&self) -> &CursorContext {
        &self.cursor
    }

    pub fn seat(&self) -> &SeatBinding {
        &self.seat
    }

    pub fn live_outputs(&self) -> &[NativeHandle] {
        self.live_outputs.as_slice()
    }

    pub fn live_inputs(&self) -> &[NativeHandle] {
        self.live_inputs.as_slice()
    }

    pub fn on_output_added(&mut self, cx: &mut HotplugCx<'_>, info: OutputInfo) -> Result<()> {
        let handle = info.handle;
        let output = cx.outputs.register(handle, Output::new(info, self.runtime))?;
        self.live_outputs.insert(handle)?;

        let (width, height) = cx
            .control
            .current_mode(handle)
            .or_else(|| cx.control.preferred_mode(handle))
            .map(|mode| (mode.width, mode.height))
            .unwrap_or((0, 0));
        let placement = self.layout.place_right(handle, width, height);
        cx.readiness.track(handle)?;

        info!("🖥️ Output '{}' ({}) added at x={}", output.name(), handle, placement.x);
        let properties = self.output_properties(placement);
        cx.ui.output_added(output, &self.layout, &properties);
        Ok(())
    }

    /// Consumers hear about the removal before the wrapper is queued for disposal.
    pub fn on_output_removed(&mut self, cx: &mut HotplugCx<'_>, handle: NativeHandle) -> Result<()> {
        let output = cx
            .outputs
            .lookup(handle)
            .ok_or(LifecycleError::NotRegistered(handle))?;
        self.live_outputs.remove(handle)?;

        info!("Output '{}' ({}) removed", output.name(), handle);
        cx.ui.output_removed(output);
        self.layout.remove(handle);
        cx.readiness.forget(handle)?;
        cx.disposal.schedule(Disposal::Output(handle))
    }

    /// A device that fails to attach stays registered but out of the live set.
    pub fn on_input_added(&mut self, cx: &mut HotplugCx<'_>, info: InputInfo) -> Result<()> {
        let handle = info.handle;
        let device = cx
            .inputs
            .register(handle, InputDevice::new(info, self.runtime))?;
        self.seat.attach(device)?;
        self.live_inputs.insert(handle)?;
        info!("⌨️ Input device '{}' attached to {}", device.name(), self.seat.name());
        Ok(())
    }

    /// Detaches and queues the device for disposal. A failed detach is
    /// reported only after the teardown finished.
    pub fn on_input_removed(&mut self, cx: &mut HotplugCx<'_>, handle: NativeHandle) -> Result<()> {
        let device = cx
            .inputs
            .lookup(handle)
            .ok_or(LifecycleError::NotRegistered(handle))?;
        if cx.disposal.is_scheduled(Disposal::InputDevice(handle)) {
            return Err(LifecycleError::NotLive(handle));
        }
        // A device left detached by a refused attach has nothing to detach.
        let detached = if self.live_inputs.contains(handle) {
            self.live_inputs.remove(handle)?;
            self.seat.detach(device)
        } else {
            Ok(())
        };
        debug!(%handle, name = device.name(), "input device removed");
        cx.disposal.schedule(Disposal::InputDevice(handle))?;
        detached
    }

    /// Removes every input device, then every output. Live devices go in
    /// the order they were added, devices left detached after them.
    pub fn shutdown(&mut self, cx: &mut HotplugCx<'_>) -> Result<()> {
        let mut order = self.live_inputs.as_slice().to_vec();
        order.extend(
            cx.inputs
                .handles()
                .into_iter()
                .filter(|handle| !self.live_inputs.contains(*handle)),
        );
        for handle in order {
            if cx.disposal.is_scheduled(Disposal::InputDevice(handle)) {
                continue;
            }
            match self.on_input_removed(cx, handle) {
                Err(err) if !err.is_fatal() => warn!("{}", err),
                other => other?,
            }
        }
        for handle in self.live_outputs.as_slice().to_vec() {
            self.on_output_removed(cx, handle)?;
        }
        Ok(())
    }

    fn output_properties(&self, placement: Placement) -> InitProperties {
        InitProperties::new()
            .with("output", PropertyValue::Handle(placement.output))
            .with("x", PropertyValue::Int(placement.x.into()))
            .with("y", PropertyValue::Int(placement.y.into()))
            .with("cursor_theme", PropertyValue::Text(self.cursor.theme().into()))
            .with("cursor_size", PropertyValue::Int(self.cursor.size().into()))
            .with("layout_width", PropertyValue::Int(self.layout.implicit_width().into()))
            .with("layout_height", PropertyValue::Int(self.layout.implicit_height().into()))
    }
}
