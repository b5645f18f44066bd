use std::{sync::Arc, time::Duration};

use anyhow::{Context, anyhow};
use smithay::{
    backend::{
        renderer::gles::GlesRenderer,
        winit::{self, WinitEvent},
    },
    output::{Output, PhysicalProperties, Subpixel},
    reexports::{calloop::EventLoop, wayland_server::Display},
    wayland::socket::ListeningSocketSource,
};
use tracing::{info, trace, warn};

use crate::{
    backend::BackendEvent,
    config::RuntimeConfig,
    object::{DeviceCapability, InputInfo, Mode, OutputInfo},
    state::{ClientState, NuthatchState},
};

pub fn init_winit(config: RuntimeConfig) -> anyhow::Result<()> {
    info!("🐦 Initializing Nuthatch Compositor with winit backend");

    let mut event_loop: EventLoop<NuthatchState> = EventLoop::try_new()?;
    let mut display: Display<NuthatchState> = Display::new()?;

    let (graphics, winit_evt_loop) =
        winit::init::<GlesRenderer>().map_err(|e| anyhow!("Failed to initialize winit: {}", e))?;
    let size = graphics.window_size();
    info!("Window size: {:?}", size);

    let mut state = NuthatchState::new(&mut display, &event_loop, config, graphics);
    state.runtime.start().context("Failed to start runtime")?;

    let socket = ListeningSocketSource::new_auto().context("Failed to create Wayland socket")?;
    let socket_name = socket.socket_name().to_os_string();
    event_loop
        .handle()
        .insert_source(socket, |stream, _, state| {
            if let Err(err) = state
                .display_handle
                .insert_client(stream, Arc::new(ClientState::default()))
            {
                warn!("Failed to add client: {}", err);
            }
        })
        .map_err(|e| anyhow!("Failed to insert socket source: {}", e.error))?;

    // The window is the one output
    let output_handle = state.handles.allocate();
    let physical_properties = PhysicalProperties {
        size: (0, 0).into(),
        subpixel: Subpixel::Unknown,
        make: "Nuthatch".into(),
        model: "Compositor".into(),
    };
    let output = Output::new("winit".to_string(), physical_properties);
    state
        .runtime
        .backend_mut()
        .add_output(output_handle, output, Mode::new(size.w, size.h, 60_000));
    state.dispatch(BackendEvent::OutputAdded(OutputInfo {
        handle: output_handle,
        name: "winit".into(),
        make: "Nuthatch".into(),
        model: "Compositor".into(),
    }));
    state.viewport_initialized(output_handle);

    for (name, capability) in [
        ("winit-keyboard", DeviceCapability::Keyboard),
        ("winit-pointer", DeviceCapability::Pointer),
    ] {
        let handle = state.handles.allocate();
        state.dispatch(BackendEvent::InputAdded(InputInfo::new(handle, name, [capability])));
    }

    info!("✓ Compositor ready! Clients can connect to: {:?}", socket_name);

    event_loop
        .handle()
        .insert_source(winit_evt_loop, move |event, _, state| match event {
            WinitEvent::Resized { size, .. } => {
                info!("Window resized: {:?}", size);
                state.runtime.backend_mut().resize(output_handle, size);
            }
            WinitEvent::Input(input_event) => {
                trace!("Input event: {:?}", input_event);
            }
            WinitEvent::Focus(_) => {}
            WinitEvent::Redraw => state.redraw(output_handle),
            WinitEvent::CloseRequested => {
                info!("Close requested, shutting down");
                state.loop_signal.stop();
            }
        })
        .map_err(|e| anyhow!("Failed to insert winit source: {}", e.error))?;

    if let Some(graphics) = state.runtime.renderer() {
        graphics.window().request_redraw();
    }

    event_loop.run(Some(Duration::from_millis(16)), &mut state, |state| {
        if let Err(err) = display.dispatch_clients(state) {
            warn!("Failed to dispatch clients: {}", err);
        }
        state.end_cycle();
        if let Err(err) = display.flush_clients() {
            warn!("Failed to flush clients: {}", err);
        }
    })?;

    if let Some(err) = state.fatal.take() {
        return Err(err).context("Compositor stopped on a fatal error");
    }
    state.shutdown().context("Failed to shut down runtime")?;
    Ok(())
}
