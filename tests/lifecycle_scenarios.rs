mod common;

use common::{h, harness_refusing, harness_with, started};
use nuthatch_runtime::{
    BackendEvent, LifecycleError, Mode, OutputControl, SeatFault, SurfaceKind,
    headless::{self, HeadlessBackend, HeadlessSeat, ScriptStep},
    object::{DeviceCapability, InputInfo, OutputInfo},
    readiness::Enablement,
};

const MODE: Mode = Mode::new(1920, 1080, 60_000);

fn new_surface(raw: u64, kind: SurfaceKind) -> BackendEvent {
    BackendEvent::NewSurface {
        handle: h(raw),
        kind,
    }
}

#[test]
fn two_surfaces_then_global_teardown() {
    let mut hx = started();
    let (a, b) = (h(0xa), h(0xb));

    hx.runtime.dispatch(new_surface(0xa, SurfaceKind::Toplevel)).unwrap();
    hx.runtime.dispatch(new_surface(0xb, SurfaceKind::Popup)).unwrap();
    assert_eq!(hx.runtime.live_surfaces(), &[a, b]);

    hx.runtime.dispatch(BackendEvent::SurfaceDestroying(a)).unwrap();
    assert_eq!(hx.runtime.live_surfaces(), &[b]);
    assert_eq!(hx.journal.count("surface_removed 0xa"), 1);
    hx.runtime.end_cycle().unwrap();

    let removed = hx.runtime.shutdown().unwrap();
    assert_eq!(removed, 1);
    assert!(hx.runtime.live_surfaces().is_empty());
    assert!(hx.runtime.surfaces().is_empty());
    assert_eq!(hx.runtime.backend().global_count(), 0);
    assert_eq!(
        hx.journal.entries(),
        vec![
            "surface_added 0xa toplevel",
            "surface_added 0xb popup",
            "surface_removed 0xa",
            "surface_removed 0xb",
        ]
    );
}

#[test]
fn global_teardown_removes_in_insertion_order() {
    let mut hx = started();
    let order = [5, 3, 9, 1, 7];
    for raw in order {
        hx.runtime.dispatch(new_surface(raw, SurfaceKind::Toplevel)).unwrap();
    }
    hx.journal.clear();

    assert_eq!(hx.runtime.shutdown().unwrap(), order.len());
    let expected: Vec<String> = order
        .iter()
        .map(|raw| format!("surface_removed {}", h(*raw)))
        .collect();
    assert_eq!(hx.journal.entries(), expected);
}

#[test]
fn wrapper_outlives_removal_until_end_of_cycle() {
    let mut hx = started();
    let a = h(1);
    hx.runtime.dispatch(new_surface(1, SurfaceKind::Toplevel)).unwrap();
    hx.runtime.dispatch(BackendEvent::SurfaceDestroying(a)).unwrap();

    // Removed from the live set and announced, but not yet disposed.
    assert!(hx.journal.entries().contains(&"surface_removed 0x1".to_string()));
    let surface = hx.runtime.surfaces().lookup(a).expect("wrapper still registered");
    assert!(!surface.is_watched());
    assert_eq!(hx.runtime.pending_disposals(), 1);

    assert_eq!(hx.runtime.end_cycle().unwrap(), 1);
    assert!(!hx.runtime.surfaces().contains(a));
    assert_eq!(hx.runtime.end_cycle().unwrap(), 0);
}

#[test]
fn unknown_and_repeated_destroys_are_fatal() {
    let mut hx = started();
    assert_eq!(
        hx.runtime.dispatch(BackendEvent::SurfaceDestroying(h(4))),
        Err(LifecycleError::UnknownSurface(h(4)))
    );

    hx.runtime.dispatch(new_surface(4, SurfaceKind::Popup)).unwrap();
    hx.runtime.dispatch(BackendEvent::SurfaceDestroying(h(4))).unwrap();
    assert_eq!(
        hx.runtime.dispatch(BackendEvent::SurfaceDestroying(h(4))),
        Err(LifecycleError::NotLive(h(4)))
    );
    assert_eq!(hx.journal.count("surface_removed 0x4"), 1);
    assert!(hx.runtime.faults().is_empty());
}

#[test]
fn double_registration_is_rejected() {
    let mut hx = started();
    hx.runtime.dispatch(new_surface(2, SurfaceKind::Toplevel)).unwrap();
    assert_eq!(
        hx.runtime.dispatch(new_surface(2, SurfaceKind::Toplevel)),
        Err(LifecycleError::DuplicateRegistration(h(2)))
    );

    hx.runtime
        .dispatch(BackendEvent::OutputAdded(OutputInfo::new(h(0x10), "DP-1")))
        .unwrap();
    assert_eq!(
        hx.runtime
            .dispatch(BackendEvent::OutputAdded(OutputInfo::new(h(0x10), "DP-1"))),
        Err(LifecycleError::DuplicateRegistration(h(0x10)))
    );
    assert_eq!(hx.runtime.live_outputs(), &[h(0x10)]);
}

#[test]
fn surface_events_before_start_are_rejected() {
    let mut hx = harness_with(HeadlessBackend::new());
    let err = hx
        .runtime
        .dispatch(new_surface(1, SurfaceKind::Toplevel))
        .unwrap_err();
    assert!(matches!(err, LifecycleError::BackendUnavailable { interface: "xdg_wm_base", .. }));
}

#[test]
fn viewport_then_frame_enables_once() {
    let mut hx = started();
    let output = h(0x10);
    hx.runtime.backend_mut().connect_output(output, Some(MODE));
    hx.runtime
        .dispatch(BackendEvent::OutputAdded(OutputInfo::new(output, "DP-1")))
        .unwrap();

    hx.runtime.viewport_initialized(output).unwrap();
    assert!(hx.runtime.renderable_outputs().is_empty());
    hx.runtime.dispatch(BackendEvent::OutputFrame(output)).unwrap();
    hx.runtime.viewport_initialized(output).unwrap();

    assert_eq!(hx.runtime.renderable_outputs(), vec![output]);
    assert_eq!(hx.runtime.backend().commit_count(output), 1);
    assert_eq!(hx.runtime.readiness().enablement(output), Some(Enablement::Enabled));
}

#[test]
fn frame_then_viewport_enables_once() {
    let mut hx = started();
    let output = h(0x10);
    hx.runtime.backend_mut().connect_output(output, Some(MODE));
    hx.runtime
        .dispatch(BackendEvent::OutputAdded(OutputInfo::new(output, "DP-1")))
        .unwrap();

    hx.runtime.dispatch(BackendEvent::OutputFrame(output)).unwrap();
    hx.runtime.dispatch(BackendEvent::OutputFrame(output)).unwrap();
    assert!(hx.runtime.renderable_outputs().is_empty());
    hx.runtime.viewport_initialized(output).unwrap();

    assert_eq!(hx.runtime.renderable_outputs(), vec![output]);
    assert_eq!(hx.runtime.backend().commit_count(output), 1);
    assert_eq!(hx.runtime.backend().current_mode(output), Some(MODE));
}

#[test]
fn output_without_preferred_mode_is_left_disabled() {
    let mut hx = started();
    let good = h(0x10);
    let bad = h(0x11);
    hx.runtime.backend_mut().connect_output(good, Some(MODE));
    hx.runtime.backend_mut().connect_output(bad, None);
    for (output, name) in [(good, "DP-1"), (bad, "DP-2")] {
        hx.runtime
            .dispatch(BackendEvent::OutputAdded(OutputInfo::new(output, name)))
            .unwrap();
        hx.runtime.viewport_initialized(output).unwrap();
        hx.runtime.dispatch(BackendEvent::OutputFrame(output)).unwrap();
    }

    assert_eq!(hx.runtime.faults(), &[LifecycleError::CommitRejected(bad)]);
    assert_eq!(hx.runtime.renderable_outputs(), vec![good]);
    assert!(!hx.runtime.backend().is_enabled(bad));

    // The runtime keeps going.
    hx.runtime.dispatch(new_surface(1, SurfaceKind::Toplevel)).unwrap();
    assert_eq!(hx.runtime.live_surfaces(), &[h(1)]);
}

#[test]
fn outputs_are_laid_out_left_to_right() {
    let mut hx = started();
    hx.runtime.backend_mut().connect_output(h(1), Some(Mode::new(2560, 1440, 60_000)));
    hx.runtime.backend_mut().connect_output(h(2), Some(MODE));
    hx.runtime
        .dispatch(BackendEvent::OutputAdded(OutputInfo::new(h(1), "DP-1")))
        .unwrap();
    hx.runtime
        .dispatch(BackendEvent::OutputAdded(OutputInfo::new(h(2), "DP-2")))
        .unwrap();

    let props = hx.last_output_props.borrow().clone().unwrap();
    assert_eq!(props.handle("output"), Some(h(2)));
    assert_eq!(props.int("x"), Some(2560));
    assert_eq!(props.int("layout_width"), Some(2560 + 1920));
    assert_eq!(props.int("cursor_size"), Some(24));

    hx.runtime.dispatch(BackendEvent::OutputRemoved(h(1))).unwrap();
    assert_eq!(hx.runtime.live_outputs(), &[h(2)]);
    assert!(hx.runtime.layout().placement(h(1)).is_none());
    assert_eq!(hx.runtime.end_cycle().unwrap(), 1);
    assert!(!hx.runtime.outputs().contains(h(1)));
}

#[test]
fn input_devices_follow_the_seat() {
    let mut hx = started();
    let keyboard = h(0x20);
    hx.runtime
        .dispatch(BackendEvent::InputAdded(InputInfo::new(
            keyboard,
            "kbd",
            [DeviceCapability::Keyboard],
        )))
        .unwrap();
    assert_eq!(hx.runtime.live_inputs(), &[keyboard]);
    assert!(hx.runtime.seat().is_attached(keyboard));

    hx.runtime.dispatch(BackendEvent::InputRemoved(keyboard)).unwrap();
    assert!(hx.runtime.live_inputs().is_empty());
    assert!(!hx.runtime.seat().is_attached(keyboard));
    assert_eq!(
        hx.runtime.dispatch(BackendEvent::InputRemoved(keyboard)),
        Err(LifecycleError::NotLive(keyboard))
    );
    hx.runtime.end_cycle().unwrap();

    assert!(hx.runtime.inputs().is_empty());
    assert_eq!(hx.journal.entries(), vec!["attach 0x20", "detach 0x20"]);
}

#[test]
fn refused_device_stays_registered_but_detached() {
    let keyboard = h(0x20);
    let mut hx = harness_refusing(HeadlessBackend::new(), vec![keyboard]);
    hx.runtime.start().unwrap();

    hx.runtime
        .dispatch(BackendEvent::InputAdded(InputInfo::new(
            keyboard,
            "kbd",
            [DeviceCapability::Keyboard],
        )))
        .unwrap();
    assert!(hx.runtime.live_inputs().is_empty());
    assert!(!hx.runtime.seat().is_attached(keyboard));
    assert!(hx.runtime.inputs().contains(keyboard));
    assert_eq!(
        hx.runtime.faults(),
        &[LifecycleError::InvalidSeatOperation {
            device: keyboard,
            fault: SeatFault::Refused("no keymap".into()),
        }]
    );

    // Removal has nothing to detach and disposes the wrapper without a new fault.
    hx.runtime.dispatch(BackendEvent::InputRemoved(keyboard)).unwrap();
    assert_eq!(hx.runtime.end_cycle().unwrap(), 1);
    assert!(!hx.runtime.inputs().contains(keyboard));
    assert_eq!(hx.runtime.faults().len(), 1);
    assert_eq!(hx.journal.entries(), vec!["refuse 0x20"]);
}

#[test]
fn shutdown_detaches_inputs_in_the_order_they_arrived() {
    let mut hx = harness_refusing(HeadlessBackend::new(), vec![h(0x05)]);
    hx.runtime.start().unwrap();
    for (raw, name) in [(0x30, "tablet"), (0x05, "broken"), (0x20, "mouse"), (0x10, "kbd")] {
        hx.runtime
            .dispatch(BackendEvent::InputAdded(InputInfo::new(
                h(raw),
                name,
                [DeviceCapability::Pointer],
            )))
            .unwrap();
    }
    hx.journal.clear();

    hx.runtime.shutdown().unwrap();
    assert_eq!(
        hx.journal.entries(),
        vec!["detach 0x30", "detach 0x20", "detach 0x10"]
    );
    assert!(hx.runtime.inputs().is_empty());
}

#[test]
fn shutdown_removes_inputs_then_outputs() {
    let mut hx = started();
    hx.runtime
        .dispatch(BackendEvent::OutputAdded(OutputInfo::new(h(0x10), "DP-1")))
        .unwrap();
    hx.runtime
        .dispatch(BackendEvent::InputAdded(InputInfo::new(
            h(0x20),
            "mouse",
            [DeviceCapability::Pointer],
        )))
        .unwrap();
    hx.journal.clear();

    hx.runtime.shutdown().unwrap();
    assert_eq!(hx.journal.entries(), vec!["detach 0x20", "output_removed 0x10"]);
    assert!(hx.runtime.outputs().is_empty());
    assert!(hx.runtime.inputs().is_empty());
    assert!(hx.runtime.renderer().is_none());
}

#[test]
fn startup_fails_without_renderer() {
    let mut hx = harness_with(HeadlessBackend::new().without_renderer());
    assert!(matches!(
        hx.runtime.start(),
        Err(LifecycleError::RendererUnavailable(_))
    ));
    // The global is never published when the renderer is missing.
    assert_eq!(hx.runtime.backend().global_count(), 0);
}

#[test]
fn startup_fails_when_display_is_full() {
    let mut hx = harness_with(HeadlessBackend::new().with_global_capacity(0));
    let err = hx.runtime.start().unwrap_err();
    assert_eq!(
        err,
        LifecycleError::BackendUnavailable {
            interface: "xdg_wm_base",
            version: 2
        }
    );
    assert!(err.is_fatal());
}

#[test]
fn scripted_session_runs_through_the_event_loop() {
    let hx = harness_with(HeadlessBackend::new());
    let output = h(0x10);
    let script = vec![
        ScriptStep::ConnectOutput {
            info: OutputInfo::new(output, "HEADLESS-1"),
            preferred: Some(MODE),
        },
        ScriptStep::Backend(BackendEvent::OutputFrame(output)),
        ScriptStep::ViewportInitialized(output),
        ScriptStep::Backend(new_surface(1, SurfaceKind::Toplevel)),
        ScriptStep::Backend(new_surface(2, SurfaceKind::Toplevel)),
        ScriptStep::Backend(BackendEvent::SurfaceDestroying(h(1))),
        ScriptStep::Backend(BackendEvent::OutputFrame(output)),
    ];

    let report = headless::run_session(hx.runtime, script).unwrap();
    assert_eq!(report.steps, 7);
    assert_eq!(report.renderable_outputs, vec![output]);
    assert_eq!(report.frames_rendered, 1);
    assert_eq!(report.surfaces_removed_at_shutdown, 1);
    assert!(report.faults.is_empty());
    assert_eq!(hx.journal.count("surface_removed 0x1"), 1);
    assert_eq!(hx.journal.count("surface_removed 0x2"), 1);
}

#[test]
fn headless_seat_tracks_devices() {
    use nuthatch_runtime::{Runtime, RuntimeConfig, ui::DelegateUi, ui::ObjectCreator};

    let ui = DelegateUi::new(
        ObjectCreator::new(|owner, _| owner),
        ObjectCreator::new(|owner, _| owner),
    );
    let mut runtime = Runtime::new(
        RuntimeConfig::default(),
        HeadlessBackend::new(),
        Box::new(ui),
        Box::new(HeadlessSeat::new("seat-0")),
    );
    runtime.start().unwrap();
    runtime
        .dispatch(BackendEvent::InputAdded(InputInfo::new(
            h(1),
            "touch",
            [DeviceCapability::Touch],
        )))
        .unwrap();
    assert_eq!(runtime.seat().name(), "seat-0");
    assert_eq!(runtime.seat().attached(), &[h(1)]);
}
