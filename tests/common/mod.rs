#![allow(dead_code)]

use std::{cell::RefCell, rc::Rc};

use nuthatch_runtime::{
    InitProperties, InputDevice, NativeHandle, Output, Runtime, RuntimeConfig, Seat, Surface,
    UiLayer, error::SeatFault, headless::HeadlessBackend, layout::OutputLayout,
};

/// Shared, ordered record of everything the UI layer and the seat were told.
#[derive(Clone, Default)]
pub struct Journal(Rc<RefCell<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: String) {
        self.0.borrow_mut().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.borrow().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.0.borrow().iter().filter(|e| *e == entry).count()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

pub struct RecordingUi {
    journal: Journal,
    pub last_output_props: Rc<RefCell<Option<InitProperties>>>,
}

impl UiLayer for RecordingUi {
    fn surface_added(&mut self, surface: &Surface, properties: &InitProperties) {
        self.journal.push(format!(
            "surface_added {} {}",
            surface.handle(),
            properties.text("type").unwrap_or("?")
        ));
    }

    fn surface_removed(&mut self, surface: &Surface) {
        self.journal.push(format!("surface_removed {}", surface.handle()));
    }

    fn output_added(&mut self, output: &Output, _: &OutputLayout, properties: &InitProperties) {
        self.journal.push(format!("output_added {}", output.handle()));
        *self.last_output_props.borrow_mut() = Some(properties.clone());
    }

    fn output_removed(&mut self, output: &Output) {
        self.journal.push(format!("output_removed {}", output.handle()));
    }
}

pub struct RecordingSeat {
    journal: Journal,
    refuse: Vec<NativeHandle>,
}

impl Seat for RecordingSeat {
    fn name(&self) -> &str {
        "seat-test"
    }

    fn attach_input_device(&mut self, device: &InputDevice) -> Result<(), SeatFault> {
        if self.refuse.contains(&device.handle()) {
            self.journal.push(format!("refuse {}", device.handle()));
            return Err(SeatFault::Refused("no keymap".into()));
        }
        self.journal.push(format!("attach {}", device.handle()));
        Ok(())
    }

    fn detach_input_device(&mut self, device: &InputDevice) {
        self.journal.push(format!("detach {}", device.handle()));
    }
}

pub fn h(raw: u64) -> NativeHandle {
    NativeHandle::from_raw(raw)
}

pub struct Harness {
    pub runtime: Runtime<HeadlessBackend>,
    pub journal: Journal,
    pub last_output_props: Rc<RefCell<Option<InitProperties>>>,
}

pub fn harness_with(backend: HeadlessBackend) -> Harness {
    harness_refusing(backend, Vec::new())
}

/// The seat refuses to attach any device in `refuse`.
pub fn harness_refusing(backend: HeadlessBackend, refuse: Vec<NativeHandle>) -> Harness {
    let journal = Journal::default();
    let last_output_props = Rc::new(RefCell::new(None));
    let ui = RecordingUi {
        journal: journal.clone(),
        last_output_props: last_output_props.clone(),
    };
    let seat = RecordingSeat {
        journal: journal.clone(),
        refuse,
    };
    let runtime = Runtime::new(RuntimeConfig::default(), backend, Box::new(ui), Box::new(seat));
    Harness {
        runtime,
        journal,
        last_output_props,
    }
}

/// A started runtime on a fresh headless backend.
pub fn started() -> Harness {
    let mut harness = harness_with(HeadlessBackend::new());
    harness.runtime.start().expect("runtime starts");
    harness
}
