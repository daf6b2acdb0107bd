//! Headless backend
//!
//! Outputs and input devices are virtual. They are added by whoever drives
//! the backend (the server from its configuration, or tests) and announced
//! through the backend events once the backend is started.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use calloop::LoopHandle;
use log::{debug, error, info, warn};

use super::display::Display;
use super::input::{InputDevice, InputDeviceType};
use super::ledger;
use super::output::{Mode, Output};
use crate::utils::{Resource, Signal};

/// Environment variable selecting the backend
pub const BACKEND_ENV: &str = "TINYWAY_BACKEND";

#[derive(Debug, Default)]
pub struct BackendEvents {
    /// A new output appeared
    pub new_output: Signal<Output>,
    /// A new input device appeared
    pub new_input: Signal<InputDevice>,
    pub destroy: Signal<()>,
}

/// Source of outputs and input devices
#[derive(Clone)]
pub struct Backend(Rc<BackendInner>);

struct BackendInner {
    name: &'static str,
    loop_handle: LoopHandle<'static, ()>,
    started: Cell<bool>,
    outputs: RefCell<Vec<Output>>,
    inputs: RefCell<Vec<InputDevice>>,
    destroyed: Cell<bool>,
    events: BackendEvents,
}

impl Backend {
    /// Pick the backend named by `TINYWAY_BACKEND`, headless by default
    pub fn autocreate(display: &Display) -> Option<Backend> {
        let name = std::env::var(BACKEND_ENV).unwrap_or_else(|_| "headless".to_string());
        Self::create(display, &name)
    }

    /// Create the backend called `name`
    pub fn create(display: &Display, name: &str) -> Option<Backend> {
        if display.is_destroyed() {
            error!("Cannot create a backend on a destroyed display");
            return None;
        }
        if name != "headless" {
            error!("No usable backend: {:?} is not available", name);
            return None;
        }

        ledger::record_create(Self::KIND);
        Some(Backend(Rc::new(BackendInner {
            name: "headless",
            loop_handle: display.loop_handle(),
            started: Cell::new(false),
            outputs: RefCell::new(Vec::new()),
            inputs: RefCell::new(Vec::new()),
            destroyed: Cell::new(false),
            events: BackendEvents::default(),
        })))
    }

    pub fn name(&self) -> &'static str {
        self.0.name
    }

    /// Announce the devices known so far and every one added later
    pub fn start(&self) -> bool {
        if self.is_destroyed() {
            return false;
        }
        if self.0.started.replace(true) {
            return true;
        }
        info!("Starting the {} backend", self.0.name);

        let outputs = self.0.outputs.borrow().clone();
        for output in outputs {
            self.0.events.new_output.emit(output);
        }
        let inputs = self.0.inputs.borrow().clone();
        for input in inputs {
            self.0.events.new_input.emit(input);
        }
        true
    }

    pub fn is_started(&self) -> bool {
        self.0.started.get()
    }

    /// Plug in a virtual output
    pub fn add_output(&self, name: &str, modes: Vec<Mode>) -> Output {
        let output = Output::new(name, modes, self.0.loop_handle.clone());
        debug!("Headless output {} added", name);
        self.0.outputs.borrow_mut().push(output.clone());
        if self.is_started() {
            self.0.events.new_output.emit(output.clone());
        }
        output
    }

    /// Unplug an output
    pub fn remove_output(&self, output: &Output) {
        let removed = {
            let mut outputs = self.0.outputs.borrow_mut();
            let before = outputs.len();
            outputs.retain(|o| o != output);
            outputs.len() != before
        };
        if removed {
            output.destroy();
        } else {
            warn!("Output {} does not belong to this backend", output.name());
        }
    }

    /// Plug in a virtual input device
    pub fn add_input(&self, name: &str, kind: InputDeviceType) -> InputDevice {
        let device = InputDevice::new(name, kind);
        debug!("Headless {:?} device {} added", kind, name);
        self.0.inputs.borrow_mut().push(device.clone());
        if self.is_started() {
            self.0.events.new_input.emit(device.clone());
        }
        device
    }

    /// Unplug an input device
    pub fn remove_input(&self, device: &InputDevice) {
        let removed = {
            let mut inputs = self.0.inputs.borrow_mut();
            let before = inputs.len();
            inputs.retain(|d| d != device);
            inputs.len() != before
        };
        if removed {
            device.destroy();
        }
    }

    pub fn outputs(&self) -> Vec<Output> {
        self.0.outputs.borrow().clone()
    }

    pub fn inputs(&self) -> Vec<InputDevice> {
        self.0.inputs.borrow().clone()
    }

    pub fn events(&self) -> &BackendEvents {
        &self.0.events
    }

    pub fn is_destroyed(&self) -> bool {
        self.0.destroyed.get()
    }
}

impl Resource for Backend {
    const KIND: &'static str = "backend";

    fn destroy(self) {
        if self.0.destroyed.replace(true) {
            warn!("Backend destroyed twice");
            return;
        }
        self.0.events.destroy.emit(());

        let inputs = std::mem::take(&mut *self.0.inputs.borrow_mut());
        for input in inputs {
            input.destroy();
        }
        let outputs = std::mem::take(&mut *self.0.outputs.borrow_mut());
        for output in outputs {
            output.destroy();
        }
        ledger::record_destroy(Self::KIND);
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("name", &self.0.name)
            .field("started", &self.0.started.get())
            .field("outputs", &self.0.outputs.borrow().len())
            .field("inputs", &self.0.inputs.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_backend() {
        let display = Display::create().unwrap();
        assert!(Backend::create(&display, "drm").is_none());
        display.destroy();
    }

    #[test]
    fn test_devices_announced_on_start() {
        let before = ledger::snapshot();
        let display = Display::create().unwrap();
        let backend = Backend::create(&display, "headless").unwrap();
        let announced = Rc::new(RefCell::new(Vec::new()));
        let _outputs = {
            let announced = announced.clone();
            backend
                .events()
                .new_output
                .connect(move |o: &Output| announced.borrow_mut().push(o.name().to_string()))
        };
        let _inputs = {
            let announced = announced.clone();
            backend
                .events()
                .new_input
                .connect(move |d: &InputDevice| announced.borrow_mut().push(d.name().to_string()))
        };

        backend.add_output("HEADLESS-1", Vec::new());
        backend.add_input("pointer", InputDeviceType::Pointer);
        assert!(announced.borrow().is_empty());

        assert!(backend.start());
        assert_eq!(*announced.borrow(), vec!["HEADLESS-1", "pointer"]);

        backend.add_output("HEADLESS-2", Vec::new());
        assert!(backend.start());
        assert_eq!(announced.borrow().len(), 3);

        backend.destroy();
        display.destroy();
        assert!(ledger::snapshot().since(&before).is_balanced());
    }

    #[test]
    fn test_remove_output() {
        let display = Display::create().unwrap();
        let backend = Backend::create(&display, "headless").unwrap();
        let output = backend.add_output("HEADLESS-1", Vec::new());

        backend.remove_output(&output);
        assert!(output.is_destroyed());
        assert!(backend.outputs().is_empty());

        backend.destroy();
        display.destroy();
    }
}
