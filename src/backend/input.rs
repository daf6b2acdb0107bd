//! Virtual input devices

use std::cell::Cell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, warn};

use super::ledger;
use crate::utils::{Clock, Signal};

/// Unique identifier for input devices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputDeviceId(pub u64);

impl InputDeviceId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        InputDeviceId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Class of an input device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputDeviceType {
    Keyboard,
    Pointer,
    Touch,
    TabletTool,
    TabletPad,
    Switch,
}

/// Relative pointer motion
#[derive(Debug, Clone)]
pub struct PointerMotionEvent {
    /// Device that produced the motion
    pub device: InputDevice,
    /// Timestamp in milliseconds
    pub time_msec: u32,
    pub delta_x: f64,
    pub delta_y: f64,
}

/// Events of a pointer device
#[derive(Debug, Default)]
pub struct PointerEvents {
    pub motion: Signal<PointerMotionEvent>,
    /// End of a batch of pointer events
    pub frame: Signal<()>,
}

#[derive(Debug, Default)]
pub struct InputDeviceEvents {
    pub destroy: Signal<()>,
}

/// A keyboard as seen by the seat
#[derive(Clone)]
pub struct Keyboard(Rc<KeyboardInner>);

struct KeyboardInner {
    device: InputDeviceId,
    name: String,
    /// Repeat rate (characters per second)
    repeat_rate: i32,
    /// Repeat delay (milliseconds)
    repeat_delay: i32,
}

impl Keyboard {
    pub fn device(&self) -> InputDeviceId {
        self.0.device
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Repeat rate and delay
    pub fn repeat_info(&self) -> (i32, i32) {
        (self.0.repeat_rate, self.0.repeat_delay)
    }
}

impl PartialEq for Keyboard {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for Keyboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keyboard")
            .field("device", &self.0.device)
            .field("name", &self.0.name)
            .finish()
    }
}

/// A device reported by the backend
#[derive(Clone)]
pub struct InputDevice(Rc<InputDeviceInner>);

struct InputDeviceInner {
    id: InputDeviceId,
    name: String,
    kind: InputDeviceType,
    keyboard: Option<Keyboard>,
    pointer: PointerEvents,
    clock: Clock,
    destroyed: Cell<bool>,
    events: InputDeviceEvents,
}

impl InputDevice {
    pub(crate) fn new(name: &str, kind: InputDeviceType) -> InputDevice {
        let id = InputDeviceId::new();
        let keyboard = (kind == InputDeviceType::Keyboard).then(|| {
            Keyboard(Rc::new(KeyboardInner {
                device: id,
                name: name.to_string(),
                repeat_rate: 25,
                repeat_delay: 600,
            }))
        });
        ledger::record_create("input device");
        InputDevice(Rc::new(InputDeviceInner {
            id,
            name: name.to_string(),
            kind,
            keyboard,
            pointer: PointerEvents::default(),
            clock: Clock::new(),
            destroyed: Cell::new(false),
            events: InputDeviceEvents::default(),
        }))
    }

    pub fn id(&self) -> InputDeviceId {
        self.0.id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn kind(&self) -> InputDeviceType {
        self.0.kind
    }

    /// The keyboard behind this device, if it is one
    pub fn keyboard(&self) -> Option<&Keyboard> {
        self.0.keyboard.as_ref()
    }

    /// Pointer events; never fired for devices of other classes
    pub fn pointer_events(&self) -> &PointerEvents {
        &self.0.pointer
    }

    pub fn events(&self) -> &InputDeviceEvents {
        &self.0.events
    }

    pub fn is_destroyed(&self) -> bool {
        self.0.destroyed.get()
    }

    /// Report relative motion, as the device driver would
    pub fn notify_motion(&self, dx: f64, dy: f64) {
        if !self.accepts_pointer_events() {
            return;
        }
        let event = PointerMotionEvent {
            device: self.clone(),
            time_msec: self.0.clock.now().as_millis(),
            delta_x: dx,
            delta_y: dy,
        };
        self.0.pointer.motion.emit(event);
    }

    /// Close a batch of pointer events
    pub fn notify_frame(&self) {
        if self.accepts_pointer_events() {
            self.0.pointer.frame.emit(());
        }
    }

    fn accepts_pointer_events(&self) -> bool {
        if self.0.kind != InputDeviceType::Pointer {
            warn!("{} is not a pointer, dropping pointer event", self.0.name);
            return false;
        }
        !self.is_destroyed()
    }

    pub(crate) fn destroy(&self) {
        if self.0.destroyed.replace(true) {
            return;
        }
        debug!("Input device {} removed", self.0.name);
        self.0.events.destroy.emit(());
        ledger::record_destroy("input device");
    }
}

impl PartialEq for InputDevice {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for InputDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputDevice")
            .field("id", &self.0.id)
            .field("name", &self.0.name)
            .field("kind", &self.0.kind)
            .finish()
    }
}
