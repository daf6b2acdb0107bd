//! The `wl_seat` global

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

use log::{debug, warn};
use wayland_server::protocol::wl_seat;

use super::display::{Display, Global};
use super::input::Keyboard;
use super::ledger;
use super::protocol::SeatGlobal;
use super::shell::{ClientId, Surface};
use crate::utils::{Resource, Signal};

/// A client bound to the seat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SeatClient {
    client: ClientId,
}

impl SeatClient {
    pub fn client(&self) -> ClientId {
        self.client
    }
}

/// A client asked for its own cursor image
#[derive(Debug, Clone)]
pub struct RequestSetCursorEvent {
    /// The requesting client
    pub seat_client: SeatClient,
    /// New image; `None` hides the cursor
    pub surface: Option<Surface>,
    pub serial: u32,
    pub hotspot_x: i32,
    pub hotspot_y: i32,
}

#[derive(Debug, Default)]
pub struct SeatEvents {
    pub request_set_cursor: Signal<RequestSetCursorEvent>,
    pub destroy: Signal<()>,
}

struct PointerFocus {
    client: SeatClient,
    surface: Surface,
    sx: f64,
    sy: f64,
}

/// Seat: keyboard and pointer focus for clients
#[derive(Clone)]
pub struct Seat(Rc<SeatInner>);

struct SeatInner {
    name: String,
    global: Global,
    wire: Arc<SeatGlobal>,
    keyboard: RefCell<Option<Keyboard>>,
    pointer_focus: RefCell<Option<PointerFocus>>,
    pointer_frames: Cell<u64>,
    serial: Cell<u32>,
    destroyed: Cell<bool>,
    events: SeatEvents,
}

impl Seat {
    /// Create a seat and advertise it to clients
    pub fn create(display: &Display, name: &str) -> Option<Seat> {
        if display.is_destroyed() {
            return None;
        }
        let wire = SeatGlobal::new(name);
        ledger::record_create(Self::KIND);
        let seat = Seat(Rc::new(SeatInner {
            name: name.to_string(),
            global: display.advertise::<wl_seat::WlSeat, _>(7, wire.clone()),
            wire,
            keyboard: RefCell::new(None),
            pointer_focus: RefCell::new(None),
            pointer_frames: Cell::new(0),
            serial: Cell::new(0),
            destroyed: Cell::new(false),
            events: SeatEvents::default(),
        }));
        display.with_protocol(|protocol| protocol.add_seat(&seat));
        Some(seat)
    }

    /// Seat name (e.g., "seat0")
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Make `keyboard` the seat's active keyboard
    pub fn set_keyboard(&self, keyboard: Option<&Keyboard>) {
        *self.0.keyboard.borrow_mut() = keyboard.cloned();
    }

    pub fn keyboard(&self) -> Option<Keyboard> {
        self.0.keyboard.borrow().clone()
    }

    /// Advertise `wl_seat` capability flags to clients
    pub fn set_capabilities(&self, capabilities: u32) {
        if self.0.wire.set_capabilities(capabilities) {
            debug!("Seat {} capabilities: {:#x}", self.0.name, capabilities);
        }
    }

    pub fn capabilities(&self) -> u32 {
        self.0.wire.capabilities()
    }

    /// Number of `wl_seat` objects clients currently hold
    pub fn bound_count(&self) -> usize {
        self.0.wire.bound_count()
    }

    /// Give pointer focus to `surface` at surface-local (sx, sy)
    pub fn pointer_notify_enter(&self, surface: &Surface, sx: f64, sy: f64) -> u32 {
        let serial = self.next_serial();
        debug!("Pointer entered {:?} of client {:?}", surface.id(), surface.client());
        *self.0.pointer_focus.borrow_mut() = Some(PointerFocus {
            client: SeatClient {
                client: surface.client(),
            },
            surface: surface.clone(),
            sx,
            sy,
        });
        serial
    }

    pub fn pointer_clear_focus(&self) {
        self.0.pointer_focus.borrow_mut().take();
    }

    /// The client whose surface has pointer focus
    pub fn pointer_focused_client(&self) -> Option<SeatClient> {
        self.0
            .pointer_focus
            .borrow()
            .as_ref()
            .filter(|f| !f.surface.is_destroyed())
            .map(|f| f.client)
    }

    /// Surface-local position of the pointer on the focused surface
    pub fn pointer_focus_position(&self) -> Option<(f64, f64)> {
        self.0.pointer_focus.borrow().as_ref().map(|f| (f.sx, f.sy))
    }

    /// Close a batch of pointer events sent to the focused client
    pub fn pointer_notify_frame(&self) {
        self.0.pointer_frames.set(self.0.pointer_frames.get() + 1);
    }

    /// Number of pointer frames sent
    pub fn pointer_frame_count(&self) -> u64 {
        self.0.pointer_frames.get()
    }

    /// `wl_pointer.set_cursor` sent by `client`
    pub fn request_set_cursor(
        &self,
        client: ClientId,
        surface: Option<&Surface>,
        serial: u32,
        hotspot_x: i32,
        hotspot_y: i32,
    ) {
        if self.is_destroyed() {
            warn!("set_cursor on destroyed seat {}", self.0.name);
            return;
        }
        self.0.events.request_set_cursor.emit(RequestSetCursorEvent {
            seat_client: SeatClient { client },
            surface: surface.cloned(),
            serial,
            hotspot_x,
            hotspot_y,
        });
    }

    pub fn events(&self) -> &SeatEvents {
        &self.0.events
    }

    pub fn is_destroyed(&self) -> bool {
        self.0.destroyed.get()
    }

    fn next_serial(&self) -> u32 {
        let serial = self.0.serial.get().wrapping_add(1);
        self.0.serial.set(serial);
        serial
    }
}

impl Resource for Seat {
    const KIND: &'static str = "seat";

    fn destroy(self) {
        if self.0.destroyed.replace(true) {
            return;
        }
        self.0.events.destroy.emit(());
        self.0.keyboard.borrow_mut().take();
        self.0.pointer_focus.borrow_mut().take();
        self.0.global.destroy();
        ledger::record_destroy(Self::KIND);
    }
}

impl std::fmt::Debug for Seat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Seat")
            .field("name", &self.0.name)
            .field("keyboard", &self.0.keyboard.borrow())
            .finish()
    }
}
