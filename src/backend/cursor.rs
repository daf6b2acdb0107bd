//! Cursor and cursor themes

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use log::debug;

use super::input::{InputDevice, InputDeviceType, PointerMotionEvent};
use super::layout::OutputLayout;
use super::ledger;
use super::shell::Surface;
use crate::utils::{Resource, Signal, Subscription};

/// Cursor names every theme is expected to provide
const THEME_CURSORS: &[&str] = &[
    "default",
    "left_ptr",
    "text",
    "pointer",
    "grab",
    "grabbing",
    "wait",
    "progress",
    "crosshair",
    "not-allowed",
    "move",
    "all-scroll",
    "n-resize",
    "s-resize",
    "e-resize",
    "w-resize",
    "ne-resize",
    "nw-resize",
    "se-resize",
    "sw-resize",
    "ew-resize",
    "ns-resize",
];

/// Loads cursor images from an xcursor theme
#[derive(Clone)]
pub struct XcursorManager(Rc<XcursorManagerInner>);

struct XcursorManagerInner {
    theme: Option<String>,
    size: u32,
    destroyed: Cell<bool>,
}

impl XcursorManager {
    /// `None` selects the default theme
    pub fn create(theme: Option<&str>, size: u32) -> Option<XcursorManager> {
        if size == 0 {
            return None;
        }
        ledger::record_create(Self::KIND);
        Some(XcursorManager(Rc::new(XcursorManagerInner {
            theme: theme.map(String::from),
            size,
            destroyed: Cell::new(false),
        })))
    }

    pub fn theme(&self) -> Option<&str> {
        self.0.theme.as_deref()
    }

    pub fn size(&self) -> u32 {
        self.0.size
    }

    /// Whether the theme has an image called `name`
    pub fn has_cursor(&self, name: &str) -> bool {
        !self.is_destroyed() && THEME_CURSORS.contains(&name)
    }

    pub fn is_destroyed(&self) -> bool {
        self.0.destroyed.get()
    }
}

impl Resource for XcursorManager {
    const KIND: &'static str = "xcursor manager";

    fn destroy(self) {
        if !self.0.destroyed.replace(true) {
            ledger::record_destroy(Self::KIND);
        }
    }
}

impl std::fmt::Debug for XcursorManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XcursorManager")
            .field("theme", &self.0.theme)
            .field("size", &self.0.size)
            .finish()
    }
}

/// What the cursor currently shows
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CursorImage {
    #[default]
    Hidden,
    /// Named image from a cursor theme
    Theme { name: String, size: u32 },
    /// Client-provided surface
    Surface {
        surface: Surface,
        hotspot: (i32, i32),
    },
}

#[derive(Debug, Default)]
pub struct CursorEvents {
    /// Relative motion from any attached pointer
    pub motion: Signal<PointerMotionEvent>,
    /// End of a batch of pointer events from any attached pointer
    pub frame: Signal<()>,
}

struct Attachment {
    device: InputDevice,
    _subscriptions: Vec<Subscription>,
}

/// The on-screen pointer
#[derive(Clone)]
pub struct Cursor(Rc<CursorInner>);

struct CursorInner {
    x: Cell<f64>,
    y: Cell<f64>,
    layout: RefCell<Option<OutputLayout>>,
    devices: RefCell<Vec<Attachment>>,
    image: RefCell<CursorImage>,
    destroyed: Cell<bool>,
    events: CursorEvents,
}

impl Cursor {
    pub fn create() -> Option<Cursor> {
        ledger::record_create(Self::KIND);
        Some(Cursor(Rc::new(CursorInner {
            x: Cell::new(0.0),
            y: Cell::new(0.0),
            layout: RefCell::new(None),
            devices: RefCell::new(Vec::new()),
            image: RefCell::new(CursorImage::Hidden),
            destroyed: Cell::new(false),
            events: CursorEvents::default(),
        })))
    }

    /// Confine the cursor to `layout`
    pub fn attach_output_layout(&self, layout: &OutputLayout) {
        *self.0.layout.borrow_mut() = Some(layout.clone());
    }

    /// Forward a pointer's events to the cursor's events
    ///
    /// Only pointers can be attached.
    pub fn attach_input_device(&self, device: &InputDevice) -> bool {
        if device.kind() != InputDeviceType::Pointer {
            debug!("Not attaching {:?} device {} to the cursor", device.kind(), device.name());
            return false;
        }
        if self.attached_devices().contains(device) {
            return true;
        }

        let weak: Weak<CursorInner> = Rc::downgrade(&self.0);
        let motion = device.pointer_events().motion.connect({
            let weak = weak.clone();
            move |event: &PointerMotionEvent| {
                if let Some(inner) = weak.upgrade() {
                    inner.events.motion.emit(event.clone());
                }
            }
        });
        let frame = device.pointer_events().frame.connect({
            let weak = weak.clone();
            move |_| {
                if let Some(inner) = weak.upgrade() {
                    inner.events.frame.emit(());
                }
            }
        });
        let gone = device.events().destroy.connect({
            let device = device.clone();
            move |_| {
                if let Some(inner) = weak.upgrade() {
                    Cursor(inner).detach_input_device(&device);
                }
            }
        });

        self.0.devices.borrow_mut().push(Attachment {
            device: device.clone(),
            _subscriptions: vec![motion, frame, gone],
        });
        true
    }

    pub fn detach_input_device(&self, device: &InputDevice) {
        let removed: Vec<Attachment> = {
            let mut devices = self.0.devices.borrow_mut();
            let (gone, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut *devices)
                .into_iter()
                .partition(|a| a.device == *device);
            *devices = kept;
            gone
        };
        drop(removed);
    }

    pub fn attached_devices(&self) -> Vec<InputDevice> {
        self.0
            .devices
            .borrow()
            .iter()
            .map(|a| a.device.clone())
            .collect()
    }

    pub fn position(&self) -> (f64, f64) {
        (self.0.x.get(), self.0.y.get())
    }

    /// Move by a relative delta, clamped to the attached layout
    ///
    /// A layout without outputs has no closest point; the cursor then snaps
    /// to the origin.
    pub fn move_by(&self, _device: Option<&InputDevice>, dx: f64, dy: f64) {
        let (x, y) = (self.0.x.get() + dx, self.0.y.get() + dy);
        let (x, y) = match &*self.0.layout.borrow() {
            Some(layout) => layout.closest_point(x, y).unwrap_or((0.0, 0.0)),
            None => (x, y),
        };
        self.0.x.set(x);
        self.0.y.set(y);
    }

    /// Show the theme image `name`
    ///
    /// Names the theme does not have leave the image unchanged.
    pub fn set_xcursor(&self, manager: &XcursorManager, name: &str) {
        if !manager.has_cursor(name) {
            debug!("Cursor theme has no image {:?}", name);
            return;
        }
        *self.0.image.borrow_mut() = CursorImage::Theme {
            name: name.to_string(),
            size: manager.size(),
        };
    }

    /// Show a client surface, or hide the cursor with `None`
    pub fn set_surface(&self, surface: Option<&Surface>, hotspot_x: i32, hotspot_y: i32) {
        *self.0.image.borrow_mut() = match surface {
            Some(surface) => CursorImage::Surface {
                surface: surface.clone(),
                hotspot: (hotspot_x, hotspot_y),
            },
            None => CursorImage::Hidden,
        };
    }

    pub fn image(&self) -> CursorImage {
        self.0.image.borrow().clone()
    }

    pub fn events(&self) -> &CursorEvents {
        &self.0.events
    }

    pub fn is_destroyed(&self) -> bool {
        self.0.destroyed.get()
    }
}

impl Resource for Cursor {
    const KIND: &'static str = "cursor";

    fn destroy(self) {
        if self.0.destroyed.replace(true) {
            return;
        }
        let devices = std::mem::take(&mut *self.0.devices.borrow_mut());
        drop(devices);
        self.0.layout.borrow_mut().take();
        ledger::record_destroy(Self::KIND);
    }
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("position", &self.position())
            .field("image", &self.0.image.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::shell::ClientId;

    #[test]
    fn test_unknown_xcursor_keeps_image() {
        let manager = XcursorManager::create(None, 24).unwrap();
        let cursor = Cursor::create().unwrap();

        cursor.set_xcursor(&manager, "default");
        cursor.set_xcursor(&manager, "no-such-cursor");
        assert_eq!(
            cursor.image(),
            CursorImage::Theme {
                name: "default".to_string(),
                size: 24
            }
        );

        cursor.destroy();
        manager.destroy();
    }

    #[test]
    fn test_set_surface_and_hide() {
        let cursor = Cursor::create().unwrap();
        let surface = Surface::new(ClientId::new());

        cursor.set_surface(Some(&surface), 3, 4);
        assert_eq!(
            cursor.image(),
            CursorImage::Surface {
                surface: surface.clone(),
                hotspot: (3, 4)
            }
        );
        cursor.set_surface(None, 0, 0);
        assert_eq!(cursor.image(), CursorImage::Hidden);

        surface.destroy();
        cursor.destroy();
    }

    #[test]
    fn test_snaps_to_origin_without_outputs() {
        let cursor = Cursor::create().unwrap();
        let layout = OutputLayout::create().unwrap();

        cursor.move_by(None, 10.0, 10.0);
        assert_eq!(cursor.position(), (10.0, 10.0));

        cursor.attach_output_layout(&layout);
        cursor.move_by(None, 10.0, 10.0);
        assert_eq!(cursor.position(), (0.0, 0.0));

        cursor.destroy();
        layout.destroy();
    }

    #[test]
    fn test_only_pointers_attach() {
        let cursor = Cursor::create().unwrap();
        let pointer = InputDevice::new("ptr", InputDeviceType::Pointer);
        let keyboard = InputDevice::new("kbd", InputDeviceType::Keyboard);
        let motions = Rc::new(Cell::new(0));
        let _sub = {
            let motions = motions.clone();
            cursor.events().motion.connect(move |_| motions.set(motions.get() + 1))
        };

        assert!(cursor.attach_input_device(&pointer));
        assert!(!cursor.attach_input_device(&keyboard));
        pointer.notify_motion(1.0, 1.0);
        assert_eq!(motions.get(), 1);

        pointer.destroy();
        assert!(cursor.attached_devices().is_empty());
        keyboard.destroy();
        cursor.destroy();
    }
}
