//! Client surfaces and the xdg shell
//!
//! Clients are identified by a [`ClientId`]. The requests a client sends
//! are exposed as methods, called by the protocol dispatch or directly.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;
use wayland_protocols::xdg::shell::server::xdg_wm_base;

use super::display::{Display, Global};
use super::ledger;
use crate::utils::{Signal, Subscription, Time};

/// Unique identifier for clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub u64);

impl ClientId {
    /// Allocate an identifier for a newly connected client
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        ClientId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique identifier for surfaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(pub u64);

impl SurfaceId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        SurfaceId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Default)]
pub struct SurfaceEvents {
    /// The compositor presented a frame showing the surface
    pub frame: Signal<Time>,
    pub destroy: Signal<()>,
}

/// A client surface
#[derive(Clone)]
pub struct Surface(Rc<SurfaceInner>);

struct SurfaceInner {
    id: SurfaceId,
    client: ClientId,
    frame_done: Cell<Option<Time>>,
    destroyed: Cell<bool>,
    events: SurfaceEvents,
}

impl Surface {
    pub(crate) fn new(client: ClientId) -> Surface {
        ledger::record_create("surface");
        Surface(Rc::new(SurfaceInner {
            id: SurfaceId::new(),
            client,
            frame_done: Cell::new(None),
            destroyed: Cell::new(false),
            events: SurfaceEvents::default(),
        }))
    }

    pub fn id(&self) -> SurfaceId {
        self.0.id
    }

    /// The client owning this surface
    pub fn client(&self) -> ClientId {
        self.0.client
    }

    /// Tell the client its last frame has been presented
    pub fn send_frame_done(&self, time: Time) {
        if !self.is_destroyed() {
            self.0.frame_done.set(Some(time));
            self.0.events.frame.emit(time);
        }
    }

    /// Time of the last frame-done notification
    pub fn last_frame_done(&self) -> Option<Time> {
        self.0.frame_done.get()
    }

    pub fn events(&self) -> &SurfaceEvents {
        &self.0.events
    }

    pub fn is_destroyed(&self) -> bool {
        self.0.destroyed.get()
    }

    /// Destroy the surface, as a client disconnecting or closing it would
    pub fn destroy(&self) {
        if self.0.destroyed.replace(true) {
            return;
        }
        debug!("Surface {:?} destroyed", self.0.id);
        self.0.events.destroy.emit(());
        ledger::record_destroy("surface");
    }
}

impl PartialEq for Surface {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Surface")
            .field("id", &self.0.id)
            .field("client", &self.0.client)
            .finish()
    }
}

/// Role an xdg surface was given by its client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum XdgSurfaceRole {
    /// No role assigned yet
    #[default]
    None,
    /// Top-level window
    Toplevel,
    /// Popup attached to a parent surface
    Popup,
}

/// Top-level window state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XdgToplevel {
    pub title: Option<String>,
    pub app_id: Option<String>,
}

/// An `xdg_surface` wrapping a client surface
#[derive(Clone)]
pub struct XdgSurface(Rc<XdgSurfaceInner>);

struct XdgSurfaceInner {
    surface: Surface,
    role: XdgSurfaceRole,
    toplevel: Option<XdgToplevel>,
}

impl XdgSurface {
    pub fn surface(&self) -> &Surface {
        &self.0.surface
    }

    pub fn role(&self) -> XdgSurfaceRole {
        self.0.role
    }

    /// Top-level state, present only for the toplevel role
    pub fn toplevel(&self) -> Option<&XdgToplevel> {
        self.0.toplevel.as_ref()
    }
}

impl PartialEq for XdgSurface {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for XdgSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XdgSurface")
            .field("surface", &self.0.surface)
            .field("role", &self.0.role)
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct XdgShellEvents {
    /// A client created an xdg surface
    pub new_surface: Signal<XdgSurface>,
}

/// The `xdg_wm_base` global
#[derive(Clone)]
pub struct XdgShell(Rc<XdgShellInner>);

struct XdgShellInner {
    global: Global,
    surfaces: RefCell<Vec<(XdgSurface, Subscription)>>,
    events: XdgShellEvents,
}

impl XdgShell {
    pub fn create(display: &Display, version: u32) -> Option<XdgShell> {
        if display.is_destroyed() {
            return None;
        }
        let shell = XdgShell(Rc::new(XdgShellInner {
            global: display.advertise::<xdg_wm_base::XdgWmBase, _>(version, ()),
            surfaces: RefCell::new(Vec::new()),
            events: XdgShellEvents::default(),
        }));
        display.with_protocol(|protocol| protocol.set_xdg_shell(&shell));
        Some(shell)
    }

    pub fn version(&self) -> u32 {
        self.0.global.version()
    }

    pub fn events(&self) -> &XdgShellEvents {
        &self.0.events
    }

    /// Give `surface` the toplevel role, as `xdg_surface.get_toplevel` does
    pub fn get_toplevel(&self, surface: &Surface, title: Option<&str>) -> XdgSurface {
        self.announce(
            surface,
            XdgSurfaceRole::Toplevel,
            Some(XdgToplevel {
                title: title.map(String::from),
                app_id: None,
            }),
        )
    }

    /// Give `surface` the popup role
    pub fn get_popup(&self, surface: &Surface) -> XdgSurface {
        self.announce(surface, XdgSurfaceRole::Popup, None)
    }

    /// Live xdg surfaces
    pub fn surfaces(&self) -> Vec<XdgSurface> {
        self.0.surfaces.borrow().iter().map(|(s, _)| s.clone()).collect()
    }

    fn announce(
        &self,
        surface: &Surface,
        role: XdgSurfaceRole,
        toplevel: Option<XdgToplevel>,
    ) -> XdgSurface {
        let xdg_surface = XdgSurface(Rc::new(XdgSurfaceInner {
            surface: surface.clone(),
            role,
            toplevel,
        }));

        let weak: Weak<XdgShellInner> = Rc::downgrade(&self.0);
        let id = surface.id();
        let sub = surface.events().destroy.connect(move |_| {
            if let Some(inner) = weak.upgrade() {
                let removed: Vec<_> = {
                    let mut surfaces = inner.surfaces.borrow_mut();
                    let (gone, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut *surfaces)
                        .into_iter()
                        .partition(|(s, _)| s.surface().id() == id);
                    *surfaces = kept;
                    gone
                };
                drop(removed);
            }
        });
        self.0
            .surfaces
            .borrow_mut()
            .push((xdg_surface.clone(), sub));

        self.0.events.new_surface.emit(xdg_surface.clone());
        xdg_surface
    }
}

impl std::fmt::Debug for XdgShell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XdgShell")
            .field("version", &self.version())
            .field("surfaces", &self.0.surfaces.borrow().len())
            .finish()
    }
}
