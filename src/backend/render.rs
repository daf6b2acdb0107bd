//! Software renderer and buffer allocator

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use log::{debug, warn};
use wayland_server::protocol::wl_shm;

use super::display::{Display, Global};
use super::headless::Backend;
use super::ledger;
use crate::utils::Resource;

/// Renderer picked for a backend
#[derive(Clone)]
pub struct Renderer(Rc<RendererInner>);

struct RendererInner {
    name: &'static str,
    shm: RefCell<Option<Global>>,
    destroyed: Cell<bool>,
}

impl Renderer {
    /// Pick a renderer able to draw for `backend`
    pub fn autocreate(backend: &Backend) -> Option<Renderer> {
        if backend.is_destroyed() {
            warn!("Cannot create a renderer for a destroyed backend");
            return None;
        }
        debug!("Using the pixman renderer for the {} backend", backend.name());
        ledger::record_create(Self::KIND);
        Some(Renderer(Rc::new(RendererInner {
            name: "pixman",
            shm: RefCell::new(None),
            destroyed: Cell::new(false),
        })))
    }

    pub fn name(&self) -> &'static str {
        self.0.name
    }

    /// Advertise the buffer globals this renderer can import from
    pub fn init_wl_display(&self, display: &Display) -> bool {
        let mut shm = self.0.shm.borrow_mut();
        if shm.is_none() {
            *shm = Some(display.advertise::<wl_shm::WlShm, _>(1, ()));
        }
        true
    }

    pub fn is_destroyed(&self) -> bool {
        self.0.destroyed.get()
    }
}

impl Resource for Renderer {
    const KIND: &'static str = "renderer";

    fn destroy(self) {
        if self.0.destroyed.replace(true) {
            warn!("Renderer destroyed twice");
            return;
        }
        ledger::record_destroy(Self::KIND);
    }
}

impl PartialEq for Renderer {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Renderer").field(&self.0.name).finish()
    }
}

/// Allocates buffers a renderer can draw into
#[derive(Clone)]
pub struct Allocator(Rc<AllocatorInner>);

struct AllocatorInner {
    destroyed: Cell<bool>,
}

impl Allocator {
    /// Pick an allocator compatible with both `backend` and `renderer`
    pub fn autocreate(backend: &Backend, renderer: &Renderer) -> Option<Allocator> {
        if backend.is_destroyed() || renderer.is_destroyed() {
            warn!("Cannot create an allocator for destroyed resources");
            return None;
        }
        ledger::record_create(Self::KIND);
        Some(Allocator(Rc::new(AllocatorInner {
            destroyed: Cell::new(false),
        })))
    }

    pub fn is_destroyed(&self) -> bool {
        self.0.destroyed.get()
    }
}

impl Resource for Allocator {
    const KIND: &'static str = "allocator";

    fn destroy(self) {
        if self.0.destroyed.replace(true) {
            warn!("Allocator destroyed twice");
            return;
        }
        ledger::record_destroy(Self::KIND);
    }
}

impl PartialEq for Allocator {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for Allocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Allocator").finish_non_exhaustive()
    }
}
