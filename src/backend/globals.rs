//! Core protocol globals: compositor, subcompositor, data device manager
//!
//! These objects belong to the display and are torn down with it.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use log::debug;
use wayland_server::protocol::{wl_compositor, wl_data_device_manager, wl_subcompositor};

use super::display::{Display, Global};
use super::render::Renderer;
use super::shell::{ClientId, Surface};
use crate::utils::Subscription;

/// The `wl_compositor` global; creates client surfaces
#[derive(Clone)]
pub struct Compositor(Rc<CompositorInner>);

struct CompositorInner {
    global: Global,
    renderer: Renderer,
    surfaces: RefCell<Vec<Surface>>,
    display_destroy: RefCell<Option<Subscription>>,
}

impl Compositor {
    pub fn create(display: &Display, version: u32, renderer: &Renderer) -> Option<Compositor> {
        if display.is_destroyed() {
            return None;
        }
        let compositor = Compositor(Rc::new(CompositorInner {
            global: display.advertise::<wl_compositor::WlCompositor, _>(version, ()),
            renderer: renderer.clone(),
            surfaces: RefCell::new(Vec::new()),
            display_destroy: RefCell::new(None),
        }));

        let weak: Weak<CompositorInner> = Rc::downgrade(&compositor.0);
        let sub = display.events().destroy.connect(move |_| {
            if let Some(inner) = weak.upgrade() {
                Compositor(inner).destroy_surfaces();
            }
        });
        *compositor.0.display_destroy.borrow_mut() = Some(sub);
        display.with_protocol(|protocol| protocol.set_compositor(&compositor));
        Some(compositor)
    }

    pub fn version(&self) -> u32 {
        self.0.global.version()
    }

    pub fn renderer(&self) -> &Renderer {
        &self.0.renderer
    }

    /// Create a surface on behalf of `client`
    pub fn create_surface(&self, client: ClientId) -> Surface {
        let surface = Surface::new(client);
        let mut surfaces = self.0.surfaces.borrow_mut();
        surfaces.retain(|s| !s.is_destroyed());
        surfaces.push(surface.clone());
        debug!("Client {:?} created surface {:?}", client, surface.id());
        surface
    }

    /// Live surfaces
    pub fn surfaces(&self) -> Vec<Surface> {
        self.0
            .surfaces
            .borrow()
            .iter()
            .filter(|s| !s.is_destroyed())
            .cloned()
            .collect()
    }

    fn destroy_surfaces(&self) {
        let surfaces = std::mem::take(&mut *self.0.surfaces.borrow_mut());
        for surface in surfaces {
            surface.destroy();
        }
    }
}

impl std::fmt::Debug for Compositor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compositor")
            .field("version", &self.version())
            .field("surfaces", &self.0.surfaces.borrow().len())
            .finish()
    }
}

/// The `wl_subcompositor` global
#[derive(Debug, Clone)]
pub struct Subcompositor(Global);

impl Subcompositor {
    pub fn create(display: &Display) -> Option<Subcompositor> {
        if display.is_destroyed() {
            return None;
        }
        Some(Subcompositor(
            display.advertise::<wl_subcompositor::WlSubcompositor, _>(1, ()),
        ))
    }

    pub fn version(&self) -> u32 {
        self.0.version()
    }
}

/// The `wl_data_device_manager` global
#[derive(Debug, Clone)]
pub struct DataDeviceManager(Global);

impl DataDeviceManager {
    pub fn create(display: &Display) -> Option<DataDeviceManager> {
        if display.is_destroyed() {
            return None;
        }
        Some(DataDeviceManager(
            display.advertise::<wl_data_device_manager::WlDataDeviceManager, _>(3, ()),
        ))
    }

    pub fn version(&self) -> u32 {
        self.0.version()
    }
}
