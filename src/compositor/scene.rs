//! Placement of client windows in the scene

use log::{debug, warn};

use crate::backend::{XdgSurface, XdgSurfaceRole};
use crate::compositor::CompositorState;

impl CompositorState {
    /// Put a new toplevel in front of everything else
    ///
    /// Popups and role-less surfaces are not placed here.
    pub fn handle_new_xdg_surface(&mut self, xdg_surface: &XdgSurface) {
        if xdg_surface.role() != XdgSurfaceRole::Toplevel {
            debug!("Ignoring {:?} xdg surface", xdg_surface.role());
            return;
        }

        let root = self.scene.root();
        match self.scene.xdg_surface_create(root, xdg_surface) {
            Some(node) => {
                self.scene.raise_to_top(node);
                debug!(
                    "Toplevel {:?} of client {:?} mapped as {:?}",
                    xdg_surface.surface().id(),
                    xdg_surface.surface().client(),
                    node
                );
            }
            None => warn!("Failed to add {:?} to the scene", xdg_surface.surface().id()),
        }
    }
}
