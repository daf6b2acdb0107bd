//! The display endpoint and the protocol objects created from it
//!
//! Each protocol global is created the first time it is asked for and
//! reused afterwards.

use log::info;

use crate::backend::{
    Compositor, DataDeviceManager, Display, Renderer, Subcompositor, XdgShell,
};
use crate::error::Error;
use crate::utils::Handle;

/// Owns the display and the globals hanging off it
///
/// The display is declared last so it outlives the globals.
pub struct DisplayEndpoint {
    compositor: Option<Compositor>,
    subcompositor: Option<Subcompositor>,
    data_device_manager: Option<DataDeviceManager>,
    xdg_shell: Option<XdgShell>,
    display: Handle<Display>,
}

impl DisplayEndpoint {
    /// Create the display
    pub fn create() -> Result<Self, Error> {
        let display = Handle::create(Display::create)?;
        Ok(Self {
            compositor: None,
            subcompositor: None,
            data_device_manager: None,
            xdg_shell: None,
            display,
        })
    }

    pub fn display(&self) -> &Display {
        &self.display
    }

    /// The `wl_compositor` global, created on first use
    pub fn init_compositor(&mut self, version: u32, renderer: &Renderer) -> Result<&Compositor, Error> {
        if self.compositor.is_none() {
            self.compositor = Compositor::create(&self.display, version, renderer);
        }
        self.compositor
            .as_ref()
            .ok_or(Error::ResourceCreation("wl_compositor"))
    }

    /// The `wl_subcompositor` global, created on first use
    pub fn init_subcompositor(&mut self) -> Result<&Subcompositor, Error> {
        if self.subcompositor.is_none() {
            self.subcompositor = Subcompositor::create(&self.display);
        }
        self.subcompositor
            .as_ref()
            .ok_or(Error::ResourceCreation("wl_subcompositor"))
    }

    /// The `wl_data_device_manager` global, created on first use
    pub fn init_data_device_manager(&mut self) -> Result<&DataDeviceManager, Error> {
        if self.data_device_manager.is_none() {
            self.data_device_manager = DataDeviceManager::create(&self.display);
        }
        self.data_device_manager
            .as_ref()
            .ok_or(Error::ResourceCreation("wl_data_device_manager"))
    }

    /// The `xdg_wm_base` global, created on first use
    pub fn init_xdg_shell(&mut self, version: u32) -> Result<&XdgShell, Error> {
        if self.xdg_shell.is_none() {
            self.xdg_shell = XdgShell::create(&self.display, version);
            if self.xdg_shell.is_some() {
                info!("xdg_wm_base v{} ready", version);
            }
        }
        self.xdg_shell
            .as_ref()
            .ok_or(Error::ResourceCreation("xdg_wm_base"))
    }

    pub fn compositor(&self) -> Option<&Compositor> {
        self.compositor.as_ref()
    }

    pub fn subcompositor(&self) -> Option<&Subcompositor> {
        self.subcompositor.as_ref()
    }

    pub fn data_device_manager(&self) -> Option<&DataDeviceManager> {
        self.data_device_manager.as_ref()
    }

    pub fn xdg_shell(&self) -> Option<&XdgShell> {
        self.xdg_shell.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ledger, Backend};
    use crate::utils::Resource;

    #[test]
    fn test_globals_created_once() {
        let before = ledger::snapshot();
        let mut endpoint = DisplayEndpoint::create().unwrap();
        let backend = Backend::create(endpoint.display(), "headless").unwrap();
        let renderer = Renderer::autocreate(&backend).unwrap();

        let first = endpoint.init_compositor(5, &renderer).unwrap().clone();
        let second = endpoint.init_compositor(5, &renderer).unwrap().clone();
        assert_eq!(first.version(), 5);
        endpoint.init_subcompositor().unwrap();
        assert_eq!(endpoint.init_subcompositor().unwrap().version(), 1);
        assert_eq!(endpoint.init_data_device_manager().unwrap().version(), 3);
        assert_eq!(endpoint.init_xdg_shell(3).unwrap().version(), 3);
        assert_eq!(endpoint.init_xdg_shell(3).unwrap().version(), 3);

        let interfaces: Vec<_> = endpoint
            .display()
            .globals()
            .iter()
            .map(|g| g.interface())
            .collect();
        assert_eq!(
            interfaces,
            vec![
                "wl_compositor",
                "wl_subcompositor",
                "wl_data_device_manager",
                "xdg_wm_base"
            ]
        );
        assert_eq!(first.surfaces().len(), second.surfaces().len());

        renderer.destroy();
        backend.destroy();
        drop(endpoint);
        assert!(ledger::snapshot().since(&before).is_balanced());
    }

    #[test]
    fn test_surfaces_destroyed_with_display() {
        let mut endpoint = DisplayEndpoint::create().unwrap();
        let backend = Backend::create(endpoint.display(), "headless").unwrap();
        let renderer = Renderer::autocreate(&backend).unwrap();
        let surface = endpoint
            .init_compositor(5, &renderer)
            .unwrap()
            .create_surface(crate::backend::ClientId::new());

        renderer.destroy();
        backend.destroy();
        drop(endpoint);
        assert!(surface.is_destroyed());
    }
}
