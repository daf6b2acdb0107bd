//! Wire protocol dispatch
//!
//! Requests from connected clients are turned into calls on the toolkit
//! objects registered here. Objects the compositor has no use for are
//! created so clients can proceed, and their requests are ignored.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, warn};
use wayland_protocols::xdg::shell::server::{
    xdg_popup, xdg_positioner, xdg_surface, xdg_toplevel, xdg_wm_base,
};
use wayland_server::backend::{ClientId as ConnectionId, DisconnectReason};
use wayland_server::protocol::{
    wl_buffer, wl_callback, wl_compositor, wl_data_device, wl_data_device_manager,
    wl_data_source, wl_keyboard, wl_pointer, wl_region, wl_seat, wl_shm, wl_shm_pool,
    wl_subcompositor, wl_subsurface, wl_surface, wl_touch,
};
use wayland_server::{
    backend::ClientData, Client, DataInit, Dispatch, DisplayHandle, GlobalDispatch, New,
    Resource,
};

use super::globals::Compositor;
use super::seat::Seat;
use super::shell::{ClientId, Surface, SurfaceId, XdgShell};
use crate::utils::{Subscription, Time};

/// Data attached to every client connection
#[derive(Debug)]
pub struct ClientState {
    id: ClientId,
}

impl ClientState {
    pub fn new() -> Self {
        Self { id: ClientId::new() }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }
}

impl Default for ClientState {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientData for ClientState {
    fn initialized(&self, _client_id: ConnectionId) {
        debug!("Client {:?} initialized", self.id);
    }

    fn disconnected(&self, _client_id: ConnectionId, reason: DisconnectReason) {
        debug!("Client {:?} disconnected: {:?}", self.id, reason);
    }
}

fn client_id(client: &Client) -> ClientId {
    match client.get_data::<ClientState>() {
        Some(data) => data.id(),
        None => {
            warn!("Client {:?} has no client state", client.id());
            ClientId::new()
        }
    }
}

/// `wl_seat` global data shared by the toolkit seat and bound resources
#[derive(Debug)]
pub struct SeatGlobal {
    name: String,
    capabilities: AtomicU32,
    resources: Mutex<Vec<wl_seat::WlSeat>>,
}

impl SeatGlobal {
    pub(crate) fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            capabilities: AtomicU32::new(0),
            resources: Mutex::new(Vec::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capabilities(&self) -> u32 {
        self.capabilities.load(Ordering::Relaxed)
    }

    /// Store new capabilities and send them to every bound `wl_seat`
    ///
    /// Returns whether the capabilities changed.
    pub(crate) fn set_capabilities(&self, capabilities: u32) -> bool {
        if self.capabilities.swap(capabilities, Ordering::Relaxed) == capabilities {
            return false;
        }
        if let Ok(mut resources) = self.resources.lock() {
            resources.retain(|seat| seat.is_alive());
            for seat in resources.iter() {
                seat.capabilities(wl_seat::Capability::from_bits_truncate(capabilities));
            }
        }
        true
    }

    /// Number of live `wl_seat` resources
    pub fn bound_count(&self) -> usize {
        self.resources
            .lock()
            .map(|resources| resources.iter().filter(|seat| seat.is_alive()).count())
            .unwrap_or(0)
    }

    fn add_resource(&self, seat: wl_seat::WlSeat) {
        if let Ok(mut resources) = self.resources.lock() {
            resources.push(seat);
        }
    }

    fn remove_resource(&self, seat: &wl_seat::WlSeat) {
        if let Ok(mut resources) = self.resources.lock() {
            resources.retain(|s| s != seat);
        }
    }
}

struct SurfaceRecord {
    surface: Surface,
    callbacks: Rc<RefCell<Vec<wl_callback::WlCallback>>>,
    _frame: Subscription,
}

/// Dispatch state of the wayland display
///
/// Holds the toolkit objects client requests are routed to.
#[derive(Default)]
pub struct ProtocolState {
    compositor: Option<Compositor>,
    xdg_shell: Option<XdgShell>,
    seats: Vec<Seat>,
    surfaces: HashMap<SurfaceId, SurfaceRecord>,
    serial: u32,
}

impl ProtocolState {
    pub(crate) fn set_compositor(&mut self, compositor: &Compositor) {
        self.compositor = Some(compositor.clone());
    }

    pub(crate) fn set_xdg_shell(&mut self, xdg_shell: &XdgShell) {
        self.xdg_shell = Some(xdg_shell.clone());
    }

    pub(crate) fn add_seat(&mut self, seat: &Seat) {
        self.seats.push(seat.clone());
    }

    /// Toolkit surface behind a client's `wl_surface`
    pub fn surface(&self, id: SurfaceId) -> Option<Surface> {
        self.surfaces.get(&id).map(|record| record.surface.clone())
    }

    /// Number of surfaces created by connected clients
    pub fn surface_count(&self) -> usize {
        self.surfaces.len()
    }

    /// Drop every routed object, destroying client surfaces
    pub(crate) fn clear(&mut self) {
        for (_, record) in self.surfaces.drain() {
            record.surface.destroy();
        }
        self.seats.clear();
        self.xdg_shell = None;
        self.compositor = None;
    }

    fn next_serial(&mut self) -> u32 {
        self.serial = self.serial.wrapping_add(1);
        self.serial
    }

    fn seat(&self, name: &str) -> Option<&Seat> {
        self.seats
            .iter()
            .find(|seat| !seat.is_destroyed() && seat.name() == name)
    }
}

impl std::fmt::Debug for ProtocolState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolState")
            .field("surfaces", &self.surfaces.len())
            .field("seats", &self.seats.len())
            .field("serial", &self.serial)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// wl_compositor
// ============================================================================

impl GlobalDispatch<wl_compositor::WlCompositor, ()> for ProtocolState {
    fn bind(
        _state: &mut Self,
        _handle: &DisplayHandle,
        _client: &Client,
        resource: New<wl_compositor::WlCompositor>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        debug!("Client bound wl_compositor");
        data_init.init(resource, ());
    }
}

impl Dispatch<wl_compositor::WlCompositor, ()> for ProtocolState {
    fn request(
        state: &mut Self,
        client: &Client,
        _resource: &wl_compositor::WlCompositor,
        request: wl_compositor::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            wl_compositor::Request::CreateSurface { id } => {
                let client = client_id(client);
                let surface = match &state.compositor {
                    Some(compositor) => compositor.create_surface(client),
                    None => {
                        warn!("wl_surface created without a compositor");
                        Surface::new(client)
                    }
                };

                let callbacks: Rc<RefCell<Vec<wl_callback::WlCallback>>> = Rc::default();
                let frame = surface.events().frame.connect({
                    let callbacks = callbacks.clone();
                    move |time: &Time| {
                        for callback in callbacks.borrow_mut().drain(..) {
                            callback.done(time.as_millis());
                        }
                    }
                });

                data_init.init(id, surface.id());
                state.surfaces.insert(
                    surface.id(),
                    SurfaceRecord {
                        surface,
                        callbacks,
                        _frame: frame,
                    },
                );
            }
            wl_compositor::Request::CreateRegion { id } => {
                data_init.init(id, ());
            }
            _ => {}
        }
    }
}

impl Dispatch<wl_surface::WlSurface, SurfaceId> for ProtocolState {
    fn request(
        state: &mut Self,
        _client: &Client,
        _resource: &wl_surface::WlSurface,
        request: wl_surface::Request,
        data: &SurfaceId,
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            wl_surface::Request::Frame { callback } => {
                let callback = data_init.init(callback, ());
                match state.surfaces.get(data) {
                    Some(record) => record.callbacks.borrow_mut().push(callback),
                    None => warn!("Frame callback for unknown surface {:?}", data),
                }
            }
            wl_surface::Request::Commit => {
                debug!("Surface {:?} commit", data);
            }
            _ => {}
        }
    }

    fn destroyed(
        state: &mut Self,
        _client: ConnectionId,
        _resource: &wl_surface::WlSurface,
        data: &SurfaceId,
    ) {
        if let Some(record) = state.surfaces.remove(data) {
            record.surface.destroy();
        }
    }
}

impl Dispatch<wl_region::WlRegion, ()> for ProtocolState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &wl_region::WlRegion,
        _request: wl_region::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
    }
}

impl Dispatch<wl_callback::WlCallback, ()> for ProtocolState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &wl_callback::WlCallback,
        _request: wl_callback::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
    }
}

// ============================================================================
// wl_subcompositor
// ============================================================================

impl GlobalDispatch<wl_subcompositor::WlSubcompositor, ()> for ProtocolState {
    fn bind(
        _state: &mut Self,
        _handle: &DisplayHandle,
        _client: &Client,
        resource: New<wl_subcompositor::WlSubcompositor>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        debug!("Client bound wl_subcompositor");
        data_init.init(resource, ());
    }
}

impl Dispatch<wl_subcompositor::WlSubcompositor, ()> for ProtocolState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &wl_subcompositor::WlSubcompositor,
        request: wl_subcompositor::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        if let wl_subcompositor::Request::GetSubsurface { id, .. } = request {
            data_init.init(id, ());
        }
    }
}

impl Dispatch<wl_subsurface::WlSubsurface, ()> for ProtocolState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &wl_subsurface::WlSubsurface,
        _request: wl_subsurface::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
    }
}

// ============================================================================
// wl_data_device_manager
// ============================================================================

impl GlobalDispatch<wl_data_device_manager::WlDataDeviceManager, ()> for ProtocolState {
    fn bind(
        _state: &mut Self,
        _handle: &DisplayHandle,
        _client: &Client,
        resource: New<wl_data_device_manager::WlDataDeviceManager>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        debug!("Client bound wl_data_device_manager");
        data_init.init(resource, ());
    }
}

impl Dispatch<wl_data_device_manager::WlDataDeviceManager, ()> for ProtocolState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &wl_data_device_manager::WlDataDeviceManager,
        request: wl_data_device_manager::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            wl_data_device_manager::Request::CreateDataSource { id } => {
                data_init.init(id, ());
            }
            wl_data_device_manager::Request::GetDataDevice { id, .. } => {
                data_init.init(id, ());
            }
            _ => {}
        }
    }
}

impl Dispatch<wl_data_source::WlDataSource, ()> for ProtocolState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &wl_data_source::WlDataSource,
        _request: wl_data_source::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
    }
}

impl Dispatch<wl_data_device::WlDataDevice, ()> for ProtocolState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &wl_data_device::WlDataDevice,
        _request: wl_data_device::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
    }
}

// ============================================================================
// wl_shm
// ============================================================================

impl GlobalDispatch<wl_shm::WlShm, ()> for ProtocolState {
    fn bind(
        _state: &mut Self,
        _handle: &DisplayHandle,
        _client: &Client,
        resource: New<wl_shm::WlShm>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        debug!("Client bound wl_shm");
        let shm = data_init.init(resource, ());
        shm.format(wl_shm::Format::Argb8888);
        shm.format(wl_shm::Format::Xrgb8888);
    }
}

impl Dispatch<wl_shm::WlShm, ()> for ProtocolState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &wl_shm::WlShm,
        request: wl_shm::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        if let wl_shm::Request::CreatePool { id, size, .. } = request {
            debug!("Creating shm pool, size {}", size);
            data_init.init(id, ());
        }
    }
}

impl Dispatch<wl_shm_pool::WlShmPool, ()> for ProtocolState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &wl_shm_pool::WlShmPool,
        request: wl_shm_pool::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        if let wl_shm_pool::Request::CreateBuffer { id, .. } = request {
            data_init.init(id, ());
        }
    }
}

impl Dispatch<wl_buffer::WlBuffer, ()> for ProtocolState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &wl_buffer::WlBuffer,
        _request: wl_buffer::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
    }
}

// ============================================================================
// wl_seat
// ============================================================================

impl GlobalDispatch<wl_seat::WlSeat, Arc<SeatGlobal>> for ProtocolState {
    fn bind(
        _state: &mut Self,
        _handle: &DisplayHandle,
        _client: &Client,
        resource: New<wl_seat::WlSeat>,
        global_data: &Arc<SeatGlobal>,
        data_init: &mut DataInit<'_, Self>,
    ) {
        debug!("Client bound wl_seat {}", global_data.name());
        let seat = data_init.init(resource, global_data.clone());
        seat.capabilities(wl_seat::Capability::from_bits_truncate(
            global_data.capabilities(),
        ));
        if seat.version() >= 2 {
            seat.name(global_data.name().to_string());
        }
        global_data.add_resource(seat);
    }
}

impl Dispatch<wl_seat::WlSeat, Arc<SeatGlobal>> for ProtocolState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &wl_seat::WlSeat,
        request: wl_seat::Request,
        data: &Arc<SeatGlobal>,
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            wl_seat::Request::GetPointer { id } => {
                data_init.init(id, data.clone());
            }
            wl_seat::Request::GetKeyboard { id } => {
                data_init.init(id, ());
            }
            wl_seat::Request::GetTouch { id } => {
                data_init.init(id, ());
            }
            _ => {}
        }
    }

    fn destroyed(
        _state: &mut Self,
        _client: ConnectionId,
        resource: &wl_seat::WlSeat,
        data: &Arc<SeatGlobal>,
    ) {
        data.remove_resource(resource);
    }
}

impl Dispatch<wl_pointer::WlPointer, Arc<SeatGlobal>> for ProtocolState {
    fn request(
        state: &mut Self,
        client: &Client,
        _resource: &wl_pointer::WlPointer,
        request: wl_pointer::Request,
        data: &Arc<SeatGlobal>,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        if let wl_pointer::Request::SetCursor {
            serial,
            surface,
            hotspot_x,
            hotspot_y,
        } = request
        {
            let Some(seat) = state.seat(data.name()) else {
                debug!("set_cursor on withdrawn seat {}", data.name());
                return;
            };
            let surface = surface
                .as_ref()
                .and_then(|s| s.data::<SurfaceId>())
                .and_then(|id| state.surface(*id));
            seat.request_set_cursor(
                client_id(client),
                surface.as_ref(),
                serial,
                hotspot_x,
                hotspot_y,
            );
        }
    }
}

impl Dispatch<wl_keyboard::WlKeyboard, ()> for ProtocolState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &wl_keyboard::WlKeyboard,
        _request: wl_keyboard::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
    }
}

impl Dispatch<wl_touch::WlTouch, ()> for ProtocolState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &wl_touch::WlTouch,
        _request: wl_touch::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
    }
}

// ============================================================================
// xdg_wm_base
// ============================================================================

/// Data of xdg objects: the `wl_surface` they wrap
#[derive(Debug, Clone, Copy)]
pub struct XdgSurfaceData {
    pub surface_id: Option<SurfaceId>,
}

impl GlobalDispatch<xdg_wm_base::XdgWmBase, ()> for ProtocolState {
    fn bind(
        _state: &mut Self,
        _handle: &DisplayHandle,
        _client: &Client,
        resource: New<xdg_wm_base::XdgWmBase>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        debug!("Client bound xdg_wm_base");
        data_init.init(resource, ());
    }
}

impl Dispatch<xdg_wm_base::XdgWmBase, ()> for ProtocolState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &xdg_wm_base::XdgWmBase,
        request: xdg_wm_base::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            xdg_wm_base::Request::CreatePositioner { id } => {
                data_init.init(id, ());
            }
            xdg_wm_base::Request::GetXdgSurface { id, surface } => {
                let surface_id = surface.data::<SurfaceId>().copied();
                debug!("Creating xdg_surface for {:?}", surface_id);
                data_init.init(id, XdgSurfaceData { surface_id });
            }
            xdg_wm_base::Request::Pong { serial } => {
                debug!("Pong {}", serial);
            }
            _ => {}
        }
    }
}

impl Dispatch<xdg_positioner::XdgPositioner, ()> for ProtocolState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &xdg_positioner::XdgPositioner,
        _request: xdg_positioner::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
    }
}

impl Dispatch<xdg_surface::XdgSurface, XdgSurfaceData> for ProtocolState {
    fn request(
        state: &mut Self,
        _client: &Client,
        resource: &xdg_surface::XdgSurface,
        request: xdg_surface::Request,
        data: &XdgSurfaceData,
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        let surface = data.surface_id.and_then(|id| state.surface(id));
        match request {
            xdg_surface::Request::GetToplevel { id } => {
                let toplevel = data_init.init(id, *data);
                match (&state.xdg_shell, &surface) {
                    (Some(shell), Some(surface)) => {
                        shell.get_toplevel(surface, None);
                    }
                    _ => warn!("xdg_toplevel for a gone surface {:?}", data.surface_id),
                }
                toplevel.configure(0, 0, Vec::new());
                resource.configure(state.next_serial());
            }
            xdg_surface::Request::GetPopup { id, .. } => {
                let popup = data_init.init(id, *data);
                match (&state.xdg_shell, &surface) {
                    (Some(shell), Some(surface)) => {
                        shell.get_popup(surface);
                    }
                    _ => warn!("xdg_popup for a gone surface {:?}", data.surface_id),
                }
                popup.configure(0, 0, 200, 200);
                resource.configure(state.next_serial());
            }
            xdg_surface::Request::AckConfigure { serial } => {
                debug!("Ack configure {}", serial);
            }
            _ => {}
        }
    }
}

impl Dispatch<xdg_toplevel::XdgToplevel, XdgSurfaceData> for ProtocolState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &xdg_toplevel::XdgToplevel,
        request: xdg_toplevel::Request,
        data: &XdgSurfaceData,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            xdg_toplevel::Request::SetTitle { title } => {
                debug!("Toplevel {:?} title: {}", data.surface_id, title);
            }
            xdg_toplevel::Request::SetAppId { app_id } => {
                debug!("Toplevel {:?} app_id: {}", data.surface_id, app_id);
            }
            _ => {}
        }
    }
}

impl Dispatch<xdg_popup::XdgPopup, XdgSurfaceData> for ProtocolState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &xdg_popup::XdgPopup,
        _request: xdg_popup::Request,
        _data: &XdgSurfaceData,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_state_ids_unique() {
        assert_ne!(ClientState::new().id(), ClientState::new().id());
    }

    #[test]
    fn test_seat_global_capabilities_change_once() {
        let seat = SeatGlobal::new("seat0");
        assert_eq!(seat.capabilities(), 0);
        assert!(seat.set_capabilities(1));
        assert!(!seat.set_capabilities(1));
        assert_eq!(seat.capabilities(), 1);
        assert_eq!(seat.bound_count(), 0);
    }

    #[test]
    fn test_serials_increase() {
        let mut state = ProtocolState::default();
        let first = state.next_serial();
        assert!(state.next_serial() > first);
        assert_eq!(state.surface_count(), 0);
    }
}
