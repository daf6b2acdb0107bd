//! Display endpoint: event loop, wayland socket and global registry

use std::cell::{Cell, RefCell};
use std::io;
use std::os::unix::io::AsFd;
use std::os::unix::net::UnixStream;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::time::Duration;

use calloop::generic::Generic;
use calloop::{Interest, LoopHandle, Mode, PostAction, RegistrationToken};
use log::{debug, error, info, warn};
use wayland_server::backend::GlobalId;
use wayland_server::{DisplayHandle, GlobalDispatch, ListeningSocket};

use super::event_loop::{EventLoop, Terminator};
use super::ledger;
use super::protocol::{ClientState, ProtocolState};
use super::shell::ClientId;
use crate::error::Error;
use crate::utils::{Resource, Signal};

/// Events emitted by the display
#[derive(Debug, Default)]
pub struct DisplayEvents {
    /// Fired once, before the display tears down its globals
    pub destroy: Signal<()>,
}

/// The server's listening endpoint and the root of protocol objects
#[derive(Clone)]
pub struct Display(Rc<DisplayInner>);

struct DisplayInner {
    event_loop: RefCell<Option<EventLoop>>,
    loop_handle: LoopHandle<'static, ()>,
    terminator: Terminator,
    handle: DisplayHandle,
    protocol: Rc<RefCell<ProtocolState>>,
    tokens: RefCell<Vec<RegistrationToken>>,
    socket_name: RefCell<Option<String>>,
    globals: RefCell<Vec<Global>>,
    destroyed: Cell<bool>,
    events: DisplayEvents,
}

impl Display {
    /// Create the display, its event loop and the wayland client dispatcher
    pub fn create() -> Option<Display> {
        let event_loop = match EventLoop::new() {
            Ok(event_loop) => event_loop,
            Err(e) => {
                error!("Failed to create event loop: {}", e);
                return None;
            }
        };
        let mut display: wayland_server::Display<ProtocolState> = match wayland_server::Display::new() {
            Ok(display) => display,
            Err(e) => {
                error!("Failed to create wayland display: {}", e);
                return None;
            }
        };

        let loop_handle = event_loop.handle();
        let handle = display.handle();
        let terminator = event_loop.terminator();
        let protocol = Rc::new(RefCell::new(ProtocolState::default()));

        let fd = match display.backend().poll_fd().try_clone_to_owned() {
            Ok(fd) => fd,
            Err(e) => {
                error!("Failed to clone the display poll fd: {}", e);
                return None;
            }
        };
        let token = loop_handle.insert_source(Generic::new(fd, Interest::READ, Mode::Level), {
            let mut display = display;
            let protocol = protocol.clone();
            move |_, _, _| {
                let Ok(mut state) = protocol.try_borrow_mut() else {
                    warn!("Client requests arrived while the protocol state was busy");
                    return Ok(PostAction::Continue);
                };
                display.dispatch_clients(&mut *state)?;
                display.flush_clients()?;
                Ok(PostAction::Continue)
            }
        });
        let token = match token {
            Ok(token) => token,
            Err(e) => {
                error!("Failed to register the display source: {}", e.error);
                return None;
            }
        };

        ledger::record_create(Self::KIND);
        Some(Display(Rc::new(DisplayInner {
            event_loop: RefCell::new(Some(event_loop)),
            loop_handle,
            terminator,
            handle,
            protocol,
            tokens: RefCell::new(vec![token]),
            socket_name: RefCell::new(None),
            globals: RefCell::new(Vec::new()),
            destroyed: Cell::new(false),
            events: DisplayEvents::default(),
        })))
    }

    /// Bind a listening socket with an automatically chosen name
    ///
    /// Returns the socket name clients should find in `WAYLAND_DISPLAY`.
    pub fn add_socket_auto(&self) -> Result<String, Error> {
        if let Some(name) = self.socket_name() {
            return Ok(name);
        }

        let socket = ListeningSocket::bind_auto("wayland", 0..33)?;
        let socket_name = socket
            .socket_name()
            .and_then(|n| n.to_str().map(String::from))
            .unwrap_or_else(|| "wayland-0".to_string());

        let token = self.0.loop_handle.insert_source(
            Generic::new(
                socket.as_fd().try_clone_to_owned()?,
                Interest::READ,
                Mode::Level,
            ),
            {
                let mut handle = self.0.handle.clone();
                move |_, _, _| {
                    // Accept new client connections
                    while let Some(stream) = socket.accept()? {
                        match insert_client(&mut handle, stream) {
                            Ok(id) => debug!("New Wayland client {:?} connected", id),
                            Err(e) => error!("Failed to insert client: {}", e),
                        }
                    }
                    Ok(PostAction::Continue)
                }
            },
        )?;

        self.0.tokens.borrow_mut().push(token);
        info!("Wayland socket: {}", socket_name);
        *self.0.socket_name.borrow_mut() = Some(socket_name.clone());
        Ok(socket_name)
    }

    /// Serve a client over an already connected stream
    pub fn insert_client(&self, stream: UnixStream) -> Result<ClientId, Error> {
        if self.is_destroyed() {
            return Err(Error::ResourceCreation("client"));
        }
        Ok(insert_client(&mut self.0.handle.clone(), stream)?)
    }

    /// Name of the bound socket, if any
    pub fn socket_name(&self) -> Option<String> {
        self.0.socket_name.borrow().clone()
    }

    /// Run the dispatch loop until terminated
    pub fn run(&self) -> Result<(), Error> {
        let Some(mut event_loop) = self.0.event_loop.borrow_mut().take() else {
            warn!("Display loop is already running or the display is gone");
            return Ok(());
        };
        let result = event_loop.run(|| self.flush_clients());
        *self.0.event_loop.borrow_mut() = Some(event_loop);
        result
    }

    /// Dispatch whatever is ready, waiting at most `timeout`
    pub fn dispatch(&self, timeout: Option<Duration>) -> Result<(), Error> {
        let Some(mut event_loop) = self.0.event_loop.borrow_mut().take() else {
            warn!("Display loop is already running or the display is gone");
            return Ok(());
        };
        let result = event_loop.dispatch(timeout);
        self.flush_clients();
        *self.0.event_loop.borrow_mut() = Some(event_loop);
        result
    }

    /// Send events queued outside of client dispatch
    fn flush_clients(&self) {
        if let Err(e) = self.0.handle.clone().flush_clients() {
            warn!("Failed to flush clients: {}", e);
        }
    }

    /// A thread-safe way to stop [`Display::run`]
    pub fn terminator(&self) -> Terminator {
        self.0.terminator.clone()
    }

    /// Stop the dispatch loop from the dispatch thread
    pub fn terminate(&self) {
        self.0.terminator.terminate();
    }

    /// Handle for registering event sources on the dispatch loop
    pub fn loop_handle(&self) -> LoopHandle<'static, ()> {
        self.0.loop_handle.clone()
    }

    /// Globals currently advertised to clients
    pub fn globals(&self) -> Vec<Global> {
        self.0.globals.borrow().clone()
    }

    pub fn events(&self) -> &DisplayEvents {
        &self.0.events
    }

    pub fn is_destroyed(&self) -> bool {
        self.0.destroyed.get()
    }

    /// Run `f` on the protocol state client requests are routed through
    pub(crate) fn with_protocol<R>(&self, f: impl FnOnce(&mut ProtocolState) -> R) -> Option<R> {
        match self.0.protocol.try_borrow_mut() {
            Ok(mut protocol) => Some(f(&mut *protocol)),
            Err(_) => {
                warn!("Protocol state is busy");
                None
            }
        }
    }

    /// Advertise a new global
    ///
    /// `version` is clamped to the highest version the interface defines.
    pub(crate) fn advertise<I, U>(&self, version: u32, data: U) -> Global
    where
        I: wayland_server::Resource + 'static,
        U: Send + Sync + 'static,
        ProtocolState: GlobalDispatch<I, U>,
    {
        let interface = I::interface().name;
        let max = I::interface().version;
        let version = if version > max {
            warn!("{} v{} is not supported, advertising v{}", interface, version, max);
            max
        } else {
            version
        };

        debug!("Advertising global {} v{}", interface, version);
        let id = self
            .0
            .handle
            .create_global::<ProtocolState, I, U>(version, data);
        ledger::record_create(interface);
        let global = Global(Rc::new(GlobalInner {
            id,
            interface,
            version,
            destroyed: Cell::new(false),
            display: Rc::downgrade(&self.0),
        }));
        self.0.globals.borrow_mut().push(global.clone());
        global
    }
}

impl Resource for Display {
    const KIND: &'static str = "display";

    fn destroy(self) {
        if self.0.destroyed.replace(true) {
            warn!("Display destroyed twice");
            return;
        }

        self.0.events.destroy.emit(());

        let globals = std::mem::take(&mut *self.0.globals.borrow_mut());
        for global in globals {
            global.destroy();
        }
        self.with_protocol(ProtocolState::clear);
        for token in self.0.tokens.borrow_mut().drain(..) {
            self.0.loop_handle.remove(token);
        }
        self.0.event_loop.borrow_mut().take();

        ledger::record_destroy(Self::KIND);
    }
}

impl PartialEq for Display {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for Display {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Display")
            .field("socket_name", &self.0.socket_name.borrow())
            .field("globals", &self.0.globals.borrow().len())
            .finish_non_exhaustive()
    }
}

/// A protocol global advertised by the display
#[derive(Clone)]
pub struct Global(Rc<GlobalInner>);

struct GlobalInner {
    id: GlobalId,
    interface: &'static str,
    version: u32,
    destroyed: Cell<bool>,
    display: Weak<DisplayInner>,
}

impl Global {
    pub fn interface(&self) -> &'static str {
        self.0.interface
    }

    pub fn version(&self) -> u32 {
        self.0.version
    }

    pub fn is_destroyed(&self) -> bool {
        self.0.destroyed.get()
    }

    /// Withdraw the global from the display
    pub(crate) fn destroy(&self) {
        if self.0.destroyed.replace(true) {
            return;
        }
        if let Some(display) = self.0.display.upgrade() {
            if let Ok(mut globals) = display.globals.try_borrow_mut() {
                globals.retain(|g| !Rc::ptr_eq(&g.0, &self.0));
            }
            display
                .handle
                .remove_global::<ProtocolState>(self.0.id.clone());
        }
        ledger::record_destroy(self.0.interface);
    }
}

fn insert_client(handle: &mut DisplayHandle, stream: UnixStream) -> io::Result<ClientId> {
    let data = Arc::new(ClientState::new());
    let id = data.id();
    handle.insert_client(stream, data)?;
    Ok(id)
}

impl PartialEq for Global {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for Global {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Global")
            .field("interface", &self.0.interface)
            .field("version", &self.0.version)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wayland_server::protocol::{wl_shm, wl_subcompositor};

    #[test]
    fn test_display_create_destroy() {
        let before = ledger::snapshot();
        let display = Display::create().unwrap();
        assert!(display.socket_name().is_none());
        display.destroy();

        let diff = ledger::snapshot().since(&before);
        assert_eq!(diff.get("display").created, 1);
        assert!(diff.is_balanced());
    }

    #[test]
    fn test_globals_withdrawn_on_destroy() {
        let before = ledger::snapshot();
        let display = Display::create().unwrap();
        let global = display.advertise::<wl_shm::WlShm, _>(1, ());
        assert_eq!(display.globals(), vec![global.clone()]);
        assert_eq!(global.interface(), "wl_shm");
        assert_eq!(global.version(), 1);

        display.clone().destroy();
        assert!(global.is_destroyed());
        assert!(display.globals().is_empty());
        assert!(ledger::snapshot().since(&before).is_balanced());
    }

    #[test]
    fn test_version_clamped_to_interface() {
        let display = Display::create().unwrap();
        let global = display.advertise::<wl_subcompositor::WlSubcompositor, _>(4, ());
        assert_eq!(global.version(), 1);
        display.destroy();
    }

    #[test]
    fn test_insert_client_after_destroy_fails() {
        let display = Display::create().unwrap();
        let (_client, server) = UnixStream::pair().unwrap();
        display.insert_client(server).unwrap();

        display.clone().destroy();
        let (_client, server) = UnixStream::pair().unwrap();
        assert!(matches!(
            display.insert_client(server),
            Err(Error::ResourceCreation("client"))
        ));
    }

    #[test]
    fn test_run_returns_after_terminate() {
        let display = Display::create().unwrap();
        display.terminate();
        display.run().unwrap();
        display.destroy();
    }
}
