//! Wayland server implementation
//!
//! This module sets up the display, acquires the compositor state, wires
//! every event handler, and runs the dispatch loop.

pub mod display;
pub mod launch;
pub mod shutdown;

use std::cell::{Ref, RefCell};
use std::process::Child;
use std::rc::Rc;
use std::time::Duration;

use log::info;

use crate::backend::{Backend, InputDeviceType, Terminator};
use crate::compositor::CompositorState;
use crate::config::Config;
use crate::error::Error;
use crate::utils::Subscription;

pub use display::DisplayEndpoint;
pub use launch::spawn_client;
pub use shutdown::ShutdownWatcher;

/// `wl_compositor` version advertised to clients
pub const COMPOSITOR_VERSION: u32 = 5;
/// `xdg_wm_base` version advertised to clients
pub const XDG_SHELL_VERSION: u32 = 3;

/// The Wayland server
///
/// Fields are dropped in declaration order: subscriptions first, then the
/// compositor state, and the display last.
pub struct Server {
    /// Top-level event subscriptions
    listeners: Vec<Subscription>,
    /// Compositor state, mutated only by the handlers
    state: Rc<RefCell<CompositorState>>,
    /// The display endpoint
    display: DisplayEndpoint,
}

impl Server {
    /// Acquire every resource and register the event handlers
    ///
    /// Nothing is announced until [`Server::start`].
    pub fn new(config: &Config) -> Result<Self, Error> {
        info!("Creating Wayland display server");

        let mut display = DisplayEndpoint::create()?;
        let state = CompositorState::new(display.display(), config)?;
        let state = Rc::new(RefCell::new(state));
        state.borrow_mut().this = Rc::downgrade(&state);

        let weak = Rc::downgrade(&state);
        let mut listeners = Vec::new();
        {
            let s = state.borrow();
            display.init_compositor(COMPOSITOR_VERSION, &s.renderer)?;
            display.init_subcompositor()?;
            display.init_data_device_manager()?;
            let xdg_shell = display.init_xdg_shell(XDG_SHELL_VERSION)?;

            listeners.push(Subscription::bind(
                &weak,
                &s.backend.events().new_output,
                CompositorState::handle_new_output,
            ));
            listeners.push(Subscription::bind(
                &weak,
                &xdg_shell.events().new_surface,
                CompositorState::handle_new_xdg_surface,
            ));
            listeners.push(Subscription::bind(
                &weak,
                &s.cursor.events().motion,
                CompositorState::handle_cursor_motion,
            ));
            listeners.push(Subscription::bind(
                &weak,
                &s.cursor.events().frame,
                CompositorState::handle_cursor_frame,
            ));
            listeners.push(Subscription::bind(
                &weak,
                &s.backend.events().new_input,
                CompositorState::handle_new_input,
            ));
            listeners.push(Subscription::bind(
                &weak,
                &s.seat.events().request_set_cursor,
                CompositorState::handle_request_set_cursor,
            ));

            for output in &config.backend.outputs {
                s.backend.add_output(&output.name, vec![output.mode()]);
            }
            if config.backend.pointer {
                s.backend.add_input("headless-pointer", InputDeviceType::Pointer);
            }
            if config.backend.keyboard {
                s.backend.add_input("headless-keyboard", InputDeviceType::Keyboard);
            }
        }

        Ok(Self {
            listeners,
            state,
            display,
        })
    }

    /// Bind a listening socket, returning its name for `WAYLAND_DISPLAY`
    pub fn add_socket_auto(&self) -> Result<String, Error> {
        self.display.display().add_socket_auto()
    }

    /// Publish the socket in `WAYLAND_DISPLAY` and spawn the session client
    ///
    /// Binds a socket first if none is bound yet, so the client always
    /// inherits a valid `WAYLAND_DISPLAY`.
    pub fn launch_client(&self, command: Option<&str>) -> Result<Option<Child>, Error> {
        let socket = self.add_socket_auto()?;
        std::env::set_var("WAYLAND_DISPLAY", &socket);
        spawn_client(command)
    }

    /// Start the backend, announcing its outputs and input devices
    pub fn start(&self) -> Result<(), Error> {
        let backend = self.backend();
        if !backend.start() {
            return Err(Error::BackendStart);
        }
        Ok(())
    }

    /// Run the dispatch loop until terminated
    pub fn run(&self) -> Result<(), Error> {
        info!("Running compositor");
        self.display.display().run()
    }

    /// Dispatch whatever is ready, waiting at most `timeout`
    pub fn dispatch(&self, timeout: Option<Duration>) -> Result<(), Error> {
        self.display.display().dispatch(timeout)
    }

    /// A thread-safe way to stop [`Server::run`]
    pub fn terminator(&self) -> Terminator {
        self.display.display().terminator()
    }

    /// The backend feeding the server
    pub fn backend(&self) -> Backend {
        self.state.borrow().backend.get().clone()
    }

    /// Read access to the compositor state
    ///
    /// The borrow must be released before any event is delivered.
    pub fn state(&self) -> Ref<'_, CompositorState> {
        self.state.borrow()
    }

    pub fn display(&self) -> &DisplayEndpoint {
        &self.display
    }

    /// Number of top-level subscriptions
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        info!("Shutting down compositor");
    }
}
