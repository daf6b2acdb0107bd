//! Global compositor state
//!
//! This module contains the central compositor state: every toolkit object
//! the server acquires at startup, plus the per-output records. Event
//! handlers are methods on [`CompositorState`], spread over the modules that
//! own each concern.

use std::cell::RefCell;
use std::rc::Weak;

use log::{info, warn};

use crate::backend::{
    Allocator, Backend, Cursor, Display, OutputLayout, Renderer, Scene, SceneOutputLayout, Seat,
    XcursorManager,
};
use crate::compositor::OutputManager;
use crate::config::Config;
use crate::error::Error;
use crate::input::CursorImagePolicy;
use crate::utils::{Clock, Handle};

/// The global compositor state
///
/// Fields are declared in reverse order of creation so that dropping the
/// state tears dependents down before what they depend on.
pub struct CompositorState {
    /// Per-output records, with their subscriptions
    pub outputs: OutputManager,

    /// Cursor theme
    pub xcursor_manager: Handle<XcursorManager>,

    /// The single seat
    pub seat: Handle<Seat>,

    /// The on-screen pointer
    pub cursor: Handle<Cursor>,

    /// Keeps scene outputs where the layout puts their outputs
    pub scene_output_layout: SceneOutputLayout,

    /// Render tree
    pub scene: Handle<Scene>,

    /// Output arrangement
    pub output_layout: Handle<OutputLayout>,

    pub allocator: Handle<Allocator>,
    pub renderer: Handle<Renderer>,
    pub backend: Handle<Backend>,

    /// What cursor motion does to a client-set cursor image
    pub cursor_policy: CursorImagePolicy,

    /// Timestamps frame-done notifications
    pub clock: Clock,

    /// The cell this state lives in, for binding per-output subscriptions
    pub(crate) this: Weak<RefCell<CompositorState>>,
}

impl CompositorState {
    /// Acquire every toolkit object, in dependency order
    ///
    /// Fails on the first object that cannot be created; whatever was
    /// acquired before it is released again.
    pub fn new(display: &Display, config: &Config) -> Result<Self, Error> {
        let backend = Handle::create(|| match config.backend.name.as_deref() {
            Some(name) => Backend::create(display, name),
            None => Backend::autocreate(display),
        })?;

        let renderer = Handle::create(|| Renderer::autocreate(&backend))?;
        if !renderer.init_wl_display(display) {
            warn!("Renderer could not advertise its buffer globals");
            return Err(Error::ResourceCreation("renderer"));
        }

        let allocator = Handle::create(|| Allocator::autocreate(&backend, &renderer))?;
        let output_layout = Handle::create(OutputLayout::create)?;
        let scene = Handle::create(Scene::create)?;
        let scene_output_layout = scene
            .attach_output_layout(&output_layout)
            .ok_or(Error::ResourceCreation("scene output layout"))?;

        let cursor = Handle::create(Cursor::create)?;
        cursor.attach_output_layout(&output_layout);

        let seat = Handle::create(|| Seat::create(display, &config.seat_name))?;
        let xcursor_manager = Handle::create(|| {
            XcursorManager::create(config.cursor.theme.as_deref(), config.cursor.size)
        })?;

        info!(
            "Compositor state ready: {} backend, {} renderer, seat {}",
            backend.name(),
            renderer.name(),
            seat.name()
        );

        Ok(Self {
            outputs: OutputManager::new(),
            xcursor_manager,
            seat,
            cursor,
            scene_output_layout,
            scene,
            output_layout,
            allocator,
            renderer,
            backend,
            cursor_policy: CursorImagePolicy::from_config(&config.cursor),
            clock: Clock::new(),
            this: Weak::new(),
        })
    }
}
