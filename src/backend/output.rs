//! Headless outputs
//!
//! An output only changes through [`Output::commit_state`], which validates
//! the whole request before applying any of it. Enabled outputs get a frame
//! timer on the display loop firing at the refresh rate of their mode.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bitflags::bitflags;
use calloop::timer::{TimeoutAction, Timer};
use calloop::{LoopHandle, RegistrationToken};
use log::{debug, error, warn};

use super::ledger;
use super::render::{Allocator, Renderer};
use crate::utils::Signal;

/// Mode used when an output is enabled without one and has no preference
pub const DEFAULT_MODE: Mode = Mode {
    width: 1920,
    height: 1080,
    refresh: 60000,
    preferred: false,
};

/// Unique identifier for outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputId(pub u64);

impl OutputId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        OutputId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// An output mode (resolution + refresh rate)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mode {
    /// Width in pixels
    pub width: i32,
    /// Height in pixels
    pub height: i32,
    /// Refresh rate in mHz (e.g., 60000 for 60Hz)
    pub refresh: i32,
    /// Is this the preferred mode?
    pub preferred: bool,
}

impl Mode {
    /// Time between two frames at this mode's refresh rate
    pub fn frame_period(&self) -> Duration {
        let refresh = if self.refresh > 0 {
            self.refresh
        } else {
            DEFAULT_MODE.refresh
        };
        Duration::from_nanos(1_000_000_000_000 / refresh as u64)
    }
}

bitflags! {
    /// Fields set on an [`OutputState`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct OutputStateFields: u32 {
        const ENABLED = 1 << 0;
        const MODE = 1 << 1;
    }
}

/// A pending configuration request for an output
///
/// Only the fields that were set are applied on commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputState {
    committed: OutputStateFields,
    enabled: bool,
    mode: Option<Mode>,
}

impl OutputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.committed |= OutputStateFields::ENABLED;
        self.enabled = enabled;
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.committed |= OutputStateFields::MODE;
        self.mode = Some(mode);
    }

    pub fn committed(&self) -> OutputStateFields {
        self.committed
    }

    /// Requested enabled state, if set
    pub fn enabled(&self) -> Option<bool> {
        self.committed
            .contains(OutputStateFields::ENABLED)
            .then_some(self.enabled)
    }

    /// Requested mode, if set
    pub fn mode(&self) -> Option<Mode> {
        self.mode
    }
}

#[derive(Debug, Default)]
pub struct OutputEvents {
    /// The output is ready for a new frame
    pub frame: Signal<()>,
    /// The output is going away
    pub destroy: Signal<()>,
}

/// A display device
#[derive(Clone)]
pub struct Output(Rc<OutputInner>);

struct OutputInner {
    id: OutputId,
    name: String,
    modes: Vec<Mode>,
    enabled: Cell<bool>,
    current_mode: Cell<Option<Mode>>,
    render_ready: Cell<bool>,
    fail_commits: Cell<bool>,
    commits: RefCell<Vec<OutputState>>,
    loop_handle: LoopHandle<'static, ()>,
    frame_timer: Cell<Option<RegistrationToken>>,
    destroyed: Cell<bool>,
    events: OutputEvents,
}

impl Output {
    pub(crate) fn new(name: &str, modes: Vec<Mode>, loop_handle: LoopHandle<'static, ()>) -> Output {
        ledger::record_create("output");
        Output(Rc::new(OutputInner {
            id: OutputId::new(),
            name: name.to_string(),
            modes,
            enabled: Cell::new(false),
            current_mode: Cell::new(None),
            render_ready: Cell::new(false),
            fail_commits: Cell::new(false),
            commits: RefCell::new(Vec::new()),
            loop_handle,
            frame_timer: Cell::new(None),
            destroyed: Cell::new(false),
            events: OutputEvents::default(),
        }))
    }

    pub fn id(&self) -> OutputId {
        self.0.id
    }

    /// Output name (e.g., "HEADLESS-1")
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// The mode flagged preferred, else the first advertised one
    pub fn preferred_mode(&self) -> Option<Mode> {
        self.0
            .modes
            .iter()
            .find(|m| m.preferred)
            .or_else(|| self.0.modes.first())
            .copied()
    }

    pub fn is_enabled(&self) -> bool {
        self.0.enabled.get()
    }

    pub fn current_mode(&self) -> Option<Mode> {
        self.0.current_mode.get()
    }

    /// Effective resolution, zero while disabled
    pub fn effective_resolution(&self) -> (i32, i32) {
        match (self.is_enabled(), self.current_mode()) {
            (true, Some(mode)) => (mode.width, mode.height),
            _ => (0, 0),
        }
    }

    /// Attach the output to a renderer and allocator
    pub fn init_render(&self, allocator: &Allocator, renderer: &Renderer) -> bool {
        if self.is_destroyed() || allocator.is_destroyed() || renderer.is_destroyed() {
            error!("Cannot attach {} to the renderer", self.0.name);
            return false;
        }
        self.0.render_ready.set(true);
        true
    }

    /// Apply `state` atomically
    ///
    /// Every attempt is recorded, whether or not it succeeds.
    pub fn commit_state(&self, state: &OutputState) -> bool {
        self.0.commits.borrow_mut().push(state.clone());

        if self.is_destroyed() {
            warn!("Commit on destroyed output {}", self.0.name);
            return false;
        }
        if !self.0.render_ready.get() {
            warn!("Output {} has no renderer attached", self.0.name);
            return false;
        }
        if self.0.fail_commits.get() {
            warn!("Output {} rejected the commit", self.0.name);
            return false;
        }

        let enabled = state.enabled().unwrap_or_else(|| self.is_enabled());
        let mode = match state.mode() {
            Some(mode) if !self.0.modes.contains(&mode) => {
                warn!(
                    "Output {} does not support {}x{}@{}",
                    self.0.name, mode.width, mode.height, mode.refresh
                );
                return false;
            }
            Some(mode) => Some(mode),
            None if enabled => self
                .current_mode()
                .or_else(|| self.preferred_mode())
                .or(Some(DEFAULT_MODE)),
            None => self.current_mode(),
        };

        self.0.enabled.set(enabled);
        self.0.current_mode.set(mode);
        debug!(
            "Output {} committed: enabled={} mode={:?}",
            self.0.name, enabled, mode
        );
        self.update_frame_timer();
        true
    }

    /// Every state passed to [`Output::commit_state`], oldest first
    pub fn commits(&self) -> Vec<OutputState> {
        self.0.commits.borrow().clone()
    }

    pub fn last_commit(&self) -> Option<OutputState> {
        self.0.commits.borrow().last().cloned()
    }

    /// Make subsequent commits fail, as a driver refusing a mode would
    pub fn set_commit_failure(&self, fail: bool) {
        self.0.fail_commits.set(fail);
    }

    /// Signal that the output is ready for a new frame
    ///
    /// Driven by the frame timer; exposed so a frame can be forced.
    pub fn send_frame(&self) {
        if self.is_enabled() && !self.is_destroyed() {
            self.0.events.frame.emit(());
        }
    }

    pub fn events(&self) -> &OutputEvents {
        &self.0.events
    }

    pub fn is_destroyed(&self) -> bool {
        self.0.destroyed.get()
    }

    pub(crate) fn destroy(&self) {
        if self.0.destroyed.replace(true) {
            return;
        }
        debug!("Output {} removed", self.0.name);
        self.stop_frame_timer();
        self.0.events.destroy.emit(());
        ledger::record_destroy("output");
    }

    fn update_frame_timer(&self) {
        self.stop_frame_timer();
        let Some(mode) = self.current_mode().filter(|_| self.is_enabled()) else {
            return;
        };

        let period = mode.frame_period();
        let weak: Weak<OutputInner> = Rc::downgrade(&self.0);
        let token = self.0.loop_handle.insert_source(
            Timer::from_duration(period),
            move |_, _, _| match weak.upgrade() {
                Some(inner) => {
                    Output(inner).send_frame();
                    TimeoutAction::ToDuration(period)
                }
                None => TimeoutAction::Drop,
            },
        );
        match token {
            Ok(token) => self.0.frame_timer.set(Some(token)),
            Err(e) => error!("Failed to start the frame timer of {}: {}", self.0.name, e.error),
        }
    }

    fn stop_frame_timer(&self) {
        if let Some(token) = self.0.frame_timer.take() {
            self.0.loop_handle.remove(token);
        }
    }
}

impl PartialEq for Output {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for Output {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Output")
            .field("id", &self.0.id)
            .field("name", &self.0.name)
            .field("enabled", &self.0.enabled.get())
            .field("mode", &self.0.current_mode.get())
            .finish()
    }
}
