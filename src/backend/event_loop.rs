//! Event loop integration
//!
//! Wraps the calloop event loop the display endpoint dispatches on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use calloop::{EventLoop as CalLoop, LoopHandle, LoopSignal};
use log::debug;

use crate::error::Error;

/// Tinyway event loop wrapper
pub struct EventLoop {
    /// Calloop event loop
    event_loop: CalLoop<'static, ()>,
    /// Loop signal for waking
    signal: LoopSignal,
    /// Set once termination has been requested
    stop: Arc<AtomicBool>,
}

impl EventLoop {
    /// Create a new event loop
    pub fn new() -> Result<Self, Error> {
        let event_loop = CalLoop::try_new()?;
        let signal = event_loop.get_signal();

        Ok(Self {
            event_loop,
            signal,
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Get a handle to register event sources
    pub fn handle(&self) -> LoopHandle<'static, ()> {
        self.event_loop.handle()
    }

    /// Run one iteration of the event loop
    pub fn dispatch(&mut self, timeout: Option<Duration>) -> Result<(), Error> {
        self.event_loop.dispatch(timeout, &mut ())?;
        Ok(())
    }

    /// Get a terminator for this loop
    pub fn terminator(&self) -> Terminator {
        Terminator {
            stop: self.stop.clone(),
            signal: self.signal.clone(),
        }
    }

    /// Run the event loop until a [`Terminator`] stops it
    ///
    /// `after_dispatch` is called after every iteration. Returns immediately
    /// if termination was requested before the call.
    pub fn run<F: FnMut()>(&mut self, mut after_dispatch: F) -> Result<(), Error> {
        debug!("Starting event loop");
        while !self.stop.load(Ordering::Acquire) {
            self.dispatch(None)?;
            after_dispatch();
        }
        debug!("Event loop stopped");
        Ok(())
    }
}

/// Stops a running event loop from any thread
///
/// Stopping is cooperative: the loop finishes the events of its current
/// iteration before `run` returns.
#[derive(Clone)]
pub struct Terminator {
    stop: Arc<AtomicBool>,
    signal: LoopSignal,
}

impl Terminator {
    /// Ask the loop to stop and wake it up
    pub fn terminate(&self) {
        self.stop.store(true, Ordering::Release);
        self.signal.wakeup();
    }

    /// Whether termination has been requested
    pub fn is_terminated(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Terminator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Terminator").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_loop_new() {
        let event_loop = EventLoop::new();
        assert!(event_loop.is_ok());
    }

    #[test]
    fn test_event_loop_dispatch() {
        let mut event_loop = EventLoop::new().unwrap();
        // Dispatch with zero timeout should return immediately
        let result = event_loop.dispatch(Some(Duration::ZERO));
        assert!(result.is_ok());
    }

    #[test]
    fn test_terminate_from_other_thread() {
        let mut event_loop = EventLoop::new().unwrap();
        let terminator = event_loop.terminator();

        let thread = std::thread::spawn(move || terminator.terminate());
        event_loop.run(|| ()).unwrap();
        thread.join().unwrap();
    }

    #[test]
    fn test_terminate_before_run() {
        let mut event_loop = EventLoop::new().unwrap();
        let terminator = event_loop.terminator();
        terminator.terminate();
        assert!(terminator.is_terminated());
        let mut iterations = 0;
        event_loop.run(|| iterations += 1).unwrap();
        assert_eq!(iterations, 0);
    }
}
