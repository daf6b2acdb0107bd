//! Orderly shutdown on SIGINT/SIGTERM
//!
//! A watcher thread blocks on the signal iterator. When a signal arrives, or
//! when shutdown is requested directly, it stops the client, waits for it to
//! exit, then asks the dispatch loop to terminate.

use std::process::Child;
use std::thread::JoinHandle;

use log::{debug, info, warn};
use nix::sys::signal::{kill, Signal as UnixSignal};
use nix::unistd::Pid;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::{Handle as SignalsHandle, Signals};

use crate::backend::Terminator;
use crate::error::Error;

/// Watches for termination signals on a dedicated thread
pub struct ShutdownWatcher {
    signals: SignalsHandle,
    thread: Option<JoinHandle<()>>,
}

impl ShutdownWatcher {
    /// Start watching; `client` is stopped before `terminator` fires
    pub fn spawn(terminator: Terminator, client: Option<Child>) -> Result<Self, Error> {
        let mut signals = Signals::new([SIGINT, SIGTERM])?;
        let handle = signals.handle();

        let thread = std::thread::Builder::new()
            .name("shutdown".to_string())
            .spawn(move || {
                match signals.forever().next() {
                    Some(signal) => info!("Received signal {}, shutting down", signal),
                    None => debug!("Shutdown requested"),
                }
                if let Some(client) = client {
                    stop_client(client);
                }
                terminator.terminate();
            })?;

        Ok(Self {
            signals: handle,
            thread: Some(thread),
        })
    }

    /// Shut down as if a signal had arrived
    pub fn shutdown(&self) {
        self.signals.close();
    }

    /// Wait for the watcher thread, shutting down first if still watching
    pub fn join(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        self.signals.close();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Shutdown thread panicked");
            }
        }
    }
}

impl Drop for ShutdownWatcher {
    fn drop(&mut self) {
        self.finish();
    }
}

fn stop_client(mut client: Child) {
    let pid = Pid::from_raw(client.id() as i32);
    if let Err(e) = kill(pid, UnixSignal::SIGTERM) {
        warn!("Failed to signal client {}: {}", pid, e);
    }
    match client.wait() {
        Ok(status) => info!("Client exited: {}", status),
        Err(e) => warn!("Failed to wait for client {}: {}", pid, e),
    }
}
