//! Error types

use std::io;
use std::path::PathBuf;

/// Errors surfaced by server setup and the dispatch loop
///
/// Per-output configuration failures and ignored events are not errors; they
/// are logged where they happen.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to create {0}")]
    ResourceCreation(&'static str),
    #[error("Failed to start the backend")]
    BackendStart,
    #[error("Failed to bind a wayland socket: {0}")]
    Socket(#[from] wayland_server::BindError),
    #[error("Event loop error: {0}")]
    EventLoop(#[from] calloop::Error),
    #[error("Failed to read config {path:?}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Invalid config {path:?}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl<S> From<calloop::InsertError<S>> for Error {
    fn from(err: calloop::InsertError<S>) -> Self {
        Error::EventLoop(err.error)
    }
}
