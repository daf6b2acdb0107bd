//! Tinyway - a minimal Wayland compositor core
//!
//! Tinyway turns backend and client events into a configured set of
//! outputs, a scene of client windows, and routed pointer and keyboard
//! input. It runs on a headless toolkit: outputs and input devices are
//! virtual, and nothing is rasterised.
//!
//! # Architecture
//!
//! - **Utils**: owning resource handles and revocable event subscriptions
//! - **Backend**: display endpoint and protocol dispatch, headless backend,
//!   layout, scene, cursor, seat
//! - **Compositor Core**: output configuration and window placement
//! - **Input**: device routing, cursor motion and images, seat focus
//! - **Server**: startup wiring, dispatch loop, client launch and shutdown
//!
//! # Example
//!
//! ```no_run
//! use tinyway::config::Config;
//! use tinyway::server::Server;
//!
//! let config = Config::load()?;
//! let server = Server::new(&config)?;
//! server.start()?;
//! let _client = server.launch_client(Some("foot"))?;
//! server.run()?;
//! # Ok::<(), tinyway::Error>(())
//! ```

pub mod backend;
pub mod compositor;
pub mod config;
pub mod error;
pub mod input;
pub mod server;
pub mod utils;

pub use error::Error;
