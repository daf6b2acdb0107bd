//! Utilities shared by the toolkit and the compositor core

pub mod clock;
pub mod handle;
pub mod signal;

pub use clock::{Clock, Time};
pub use handle::{Handle, Resource};
pub use signal::{Signal, Subscription};
