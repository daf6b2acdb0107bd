//! Compositor core module
//!
//! This module contains the core compositor logic including:
//! - Global compositor state and its teardown order
//! - Output configuration and per-output frame handling
//! - Placement of client windows in the scene

pub mod output;
pub mod scene;
pub mod state;

pub use output::{OutputManager, OutputRecord};
pub use state::CompositorState;
