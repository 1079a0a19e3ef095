//! Jail management module
//!
//! This module provides:
//! - The options model describing a jail
//! - A jail.conf(5) compiler and append-only config writer
//! - State machine for jail lifecycle management
//! - The lifecycle controller driving jail(8) and jls(8)

pub mod compiler;
pub mod lifecycle;
pub mod listing;
pub mod options;
pub mod state;
pub mod writer;

// Re-exports
pub use lifecycle::{Jail, LifecycleController};
pub use options::Options;
pub use state::State;
