//! jam - FreeBSD jail manager
//!
//! Compiles jail definitions into jail.conf(5) blocks and drives jail(8)
//! and jls(8) through a state machine-controlled lifecycle.

pub mod error;
pub mod export;
pub mod jail;
pub mod manifest;
pub mod process;
pub mod provision;
pub mod registry;

pub use error::{Error, Result};
