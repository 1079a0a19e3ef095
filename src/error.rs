//! Unified error types for jam

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for jam operations
#[derive(Error, Debug)]
pub enum Error {
    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to write config file '{path}': {source}")]
    ConfigWrite { path: PathBuf, source: io::Error },

    // Config errors
    #[error("Failed to read config file '{path}': {source}")]
    ConfigRead { path: PathBuf, source: io::Error },

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config validation failed: {0}")]
    ConfigValidation(String),

    #[error("Failed to render config: {0}")]
    ConfigRender(#[from] std::fmt::Error),

    // Registry errors
    #[error("Registry '{path}' is corrupt: {source}")]
    RegistryCorrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    // Process errors
    #[error("Command '{command}' not found")]
    CommandNotFound { command: String },

    #[error("Command '{command}' exited with code {code}: {stderr}")]
    CommandExited {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("Command '{command}' killed by signal {signal}: {stderr}")]
    CommandSignaled {
        command: String,
        signal: i32,
        stderr: String,
    },

    #[error("Command '{command}' failed: {message}")]
    CommandFailed { command: String, message: String },

    #[error("Command '{command}' cancelled: {reason}")]
    Cancelled { command: String, reason: String },

    // Parse errors
    #[error("Invalid jail ID {output:?}: {reason}")]
    InvalidJid { output: String, reason: String },

    #[error("Malformed listing row {line}: {reason} ({row:?})")]
    ListingRow {
        line: usize,
        row: String,
        reason: String,
    },

    // Jail errors
    #[error("Jail '{0}' not found")]
    JailNotFound(String),

    #[error("Jail '{0}' already exists")]
    JailExists(String),

    #[error("Jail '{0}' is already running")]
    JailAlreadyRunning(String),

    #[error("Cannot {operation} jail '{name}' in state {state}")]
    InvalidState {
        name: String,
        state: String,
        operation: String,
    },

    #[error("Jail '{name}': {step} failed: {source}")]
    Jail {
        name: String,
        step: &'static str,
        #[source]
        source: Box<Error>,
    },

    #[error("{step} failed: {source}")]
    Step {
        step: &'static str,
        #[source]
        source: Box<Error>,
    },

    // Snapshot errors
    #[error("Unknown codec '{0}'")]
    UnknownCodec(String),

    #[error("Archive operation failed: {0}")]
    Archive(String),
}

impl Error {
    /// Wrap an error with the jail and step it failed in
    pub fn in_jail(self, name: &str, step: &'static str) -> Self {
        Error::Jail {
            name: name.to_string(),
            step,
            source: Box::new(self),
        }
    }

    /// Wrap an error with a step that is not tied to one jail
    pub fn in_step(self, step: &'static str) -> Self {
        Error::Step {
            step,
            source: Box::new(self),
        }
    }

    /// Innermost error, skipping operation context
    pub fn root(&self) -> &Error {
        match self {
            Error::Jail { source, .. } | Error::Step { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether the failure came from a missing or invalid required field
    pub fn is_config(&self) -> bool {
        matches!(
            self.root(),
            Error::ConfigValidation(_) | Error::ConfigRender(_) | Error::ConfigParse(_)
        )
    }

    /// Whether the failure came from an external process
    pub fn is_execution(&self) -> bool {
        matches!(
            self.root(),
            Error::CommandNotFound { .. }
                | Error::CommandExited { .. }
                | Error::CommandSignaled { .. }
                | Error::CommandFailed { .. }
        )
    }

    /// Whether the failure came from malformed process output
    pub fn is_parse(&self) -> bool {
        matches!(self.root(), Error::InvalidJid { .. } | Error::ListingRow { .. })
    }
}

/// Result type alias for jam operations
pub type Result<T> = std::result::Result<T, Error>;
