//! Configuration file parsing for jam
//!
//! Parses the `jam.toml` settings file and per-jail definition files using
//! serde. Every settings field has a default, so the file is optional.

use crate::error::{Error, Result};
use crate::jail::Options;
use crate::jail::lifecycle::{DEFAULT_JAIL_BIN, DEFAULT_JLS_BIN};
use crate::jail::options::DEFAULT_CONFIG_DIR;
use crate::process::RunContext;
use crate::provision::DEFAULT_INSTALLER_BIN;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings file read when `--config` is not given
pub const DEFAULT_SETTINGS_PATH: &str = "/usr/local/etc/jam.toml";

/// Load settings from a file
pub fn load(path: &Path) -> Result<Settings> {
    let content = fs::read_to_string(path).map_err(|e| Error::ConfigRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    let settings: Settings = toml::from_str(&content)?;
    settings.validate()?;

    Ok(settings)
}

/// Load settings, falling back to defaults when the default file is absent
///
/// An explicitly requested file must exist.
pub fn load_or_default(path: &Path, explicit: bool) -> Result<Settings> {
    if !explicit && !path.exists() {
        tracing::debug!(path = %path.display(), "no settings file, using defaults");
        return Ok(Settings::default());
    }
    load(path)
}

/// Global jamctl settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settings {
    /// Directory for generated jail.conf files
    #[serde(default = "default_config_dir")]
    pub config_dir: PathBuf,

    /// Parent directory for jail roots without an explicit path
    #[serde(default = "default_jails_dir")]
    pub jails_dir: PathBuf,

    /// Registry of managed jails
    #[serde(default = "default_registry")]
    pub registry: PathBuf,

    /// jail(8) binary
    #[serde(default = "default_jail_bin")]
    pub jail_bin: String,

    /// jls(8) binary
    #[serde(default = "default_jls_bin")]
    pub jls_bin: String,

    /// bsdinstall(8) binary
    #[serde(default = "default_installer_bin")]
    pub installer_bin: String,

    /// Timeout for each external command in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

fn default_config_dir() -> PathBuf {
    PathBuf::from(DEFAULT_CONFIG_DIR)
}

fn default_jails_dir() -> PathBuf {
    PathBuf::from("/var/jam/jails")
}

fn default_registry() -> PathBuf {
    PathBuf::from("/var/jam/jail.json")
}

fn default_jail_bin() -> String {
    DEFAULT_JAIL_BIN.into()
}

fn default_jls_bin() -> String {
    DEFAULT_JLS_BIN.into()
}

fn default_installer_bin() -> String {
    DEFAULT_INSTALLER_BIN.into()
}

fn default_timeout() -> u64 {
    30
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            config_dir: default_config_dir(),
            jails_dir: default_jails_dir(),
            registry: default_registry(),
            jail_bin: default_jail_bin(),
            jls_bin: default_jls_bin(),
            installer_bin: default_installer_bin(),
            timeout: default_timeout(),
        }
    }
}

impl Settings {
    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        if self.timeout == 0 {
            return Err(Error::ConfigValidation(
                "timeout must be at least 1 second".into(),
            ));
        }
        if self.jail_bin.is_empty() || self.jls_bin.is_empty() {
            return Err(Error::ConfigValidation(
                "jail_bin and jls_bin must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Fresh context bounded by the configured timeout
    pub fn context(&self) -> RunContext {
        RunContext::with_timeout(Duration::from_secs(self.timeout))
    }

    /// Create the config, jails and registry directories
    pub fn ensure_dirs(&self) -> Result<()> {
        let mut dirs = vec![self.config_dir.as_path(), self.jails_dir.as_path()];
        if let Some(parent) = self.registry.parent().filter(|p| !p.as_os_str().is_empty()) {
            dirs.push(parent);
        }
        for dir in dirs {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

/// Load a jail definition, filling `path` and `config_dir` from settings
pub fn load_jail(path: &Path, settings: &Settings) -> Result<Options> {
    let content = fs::read_to_string(path).map_err(|e| Error::ConfigRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut opts: Options = toml::from_str(&content)?;

    if opts.name.is_empty() {
        return Err(Error::ConfigValidation(format!(
            "jail definition '{}' has no name",
            path.display()
        )));
    }
    if opts.path.as_os_str().is_empty() {
        opts.path = settings.jails_dir.join(&opts.name);
    }
    if opts.config_dir.as_os_str().is_empty() {
        opts.config_dir = settings.config_dir.clone();
    }

    Ok(opts)
}
