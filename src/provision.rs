//! Base system installation for jail roots
//!
//! Installation itself is delegated to bsdinstall(8); this module only
//! carries the installer script asset and invokes the installer.

use crate::error::Result;
use crate::process::{ProcessRunner, RunContext};
use std::fs;
use std::path::Path;

/// Default bsdinstall(8) location
pub const DEFAULT_INSTALLER_BIN: &str = "/usr/sbin/bsdinstall";

/// Scripted install answers handed to bsdinstall
pub const INSTALL_SCRIPT: &str = r#"PARTITIONS=DEFAULT
DISTRIBUTIONS="kernel.txz base.txz"
export nonInteractive="YES"

#!/bin/sh
sysrc ifconfig_DEFAULT=DHCP
sysrc sshd_enable=YES
pkg install puppet"#;

/// Installs a FreeBSD base system into jail roots
pub struct Installer<'a, R: ProcessRunner> {
    runner: &'a R,
    bin: String,
}

impl<'a, R: ProcessRunner> Installer<'a, R> {
    pub fn new(runner: &'a R) -> Self {
        Self {
            runner,
            bin: DEFAULT_INSTALLER_BIN.to_string(),
        }
    }

    /// Use a different installer binary
    pub fn bin(mut self, bin: impl Into<String>) -> Self {
        self.bin = bin.into();
        self
    }

    /// Run `bsdinstall jail <path>`, creating `path` first
    pub fn install(&self, path: &Path, ctx: &RunContext) -> Result<()> {
        fs::create_dir_all(path)?;

        tracing::info!(path = %path.display(), installer = %self.bin, "installing base system");
        let args = vec!["jail".to_string(), path.display().to_string()];
        self.runner.run(&self.bin, &args, ctx)?;
        Ok(())
    }
}
