//! Jail options model
//!
//! Optional sub-sections are `Option<T>`: `None` means the section is absent
//! and renders nothing, `Some` with empty contents is "present but empty".

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory holding generated configuration files when none is set
pub const DEFAULT_CONFIG_DIR: &str = "/var/jam/conf";

/// Declarative description of a jail
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Unique jail name (control-program name and config file base name)
    pub name: String,

    /// Jail root filesystem
    pub path: PathBuf,

    /// Directory for generated configuration; empty means the default
    pub config_dir: PathBuf,

    /// Hostname inside the jail
    pub host: Option<HostOptions>,

    /// IPv4 addresses
    pub ipv4: Option<IpOptions>,

    /// IPv6 addresses (never rendered)
    pub ipv6: Option<IpOptions>,

    /// Lifecycle hook commands
    pub exec: Option<ExecOptions>,

    /// Filesystem mounts
    pub mount: Option<MountOptions>,

    /// Virtual network stack
    pub vnet: Option<VnetOptions>,

    /// Physical interface, passed through verbatim
    pub interface: String,

    /// Keep the jail alive with no running process
    pub persist: bool,

    /// `allow.*` parameters (reserved, never rendered)
    pub allow: Option<AllowOptions>,
}

impl Options {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.host = Some(HostOptions {
            hostname: hostname.into(),
        });
        self
    }

    pub fn ip4(mut self, addr: impl Into<String>) -> Self {
        self.ipv4.get_or_insert_with(Default::default).addr.push(addr.into());
        self
    }

    pub fn config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = dir.into();
        self
    }

    /// Path of this jail's configuration file
    pub fn config_file_path(&self) -> PathBuf {
        config_file_path(&self.config_dir, &self.name)
    }
}

/// `<dir>/<name>.conf`, with an empty `dir` replaced by the default
pub fn config_file_path(dir: &Path, name: &str) -> PathBuf {
    let dir = if dir.as_os_str().is_empty() {
        Path::new(DEFAULT_CONFIG_DIR)
    } else {
        dir
    };
    dir.join(format!("{}.conf", name))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostOptions {
    pub hostname: String,
}

/// Address list plus source address selection policy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpOptions {
    /// `ip4.saddrsel` / `ip6.saddrsel`; not rendered
    pub saddrsel: Option<bool>,
    /// Addresses in assignment order
    pub addr: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecOptions {
    pub prestart: String,
    pub start: String,
    pub poststart: String,
    pub prestop: String,
    pub stop: String,
    pub poststop: String,
    /// Run hooks in a clean environment
    pub clean: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MountOptions {
    pub devfs: bool,
    pub nodevfs: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VnetOptions {
    pub interface: String,
    pub enable: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllowOptions {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_file_path_default_dir() {
        let opts = Options::new("web1", "/jails/web1");
        assert_eq!(
            opts.config_file_path(),
            PathBuf::from("/var/jam/conf/web1.conf")
        );
    }

    #[test]
    fn test_config_file_path_custom_dir() {
        let opts = Options::new("db", "/jails/db").config_dir("/etc/jail.conf.d");
        assert_eq!(
            opts.config_file_path(),
            PathBuf::from("/etc/jail.conf.d/db.conf")
        );
    }

    #[test]
    fn test_deserialize_partial() {
        let toml = r#"
name = "web1"
path = "/jails/web1"
persist = true

[host]
hostname = "web1.local"

[ipv4]
addr = ["10.0.0.5", "10.0.0.6"]

[exec]
start = "/bin/sh /etc/rc"
clean = true
"#;

        let opts: Options = toml::from_str(toml).unwrap();
        assert_eq!(opts.name, "web1");
        assert!(opts.persist);
        assert_eq!(opts.host.unwrap().hostname, "web1.local");
        assert_eq!(opts.ipv4.unwrap().addr, vec!["10.0.0.5", "10.0.0.6"]);
        let exec = opts.exec.unwrap();
        assert_eq!(exec.start, "/bin/sh /etc/rc");
        assert!(exec.stop.is_empty());
        assert!(exec.clean);
        assert!(opts.mount.is_none());
        assert!(opts.vnet.is_none());
    }

    #[test]
    fn test_builder_appends_addresses() {
        let opts = Options::new("a", "/a").ip4("10.0.0.1").ip4("10.0.0.2");
        assert_eq!(opts.ipv4.unwrap().addr, vec!["10.0.0.1", "10.0.0.2"]);
    }
}
