//! Persisted registry of managed jails
//!
//! A JSON file mapping jail names to their last known records, so that
//! separate `jamctl` invocations see each other's state.

use crate::error::{Error, Result};
use crate::jail::Jail;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    jails: BTreeMap<String, Jail>,
}

/// Jail records keyed by name
#[derive(Debug)]
pub struct Registry {
    path: PathBuf,
    jails: BTreeMap<String, Jail>,
}

impl Registry {
    /// Load the registry; a missing or empty file is an empty registry
    pub fn load(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(e) => {
                return Err(Error::ConfigRead {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
        };

        let file: RegistryFile = if content.trim().is_empty() {
            RegistryFile::default()
        } else {
            serde_json::from_str(&content).map_err(|e| Error::RegistryCorrupt {
                path: path.to_path_buf(),
                source: e,
            })?
        };

        Ok(Self {
            path: path.to_path_buf(),
            jails: file.jails,
        })
    }

    /// Write the registry back to disk
    pub fn save(&self) -> Result<()> {
        let file = RegistryFile {
            jails: self.jails.clone(),
        };
        let json = serde_json::to_string_pretty(&file)?;
        fs::write(&self.path, json + "\n").map_err(|e| Error::ConfigWrite {
            path: self.path.clone(),
            source: e,
        })?;
        Ok(())
    }

    /// Add a new record; names are unique
    pub fn insert(&mut self, jail: Jail) -> Result<()> {
        if self.jails.contains_key(&jail.name) {
            return Err(Error::JailExists(jail.name));
        }
        self.jails.insert(jail.name.clone(), jail);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.jails.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Result<&Jail> {
        self.jails
            .get(name)
            .ok_or_else(|| Error::JailNotFound(name.to_string()))
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut Jail> {
        self.jails
            .get_mut(name)
            .ok_or_else(|| Error::JailNotFound(name.to_string()))
    }

    /// Known jail names in sorted order
    pub fn names(&self) -> Vec<&str> {
        self.jails.keys().map(String::as_str).collect()
    }

    pub fn jails(&self) -> impl Iterator<Item = &Jail> {
        self.jails.values()
    }
}
