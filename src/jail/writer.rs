//! Persist compiled configuration text
//!
//! Files are opened append-only: writing the same name twice leaves two
//! blocks in the file. Callers that want a fresh file remove it first.

use crate::error::{Error, Result};
use crate::jail::options::config_file_path;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Append `text` to `<config_dir>/<name>.conf`, returning the file path
pub fn write(config_dir: &Path, name: &str, text: &str) -> Result<PathBuf> {
    let path = config_file_path(config_dir, name);

    let mut file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(&path)
        .map_err(|e| Error::ConfigWrite {
            path: path.clone(),
            source: e,
        })?;

    file.write_all(text.as_bytes())
        .map_err(|e| Error::ConfigWrite {
            path: path.clone(),
            source: e,
        })?;

    tracing::debug!(path = %path.display(), bytes = text.len(), "wrote jail config");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_write_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "web1", "web1 {\n}\n").unwrap();

        assert_eq!(path, dir.path().join("web1.conf"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "web1 {\n}\n");
    }

    #[test]
    fn test_write_appends() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "web1", "first\n").unwrap();
        let path = write(dir.path(), "web1", "second\n").unwrap();

        assert_eq!(fs::read_to_string(path).unwrap(), "first\nsecond\n");
    }

    #[test]
    fn test_write_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let err = write(&dir.path().join("missing"), "web1", "x").unwrap_err();
        assert!(matches!(err, Error::ConfigWrite { .. }));
    }
}
