//! Directory provider: one file per key.
//!
//! The layout used by container secret mounts (`/run/secrets/DB_PASSWORD`)
//! and envdir-style tools. File contents are returned verbatim.

use super::{Provider, RawValue};
use crate::error::{ConfigError, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Provider reading values from files in a directory.
///
/// Contents are read on every lookup, so files changed after construction are
/// picked up by the next access.
#[derive(Debug, Clone)]
pub struct DirectoryProvider {
    base_path: PathBuf,
    prefix: String,
}

impl DirectoryProvider {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            prefix: String::new(),
        }
    }

    /// Only consider files named `{prefix}{key}`.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn read_file(&self, file_name: &str) -> Result<Option<RawValue>> {
        // Keys never address anything outside the base directory
        if file_name.is_empty()
            || file_name.contains(['/', '\\'])
            || file_name == "."
            || file_name == ".."
        {
            debug!(key = %file_name, "Ignoring key that is not a plain file name");
            return Ok(None);
        }

        let path = self.base_path.join(file_name);
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            // Only a missing file or a directory in its place count as absent
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) if e.kind() == ErrorKind::IsADirectory || path.is_dir() => {
                debug!(path = %path.display(), "Ignoring directory in place of a key file");
                Ok(None)
            }
            Err(e) => Err(ConfigError::Io {
                key: file_name.to_string(),
                source: e,
            }),
        }
    }
}

impl Provider for DirectoryProvider {
    fn get(&self, key: &str) -> Result<Option<RawValue>> {
        self.read_file(&format!("{}{}", self.prefix, key))
    }

    fn iterate_with_prefix(&self, prefix: &str) -> Result<Vec<(String, RawValue)>> {
        let full_prefix = format!("{}{}", self.prefix, prefix);

        let entries = match std::fs::read_dir(&self.base_path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(ConfigError::Io {
                    key: self.base_path.display().to_string(),
                    source: e,
                });
            }
        };

        let mut names: Vec<String> = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ConfigError::Io {
                key: self.base_path.display().to_string(),
                source: e,
            })?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                debug!(path = %entry.path().display(), "Skipping non-unicode file name");
                continue;
            };
            if name.starts_with(&full_prefix) && entry.path().is_file() {
                names.push(name);
            }
        }
        names.sort();

        let mut pairs = Vec::with_capacity(names.len());
        for name in names {
            if let Some(value) = self.read_file(&name)? {
                pairs.push((name[self.prefix.len()..].to_string(), value));
            }
        }
        Ok(pairs)
    }
}
