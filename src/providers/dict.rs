//! In-memory and process-environment providers.

use super::{Provider, RawValue};
use crate::error::{ConfigError, Result};
use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;

/// Provider backed by an in-memory mapping.
///
/// An optional fixed prefix restricts lookups to keys stored under that
/// prefix: with prefix `APP_`, `get("DEBUG")` reads `APP_DEBUG`.
#[derive(Debug, Clone, Default)]
pub struct DictProvider {
    entries: BTreeMap<String, RawValue>,
    prefix: String,
}

impl DictProvider {
    /// Create a provider from key/value pairs.
    ///
    /// Values are stored in their string form, so numbers and booleans can be
    /// passed directly.
    pub fn new<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.to_string()))
                .collect(),
            prefix: String::new(),
        }
    }

    /// Restrict this provider to keys under `prefix`.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// The fixed prefix applied to every lookup.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Number of stored entries, regardless of prefix.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<HashMap<String, String>> for DictProvider {
    fn from(map: HashMap<String, String>) -> Self {
        Self::new(map)
    }
}

impl From<BTreeMap<String, String>> for DictProvider {
    fn from(entries: BTreeMap<String, String>) -> Self {
        Self {
            entries,
            prefix: String::new(),
        }
    }
}

impl Provider for DictProvider {
    fn get(&self, key: &str) -> Result<Option<RawValue>> {
        let full_key = format!("{}{}", self.prefix, key);
        Ok(self.entries.get(&full_key).cloned())
    }

    fn iterate_with_prefix(&self, prefix: &str) -> Result<Vec<(String, RawValue)>> {
        let full_prefix = format!("{}{}", self.prefix, prefix);
        Ok(self
            .entries
            .range(full_prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&full_prefix))
            .map(|(k, v)| (k[self.prefix.len()..].to_string(), v.clone()))
            .collect())
    }
}

/// Provider reading the live process environment.
///
/// Every lookup consults the environment at call time, so changes made after
/// construction are visible.
#[derive(Debug, Clone, Default)]
pub struct EnvProvider {
    prefix: String,
}

impl EnvProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only read variables named `{prefix}{key}`.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

fn env_string(key: &str, value: OsString) -> Result<String> {
    value.into_string().map_err(|_| ConfigError::Io {
        key: key.to_string(),
        source: std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "environment variable is not valid unicode",
        ),
    })
}

impl Provider for EnvProvider {
    fn get(&self, key: &str) -> Result<Option<RawValue>> {
        let full_key = format!("{}{}", self.prefix, key);
        match std::env::var_os(&full_key) {
            Some(value) => env_string(&full_key, value).map(Some),
            None => Ok(None),
        }
    }

    fn iterate_with_prefix(&self, prefix: &str) -> Result<Vec<(String, RawValue)>> {
        let full_prefix = format!("{}{}", self.prefix, prefix);
        let mut pairs = Vec::new();
        for (name, value) in std::env::vars_os() {
            // Non-unicode names cannot match a unicode prefix
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with(&full_prefix) {
                let value = env_string(name, value)?;
                pairs.push((name[self.prefix.len()..].to_string(), value));
            }
        }
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(pairs)
    }
}
