//! Ordered composite provider.
//!
//! Earlier providers shadow later ones: `get` returns the first value found,
//! `iterate_with_prefix` keeps the first value seen for each key.

use super::{Provider, RawValue};
use crate::error::Result;
use std::collections::HashSet;
use std::sync::Arc;

/// Chains several providers with first-found-wins precedence.
#[derive(Clone, Default)]
pub struct FallbackProvider {
    providers: Vec<Arc<dyn Provider>>,
}

impl FallbackProvider {
    pub fn new(providers: impl IntoIterator<Item = Arc<dyn Provider>>) -> Self {
        Self {
            providers: providers.into_iter().collect(),
        }
    }

    /// Append a provider with lower precedence than all current ones.
    pub fn push(mut self, provider: impl Provider + 'static) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for FallbackProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackProvider")
            .field("providers", &self.providers.len())
            .finish()
    }
}

impl Provider for FallbackProvider {
    fn get(&self, key: &str) -> Result<Option<RawValue>> {
        for provider in &self.providers {
            if let Some(value) = provider.get(key)? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    fn iterate_with_prefix(&self, prefix: &str) -> Result<Vec<(String, RawValue)>> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut pairs = Vec::new();
        for provider in &self.providers {
            for (key, value) in provider.iterate_with_prefix(prefix)? {
                if seen.insert(key.clone()) {
                    pairs.push((key, value));
                }
            }
        }
        Ok(pairs)
    }
}
