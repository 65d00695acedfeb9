//! Configuration sources.
//!
//! Every source answers two questions through [`Provider`]:
//! - `get` - the raw value stored under one key, or `None` when absent
//! - `iterate_with_prefix` - every `(key, value)` pair whose key starts with a prefix
//!
//! Providers never coerce values; typing happens in the schema layer.

mod dict;
mod dir;
mod fallback;
#[cfg(feature = "vault")]
mod vault;

pub use dict::{DictProvider, EnvProvider};
pub use dir::DirectoryProvider;
pub use fallback::FallbackProvider;
#[cfg(feature = "vault")]
pub use vault::{VaultAuth, VaultConfig, VaultProvider};

use crate::error::{ConfigError, Result};
use std::sync::Arc;

/// A raw, uncoerced configuration value.
pub type RawValue = String;

/// Uniform key/value lookup over a configuration source.
///
/// The default method bodies fail with [`ConfigError::Unimplemented`], so a
/// type that implements neither method behaves as the bare capability.
pub trait Provider: Send + Sync {
    /// Look up a single key.
    ///
    /// A missing key is `Ok(None)`. Errors are reserved for failures that are
    /// distinct from absence, such as a permission denied on the backing file.
    fn get(&self, key: &str) -> Result<Option<RawValue>> {
        let _ = key;
        Err(ConfigError::Unimplemented { operation: "get" })
    }

    /// Enumerate every key starting with `prefix`.
    ///
    /// Returned keys have the provider's own fixed prefix (if any) stripped but
    /// keep `prefix` itself.
    fn iterate_with_prefix(&self, prefix: &str) -> Result<Vec<(String, RawValue)>> {
        let _ = prefix;
        Err(ConfigError::Unimplemented {
            operation: "iterate_with_prefix",
        })
    }
}

impl<P: Provider + ?Sized> Provider for Arc<P> {
    fn get(&self, key: &str) -> Result<Option<RawValue>> {
        (**self).get(key)
    }

    fn iterate_with_prefix(&self, prefix: &str) -> Result<Vec<(String, RawValue)>> {
        (**self).iterate_with_prefix(prefix)
    }
}

impl<P: Provider + ?Sized> Provider for Box<P> {
    fn get(&self, key: &str) -> Result<Option<RawValue>> {
        (**self).get(key)
    }

    fn iterate_with_prefix(&self, prefix: &str) -> Result<Vec<(String, RawValue)>> {
        (**self).iterate_with_prefix(prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    struct Bare;
    impl Provider for Bare {}

    #[test]
    fn test_bare_provider_is_unimplemented() {
        let provider = Bare;
        let err = provider.get("key").unwrap_err();
        assert_eq!(err.code(), ErrorCode::Unimplemented);

        let err = provider.iterate_with_prefix("prefix").unwrap_err();
        assert_eq!(err.code(), ErrorCode::Unimplemented);
    }

    #[test]
    fn test_arc_forwards() {
        let provider: Arc<dyn Provider> = Arc::new(DictProvider::new([("KEY", "1")]));
        assert_eq!(provider.get("KEY").unwrap().as_deref(), Some("1"));
        assert_eq!(provider.iterate_with_prefix("K").unwrap().len(), 1);
    }
}
