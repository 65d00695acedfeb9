//! Declarative configuration schemas.
//!
//! Declare the settings an application needs once, as a [`Schema`] of typed
//! fields, and read them lazily from one or more [`Provider`]s: in-memory
//! maps, the process environment, a directory of files (container secrets),
//! a remote secret store, or any ordered combination.
//!
//! ```
//! use declconf::{DictProvider, Schema, Settings, ValueField, types};
//!
//! let schema = Schema::builder("AppSettings")
//!     .field("DEBUG", ValueField::new(types::boolean()).default(false))
//!     .field("ALLOWED_HOSTS", ValueField::new(types::list(types::string())))
//!     .build()?;
//!
//! let settings = Settings::new(schema, DictProvider::new([("ALLOWED_HOSTS", "a.com,b.com")]));
//! assert_eq!(settings.get_as::<Vec<String>>("ALLOWED_HOSTS")?, ["a.com", "b.com"]);
//! # Ok::<(), declconf::ConfigError>(())
//! ```

pub mod bootstrap;
pub mod error;
pub mod logging;
pub mod providers;
pub mod registry;
pub mod schema;
pub mod types;

pub use error::{CoercionError, ConfigError, ErrorCode, Result};
pub use providers::{DictProvider, DirectoryProvider, EnvProvider, FallbackProvider, Provider, RawValue};
#[cfg(feature = "vault")]
pub use providers::{VaultAuth, VaultConfig, VaultProvider};
pub use registry::{Registry, Symbol, dotted_path_lookup};
pub use schema::{
    ComputedValue, DictSecretField, DictValueField, Dictionary, FieldDeclaration, Mixin, Schema,
    SchemaBuilder, SecretField, Settings, ValueField, computed_value, reference,
};
pub use types::{Coercer, KeyCoercer, LazyCallable};
