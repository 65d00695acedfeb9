//! Dotted-path symbol registry.
//!
//! Coercers and schemas are published under a dotted path
//! (`myapp.settings.AppSettings`). The last segment is the member name, the
//! rest is its location. Lookups are the only way to reach code that may or
//! may not be compiled in, such as optional integrations or per-app schemas.

use crate::error::{ConfigError, Result};
use crate::schema::Schema;
use crate::types::{self, Coercer};
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use tracing::trace;

/// Something that can be published in a [`Registry`].
#[derive(Debug, Clone)]
pub enum Symbol {
    Coercer(Coercer),
    Schema(Arc<Schema>),
}

impl Symbol {
    pub fn kind(&self) -> &'static str {
        match self {
            Symbol::Coercer(_) => "coercer",
            Symbol::Schema(_) => "schema",
        }
    }

    /// Unwrap a coercer, naming `path` in the error otherwise.
    pub fn into_coercer(self, path: &str) -> Result<Coercer> {
        match self {
            Symbol::Coercer(coercer) => Ok(coercer),
            _ => Err(ConfigError::WrongSymbol {
                path: path.to_string(),
                expected: "coercer",
            }),
        }
    }

    /// Unwrap a schema, naming `path` in the error otherwise.
    pub fn into_schema(self, path: &str) -> Result<Arc<Schema>> {
        match self {
            Symbol::Schema(schema) => Ok(schema),
            _ => Err(ConfigError::WrongSymbol {
                path: path.to_string(),
                expected: "schema",
            }),
        }
    }
}

type Table = HashMap<String, HashMap<String, Symbol>>;

/// Location -> member -> symbol table.
///
/// Reads take a snapshot; writes copy and swap the whole table, so lookups
/// never block behind registration.
pub struct Registry {
    table: ArcSwap<Table>,
}

static GLOBAL: LazyLock<Registry> = LazyLock::new(Registry::with_builtins);

/// Split `path` at its last `.` into location and member name.
fn split_path(path: &str) -> Result<(&str, &str)> {
    path.rsplit_once('.')
        .filter(|(location, name)| !location.is_empty() && !name.is_empty())
        .ok_or_else(|| ConfigError::LocationNotFound {
            location: path.to_string(),
        })
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            table: ArcSwap::from_pointee(Table::new()),
        }
    }

    /// A registry pre-populated with the built-in coercers and every optional
    /// integration compiled into this build.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        for coercer in [
            types::string(),
            types::integer(),
            types::float(),
            types::boolean(),
            types::json(),
        ] {
            let name = coercer.name().to_string();
            registry.register_in(types::BUILTIN_LOCATION, &name, Symbol::Coercer(coercer));
        }

        #[cfg(feature = "url")]
        {
            registry.register_in(
                types::URL_LOCATION,
                "database_url",
                Symbol::Coercer(Coercer::new("database_url", types::urls::database_url)),
            );
            registry.register_in(
                types::URL_LOCATION,
                "cache_url",
                Symbol::Coercer(Coercer::new("cache_url", types::urls::cache_url)),
            );
        }

        registry
    }

    /// The process-wide registry.
    pub fn global() -> &'static Registry {
        &GLOBAL
    }

    /// Publish `symbol` under a dotted `path`, replacing any previous one.
    ///
    /// Paths without a location segment are ignored.
    pub fn register(&self, path: &str, symbol: Symbol) {
        match split_path(path) {
            Ok((location, name)) => self.register_in(location, name, symbol),
            Err(_) => trace!(path, "Ignoring registration without a location"),
        }
    }

    /// Publish `symbol` as member `name` of `location`.
    pub fn register_in(&self, location: &str, name: &str, symbol: Symbol) {
        trace!(location, name, kind = symbol.kind(), "Registering symbol");
        self.table.rcu(|table| {
            let mut table = Table::clone(table);
            table
                .entry(location.to_string())
                .or_default()
                .insert(name.to_string(), symbol.clone());
            table
        });
    }

    /// Remove a single member. Returns whether it existed.
    pub fn unregister(&self, path: &str) -> bool {
        let Ok((location, name)) = split_path(path) else {
            return false;
        };
        let mut removed = false;
        self.table.rcu(|table| {
            let mut table = Table::clone(table);
            removed = table
                .get_mut(location)
                .and_then(|members| members.remove(name))
                .is_some();
            table
        });
        removed
    }

    /// Whether any member is registered under `location`.
    pub fn has_location(&self, location: &str) -> bool {
        self.table.load().contains_key(location)
    }

    /// Resolve `name` inside `location`.
    pub fn lookup_in(&self, location: &str, name: &str) -> Result<Symbol> {
        let table = self.table.load();
        let members = table
            .get(location)
            .ok_or_else(|| ConfigError::LocationNotFound {
                location: location.to_string(),
            })?;
        members
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::NameNotFound {
                location: location.to_string(),
                name: name.to_string(),
            })
    }

    /// Resolve a dotted path: everything before the last `.` is the location,
    /// the rest is the member name.
    pub fn lookup(&self, path: &str) -> Result<Symbol> {
        let (location, name) = split_path(path)?;
        self.lookup_in(location, name)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let table = self.table.load();
        let mut locations: Vec<&String> = table.keys().collect();
        locations.sort();
        f.debug_struct("Registry")
            .field("locations", &locations)
            .finish()
    }
}

/// Resolve a dotted path against the global registry.
pub fn dotted_path_lookup(path: &str) -> Result<Symbol> {
    Registry::global().lookup(path)
}
