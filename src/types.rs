//! Type coercers for field declarations.
//!
//! A [`Coercer`] turns one raw provider string into a typed [`Value`]. The
//! built-in coercers cover the common scalar shapes; [`LazyCallable`] defers
//! to a coercer registered elsewhere and resolves it on first use.

use crate::error::CoercionError;
use crate::registry::Registry;
use heck::ToSnakeCase;
use serde_json::{Number, Value};
use std::fmt;
use std::sync::{Arc, LazyLock, OnceLock};

/// Registry location holding the built-in coercers.
pub const BUILTIN_LOCATION: &str = "declconf.types";

/// Registry location of the optional URL integration.
pub const URL_LOCATION: &str = "url";

type CoerceFn = dyn Fn(&str) -> Result<Value, CoercionError> + Send + Sync;

/// A named, shareable raw-string to typed-value function.
#[derive(Clone)]
pub struct Coercer {
    name: Arc<str>,
    func: Arc<CoerceFn>,
}

impl Coercer {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&str) -> Result<Value, CoercionError> + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name.into()),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Apply the coercer to a raw value.
    pub fn coerce(&self, raw: &str) -> Result<Value, CoercionError> {
        (self.func)(raw)
    }

    /// Whether both handles share the same underlying function.
    pub fn ptr_eq(a: &Coercer, b: &Coercer) -> bool {
        Arc::ptr_eq(&a.func, &b.func)
    }
}

impl fmt::Debug for Coercer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Coercer({})", self.name)
    }
}

/// The raw string, unchanged.
pub fn string() -> Coercer {
    Coercer::new("string", |raw| Ok(Value::String(raw.to_string())))
}

/// A signed 64-bit integer; surrounding whitespace is ignored.
pub fn integer() -> Coercer {
    Coercer::new("integer", |raw| {
        raw.trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| CoercionError::invalid("integer", raw))
    })
}

/// A finite 64-bit float; surrounding whitespace is ignored.
pub fn float() -> Coercer {
    Coercer::new("float", |raw| {
        raw.trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| CoercionError::invalid("float", raw))
    })
}

/// Truthy strings, case-insensitive.
const TRUTHY: [&str; 5] = ["1", "true", "yes", "on", "y"];

/// `true` for `1`, `true`, `yes`, `on`, `y` in any case; `false` for anything
/// else, including the empty string.
pub fn boolean() -> Coercer {
    Coercer::new("boolean", |raw| {
        let lower = raw.to_lowercase();
        Ok(Value::Bool(TRUTHY.contains(&lower.as_str())))
    })
}

/// The raw string parsed as JSON.
pub fn json() -> Coercer {
    Coercer::new("json", |raw| {
        serde_json::from_str(raw).map_err(|e| CoercionError::message(format!("invalid JSON: {e}")))
    })
}

/// A comma separated list, each element trimmed and passed to `inner`.
///
/// The empty string is a single empty element, so `list(string())` maps `""`
/// to `[""]` and `list(integer())` rejects it.
pub fn list(inner: Coercer) -> Coercer {
    list_with_separator(inner, ",")
}

/// Like [`list`] with a custom separator.
pub fn list_with_separator(inner: Coercer, separator: &str) -> Coercer {
    let separator = separator.to_string();
    let name = format!("list({})", inner.name());
    Coercer::new(name, move |raw| {
        raw.split(separator.as_str())
            .map(|item| inner.coerce(item.trim()))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array)
    })
}

/// Resolves a coercer from a [`Registry`] on first invocation.
///
/// The outcome of the first resolution is kept for the lifetime of the
/// value: a coercer that was found is reused, and one that was not found
/// makes every call fail with [`CoercionError::Unavailable`] without looking
/// it up again.
pub struct LazyCallable {
    location: String,
    path: String,
    registry: Option<Arc<Registry>>,
    resolved: OnceLock<Option<Coercer>>,
}

impl LazyCallable {
    /// Defer to `path` inside `location` of the global registry.
    pub fn new(location: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            path: path.into(),
            registry: None,
            resolved: OnceLock::new(),
        }
    }

    /// Resolve against `registry` instead of the global one.
    pub fn in_registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// `location.path`, as used in error messages.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.location, self.path)
    }

    /// The resolved coercer, resolving it if this is the first request.
    pub fn resolve(&self) -> Result<Coercer, CoercionError> {
        let resolved = self.resolved.get_or_init(|| {
            let registry = self.registry.as_deref().unwrap_or_else(|| Registry::global());
            registry
                .lookup_in(&self.location, &self.path)
                .and_then(|symbol| symbol.into_coercer(&self.qualified_name()))
                .ok()
        });

        resolved.clone().ok_or_else(|| CoercionError::Unavailable {
            name: self.qualified_name(),
        })
    }

    pub fn call(&self, raw: &str) -> Result<Value, CoercionError> {
        self.resolve()?.coerce(raw)
    }
}

impl fmt::Debug for LazyCallable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyCallable")
            .field("target", &self.qualified_name())
            .field("resolved", &self.resolved.get().map(Option::is_some))
            .finish()
    }
}

impl From<LazyCallable> for Coercer {
    fn from(lazy: LazyCallable) -> Self {
        Arc::new(lazy).into()
    }
}

impl From<Arc<LazyCallable>> for Coercer {
    fn from(lazy: Arc<LazyCallable>) -> Self {
        Coercer::new(format!("lazy({})", lazy.qualified_name()), move |raw| {
            lazy.call(raw)
        })
    }
}

static DATABASE_URL: LazyLock<Arc<LazyCallable>> =
    LazyLock::new(|| Arc::new(LazyCallable::new(URL_LOCATION, "database_url")));

static CACHE_URL: LazyLock<Arc<LazyCallable>> =
    LazyLock::new(|| Arc::new(LazyCallable::new(URL_LOCATION, "cache_url")));

/// A database URL split into `ENGINE`, `NAME`, `USER`, `PASSWORD`, `HOST`,
/// `PORT` (and `OPTIONS` for query parameters).
///
/// Needs the `url` feature; without it every call fails as unavailable.
pub fn database_url() -> Coercer {
    DATABASE_URL.clone().into()
}

/// A cache URL split into `BACKEND` and `LOCATION`.
///
/// Needs the `url` feature; without it every call fails as unavailable.
pub fn cache_url() -> Coercer {
    CACHE_URL.clone().into()
}

#[cfg(feature = "url")]
pub(crate) mod urls {
    use crate::error::CoercionError;
    use serde_json::{Map, Value};
    use url::Url;

    fn decode(part: &str) -> String {
        urlencoding::decode(part)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| part.to_string())
    }

    fn parse(raw: &str) -> Result<Url, CoercionError> {
        Url::parse(raw.trim()).map_err(|e| CoercionError::message(format!("invalid URL: {e}")))
    }

    fn engine(scheme: &str) -> &str {
        match scheme {
            "postgres" | "postgresql" | "pgsql" | "postgis" => "postgresql",
            "mysql" | "mysql2" => "mysql",
            "sqlite" | "sqlite3" => "sqlite3",
            "oracle" => "oracle",
            other => other,
        }
    }

    pub fn database_url(raw: &str) -> Result<Value, CoercionError> {
        let url = parse(raw)?;
        let mut out = Map::new();
        out.insert("ENGINE".into(), engine(url.scheme()).into());
        let path = url.path();
        out.insert(
            "NAME".into(),
            decode(path.strip_prefix('/').unwrap_or(path)).into(),
        );
        out.insert("USER".into(), decode(url.username()).into());
        out.insert(
            "PASSWORD".into(),
            url.password().map(decode).unwrap_or_default().into(),
        );
        out.insert(
            "HOST".into(),
            url.host_str().map(decode).unwrap_or_default().into(),
        );
        out.insert(
            "PORT".into(),
            url.port().map(|p| p.to_string()).unwrap_or_default().into(),
        );

        let options: Map<String, Value> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
            .collect();
        if !options.is_empty() {
            out.insert("OPTIONS".into(), Value::Object(options));
        }
        Ok(Value::Object(out))
    }

    pub fn cache_url(raw: &str) -> Result<Value, CoercionError> {
        let url = parse(raw)?;
        let backend = match url.scheme() {
            "redis" | "rediss" => "redis",
            "memcache" | "memcached" | "pymemcache" => "memcached",
            "file" => "filebased",
            other => other,
        };

        let location = match backend {
            "redis" => raw.trim().to_string(),
            "filebased" => url.path().to_string(),
            _ => {
                let mut location = url.host_str().unwrap_or_default().to_string();
                if let Some(port) = url.port() {
                    location.push_str(&format!(":{port}"));
                }
                let path = url.path();
                if path != "/" && !path.is_empty() {
                    location.push_str(path);
                }
                location
            }
        };

        let mut out = Map::new();
        out.insert("BACKEND".into(), backend.into());
        out.insert("LOCATION".into(), location.into());
        Ok(Value::Object(out))
    }
}

type KeyFn = dyn Fn(&str) -> String + Send + Sync;

/// Normalizes the keys produced by `DictValue` / `DictSecret` fields.
#[derive(Clone)]
pub struct KeyCoercer {
    name: Arc<str>,
    func: Arc<KeyFn>,
}

impl KeyCoercer {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name.into()),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn apply(&self, key: &str) -> String {
        (self.func)(key)
    }

    /// Keys unchanged.
    pub fn identity() -> Self {
        Self::new("identity", str::to_string)
    }

    pub fn lower() -> Self {
        Self::new("lower", str::to_lowercase)
    }

    pub fn upper() -> Self {
        Self::new("upper", str::to_uppercase)
    }

    /// `PrimaryReplica` and `PRIMARY_REPLICA` both become `primary_replica`.
    pub fn snake_case() -> Self {
        Self::new("snake_case", |key| key.to_snake_case())
    }
}

impl Default for KeyCoercer {
    fn default() -> Self {
        Self::identity()
    }
}

impl fmt::Debug for KeyCoercer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyCoercer({})", self.name)
    }
}
