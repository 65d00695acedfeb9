//! Web application bootstrap.
//!
//! Builds a settings schema from a conventional base plus static host
//! configuration, folds in per-app schemas found in the [`Registry`], and
//! publishes the result under a module name so the rest of the process can
//! find it.

use crate::error::{ConfigError, Result};
use crate::providers::Provider;
use crate::registry::Registry;
use crate::schema::{DictValueField, FieldDeclaration, Schema, Settings, ValueField};
use crate::types::{self, KeyCoercer};
use arc_swap::ArcSwap;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use tracing::debug;

/// Environment variable naming the install target when none is given.
pub const SETTINGS_MODULE_VAR: &str = "SETTINGS_MODULE";

/// Name of the schema generated by [`make_settings_schema`].
pub const SETTINGS_SCHEMA_NAME: &str = "WebSettings";

/// The conventional base schema for a web application.
pub fn base_web_schema() -> Result<Arc<Schema>> {
    Schema::builder("BaseWebSettings")
        .field("SECRET_KEY", ValueField::new(types::string()))
        .field("DEBUG", ValueField::new(types::boolean()).default(false))
        .field(
            "ALLOWED_HOSTS",
            ValueField::new(types::list(types::string())).default(json!([])),
        )
        .field(
            "DATABASES",
            DictValueField::new(types::database_url()).key_coercer(KeyCoercer::lower()),
        )
        .field(
            "CACHES",
            DictValueField::new(types::cache_url()).key_coercer(KeyCoercer::lower()),
        )
        // Internationalization
        .field("LANGUAGE_CODE", ValueField::new(types::string()).default("en-us"))
        .field("TIME_ZONE", ValueField::new(types::string()).default("UTC"))
        .field("USE_I18N", ValueField::new(types::boolean()).default(true))
        .field("USE_L10N", ValueField::new(types::boolean()).default(true))
        .field("USE_TZ", ValueField::new(types::boolean()).default(true))
        // Static files
        .field("STATIC_URL", ValueField::new(types::string()).default("/static/"))
        .build()
}

/// Extend `base` with a static field for every all-uppercase key of
/// `static_config`. Other keys are ignored.
pub fn make_settings_schema(static_config: &Map<String, Value>, base: &Schema) -> Result<Arc<Schema>> {
    static_config
        .iter()
        .filter(|(key, _)| key.to_uppercase() == **key)
        .fold(Schema::builder(SETTINGS_SCHEMA_NAME).extend(base), |builder, (key, value)| {
            builder.field(key.clone(), FieldDeclaration::Static(value.clone()))
        })
        .build()
}

/// Somewhere settings can be published by name.
pub trait InstallTarget: Send + Sync {
    /// Publish `settings` under `name`, returning what was there before.
    fn install(&self, name: &str, settings: Arc<Settings>) -> Option<Arc<Settings>>;
}

/// Process-wide name -> settings table.
pub struct ModuleTable {
    modules: ArcSwap<HashMap<String, Arc<Settings>>>,
}

static MODULES: LazyLock<ModuleTable> = LazyLock::new(ModuleTable::new);

impl ModuleTable {
    pub fn new() -> Self {
        Self {
            modules: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    /// The table [`install`] uses by default.
    pub fn global() -> &'static ModuleTable {
        &MODULES
    }

    pub fn get(&self, name: &str) -> Option<Arc<Settings>> {
        self.modules.load().get(name).cloned()
    }

    pub fn remove(&self, name: &str) -> Option<Arc<Settings>> {
        let mut removed = None;
        self.modules.rcu(|modules| {
            let mut modules = HashMap::clone(modules);
            removed = modules.remove(name);
            modules
        });
        removed
    }

    /// Installed names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.modules.load().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for ModuleTable {
    fn default() -> Self {
        Self::new()
    }
}

impl InstallTarget for ModuleTable {
    fn install(&self, name: &str, settings: Arc<Settings>) -> Option<Arc<Settings>> {
        let mut previous = None;
        self.modules.rcu(|modules| {
            let mut modules = HashMap::clone(modules);
            previous = modules.insert(name.to_string(), settings.clone());
            modules
        });
        previous
    }
}

impl std::fmt::Debug for ModuleTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleTable")
            .field("names", &self.names())
            .finish()
    }
}

/// Publish `settings` in `target` under `name`, or under the value of
/// `$SETTINGS_MODULE` when no name is given.
///
/// Installing the same name again replaces the earlier settings.
pub fn install(settings: Arc<Settings>, name: Option<&str>, target: &dyn InstallTarget) -> Result<()> {
    let name = match name.filter(|n| !n.is_empty()) {
        Some(name) => name.to_string(),
        None => std::env::var(SETTINGS_MODULE_VAR)
            .ok()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ConfigError::MissingInstallName {
                variable: SETTINGS_MODULE_VAR.to_string(),
            })?,
    };

    let replaced = target.install(&name, settings).is_some();
    debug!(%name, replaced, "Installed settings");
    Ok(())
}

/// Merge the `AppSettings` schema of every app into `settings`.
///
/// Each app id `a.b` is looked up as `a.b.settings.AppSettings` in
/// `registry`; apps without one are skipped. With `apps = None` the list is
/// read from the `INSTALLED_APPS` field, if the schema declares it.
pub fn load_apps(settings: &Settings, apps: Option<&[String]>, registry: &Registry) -> Result<Settings> {
    let installed: Vec<String> = match apps {
        Some(apps) => apps.to_vec(),
        None if settings.contains("INSTALLED_APPS") => settings.get_as("INSTALLED_APPS")?,
        None => Vec::new(),
    };

    let mut merged = settings.clone();
    for app in &installed {
        let path = format!("{app}.settings.AppSettings");
        let symbol = match registry.lookup(&path) {
            Ok(symbol) => symbol,
            Err(ConfigError::LocationNotFound { .. } | ConfigError::NameNotFound { .. }) => {
                debug!(%app, "App has no settings schema");
                continue;
            }
            Err(e) => return Err(e),
        };
        let schema = symbol.into_schema(&path)?;
        debug!(%app, fields = schema.len(), "Merging app settings");
        merged = merged.merge(&schema)?;
    }
    Ok(merged)
}

/// One-call setup: schema, app loading and install.
///
/// ```
/// use declconf::bootstrap::{Bootstrap, ModuleTable};
/// use declconf::providers::DictProvider;
/// use serde_json::json;
///
/// let table = ModuleTable::new();
/// let settings = Bootstrap::new(DictProvider::new([("SECRET_KEY", "s3cr3t")]))
///     .static_config(json!({"ROOT_URLCONF": "app.urls", "lower": 1}).as_object().unwrap().clone())
///     .name("app.settings")
///     .target(&table)
///     .apps(Vec::new())
///     .load()?;
///
/// assert_eq!(settings.get("ROOT_URLCONF")?, json!("app.urls"));
/// assert!(!settings.contains("lower"));
/// assert!(table.get("app.settings").is_some());
/// # Ok::<(), declconf::ConfigError>(())
/// ```
pub struct Bootstrap<'a> {
    provider: Arc<dyn Provider>,
    secrets: Option<Arc<dyn Provider>>,
    static_config: Map<String, Value>,
    base: Option<Arc<Schema>>,
    apps: Option<Vec<String>>,
    name: Option<String>,
    registry: Option<&'a Registry>,
    target: Option<&'a dyn InstallTarget>,
}

impl<'a> Bootstrap<'a> {
    pub fn new(provider: impl Provider + 'static) -> Self {
        Self::from_shared(Arc::new(provider))
    }

    pub fn from_shared(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            secrets: None,
            static_config: Map::new(),
            base: None,
            apps: None,
            name: None,
            registry: None,
            target: None,
        }
    }

    pub fn secrets(mut self, secrets: impl Provider + 'static) -> Self {
        self.secrets = Some(Arc::new(secrets));
        self
    }

    /// Host configuration lifted into static fields.
    pub fn static_config(mut self, static_config: Map<String, Value>) -> Self {
        self.static_config = static_config;
        self
    }

    /// Base schema (default: [`base_web_schema`]).
    pub fn base(mut self, base: Arc<Schema>) -> Self {
        self.base = Some(base);
        self
    }

    /// App ids to load (default: the `INSTALLED_APPS` field).
    pub fn apps(mut self, apps: Vec<String>) -> Self {
        self.apps = Some(apps);
        self
    }

    /// Install name (default: `$SETTINGS_MODULE`).
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Registry to find app schemas in (default: the global one).
    pub fn registry(mut self, registry: &'a Registry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Where to install (default: [`ModuleTable::global`]).
    pub fn target(mut self, target: &'a dyn InstallTarget) -> Self {
        self.target = Some(target);
        self
    }

    /// Build the settings, merge app schemas, install and return them.
    pub fn load(self) -> Result<Arc<Settings>> {
        let base = match self.base {
            Some(base) => base,
            None => base_web_schema()?,
        };
        let schema = make_settings_schema(&self.static_config, &base)?;
        let settings = Settings::from_shared(schema, self.provider, self.secrets);

        let registry = match self.registry {
            Some(registry) => registry,
            None => Registry::global(),
        };
        let settings = Arc::new(load_apps(&settings, self.apps.as_deref(), registry)?);

        let target: &dyn InstallTarget = match self.target {
            Some(target) => target,
            None => ModuleTable::global(),
        };
        install(settings.clone(), self.name.as_deref(), target)?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::providers::DictProvider;
    use crate::registry::Symbol;

    fn static_config(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_base_web_schema_defaults() {
        let settings = Settings::new(base_web_schema().unwrap(), DictProvider::new([("SECRET_KEY", "k")]));
        assert_eq!(settings.get("DEBUG").unwrap(), json!(false));
        assert_eq!(settings.get("ALLOWED_HOSTS").unwrap(), json!([]));
        assert_eq!(settings.get("LANGUAGE_CODE").unwrap(), json!("en-us"));
        assert_eq!(settings.get("STATIC_URL").unwrap(), json!("/static/"));
        assert_eq!(settings.get("DATABASES").unwrap(), json!({}));
    }

    #[test]
    fn test_make_settings_schema_keeps_uppercase_keys() {
        let schema = make_settings_schema(
            &static_config(json!({"ROOT_URLCONF": "urls", "lowercase": 1, "MixedCase": 2})),
            &base_web_schema().unwrap(),
        )
        .unwrap();
        assert_eq!(schema.name(), SETTINGS_SCHEMA_NAME);
        assert!(schema.contains("ROOT_URLCONF"));
        assert!(schema.contains("SECRET_KEY"));
        assert!(!schema.contains("lowercase"));
        assert!(!schema.contains("MixedCase"));
    }

    #[test]
    fn test_static_value_overrides_base() {
        let schema =
            make_settings_schema(&static_config(json!({"DEBUG": true})), &base_web_schema().unwrap()).unwrap();
        let settings = Settings::new(schema, DictProvider::new([("DEBUG", "false")]));
        assert_eq!(settings.get("DEBUG").unwrap(), json!(true));
    }

    #[test]
    fn test_install_replaces() {
        let table = ModuleTable::new();
        let first = Arc::new(Settings::new(base_web_schema().unwrap(), DictProvider::default()));
        let second = Arc::new(Settings::new(base_web_schema().unwrap(), DictProvider::default()));

        install(first.clone(), Some("mod"), &table).unwrap();
        assert!(Arc::ptr_eq(&table.get("mod").unwrap(), &first));
        install(second.clone(), Some("mod"), &table).unwrap();
        assert!(Arc::ptr_eq(&table.get("mod").unwrap(), &second));
        assert_eq!(table.names(), ["mod"]);
        assert!(table.remove("mod").is_some());
        assert!(table.get("mod").is_none());
    }

    #[test]
    fn test_load_apps_skips_unknown() {
        let registry = Registry::new();
        let app_schema = Schema::builder("AppSettings")
            .field("APP_FLAG", ValueField::new(types::boolean()).default(true))
            .build()
            .unwrap();
        registry.register("myapp.settings.AppSettings", Symbol::Schema(app_schema));

        let settings = Settings::new(base_web_schema().unwrap(), DictProvider::default());
        let apps = vec!["myapp".to_string(), "otherapp".to_string()];
        let merged = load_apps(&settings, Some(&apps), &registry).unwrap();
        assert_eq!(merged.get("APP_FLAG").unwrap(), json!(true));
        assert!(!settings.contains("APP_FLAG"));
    }

    #[test]
    fn test_load_apps_wrong_symbol() {
        let registry = Registry::new();
        registry.register("myapp.settings.AppSettings", Symbol::Coercer(types::string()));
        let settings = Settings::new(base_web_schema().unwrap(), DictProvider::default());
        let err = load_apps(&settings, Some(&["myapp".to_string()]), &registry).unwrap_err();
        assert_eq!(err.code(), ErrorCode::WrongSymbol);
    }
}
