//! Field declarations and their resolution.
//!
//! A declaration describes how one configuration value is obtained. It is
//! evaluated against a [`Settings`] instance every time the field is read;
//! nothing is memoized between reads.

use super::Settings;
use crate::error::{ConfigError, CoercionError, Result};
use crate::providers::{Provider, RawValue};
use crate::types::{Coercer, KeyCoercer};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Value used when a field has nothing in its provider.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    /// Returned as-is, without coercion.
    Literal(Value),
    /// The resolved value of another field on the same instance.
    Reference(String),
}

/// Default to whatever `field` resolves to on the same instance.
pub fn reference(field: impl Into<String>) -> DefaultValue {
    DefaultValue::Reference(field.into())
}

impl From<Value> for DefaultValue {
    fn from(value: Value) -> Self {
        DefaultValue::Literal(value)
    }
}

impl From<&str> for DefaultValue {
    fn from(value: &str) -> Self {
        DefaultValue::Literal(Value::String(value.to_string()))
    }
}

impl From<String> for DefaultValue {
    fn from(value: String) -> Self {
        DefaultValue::Literal(Value::String(value))
    }
}

impl From<bool> for DefaultValue {
    fn from(value: bool) -> Self {
        DefaultValue::Literal(Value::Bool(value))
    }
}

impl From<i64> for DefaultValue {
    fn from(value: i64) -> Self {
        DefaultValue::Literal(Value::from(value))
    }
}

/// A single value read from the primary provider.
#[derive(Debug, Clone)]
pub struct ValueField {
    coercer: Coercer,
    default: Option<DefaultValue>,
    key: Option<String>,
}

impl ValueField {
    pub fn new(coercer: Coercer) -> Self {
        Self {
            coercer,
            default: None,
            key: None,
        }
    }

    /// Make the field optional.
    pub fn default(mut self, default: impl Into<DefaultValue>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Look up `key` instead of the field name.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}

/// A single value read from the secrets provider, optionally falling back to
/// the primary provider.
#[derive(Debug, Clone)]
pub struct SecretField {
    coercer: Coercer,
    default: Option<DefaultValue>,
    key: Option<String>,
    fallback: bool,
}

impl SecretField {
    pub fn new(coercer: Coercer) -> Self {
        Self {
            coercer,
            default: None,
            key: None,
            fallback: false,
        }
    }

    pub fn default(mut self, default: impl Into<DefaultValue>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Consult the primary provider when the secrets provider has no value.
    pub fn fallback(mut self, fallback: bool) -> Self {
        self.fallback = fallback;
        self
    }
}

/// Every `{name}_*` key of the primary provider, as a mapping.
#[derive(Debug, Clone)]
pub struct DictValueField {
    coercer: Coercer,
    key_coercer: KeyCoercer,
    key: Option<String>,
    strict_keys: bool,
}

impl DictValueField {
    pub fn new(coercer: Coercer) -> Self {
        Self {
            coercer,
            key_coercer: KeyCoercer::identity(),
            key: None,
            strict_keys: false,
        }
    }

    /// Normalize each suffix key before inserting it.
    pub fn key_coercer(mut self, key_coercer: KeyCoercer) -> Self {
        self.key_coercer = key_coercer;
        self
    }

    /// Use `{key}_` as the prefix instead of `{field name}_`.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Fail when two raw keys normalize to the same key instead of letting
    /// the last one win.
    pub fn strict_keys(mut self) -> Self {
        self.strict_keys = true;
        self
    }

    fn prefix(&self, name: &str) -> String {
        format!("{}_", self.key.as_deref().unwrap_or(name))
    }

    fn collect_into(
        &self,
        out: &mut Map<String, Value>,
        prefix: &str,
        pairs: Vec<(String, RawValue)>,
        only_missing: bool,
    ) -> Result<()> {
        for (raw_key, raw) in pairs {
            let Some(suffix) = raw_key.strip_prefix(prefix) else {
                continue;
            };
            let key = self.key_coercer.apply(suffix);
            if only_missing && out.contains_key(&key) {
                continue;
            }
            if self.strict_keys && out.contains_key(&key) {
                return Err(ConfigError::coercion(
                    &raw_key,
                    CoercionError::message(format!("duplicate key {key:?} after normalization")),
                ));
            }
            let value = self
                .coercer
                .coerce(&raw)
                .map_err(|e| ConfigError::coercion(&raw_key, e))?;
            out.insert(key, value);
        }
        Ok(())
    }
}

/// [`DictValueField`] read from the secrets provider.
///
/// With fallback enabled and no secret entries at all, the primary
/// provider's entries are used instead.
#[derive(Debug, Clone)]
pub struct DictSecretField {
    dict: DictValueField,
    fallback: bool,
}

impl DictSecretField {
    pub fn new(coercer: Coercer) -> Self {
        Self {
            dict: DictValueField::new(coercer),
            fallback: false,
        }
    }

    pub fn key_coercer(mut self, key_coercer: KeyCoercer) -> Self {
        self.dict = self.dict.key_coercer(key_coercer);
        self
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.dict = self.dict.key(key);
        self
    }

    pub fn strict_keys(mut self) -> Self {
        self.dict = self.dict.strict_keys();
        self
    }

    pub fn fallback(mut self, fallback: bool) -> Self {
        self.fallback = fallback;
        self
    }
}

/// Extra arguments handed to a computed value's function on every call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComputedArgs {
    pub positional: Vec<Value>,
    pub named: Map<String, Value>,
}

type ComputedFn = dyn Fn(&Settings, &ComputedArgs) -> anyhow::Result<Value> + Send + Sync;

/// A value derived from the settings instance by a function.
#[derive(Clone)]
pub struct ComputedValue {
    func: Arc<ComputedFn>,
    args: ComputedArgs,
}

impl ComputedValue {
    /// Wrap a function receiving the settings and the bound arguments.
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&Settings, &ComputedArgs) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self {
            func: Arc::new(func),
            args: ComputedArgs::default(),
        }
    }

    /// Bind positional and named arguments.
    pub fn with_args(mut self, positional: Vec<Value>, named: Map<String, Value>) -> Self {
        self.args = ComputedArgs { positional, named };
        self
    }

    pub fn args(&self) -> &ComputedArgs {
        &self.args
    }
}

impl fmt::Debug for ComputedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputedValue")
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

/// Build a computed value from a function of the settings alone.
///
/// Anything serializable may be returned.
pub fn computed_value<F, T>(func: F) -> ComputedValue
where
    F: Fn(&Settings) -> anyhow::Result<T> + Send + Sync + 'static,
    T: Serialize,
{
    ComputedValue::new(move |settings, _| Ok(serde_json::to_value(func(settings)?)?))
}

/// A nested mapping of sub-declarations resolved together.
///
/// Each entry is resolved as if it were a field named after its key.
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    entries: Vec<(String, FieldDeclaration)>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(mut self, name: impl Into<String>, declaration: impl Into<FieldDeclaration>) -> Self {
        let name = name.into();
        let declaration = declaration.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = declaration,
            None => self.entries.push((name, declaration)),
        }
        self
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &FieldDeclaration)> {
        self.entries.iter().map(|(n, d)| (n.as_str(), d))
    }
}

/// How one configuration field is resolved.
#[derive(Debug, Clone)]
pub enum FieldDeclaration {
    Value(ValueField),
    Computed(ComputedValue),
    DictValue(DictValueField),
    Secret(SecretField),
    DictSecret(DictSecretField),
    Dictionary(Dictionary),
    /// A fixed value, independent of any provider.
    Static(Value),
}

impl From<ValueField> for FieldDeclaration {
    fn from(field: ValueField) -> Self {
        FieldDeclaration::Value(field)
    }
}

impl From<ComputedValue> for FieldDeclaration {
    fn from(field: ComputedValue) -> Self {
        FieldDeclaration::Computed(field)
    }
}

impl From<DictValueField> for FieldDeclaration {
    fn from(field: DictValueField) -> Self {
        FieldDeclaration::DictValue(field)
    }
}

impl From<SecretField> for FieldDeclaration {
    fn from(field: SecretField) -> Self {
        FieldDeclaration::Secret(field)
    }
}

impl From<DictSecretField> for FieldDeclaration {
    fn from(field: DictSecretField) -> Self {
        FieldDeclaration::DictSecret(field)
    }
}

impl From<Dictionary> for FieldDeclaration {
    fn from(field: Dictionary) -> Self {
        FieldDeclaration::Dictionary(field)
    }
}

impl From<Value> for FieldDeclaration {
    fn from(value: Value) -> Self {
        FieldDeclaration::Static(value)
    }
}

/// Shared tail of `Value` and `Secret` resolution once the lookup is done.
fn finish_single(
    settings: &Settings,
    key: &str,
    raw: Option<RawValue>,
    coercer: &Coercer,
    default: Option<&DefaultValue>,
) -> Result<Value> {
    match (raw, default) {
        (Some(raw), _) => coercer
            .coerce(&raw)
            .map_err(|e| ConfigError::coercion(key, e)),
        (None, None) => Err(ConfigError::missing(key)),
        (None, Some(DefaultValue::Literal(value))) => Ok(value.clone()),
        (None, Some(DefaultValue::Reference(target))) => settings.get(target),
    }
}

impl FieldDeclaration {
    /// Resolve this declaration as field `name` of `settings`.
    pub fn resolve(&self, settings: &Settings, name: &str) -> Result<Value> {
        match self {
            FieldDeclaration::Value(field) => {
                let key = field.key.as_deref().unwrap_or(name);
                let raw = settings.provider().get(key)?;
                finish_single(settings, key, raw, &field.coercer, field.default.as_ref())
            }
            FieldDeclaration::Secret(field) => {
                let key = field.key.as_deref().unwrap_or(name);
                let mut raw = match settings.secrets_provider() {
                    Some(secrets) => secrets.get(key)?,
                    None => None,
                };
                if raw.is_none() && field.fallback {
                    raw = settings.provider().get(key)?;
                }
                finish_single(settings, key, raw, &field.coercer, field.default.as_ref())
            }
            FieldDeclaration::Computed(field) => (field.func)(settings, &field.args)
                .map_err(|source| match source.downcast::<ConfigError>() {
                    Ok(err) => err,
                    Err(source) => ConfigError::Computed {
                        field: name.to_string(),
                        source,
                    },
                }),
            FieldDeclaration::DictValue(field) => {
                let prefix = field.prefix(name);
                let mut out = Map::new();
                let pairs = settings.provider().iterate_with_prefix(&prefix)?;
                field.collect_into(&mut out, &prefix, pairs, false)?;
                Ok(Value::Object(out))
            }
            FieldDeclaration::DictSecret(field) => {
                let prefix = field.dict.prefix(name);
                let mut out = Map::new();
                if let Some(secrets) = settings.secrets_provider() {
                    let pairs = secrets.iterate_with_prefix(&prefix)?;
                    field.dict.collect_into(&mut out, &prefix, pairs, false)?;
                }
                if field.fallback && out.is_empty() {
                    let pairs = settings.provider().iterate_with_prefix(&prefix)?;
                    field.dict.collect_into(&mut out, &prefix, pairs, true)?;
                }
                Ok(Value::Object(out))
            }
            FieldDeclaration::Dictionary(dict) => {
                let mut out = Map::new();
                for (key, declaration) in &dict.entries {
                    out.insert(key.clone(), declaration.resolve(settings, key)?);
                }
                Ok(Value::Object(out))
            }
            FieldDeclaration::Static(value) => Ok(value.clone()),
        }
    }

    /// Names of the fields this declaration reads through reference defaults,
    /// including those of nested dictionary entries.
    pub fn references(&self) -> Vec<&str> {
        match self {
            FieldDeclaration::Value(ValueField {
                default: Some(DefaultValue::Reference(target)),
                ..
            })
            | FieldDeclaration::Secret(SecretField {
                default: Some(DefaultValue::Reference(target)),
                ..
            }) => vec![target.as_str()],
            FieldDeclaration::Dictionary(dict) => dict
                .entries
                .iter()
                .flat_map(|(_, declaration)| declaration.references())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Short variant name, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            FieldDeclaration::Value(_) => "value",
            FieldDeclaration::Computed(_) => "computed",
            FieldDeclaration::DictValue(_) => "dict_value",
            FieldDeclaration::Secret(_) => "secret",
            FieldDeclaration::DictSecret(_) => "dict_secret",
            FieldDeclaration::Dictionary(_) => "dictionary",
            FieldDeclaration::Static(_) => "static",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::DictProvider;
    use crate::schema::Schema;
    use crate::types;
    use serde_json::json;

    fn settings_with(field: impl Into<FieldDeclaration>, entries: &[(&str, &str)]) -> Settings {
        let schema = Schema::builder("Test").field("FIELD", field).build().unwrap();
        Settings::new(schema, DictProvider::new(entries.iter().copied()))
    }

    #[test]
    fn test_override_key() {
        let settings = settings_with(
            ValueField::new(types::integer()).key("OTHER"),
            &[("FIELD", "1"), ("OTHER", "2")],
        );
        assert_eq!(settings.get("FIELD").unwrap(), json!(2));
    }

    #[test]
    fn test_missing_names_effective_key() {
        let settings = settings_with(ValueField::new(types::integer()).key("OTHER"), &[]);
        let err = settings.get("FIELD").unwrap_err();
        assert_eq!(err.to_string(), "no value set for OTHER");
    }

    #[test]
    fn test_literal_default_is_not_coerced() {
        let settings = settings_with(ValueField::new(types::integer()).default("not a number"), &[]);
        assert_eq!(settings.get("FIELD").unwrap(), json!("not a number"));
    }

    #[test]
    fn test_dict_value_override_key_and_key_coercer() {
        let settings = settings_with(
            DictValueField::new(types::integer())
                .key("PORTS")
                .key_coercer(KeyCoercer::lower()),
            &[("PORTS_HTTP", "80"), ("PORTS_HTTPS", "443"), ("FIELD_X", "1")],
        );
        assert_eq!(
            settings.get("FIELD").unwrap(),
            json!({"http": 80, "https": 443})
        );
    }

    #[test]
    fn test_dict_value_collision_last_wins() {
        let settings = settings_with(
            DictValueField::new(types::string()).key_coercer(KeyCoercer::lower()),
            &[("FIELD_A", "upper"), ("FIELD_a", "lower")],
        );
        // Enumeration is ordered by raw key: "FIELD_A" < "FIELD_a"
        assert_eq!(settings.get("FIELD").unwrap(), json!({"a": "lower"}));
    }

    #[test]
    fn test_dict_value_strict_keys_rejects_collision() {
        let settings = settings_with(
            DictValueField::new(types::string())
                .key_coercer(KeyCoercer::lower())
                .strict_keys(),
            &[("FIELD_A", "upper"), ("FIELD_a", "lower")],
        );
        let err = settings.get("FIELD").unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::CoercionFailure);
    }

    #[test]
    fn test_dict_value_coercion_failure_names_raw_key() {
        let settings = settings_with(DictValueField::new(types::integer()), &[("FIELD_A", "x")]);
        let err = settings.get("FIELD").unwrap_err();
        assert!(err.to_string().contains("FIELD_A"));
    }

    #[test]
    fn test_computed_value_args() {
        let mut named = Map::new();
        named.insert("suffix".into(), json!("!"));
        let computed = ComputedValue::new(|settings, args| {
            let base: String = settings.get_as("NAME")?;
            let times = args.positional[0].as_u64().unwrap_or(1) as usize;
            let suffix = args.named["suffix"].as_str().unwrap_or_default();
            Ok(json!(format!("{}{}", base.repeat(times), suffix)))
        })
        .with_args(vec![json!(2)], named);

        let schema = Schema::builder("Test")
            .field("NAME", ValueField::new(types::string()))
            .field("SHOUT", computed)
            .build()
            .unwrap();
        let settings = Settings::new(schema, DictProvider::new([("NAME", "ab")]));
        assert_eq!(settings.get("SHOUT").unwrap(), json!("abab!"));
    }

    #[test]
    fn test_computed_value_passes_config_errors_through() {
        let schema = Schema::builder("Test")
            .field("NAME", ValueField::new(types::string()))
            .field("UPPER", computed_value(|s| Ok(s.get_as::<String>("NAME")?.to_uppercase())))
            .build()
            .unwrap();
        let settings = Settings::new(schema, DictProvider::default());
        let err = settings.get("UPPER").unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::MissingRequiredValue);
    }

    #[test]
    fn test_computed_value_wraps_foreign_errors() {
        let settings = settings_with(
            computed_value(|_| -> anyhow::Result<i64> { anyhow::bail!("boom") }),
            &[],
        );
        let err = settings.get("FIELD").unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::ComputedValueFailure);
        assert_eq!(err.to_string(), "computed value FIELD failed: boom");
    }

    #[test]
    fn test_dictionary_keeps_declared_order() {
        let settings = settings_with(
            Dictionary::new()
                .entry("HOST", ValueField::new(types::string()).default("localhost"))
                .entry("PORT", ValueField::new(types::integer()))
                .entry("DEBUG", ValueField::new(types::boolean()).default(false)),
            &[("PORT", "8080")],
        );
        let value = settings.get("FIELD").unwrap();
        let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        assert_eq!(keys, ["HOST", "PORT", "DEBUG"]);
        assert_eq!(value, json!({"HOST": "localhost", "PORT": 8080, "DEBUG": false}));
    }

    #[test]
    fn test_static_value() {
        let settings = settings_with(json!(["a", "b"]), &[("FIELD", "ignored")]);
        assert_eq!(settings.get("FIELD").unwrap(), json!(["a", "b"]));
    }

    #[test]
    fn test_references_include_nested_entries() {
        let declaration: FieldDeclaration = Dictionary::new()
            .entry("A", ValueField::new(types::string()).default(reference("X")))
            .entry("B", SecretField::new(types::string()).default(reference("Y")))
            .into();
        assert_eq!(declaration.references(), vec!["X", "Y"]);
        assert_eq!(declaration.kind(), "dictionary");
    }
}
