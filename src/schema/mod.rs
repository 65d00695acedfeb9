//! Declarative settings schemas.
//!
//! A [`Schema`] is an immutable, ordered table of named field declarations
//! built once through [`SchemaBuilder`]. A [`Settings`] instance pairs a schema
//! with its providers and resolves fields on demand:
//!
//! ```
//! use declconf::schema::{Schema, Settings, ValueField, reference};
//! use declconf::providers::DictProvider;
//! use declconf::types;
//!
//! let schema = Schema::builder("AppSettings")
//!     .field("PORT", ValueField::new(types::integer()))
//!     .field("ADMIN_PORT", ValueField::new(types::integer()).default(reference("PORT")))
//!     .field("DEBUG", ValueField::new(types::boolean()).default(false))
//!     .build()?;
//!
//! let settings = Settings::new(schema, DictProvider::new([("PORT", "8080")]));
//! assert_eq!(settings.get_as::<u16>("ADMIN_PORT")?, 8080);
//! assert!(!settings.get_as::<bool>("DEBUG")?);
//! # Ok::<(), declconf::ConfigError>(())
//! ```

mod fields;
mod merge;

pub use fields::{
    ComputedArgs, ComputedValue, DefaultValue, DictSecretField, DictValueField, Dictionary,
    FieldDeclaration, SecretField, ValueField, computed_value, reference,
};

use crate::error::{ConfigError, Result};
use crate::providers::Provider;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A declaration bound to a name within a schema.
#[derive(Debug, Clone)]
pub struct BoundField {
    name: String,
    declaration: Arc<FieldDeclaration>,
    origin: String,
}

impl BoundField {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declaration(&self) -> &FieldDeclaration {
        &self.declaration
    }

    /// Name of the schema or mixin that declared this field.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Resolve this field against `settings`' providers.
    pub fn resolve(&self, settings: &Settings) -> Result<Value> {
        self.declaration.resolve(settings, &self.name)
    }
}

/// A named group of declarations that is not a schema of its own.
///
/// Mixins are folded into schemas with [`SchemaBuilder::include`].
#[derive(Debug, Clone, Default)]
pub struct Mixin {
    name: String,
    fields: Vec<(String, FieldDeclaration)>,
}

impl Mixin {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, declaration: impl Into<FieldDeclaration>) -> Self {
        self.fields.push((name.into(), declaration.into()));
        self
    }

    fn bound(&self) -> Vec<BoundField> {
        self.fields
            .iter()
            .map(|(name, declaration)| BoundField {
                name: name.clone(),
                declaration: Arc::new(declaration.clone()),
                origin: self.name.clone(),
            })
            .collect()
    }
}

/// Immutable, ordered table of bound fields.
pub struct Schema {
    name: String,
    fields: Vec<BoundField>,
    index: HashMap<String, usize>,
}

impl Schema {
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(name)
    }

    fn from_fields(name: String, fields: Vec<BoundField>) -> Result<Arc<Self>> {
        merge::validate_references(&fields)?;
        let index = fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.clone(), i))
            .collect();
        Ok(Arc::new(Self {
            name,
            fields,
            index,
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn field(&self, name: &str) -> Option<&BoundField> {
        self.index.get(name).map(|&i| &self.fields[i])
    }

    /// Fields in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &BoundField)> {
        self.fields.iter().map(|f| (f.name.as_str(), f))
    }

    /// Field names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Resolve field `name` against `settings`' providers.
    pub fn resolve(&self, settings: &Settings, name: &str) -> Result<Value> {
        self.field(name)
            .ok_or_else(|| ConfigError::unknown_field(name))?
            .resolve(settings)
    }

    /// A new schema with every field of `others` bound on top of this one.
    ///
    /// Later schemas win on name clashes. The result keeps this schema's name.
    pub fn merge(&self, others: &[&Schema]) -> Result<Arc<Schema>> {
        let tables = std::iter::once(self.fields.clone())
            .chain(others.iter().map(|other| other.fields.clone()));
        Self::from_fields(self.name.clone(), merge::merge_all(tables))
    }
}

impl<'a> IntoIterator for &'a Schema {
    type Item = (&'a str, &'a BoundField);
    type IntoIter = Box<dyn Iterator<Item = (&'a str, &'a BoundField)> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("name", &self.name)
            .field("fields", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

/// Assembles a [`Schema`].
///
/// Inherited fields (from [`extend`](Self::extend) and
/// [`include`](Self::include)) come first in the order they were added, later
/// sources replacing earlier ones of the same name. Fields declared with
/// [`field`](Self::field) are applied last and always win; a redeclared
/// inherited field keeps its inherited position.
#[derive(Debug)]
pub struct SchemaBuilder {
    name: String,
    inherited: Vec<Vec<BoundField>>,
    own: Vec<BoundField>,
}

impl SchemaBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inherited: Vec::new(),
            own: Vec::new(),
        }
    }

    /// Inherit every field of `parent`.
    pub fn extend(mut self, parent: &Schema) -> Self {
        self.inherited.push(parent.fields.clone());
        self
    }

    /// Inherit every field of a mixin.
    pub fn include(mut self, mixin: &Mixin) -> Self {
        self.inherited.push(mixin.bound());
        self
    }

    /// Declare a field on this schema.
    pub fn field(mut self, name: impl Into<String>, declaration: impl Into<FieldDeclaration>) -> Self {
        let field = BoundField {
            name: name.into(),
            declaration: Arc::new(declaration.into()),
            origin: self.name.clone(),
        };
        self.own = merge::merge_fields(std::mem::take(&mut self.own), [field]);
        self
    }

    /// Bind everything into an immutable schema.
    ///
    /// Fails if a reference default names an undeclared field or if
    /// references form a cycle.
    pub fn build(self) -> Result<Arc<Schema>> {
        let tables = self.inherited.into_iter().chain(std::iter::once(self.own));
        Schema::from_fields(self.name, merge::merge_all(tables))
    }
}

/// A schema paired with its providers.
///
/// Every field read consults the providers afresh. The instance is a
/// read-only view: there is no way to assign a field.
///
/// ```compile_fail
/// use declconf::schema::{Schema, Settings, ValueField};
/// use declconf::providers::DictProvider;
/// use declconf::types;
///
/// let schema = Schema::builder("S")
///     .field("KEY", ValueField::new(types::integer()))
///     .build()
///     .unwrap();
/// let settings = Settings::new(schema, DictProvider::new([("KEY", "1")]));
/// settings.set("KEY", 2);
/// ```
#[derive(Clone)]
pub struct Settings {
    schema: Arc<Schema>,
    provider: Arc<dyn Provider>,
    secrets: Option<Arc<dyn Provider>>,
}

impl Settings {
    pub fn new(schema: Arc<Schema>, provider: impl Provider + 'static) -> Self {
        Self::from_shared(schema, Arc::new(provider), None)
    }

    /// Build from providers that may be shared with other instances.
    pub fn from_shared(
        schema: Arc<Schema>,
        provider: Arc<dyn Provider>,
        secrets: Option<Arc<dyn Provider>>,
    ) -> Self {
        Self {
            schema,
            provider,
            secrets,
        }
    }

    /// Attach a secrets provider for `Secret` and `DictSecret` fields.
    pub fn with_secrets(mut self, secrets: impl Provider + 'static) -> Self {
        self.secrets = Some(Arc::new(secrets));
        self
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn provider(&self) -> &dyn Provider {
        self.provider.as_ref()
    }

    pub fn secrets_provider(&self) -> Option<&dyn Provider> {
        self.secrets.as_deref()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.schema.contains(name)
    }

    /// Resolve field `name`.
    pub fn get(&self, name: &str) -> Result<Value> {
        self.schema.resolve(self, name)
    }

    /// Resolve field `name` and deserialize it into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        serde_json::from_value(self.get(name)?).map_err(|source| ConfigError::Deserialize {
            field: name.to_string(),
            source,
        })
    }

    /// Field names in declaration order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.schema.names()
    }

    /// Resolve every field in declaration order, stopping at the first error.
    pub fn items(&self) -> Result<Vec<(String, Value)>> {
        self.schema
            .iter()
            .map(|(name, field)| -> Result<(String, Value)> {
                Ok((name.to_string(), field.resolve(self)?))
            })
            .collect()
    }

    /// Resolve every field into a mapping, in declaration order.
    pub fn as_dict(&self) -> Result<Map<String, Value>> {
        Ok(self.items()?.into_iter().collect())
    }

    /// A new instance whose schema also carries `other`'s fields.
    ///
    /// Merged fields read through this instance's providers.
    pub fn merge(&self, other: &Schema) -> Result<Settings> {
        Ok(Self {
            schema: self.schema.merge(&[other])?,
            provider: self.provider.clone(),
            secrets: self.secrets.clone(),
        })
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Values may be secrets; only the shape is shown
        f.debug_struct("Settings")
            .field("schema", &self.schema)
            .field("secrets", &self.secrets.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::providers::DictProvider;
    use crate::types;
    use serde_json::json;

    #[test]
    fn test_own_field_overrides_inherited_in_place() {
        let base = Schema::builder("Base")
            .field("A", ValueField::new(types::integer()))
            .field("B", ValueField::new(types::integer()))
            .build()
            .unwrap();
        let child = Schema::builder("Child")
            .extend(&base)
            .field("C", ValueField::new(types::string()))
            .field("A", ValueField::new(types::string()))
            .build()
            .unwrap();

        assert_eq!(child.names().collect::<Vec<_>>(), ["A", "B", "C"]);
        assert_eq!(child.field("A").unwrap().origin(), "Child");
        assert_eq!(child.field("B").unwrap().origin(), "Base");
    }

    #[test]
    fn test_redeclared_own_field_replaces_earlier() {
        let schema = Schema::builder("S")
            .field("A", ValueField::new(types::integer()))
            .field("A", ValueField::new(types::string()))
            .build()
            .unwrap();
        assert_eq!(schema.len(), 1);
        let settings = Settings::new(schema, DictProvider::new([("A", "x")]));
        assert_eq!(settings.get("A").unwrap(), json!("x"));
    }

    #[test]
    fn test_unknown_field() {
        let schema = Schema::builder("S").build().unwrap();
        assert!(schema.is_empty());
        let settings = Settings::new(schema, DictProvider::default());
        assert_eq!(settings.get("NOPE").unwrap_err().code(), ErrorCode::UnknownField);
    }

    #[test]
    fn test_build_rejects_cycle() {
        let err = Schema::builder("S")
            .field("A", ValueField::new(types::integer()).default(reference("B")))
            .field("B", ValueField::new(types::integer()).default(reference("A")))
            .build()
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ReferenceCycle);
    }

    #[test]
    fn test_get_as_shape_error() {
        let schema = Schema::builder("S")
            .field("A", ValueField::new(types::string()))
            .build()
            .unwrap();
        let settings = Settings::new(schema, DictProvider::new([("A", "x")]));
        let err = settings.get_as::<i64>("A").unwrap_err();
        assert_eq!(err.code(), ErrorCode::DeserializeFailure);
    }

    #[test]
    fn test_debug_hides_values() {
        let schema = Schema::builder("S")
            .field("PASSWORD", ValueField::new(types::string()))
            .build()
            .unwrap();
        let settings = Settings::new(schema, DictProvider::new([("PASSWORD", "hunter2")]));
        let debug = format!("{settings:?}");
        assert!(debug.contains("PASSWORD"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_schema_resolve_explicit() {
        let schema = Schema::builder("S")
            .field("A", ValueField::new(types::integer()))
            .build()
            .unwrap();
        let settings = Settings::new(schema.clone(), DictProvider::new([("A", "7")]));
        assert_eq!(schema.resolve(&settings, "A").unwrap(), json!(7));

        let pairs: Vec<&str> = (&*schema).into_iter().map(|(name, _)| name).collect();
        assert_eq!(pairs, ["A"]);
    }
}
