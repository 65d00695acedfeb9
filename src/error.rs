//! Structured error types for configuration resolution.

use serde::Serialize;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Resolution errors
    MissingRequiredValue,
    CoercionFailure,
    UnavailableIntegration,
    ComputedValueFailure,
    DeserializeFailure,

    // Provider errors
    ProviderIoFailure,
    RemoteStoreFailure,
    Unimplemented,

    // Schema errors
    UnknownField,
    UnknownReference,
    ReferenceCycle,

    // Lookup errors
    LocationNotFound,
    NameNotFound,
    WrongSymbol,

    // Host integration
    MissingInstallName,
}

/// Failure raised by a type coercer.
#[derive(Debug, thiserror::Error)]
pub enum CoercionError {
    /// The raw value could not be read as the expected type.
    #[error("expected {expected}, got {raw:?}")]
    Invalid { expected: &'static str, raw: String },

    /// The coercer depends on an integration that could not be resolved.
    #[error("integration '{name}' is not available")]
    Unavailable { name: String },

    /// Free-form failure from a user supplied coercer.
    #[error("{0}")]
    Message(String),
}

impl CoercionError {
    pub fn invalid(expected: &'static str, raw: &str) -> Self {
        Self::Invalid {
            expected,
            raw: raw.to_string(),
        }
    }

    pub fn message(msg: impl Into<String>) -> Self {
        Self::Message(msg.into())
    }
}

/// Errors surfaced by providers, schemas and field resolution.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no value set for {key}")]
    MissingRequiredValue { key: String },

    #[error("invalid value for {key}: {source}")]
    Coercion {
        key: String,
        #[source]
        source: CoercionError,
    },

    #[error("integration '{name}' is not available")]
    UnavailableIntegration { name: String },

    #[error("failed to read {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("secret store error: {message}")]
    Remote { message: String },

    #[error("{operation} is not implemented by this provider")]
    Unimplemented { operation: &'static str },

    #[error("unknown field: {name}")]
    UnknownField { name: String },

    #[error("field {field} references undeclared field {target}")]
    UnknownReference { field: String, target: String },

    #[error("reference cycle: {}", path.join(" -> "))]
    ReferenceCycle { path: Vec<String> },

    #[error("computed value {field} failed: {source}")]
    Computed {
        field: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("field {field} has an unexpected shape: {source}")]
    Deserialize {
        field: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("no such location: {location}")]
    LocationNotFound { location: String },

    #[error("{location} has no member {name}")]
    NameNotFound { location: String, name: String },

    #[error("{path} is not a {expected}")]
    WrongSymbol { path: String, expected: &'static str },

    #[error("no install name given and ${variable} is not set")]
    MissingInstallName { variable: String },
}

impl ConfigError {
    /// Stable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            ConfigError::MissingRequiredValue { .. } => ErrorCode::MissingRequiredValue,
            ConfigError::Coercion { .. } => ErrorCode::CoercionFailure,
            ConfigError::UnavailableIntegration { .. } => ErrorCode::UnavailableIntegration,
            ConfigError::Io { .. } => ErrorCode::ProviderIoFailure,
            ConfigError::Remote { .. } => ErrorCode::RemoteStoreFailure,
            ConfigError::Unimplemented { .. } => ErrorCode::Unimplemented,
            ConfigError::UnknownField { .. } => ErrorCode::UnknownField,
            ConfigError::UnknownReference { .. } => ErrorCode::UnknownReference,
            ConfigError::ReferenceCycle { .. } => ErrorCode::ReferenceCycle,
            ConfigError::Computed { .. } => ErrorCode::ComputedValueFailure,
            ConfigError::Deserialize { .. } => ErrorCode::DeserializeFailure,
            ConfigError::LocationNotFound { .. } => ErrorCode::LocationNotFound,
            ConfigError::NameNotFound { .. } => ErrorCode::NameNotFound,
            ConfigError::WrongSymbol { .. } => ErrorCode::WrongSymbol,
            ConfigError::MissingInstallName { .. } => ErrorCode::MissingInstallName,
        }
    }

    // Convenience constructors

    pub fn missing(key: &str) -> Self {
        Self::MissingRequiredValue {
            key: key.to_string(),
        }
    }

    pub fn unknown_field(name: &str) -> Self {
        Self::UnknownField {
            name: name.to_string(),
        }
    }

    pub fn remote(err: impl std::fmt::Display) -> Self {
        Self::Remote {
            message: err.to_string(),
        }
    }

    /// Attach the lookup key to a coercer failure.
    ///
    /// Unavailable integrations keep their own kind instead of becoming a
    /// coercion failure.
    pub fn coercion(key: &str, source: CoercionError) -> Self {
        match source {
            CoercionError::Unavailable { name } => Self::UnavailableIntegration { name },
            source => Self::Coercion {
                key: key.to_string(),
                source,
            },
        }
    }
}

/// Result type for configuration operations.
pub type Result<T, E = ConfigError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_keeps_its_kind() {
        let err = ConfigError::coercion(
            "DB_URL",
            CoercionError::Unavailable {
                name: "url.database_url".into(),
            },
        );
        assert_eq!(err.code(), ErrorCode::UnavailableIntegration);
    }

    #[test]
    fn test_coercion_names_key() {
        let err = ConfigError::coercion("PORT", CoercionError::invalid("integer", "abc"));
        assert_eq!(err.code(), ErrorCode::CoercionFailure);
        assert_eq!(
            err.to_string(),
            "invalid value for PORT: expected integer, got \"abc\""
        );
    }

    #[test]
    fn test_cycle_message() {
        let err = ConfigError::ReferenceCycle {
            path: vec!["A".into(), "B".into(), "A".into()],
        };
        assert_eq!(err.to_string(), "reference cycle: A -> B -> A");
    }

    #[test]
    fn test_error_code_serializes_screaming_snake() {
        let json = serde_json::to_string(&ErrorCode::MissingRequiredValue).unwrap();
        assert_eq!(json, "\"MISSING_REQUIRED_VALUE\"");
    }
}
