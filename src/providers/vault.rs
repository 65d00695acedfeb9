//! Remote secret store provider for HashiCorp Vault's KV v2 engine.
//!
//! All network traffic happens in [`VaultProvider::connect`]: authenticate,
//! fetch one secret, keep its key/value pairs in memory. Field reads never
//! touch the network.

use super::{DictProvider, Provider, RawValue};
use crate::error::{ConfigError, Result};
use crate::schema::{Schema, Settings, ValueField};
use crate::types;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const TOKEN_HEADER: &str = "X-Vault-Token";
const NAMESPACE_HEADER: &str = "X-Vault-Namespace";

/// How to authenticate against Vault.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum VaultAuth {
    /// A ready-made client token.
    Token { token: String },
    /// AppRole login, exchanged for a client token.
    AppRole { role_id: String, secret_id: String },
}

impl fmt::Debug for VaultAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VaultAuth::Token { .. } => f.write_str("Token { .. }"),
            VaultAuth::AppRole { role_id, .. } => f
                .debug_struct("AppRole")
                .field("role_id", role_id)
                .finish_non_exhaustive(),
        }
    }
}

/// Connection settings for [`VaultProvider`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VaultConfig {
    /// Server address, e.g. `https://vault.example.com:8200`.
    pub address: String,

    /// KV v2 mount point (default: `secret`).
    #[serde(default = "default_mount")]
    pub mount: String,

    /// Secret path below the mount.
    pub path: String,

    /// Enterprise namespace, sent as `X-Vault-Namespace`.
    #[serde(default)]
    pub namespace: Option<String>,

    /// Fixed key prefix, with the same meaning as for [`DictProvider`].
    #[serde(default)]
    pub prefix: String,

    /// Request timeout in seconds (default: 10).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    pub auth: VaultAuth,
}

fn default_mount() -> String {
    "secret".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

impl VaultConfig {
    pub fn new(address: impl Into<String>, path: impl Into<String>, auth: VaultAuth) -> Self {
        Self {
            address: address.into(),
            mount: default_mount(),
            path: path.into(),
            namespace: None,
            prefix: String::new(),
            timeout_secs: default_timeout_secs(),
            auth,
        }
    }

    /// Read the connection settings from `VAULT_*` keys of a provider.
    ///
    /// `VAULT_ADDR` and `VAULT_PATH` are required, as is either
    /// `VAULT_TOKEN` or both `VAULT_ROLE_ID` and `VAULT_SECRET_ID`.
    pub fn from_provider(provider: Arc<dyn Provider>) -> Result<Self> {
        let schema = Schema::builder("VaultConfig")
            .field("VAULT_ADDR", ValueField::new(types::string()))
            .field("VAULT_PATH", ValueField::new(types::string()))
            .field("VAULT_MOUNT", ValueField::new(types::string()).default(default_mount()))
            .field("VAULT_NAMESPACE", ValueField::new(types::string()).default(Value::Null))
            .field("VAULT_PREFIX", ValueField::new(types::string()).default(""))
            .field(
                "VAULT_TIMEOUT",
                ValueField::new(types::integer()).default(json!(default_timeout_secs())),
            )
            .field("VAULT_TOKEN", ValueField::new(types::string()).default(Value::Null))
            .field("VAULT_ROLE_ID", ValueField::new(types::string()).default(Value::Null))
            .field("VAULT_SECRET_ID", ValueField::new(types::string()).default(Value::Null))
            .build()?;
        let settings = Settings::from_shared(schema, provider, None);

        let token: Option<String> = settings.get_as("VAULT_TOKEN")?;
        let role_id: Option<String> = settings.get_as("VAULT_ROLE_ID")?;
        let secret_id: Option<String> = settings.get_as("VAULT_SECRET_ID")?;
        let auth = match (token, role_id, secret_id) {
            (Some(token), _, _) => VaultAuth::Token { token },
            (None, Some(role_id), Some(secret_id)) => VaultAuth::AppRole { role_id, secret_id },
            (None, Some(_), None) => return Err(ConfigError::missing("VAULT_SECRET_ID")),
            (None, _, _) => return Err(ConfigError::missing("VAULT_TOKEN")),
        };

        Ok(Self {
            address: settings.get_as("VAULT_ADDR")?,
            mount: settings.get_as("VAULT_MOUNT")?,
            path: settings.get_as("VAULT_PATH")?,
            namespace: settings.get_as("VAULT_NAMESPACE")?,
            prefix: settings.get_as("VAULT_PREFIX")?,
            timeout_secs: settings.get_as("VAULT_TIMEOUT")?,
            auth,
        })
    }

    fn base_url(&self) -> &str {
        self.address.trim_end_matches('/')
    }

    fn secret_url(&self) -> String {
        let encode = |path: &str| {
            path.split('/')
                .filter(|segment| !segment.is_empty())
                .map(|segment| urlencoding::encode(segment).into_owned())
                .collect::<Vec<_>>()
                .join("/")
        };
        format!(
            "{}/v1/{}/data/{}",
            self.base_url(),
            encode(&self.mount),
            encode(&self.path)
        )
    }
}

#[derive(Deserialize)]
struct LoginResponse {
    auth: LoginAuth,
}

#[derive(Deserialize)]
struct LoginAuth {
    client_token: String,
}

#[derive(Deserialize)]
struct KvResponse {
    data: KvData,
}

#[derive(Deserialize)]
struct KvData {
    data: Map<String, Value>,
}

/// Secrets fetched once from Vault and served from memory.
#[derive(Debug, Clone)]
pub struct VaultProvider {
    entries: DictProvider,
}

impl VaultProvider {
    /// Authenticate and fetch the configured secret.
    pub fn connect(config: &VaultConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(ConfigError::remote)?;

        let token = match &config.auth {
            VaultAuth::Token { token } => token.clone(),
            VaultAuth::AppRole { role_id, secret_id } => {
                Self::login(&client, config, role_id, secret_id)?
            }
        };

        let url = config.secret_url();
        let mut request = client.get(&url).header(TOKEN_HEADER, &token);
        if let Some(namespace) = &config.namespace {
            request = request.header(NAMESPACE_HEADER, namespace);
        }
        let response = request.send().map_err(ConfigError::remote)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ConfigError::remote(format!(
                "reading {} returned {}",
                config.path, status
            )));
        }
        let body: KvResponse = response.json().map_err(ConfigError::remote)?;

        let entries = flatten(body.data.data);
        info!(path = %config.path, keys = entries.len(), "Fetched secrets from vault");

        Ok(Self {
            entries: DictProvider::from(entries).with_prefix(config.prefix.clone()),
        })
    }

    fn login(client: &Client, config: &VaultConfig, role_id: &str, secret_id: &str) -> Result<String> {
        let url = format!("{}/v1/auth/approle/login", config.base_url());
        debug!(%url, "Logging in to vault with AppRole");

        let mut request = client
            .post(&url)
            .json(&json!({ "role_id": role_id, "secret_id": secret_id }));
        if let Some(namespace) = &config.namespace {
            request = request.header(NAMESPACE_HEADER, namespace);
        }
        let response = request.send().map_err(ConfigError::remote)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ConfigError::remote(format!("AppRole login returned {status}")));
        }
        let body: LoginResponse = response.json().map_err(ConfigError::remote)?;
        Ok(body.auth.client_token)
    }

    /// Number of secrets held, regardless of prefix.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Turn a KV payload into raw strings.
fn flatten(data: Map<String, Value>) -> BTreeMap<String, String> {
    let mut entries = BTreeMap::new();
    for (key, value) in data {
        let raw = match value {
            Value::String(s) => s,
            Value::Null => {
                warn!(%key, "Skipping null secret");
                continue;
            }
            other => {
                warn!(%key, "Secret is not a string; using its JSON form");
                other.to_string()
            }
        };
        entries.insert(key, raw);
    }
    entries
}

impl Provider for VaultProvider {
    fn get(&self, key: &str) -> Result<Option<RawValue>> {
        self.entries.get(key)
    }

    fn iterate_with_prefix(&self, prefix: &str) -> Result<Vec<(String, RawValue)>> {
        self.entries.iterate_with_prefix(prefix)
    }
}
