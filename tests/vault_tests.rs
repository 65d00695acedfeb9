//! Tests for the Vault provider against a mock server.

#![cfg(feature = "vault")]

use declconf::{
    ErrorCode, Provider, Schema, SecretField, Settings, ValueField, VaultAuth, VaultConfig,
    VaultProvider, types,
};
use declconf::DictProvider;
use mockito::Matcher;
use serde_json::json;

fn kv_body(data: serde_json::Value) -> String {
    json!({
        "request_id": "b4b3a8f1",
        "lease_duration": 0,
        "data": {
            "data": data,
            "metadata": {"version": 3, "destroyed": false},
        },
    })
    .to_string()
}

#[test]
fn token_auth_fetches_secret() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", "/v1/secret/data/myapp/config")
        .match_header("x-vault-token", "root")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(kv_body(json!({"DB_PASSWORD": "hunter2", "WORKERS": 4})))
        .create();

    let config = VaultConfig::new(
        server.url(),
        "myapp/config",
        VaultAuth::Token { token: "root".into() },
    );
    let provider = VaultProvider::connect(&config).unwrap();
    mock.assert();

    assert_eq!(provider.len(), 2);
    assert_eq!(provider.get("DB_PASSWORD").unwrap().as_deref(), Some("hunter2"));
    assert_eq!(provider.get("WORKERS").unwrap().as_deref(), Some("4"));
    assert_eq!(provider.get("MISSING").unwrap(), None);
}

#[test]
fn approle_login_then_fetch() {
    let mut server = mockito::Server::new();
    let login = server
        .mock("POST", "/v1/auth/approle/login")
        .match_body(Matcher::Json(json!({"role_id": "role", "secret_id": "sid"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"auth": {"client_token": "issued", "lease_duration": 3600}}).to_string())
        .create();
    let fetch = server
        .mock("GET", "/v1/kv/data/app")
        .match_header("x-vault-token", "issued")
        .match_header("x-vault-namespace", "team")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(kv_body(json!({"APP_TOKEN": "t0k3n"})))
        .create();

    let mut config = VaultConfig::new(
        server.url(),
        "app",
        VaultAuth::AppRole {
            role_id: "role".into(),
            secret_id: "sid".into(),
        },
    );
    config.mount = "kv".into();
    config.namespace = Some("team".into());

    let provider = VaultProvider::connect(&config).unwrap();
    login.assert();
    fetch.assert();
    assert_eq!(provider.get("APP_TOKEN").unwrap().as_deref(), Some("t0k3n"));
}

#[test]
fn error_status_is_a_remote_failure() {
    let mut server = mockito::Server::new();
    let _mock = server
        .mock("GET", "/v1/secret/data/app")
        .with_status(403)
        .with_body(r#"{"errors":["permission denied"]}"#)
        .create();

    let config = VaultConfig::new(server.url(), "app", VaultAuth::Token { token: "bad".into() });
    let err = VaultProvider::connect(&config).unwrap_err();
    assert_eq!(err.code(), ErrorCode::RemoteStoreFailure);
    assert!(err.to_string().contains("403"));
}

#[test]
fn prefixed_secrets_feed_secret_fields() {
    let mut server = mockito::Server::new();
    let _mock = server
        .mock("GET", "/v1/secret/data/app")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(kv_body(json!({"APP_DB_PASSWORD": "s3cr3t", "OTHER": "x"})))
        .create();

    let mut config = VaultConfig::new(server.url(), "app", VaultAuth::Token { token: "root".into() });
    config.prefix = "APP_".into();
    let secrets = VaultProvider::connect(&config).unwrap();

    let schema = Schema::builder("S")
        .field("DB_PASSWORD", SecretField::new(types::string()))
        .field("DB_HOST", ValueField::new(types::string()))
        .build()
        .unwrap();
    let settings = Settings::new(schema, DictProvider::new([("DB_HOST", "db")])).with_secrets(secrets);

    assert_eq!(settings.get("DB_PASSWORD").unwrap(), json!("s3cr3t"));
    assert_eq!(settings.get("DB_HOST").unwrap(), json!("db"));
}
