//! Credential lookup from a versioned key-value secrets store.

use std::collections::HashMap;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value as JsonValue};

use crate::config::parse_bool;
use crate::{ApiClient, Auth, ClientError, ClientOptions, Result, TlsVerify};

/// Mount, path and field addressing one secret value.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct SecretLocation {
    pub mount: String,
    pub path: String,
    pub field: String,
}

impl SecretLocation {
    pub fn new(mount: impl Into<String>, path: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            mount: mount.into(),
            path: path.into(),
            field: field.into(),
        }
    }
}

/// Source of credentials missing from the environment.
#[async_trait]
pub trait SecretSource: Send {
    /// Reads one field of a secret as a string.
    async fn read(&mut self, location: &SecretLocation) -> Result<String>;
}

/// Connection settings for [`VaultKv`].
#[derive(Clone, Debug)]
pub struct VaultConfig {
    pub base_url: String,
    pub token: Option<SecretString>,
    pub verify: bool,
    pub role_id: Option<String>,
    pub secret_id: Option<SecretString>,
    pub namespace: Option<String>,
}

impl VaultConfig {
    /// Reads `VAULT_BASE_URL`, `VAULT_TOKEN`, `VAULT_VERIFY_SSL`,
    /// `VAULT_ROLE_ID`, `VAULT_SECRET_ID` and `VAULT_NAMESPACE`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.is_empty());
        let verify = match lookup("VAULT_VERIFY_SSL") {
            Some(raw) => parse_bool(&raw).ok_or_else(|| {
                ClientError::Config(format!("VAULT_VERIFY_SSL: cannot interpret '{raw}' as a boolean"))
            })?,
            None => true,
        };

        Ok(Self {
            base_url: lookup("VAULT_BASE_URL")
                .unwrap_or_else(|| "https://hcvault.enterprise.com".to_owned()),
            token: non_empty("VAULT_TOKEN").map(SecretString::new),
            verify,
            role_id: non_empty("VAULT_ROLE_ID"),
            secret_id: non_empty("VAULT_SECRET_ID").map(SecretString::new),
            namespace: non_empty("VAULT_NAMESPACE"),
        })
    }
}

/// Vault KV reader built on [`ApiClient`].
#[derive(Debug)]
pub struct VaultKv {
    client: ApiClient,
}

impl VaultKv {
    /// Connects to Vault, logging in with AppRole when role and secret ids
    /// are configured, otherwise using the static token.
    pub async fn connect(config: VaultConfig) -> Result<Self> {
        let options = ClientOptions::new(config.base_url.as_str()).with_verify(if config.verify {
            TlsVerify::Enabled
        } else {
            TlsVerify::Disabled
        });
        let mut client = ApiClient::new(options, Auth::None)?;
        client.set_header("X-Vault-Request", "true")?;
        if let Some(namespace) = &config.namespace {
            client.set_header("X-Vault-Namespace", namespace)?;
        }

        let token = match (&config.role_id, &config.secret_id) {
            (Some(role_id), Some(secret_id)) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("logging in with AppRole");

                let payload = json!({
                    "role_id": role_id,
                    "secret_id": secret_id.expose_secret(),
                });
                let response = client.post("/v1/auth/approle/login", &payload).await?;
                response
                    .as_json()
                    .and_then(|body| body.pointer("/auth/client_token"))
                    .and_then(JsonValue::as_str)
                    .map(str::to_owned)
                    .ok_or_else(|| ClientError::Auth {
                        message: "AppRole login returned no client token".to_owned(),
                        source: None,
                    })?
            }
            _ => config
                .token
                .as_ref()
                .map(|token| token.expose_secret().clone())
                .ok_or_else(|| {
                    ClientError::Config(
                        "Vault token is required (set VAULT_TOKEN or use AppRole)".to_owned(),
                    )
                })?,
        };
        client.set_header("X-Vault-Token", &token)?;

        Ok(Self { client })
    }

    /// Reads a KV v2 secret; the whole data map when `field` is `None`.
    pub async fn read_kv_v2(&mut self, mount: &str, path: &str, field: Option<&str>) -> Result<JsonValue> {
        let body = self.client.get(&format!("/v1/{mount}/data/{path}")).await?;
        let data = body
            .as_json()
            .and_then(|body| body.pointer("/data/data"))
            .cloned()
            .unwrap_or_else(|| json!({}));
        select_field(data, field, mount, path)
    }

    /// Reads a KV v1 secret; the whole data map when `field` is `None`.
    pub async fn read_kv_v1(&mut self, mount: &str, path: &str, field: Option<&str>) -> Result<JsonValue> {
        let body = self.client.get(&format!("/v1/{mount}/{path}")).await?;
        let data = body
            .as_json()
            .and_then(|body| body.get("data"))
            .cloned()
            .unwrap_or_else(|| json!({}));
        select_field(data, field, mount, path)
    }

    pub fn client(&mut self) -> &mut ApiClient {
        &mut self.client
    }
}

fn select_field(data: JsonValue, field: Option<&str>, mount: &str, path: &str) -> Result<JsonValue> {
    match field {
        None => Ok(data),
        Some(field) => data.get(field).cloned().ok_or_else(|| {
            ClientError::Config(format!("secret {mount}/{path} has no field '{field}'"))
        }),
    }
}

fn as_secret_string(value: JsonValue) -> String {
    match value {
        JsonValue::String(text) => text,
        other => other.to_string(),
    }
}

#[async_trait]
impl SecretSource for VaultKv {
    async fn read(&mut self, location: &SecretLocation) -> Result<String> {
        let value = self
            .read_kv_v2(&location.mount, &location.path, Some(&location.field))
            .await?;
        Ok(as_secret_string(value))
    }
}

/// In-memory secrets, for tests and offline runs.
#[derive(Clone, Debug, Default)]
pub struct StaticSecrets {
    values: HashMap<SecretLocation, String>,
    reads: usize,
}

impl StaticSecrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, location: SecretLocation, value: impl Into<String>) {
        self.values.insert(location, value.into());
    }

    /// Number of lookups served so far.
    pub fn reads(&self) -> usize {
        self.reads
    }
}

#[async_trait]
impl SecretSource for StaticSecrets {
    async fn read(&mut self, location: &SecretLocation) -> Result<String> {
        self.reads += 1;
        self.values.get(location).cloned().ok_or_else(|| {
            ClientError::Config(format!(
                "secret {}/{} has no field '{}'",
                location.mount, location.path, location.field
            ))
        })
    }
}
