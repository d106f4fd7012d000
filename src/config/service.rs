use serde_json::Value as JsonValue;

use crate::secrets::{SecretLocation, SecretSource};
use crate::{ClientError, Result};

use super::{env::parse_bool, ConfigMap};

/// Built-in defaults of one service integration.
///
/// Every field can be overridden from the environment under
/// `{env_prefix}_*`:
///
/// | variable | key |
/// |---|---|
/// | `{P}_BASE_URL` | `base_url` |
/// | `{P}_VERIFY_SSL` | `verify` |
/// | `{P}_{CREDENTIAL_KEY}` | credential (e.g. `token`) |
/// | `{P}_VAULT_MOUNT`, `{P}_VAULT_PATH`, `{P}_VAULT_FIELD` | secret location |
#[derive(Clone, Debug, PartialEq)]
pub struct ServiceProfile {
    pub name: String,
    pub env_prefix: String,
    pub base_url: String,
    pub verify: bool,
    /// Config key the credential is stored under.
    pub credential_key: String,
    /// Where the credential lives when the environment does not carry it.
    pub secret: SecretLocation,
    /// Service-specific defaults placed after the connection keys.
    pub extra: ConfigMap,
}

impl ServiceProfile {
    pub fn new(
        name: impl Into<String>,
        env_prefix: impl Into<String>,
        base_url: impl Into<String>,
        secret: SecretLocation,
    ) -> Self {
        Self {
            name: name.into(),
            env_prefix: env_prefix.into(),
            base_url: base_url.into(),
            verify: true,
            credential_key: "token".to_owned(),
            secret,
            extra: ConfigMap::new(),
        }
    }

    pub fn with_credential_key(mut self, key: impl Into<String>) -> Self {
        self.credential_key = key.into();
        self
    }

    pub fn with_default(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Defaults layer read from the process environment.
    pub async fn defaults(&self, secrets: &mut dyn SecretSource) -> Result<ConfigMap> {
        self.defaults_from(|name| std::env::var(name).ok(), secrets)
            .await
    }

    /// Defaults layer read through `lookup`.
    ///
    /// The secret source is consulted only when the credential variable is
    /// unset or empty.
    pub async fn defaults_from<F>(&self, lookup: F, secrets: &mut dyn SecretSource) -> Result<ConfigMap>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| lookup(&format!("{}_{}", self.env_prefix, suffix));

        let base_url = var("BASE_URL").unwrap_or_else(|| self.base_url.clone());
        let verify = match var("VERIFY_SSL") {
            Some(raw) => parse_bool(&raw).ok_or_else(|| {
                ClientError::Config(format!(
                    "{}_VERIFY_SSL: cannot interpret '{raw}' as a boolean",
                    self.env_prefix
                ))
            })?,
            None => self.verify,
        };

        let credential_var = self.credential_key.to_ascii_uppercase();
        let credential = match var(&credential_var).filter(|value| !value.is_empty()) {
            Some(value) => value,
            None => {
                let location = SecretLocation {
                    mount: var("VAULT_MOUNT").unwrap_or_else(|| self.secret.mount.clone()),
                    path: var("VAULT_PATH").unwrap_or_else(|| self.secret.path.clone()),
                    field: var("VAULT_FIELD").unwrap_or_else(|| self.secret.field.clone()),
                };

                #[cfg(feature = "tracing")]
                tracing::info!(service = %self.name, "getting credentials from secrets store");

                secrets.read(&location).await?
            }
        };

        let mut defaults = ConfigMap::new();
        defaults.insert("base_url".to_owned(), base_url.into());
        defaults.insert("verify".to_owned(), verify.into());
        defaults.insert(self.credential_key.clone(), credential.into());
        for (key, value) in &self.extra {
            defaults.entry(key.clone()).or_insert_with(|| value.clone());
        }
        Ok(defaults)
    }
}
