//! Building client options and auth from a flattened configuration map.
//!
//! Unknown keys are ignored, so the same resolved map can carry
//! service-specific settings next to the connection settings.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::auth::{DEFAULT_API_KEY_HEADER, DEFAULT_TOKEN_FIELD};
use crate::{Auth, ClientError, ClientOptions, Result, TlsVerify, TokenEndpoint};

use super::{env::parse_bool, ConfigMap};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum VerifySetting {
    Flag(bool),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct ClientSection {
    base_url: String,
    connect_timeout: Option<f64>,
    read_timeout: Option<f64>,
    verify: Option<VerifySetting>,
    user_agent: Option<String>,
    max_retries: Option<u32>,
    backoff_factor: Option<f64>,

    #[serde(default = "default_auth_type")]
    auth_type: String,
    token_url: Option<String>,
    token_field: Option<String>,
    token_params: Option<ConfigMap>,
    token: Option<String>,
    username: Option<String>,
    password: Option<String>,
    api_key: Option<String>,
    api_key_header: Option<String>,
}

fn default_auth_type() -> String {
    "bearer".to_owned()
}

fn section(config: &ConfigMap) -> Result<ClientSection> {
    serde_json::from_value(JsonValue::Object(config.clone()))
        .map_err(|err| ClientError::Config(format!("invalid client configuration: {err}")))
}

fn seconds(value: f64, key: &str) -> Result<Duration> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| ClientError::Config(format!("'{key}' must be a non-negative number of seconds")))
}

impl ClientOptions {
    /// Reads `base_url`, `connect_timeout`, `read_timeout` (seconds),
    /// `verify` (bool, boolean string, or CA bundle path), `user_agent`,
    /// `max_retries` and `backoff_factor`.
    pub fn from_config(config: &ConfigMap) -> Result<Self> {
        let section = section(config)?;
        let mut options = ClientOptions::new(section.base_url);

        if let Some(connect) = section.connect_timeout {
            options.connect_timeout = seconds(connect, "connect_timeout")?;
        }
        if let Some(read) = section.read_timeout {
            options.read_timeout = seconds(read, "read_timeout")?;
        }
        if let Some(verify) = section.verify {
            options.verify = match verify {
                VerifySetting::Flag(true) => TlsVerify::Enabled,
                VerifySetting::Flag(false) => TlsVerify::Disabled,
                VerifySetting::Text(text) => match parse_bool(&text) {
                    Some(true) => TlsVerify::Enabled,
                    Some(false) => TlsVerify::Disabled,
                    None => TlsVerify::CaBundle(PathBuf::from(text)),
                },
            };
        }
        if let Some(user_agent) = section.user_agent {
            options.user_agent = user_agent;
        }
        if let Some(max_retries) = section.max_retries {
            options.retry.max_retries = max_retries;
        }
        if let Some(factor) = section.backoff_factor {
            options.retry.backoff_factor = factor;
        }
        Ok(options)
    }
}

impl Auth {
    /// Selects the auth mode from a configuration map.
    ///
    /// `token_url` wins (refresh flow); then a bearer `token` when
    /// `auth_type` is `bearer`; then `api_key` when `auth_type` is `api_key`;
    /// then `username`/`password` as Basic; otherwise no auth.
    pub fn from_config(config: &ConfigMap) -> Result<Self> {
        let section = section(config)?;

        if let Some(url) = section.token_url {
            let (Some(username), Some(password)) = (section.username, section.password) else {
                return Err(ClientError::Config(
                    "username and password required for token_url".to_owned(),
                ));
            };
            let mut endpoint = TokenEndpoint::new(url, username, password).with_token_field(
                section
                    .token_field
                    .unwrap_or_else(|| DEFAULT_TOKEN_FIELD.to_owned()),
            );
            for (key, value) in section.token_params.unwrap_or_default() {
                let value = match value {
                    JsonValue::String(text) => text,
                    other => other.to_string(),
                };
                endpoint = endpoint.with_param(key, value);
            }
            return Ok(Auth::TokenRefresh(endpoint));
        }

        match section.auth_type.as_str() {
            "bearer" => {
                if let Some(token) = section.token.filter(|token| !token.is_empty()) {
                    return Ok(Auth::bearer(token));
                }
            }
            "api_key" => {
                if let Some(key) = section.api_key.filter(|key| !key.is_empty()) {
                    let header = section
                        .api_key_header
                        .unwrap_or_else(|| DEFAULT_API_KEY_HEADER.to_owned());
                    return Ok(Auth::api_key_in(header, key));
                }
            }
            "basic" => {}
            other => {
                return Err(ClientError::Config(format!(
                    "unknown auth_type '{other}' (expected bearer, basic or api_key)"
                )))
            }
        }

        match (section.username, section.password) {
            (Some(username), Some(password)) if !username.is_empty() && !password.is_empty() => {
                Ok(Auth::basic(username, password))
            }
            _ => Ok(Auth::None),
        }
    }
}
