use serde_json::Value as JsonValue;

use crate::{ClientError, Result};

use super::ConfigMap;

/// Environment variable, or `default` when unset.
pub fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_owned())
}

/// Boolean environment variable, or `default` when unset.
pub fn env_bool(name: &str, default: bool) -> Result<bool> {
    match std::env::var(name) {
        Ok(raw) => parse_bool(&raw)
            .ok_or_else(|| ClientError::Config(format!("{name}: cannot interpret '{raw}' as a boolean"))),
        Err(_) => Ok(default),
    }
}

/// Parses `1/true/t/yes/y/on` and `0/false/f/no/n/off`, case-insensitively.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "f" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

/// Value of a required key.
pub fn require<'a>(config: &'a ConfigMap, key: &str) -> Result<&'a JsonValue> {
    config
        .get(key)
        .ok_or_else(|| ClientError::Config(format!("missing required key '{key}'")))
}

/// String value of a required key.
pub fn require_str<'a>(config: &'a ConfigMap, key: &str) -> Result<&'a str> {
    require(config, key)?
        .as_str()
        .ok_or_else(|| ClientError::Config(format!("key '{key}' must be a string")))
}
