//! Layered configuration resolution.
//!
//! Precedence, lowest first: built-in service defaults (environment-aware,
//! secrets looked up lazily), a user-supplied document (deep merge), and
//! explicit per-call overrides (shallow merge, `null` ignored).

mod client_config;
mod env;
mod merge;
mod service;

use std::path::Path;

use serde_json::Value as JsonValue;

use crate::{ClientError, Result};

pub use env::{env_bool, env_or, parse_bool, require, require_str};
pub use merge::{deep_merge, shallow_merge, ConfigMap, Resolver};
pub use service::ServiceProfile;

/// Reads a configuration document whose top level is a mapping.
///
/// `.yaml` and `.yml` files are parsed as YAML, anything else as JSON. An
/// empty document yields an empty map.
pub fn load_document(path: impl AsRef<Path>) -> Result<ConfigMap> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .map_err(|err| ClientError::Config(format!("cannot read {}: {err}", path.display())))?;
    if content.trim().is_empty() {
        return Ok(ConfigMap::new());
    }

    let is_yaml = matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml" | "yml")
    );
    let parsed: JsonValue = if is_yaml {
        serde_yaml::from_str(&content)
            .map_err(|err| ClientError::Config(format!("{}: {err}", path.display())))?
    } else {
        serde_json::from_str(&content)
            .map_err(|err| ClientError::Config(format!("{}: {err}", path.display())))?
    };

    match parsed {
        JsonValue::Object(map) => Ok(map),
        // A YAML file holding only comments parses as null.
        JsonValue::Null => Ok(ConfigMap::new()),
        _ => Err(ClientError::Config(format!(
            "{}: top-level value must be a mapping",
            path.display()
        ))),
    }
}
