use serde_json::{Map, Value as JsonValue};

/// Flattened configuration for one service call.
pub type ConfigMap = Map<String, JsonValue>;

/// Recursively merges `overlay` into `base`.
///
/// Nested objects merge key by key; every other value, arrays included,
/// replaces the base value wholesale.
pub fn deep_merge(base: &mut ConfigMap, overlay: &ConfigMap) {
    for (key, value) in overlay {
        match (base.get_mut(key), value) {
            (Some(JsonValue::Object(existing)), JsonValue::Object(incoming)) => {
                deep_merge(existing, incoming);
            }
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Applies top-level overrides, skipping `null` values.
pub fn shallow_merge(base: &mut ConfigMap, overrides: &ConfigMap) {
    for (key, value) in overrides {
        if !value.is_null() {
            base.insert(key.clone(), value.clone());
        }
    }
}

/// Layered resolution: defaults, then a user document, then per-call
/// overrides.
///
/// ```
/// use sas_client::config::Resolver;
/// use serde_json::json;
///
/// let defaults = json!({"base_url": "https://tfe.example.com", "project": {"access": "admin"}});
/// let cfg = Resolver::new(defaults.as_object().unwrap().clone())
///     .with_document(json!({"project": {"access": "read"}}).as_object().unwrap().clone())
///     .with_override("organization", Some("platform"))
///     .with_override::<String>("base_url", None)
///     .resolve();
///
/// assert_eq!(cfg["project"]["access"], "read");
/// assert_eq!(cfg["base_url"], "https://tfe.example.com");
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Resolver {
    defaults: ConfigMap,
    document: Option<ConfigMap>,
    overrides: ConfigMap,
}

impl Resolver {
    pub fn new(defaults: ConfigMap) -> Self {
        Self {
            defaults,
            document: None,
            overrides: ConfigMap::new(),
        }
    }

    /// User-supplied document, deep-merged over the defaults.
    pub fn with_document(mut self, document: ConfigMap) -> Self {
        self.document = Some(document);
        self
    }

    /// Adds one per-call override; `None` leaves the lower layers intact.
    pub fn with_override<T: Into<JsonValue>>(mut self, key: impl Into<String>, value: Option<T>) -> Self {
        self.overrides
            .insert(key.into(), value.map_or(JsonValue::Null, Into::into));
        self
    }

    pub fn with_overrides(mut self, overrides: ConfigMap) -> Self {
        self.overrides.extend(overrides);
        self
    }

    pub fn resolve(&self) -> ConfigMap {
        let mut merged = self.defaults.clone();
        if let Some(document) = &self.document {
            deep_merge(&mut merged, document);
        }
        shallow_merge(&mut merged, &self.overrides);
        merged
    }
}
