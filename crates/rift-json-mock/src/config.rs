//! JSON codec configuration.
//!
//! `JsonConfig` controls how values are turned into JSON text and back. It is
//! passed explicitly to the server and request views; `JsonConfig::cached()`
//! offers a process-wide instance that is discovered once and never
//! invalidated.
//!
//! # Discovery
//!
//! If `RIFT_JSON_MOCK_CONFIG` names a file, it is loaded as YAML (which also
//! accepts JSON):
//!
//! ```yaml
//! pretty: false
//! includeNulls: true
//! sortKeys: false
//! ```
//!
//! Otherwise the default configuration is used: compact output, null object
//! members omitted, keys in declaration order.

use std::path::Path;

use once_cell::sync::OnceCell;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{MockError, Result};

/// Environment variable naming a configuration file for `JsonConfig::cached()`.
pub const CONFIG_ENV_VAR: &str = "RIFT_JSON_MOCK_CONFIG";

static CACHED: OnceCell<JsonConfig> = OnceCell::new();

/// Options applied when serializing values to JSON.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JsonConfig {
    /// Emit indented JSON
    #[serde(default)]
    pub pretty: bool,

    /// Keep object members whose value is null
    #[serde(default)]
    pub include_nulls: bool,

    /// Sort object keys alphabetically instead of declaration order
    #[serde(default)]
    pub sort_keys: bool,
}

impl JsonConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            MockError::configuration(format!(
                "Failed to read JSON config {}: {e}",
                path.display()
            ))
        })?;
        Self::from_yaml_str(&contents)
            .map_err(|e| MockError::parse(format!("{} ({})", e, path.display())))
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        serde_yaml::from_str(contents)
            .map_err(|e| MockError::parse(format!("Invalid JSON config: {e}")))
    }

    /// Resolve configuration from the environment, falling back to the default.
    pub fn discover() -> Self {
        let Ok(path) = std::env::var(CONFIG_ENV_VAR) else {
            debug!("{} not set, using default JSON config", CONFIG_ENV_VAR);
            return Self::default();
        };

        match Self::from_file(&path) {
            Ok(config) => {
                info!("Loaded JSON config from {}", path);
                config
            }
            Err(e) => {
                warn!("{}, using default JSON config", e);
                Self::default()
            }
        }
    }

    /// Process-wide configuration. Populated on first call, never invalidated.
    pub fn cached() -> &'static JsonConfig {
        CACHED.get_or_init(Self::discover)
    }

    /// Seed the process-wide configuration.
    ///
    /// Fails, handing the value back, if the cache was already populated.
    pub fn install(config: JsonConfig) -> std::result::Result<(), JsonConfig> {
        CACHED.set(config)
    }

    /// Serialize a value to a JSON tree with this configuration applied.
    pub fn to_value<T: Serialize + ?Sized>(&self, value: &T) -> Result<Value> {
        let mut tree = serde_json::to_value(value)?;
        if !self.include_nulls {
            strip_nulls(&mut tree);
        }
        if self.sort_keys {
            sort_object_keys(&mut tree);
        }
        Ok(tree)
    }

    pub fn stringify<T: Serialize + ?Sized>(&self, value: &T) -> Result<String> {
        let tree = self.to_value(value)?;
        let text = if self.pretty {
            serde_json::to_string_pretty(&tree)?
        } else {
            serde_json::to_string(&tree)?
        };
        Ok(text)
    }

    pub fn to_json_bytes<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        Ok(self.stringify(value)?.into_bytes())
    }

    /// Parse JSON text into a tree.
    pub fn parse_value(&self, text: &str) -> Result<Value> {
        serde_json::from_str(text)
            .map_err(|e| MockError::parse(format!("Failed to parse JSON body: {e}; was {text}")))
    }

    /// Parse JSON text into a typed value.
    pub fn from_json<T: DeserializeOwned>(&self, text: &str) -> Result<T> {
        serde_json::from_str(text)
            .map_err(|e| MockError::parse(format!("Failed to parse JSON body: {e}; was {text}")))
    }
}

fn strip_nulls(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, v| !v.is_null());
            for v in map.values_mut() {
                strip_nulls(v);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(strip_nulls),
        _ => {}
    }
}

fn sort_object_keys(value: &mut Value) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = std::mem::take(map).into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            for (key, mut v) in entries {
                sort_object_keys(&mut v);
                map.insert(key, v);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(sort_object_keys),
        _ => {}
    }
}
