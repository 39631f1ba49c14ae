//! Configuration dictionaries and layer naming.
//!
//! Every layer serializes to an ordered JSON-compatible dictionary. Typed
//! per-layer configs are plain `serde` structs converted to and from that
//! dictionary.

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{LayerError, Result};
use crate::shape::Shape;

/// Ordered mapping from string keys to JSON values.
pub type ConfigDict = serde_json::Map<String, Value>;

/// Fields every layer carries in its configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseLayerConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_trainable")]
    pub trainable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_input_shape: Option<Shape>,
}

fn default_trainable() -> bool {
    true
}

impl Default for BaseLayerConfig {
    fn default() -> Self {
        Self {
            name: None,
            trainable: true,
            batch_input_shape: None,
        }
    }
}

impl BaseLayerConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// The configured name, or a fresh unique one derived from `class_name`.
    pub fn resolve_name(&self, class_name: &str) -> String {
        self.name.clone().unwrap_or_else(|| unique_name(class_name))
    }
}

/// A layer's class name and configuration, as nested inside wrapper configs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedLayer {
    pub class_name: String,
    pub config: ConfigDict,
}

/// Serialize a typed config into a dictionary.
pub fn to_dict<T: Serialize>(config: &T) -> Result<ConfigDict> {
    match serde_json::to_value(config)? {
        Value::Object(map) => Ok(map),
        other => Err(LayerError::deserialization(format!(
            "layer config must serialize to an object, got {other}"
        ))),
    }
}

/// Deserialize a typed config from a dictionary.
pub fn from_dict<T: DeserializeOwned>(dict: &ConfigDict) -> Result<T> {
    Ok(serde_json::from_value(Value::Object(dict.clone()))?)
}

/// Merge `base` into `dict` without overwriting keys `dict` already has.
pub fn merge_base(mut dict: ConfigDict, base: &BaseLayerConfig) -> Result<ConfigDict> {
    for (key, value) in to_dict(base)? {
        dict.entry(key).or_insert(value);
    }
    Ok(dict)
}

static NAME_COUNTERS: Mutex<BTreeMap<String, usize>> = Mutex::new(BTreeMap::new());

/// Process-wide unique layer name such as `lstm_3` or `time_distributed_1`.
pub fn unique_name(class_name: &str) -> String {
    let prefix = to_snake_case(class_name);
    let mut counters = NAME_COUNTERS.lock().unwrap_or_else(|e| e.into_inner());
    let count = counters.entry(prefix.clone()).or_insert(0);
    *count += 1;
    format!("{prefix}_{count}")
}

fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for ch in name.chars() {
        if ch.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
            prev_lower = false;
        } else {
            out.push(ch);
            prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
        }
    }
    out
}
