// src/values/mod.rs

//! Layered values trees passed to hooks and to chart rendering.
//!
//! A values tree is a JSON object keyed by string. The reserved top-level
//! key `global` holds the shared global subtree; each module owns a
//! top-level key equal to the camelCase form of its name
//! (`node-exporter` -> `nodeExporter`).
//!
//! Merging is deep-merge for objects and replace for arrays and scalars,
//! with later layers winning.

mod checksum;
mod patch;
mod store;

pub use checksum::{canonical_bytes, checksum_hex};
pub use patch::{PatchOp, PatchOpKind, ValuesPatch};
pub use store::{PatchScope, ValuesStore};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reserved top-level key for the global subtree
pub const GLOBAL_KEY: &str = "global";

/// Suffix of the per-module enabled flag key (`nodeExporterEnabled`)
pub const ENABLED_SUFFIX: &str = "Enabled";

/// A JSON object tree of configuration values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Values(Map<String, Value>);

impl Values {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Build from a JSON value; anything but an object is rejected
    pub fn from_value(value: Value) -> crate::error::Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(crate::error::Error::Config(format!(
                "values must be a JSON object, got {}",
                type_name(&other)
            ))),
        }
    }

    pub fn from_json_slice(bytes: &[u8]) -> crate::error::Result<Self> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_value(value)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|k| k.as_str())
    }

    /// The subtree stored under `key`, or an empty tree if absent or
    /// not an object
    pub fn section(&self, key: &str) -> Values {
        match self.0.get(key) {
            Some(Value::Object(map)) => Values(map.clone()),
            _ => Values::new(),
        }
    }

    pub fn global_section(&self) -> Values {
        self.section(GLOBAL_KEY)
    }

    /// Deep-merge `other` on top of this tree. Objects merge key by key;
    /// arrays and scalars are replaced wholesale.
    pub fn merge_from(&mut self, other: &Values) {
        merge_objects(&mut self.0, &other.0);
    }

    /// Merge a stack of layers, lowest precedence first
    pub fn merged(layers: &[&Values]) -> Values {
        let mut result = Values::new();
        for layer in layers {
            result.merge_from(layer);
        }
        result
    }

    pub fn as_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for Values {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

fn merge_objects(dst: &mut Map<String, Value>, src: &Map<String, Value>) {
    for (key, incoming) in src {
        match (dst.get_mut(key), incoming) {
            (Some(Value::Object(existing)), Value::Object(new)) => {
                merge_objects(existing, new);
            }
            _ => {
                dst.insert(key.clone(), incoming.clone());
            }
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// camelCase values key for a module name: `node-exporter` -> `nodeExporter`
pub fn module_values_key(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for ch in name.chars() {
        if ch == '-' || ch == '_' {
            upper_next = true;
        } else if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}

/// Key of the enabled flag for a module (`nodeExporterEnabled`)
pub fn module_enabled_key(name: &str) -> String {
    let mut key = module_values_key(name);
    key.push_str(ENABLED_SUFFIX);
    key
}
