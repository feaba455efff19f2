use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

/// Setting bag for one resource kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Setting(BTreeMap<String, Value>);

impl Setting {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Per-kind settings, built by the embedder before the scan and handed to
/// each resource that accepts settings at scan time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Settings(BTreeMap<String, Setting>);

impl Settings {
    pub fn get(&self, kind: &str) -> Option<&Setting> {
        self.0.get(kind)
    }

    pub fn set(&mut self, kind: &str, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.0.entry(kind.to_string()).or_default().set(key, value);
        self
    }

    pub fn insert(&mut self, kind: impl Into<String>, setting: Setting) -> &mut Self {
        self.0.insert(kind.into(), setting);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
