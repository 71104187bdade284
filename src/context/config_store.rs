// src/context/config_store.rs

use std::collections::BTreeMap;
use std::str::FromStr;

/// Read-only key/value settings available to tasks through the run context.
pub trait ConfigStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

impl dyn ConfigStore {
    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    /// Parse a value; `None` if missing or unparsable.
    pub fn get_parsed<T: FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }
}

/// In-memory store, filled from the `[settings]` table of a run plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapConfigStore {
    values: BTreeMap<String, String>,
}

impl MapConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl ConfigStore for MapConfigStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

impl From<BTreeMap<String, String>> for MapConfigStore {
    fn from(values: BTreeMap<String, String>) -> Self {
        Self { values }
    }
}
