//! Free-form environment snapshot.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::format::time_of_day;

/// Key/value snapshot of the world the narrator observes.
///
/// Any key is allowed. The well-known keys below have typed accessors:
/// `weather`, `season`, `hour`, `day`, `quadrum`, `year`,
/// `colonist_count`, `temperature`, `threats` (list of active threat
/// labels) and `under_attack`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvironmentSnapshot {
    values: BTreeMap<String, JsonValue>,
}

impl EnvironmentSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<JsonValue>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Record an active threat (raid, manhunter pack, ...).
    pub fn with_threat(mut self, label: impl Into<String>) -> Self {
        let label = JsonValue::String(label.into());
        match self.values.get_mut("threats") {
            Some(JsonValue::Array(list)) => list.push(label),
            _ => {
                self.values.insert("threats".to_string(), JsonValue::Array(vec![label]));
            }
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.values.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &JsonValue)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn weather(&self) -> Option<&str> {
        self.get("weather").and_then(JsonValue::as_str)
    }

    pub fn season(&self) -> Option<&str> {
        self.get("season").and_then(JsonValue::as_str)
    }

    pub fn hour(&self) -> Option<u32> {
        self.uint("hour").filter(|h| *h < 24)
    }

    pub fn day(&self) -> Option<u32> {
        self.uint("day")
    }

    pub fn quadrum(&self) -> Option<&str> {
        self.get("quadrum").and_then(JsonValue::as_str)
    }

    pub fn year(&self) -> Option<u32> {
        self.uint("year")
    }

    pub fn colonist_count(&self) -> Option<u32> {
        self.uint("colonist_count")
    }

    pub fn temperature(&self) -> Option<f64> {
        self.get("temperature").and_then(JsonValue::as_f64)
    }

    pub fn threats(&self) -> Vec<&str> {
        match self.get("threats") {
            Some(JsonValue::Array(list)) => list.iter().filter_map(JsonValue::as_str).collect(),
            _ => Vec::new(),
        }
    }

    pub fn is_under_attack(&self) -> bool {
        self.get("under_attack").and_then(JsonValue::as_bool).unwrap_or(false) || !self.threats().is_empty()
    }

    pub fn time_of_day(&self) -> Option<&'static str> {
        self.hour().map(time_of_day)
    }

    fn uint(&self, key: &str) -> Option<u32> {
        self.get(key)
            .and_then(JsonValue::as_u64)
            .and_then(|v| u32::try_from(v).ok())
    }
}
