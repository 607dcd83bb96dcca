//! Caller-side variable store.
//!
//! Hosts (and collaborators such as persona mods) set named variables here
//! between turns; the store is copied into each [`RenderContext`] so templates
//! read them as `{{ name }}` or `{{ vars.name }}`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::RenderContext;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariableStore {
    vars: BTreeMap<String, JsonValue>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_var(&mut self, name: impl Into<String>, value: impl Into<JsonValue>) {
        self.vars.insert(name.into(), value.into());
    }

    /// Exact lookup, then ASCII case-insensitive.
    pub fn get_var(&self, name: &str) -> Option<&JsonValue> {
        self.vars.get(name).or_else(|| {
            self.vars
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v)
        })
    }

    pub fn remove_var(&mut self, name: &str) -> Option<JsonValue> {
        self.vars.remove(name)
    }

    pub fn clear(&mut self) {
        self.vars.clear();
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &JsonValue)> {
        self.vars.iter()
    }

    /// Copy every variable into `ctx`, replacing same-named entries.
    pub fn apply_to(&self, ctx: &mut RenderContext) {
        for (name, value) in &self.vars {
            ctx.variables.insert(name.clone(), value.clone());
        }
    }
}
