//! Preset collection: active selection, unique names, persistence.

use std::fs;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::PromptPreset;

static NUMBERED_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.*?)\s*\((\d+)\)$").expect("valid regex"));

/// Preset management errors.
#[derive(Debug, Error)]
pub enum PresetError {
    #[error("Preset not found: {0}")]
    NotFound(String),

    #[error("Preset '{preset}' marks {count} entries as the chat-history insertion point; at most one is allowed")]
    MultipleHistoryMarkers { preset: String, count: usize },

    #[error("Duplicate preset name: {0}")]
    DuplicateName(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Owning collection of presets.
///
/// At most one preset is active; when none is flagged the first one is
/// treated as active. Names are kept unique by suffixing ` (n)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PresetCollection {
    presets: Vec<PromptPreset>,
}

impl PresetCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// A collection holding the stock preset, active.
    pub fn with_default() -> Self {
        let mut preset = PromptPreset::default_preset();
        preset.is_active = true;
        Self { presets: vec![preset] }
    }

    pub fn presets(&self) -> &[PromptPreset] {
        &self.presets
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&PromptPreset> {
        self.presets.iter().find(|p| p.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut PromptPreset> {
        self.presets.iter_mut().find(|p| p.id == id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&PromptPreset> {
        self.presets.iter().find(|p| p.name == name)
    }

    /// The active preset, falling back to the first.
    pub fn active(&self) -> Option<&PromptPreset> {
        self.presets
            .iter()
            .find(|p| p.is_active)
            .or_else(|| self.presets.first())
    }

    pub fn set_active(&mut self, id: &str) -> Result<(), PresetError> {
        if self.get(id).is_none() {
            return Err(PresetError::NotFound(id.to_string()));
        }
        for preset in &mut self.presets {
            preset.is_active = preset.id == id;
        }
        Ok(())
    }

    /// Add a preset, renaming it if its name is taken. Returns its id.
    pub fn add(&mut self, mut preset: PromptPreset) -> String {
        preset.name = self.unique_name(&preset.name, Some(&preset.id));
        if preset.is_active {
            for other in &mut self.presets {
                other.is_active = false;
            }
        }
        let id = preset.id.clone();
        self.presets.push(preset);
        id
    }

    /// Remove a preset. Removing the active preset activates the first.
    pub fn remove(&mut self, id: &str) -> Result<PromptPreset, PresetError> {
        let index = self
            .presets
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| PresetError::NotFound(id.to_string()))?;
        let removed = self.presets.remove(index);
        if removed.is_active {
            if let Some(first) = self.presets.first_mut() {
                first.is_active = true;
            }
        }
        Ok(removed)
    }

    /// Rename a preset, suffixing ` (n)` if the name is taken.
    pub fn rename(&mut self, id: &str, name: &str) -> Result<String, PresetError> {
        let unique = self.unique_name(name, Some(id));
        let preset = self
            .get_mut(id)
            .ok_or_else(|| PresetError::NotFound(id.to_string()))?;
        preset.name = unique.clone();
        Ok(unique)
    }

    /// Copy a preset under a fresh name (`Name` → `Name (1)`, `Name (1)` → `Name (2)`).
    pub fn duplicate(&mut self, id: &str) -> Result<String, PresetError> {
        let source = self.get(id).ok_or_else(|| PresetError::NotFound(id.to_string()))?;
        let mut copy = source.duplicate();
        let base = match NUMBERED_SUFFIX.captures(&source.name) {
            Some(caps) => caps[1].trim().to_string(),
            None => source.name.clone(),
        };
        copy.name = self.unique_name(&base, None);
        let new_id = copy.id.clone();
        self.presets.push(copy);
        Ok(new_id)
    }

    /// Add an inactive copy of the stock preset named after `base_name`.
    pub fn create_from_default(&mut self, base_name: &str) -> String {
        let mut preset = PromptPreset::default_preset();
        preset.is_active = false;
        preset.name = self.unique_name(base_name, None);
        let id = preset.id.clone();
        self.presets.push(preset);
        id
    }

    /// `base_name`, or the first free `base_name (n)`. The preset with id
    /// `exclude_id` does not count as a clash.
    pub fn unique_name(&self, base_name: &str, exclude_id: Option<&str>) -> String {
        let taken = |name: &str| {
            self.presets
                .iter()
                .any(|p| p.name == name && Some(p.id.as_str()) != exclude_id)
        };
        if !taken(base_name) {
            return base_name.to_string();
        }
        (1..)
            .map(|i| format!("{} ({})", base_name, i))
            .find(|candidate| !taken(candidate))
            .unwrap_or_else(|| base_name.to_string())
    }

    /// Check the one-history-marker and unique-name invariants.
    pub fn validate(&self) -> Result<(), PresetError> {
        let mut seen = std::collections::HashSet::new();
        for preset in &self.presets {
            let count = preset.history_marker_count();
            if count > 1 {
                return Err(PresetError::MultipleHistoryMarkers {
                    preset: preset.name.clone(),
                    count,
                });
            }
            if !seen.insert(preset.name.as_str()) {
                return Err(PresetError::DuplicateName(preset.name.clone()));
            }
        }
        Ok(())
    }

    /// Mark legacy `{{chat.history}}` entries. Returns how many presets changed.
    pub fn migrate_legacy_markers(&mut self) -> usize {
        self.presets
            .iter_mut()
            .filter_map(|p| p.migrate_legacy_history_marker().then_some(()))
            .count()
    }

    /// Restore the collection invariants on hand-edited data: duplicate
    /// names get a ` (n)` suffix, duplicate ids a fresh id, and only the
    /// first active flag survives. Returns the number of presets touched.
    pub fn repair(&mut self) -> usize {
        let mut touched = 0;
        let mut seen_active = false;
        for i in 0..self.presets.len() {
            let mut changed = false;
            let (earlier, rest) = self.presets.split_at_mut(i);
            let preset = &mut rest[0];
            if earlier.iter().any(|p| p.id == preset.id) {
                preset.id = Uuid::new_v4().to_string();
                changed = true;
            }
            if preset.is_active {
                if seen_active {
                    preset.is_active = false;
                    changed = true;
                }
                seen_active = true;
            }
            if earlier.iter().any(|p| p.name == preset.name) {
                let id = preset.id.clone();
                let base = preset.name.clone();
                self.presets[i].name = self.unique_name(&base, Some(&id));
                changed = true;
            }
            if changed {
                touched += 1;
            }
        }
        touched
    }

    /// Load presets from pretty JSON, migrating legacy history markers and
    /// repairing duplicate names or active flags.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, PresetError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let mut collection: Self = serde_json::from_str(&content)?;
        let migrated = collection.migrate_legacy_markers();
        if migrated > 0 {
            log::info!("Migrated legacy chat-history marker in {} preset(s)", migrated);
        }
        let repaired = collection.repair();
        if repaired > 0 {
            log::warn!(
                "Repaired {} preset(s) with a duplicate name, id or active flag in {}",
                repaired,
                path.display()
            );
        }
        Ok(collection)
    }

    /// Load presets, falling back to the stock collection when the file is
    /// missing, unreadable or empty.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::with_default();
        }
        match Self::load_from_file(path) {
            Ok(collection) if !collection.is_empty() => collection,
            Ok(_) => Self::with_default(),
            Err(e) => {
                log::error!("Failed to load presets from {}: {}", path.display(), e);
                Self::with_default()
            }
        }
    }

    /// Validate, then write pretty JSON.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), PresetError> {
        self.validate()?;
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        log::debug!("Saved {} preset(s) to {}", self.presets.len(), path.display());
        Ok(())
    }
}
