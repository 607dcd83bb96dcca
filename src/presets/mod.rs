//! Prompt presets: ordered, role-tagged template entries.
//!
//! A [`PromptPreset`] is turned into a chat-message list by
//! [`assembler::PromptAssembler`]; presets are managed and persisted through
//! [`collection::PresetCollection`].

pub mod assembler;
pub mod collection;

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Transport role of a chat message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PromptRole {
    #[default]
    System,
    User,
    #[serde(alias = "AI", alias = "ai", alias = "assistant")]
    Assistant,
}

impl PromptRole {
    /// Wire name used by chat-completion APIs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    /// Short label used in flattened history text.
    pub fn label(self) -> &'static str {
        match self {
            Self::System => "System",
            Self::User => "User",
            Self::Assistant => "AI",
        }
    }
}

impl fmt::Display for PromptRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an entry is placed in the assembled list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PromptPosition {
    /// In configured order, before in-chat insertion.
    #[default]
    Relative,
    /// Inserted `in_chat_depth` messages back from the end.
    InChat,
}

/// One configured template + role + placement rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptEntry {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub role: PromptRole,
    /// Presentation role label; sent as a `User` message with a
    /// `[role: X]` annotation line.
    pub custom_role: Option<String>,
    pub content: String,
    pub position: PromptPosition,
    /// Negative or fractional depths in stored presets load as the nearest
    /// valid depth (`-2` → `0`, `1.7` → `1`).
    #[serde(deserialize_with = "lenient_depth")]
    pub in_chat_depth: usize,
    /// Expands into the context's chat history instead of rendering.
    pub is_main_chat_history: bool,
}

fn lenient_depth<'de, D: Deserializer<'de>>(deserializer: D) -> Result<usize, D::Error> {
    let depth = Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0);
    if depth.is_nan() || depth < 0.0 {
        log::warn!("Invalid in-chat depth {} clamped to 0", depth);
        return Ok(0);
    }
    Ok(depth as usize)
}

impl Default for PromptEntry {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: "New Entry".to_string(),
            enabled: true,
            role: PromptRole::System,
            custom_role: None,
            content: String::new(),
            position: PromptPosition::Relative,
            in_chat_depth: 0,
            is_main_chat_history: false,
        }
    }
}

impl PromptEntry {
    pub fn new(name: impl Into<String>, content: impl Into<String>, role: PromptRole) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            role,
            ..Self::default()
        }
    }

    /// The chat-history insertion point.
    pub fn history_marker(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: PromptRole::User,
            content: "{{ chat.history }}".to_string(),
            is_main_chat_history: true,
            ..Self::default()
        }
    }

    pub fn in_chat(mut self, depth: usize) -> Self {
        self.position = PromptPosition::InChat;
        self.in_chat_depth = depth;
        self
    }

    pub fn with_custom_role(mut self, role: impl Into<String>) -> Self {
        self.custom_role = Some(role.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    fn custom_role_label(&self) -> Option<&str> {
        self.custom_role.as_deref().map(str::trim).filter(|r| !r.is_empty())
    }

    /// Transport role: `User` whenever a custom role is set.
    pub fn effective_role(&self) -> PromptRole {
        if self.custom_role_label().is_some() {
            PromptRole::User
        } else {
            self.role
        }
    }

    /// Prefix rendered content with the custom-role annotation, if any.
    pub fn annotate(&self, content: String) -> String {
        match self.custom_role_label() {
            Some(role) => format!("[role: {}]\n{}", role, content),
            None => content,
        }
    }

    /// Copy with a fresh id.
    pub fn duplicate(&self) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            ..self.clone()
        }
    }

    /// Legacy presets marked the history slot only by its body.
    pub fn looks_like_legacy_history_marker(&self) -> bool {
        let body: String = self.content.chars().filter(|c| !c.is_whitespace()).collect();
        body == "{{chat.history}}"
    }
}

/// An ordered, named list of entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptPreset {
    pub id: String,
    pub name: String,
    pub description: String,
    pub entries: Vec<PromptEntry>,
    pub is_active: bool,
}

impl Default for PromptPreset {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: "Default Preset".to_string(),
            description: String::new(),
            entries: Vec::new(),
            is_active: false,
        }
    }
}

impl PromptPreset {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_entry(mut self, entry: PromptEntry) -> Self {
        self.entries.push(entry);
        self
    }

    /// Enabled entries placed relatively, in configured order.
    pub fn relative_entries(&self) -> impl Iterator<Item = &PromptEntry> {
        self.entries
            .iter()
            .filter(|e| e.enabled && e.position == PromptPosition::Relative)
    }

    /// Enabled in-chat entries, in configured order.
    pub fn in_chat_entries(&self) -> impl Iterator<Item = &PromptEntry> {
        self.entries
            .iter()
            .filter(|e| e.enabled && e.position == PromptPosition::InChat)
    }

    pub fn history_marker_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_main_chat_history).count()
    }

    pub fn entry(&self, id: &str) -> Option<&PromptEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn entry_mut(&mut self, id: &str) -> Option<&mut PromptEntry> {
        self.entries.iter_mut().find(|e| e.id == id)
    }

    /// Mark the legacy `{{chat.history}}` entry when nothing is marked.
    ///
    /// Returns whether an entry was migrated.
    pub fn migrate_legacy_history_marker(&mut self) -> bool {
        if self.history_marker_count() > 0 {
            return false;
        }
        match self
            .entries
            .iter_mut()
            .find(|e| e.looks_like_legacy_history_marker())
        {
            Some(entry) => {
                entry.is_main_chat_history = true;
                true
            }
            None => false,
        }
    }

    /// Deep copy with fresh ids, inactive.
    pub fn duplicate(&self) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            entries: self.entries.iter().map(PromptEntry::duplicate).collect(),
            is_active: false,
            ..self.clone()
        }
    }

    /// The stock narrator preset.
    pub fn default_preset() -> Self {
        let mut preset = Self::new("Default Preset");
        preset.description = "Identity, state card, philosophy, history and the player's message.".to_string();
        preset.entries = vec![
            PromptEntry::new("Identity", DEFAULT_IDENTITY, PromptRole::System),
            PromptEntry::new("Character Card", DEFAULT_CARD, PromptRole::System),
            PromptEntry::new("Philosophy", "{{ snippets.philosophy }}", PromptRole::System),
            PromptEntry::new("Output Format", "{% include \"OutputFormat_JSON\" %}", PromptRole::System),
            PromptEntry::history_marker("Chat History"),
            PromptEntry::new("Dialogue Prompt", "{{ prompt }}", PromptRole::User),
        ];
        preset
    }
}

const DEFAULT_IDENTITY: &str = "\
{% if snippets.identity %}{{ snippets.identity }}{% else %}You are {{ persona.name }}, the narrator of this colony.
{% if persona.biography %}{{ persona.biography }}
{% endif %}{% if persona.personality_tags %}Personality: {{ persona.personality_tags | join(\", \") }}
{% endif %}{% endif %}{% if meta.language_instruction %}
{{ meta.language_instruction }}{% endif %}";

const DEFAULT_CARD: &str = "\
{% if card %}=== CHARACTER STATE CARD ===
[Identity]
Name: {{ card.Name }}
Role: {{ card.Role }}

[Mind]
Emotion: {{ card.Mind.CurrentEmotion }}
Affinity: {{ card.Mind.AffinityValue | fixed }} ({{ card.Mind.AffinityTier }})

[Bio]
Time: {{ card.Bio.TimeOfDay }}
Energy: {{ card.Bio.EnergyLevel }}

[Form]
{{ card.Descent.FormDescription }}
{% if not card.Appearance.Consistency.IsConsistent %}
[Consistency Warning]
{{ card.Appearance.Consistency.WarningMessage }}
{% endif %}
[Environment]
Weather: {{ get_weather() }}
Season: {{ get_season() }}
Colonists: {{ get_colonist_count() }}
{% if is_under_attack() %}The colony is under attack.{% endif %}{% endif %}";

/// One finalized (role, text) unit of the assembled message list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageSegment {
    /// Id of the entry that produced this segment.
    pub entry_id: String,
    pub entry_name: String,
    pub role: PromptRole,
    pub content: String,
}

impl MessageSegment {
    pub fn new(entry: &PromptEntry, role: PromptRole, content: String) -> Self {
        Self {
            entry_id: entry.id.clone(),
            entry_name: entry.name.clone(),
            role,
            content,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serde_aliases() {
        let role: PromptRole = serde_json::from_str("\"AI\"").unwrap();
        assert_eq!(role, PromptRole::Assistant);
        let role: PromptRole = serde_json::from_str("\"Assistant\"").unwrap();
        assert_eq!(role, PromptRole::Assistant);
        assert_eq!(serde_json::to_string(&PromptRole::User).unwrap(), "\"User\"");
        assert_eq!(PromptRole::Assistant.to_string(), "assistant");
    }

    #[test]
    fn test_custom_role_forces_user() {
        let entry = PromptEntry::new("Narration", "text", PromptRole::Assistant).with_custom_role("Narrator");
        assert_eq!(entry.effective_role(), PromptRole::User);
        assert_eq!(entry.annotate("hello".to_string()), "[role: Narrator]\nhello");

        let blank = PromptEntry::new("X", "text", PromptRole::System).with_custom_role("  ");
        assert_eq!(blank.effective_role(), PromptRole::System);
        assert_eq!(blank.annotate("hello".to_string()), "hello");
    }

    #[test]
    fn test_entry_filters() {
        let preset = PromptPreset::new("P")
            .with_entry(PromptEntry::new("a", "A", PromptRole::System))
            .with_entry(PromptEntry::new("b", "B", PromptRole::System).disabled())
            .with_entry(PromptEntry::new("c", "C", PromptRole::User).in_chat(1));
        let relative: Vec<_> = preset.relative_entries().map(|e| e.name.as_str()).collect();
        let in_chat: Vec<_> = preset.in_chat_entries().map(|e| e.name.as_str()).collect();
        assert_eq!(relative, vec!["a"]);
        assert_eq!(in_chat, vec!["c"]);
    }

    #[test]
    fn test_legacy_marker_migration() {
        let mut preset = PromptPreset::new("Old")
            .with_entry(PromptEntry::new("Intro", "hi", PromptRole::System))
            .with_entry(PromptEntry::new("History", "  {{chat.history}}\n", PromptRole::User));
        assert!(preset.migrate_legacy_history_marker());
        assert!(preset.entries[1].is_main_chat_history);
        assert!(!preset.migrate_legacy_history_marker());
    }

    #[test]
    fn test_duplicate_gets_fresh_ids() {
        let preset = PromptPreset::default_preset();
        let copy = preset.duplicate();
        assert_ne!(copy.id, preset.id);
        assert_eq!(copy.entries.len(), preset.entries.len());
        assert!(copy.entries.iter().zip(&preset.entries).all(|(a, b)| a.id != b.id && a.content == b.content));
    }

    #[test]
    fn test_default_preset_shape() {
        let preset = PromptPreset::default_preset();
        assert_eq!(preset.history_marker_count(), 1);
        assert_eq!(preset.entries.last().map(|e| e.role), Some(PromptRole::User));
    }

    #[test]
    fn test_out_of_range_depth_is_clamped() {
        let entry: PromptEntry =
            serde_json::from_str(r#"{"name": "Note", "position": "InChat", "in_chat_depth": -3}"#).unwrap();
        assert_eq!(entry.in_chat_depth, 0);
        assert_eq!(entry.position, PromptPosition::InChat);

        let entry: PromptEntry = serde_json::from_str(r#"{"in_chat_depth": 2.9}"#).unwrap();
        assert_eq!(entry.in_chat_depth, 2);
        let entry: PromptEntry = serde_json::from_str(r#"{"in_chat_depth": null}"#).unwrap();
        assert_eq!(entry.in_chat_depth, 0);
        let entry: PromptEntry = serde_json::from_str(r#"{"in_chat_depth": 4}"#).unwrap();
        assert_eq!(entry.in_chat_depth, 4);
    }
}
