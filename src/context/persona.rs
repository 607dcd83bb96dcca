//! Persona, agent and meta records bound into the template scope.

use serde::{Deserialize, Serialize};

/// Character-defining data of the active narrator persona.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaInfo {
    /// Stable identifier; doubles as the template persona namespace.
    pub def_name: String,
    pub name: String,
    pub label: String,
    pub biography: String,
    pub visual_tags: Vec<String>,
    pub personality_tags: Vec<String>,
    pub tone_tags: Vec<String>,
    pub forbidden_words: Vec<String>,
    pub special_abilities: Vec<String>,
    /// Disposition scalars in `[0, 1]`.
    pub mercy_level: f64,
    pub chaos_level: f64,
    pub dominance_level: f64,
    pub custom_prompt: Option<String>,
}

impl Default for PersonaInfo {
    fn default() -> Self {
        Self {
            def_name: String::new(),
            name: String::new(),
            label: String::new(),
            biography: String::new(),
            visual_tags: Vec::new(),
            personality_tags: Vec::new(),
            tone_tags: Vec::new(),
            forbidden_words: Vec::new(),
            special_abilities: Vec::new(),
            mercy_level: 0.5,
            chaos_level: 0.3,
            dominance_level: 0.3,
            custom_prompt: None,
        }
    }
}

impl PersonaInfo {
    pub fn new(def_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            def_name: def_name.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Label falling back to the display name.
    pub fn display_label(&self) -> &str {
        if self.label.is_empty() {
            &self.name
        } else {
            &self.label
        }
    }
}

/// Dialogue style scalars (`[0, 1]`) and stylistic ticks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DialogueStyleInfo {
    pub formality: f64,
    pub emotional: f64,
    pub verbosity: f64,
    pub humor: f64,
    pub sarcasm: f64,
    pub use_emoticons: bool,
    pub use_ellipsis: bool,
    pub use_exclamation: bool,
}

impl Default for DialogueStyleInfo {
    fn default() -> Self {
        Self {
            formality: 0.5,
            emotional: 0.5,
            verbosity: 0.5,
            humor: 0.3,
            sarcasm: 0.2,
            use_emoticons: false,
            use_ellipsis: false,
            use_exclamation: false,
        }
    }
}

impl DialogueStyleInfo {
    /// Human-readable habit lines for the enabled stylistic ticks.
    pub fn habits(&self) -> Vec<&'static str> {
        let mut habits = Vec::new();
        if self.use_emoticons {
            habits.push("Use emoticons");
        }
        if self.use_ellipsis {
            habits.push("Use ellipsis");
        }
        if self.use_exclamation {
            habits.push("Use exclamation marks");
        }
        habits
    }
}

/// Relationship and mood state of the narrator agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentInfo {
    /// Affinity score, roughly `[-100, 100]`.
    pub affinity: f64,
    pub mood: String,
    /// Optional mood intensity in `[0, 1]`.
    pub mood_level: Option<f64>,
    pub active_traits: Vec<String>,
    pub dialogue_style: DialogueStyleInfo,
}

impl AgentInfo {
    pub fn new(affinity: f64, mood: impl Into<String>) -> Self {
        Self {
            affinity,
            mood: mood.into(),
            ..Self::default()
        }
    }
}

/// Host-provided prompt metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetaInfo {
    pub difficulty_mode: String,
    pub language_instruction: String,
    pub settings_prompt: String,
}
