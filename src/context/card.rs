//! Aggregated narrator state card.
//!
//! A single snapshot of everything a character-card template may want to
//! show: identity, bio rhythm, mind/affinity, appearance consistency and
//! descent (physical form) status. Templates read it as `card.Mind.AffinityTier`,
//! `card.Bio.TimeOfDay`, ... through the member resolvers.

use serde::{Deserialize, Serialize};

use super::environment::EnvironmentSnapshot;
use super::format::{affinity_tier, energy_label, time_of_day};
use super::persona::{AgentInfo, PersonaInfo};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateCard {
    pub name: String,
    pub label: String,
    /// Narrator mode, e.g. "Assistant" or "Opponent".
    pub role: String,
    pub bio: BioState,
    pub mind: MindState,
    pub appearance: AppearanceState,
    pub descent: DescentState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BioState {
    pub energy_level: String,
    pub hunger_level: String,
    pub time_of_day: String,
    pub is_sleepy: bool,
}

impl Default for BioState {
    fn default() -> Self {
        Self {
            energy_level: "Normal".to_string(),
            hunger_level: "Full".to_string(),
            time_of_day: "Unknown".to_string(),
            is_sleepy: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MindState {
    pub current_emotion: String,
    pub affinity_tier: String,
    pub affinity_value: f64,
    pub active_traits: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppearanceState {
    pub has_visual_context: bool,
    pub visual_tags: Vec<String>,
    pub description: String,
    pub dominant_color: String,
    pub consistency: ConsistencyState,
}

/// Whether the portrait the player sees matches what the narrator claims.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsistencyState {
    pub is_consistent: bool,
    pub warning_message: String,
    pub current_expression: String,
    pub expected_expression: String,
    pub severity_level: f64,
}

impl Default for ConsistencyState {
    fn default() -> Self {
        Self {
            is_consistent: true,
            warning_message: String::new(),
            current_expression: "Neutral".to_string(),
            expected_expression: "Neutral".to_string(),
            severity_level: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DescentState {
    pub is_descending: bool,
    pub is_descent_active: bool,
    pub cooldown_remaining: String,
    /// "Portrait" or "Physical".
    pub current_form: String,
    pub form_description: String,
}

impl Default for DescentState {
    fn default() -> Self {
        Self {
            is_descending: false,
            is_descent_active: false,
            cooldown_remaining: "Ready".to_string(),
            current_form: "Portrait".to_string(),
            form_description: String::new(),
        }
    }
}

impl DescentState {
    /// Descent status from the host's raw flags.
    pub fn from_flags(active: bool, has_physical_body: bool, cooldown: impl Into<String>) -> Self {
        let cooldown = cooldown.into();
        let physical = active || has_physical_body;
        let form_description = if physical {
            "You currently exist in physical form inside the world, able to act in the colony.".to_string()
        } else if cooldown == "Ready" {
            "You currently exist as a portrait beside the player. You may use the Descent command to enter the world.".to_string()
        } else {
            format!(
                "You currently exist as a portrait beside the player. Descent is on cooldown ({}).",
                cooldown
            )
        };
        Self {
            is_descending: active && !has_physical_body,
            is_descent_active: has_physical_body,
            cooldown_remaining: cooldown,
            current_form: if physical { "Physical" } else { "Portrait" }.to_string(),
            form_description,
        }
    }
}

impl StateCard {
    /// Build the identity, mind and bio sections from live records.
    ///
    /// `energy` is the bio-rhythm reading in `[0, 100]`, when known.
    pub fn from_parts(
        persona: &PersonaInfo,
        agent: &AgentInfo,
        environment: &EnvironmentSnapshot,
        energy: Option<f64>,
    ) -> Self {
        let mut card = Self {
            name: persona.name.clone(),
            label: persona.display_label().to_string(),
            role: "Assistant".to_string(),
            ..Self::default()
        };

        card.mind = MindState {
            current_emotion: agent.mood.clone(),
            affinity_tier: affinity_tier(agent.affinity).to_string(),
            affinity_value: agent.affinity,
            active_traits: agent.active_traits.clone(),
        };

        card.bio.time_of_day = environment
            .hour()
            .map(time_of_day)
            .unwrap_or("Unknown")
            .to_string();
        if let Some(energy) = energy {
            card.bio.energy_level = energy_label(energy).to_string();
            card.bio.is_sleepy = energy < 20.0;
        }

        card.appearance.visual_tags = persona.visual_tags.clone();
        card.appearance.has_visual_context = !persona.visual_tags.is_empty();
        card
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    pub fn with_descent(mut self, descent: DescentState) -> Self {
        self.descent = descent;
        self
    }
}
