//! Render context: the read-only data snapshot fed to a render pass.
//!
//! A [`RenderContext`] is assembled by the host for every dialogue turn and
//! never mutated by templates. The bridge layer exposes it to templates as
//! `persona`, `agent`, `environment`, `card`, `meta`, `vars`, `snippets`,
//! `chat` and a few date shorthands.

pub mod card;
pub mod environment;
pub mod format;
pub mod persona;
pub mod variables;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub use card::{AppearanceState, BioState, ConsistencyState, DescentState, MindState, StateCard};
pub use environment::EnvironmentSnapshot;
pub use persona::{AgentInfo, DialogueStyleInfo, MetaInfo, PersonaInfo};
pub use variables::VariableStore;

use crate::presets::PromptRole;

const HISTORY_HEADER: &str = "Conversation history (reference only; do not repeat or continue):";

/// One past message of the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: PromptRole,
    pub message: String,
}

impl ChatTurn {
    pub fn new(role: PromptRole, message: impl Into<String>) -> Self {
        Self {
            role,
            message: message.into(),
        }
    }
}

/// Snapshot of persona, agent and world state for one render pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderContext {
    pub persona: PersonaInfo,
    pub agent: AgentInfo,
    pub environment: EnvironmentSnapshot,
    pub card: Option<StateCard>,
    pub meta: MetaInfo,
    /// The player's current message, bound as `prompt`.
    pub prompt: Option<String>,
    /// Free-form named variables; visible at the top level and under `vars`.
    pub variables: BTreeMap<String, JsonValue>,
    /// Pre-rendered text blocks produced outside the template system.
    pub snippets: BTreeMap<String, String>,
    pub chat_history: Vec<ChatTurn>,
    /// Preview renders show placeholder history instead of nothing.
    pub is_preview: bool,
}

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_persona(mut self, persona: PersonaInfo) -> Self {
        self.persona = persona;
        self
    }

    pub fn with_agent(mut self, agent: AgentInfo) -> Self {
        self.agent = agent;
        self
    }

    pub fn with_environment(mut self, environment: EnvironmentSnapshot) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_card(mut self, card: StateCard) -> Self {
        self.card = Some(card);
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_history(mut self, history: Vec<ChatTurn>) -> Self {
        self.chat_history = history;
        self
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<JsonValue>) {
        self.variables.insert(name.into(), value.into());
    }

    pub fn set_snippet(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.snippets.insert(name.into(), text.into());
    }

    pub fn push_turn(&mut self, role: PromptRole, message: impl Into<String>) {
        self.chat_history.push(ChatTurn::new(role, message));
    }

    /// Template namespace of the active persona, if any.
    pub fn persona_namespace(&self) -> Option<&str> {
        let def_name = self.persona.def_name.trim();
        (!def_name.is_empty()).then_some(def_name)
    }

    /// Habit lines derived from the agent's dialogue style.
    pub fn habits(&self) -> Vec<&'static str> {
        self.agent.dialogue_style.habits()
    }

    /// Chat history flattened into a single reference block.
    ///
    /// Empty when there is no history, unless this is a preview render.
    pub fn chat_history_text(&self) -> String {
        if !self.chat_history.is_empty() {
            let lines: Vec<String> = self
                .chat_history
                .iter()
                .enumerate()
                .map(|(i, turn)| {
                    let text = turn.message.replace("\r\n", " ").replace(['\n', '\r'], " ");
                    format!("- {} | role={} | text={}", i + 1, turn.role.label(), text)
                })
                .collect();
            return format!("{}\n{}", HISTORY_HEADER, lines.join("\n"));
        }

        if self.is_preview {
            return format!(
                "{}\n- 1 | role=User | text=Hello!\n- 2 | role=AI | text=This is a placeholder for chat history.",
                HISTORY_HEADER
            );
        }

        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persona_namespace() {
        let ctx = RenderContext::new();
        assert_eq!(ctx.persona_namespace(), None);

        let ctx = RenderContext::new().with_persona(PersonaInfo::new(" Sideria ", "Sideria"));
        assert_eq!(ctx.persona_namespace(), Some("Sideria"));
    }

    #[test]
    fn test_chat_history_text() {
        let mut ctx = RenderContext::new();
        assert_eq!(ctx.chat_history_text(), "");

        ctx.push_turn(PromptRole::User, "hi\nthere");
        ctx.push_turn(PromptRole::Assistant, "hello");
        assert_eq!(
            ctx.chat_history_text(),
            "Conversation history (reference only; do not repeat or continue):\n\
             - 1 | role=User | text=hi there\n\
             - 2 | role=AI | text=hello"
        );
    }

    #[test]
    fn test_preview_history_placeholder() {
        let ctx = RenderContext {
            is_preview: true,
            ..RenderContext::default()
        };
        assert!(ctx.chat_history_text().contains("placeholder"));
    }

    #[test]
    fn test_context_from_json() {
        let json = r#"{
            "persona": {"def_name": "Cassandra", "name": "Cassandra"},
            "prompt": "Hello",
            "chat_history": [{"role": "User", "message": "a"}, {"role": "AI", "message": "b"}]
        }"#;
        let ctx: RenderContext = serde_json::from_str(json).unwrap();
        assert_eq!(ctx.prompt.as_deref(), Some("Hello"));
        assert_eq!(ctx.chat_history[1].role, PromptRole::Assistant);
    }
}
