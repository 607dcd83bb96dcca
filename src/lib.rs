//! # Narrator Prompt
//!
//! Layered prompt templating and chat-message assembly for AI narrator
//! personas.
//!
//! The crate is built from four layers, leaves first:
//!
//! ```text
//! TemplateStore      name + persona  → raw text   (user override → persona bundle → default bundle)
//!   ↓
//! TemplateCompiler   raw text        → compiled   (cached by name, persona, content hash)
//!   ↓
//! bridge             RenderContext   → template scope (hooks → built-ins → case-insensitive → field resolvers)
//!   ↓
//! PromptAssembler    PromptPreset    → Vec<MessageSegment> (relative, in-chat, role merge)
//! ```
//!
//! [`TemplateEngine`] owns the store, the compiler and the hook registry and
//! is the object callers construct once and pass around by reference.

pub mod bridge;
pub mod config;
pub mod context;
pub mod engine;
pub mod presets;
pub mod templates;

pub use bridge::hooks::ContextHookRegistry;
pub use config::{ConfigError, EngineConfig};
pub use context::{
    AgentInfo, ChatTurn, DialogueStyleInfo, EnvironmentSnapshot, MetaInfo, PersonaInfo,
    RenderContext, StateCard, VariableStore,
};
pub use engine::{RenderOutcome, TemplateEngine};
pub use presets::assembler::{merge_consecutive_roles, PromptAssembler};
pub use presets::collection::{PresetCollection, PresetError};
pub use presets::{MessageSegment, PromptEntry, PromptPosition, PromptPreset, PromptRole};
pub use templates::{
    CacheKey, CacheStats, CompiledTemplate, Template, TemplateCompiler, TemplateError,
    TemplateStore, TemplateTier,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
