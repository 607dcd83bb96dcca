//! Preset → chat-message assembly.
//!
//! 1. Relative entries render in order; the history marker expands into one
//!    segment per chat turn; empty renders are dropped.
//! 2. In-chat entries are inserted at `max(0, len - depth)` of the list as
//!    it stands after every earlier insertion.
//! 3. Consecutive segments with the same role are merged with a blank line.

use minijinja::Value;

use super::{MessageSegment, PromptEntry, PromptPreset};
use crate::context::RenderContext;
use crate::engine::TemplateEngine;

/// Builds message lists from presets through a [`TemplateEngine`].
pub struct PromptAssembler<'e> {
    engine: &'e TemplateEngine,
}

impl<'e> PromptAssembler<'e> {
    pub fn new(engine: &'e TemplateEngine) -> Self {
        Self { engine }
    }

    /// Final role-merged message list.
    pub fn build_messages(&self, preset: &PromptPreset, ctx: &RenderContext) -> Vec<MessageSegment> {
        merge_consecutive_roles(self.build_segments(preset, ctx))
    }

    /// Segment list before the role-merge pass, with per-entry provenance.
    pub fn build_segments(&self, preset: &PromptPreset, ctx: &RenderContext) -> Vec<MessageSegment> {
        let scope = self.engine.scope(ctx);
        let persona = ctx.persona_namespace();
        let mut segments = Vec::new();
        let mut history_expanded = false;

        for entry in preset.relative_entries() {
            if entry.is_main_chat_history {
                if history_expanded {
                    log::warn!(
                        "Preset '{}' has more than one chat-history entry; skipping '{}'",
                        preset.name,
                        entry.name
                    );
                    continue;
                }
                history_expanded = true;
                segments.extend(
                    ctx.chat_history
                        .iter()
                        .map(|turn| MessageSegment::new(entry, turn.role, turn.message.clone())),
                );
                continue;
            }

            if let Some(segment) = self.render_entry(entry, persona, &scope) {
                segments.push(segment);
            }
        }

        for entry in preset.in_chat_entries() {
            if let Some(segment) = self.render_entry(entry, persona, &scope) {
                let index = segments.len().saturating_sub(entry.in_chat_depth);
                segments.insert(index, segment);
            }
        }

        segments
    }

    fn render_entry(&self, entry: &PromptEntry, persona: Option<&str>, scope: &Value) -> Option<MessageSegment> {
        let content = self
            .engine
            .render_inline(&entry.name, &entry.content, persona, scope)
            .into_text();
        if content.trim().is_empty() {
            return None;
        }
        Some(MessageSegment::new(
            entry,
            entry.effective_role(),
            entry.annotate(content),
        ))
    }
}

/// Merge runs of same-role segments, joining bodies with `"\n\n"`.
///
/// A merged segment keeps the provenance of the first segment of its run.
pub fn merge_consecutive_roles(segments: Vec<MessageSegment>) -> Vec<MessageSegment> {
    let mut merged: Vec<MessageSegment> = Vec::with_capacity(segments.len());
    for segment in segments {
        match merged.last_mut() {
            Some(last) if last.role == segment.role => {
                last.content.push_str("\n\n");
                last.content.push_str(&segment.content);
            }
            _ => merged.push(segment),
        }
    }
    merged
}
