//! End-to-end behaviour of the template engine and the preset assembler.

use std::fs;
use std::path::Path;

use narrator_prompt::{
    ContextHookRegistry, EngineConfig, MessageSegment, PersonaInfo, PresetCollection, PromptAssembler,
    PromptEntry, PromptPreset, PromptRole, RenderContext, TemplateEngine, TemplateTier,
};
use minijinja::Value;
use tempfile::TempDir;

fn write_template(dir: &Path, name: &str, text: &str) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join(format!("{}.txt", name)), text).unwrap();
}

fn config(root: &TempDir) -> EngineConfig {
    EngineConfig::new(root.path().join("overrides"), root.path().join("bundle"))
        .with_persona_bundle("Sideria", root.path().join("sideria"))
}

fn shape(segments: &[MessageSegment]) -> Vec<(PromptRole, String)> {
    segments.iter().map(|s| (s.role, s.content.clone())).collect()
}

#[test]
fn test_repeated_render_hits_cache() {
    let root = TempDir::new().unwrap();
    write_template(&root.path().join("bundle"), "Status", "Day {{ day }}, {{ season }}");
    let engine = TemplateEngine::new(config(&root));
    let ctx = RenderContext::new().with_environment(
        narrator_prompt::EnvironmentSnapshot::new()
            .with("day", 12)
            .with("season", "Summer"),
    );

    let first = engine.render_named("Status", &ctx);
    let after_first = engine.stats();
    let second = engine.render_named("Status", &ctx);
    let after_second = engine.stats();

    assert_eq!(first, "Day 12, Summer");
    assert_eq!(first, second);
    assert_eq!(after_second.compiles, after_first.compiles);
    assert_eq!(after_second.hits, after_first.hits + 1);
}

#[test]
fn test_no_adjacent_segments_share_a_role() {
    let root = TempDir::new().unwrap();
    let engine = TemplateEngine::new(config(&root));
    let preset = PromptPreset::new("Mixed")
        .with_entry(PromptEntry::new("s1", "one", PromptRole::System))
        .with_entry(PromptEntry::new("s2", "two", PromptRole::System))
        .with_entry(PromptEntry::history_marker("History"))
        .with_entry(PromptEntry::new("u1", "{{ prompt }}", PromptRole::User))
        .with_entry(PromptEntry::new("note", "aside", PromptRole::System).in_chat(0));
    let mut ctx = RenderContext::new().with_prompt("now");
    ctx.push_turn(PromptRole::User, "a");
    ctx.push_turn(PromptRole::User, "b");
    ctx.push_turn(PromptRole::Assistant, "c");

    let messages = PromptAssembler::new(&engine).build_messages(&preset, &ctx);
    assert!(messages.windows(2).all(|pair| pair[0].role != pair[1].role));
    assert_eq!(messages[0].content, "one\n\ntwo");
    assert_eq!(messages[1].content, "a\n\nb");
}

#[test]
fn test_whitespace_entries_are_omitted() {
    let root = TempDir::new().unwrap();
    let engine = TemplateEngine::new(config(&root));
    let preset = PromptPreset::new("Sparse")
        .with_entry(PromptEntry::new("blank", "   \n\t", PromptRole::System))
        .with_entry(PromptEntry::new("conditional", "{% if false %}x{% endif %}  ", PromptRole::User))
        .with_entry(PromptEntry::new("kept", "kept", PromptRole::Assistant));

    let segments = PromptAssembler::new(&engine).build_segments(&preset, &RenderContext::new());
    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].entry_name, "kept");
}

#[test]
fn test_context_hook_wins_over_builtin() {
    let root = TempDir::new().unwrap();
    let hooks = ContextHookRegistry::new();
    hooks.register_variable("prompt", |_| Some(Value::from("hooked prompt")));
    let engine = TemplateEngine::with_hooks(config(&root), hooks);
    let ctx = RenderContext::new().with_prompt("context prompt");

    assert_eq!(engine.render_text("p", "{{ prompt }}", &ctx), "hooked prompt");
}

#[test]
fn test_override_precedence() {
    let root = TempDir::new().unwrap();
    write_template(&root.path().join("bundle"), "Identity", "global default");
    write_template(&root.path().join("sideria"), "Identity", "persona bundle");
    let engine = TemplateEngine::new(config(&root));
    let store = engine.store();

    let resolved = store.resolve("Identity", Some("Sideria")).unwrap();
    assert_eq!(resolved.text, "persona bundle");
    assert_eq!(resolved.tier, TemplateTier::PersonaBundle);

    store
        .save_user_override("Identity", "user override", Some("Sideria"))
        .unwrap();
    let resolved = store.resolve("Identity", Some("Sideria")).unwrap();
    assert_eq!(resolved.text, "user override");
    assert_eq!(resolved.tier, TemplateTier::UserPersona);

    assert_eq!(store.resolve("Identity", None).unwrap().text, "global default");
}

#[test]
fn test_in_chat_depth_boundaries() {
    let root = TempDir::new().unwrap();
    let engine = TemplateEngine::new(config(&root));
    let base = || {
        PromptPreset::new("Depth")
            .with_entry(PromptEntry::new("r1", "r1", PromptRole::System))
            .with_entry(PromptEntry::new("r2", "r2", PromptRole::User))
            .with_entry(PromptEntry::new("r3", "r3", PromptRole::Assistant))
    };
    let names = |preset: &PromptPreset| -> Vec<String> {
        PromptAssembler::new(&engine)
            .build_segments(preset, &RenderContext::new())
            .into_iter()
            .map(|s| s.entry_name)
            .collect()
    };

    let at_end = base().with_entry(PromptEntry::new("x", "x", PromptRole::System).in_chat(0));
    assert_eq!(names(&at_end), vec!["r1", "r2", "r3", "x"]);

    let middle = base().with_entry(PromptEntry::new("x", "x", PromptRole::System).in_chat(2));
    assert_eq!(names(&middle), vec!["r1", "x", "r2", "r3"]);

    let exact = base().with_entry(PromptEntry::new("x", "x", PromptRole::System).in_chat(3));
    assert_eq!(names(&exact), vec!["x", "r1", "r2", "r3"]);

    let beyond = base().with_entry(PromptEntry::new("x", "x", PromptRole::System).in_chat(99));
    assert_eq!(names(&beyond), vec!["x", "r1", "r2", "r3"]);
}

#[test]
fn test_history_expands_in_order_at_marker() {
    let root = TempDir::new().unwrap();
    let engine = TemplateEngine::new(config(&root));
    let preset = PromptPreset::new("History")
        .with_entry(PromptEntry::new("before", "before", PromptRole::System))
        .with_entry(PromptEntry::history_marker("Chat History"))
        .with_entry(PromptEntry::new("after", "after", PromptRole::System));
    let mut ctx = RenderContext::new();
    ctx.push_turn(PromptRole::User, "a");
    ctx.push_turn(PromptRole::Assistant, "b");
    ctx.push_turn(PromptRole::User, "c");

    let segments = PromptAssembler::new(&engine).build_segments(&preset, &ctx);
    assert_eq!(
        shape(&segments),
        vec![
            (PromptRole::System, "before".to_string()),
            (PromptRole::User, "a".to_string()),
            (PromptRole::Assistant, "b".to_string()),
            (PromptRole::User, "c".to_string()),
            (PromptRole::System, "after".to_string()),
        ]
    );
    assert!(segments[1..4].iter().all(|s| s.entry_name == "Chat History"));
}

#[test]
fn test_unknown_variable_and_empty_history_are_dropped() {
    let root = TempDir::new().unwrap();
    let engine = TemplateEngine::new(config(&root));
    let preset = PromptPreset::new("Scenario")
        .with_entry(PromptEntry::new("Base", "Base", PromptRole::System))
        .with_entry(PromptEntry::new("Unknown", "{{unknown_var}}", PromptRole::System))
        .with_entry(PromptEntry::history_marker("History"))
        .with_entry(PromptEntry::new("Prompt", "{{prompt}}", PromptRole::User));
    let ctx = RenderContext::new().with_prompt("Hello");

    let messages = PromptAssembler::new(&engine).build_messages(&preset, &ctx);
    assert_eq!(
        shape(&messages),
        vec![
            (PromptRole::System, "Base".to_string()),
            (PromptRole::User, "Hello".to_string()),
        ]
    );
}

#[test]
fn test_consecutive_system_entries_merge() {
    let root = TempDir::new().unwrap();
    let engine = TemplateEngine::new(config(&root));
    let preset = PromptPreset::new("Merge")
        .with_entry(PromptEntry::new("x", "X", PromptRole::System))
        .with_entry(PromptEntry::new("y", "Y", PromptRole::System));

    let messages = PromptAssembler::new(&engine).build_messages(&preset, &RenderContext::new());
    assert_eq!(shape(&messages), vec![(PromptRole::System, "X\n\nY".to_string())]);
    assert_eq!(messages[0].entry_name, "x");
}

#[test]
fn test_global_default_greeting() {
    let root = TempDir::new().unwrap();
    write_template(&root.path().join("bundle"), "Greeting", "Hi {{name}}");
    let engine = TemplateEngine::new(config(&root));
    let mut ctx = RenderContext::new().with_persona(PersonaInfo::new("Sideria", "Sideria"));
    ctx.set_variable("name", "Aria");

    assert_eq!(engine.render_named("Greeting", &ctx), "Hi Aria");
}

#[test]
fn test_stock_preset_renders_end_to_end() {
    let root = TempDir::new().unwrap();
    write_template(&root.path().join("bundle"), "OutputFormat_JSON", "Reply as JSON.");
    let engine = TemplateEngine::new(config(&root));
    let collection = PresetCollection::with_default();
    let preset = collection.active().unwrap();

    let mut ctx = RenderContext::new()
        .with_persona(PersonaInfo::new("Cassandra", "Cassandra"))
        .with_prompt("How is the colony?");
    ctx.set_snippet("philosophy", "Drama over comfort.");
    ctx.push_turn(PromptRole::User, "Hi");
    ctx.push_turn(PromptRole::Assistant, "Hello, colonist.");

    let messages = PromptAssembler::new(&engine).build_messages(preset, &ctx);
    let system = &messages[0];
    assert_eq!(system.role, PromptRole::System);
    assert!(system.content.contains("You are Cassandra"));
    assert!(system.content.contains("Drama over comfort."));
    assert!(system.content.contains("Reply as JSON."));
    assert!(!system.content.contains("failed to render"));

    let last = messages.last().unwrap();
    assert_eq!(last.role, PromptRole::User);
    assert!(last.content.ends_with("How is the colony?"));
    assert!(messages.windows(2).all(|pair| pair[0].role != pair[1].role));
}

#[test]
fn test_preset_file_drives_assembly() {
    let root = TempDir::new().unwrap();
    let engine = TemplateEngine::new(config(&root));
    let path = root.path().join("presets.json");

    let mut collection = PresetCollection::new();
    let id = collection.add(
        PromptPreset::new("Terse")
            .with_entry(PromptEntry::new("Rule", "Be brief.", PromptRole::System))
            .with_entry(PromptEntry::new("Ask", "{{ prompt }}", PromptRole::User)),
    );
    collection.set_active(&id).unwrap();
    collection.save_to_file(&path).unwrap();

    let loaded = PresetCollection::load_from_file(&path).unwrap();
    let preset = loaded.active().unwrap();
    let messages = PromptAssembler::new(&engine)
        .build_messages(preset, &RenderContext::new().with_prompt("Status?"));
    assert_eq!(
        shape(&messages),
        vec![
            (PromptRole::System, "Be brief.".to_string()),
            (PromptRole::User, "Status?".to_string()),
        ]
    );
}
