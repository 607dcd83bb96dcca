//! prompt-preview binary.
//!
//! Assembles the active preset against a JSON render context and prints the
//! resulting chat messages as JSON. Useful for checking template edits
//! without starting the host.
//!
//! # Usage
//!
//! ```bash
//! prompt-preview --bundle prompts --overrides config/prompts \
//!     --preset presets.json --context context.json
//! ```
//!
//! Run with `--help` for the option list. `RUST_LOG` controls log output
//! (default: "info,narrator_prompt=debug").

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use narrator_prompt::{
    merge_consecutive_roles, EngineConfig, PresetCollection, PromptAssembler, RenderContext,
    TemplateEngine,
};

#[derive(Debug, Parser)]
#[command(name = "prompt-preview")]
#[command(about = "Assemble a narrator prompt preset and print the chat messages as JSON")]
#[command(version)]
struct Args {
    /// YAML engine configuration (the directory flags below override it)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Default template bundle directory
    #[arg(long, visible_alias = "templates")]
    bundle: Option<PathBuf>,

    /// User override directory
    #[arg(long)]
    overrides: Option<PathBuf>,

    /// Preset collection JSON (default: stock preset)
    #[arg(long)]
    preset: Option<PathBuf>,

    /// Render context JSON (default: preview context)
    #[arg(long)]
    context: Option<PathBuf>,

    /// Print segments before the role-merge pass
    #[arg(long)]
    unmerged: bool,

    /// Development mode: hot reload, detailed error markers
    #[arg(
        long,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_value_t = false,
        default_missing_value = "true"
    )]
    dev: bool,
}

fn load_config(args: &Args) -> Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::from_yaml_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::from_env(),
    };
    if let Some(dir) = &args.bundle {
        config.default_bundle_dir = dir.clone();
    }
    if let Some(dir) = &args.overrides {
        config.user_override_dir = dir.clone();
    }
    if args.dev {
        config.dev_mode = true;
    }
    config.validate()?;
    Ok(config)
}

fn load_context(args: &Args) -> Result<RenderContext> {
    match &args.context {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading context {}", path.display()))?;
            serde_json::from_str(&raw).with_context(|| format!("parsing context {}", path.display()))
        }
        None => Ok(RenderContext {
            is_preview: true,
            ..RenderContext::default()
        }),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,narrator_prompt=debug".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    let ctx = load_context(&args)?;

    let presets = match &args.preset {
        Some(path) => PresetCollection::load_from_file(path)
            .with_context(|| format!("loading presets {}", path.display()))?,
        None => PresetCollection::with_default(),
    };
    let preset = presets.active().context("preset collection is empty")?;
    presets.validate()?;

    tracing::info!(
        "Assembling preset '{}' ({} entries, dev_mode: {})",
        preset.name,
        preset.entries.len(),
        config.dev_mode
    );

    let engine = TemplateEngine::new(config);
    let assembler = PromptAssembler::new(&engine);
    let segments = assembler.build_segments(preset, &ctx);
    let messages = if args.unmerged {
        segments
    } else {
        merge_consecutive_roles(segments)
    };

    println!("{}", serde_json::to_string_pretty(&messages)?);

    let stats = engine.stats();
    tracing::info!(
        "{} message(s); template cache: {} hit(s), {} compile(s)",
        messages.len(),
        stats.hits,
        stats.compiles
    );
    Ok(())
}
