//! Engine configuration.
//!
//! The engine never reads global flags: everything it needs (template
//! directories, development mode, thread guard) is carried by an
//! [`EngineConfig`] injected at construction. Configs can be built in code,
//! parsed from YAML, or overlaid from environment variables.
//!
//! # Environment Variables
//!
//! - `NARRATOR_PROMPT_DEV_MODE` — `1`/`true`/`yes`/`on` enables hot reload
//! - `NARRATOR_PROMPT_OVERRIDE_DIR` — user override root
//! - `NARRATOR_PROMPT_BUNDLE_DIR` — default bundled template directory
//! - `NARRATOR_PROMPT_LANGUAGE` — language sub-folder tried first in each tier

use std::collections::{HashMap, HashSet};
use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ENV_DEV_MODE: &str = "NARRATOR_PROMPT_DEV_MODE";
pub const ENV_OVERRIDE_DIR: &str = "NARRATOR_PROMPT_OVERRIDE_DIR";
pub const ENV_BUNDLE_DIR: &str = "NARRATOR_PROMPT_BUNDLE_DIR";
pub const ENV_LANGUAGE: &str = "NARRATOR_PROMPT_LANGUAGE";

/// Errors raised while loading or validating an [`EngineConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// YAML parsing failed.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A field holds a value the engine cannot use.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration consumed by [`crate::TemplateEngine`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Development / hot-reload mode: template files are re-read and
    /// content hashes re-checked on every render, and render errors are
    /// surfaced inline with full diagnostics.
    pub dev_mode: bool,
    /// Root of user-editable overrides. Persona overrides live in
    /// `<user_override_dir>/<persona>/`.
    pub user_override_dir: PathBuf,
    /// Global default bundled templates.
    pub default_bundle_dir: PathBuf,
    /// Bundle directories for personas shipped by a sub-package.
    pub persona_bundles: HashMap<String, PathBuf>,
    /// Optional language sub-folder tried before each tier's root.
    pub language: Option<String>,
    /// Template file extension, without the leading dot.
    pub file_extension: String,
    /// Template names that always resolve to empty content.
    pub disabled_templates: HashSet<String>,
    /// Only read bundled tiers on the thread that built the engine.
    pub enforce_owner_thread: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dev_mode: false,
            user_override_dir: PathBuf::from("config/prompts"),
            default_bundle_dir: PathBuf::from("prompts"),
            persona_bundles: HashMap::new(),
            language: None,
            file_extension: "txt".to_string(),
            disabled_templates: HashSet::new(),
            enforce_owner_thread: true,
        }
    }
}

impl EngineConfig {
    /// Create a config rooted at the given override and bundle directories.
    pub fn new(user_override_dir: impl Into<PathBuf>, default_bundle_dir: impl Into<PathBuf>) -> Self {
        Self {
            user_override_dir: user_override_dir.into(),
            default_bundle_dir: default_bundle_dir.into(),
            ..Self::default()
        }
    }

    /// Defaults overlaid with the `NARRATOR_PROMPT_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Parse a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yaml::from_str(yaml)?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML config file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Apply any `NARRATOR_PROMPT_*` variables present in the environment.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(raw) = env::var(ENV_DEV_MODE) {
            self.dev_mode = parse_flag(&raw);
        }
        if let Ok(dir) = env::var(ENV_OVERRIDE_DIR) {
            self.user_override_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = env::var(ENV_BUNDLE_DIR) {
            self.default_bundle_dir = PathBuf::from(dir);
        }
        if let Ok(lang) = env::var(ENV_LANGUAGE) {
            let lang = lang.trim();
            self.language = (!lang.is_empty()).then(|| lang.to_string());
        }
        self
    }

    pub fn with_dev_mode(mut self, dev_mode: bool) -> Self {
        self.dev_mode = dev_mode;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Register the bundle directory of a persona shipped by a sub-package.
    pub fn with_persona_bundle(mut self, persona: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        self.persona_bundles.insert(persona.into(), dir.into());
        self
    }

    pub fn with_disabled_template(mut self, name: impl Into<String>) -> Self {
        self.disabled_templates.insert(name.into());
        self
    }

    pub fn with_owner_thread_guard(mut self, enforce: bool) -> Self {
        self.enforce_owner_thread = enforce;
        self
    }

    /// Check invariants the store relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.file_extension.is_empty() {
            return Err(ConfigError::Invalid("file_extension must not be empty".to_string()));
        }
        if self.file_extension.contains(['/', '\\']) {
            return Err(ConfigError::Invalid(format!(
                "file_extension '{}' must not contain path separators",
                self.file_extension
            )));
        }
        if let Some(lang) = &self.language {
            if lang.contains(['/', '\\']) || lang.starts_with('.') {
                return Err(ConfigError::Invalid(format!("language '{}' is not a folder name", lang)));
            }
        }
        Ok(())
    }

    fn normalize(&mut self) {
        if let Some(ext) = self.file_extension.strip_prefix('.') {
            self.file_extension = ext.to_string();
        }
        if self.language.as_deref().is_some_and(|l| l.trim().is_empty()) {
            self.language = None;
        }
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(!config.dev_mode);
        assert_eq!(config.file_extension, "txt");
        assert!(config.enforce_owner_thread);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_yaml_partial() {
        let yaml = r#"
dev_mode: true
default_bundle_dir: "bundle/English/Prompts"
file_extension: ".md"
persona_bundles:
  Sideria: "mods/sideria/Prompts"
"#;
        let config = EngineConfig::from_yaml_str(yaml).unwrap();
        assert!(config.dev_mode);
        assert_eq!(config.file_extension, "md");
        assert_eq!(config.default_bundle_dir, PathBuf::from("bundle/English/Prompts"));
        assert_eq!(
            config.persona_bundles.get("Sideria"),
            Some(&PathBuf::from("mods/sideria/Prompts"))
        );
        // Unspecified fields fall back to defaults.
        assert_eq!(config.user_override_dir, PathBuf::from("config/prompts"));
    }

    #[test]
    fn test_invalid_language_rejected() {
        let err = EngineConfig::from_yaml_str("language: \"../etc\"").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("1"));
        assert!(parse_flag(" TRUE "));
        assert!(parse_flag("on"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag("nope"));
    }

    #[test]
    fn test_builder_helpers() {
        let config = EngineConfig::new("/tmp/o", "/tmp/b")
            .with_dev_mode(true)
            .with_language("English")
            .with_persona_bundle("Cassandra", "/tmp/c")
            .with_disabled_template("LogDiagnosis");
        assert!(config.dev_mode);
        assert_eq!(config.language.as_deref(), Some("English"));
        assert!(config.disabled_templates.contains("LogDiagnosis"));
        assert_eq!(config.user_override_dir, PathBuf::from("/tmp/o"));
    }
}
