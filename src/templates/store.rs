//! Tiered template store.
//!
//! Resolution order for `resolve(name, persona)`, first hit wins:
//!
//! 1. `<user_override_dir>/<persona>/[<lang>/]<name>.<ext>`
//! 2. `<user_override_dir>/[<lang>/]<name>.<ext>`
//! 3. `<persona_bundles[persona]>/[<lang>/]<name>.<ext>`
//! 4. `<default_bundle_dir>/[<lang>/]<name>.<ext>`
//!
//! Results, including misses, are cached by (name, persona) until
//! [`TemplateStore::clear_cache`]. In development mode the cache is bypassed
//! on read so edited files are picked up on the next render.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use super::content_hash;
use super::error::TemplateError;
use crate::config::EngineConfig;

/// Which tier a template was resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TemplateTier {
    UserPersona,
    UserGlobal,
    PersonaBundle,
    DefaultBundle,
    /// Listed in `disabled_templates`; always empty.
    Disabled,
}

impl TemplateTier {
    /// Bundled tiers are subject to the owner-thread guard.
    pub fn is_bundled(self) -> bool {
        matches!(self, Self::PersonaBundle | Self::DefaultBundle)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::UserPersona => "user-persona",
            Self::UserGlobal => "user-global",
            Self::PersonaBundle => "persona-bundle",
            Self::DefaultBundle => "default-bundle",
            Self::Disabled => "disabled",
        }
    }
}

/// A resolved template: raw text plus where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub name: String,
    pub persona: Option<String>,
    pub tier: TemplateTier,
    pub text: String,
    pub content_hash: String,
}

impl Template {
    pub fn new(name: &str, persona: Option<&str>, tier: TemplateTier, text: String) -> Self {
        Self {
            name: name.to_string(),
            persona: persona.map(str::to_string),
            tier,
            content_hash: content_hash(&text),
            text,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

type StoreKey = (String, Option<String>);

/// Filesystem-backed template store with a per-(name, persona) cache.
pub struct TemplateStore {
    config: Arc<EngineConfig>,
    cache: DashMap<StoreKey, Option<Arc<Template>>>,
    owner: ThreadId,
}

impl TemplateStore {
    /// Create a store owned by the calling thread.
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self {
            config,
            cache: DashMap::new(),
            owner: thread::current().id(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Resolve a template by name for an optional persona namespace.
    ///
    /// Returns [`TemplateError::NotFound`] when no tier has the file; callers
    /// treat that as empty content.
    pub fn resolve(&self, name: &str, persona: Option<&str>) -> Result<Arc<Template>, TemplateError> {
        let persona = normalize_persona(persona);

        if !is_valid_name(name) {
            log::warn!("Rejected template name '{}'", name);
            return Err(TemplateError::not_found(name, persona));
        }

        if self.config.disabled_templates.contains(name) {
            return Ok(Arc::new(Template::new(
                name,
                persona,
                TemplateTier::Disabled,
                String::new(),
            )));
        }

        let key: StoreKey = (name.to_string(), persona.map(str::to_string));
        if !self.config.dev_mode {
            if let Some(cached) = self.cached(&key) {
                return cached.ok_or_else(|| TemplateError::not_found(name, persona));
            }
        }

        let on_owner_thread = self.is_owner_thread();
        for (tier, dir) in self.candidate_dirs(persona) {
            if tier.is_bundled() && !on_owner_thread {
                log::warn!(
                    "Template '{}' needs a bundled read off the owner thread; degrading",
                    name
                );
                // Serve what the owner thread already resolved, never cache from here.
                return match self.cached(&key) {
                    Some(cached) => cached.ok_or_else(|| TemplateError::not_found(name, persona)),
                    None => Err(TemplateError::not_found(name, persona)),
                };
            }

            if let Some(path) = self.find_file(&dir, name) {
                let text = fs::read_to_string(&path)?;
                if self.config.dev_mode {
                    log::debug!("Loaded template '{}' from {} ({})", name, tier.as_str(), path.display());
                }
                let template = Arc::new(Template::new(name, persona, tier, text));
                self.cache.insert(key, Some(Arc::clone(&template)));
                return Ok(template);
            }
        }

        log::warn!(
            "Template not found: {} (persona: {})",
            name,
            persona.unwrap_or("global")
        );
        self.cache.insert(key, None);
        Err(TemplateError::not_found(name, persona))
    }

    /// Names of every template visible to `persona`, across all tiers.
    pub fn list_template_names(&self, persona: Option<&str>) -> Vec<String> {
        let persona = normalize_persona(persona);
        let on_owner_thread = self.is_owner_thread();
        let suffix = format!(".{}", self.config.file_extension);
        let mut names = BTreeSet::new();

        for (tier, dir) in self.candidate_dirs(persona) {
            if tier.is_bundled() && !on_owner_thread {
                continue;
            }
            for search in self.search_dirs(&dir) {
                let Ok(entries) = fs::read_dir(&search) else {
                    continue;
                };
                for entry in entries.flatten() {
                    if !entry.path().is_file() {
                        continue;
                    }
                    let file_name = entry.file_name().to_string_lossy().into_owned();
                    if let Some(stem) = file_name.strip_suffix(&suffix) {
                        if is_valid_name(stem) {
                            names.insert(stem.to_string());
                        }
                    }
                }
            }
        }

        names.into_iter().collect()
    }

    /// Write a user override and drop the cached resolutions it shadows.
    pub fn save_user_override(
        &self,
        name: &str,
        content: &str,
        persona: Option<&str>,
    ) -> Result<PathBuf, TemplateError> {
        let persona = normalize_persona(persona);
        if !is_valid_name(name) {
            return Err(TemplateError::not_found(name, persona));
        }

        let mut dir = self.override_dir(persona);
        if let Some(lang) = &self.config.language {
            dir = dir.join(lang);
        }
        fs::create_dir_all(&dir)?;
        let path = dir.join(self.file_name(name));
        fs::write(&path, content)?;
        log::info!("Saved template override {}", path.display());

        self.invalidate(name, persona);
        Ok(path)
    }

    /// Create the user override folder for `persona` (global when `None`)
    /// and seed it with editable copies of the bundled templates.
    ///
    /// Files already present in the override folder are left untouched.
    /// A persona is seeded from its own bundle first, then from the default
    /// bundle. Returns the number of files copied.
    pub fn initialize_user_overrides(&self, persona: Option<&str>) -> Result<usize, TemplateError> {
        let persona = normalize_persona(persona);
        let root = self.override_dir(persona);
        let target = match &self.config.language {
            Some(lang) => root.join(lang),
            None => root.clone(),
        };
        fs::create_dir_all(&target)?;

        if !self.is_owner_thread() {
            log::warn!("Skipping template seeding off the owner thread");
            return Ok(0);
        }

        let mut sources = Vec::with_capacity(2);
        if let Some(bundle) = persona.and_then(|p| self.config.persona_bundles.get(p)) {
            sources.push(bundle.clone());
        }
        sources.push(self.config.default_bundle_dir.clone());

        let suffix = format!(".{}", self.config.file_extension);
        let mut seen = BTreeSet::new();
        let mut copied = 0;
        for source in sources {
            for dir in self.search_dirs(&source) {
                let Ok(entries) = fs::read_dir(&dir) else {
                    continue;
                };
                for entry in entries.flatten() {
                    let path = entry.path();
                    if !path.is_file() {
                        continue;
                    }
                    let file_name = entry.file_name().to_string_lossy().into_owned();
                    let Some(stem) = file_name.strip_suffix(&suffix) else {
                        continue;
                    };
                    if !is_valid_name(stem) || !seen.insert(stem.to_string()) {
                        continue;
                    }
                    if self.find_file(&root, stem).is_some() {
                        continue;
                    }
                    fs::copy(&path, target.join(&file_name))?;
                    self.invalidate(stem, persona);
                    copied += 1;
                }
            }
        }

        log::info!(
            "Initialized user templates in {} ({} copied, persona: {})",
            target.display(),
            copied,
            persona.unwrap_or("global")
        );
        Ok(copied)
    }

    /// Remove a user override. Returns whether a file was deleted.
    pub fn delete_user_override(&self, name: &str, persona: Option<&str>) -> Result<bool, TemplateError> {
        let persona = normalize_persona(persona);
        if !is_valid_name(name) {
            return Ok(false);
        }

        let mut deleted = false;
        for dir in self.search_dirs(&self.override_dir(persona)) {
            let path = dir.join(self.file_name(name));
            if path.is_file() {
                fs::remove_file(&path)?;
                log::info!("Deleted template override {}", path.display());
                deleted = true;
            }
        }

        if deleted {
            self.invalidate(name, persona);
        }
        Ok(deleted)
    }

    /// Drop every cached resolution.
    pub fn clear_cache(&self) {
        let count = self.cache.len();
        self.cache.clear();
        log::info!("Template store cache cleared ({} entries)", count);
    }

    /// Number of cached (name, persona) resolutions, misses included.
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    fn cached(&self, key: &StoreKey) -> Option<Option<Arc<Template>>> {
        self.cache.get(key).map(|entry| entry.value().clone())
    }

    // A global override shadows every persona's resolution of that name.
    fn invalidate(&self, name: &str, persona: Option<&str>) {
        self.cache.retain(|(cached_name, cached_persona), _| {
            !(cached_name == name && (persona.is_none() || cached_persona.as_deref() == persona))
        });
    }

    fn is_owner_thread(&self) -> bool {
        !self.config.enforce_owner_thread || thread::current().id() == self.owner
    }

    fn candidate_dirs(&self, persona: Option<&str>) -> Vec<(TemplateTier, PathBuf)> {
        let mut dirs = Vec::with_capacity(4);
        if let Some(persona) = persona {
            dirs.push((TemplateTier::UserPersona, self.override_dir(Some(persona))));
        }
        dirs.push((TemplateTier::UserGlobal, self.config.user_override_dir.clone()));
        if let Some(bundle) = persona.and_then(|p| self.config.persona_bundles.get(p)) {
            dirs.push((TemplateTier::PersonaBundle, bundle.clone()));
        }
        dirs.push((TemplateTier::DefaultBundle, self.config.default_bundle_dir.clone()));
        dirs
    }

    fn override_dir(&self, persona: Option<&str>) -> PathBuf {
        match persona {
            Some(persona) => self.config.user_override_dir.join(sanitize_segment(persona)),
            None => self.config.user_override_dir.clone(),
        }
    }

    fn search_dirs(&self, dir: &Path) -> Vec<PathBuf> {
        match &self.config.language {
            Some(lang) => vec![dir.join(lang), dir.to_path_buf()],
            None => vec![dir.to_path_buf()],
        }
    }

    fn find_file(&self, dir: &Path, name: &str) -> Option<PathBuf> {
        let file_name = self.file_name(name);
        self.search_dirs(dir)
            .into_iter()
            .map(|d| d.join(&file_name))
            .find(|p| p.is_file())
    }

    fn file_name(&self, name: &str) -> String {
        format!("{}.{}", name, self.config.file_extension)
    }
}

fn normalize_persona(persona: Option<&str>) -> Option<&str> {
    persona.map(str::trim).filter(|p| !p.is_empty())
}

/// Template names are single path segments.
fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.starts_with('#')
        && !name.contains(['/', '\\', ':'])
}

fn sanitize_segment(segment: &str) -> String {
    segment
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect::<String>()
        .trim_start_matches('.')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Fixture {
        _root: TempDir,
        overrides: PathBuf,
        bundle: PathBuf,
        persona_bundle: PathBuf,
    }

    fn fixture() -> Fixture {
        let root = TempDir::new().unwrap();
        let overrides = root.path().join("overrides");
        let bundle = root.path().join("bundle");
        let persona_bundle = root.path().join("sideria");
        for dir in [&overrides, &bundle, &persona_bundle] {
            fs::create_dir_all(dir).unwrap();
        }
        Fixture {
            _root: root,
            overrides,
            bundle,
            persona_bundle,
        }
    }

    fn store_for(fx: &Fixture, dev_mode: bool) -> TemplateStore {
        let config = EngineConfig::new(&fx.overrides, &fx.bundle)
            .with_dev_mode(dev_mode)
            .with_persona_bundle("Sideria", &fx.persona_bundle);
        TemplateStore::new(Arc::new(config))
    }

    fn write(dir: &Path, name: &str, text: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(format!("{}.txt", name)), text).unwrap();
    }

    #[test]
    fn test_tier_precedence() {
        let fx = fixture();
        write(&fx.bundle, "Identity", "default");
        write(&fx.persona_bundle, "Identity", "bundled");
        let store = store_for(&fx, true);

        let t = store.resolve("Identity", Some("Sideria")).unwrap();
        assert_eq!(t.text, "bundled");
        assert_eq!(t.tier, TemplateTier::PersonaBundle);

        write(&fx.overrides, "Identity", "global override");
        let t = store.resolve("Identity", Some("Sideria")).unwrap();
        assert_eq!(t.text, "global override");
        assert_eq!(t.tier, TemplateTier::UserGlobal);

        write(&fx.overrides.join("Sideria"), "Identity", "persona override");
        let t = store.resolve("Identity", Some("Sideria")).unwrap();
        assert_eq!(t.text, "persona override");
        assert_eq!(t.tier, TemplateTier::UserPersona);

        // Other personas skip the Sideria-specific tiers.
        let t = store.resolve("Identity", Some("Cassandra")).unwrap();
        assert_eq!(t.text, "global override");
    }

    #[test]
    fn test_miss_is_cached() {
        let fx = fixture();
        let store = store_for(&fx, false);

        let err = store.resolve("Missing", None).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(store.cached_len(), 1);

        // Appears on disk, but the cached miss wins until a clear.
        write(&fx.bundle, "Missing", "now here");
        assert!(store.resolve("Missing", None).is_err());

        store.clear_cache();
        assert_eq!(store.resolve("Missing", None).unwrap().text, "now here");
    }

    #[test]
    fn test_production_cache_holds_content() {
        let fx = fixture();
        write(&fx.bundle, "Greeting", "v1");
        let store = store_for(&fx, false);
        assert_eq!(store.resolve("Greeting", None).unwrap().text, "v1");

        write(&fx.bundle, "Greeting", "v2");
        assert_eq!(store.resolve("Greeting", None).unwrap().text, "v1");
    }

    #[test]
    fn test_dev_mode_rereads() {
        let fx = fixture();
        write(&fx.bundle, "Greeting", "v1");
        let store = store_for(&fx, true);
        let first = store.resolve("Greeting", None).unwrap();

        write(&fx.bundle, "Greeting", "v2");
        let second = store.resolve("Greeting", None).unwrap();
        assert_eq!(second.text, "v2");
        assert_ne!(first.content_hash, second.content_hash);
    }

    #[test]
    fn test_language_folder_first() {
        let fx = fixture();
        write(&fx.bundle, "Identity", "root");
        write(&fx.bundle.join("German"), "Identity", "deutsch");
        let config = EngineConfig::new(&fx.overrides, &fx.bundle).with_language("German");
        let store = TemplateStore::new(Arc::new(config));
        assert_eq!(store.resolve("Identity", None).unwrap().text, "deutsch");
    }

    #[test]
    fn test_disabled_template_is_empty() {
        let fx = fixture();
        write(&fx.bundle, "LogDiagnosis", "noisy");
        let config = EngineConfig::new(&fx.overrides, &fx.bundle).with_disabled_template("LogDiagnosis");
        let store = TemplateStore::new(Arc::new(config));
        let t = store.resolve("LogDiagnosis", None).unwrap();
        assert_eq!(t.tier, TemplateTier::Disabled);
        assert!(t.is_empty());
    }

    #[test]
    fn test_rejects_path_traversal() {
        let fx = fixture();
        let store = store_for(&fx, false);
        assert!(store.resolve("../secret", None).unwrap_err().is_not_found());
        assert!(store.resolve("", None).unwrap_err().is_not_found());
    }

    #[test]
    fn test_save_and_delete_override() {
        let fx = fixture();
        write(&fx.bundle, "Identity", "default");
        let store = store_for(&fx, false);
        assert_eq!(store.resolve("Identity", Some("Sideria")).unwrap().text, "default");

        let path = store.save_user_override("Identity", "mine", Some("Sideria")).unwrap();
        assert!(path.starts_with(fx.overrides.join("Sideria")));
        assert_eq!(store.resolve("Identity", Some("Sideria")).unwrap().text, "mine");
        assert_eq!(store.resolve("Identity", None).unwrap().text, "default");

        assert!(store.delete_user_override("Identity", Some("Sideria")).unwrap());
        assert_eq!(store.resolve("Identity", Some("Sideria")).unwrap().text, "default");
        assert!(!store.delete_user_override("Identity", Some("Sideria")).unwrap());
    }

    #[test]
    fn test_list_template_names() {
        let fx = fixture();
        write(&fx.bundle, "Identity", "a");
        write(&fx.bundle, "OutputFormat_JSON", "b");
        write(&fx.persona_bundle, "Descent", "c");
        write(&fx.overrides, "Identity", "d");
        fs::write(fx.bundle.join("notes.md"), "ignored").unwrap();
        let store = store_for(&fx, false);

        assert_eq!(
            store.list_template_names(Some("Sideria")),
            vec!["Descent", "Identity", "OutputFormat_JSON"]
        );
        assert_eq!(store.list_template_names(None), vec!["Identity", "OutputFormat_JSON"]);
    }

    #[test]
    fn test_off_thread_bundled_read_degrades() {
        let fx = fixture();
        write(&fx.bundle, "Greeting", "hi");
        write(&fx.bundle, "Farewell", "bye");
        let store = Arc::new(store_for(&fx, false));
        store.resolve("Greeting", None).unwrap();

        let worker = Arc::clone(&store);
        let (cached, uncached) = thread::spawn(move || {
            (
                worker.resolve("Greeting", None).map(|t| t.text.clone()),
                worker.resolve("Farewell", None).map(|t| t.text.clone()),
            )
        })
        .join()
        .unwrap();

        assert_eq!(cached.unwrap(), "hi");
        assert!(uncached.unwrap_err().is_not_found());
        // The degraded miss was not cached, so the owner still finds it.
        assert_eq!(store.resolve("Farewell", None).unwrap().text, "bye");
    }

    #[test]
    fn test_initialize_user_overrides() {
        let fx = fixture();
        write(&fx.bundle, "Identity", "default identity");
        write(&fx.bundle, "OutputFormat_JSON", "json");
        write(&fx.persona_bundle, "Identity", "sideria identity");
        write(&fx.overrides, "OutputFormat_JSON", "my edit");
        fs::write(fx.bundle.join("notes.md"), "ignored").unwrap();
        let store = store_for(&fx, false);

        assert_eq!(store.initialize_user_overrides(None).unwrap(), 1);
        assert_eq!(fs::read_to_string(fx.overrides.join("Identity.txt")).unwrap(), "default identity");
        assert_eq!(fs::read_to_string(fx.overrides.join("OutputFormat_JSON.txt")).unwrap(), "my edit");
        assert!(!fx.overrides.join("notes.md").exists());
        assert_eq!(store.resolve("Identity", None).unwrap().tier, TemplateTier::UserGlobal);

        let persona_dir = fx.overrides.join("Sideria");
        assert_eq!(store.initialize_user_overrides(Some("Sideria")).unwrap(), 2);
        assert_eq!(fs::read_to_string(persona_dir.join("Identity.txt")).unwrap(), "sideria identity");
        assert_eq!(fs::read_to_string(persona_dir.join("OutputFormat_JSON.txt")).unwrap(), "json");

        fs::write(persona_dir.join("Identity.txt"), "edited").unwrap();
        assert_eq!(store.initialize_user_overrides(Some("Sideria")).unwrap(), 0);
        assert_eq!(fs::read_to_string(persona_dir.join("Identity.txt")).unwrap(), "edited");

        assert_eq!(store.initialize_user_overrides(Some("Cassandra")).unwrap(), 2);
        assert!(fx.overrides.join("Cassandra").join("Identity.txt").is_file());
    }

    #[test]
    fn test_initialize_creates_language_folder() {
        let fx = fixture();
        write(&fx.bundle.join("German"), "Identity", "deutsch");
        write(&fx.bundle, "Identity", "root");
        let config = EngineConfig::new(&fx.overrides, &fx.bundle).with_language("German");
        let store = TemplateStore::new(Arc::new(config));

        assert_eq!(store.initialize_user_overrides(Some("Sideria")).unwrap(), 1);
        let copied = fx.overrides.join("Sideria").join("German").join("Identity.txt");
        assert_eq!(fs::read_to_string(copied).unwrap(), "deutsch");
    }
}
