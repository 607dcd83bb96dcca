//! Compiled-template cache.
//!
//! Compiled templates live inside a single [`minijinja::Environment`] guarded
//! by a `parking_lot::RwLock`. Each entry is recorded with the SHA-256 of the
//! raw text it was compiled from. A lookup is a hit when the entry exists and,
//! in development mode, its recorded hash still matches the raw text.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use minijinja::{Environment, Value};
use parking_lot::RwLock;
use serde::Serialize;

use super::error::TemplateError;
use super::{content_hash, GLOBAL_NAMESPACE};

const INLINE_PREFIX: &str = "#inline-";

/// Cache key: template name scoped by persona namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub name: String,
    pub persona: Option<String>,
}

impl CacheKey {
    pub fn named(name: &str, persona: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            persona: persona.filter(|p| !p.is_empty()).map(str::to_string),
        }
    }

    /// Key for an inline body (a preset entry), addressed by its content hash.
    pub fn inline(body: &str, persona: Option<&str>) -> Self {
        let hash = content_hash(body);
        Self::named(&format!("{}{}", INLINE_PREFIX, &hash[..16]), persona)
    }

    pub fn is_inline(&self) -> bool {
        self.name.starts_with(INLINE_PREFIX)
    }

    /// Name under which the template is registered in the environment.
    ///
    /// The persona namespace is the first path segment, which is how includes
    /// find persona-scoped siblings.
    pub fn env_name(&self) -> String {
        format!("{}/{}", namespace_segment(self.persona.as_deref()), self.name)
    }
}

/// Split an environment template name back into (persona, name).
pub fn split_env_name(env_name: &str) -> (Option<Cow<'_, str>>, &str) {
    match env_name.split_once('/') {
        Some((GLOBAL_NAMESPACE, name)) => (None, name),
        Some((namespace, name)) => (Some(decode_segment(namespace)), name),
        None => (None, env_name),
    }
}

// Persona ids map to a single path segment and back: `%`, `/` and `\` are
// escaped, and a persona literally named `_global` gets an escaped `_`.
fn namespace_segment(persona: Option<&str>) -> String {
    let Some(persona) = persona else {
        return GLOBAL_NAMESPACE.to_string();
    };
    if persona == GLOBAL_NAMESPACE {
        return format!("%5F{}", &GLOBAL_NAMESPACE[1..]);
    }
    let mut out = String::with_capacity(persona.len());
    for c in persona.chars() {
        match c {
            '%' => out.push_str("%25"),
            '/' => out.push_str("%2F"),
            '\\' => out.push_str("%5C"),
            c => out.push(c),
        }
    }
    out
}

fn decode_segment(segment: &str) -> Cow<'_, str> {
    if !segment.contains('%') {
        return Cow::Borrowed(segment);
    }
    let mut out = String::with_capacity(segment.len());
    let mut rest = segment;
    while let Some(i) = rest.find('%') {
        out.push_str(&rest[..i]);
        let decoded = match rest.get(i + 1..i + 3) {
            Some("25") => '%',
            Some("2F") => '/',
            Some("5C") => '\\',
            Some("5F") => '_',
            _ => {
                out.push('%');
                rest = &rest[i + 1..];
                continue;
            }
        };
        out.push(decoded);
        rest = &rest[i + 3..];
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// Handle to a compiled template held by a [`TemplateCompiler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledTemplate {
    pub key: CacheKey,
    pub content_hash: String,
    env_name: String,
}

impl CompiledTemplate {
    pub fn env_name(&self) -> &str {
        &self.env_name
    }
}

/// Hit / compile counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub compiles: u64,
}

struct CompilerState {
    env: Environment<'static>,
    hashes: HashMap<String, String>,
}

/// Cache of compiled templates keyed by (name, persona) and content hash.
pub struct TemplateCompiler {
    state: RwLock<CompilerState>,
    dev_mode: bool,
    hits: AtomicU64,
    compiles: AtomicU64,
}

impl TemplateCompiler {
    /// Wrap a configured environment (loader, filters, functions).
    pub fn new(env: Environment<'static>, dev_mode: bool) -> Self {
        Self {
            state: RwLock::new(CompilerState {
                env,
                hashes: HashMap::new(),
            }),
            dev_mode,
            hits: AtomicU64::new(0),
            compiles: AtomicU64::new(0),
        }
    }

    pub fn dev_mode(&self) -> bool {
        self.dev_mode
    }

    /// Return the cached compiled form of `key`, compiling `raw` on a miss.
    pub fn get_or_compile(&self, key: &CacheKey, raw: &str) -> Result<CompiledTemplate, TemplateError> {
        let env_name = key.env_name();
        let mut hash = None;

        {
            let state = self.state.read();
            if let Some(stored) = state.hashes.get(&env_name) {
                if !self.dev_mode {
                    return Ok(self.hit(key, env_name, stored.clone()));
                }
                let current = content_hash(raw);
                if *stored == current {
                    return Ok(self.hit(key, env_name, current));
                }
                hash = Some(current);
            }
        }

        let hash = hash.unwrap_or_else(|| content_hash(raw));
        let mut state = self.state.write();

        // Another caller may have compiled the same text while we waited.
        if state.hashes.get(&env_name) == Some(&hash) {
            drop(state);
            return Ok(self.hit(key, env_name, hash));
        }

        self.compiles.fetch_add(1, Ordering::Relaxed);
        match state.env.add_template_owned(env_name.clone(), raw.to_string()) {
            Ok(()) => {
                state.hashes.insert(env_name.clone(), hash.clone());
                Ok(CompiledTemplate {
                    key: key.clone(),
                    content_hash: hash,
                    env_name,
                })
            }
            Err(err) => {
                state.env.remove_template(&env_name);
                state.hashes.remove(&env_name);
                let diagnostics = describe(&err);
                for line in &diagnostics {
                    log::error!("Template '{}' failed to compile: {}", key.name, line);
                }
                Err(TemplateError::Syntax {
                    name: key.name.clone(),
                    diagnostics,
                })
            }
        }
    }

    /// Render a compiled template against a root scope value.
    pub fn render(&self, compiled: &CompiledTemplate, scope: Value) -> Result<String, TemplateError> {
        let state = self.state.read();
        let render_error = |err: minijinja::Error| TemplateError::Render {
            name: compiled.key.name.clone(),
            message: describe(&err).join("; "),
        };
        let template = state.env.get_template(&compiled.env_name).map_err(render_error)?;
        template.render(scope).map_err(render_error)
    }

    /// Drop templates the environment loaded on its own (includes), so the
    /// next render pulls them through the loader again. Templates compiled
    /// through [`Self::get_or_compile`] are kept.
    pub fn discard_loaded(&self, env_names: &[String]) -> usize {
        if env_names.is_empty() {
            return 0;
        }
        let mut state = self.state.write();
        let mut discarded = 0;
        for name in env_names {
            if !state.hashes.contains_key(name) {
                state.env.remove_template(name);
                discarded += 1;
            }
        }
        discarded
    }

    /// Drop every compiled template, including loaded includes.
    pub fn clear_cache(&self) {
        let mut state = self.state.write();
        state.env.clear_templates();
        state.hashes.clear();
        log::info!("Compiled template cache cleared");
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            compiles: self.compiles.load(Ordering::Relaxed),
        }
    }

    /// Number of templates compiled through [`Self::get_or_compile`].
    pub fn len(&self) -> usize {
        self.state.read().hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn hit(&self, key: &CacheKey, env_name: String, content_hash: String) -> CompiledTemplate {
        self.hits.fetch_add(1, Ordering::Relaxed);
        CompiledTemplate {
            key: key.clone(),
            content_hash,
            env_name,
        }
    }
}

/// Flatten a minijinja error and its sources into diagnostic lines.
fn describe(err: &minijinja::Error) -> Vec<String> {
    let mut lines = vec![err.to_string()];
    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        lines.push(inner.to_string());
        source = std::error::Error::source(inner);
    }
    lines
}
