//! Template engine: store + compiler + hooks behind one render boundary.
//!
//! Rendering never fails from the caller's point of view:
//!
//! - missing templates render as empty text;
//! - syntax and render errors (including panicking hooks) are contained
//!   and replaced by a visible marker. In development mode the marker
//!   carries the diagnostics; in production it is short and the details go
//!   to the log.

use std::borrow::Cow;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use dashmap::DashSet;
use minijinja::{AutoEscape, Environment, UndefinedBehavior, Value};

use crate::bridge::hooks::ContextHookRegistry;
use crate::bridge::{functions, Binding, RootScope};
use crate::config::EngineConfig;
use crate::context::RenderContext;
use crate::templates::compiler::split_env_name;
use crate::templates::{
    CacheKey, CacheStats, TemplateCompiler, TemplateError, TemplateStore, GLOBAL_NAMESPACE,
};

/// Result of one contained render.
#[derive(Debug)]
pub enum RenderOutcome {
    Rendered(String),
    /// The template failed; `marker` stands in for its output.
    Failed { marker: String, error: TemplateError },
}

impl RenderOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Rendered(text) => text,
            Self::Failed { marker, .. } => marker,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Self::Rendered(text) => text,
            Self::Failed { marker, .. } => marker,
        }
    }
}

/// Owns the template store, the compiled-template cache and the hook
/// registry. Construct once and share by reference.
pub struct TemplateEngine {
    config: Arc<EngineConfig>,
    store: Arc<TemplateStore>,
    compiler: TemplateCompiler,
    hooks: Arc<ContextHookRegistry>,
    /// Environment names the loader has pulled in since the last refresh.
    loaded_includes: Arc<DashSet<String>>,
}

impl TemplateEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_hooks(config, ContextHookRegistry::new())
    }

    pub fn with_hooks(config: EngineConfig, hooks: ContextHookRegistry) -> Self {
        let config = Arc::new(config);
        let store = Arc::new(TemplateStore::new(Arc::clone(&config)));
        let loaded_includes = Arc::new(DashSet::new());
        let env = build_environment(Arc::clone(&store), Arc::clone(&loaded_includes));
        let compiler = TemplateCompiler::new(env, config.dev_mode);
        log::debug!(
            "Template engine ready (dev_mode: {}, bundle: {})",
            config.dev_mode,
            config.default_bundle_dir.display()
        );
        Self {
            config,
            store,
            compiler,
            hooks: Arc::new(hooks),
            loaded_includes,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &TemplateStore {
        &self.store
    }

    pub fn compiler(&self) -> &TemplateCompiler {
        &self.compiler
    }

    pub fn hooks(&self) -> &ContextHookRegistry {
        &self.hooks
    }

    pub fn stats(&self) -> CacheStats {
        self.compiler.stats()
    }

    /// Clear both the template store cache and the compiled-template cache.
    pub fn clear_cache(&self) {
        self.store.clear_cache();
        self.compiler.clear_cache();
        self.loaded_includes.clear();
    }

    /// Build the root scope for `ctx`. Reuse it across the entries of one
    /// assembly pass.
    pub fn scope(&self, ctx: &RenderContext) -> Value {
        let binding = Binding::new(Arc::new(ctx.clone()), Arc::clone(&self.hooks));
        Value::from_object(RootScope::new(binding))
    }

    /// Resolve and render a named template for the context's persona.
    pub fn render_named(&self, name: &str, ctx: &RenderContext) -> String {
        self.render_named_outcome(name, ctx).into_text()
    }

    pub fn render_named_outcome(&self, name: &str, ctx: &RenderContext) -> RenderOutcome {
        let persona = ctx.persona_namespace();
        let template = match self.store.resolve(name, persona) {
            Ok(template) => template,
            Err(err) if err.is_not_found() => return RenderOutcome::Rendered(String::new()),
            Err(err) => return self.failed(name, err),
        };
        if template.is_empty() {
            return RenderOutcome::Rendered(String::new());
        }
        let key = CacheKey::named(name, persona);
        match self.try_render(&key, &template.text, &self.scope(ctx)) {
            Ok(text) => RenderOutcome::Rendered(text),
            Err(err) => self.failed(name, err),
        }
    }

    /// Render an inline template body (e.g. a preset entry).
    pub fn render_text(&self, label: &str, body: &str, ctx: &RenderContext) -> String {
        self.render_inline(label, body, ctx.persona_namespace(), &self.scope(ctx))
            .into_text()
    }

    /// Render an inline body against a prebuilt scope.
    ///
    /// `label` names the body in markers and logs; the cache key is derived
    /// from the body's content hash.
    pub fn render_inline(&self, label: &str, body: &str, persona: Option<&str>, scope: &Value) -> RenderOutcome {
        if body.trim().is_empty() {
            return RenderOutcome::Rendered(String::new());
        }
        let key = CacheKey::inline(body, persona);
        match self.try_render(&key, body, scope) {
            Ok(text) => RenderOutcome::Rendered(text),
            Err(err) => self.failed(label, err),
        }
    }

    fn try_render(&self, key: &CacheKey, raw: &str, scope: &Value) -> Result<String, TemplateError> {
        if self.config.dev_mode {
            self.refresh_includes();
        }
        let compiled = self.compiler.get_or_compile(key, raw)?;
        panic::catch_unwind(AssertUnwindSafe(|| self.compiler.render(&compiled, scope.clone())))
            .unwrap_or_else(|payload| {
                Err(TemplateError::Render {
                    name: key.name.clone(),
                    message: format!("hook panicked: {}", panic_message(payload.as_ref())),
                })
            })
    }

    /// Forget loader-cached includes so edited include files are re-read.
    fn refresh_includes(&self) {
        let names: Vec<String> = self.loaded_includes.iter().map(|n| n.key().clone()).collect();
        if names.is_empty() {
            return;
        }
        for name in &names {
            self.loaded_includes.remove(name);
        }
        let discarded = self.compiler.discard_loaded(&names);
        log::debug!("Dropped {} cached include(s) for reload", discarded);
    }

    fn failed(&self, name: &str, error: TemplateError) -> RenderOutcome {
        log::error!("Template '{}' failed to render: {}", name, error);
        let marker = if self.config.dev_mode {
            format!("[Template error in '{}': {}]", name, error.diagnostics().join(" | "))
        } else {
            format!("[Prompt entry '{}' failed to render]", name)
        };
        RenderOutcome::Failed { marker, error }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Environment with lenient chaining, no escaping, persona-scoped includes.
fn build_environment(store: Arc<TemplateStore>, loaded: Arc<DashSet<String>>) -> Environment<'static> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Chainable);
    env.set_auto_escape_callback(|_| AutoEscape::None);
    env.set_path_join_callback(join_include_path);
    env.set_loader(move |env_name| {
        loaded.insert(env_name.to_string());
        Ok(Some(load_include(&store, env_name)))
    });
    functions::register(&mut env);
    env
}

/// `{% include "X" %}` inside `<ns>/Y` loads `<ns>/X`.
fn join_include_path<'s>(name: &'s str, parent: &'s str) -> Cow<'s, str> {
    if name.contains('/') {
        return Cow::Borrowed(name);
    }
    let namespace = parent
        .split_once('/')
        .map(|(ns, _)| ns)
        .unwrap_or(GLOBAL_NAMESPACE);
    Cow::Owned(format!("{}/{}", namespace, name))
}

fn load_include(store: &TemplateStore, env_name: &str) -> String {
    let (persona, name) = split_env_name(env_name);
    match store.resolve(name, persona.as_deref()) {
        Ok(template) => template.text.clone(),
        Err(err) if err.is_not_found() => String::new(),
        Err(err) => {
            log::error!("Include '{}' could not be loaded: {}", name, err);
            String::new()
        }
    }
}
