//! Context hook registry.
//!
//! Hooks let collaborators (persona packages, host integrations) supply
//! template values computed from live state at render time:
//!
//! - **variable hooks** answer bare references (`{{ weather_report }}`) and
//!   take precedence over every built-in binding;
//! - **member hooks** answer `object.member` for one bound object type;
//! - **category hooks** post-process a computed member value.
//!
//! A hook returning `None` declines, and lookup continues down the chain.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use minijinja::Value;
use parking_lot::RwLock;

use super::fold_key;
use crate::context::RenderContext;

/// Computes a value from the render context.
pub type ValueHook = Arc<dyn Fn(&RenderContext) -> Option<Value> + Send + Sync>;

/// Rewrites a computed member value.
pub type CategoryHook = Arc<dyn Fn(&RenderContext, Value) -> Value + Send + Sync>;

#[derive(Default)]
struct HookTables {
    variables: HashMap<String, ValueHook>,
    /// folded name → registered name
    folded_variables: HashMap<String, String>,
    /// (type, folded member)
    members: HashMap<(String, String), ValueHook>,
    /// (type, folded category)
    categories: HashMap<(String, String), Vec<CategoryHook>>,
}

/// Registry of render-time hooks.
///
/// Registration takes `&self`, so hooks can be added after the owning
/// engine is shared.
#[derive(Default)]
pub struct ContextHookRegistry {
    tables: RwLock<HookTables>,
}

impl fmt::Debug for ContextHookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tables = self.tables.read();
        f.debug_struct("ContextHookRegistry")
            .field("variables", &tables.variables.len())
            .field("members", &tables.members.len())
            .field("categories", &tables.categories.len())
            .finish()
    }
}

impl ContextHookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a variable hook.
    pub fn register_variable<F>(&self, name: impl Into<String>, hook: F)
    where
        F: Fn(&RenderContext) -> Option<Value> + Send + Sync + 'static,
    {
        let name = name.into();
        let mut tables = self.tables.write();
        tables.folded_variables.insert(fold_key(&name), name.clone());
        tables.variables.insert(name, Arc::new(hook));
    }

    /// Register a hook for `type_name.member`, e.g. `("persona", "mood_text")`.
    pub fn register_member<F>(&self, type_name: &str, member: &str, hook: F)
    where
        F: Fn(&RenderContext) -> Option<Value> + Send + Sync + 'static,
    {
        self.tables
            .write()
            .members
            .insert((type_name.to_string(), fold_key(member)), Arc::new(hook));
    }

    /// Register a post-processor for a computed member category.
    /// Multiple hooks on one category run in registration order.
    pub fn register_category<F>(&self, type_name: &str, category: &str, hook: F)
    where
        F: Fn(&RenderContext, Value) -> Value + Send + Sync + 'static,
    {
        self.tables
            .write()
            .categories
            .entry((type_name.to_string(), fold_key(category)))
            .or_default()
            .push(Arc::new(hook));
    }

    pub fn unregister_variable(&self, name: &str) -> bool {
        let mut tables = self.tables.write();
        let removed = tables.variables.remove(name).is_some();
        if removed {
            tables.folded_variables.remove(&fold_key(name));
        }
        removed
    }

    pub fn clear(&self) {
        *self.tables.write() = HookTables::default();
    }

    pub fn variable_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().variables.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        let tables = self.tables.read();
        tables.variables.is_empty() && tables.members.is_empty() && tables.categories.is_empty()
    }

    // Hooks are cloned out and run without the lock held, so a hook may
    // itself register hooks.

    pub(crate) fn variable_exact(&self, name: &str, ctx: &RenderContext) -> Option<Value> {
        let hook = self.tables.read().variables.get(name).cloned()?;
        hook(ctx)
    }

    pub(crate) fn variable_folded(&self, name: &str, ctx: &RenderContext) -> Option<Value> {
        let hook = {
            let tables = self.tables.read();
            let registered = tables.folded_variables.get(&fold_key(name))?;
            tables.variables.get(registered).cloned()?
        };
        hook(ctx)
    }

    pub(crate) fn member(&self, type_name: &str, member: &str, ctx: &RenderContext) -> Option<Value> {
        let hook = self
            .tables
            .read()
            .members
            .get(&(type_name.to_string(), fold_key(member)))
            .cloned()?;
        hook(ctx)
    }

    pub(crate) fn apply_category(&self, type_name: &str, category: &str, ctx: &RenderContext, value: Value) -> Value {
        let hooks = match self
            .tables
            .read()
            .categories
            .get(&(type_name.to_string(), fold_key(category)))
        {
            Some(hooks) => hooks.clone(),
            None => return value,
        };
        hooks.iter().fold(value, |value, hook| hook(ctx, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variable_exact_and_folded() {
        let registry = ContextHookRegistry::new();
        registry.register_variable("WeatherReport", |_| Some(Value::from("Stormy")));
        let ctx = RenderContext::new();

        assert_eq!(registry.variable_exact("WeatherReport", &ctx), Some(Value::from("Stormy")));
        assert_eq!(registry.variable_exact("weather_report", &ctx), None);
        assert_eq!(registry.variable_folded("weather_report", &ctx), Some(Value::from("Stormy")));
    }

    #[test]
    fn test_declining_hook() {
        let registry = ContextHookRegistry::new();
        registry.register_variable("maybe", |ctx| ctx.prompt.as_deref().map(Value::from));
        assert_eq!(registry.variable_exact("maybe", &RenderContext::new()), None);
        assert_eq!(
            registry.variable_exact("maybe", &RenderContext::new().with_prompt("hi")),
            Some(Value::from("hi"))
        );
    }

    #[test]
    fn test_member_and_category() {
        let registry = ContextHookRegistry::new();
        registry.register_member("persona", "Nickname", |_| Some(Value::from("Cass")));
        registry.register_category("agent", "affinity_tier", |_, v| Value::from(format!("<{}>", v)));
        registry.register_category("agent", "affinity_tier", |_, v| Value::from(format!("{}!", v)));
        let ctx = RenderContext::new();

        assert_eq!(registry.member("persona", "nickname", &ctx), Some(Value::from("Cass")));
        assert_eq!(registry.member("agent", "nickname", &ctx), None);
        assert_eq!(
            registry.apply_category("agent", "AffinityTier", &ctx, Value::from("Friend")),
            Value::from("<Friend>!")
        );
    }

    #[test]
    fn test_hook_may_register_hooks() {
        let registry = Arc::new(ContextHookRegistry::new());
        let inner = Arc::clone(&registry);
        registry.register_variable("outer", move |_| {
            inner.register_variable("late", |_| Some(Value::from(1)));
            Some(Value::from("ok"))
        });
        assert_eq!(registry.variable_exact("outer", &RenderContext::new()), Some(Value::from("ok")));
        assert_eq!(registry.variable_names(), vec!["late", "outer"]);
    }

    #[test]
    fn test_unregister_and_clear() {
        let registry = ContextHookRegistry::new();
        registry.register_variable("a", |_| None);
        assert!(registry.unregister_variable("a"));
        assert!(!registry.unregister_variable("a"));
        registry.register_member("env", "x", |_| None);
        registry.clear();
        assert!(registry.is_empty());
    }
}
