//! Root template scope.
//!
//! Bare variable references resolve in this order:
//!
//! 1. context hooks, exact name;
//! 2. free-form variables, then built-ins, exact name;
//! 3. context hooks, case-insensitive;
//! 4. free-form variables, then built-ins, case-insensitive.
//!
//! Names that miss everywhere fall through to the environment's globals
//! (template functions) and finally to undefined.

use std::sync::Arc;

use minijinja::value::{Enumerator, Object};
use minijinja::Value;

use super::{json, text, Binding, LookupMap};

#[derive(Debug)]
pub struct RootScope {
    binding: Binding,
    variables: LookupMap,
    builtins: LookupMap,
}

impl RootScope {
    pub fn new(binding: Binding) -> Self {
        let ctx = binding.context();

        let variables: LookupMap = ctx
            .variables
            .iter()
            .map(|(name, value)| (name.clone(), json(value)))
            .collect();

        let mut builtins = LookupMap::new();
        let persona = binding.bind(ctx.persona.clone());
        builtins.insert("persona", persona.clone());
        builtins.insert("narrator", persona);
        builtins.insert("agent", binding.bind(ctx.agent.clone()));
        let environment = binding.bind(ctx.environment.clone());
        builtins.insert("environment", environment.clone());
        builtins.insert("env", environment);
        builtins.insert("meta", binding.bind(ctx.meta.clone()));
        if let Some(card) = &ctx.card {
            builtins.insert("card", binding.bind(card.clone()));
        }

        builtins.insert(
            "vars",
            Value::from_object(
                ctx.variables
                    .iter()
                    .map(|(name, value)| (name.clone(), json(value)))
                    .collect::<LookupMap>(),
            ),
        );
        builtins.insert(
            "snippets",
            Value::from_object(
                ctx.snippets
                    .iter()
                    .map(|(name, body)| (name.clone(), text(body)))
                    .collect::<LookupMap>(),
            ),
        );

        let mut chat = LookupMap::new();
        chat.insert("history", text(&ctx.chat_history_text()));
        builtins.insert("chat", Value::from_object(chat));
        builtins.insert("habits", Value::from(ctx.habits()));

        if let Some(prompt) = &ctx.prompt {
            builtins.insert("prompt", Value::from(prompt.as_str()));
        }

        let env = &ctx.environment;
        let shorthands = [
            ("hour", env.hour().map(Value::from)),
            ("day", env.day().map(Value::from)),
            ("quadrum", env.quadrum().map(Value::from)),
            ("year", env.year().map(Value::from)),
            ("season", env.season().map(Value::from)),
            ("time_of_day", env.time_of_day().map(Value::from)),
        ];
        for (name, value) in shorthands {
            if let Some(value) = value {
                builtins.insert(name, value);
            }
        }

        Self {
            binding,
            variables,
            builtins,
        }
    }

    /// Resolve a bare variable name.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        let hooks = self.binding.hooks();
        let ctx = self.binding.context();

        if let Some(value) = hooks.variable_exact(name, ctx) {
            return Some(value);
        }
        if let Some(value) = self
            .variables
            .get_exact(name)
            .or_else(|| self.builtins.get_exact(name))
        {
            return Some(value.clone());
        }
        if let Some(value) = hooks.variable_folded(name, ctx) {
            return Some(value);
        }
        self.variables
            .get_folded(name)
            .or_else(|| self.builtins.get_folded(name))
            .cloned()
    }
}

impl Object for RootScope {
    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        self.lookup(key.as_str()?)
    }

    fn enumerate(self: &Arc<Self>) -> Enumerator {
        Enumerator::NonEnumerable
    }
}
