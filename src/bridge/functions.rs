//! Template functions and filters.
//!
//! Functions read the bound `environment` through the active scope, so
//! context hooks and member hooks apply to them as well:
//!
//! ```text
//! Weather: {{ get_weather() }}
//! {% if is_under_attack() %}Raid in progress!{% endif %}
//! Mercy: {{ persona.mercy_level | percent }}
//! Affinity: {{ agent.affinity | fixed }}
//! ```

use minijinja::{Environment, State, Value};

use crate::context::format::{format_fixed, format_percent};

/// Register every function and filter on `env`.
pub fn register(env: &mut Environment<'static>) {
    env.add_function("get_weather", get_weather);
    env.add_function("get_season", get_season);
    env.add_function("get_colonist_count", get_colonist_count);
    env.add_function("is_under_attack", is_under_attack);
    env.add_filter("percent", percent);
    env.add_filter("fixed", fixed);
}

fn environment_attr(state: &State, name: &str) -> Value {
    state
        .lookup("environment")
        .and_then(|env| env.get_attr(name).ok())
        .unwrap_or(Value::UNDEFINED)
}

fn get_weather(state: &State) -> Value {
    environment_attr(state, "weather")
}

fn get_season(state: &State) -> Value {
    environment_attr(state, "season")
}

fn get_colonist_count(state: &State) -> Value {
    let count = environment_attr(state, "colonist_count");
    if count.is_undefined() {
        Value::from(0)
    } else {
        count
    }
}

/// Meant for `{% if %}`; printed directly it renders as `True` / `False`.
fn is_under_attack(state: &State) -> bool {
    environment_attr(state, "is_under_attack").is_true()
}

fn as_number(value: &Value) -> Option<f64> {
    f64::try_from(value.clone()).ok()
}

/// `{{ 0.125 | percent }}` → `12.5%`. Non-numbers render empty.
fn percent(value: Value) -> String {
    as_number(&value).map(format_percent).unwrap_or_default()
}

/// `{{ 42.5 | fixed }}` → `43`, `{{ x | fixed(2) }}`. Non-numbers render empty.
fn fixed(value: Value, digits: Option<usize>) -> String {
    as_number(&value)
        .map(|n| format_fixed(n, digits.unwrap_or(0)))
        .unwrap_or_default()
}
