//! Render context bridge.
//!
//! Exposes a [`RenderContext`] to templates without runtime reflection. Each
//! bound record type implements [`FieldResolver`] by registering a static
//! [`FieldTable`] of named getters; member lookups then run through:
//!
//! 1. member hooks registered for the type,
//! 2. the exact field table entry,
//! 3. alias normalisation (`colonists` → `colonist_count`),
//! 4. computed category values (tiers, percentages), post-processed by
//!    category hooks,
//! 5. a case- and underscore-insensitive field table match.
//!
//! Anything left over resolves to undefined and renders empty.

pub mod functions;
pub mod hooks;
pub mod resolvers;
pub mod scope;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use minijinja::value::{Enumerator, Object};
use minijinja::Value;
use serde_json::Value as JsonValue;

use crate::context::format::format_percent;
use crate::context::RenderContext;
use hooks::ContextHookRegistry;

pub use scope::RootScope;

/// Normalised lookup key: lowercase, `_` and `-` removed.
pub fn fold_key(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

// ============================================================================
// Field tables
// ============================================================================

/// Getter for one named field of `T`.
pub type Getter<T> = fn(&T, &Binding) -> Value;

/// Named-field table registered once per resolvable type.
pub struct FieldTable<T: 'static> {
    fields: Vec<(&'static str, Getter<T>)>,
    exact: HashMap<&'static str, usize>,
    folded: HashMap<String, usize>,
}

impl<T: 'static> FieldTable<T> {
    pub fn builder() -> FieldTableBuilder<T> {
        FieldTableBuilder { fields: Vec::new() }
    }

    pub fn get_exact(&self, name: &str) -> Option<Getter<T>> {
        self.exact.get(name).map(|&i| self.fields[i].1)
    }

    /// Case- and underscore-insensitive lookup.
    pub fn get_folded(&self, name: &str) -> Option<Getter<T>> {
        self.folded.get(&fold_key(name)).map(|&i| self.fields[i].1)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|(name, _)| *name)
    }
}

pub struct FieldTableBuilder<T: 'static> {
    fields: Vec<(&'static str, Getter<T>)>,
}

impl<T: 'static> FieldTableBuilder<T> {
    pub fn field(mut self, name: &'static str, getter: Getter<T>) -> Self {
        self.fields.push((name, getter));
        self
    }

    pub fn build(self) -> FieldTable<T> {
        let mut exact = HashMap::with_capacity(self.fields.len());
        let mut folded = HashMap::with_capacity(self.fields.len());
        for (i, (name, _)) in self.fields.iter().enumerate() {
            exact.insert(*name, i);
            folded.entry(fold_key(name)).or_insert(i);
        }
        FieldTable {
            fields: self.fields,
            exact,
            folded,
        }
    }
}

// ============================================================================
// Resolver trait
// ============================================================================

/// Member resolution for one bound record type.
pub trait FieldResolver: fmt::Debug + Send + Sync + Sized + 'static {
    /// Type label used to key member and category hooks.
    const TYPE_NAME: &'static str;

    fn field_table() -> &'static FieldTable<Self>;

    /// Canonical field name for a near-synonym, given a folded member name.
    fn normalize_member(_folded: &str) -> Option<&'static str> {
        None
    }

    /// Computed value for a folded category name.
    fn computed(&self, _category: &str, _binding: &Binding) -> Option<Value> {
        None
    }

    fn try_resolve(&self, member: &str, binding: &Binding) -> Option<Value> {
        let hooks = binding.hooks();
        let ctx = binding.context();
        if let Some(value) = hooks.member(Self::TYPE_NAME, member, ctx) {
            return Some(value);
        }

        let table = Self::field_table();
        if let Some(getter) = table.get_exact(member) {
            return Some(getter(self, binding));
        }

        let folded = fold_key(member);
        let canonical = Self::normalize_member(&folded);
        if let Some(canonical) = canonical {
            if let Some(value) = hooks.member(Self::TYPE_NAME, canonical, ctx) {
                return Some(value);
            }
            if let Some(getter) = table.get_exact(canonical) {
                return Some(getter(self, binding));
            }
        }

        let category = canonical.map(fold_key).unwrap_or(folded);
        if let Some(raw) = self.computed(&category, binding) {
            return Some(hooks.apply_category(Self::TYPE_NAME, &category, ctx, raw));
        }

        table.get_folded(&category).map(|getter| getter(self, binding))
    }
}

/// `<field>_percent` for any numeric field of the table.
pub fn percent_of<T: FieldResolver>(record: &T, category: &str, binding: &Binding) -> Option<Value> {
    let field = category.strip_suffix("percent")?;
    let getter = T::field_table().get_folded(field)?;
    let ratio = f64::try_from(getter(record, binding)).ok()?;
    Some(Value::from(format_percent(ratio)))
}

// ============================================================================
// Binding and bound objects
// ============================================================================

/// What every bound object needs during a render: the context and the hooks.
#[derive(Clone)]
pub struct Binding {
    ctx: Arc<RenderContext>,
    hooks: Arc<ContextHookRegistry>,
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("persona", &self.ctx.persona.def_name)
            .finish_non_exhaustive()
    }
}

impl Binding {
    pub fn new(ctx: Arc<RenderContext>, hooks: Arc<ContextHookRegistry>) -> Self {
        Self { ctx, hooks }
    }

    pub fn context(&self) -> &RenderContext {
        &self.ctx
    }

    pub fn hooks(&self) -> &ContextHookRegistry {
        &self.hooks
    }

    /// Wrap a record as a template object.
    pub fn bind<T: FieldResolver>(&self, record: T) -> Value {
        Value::from_object(Bound {
            record,
            binding: self.clone(),
        })
    }
}

/// A record exposed to templates through its [`FieldResolver`].
#[derive(Debug)]
pub struct Bound<T> {
    record: T,
    binding: Binding,
}

impl<T: FieldResolver> Object for Bound<T> {
    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let member = key.as_str()?;
        self.record.try_resolve(member, &self.binding)
    }

    fn enumerate(self: &Arc<Self>) -> Enumerator {
        Enumerator::Values(T::field_table().names().map(Value::from).collect())
    }
}

/// String-keyed map with an exact index and a folded index.
#[derive(Debug, Default)]
pub struct LookupMap {
    values: BTreeMap<String, Value>,
    folded: HashMap<String, String>,
}

impl LookupMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert, keeping the first key registered for a folded form.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        self.folded.entry(fold_key(&key)).or_insert_with(|| key.clone());
        self.values.insert(key, value);
    }

    pub fn get_exact(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_folded(&self, key: &str) -> Option<&Value> {
        self.folded.get(&fold_key(key)).and_then(|k| self.values.get(k))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.get_exact(key).or_else(|| self.get_folded(key))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(String, Value)> for LookupMap {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}

impl Object for LookupMap {
    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        self.get(key.as_str()?).cloned()
    }

    fn enumerate(self: &Arc<Self>) -> Enumerator {
        Enumerator::Values(self.values.keys().map(|k| Value::from(k.as_str())).collect())
    }
}

// ============================================================================
// Value helpers
// ============================================================================

/// Empty strings and `None` are undefined, so `{% if x %}` and chaining work.
pub(crate) fn text(value: &str) -> Value {
    if value.is_empty() {
        Value::UNDEFINED
    } else {
        Value::from(value)
    }
}

pub(crate) fn opt_text(value: Option<&str>) -> Value {
    value.map(text).unwrap_or(Value::UNDEFINED)
}

pub(crate) fn list(values: &[String]) -> Value {
    Value::from(values.to_vec())
}

/// JSON values become plain template values; objects get folded lookup.
pub(crate) fn json(value: &JsonValue) -> Value {
    match value {
        JsonValue::Null => Value::UNDEFINED,
        JsonValue::Object(map) => Value::from_object(
            map.iter()
                .map(|(k, v)| (k.clone(), json(v)))
                .collect::<LookupMap>(),
        ),
        JsonValue::Array(items) => Value::from(items.iter().map(json).collect::<Vec<_>>()),
        other => Value::from_serialize(other),
    }
}

pub(crate) fn opt_json(value: Option<&JsonValue>) -> Value {
    value.map(json).unwrap_or(Value::UNDEFINED)
}
