//! Draw-command configuration model.
//!
//! A [`ConfigMap`] is the declarative half of a draw command: shader sources,
//! attribute and uniform bindings, invocation count, and a nested `context`
//! group of ambient values. Values are either plain data or [dynamic]
//! closures resolved once per invocation against `(context, args)`.
//!
//! [dynamic]: ConfigValue::dynamic

mod merge;

pub use merge::merge;

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Conventional configuration keys.
///
/// Only the [`GROUPS`] receive key-by-key deep merging; every other key is
/// replaced wholesale when a later fragment sets it again.
pub mod keys {
    pub const VERT: &str = "vert";
    pub const FRAG: &str = "frag";
    pub const UNIFORMS: &str = "uniforms";
    pub const ATTRIBUTES: &str = "attributes";
    pub const CONTEXT: &str = "context";
    pub const COUNT: &str = "count";
    pub const ELEMENTS: &str = "elements";
    pub const PRIMITIVE: &str = "primitive";

    /// Nested groups that merge recursively instead of replacing.
    pub const GROUPS: [&str; 3] = [UNIFORMS, ATTRIBUTES, CONTEXT];
}

/// Per-invocation value resolver. Receives `(context, args)`.
pub type DynamicFn = Rc<dyn Fn(&ConfigMap, &ConfigMap) -> ConfigValue>;

/// A single configuration value.
#[derive(Clone)]
pub enum ConfigValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<ConfigValue>),
    Map(ConfigMap),
    /// Resolved once per invocation against `(context, args)`.
    Dynamic(DynamicFn),
}

impl ConfigValue {
    /// Wraps a per-invocation resolver closure.
    pub fn dynamic<F>(f: F) -> Self
    where
        F: Fn(&ConfigMap, &ConfigMap) -> ConfigValue + 'static,
    {
        Self::Dynamic(Rc::new(f))
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Str(_) => ValueKind::Str,
            Self::Int(_) => ValueKind::Int,
            Self::Float(_) => ValueKind::Float,
            Self::Bool(_) => ValueKind::Bool,
            Self::List(_) => ValueKind::List,
            Self::Map(_) => ValueKind::Map,
            Self::Dynamic(_) => ValueKind::Dynamic,
        }
    }

    pub fn as_map(&self) -> Option<&ConfigMap> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Evaluates a dynamic value against `(context, args)`; plain values
    /// pass through unchanged. Nested maps and lists resolve recursively
    /// so a group of dynamic uniforms resolves in one call.
    pub fn resolve(&self, context: &ConfigMap, args: &ConfigMap) -> ConfigValue {
        match self {
            Self::Dynamic(f) => f(context, args),
            Self::Map(map) => ConfigValue::Map(map.resolve(context, args)),
            Self::List(items) => {
                ConfigValue::List(items.iter().map(|v| v.resolve(context, args)).collect())
            }
            other => other.clone(),
        }
    }
}

impl fmt::Debug for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::List(items) => f.debug_list().entries(items).finish(),
            Self::Map(map) => fmt::Debug::fmt(map, f),
            Self::Dynamic(_) => write!(f, "<dynamic>"),
        }
    }
}

impl PartialEq for ConfigValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            // Dynamics compare by closure identity.
            (Self::Dynamic(a), Self::Dynamic(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

impl From<String> for ConfigValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for ConfigValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<f64> for ConfigValue {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<bool> for ConfigValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<Vec<ConfigValue>> for ConfigValue {
    fn from(items: Vec<ConfigValue>) -> Self {
        Self::List(items)
    }
}

impl From<ConfigMap> for ConfigValue {
    fn from(map: ConfigMap) -> Self {
        Self::Map(map)
    }
}

/// Discriminant of a [`ConfigValue`], used in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Str,
    Int,
    Float,
    Bool,
    List,
    Map,
    Dynamic,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Str => "string",
            Self::Int => "integer",
            Self::Float => "float",
            Self::Bool => "boolean",
            Self::List => "list",
            Self::Map => "map",
            Self::Dynamic => "dynamic",
        };
        f.write_str(name)
    }
}

/// An ordered string-keyed configuration map.
///
/// Backed by a `BTreeMap` so iteration (and therefore logging and test
/// output) is deterministic. Cheap to clone for the sizes draw
/// configurations reach in practice.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigMap {
    entries: BTreeMap<String, ConfigValue>,
}

impl ConfigMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ConfigValue>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<ConfigValue> {
        self.entries.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Vertex shader source.
    pub fn vert(self, src: impl Into<String>) -> Self {
        self.with(keys::VERT, src.into())
    }

    /// Fragment shader source.
    pub fn frag(self, src: impl Into<String>) -> Self {
        self.with(keys::FRAG, src.into())
    }

    /// Vertex invocation count.
    pub fn count(self, n: i64) -> Self {
        self.with(keys::COUNT, n)
    }

    /// Inserts one binding into the `uniforms` group.
    pub fn uniform(self, name: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.group_entry(keys::UNIFORMS, name, value)
    }

    /// Inserts one binding into the `attributes` group.
    pub fn attribute(self, name: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.group_entry(keys::ATTRIBUTES, name, value)
    }

    /// Inserts one value into the `context` group.
    pub fn context_value(self, name: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.group_entry(keys::CONTEXT, name, value)
    }

    /// Returns a recognized nested group (`uniforms`, `attributes`,
    /// `context`) if present and map-valued.
    pub fn group(&self, key: &str) -> Option<&ConfigMap> {
        self.get(key).and_then(ConfigValue::as_map)
    }

    fn group_entry(
        mut self,
        group: &str,
        name: impl Into<String>,
        value: impl Into<ConfigValue>,
    ) -> Self {
        let entry = self
            .entries
            .entry(group.to_owned())
            .or_insert_with(|| ConfigValue::Map(ConfigMap::new()));
        if let ConfigValue::Map(map) = entry {
            map.insert(name, value);
        } else {
            // A scalar previously claimed the group key; the group wins.
            let mut map = ConfigMap::new();
            map.insert(name, value);
            *entry = ConfigValue::Map(map);
        }
        self
    }

    /// Resolves every dynamic value against `(context, args)`, returning a
    /// fully concrete map.
    pub fn resolve(&self, context: &ConfigMap, args: &ConfigMap) -> ConfigMap {
        let mut out = ConfigMap::new();
        for (key, value) in self.iter() {
            out.insert(key, value.resolve(context, args));
        }
        out
    }
}

impl FromIterator<(String, ConfigValue)> for ConfigMap {
    fn from_iter<I: IntoIterator<Item = (String, ConfigValue)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── builders ─────────────────────────────────────────────────────────

    #[test]
    fn builder_helpers_populate_groups() {
        let cfg = ConfigMap::new()
            .vert("void main() {}")
            .uniform(
                "color",
                vec![
                    ConfigValue::Float(0.1),
                    ConfigValue::Float(0.2),
                    ConfigValue::Float(0.3),
                ],
            )
            .uniform("scale", 2.0)
            .count(3);

        assert_eq!(cfg.get(keys::VERT).unwrap().as_str(), Some("void main() {}"));
        assert_eq!(cfg.get(keys::COUNT).unwrap().as_int(), Some(3));

        let uniforms = cfg.group(keys::UNIFORMS).unwrap();
        assert_eq!(uniforms.len(), 2);
        assert!(uniforms.contains_key("color"));
    }

    #[test]
    fn group_entry_replaces_scalar_squatter() {
        let cfg = ConfigMap::new()
            .with(keys::UNIFORMS, 7)
            .uniform("color", true);
        assert!(cfg.group(keys::UNIFORMS).unwrap().contains_key("color"));
    }

    // ── dynamic resolution ───────────────────────────────────────────────

    #[test]
    fn resolve_evaluates_dynamics_against_args() {
        let cfg = ConfigMap::new().uniform(
            "tick",
            ConfigValue::dynamic(|_ctx, args| {
                args.get("frame").cloned().unwrap_or(ConfigValue::Int(0))
            }),
        );

        let args = ConfigMap::new().with("frame", 41);
        let resolved = cfg.resolve(&ConfigMap::new(), &args);
        let uniforms = resolved.group(keys::UNIFORMS).unwrap();
        assert_eq!(uniforms.get("tick").unwrap().as_int(), Some(41));
    }

    #[test]
    fn resolve_reads_context() {
        let cfg = ConfigMap::new().with(
            "aspect",
            ConfigValue::dynamic(|ctx, _args| {
                let w = ctx.get("viewportWidth").and_then(ConfigValue::as_int).unwrap_or(1);
                let h = ctx.get("viewportHeight").and_then(ConfigValue::as_int).unwrap_or(1);
                ConfigValue::Float(w as f64 / h as f64)
            }),
        );

        let ctx = ConfigMap::new().with("viewportWidth", 200).with("viewportHeight", 100);
        let resolved = cfg.resolve(&ctx, &ConfigMap::new());
        assert_eq!(resolved.get("aspect"), Some(&ConfigValue::Float(2.0)));
    }

    #[test]
    fn resolve_recurses_into_lists() {
        let cfg = ConfigMap::new().uniform(
            "color",
            vec![
                ConfigValue::Float(0.5),
                ConfigValue::dynamic(|_ctx, args| {
                    args.get("green").cloned().unwrap_or(ConfigValue::Float(0.0))
                }),
                ConfigValue::Float(0.25),
            ],
        );

        let args = ConfigMap::new().with("green", ConfigValue::Float(0.75));
        let resolved = cfg.resolve(&ConfigMap::new(), &args);
        let uniforms = resolved.group(keys::UNIFORMS).unwrap();
        assert_eq!(
            uniforms.get("color"),
            Some(&ConfigValue::List(vec![
                ConfigValue::Float(0.5),
                ConfigValue::Float(0.75),
                ConfigValue::Float(0.25),
            ]))
        );
    }

    // ── equality ─────────────────────────────────────────────────────────

    #[test]
    fn dynamics_compare_by_identity() {
        let f = ConfigValue::dynamic(|_, _| ConfigValue::Int(1));
        let g = ConfigValue::dynamic(|_, _| ConfigValue::Int(1));
        assert_eq!(f, f.clone());
        assert_ne!(f, g);
    }
}
