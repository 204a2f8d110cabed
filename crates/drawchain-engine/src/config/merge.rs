//! Pure deep-merge over configuration maps.
//!
//! Override semantics, per key of the overlay:
//! - a recognized group key (`uniforms`, `attributes`, `context`) whose value
//!   is a map on both sides merges key-by-key, recursively for nested maps
//! - every other key replaces the base value wholesale (last write wins)
//!
//! Neither input is mutated; fragments stay reusable across compositions.

use super::{keys, ConfigMap, ConfigValue};

/// Merges `overlay` onto `base`, returning a new map.
pub fn merge(base: &ConfigMap, overlay: &ConfigMap) -> ConfigMap {
    let mut out = base.clone();
    for (key, value) in overlay.iter() {
        let merged = match (out.get(key), value) {
            (Some(ConfigValue::Map(b)), ConfigValue::Map(o)) if is_group(key) => {
                ConfigValue::Map(merge_nested(b, o))
            }
            _ => value.clone(),
        };
        out.insert(key, merged);
    }
    out
}

fn is_group(key: &str) -> bool {
    keys::GROUPS.contains(&key)
}

/// Inside a group, maps merge recursively at every depth.
fn merge_nested(base: &ConfigMap, overlay: &ConfigMap) -> ConfigMap {
    let mut out = base.clone();
    for (key, value) in overlay.iter() {
        let merged = match (out.get(key), value) {
            (Some(ConfigValue::Map(b)), ConfigValue::Map(o)) => {
                ConfigValue::Map(merge_nested(b, o))
            }
            _ => value.clone(),
        };
        out.insert(key, merged);
    }
    out
}
