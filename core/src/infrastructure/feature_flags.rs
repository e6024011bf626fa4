// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Process-wide feature flag registry (C13, spec §4.13). Reads are
//! lock-free after construction via an `Arc<HashMap>` snapshot; writes
//! rebuild that snapshot under a short exclusive lock (the "double-checked"
//! pattern called for by the spec).

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::domain::flags::{FeatureFlag, FlagKey, FlagSource};

pub struct FeatureFlags {
    snapshot: RwLock<Arc<HashMap<FlagKeyInner, FeatureFlag>>>,
}

type FlagKeyInner = (String, String);

fn truthy(raw: &str) -> bool {
    matches!(raw.to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

impl FeatureFlags {
    /// Builds the registry from a declarative default table, applying
    /// `FLAG_<CATEGORY>_<NAME>` env overrides once at construction.
    pub fn from_defaults(defaults: BTreeMap<String, bool>) -> Self {
        let mut map = HashMap::new();
        for (qualified_name, default_value) in defaults {
            let (category, name) = qualified_name.split_once('.').unwrap_or(("core", &qualified_name));
            let key = FlagKey::new(category, name);
            let (value, source) = match std::env::var(key.env_override_key()) {
                Ok(raw) => (truthy(&raw), FlagSource::Env),
                Err(_) => (default_value, FlagSource::Default),
            };
            map.insert(
                (key.category.clone(), key.name.clone()),
                FeatureFlag { key, default_value, value, source },
            );
        }
        Self { snapshot: RwLock::new(Arc::new(map)) }
    }

    pub fn get(&self, category: &str, name: &str) -> Option<bool> {
        self.snapshot.read().get(&(category.to_string(), name.to_string())).map(|f| f.value)
    }

    pub fn list(&self) -> Vec<FeatureFlag> {
        self.snapshot.read().values().cloned().collect()
    }

    /// Runtime override via the Control API (spec §6.1 `POST /flags/{name}`).
    /// Double-checked: hold the write lock, clone-and-mutate a fresh map,
    /// then publish the new `Arc` — readers never observe a half-written
    /// table.
    pub fn set_runtime(&self, category: &str, name: &str, value: bool) -> bool {
        let mut guard = self.snapshot.write();
        let key = (category.to_string(), name.to_string());
        if !guard.contains_key(&key) {
            return false;
        }
        let mut next = HashMap::clone(&guard);
        if let Some(flag) = next.get_mut(&key) {
            flag.value = value;
            flag.source = FlagSource::Runtime;
        }
        *guard = Arc::new(next);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> BTreeMap<String, bool> {
        let mut map = BTreeMap::new();
        map.insert("core.supervisor".into(), true);
        map.insert("tool.advisor".into(), true);
        map
    }

    #[test]
    fn reads_default_when_no_env_override() {
        let flags = FeatureFlags::from_defaults(defaults());
        assert_eq!(flags.get("core", "supervisor"), Some(true));
    }

    #[test]
    fn runtime_set_overrides_value_and_source() {
        let flags = FeatureFlags::from_defaults(defaults());
        assert!(flags.set_runtime("tool", "advisor", false));
        let flag = flags.list().into_iter().find(|f| f.key.name == "advisor").unwrap();
        assert!(!flag.value);
        assert_eq!(flag.source, FlagSource::Runtime);
    }

    #[test]
    fn set_runtime_on_unknown_flag_is_a_noop() {
        let flags = FeatureFlags::from_defaults(defaults());
        assert!(!flags.set_runtime("unknown", "flag", true));
    }
}
