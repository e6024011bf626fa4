// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Feature flag value types (C13, spec §3, §4.13).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagSource {
    Default,
    Env,
    Runtime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagKey {
    pub category: String,
    pub name: String,
}

impl FlagKey {
    pub fn new(category: impl Into<String>, name: impl Into<String>) -> Self {
        Self { category: category.into(), name: name.into() }
    }

    /// `FLAG_<CATEGORY>_<NAME>` (spec §6.3), uppercased.
    pub fn env_override_key(&self) -> String {
        format!(
            "FLAG_{}_{}",
            self.category.to_uppercase().replace('.', "_"),
            self.name.to_uppercase().replace('.', "_")
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlag {
    pub key: FlagKey,
    pub default_value: bool,
    pub value: bool,
    pub source: FlagSource,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_override_key_matches_spec_shape() {
        let key = FlagKey::new("core", "supervisor");
        assert_eq!(key.env_override_key(), "FLAG_CORE_SUPERVISOR");
    }
}
