// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Resolves declared services, virtual servers, feature flags, and router
//! policy from a per-environment tree (C14, spec §4.14). Validation
//! failures are fatal at startup and reported as a full list, never
//! first-only.

use crate::domain::config::{ConfigError, GatewayConfig};

#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Builds a `GatewayConfig` from an already-parsed document. Parsing
    /// YAML/JSON off disk is explicitly out of scope for this crate (spec
    /// §1); the CLI's `config validate` subcommand does that, then hands
    /// the resulting `serde_json::Value` here.
    pub fn from_value(document: serde_json::Value) -> Result<GatewayConfig, LoaderError> {
        Ok(GatewayConfig::from_value(document)?)
    }

    /// Applies `CONFIG_ENV`-style env overrides that are allowed to
    /// override scalar fields after the declared document is loaded (e.g.
    /// `ADVISOR_WEIGHT`, `WAKE_HEADROOM_PCT` — spec §6.3). Overrides are
    /// read once; a later explicit `reload` of the Registry re-applies
    /// them from the environment again.
    pub fn apply_env_overrides(mut config: GatewayConfig) -> GatewayConfig {
        if let Ok(raw) = std::env::var("ADVISOR_WEIGHT") {
            if let Ok(value) = raw.parse() {
                config.router.advisor_weight = value;
            }
        }
        if let Ok(raw) = std::env::var("ADVISOR_MIN_CONFIDENCE") {
            if let Ok(value) = raw.parse() {
                config.router.min_confidence = value;
            }
        }
        if let Ok(raw) = std::env::var("ADVISOR_TIMEOUT_MS") {
            if let Ok(value) = raw.parse() {
                config.router.advisor_timeout_ms = value;
            }
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn env_override_applies_to_advisor_weight() {
        let doc = json!({ "services": [], "virtualServers": [] });
        let config = ConfigLoader::from_value(doc).unwrap();
        std::env::set_var("ADVISOR_WEIGHT", "0.9");
        let config = ConfigLoader::apply_env_overrides(config);
        std::env::remove_var("ADVISOR_WEIGHT");
        assert_eq!(config.router.advisor_weight, 0.9);
    }
}
