// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! The in-memory configuration tree (spec §6.2). Parsing YAML/JSON into
//! this shape is explicitly out of scope for the library; callers hand in
//! an already-deserialized `GatewayConfig` (or, for tests and the CLI's
//! `config validate`, a `serde_json::Value` via `GatewayConfig::from_value`).

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::service::{HealthProbe, Priority, ServiceEndpoint};
use super::tool::VirtualServerMember;

fn default_enabled() -> bool {
    true
}

fn default_idle_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_wake_budget_ms() -> u64 {
    200
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    pub name: String,
    pub image: String,
    pub endpoint: ServiceEndpoint,
    pub priority: Priority,
    pub health_probe: HealthProbe,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub auto_start: bool,
    #[serde(default = "default_idle_timeout", with = "humantime_serde")]
    pub idle_timeout: Duration,
    #[serde(default = "default_wake_budget_ms")]
    pub wake_budget_ms: u64,
    pub mem_limit: u64,
    #[serde(default)]
    pub mem_reservation: u64,
    pub cpu_limit: f64,
    #[serde(default)]
    pub cpu_reservation: f64,
    #[serde(default = "default_pid_limit")]
    pub pid_limit: u32,
}

fn default_pid_limit() -> u32 {
    256
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServerConfigEntry {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub members: Vec<VirtualServerMember>,
}

fn default_advisor_weight() -> f64 {
    0.7
}
fn default_min_confidence() -> f64 {
    0.3
}
fn default_advisor_timeout_ms() -> u64 {
    5000
}
fn default_top_n() -> usize {
    3
}
fn default_top_n_adv() -> usize {
    20
}
fn default_wake_budget_multiplier() -> u32 {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterPolicyConfig {
    #[serde(default = "default_advisor_weight")]
    pub advisor_weight: f64,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    #[serde(default = "default_advisor_timeout_ms")]
    pub advisor_timeout_ms: u64,
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    #[serde(default = "default_top_n_adv")]
    pub top_n_adv: usize,
    #[serde(default = "default_wake_budget_multiplier")]
    pub wake_budget_multiplier: u32,
}

impl Default for RouterPolicyConfig {
    fn default() -> Self {
        Self {
            advisor_weight: default_advisor_weight(),
            min_confidence: default_min_confidence(),
            advisor_timeout_ms: default_advisor_timeout_ms(),
            top_n: default_top_n(),
            top_n_adv: default_top_n_adv(),
            wake_budget_multiplier: default_wake_budget_multiplier(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FlagsConfig {
    /// Recognized keys and their boolean defaults; unknown keys at load
    /// time are a hard validation error (spec §6.2).
    pub defaults: BTreeMap<String, bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    pub services: Vec<ServiceConfig>,
    pub virtual_servers: Vec<VirtualServerConfigEntry>,
    #[serde(default)]
    pub router: RouterPolicyConfig,
    #[serde(default)]
    pub flags: FlagsConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config validation failed: {0:?}")]
    Invalid(Vec<String>),
    #[error("malformed config document: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl GatewayConfig {
    /// Deserializes an already-parsed document. The document's format
    /// (YAML, JSON, ...) is the caller's concern, not this crate's (spec
    /// §1 Non-goals).
    pub fn from_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        let config: GatewayConfig = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    /// Validation failures are reported as a full list, not first-only
    /// (spec §4.14).
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();
        let mut seen_services = std::collections::HashSet::new();
        for svc in &self.services {
            if !seen_services.insert(svc.name.clone()) {
                problems.push(format!("duplicate service name: {}", svc.name));
            }
            if svc.mem_reservation > svc.mem_limit {
                problems.push(format!(
                    "service {}: memReservation {} exceeds memLimit {}",
                    svc.name, svc.mem_reservation, svc.mem_limit
                ));
            }
            if svc.cpu_reservation > svc.cpu_limit {
                problems.push(format!(
                    "service {}: cpuReservation {} exceeds cpuLimit {}",
                    svc.name, svc.cpu_reservation, svc.cpu_limit
                ));
            }
        }
        let mut seen_vs = std::collections::HashSet::new();
        for vs in &self.virtual_servers {
            if !seen_vs.insert(vs.name.clone()) {
                problems.push(format!("duplicate virtual server name: {}", vs.name));
            }
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal_doc() -> serde_json::Value {
        json!({
            "services": [{
                "name": "fs",
                "image": "fs:latest",
                "endpoint": { "scheme": "http", "host": "localhost", "port": 9001, "path": "" },
                "priority": "normal",
                "healthProbe": { "kind": "http", "target": "/healthz", "intervalMs": 5000, "timeoutMs": 1000, "retries": 3, "startGraceMs": 2000 },
                "memLimit": 512,
                "cpuLimit": 1.0
            }],
            "virtualServers": [{ "name": "default", "members": [] }]
        })
    }

    #[test]
    fn loads_minimal_document_with_defaults() {
        let config = GatewayConfig::from_value(minimal_doc()).unwrap();
        assert_eq!(config.services.len(), 1);
        assert!(config.services[0].enabled);
        assert_eq!(config.router.advisor_weight, 0.7);
    }

    #[test]
    fn rejects_duplicate_service_names() {
        let mut doc = minimal_doc();
        let services = doc.get_mut("services").unwrap().as_array_mut().unwrap();
        services.push(services[0].clone());
        let err = GatewayConfig::from_value(doc).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
