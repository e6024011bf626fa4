// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! The declarative service catalogue (C2, spec §4.2). Owns canonical
//! `Service` records; lifecycle state fields are written only by the
//! Supervisor, never here — `reload` is the only mutation path for
//! declared fields.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;

use crate::domain::config::GatewayConfig;
use crate::domain::errors::GatewayError;
use crate::domain::service::{Phase, Service, ServiceEndpoint, ServiceName, ServicePolicy, ServiceResources};

/// Copy-on-read snapshot store, mirroring the teacher's
/// `Arc<RwLock<HashMap<_, _>>>` catalogue pattern. Readers never block
/// writers for longer than a clone of the map.
#[derive(Clone)]
pub struct ServiceRegistry {
    services: Arc<RwLock<BTreeMap<ServiceName, Service>>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self { services: Arc::new(RwLock::new(BTreeMap::new())) }
    }

    pub fn list(&self) -> Vec<Service> {
        self.services.read().values().cloned().collect()
    }

    pub fn get(&self, name: &ServiceName) -> Result<Service, GatewayError> {
        self.services
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("service {name}")))
    }

    /// Idempotent: enabling an already-enabled service returns `noop=true`.
    pub fn enable(&self, name: &ServiceName) -> Result<bool, GatewayError> {
        let mut guard = self.services.write();
        let service = guard
            .get_mut(name)
            .ok_or_else(|| GatewayError::NotFound(format!("service {name}")))?;
        let noop = service.policy.enabled;
        service.policy.enabled = true;
        Ok(noop)
    }

    pub fn disable(&self, name: &ServiceName) -> Result<bool, GatewayError> {
        let mut guard = self.services.write();
        let service = guard
            .get_mut(name)
            .ok_or_else(|| GatewayError::NotFound(format!("service {name}")))?;
        let noop = !service.policy.enabled;
        service.policy.enabled = false;
        Ok(noop)
    }

    /// Updates phase/activity/transition bookkeeping. Only the Supervisor
    /// calls this; the Registry itself never derives a phase.
    pub fn apply_phase(&self, name: &ServiceName, phase: Phase) -> Result<(), GatewayError> {
        let mut guard = self.services.write();
        let service = guard
            .get_mut(name)
            .ok_or_else(|| GatewayError::NotFound(format!("service {name}")))?;
        service.phase = phase;
        service.last_transition_at = Utc::now();
        Ok(())
    }

    pub fn record_activity(&self, name: &ServiceName) -> Result<(), GatewayError> {
        let mut guard = self.services.write();
        let service = guard
            .get_mut(name)
            .ok_or_else(|| GatewayError::NotFound(format!("service {name}")))?;
        service.record_activity(Utc::now());
        Ok(())
    }

    pub fn mark_failure(&self, name: &ServiceName) -> Result<u32, GatewayError> {
        let mut guard = self.services.write();
        let service = guard
            .get_mut(name)
            .ok_or_else(|| GatewayError::NotFound(format!("service {name}")))?;
        service.failure_streak += 1;
        Ok(service.failure_streak)
    }

    pub fn reset_failure_streak(&self, name: &ServiceName) -> Result<(), GatewayError> {
        let mut guard = self.services.write();
        if let Some(service) = guard.get_mut(name) {
            service.failure_streak = 0;
        }
        Ok(())
    }

    /// Atomic replace from config (spec §4.2). Services not present in the
    /// reload are removed; existing observable state for still-declared
    /// services is preserved (the Supervisor reconciles it separately).
    pub fn reload(&self, config: &GatewayConfig) -> Result<(), GatewayError> {
        config.validate().map_err(|e| GatewayError::ValidationFailed(format!("{e}")))?;
        let mut guard = self.services.write();
        let mut replacement = BTreeMap::new();
        for svc_cfg in &config.services {
            let name = ServiceName::new(svc_cfg.name.clone());
            let existing_phase = guard.get(&name).map(|s| s.phase);
            let endpoint = ServiceEndpoint {
                scheme: svc_cfg.endpoint.scheme.clone(),
                host: svc_cfg.endpoint.host.clone(),
                port: svc_cfg.endpoint.port,
                path: svc_cfg.endpoint.path.clone(),
            };
            let policy = ServicePolicy {
                priority: svc_cfg.priority,
                auto_start: svc_cfg.auto_start,
                idle_timeout: svc_cfg.idle_timeout,
                wake_budget_ms: svc_cfg.wake_budget_ms,
                enabled: svc_cfg.enabled,
            };
            let resources = ServiceResources {
                mem_limit: svc_cfg.mem_limit,
                mem_reservation: svc_cfg.mem_reservation,
                cpu_limit: svc_cfg.cpu_limit,
                cpu_reservation: svc_cfg.cpu_reservation,
                pid_limit: svc_cfg.pid_limit,
            };
            let mut service = Service::declare(
                name.clone(),
                svc_cfg.image.clone(),
                endpoint,
                policy,
                resources,
                svc_cfg.health_probe.clone(),
                Utc::now(),
            )
            .map_err(|e| GatewayError::ValidationFailed(e.to_string()))?;
            if let Some(phase) = existing_phase {
                service.phase = phase;
            }
            replacement.insert(name, service);
        }
        *guard = replacement;
        Ok(())
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::{RouterPolicyConfig, ServiceConfig, VirtualServerConfigEntry};
    use crate::domain::service::{HealthProbe, HealthProbeKind, Priority};

    fn config_with(name: &str, enabled: bool) -> GatewayConfig {
        GatewayConfig {
            services: vec![ServiceConfig {
                name: name.to_string(),
                image: format!("{name}:latest"),
                endpoint: ServiceEndpoint { scheme: "http".into(), host: "localhost".into(), port: 9000, path: "".into() },
                priority: Priority::Normal,
                health_probe: HealthProbe {
                    kind: HealthProbeKind::Http,
                    target: "/healthz".into(),
                    interval_ms: 5000,
                    timeout_ms: 1000,
                    retries: 3,
                    start_grace_ms: 2000,
                },
                enabled,
                auto_start: false,
                idle_timeout: std::time::Duration::from_secs(600),
                wake_budget_ms: 200,
                mem_limit: 512,
                mem_reservation: 128,
                cpu_limit: 1.0,
                cpu_reservation: 0.25,
                pid_limit: 64,
            }],
            virtual_servers: vec![VirtualServerConfigEntry { name: "default".into(), enabled: true, members: vec![] }],
            router: RouterPolicyConfig::default(),
            flags: Default::default(),
        }
    }

    #[test]
    fn enable_is_idempotent() {
        let registry = ServiceRegistry::new();
        registry.reload(&config_with("fs", false)).unwrap();
        let name = ServiceName::new("fs");
        let first = registry.enable(&name).unwrap();
        let second = registry.enable(&name).unwrap();
        assert!(!first);
        assert!(second);
    }

    #[test]
    fn reload_same_config_preserves_phase() {
        let registry = ServiceRegistry::new();
        let config = config_with("fs", true);
        registry.reload(&config).unwrap();
        registry.apply_phase(&ServiceName::new("fs"), Phase::Running).unwrap();
        registry.reload(&config).unwrap();
        assert_eq!(registry.get(&ServiceName::new("fs")).unwrap().phase, Phase::Running);
    }

    #[test]
    fn unknown_service_is_not_found() {
        let registry = ServiceRegistry::new();
        assert!(matches!(
            registry.get(&ServiceName::new("missing")),
            Err(GatewayError::NotFound(_))
        ));
    }
}
