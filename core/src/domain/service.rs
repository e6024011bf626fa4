// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! The managed-service entity: identity, declared policy, resource
//! reservations, health-probe spec, and observable lifecycle state.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable, human-assigned key. Newtype over `String` (not `Uuid`: services
/// are declared by an operator, not generated) so the compiler stops a
/// `VirtualServerName` or `FullyQualifiedToolName` from being passed where a
/// `ServiceName` is expected.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServiceName(String);

impl ServiceName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ServiceName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ServiceName {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
}

/// The seven observable phases of a service (spec §3, §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Stopped,
    Starting,
    Running,
    Sleeping,
    Waking,
    Stopping,
    Failed,
}

impl Phase {
    pub fn is_terminal_steady_state(self) -> bool {
        matches!(self, Phase::Stopped)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Stopped => "STOPPED",
            Phase::Starting => "STARTING",
            Phase::Running => "RUNNING",
            Phase::Sleeping => "SLEEPING",
            Phase::Waking => "WAKING",
            Phase::Stopping => "STOPPING",
            Phase::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthProbeKind {
    Http,
    Tcp,
    Exec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthProbe {
    pub kind: HealthProbeKind,
    pub target: String,
    pub interval_ms: u64,
    pub timeout_ms: u64,
    pub retries: u32,
    pub start_grace_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePolicy {
    pub priority: Priority,
    pub auto_start: bool,
    /// Zero means "never sleep".
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,
    pub wake_budget_ms: u64,
    pub enabled: bool,
}

impl ServicePolicy {
    pub fn never_sleeps(&self) -> bool {
        self.idle_timeout.is_zero()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceResources {
    pub mem_limit: u64,
    pub mem_reservation: u64,
    pub cpu_limit: f64,
    pub cpu_reservation: f64,
    pub pid_limit: u32,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ServiceConfigError {
    #[error("service {name}: memReservation ({reservation}) exceeds memLimit ({limit})")]
    MemReservationExceedsLimit { name: String, reservation: u64, limit: u64 },
    #[error("service {name}: cpuReservation ({reservation}) exceeds cpuLimit ({limit})")]
    CpuReservationExceedsLimit { name: String, reservation: f64, limit: f64 },
}

impl ServiceResources {
    fn validate(&self, name: &ServiceName) -> Result<(), ServiceConfigError> {
        if self.mem_reservation > self.mem_limit {
            return Err(ServiceConfigError::MemReservationExceedsLimit {
                name: name.to_string(),
                reservation: self.mem_reservation,
                limit: self.mem_limit,
            });
        }
        if self.cpu_reservation > self.cpu_limit {
            return Err(ServiceConfigError::CpuReservationExceedsLimit {
                name: name.to_string(),
                reservation: self.cpu_reservation,
                limit: self.cpu_limit,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl fmt::Display for ServiceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}{}", self.scheme, self.host, self.port, self.path)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub name: ServiceName,
    pub image: String,
    pub endpoint: ServiceEndpoint,
    pub policy: ServicePolicy,
    pub resources: ServiceResources,
    pub health_probe: HealthProbe,
    pub phase: Phase,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub last_transition_at: DateTime<Utc>,
    pub failure_streak: u32,
}

impl Service {
    /// Builds a freshly declared service, `STOPPED`, with no recorded
    /// activity. Rejects invariant violations in resource reservations.
    pub fn declare(
        name: ServiceName,
        image: impl Into<String>,
        endpoint: ServiceEndpoint,
        policy: ServicePolicy,
        resources: ServiceResources,
        health_probe: HealthProbe,
        now: DateTime<Utc>,
    ) -> Result<Self, ServiceConfigError> {
        resources.validate(&name)?;
        Ok(Self {
            name,
            image: image.into(),
            endpoint,
            policy,
            resources,
            health_probe,
            phase: Phase::Stopped,
            last_activity_at: None,
            last_transition_at: now,
            failure_streak: 0,
        })
    }

    /// `enabled=false ⇒ phase ∈ {STOPPED}` at steady state (spec §3).
    pub fn is_steady_disabled(&self) -> bool {
        !self.policy.enabled && self.phase.is_terminal_steady_state()
    }

    pub fn is_idle(&self, now: DateTime<Utc>) -> bool {
        match self.last_activity_at {
            None => true,
            Some(last) => {
                let elapsed = now.signed_duration_since(last);
                elapsed.num_milliseconds().max(0) as u128 >= self.policy.idle_timeout.as_millis()
            }
        }
    }

    pub fn record_activity(&mut self, now: DateTime<Utc>) {
        self.last_activity_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe() -> HealthProbe {
        HealthProbe {
            kind: HealthProbeKind::Http,
            target: "/healthz".into(),
            interval_ms: 5000,
            timeout_ms: 1000,
            retries: 3,
            start_grace_ms: 2000,
        }
    }

    fn endpoint() -> ServiceEndpoint {
        ServiceEndpoint { scheme: "http".into(), host: "localhost".into(), port: 9000, path: "".into() }
    }

    #[test]
    fn rejects_mem_reservation_exceeding_limit() {
        let resources = ServiceResources {
            mem_limit: 100,
            mem_reservation: 200,
            cpu_limit: 1.0,
            cpu_reservation: 0.5,
            pid_limit: 64,
        };
        let policy = ServicePolicy {
            priority: Priority::Normal,
            auto_start: false,
            idle_timeout: Duration::from_secs(600),
            wake_budget_ms: 200,
            enabled: true,
        };
        let err = Service::declare(
            ServiceName::new("memory"),
            "memory:latest",
            endpoint(),
            policy,
            resources,
            probe(),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, ServiceConfigError::MemReservationExceedsLimit { .. }));
    }

    #[test]
    fn idle_timeout_zero_never_sleeps() {
        let policy = ServicePolicy {
            priority: Priority::High,
            auto_start: true,
            idle_timeout: Duration::ZERO,
            wake_budget_ms: 100,
            enabled: true,
        };
        assert!(policy.never_sleeps());
    }

    #[test]
    fn steady_disabled_requires_stopped_phase() {
        let resources = ServiceResources {
            mem_limit: 512,
            mem_reservation: 128,
            cpu_limit: 1.0,
            cpu_reservation: 0.25,
            pid_limit: 64,
        };
        let policy = ServicePolicy {
            priority: Priority::Normal,
            auto_start: false,
            idle_timeout: Duration::from_secs(60),
            wake_budget_ms: 200,
            enabled: false,
        };
        let mut svc = Service::declare(
            ServiceName::new("fs"),
            "fs:latest",
            endpoint(),
            policy,
            resources,
            probe(),
            Utc::now(),
        )
        .unwrap();
        assert!(svc.is_steady_disabled());
        svc.phase = Phase::Starting;
        assert!(!svc.is_steady_disabled());
    }
}
