// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! The two event families published on the event bus. Breaking the cyclic
//! reference between Registry, Supervisor, and Tool Cache (spec §9): the
//! Supervisor publishes `ServiceEvent`s; the Tool Cache subscribes and
//! refreshes on `Started`/`WakeComplete`; nobody holds a direct
//! back-reference between the two.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::service::{Phase, ServiceName};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServiceEvent {
    Started {
        service: ServiceName,
        at: DateTime<Utc>,
    },
    WakeComplete {
        service: ServiceName,
        latency_ms: u64,
        at: DateTime<Utc>,
    },
    Slept {
        service: ServiceName,
        at: DateTime<Utc>,
    },
    Stopped {
        service: ServiceName,
        at: DateTime<Utc>,
    },
    Failed {
        service: ServiceName,
        failure_streak: u32,
        at: DateTime<Utc>,
    },
    PhaseChanged {
        service: ServiceName,
        from: Phase,
        to: Phase,
        at: DateTime<Utc>,
    },
}

impl ServiceEvent {
    pub fn service(&self) -> &ServiceName {
        match self {
            ServiceEvent::Started { service, .. }
            | ServiceEvent::WakeComplete { service, .. }
            | ServiceEvent::Slept { service, .. }
            | ServiceEvent::Stopped { service, .. }
            | ServiceEvent::Failed { service, .. }
            | ServiceEvent::PhaseChanged { service, .. } => service,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RouterEvent {
    SelectionRecorded {
        task_text: String,
        method: super::selection::SelectionMethod,
        at: DateTime<Utc>,
    },
    InvocationRecorded {
        target_service: Option<ServiceName>,
        succeeded: bool,
        total_latency_ms: u64,
        at: DateTime<Utc>,
    },
    VirtualServerTruncated {
        virtual_server: String,
        at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    Service(ServiceEvent),
    Router(RouterEvent),
}
