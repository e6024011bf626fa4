// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Value types carried by the Metrics Store (C4, spec §4.4): individual
//! samples, rolling-window granularity, and the declarative alert rules
//! evaluated against them.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub type Tags = BTreeMap<String, String>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSample {
    pub name: String,
    pub tags: Tags,
    pub value: f64,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Window {
    OneMinute,
    FiveMinutes,
    OneHour,
}

impl Window {
    pub fn duration(self) -> Duration {
        match self {
            Window::OneMinute => Duration::from_secs(60),
            Window::FiveMinutes => Duration::from_secs(5 * 60),
            Window::OneHour => Duration::from_secs(60 * 60),
        }
    }

    /// Sample resolution retained for this window (spec §4.4).
    pub fn resolution(self) -> Duration {
        match self {
            Window::OneMinute => Duration::from_secs(1),
            Window::FiveMinutes => Duration::from_secs(10),
            Window::OneHour => Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    ServiceWakeSlow,
    ServiceRepeatedFailure,
    AdvisorUnavailable,
    RuntimeUnavailable,
    MemoryPressure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub severity: Severity,
    pub service: Option<String>,
    pub payload: serde_json::Value,
}

/// `when counter.rate[window] > threshold for sustained_for → emit alert`.
#[derive(Debug, Clone)]
pub struct AlertRule {
    pub counter_name: String,
    pub window: Window,
    pub threshold: f64,
    pub sustained_for: Duration,
    pub kind: AlertKind,
    pub severity: Severity,
}

/// Alerts are deduplicated by `(kind, service)` within this cooldown.
pub const ALERT_DEDUP_COOLDOWN: Duration = Duration::from_secs(5 * 60);
