// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Rolling counters, timings, and state-transition logs, plus alert rule
//! evaluation (C4, spec §4.4). Ingestion is non-blocking: under pressure
//! the store drops the oldest sample and counts the drop, never penalizing
//! the producer.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::domain::metrics::{Alert, AlertKind, AlertRule, MetricSample, Severity, Tags, Window, ALERT_DEDUP_COOLDOWN};
use crate::domain::service::ServiceName;

const MAX_SAMPLES_PER_WINDOW: usize = 10_000;

struct WindowedSeries {
    window: Window,
    samples: VecDeque<MetricSample>,
}

impl WindowedSeries {
    fn new(window: Window) -> Self {
        Self { window, samples: VecDeque::new() }
    }

    fn push(&mut self, sample: MetricSample, drop_counter: &std::sync::atomic::AtomicU64) {
        if self.samples.len() >= MAX_SAMPLES_PER_WINDOW {
            self.samples.pop_front();
            drop_counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }
        self.samples.push_back(sample);
        self.evict_stale();
    }

    fn evict_stale(&mut self) {
        let cutoff = chrono::Utc::now().timestamp_millis() - self.window.duration().as_millis() as i64;
        while matches!(self.samples.front(), Some(s) if s.timestamp_ms < cutoff) {
            self.samples.pop_front();
        }
    }
}

#[derive(Default)]
struct Inner {
    series: BTreeMap<String, Vec<WindowedSeries>>,
    transitions: Vec<(ServiceName, String, String, u64)>,
    dropped: std::sync::atomic::AtomicU64,
    last_alert: BTreeMap<(AlertKind, Option<String>), Instant>,
}

#[derive(Clone)]
pub struct MetricsStore {
    inner: Arc<Mutex<Inner>>,
    rules: Arc<Vec<AlertRule>>,
}

impl MetricsStore {
    pub fn new(rules: Vec<AlertRule>) -> Self {
        Self { inner: Arc::new(Mutex::new(Inner::default())), rules: Arc::new(rules) }
    }

    fn record(&self, name: &str, tags: Tags, value: f64) {
        let sample = MetricSample { name: name.to_string(), tags, value, timestamp_ms: chrono::Utc::now().timestamp_millis() };
        let mut guard = self.inner.lock();
        let drop_counter = std::mem::replace(&mut guard.dropped, std::sync::atomic::AtomicU64::new(0));
        let entry = guard.series.entry(name.to_string()).or_insert_with(|| {
            vec![
                WindowedSeries::new(Window::OneMinute),
                WindowedSeries::new(Window::FiveMinutes),
                WindowedSeries::new(Window::OneHour),
            ]
        });
        for series in entry.iter_mut() {
            series.push(sample.clone(), &drop_counter);
        }
        guard.dropped = drop_counter;
    }

    pub fn counter(&self, name: &str, tags: Tags, delta: f64) {
        self.record(name, tags, delta);
    }

    pub fn timing(&self, name: &str, tags: Tags, ms: f64) {
        self.record(name, tags, ms);
    }

    pub fn gauge(&self, name: &str, tags: Tags, value: f64) {
        self.record(name, tags, value);
    }

    pub fn transition(&self, service: ServiceName, from: &str, to: &str, latency_ms: u64) {
        self.inner.lock().transitions.push((service, from.to_string(), to.to_string(), latency_ms));
    }

    /// Sums every sample of `name_glob` (exact-name match; wildcards are
    /// not needed by any caller in this crate) within `window`.
    pub fn query(&self, window: Window, name_glob: &str) -> Vec<MetricSample> {
        let guard = self.inner.lock();
        guard
            .series
            .get(name_glob)
            .map(|series_list| {
                series_list
                    .iter()
                    .find(|s| s.window == window)
                    .map(|s| s.samples.iter().cloned().collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    pub fn dropped_count(&self) -> u64 {
        self.inner.lock().dropped.load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Evaluates every declared rule against the current windows, applying
    /// the 5-minute `(kind, service)` dedup cooldown.
    pub fn evaluate_alerts(&self) -> Vec<Alert> {
        let mut fired = Vec::new();
        let mut guard = self.inner.lock();
        for rule in self.rules.iter() {
            let samples = guard
                .series
                .get(&rule.counter_name)
                .and_then(|series_list| series_list.iter().find(|s| s.window == rule.window))
                .map(|s| s.samples.iter().map(|sample| sample.value).sum::<f64>())
                .unwrap_or(0.0);
            if samples <= rule.threshold {
                continue;
            }
            let key = (rule.kind, None);
            let now = Instant::now();
            let recently_fired = guard
                .last_alert
                .get(&key)
                .map(|last| now.duration_since(*last) < ALERT_DEDUP_COOLDOWN)
                .unwrap_or(false);
            if recently_fired {
                continue;
            }
            guard.last_alert.insert(key, now);
            fired.push(Alert {
                kind: rule.kind,
                severity: rule.severity,
                service: None,
                payload: serde_json::json!({ "rate": samples, "threshold": rule.threshold }),
            });
        }
        fired
    }
}

/// The required alert kinds and their rules (spec §4.4), wired at
/// composition time.
pub fn default_alert_rules() -> Vec<AlertRule> {
    vec![
        AlertRule {
            counter_name: "service.wake_slow".into(),
            window: Window::FiveMinutes,
            threshold: 0.0,
            sustained_for: Duration::from_secs(0),
            kind: AlertKind::ServiceWakeSlow,
            severity: Severity::Warning,
        },
        AlertRule {
            counter_name: "service.repeated_failure".into(),
            window: Window::FiveMinutes,
            threshold: 0.0,
            sustained_for: Duration::from_secs(0),
            kind: AlertKind::ServiceRepeatedFailure,
            severity: Severity::Critical,
        },
        AlertRule {
            counter_name: "advisor.error".into(),
            window: Window::FiveMinutes,
            threshold: 0.0,
            sustained_for: Duration::from_secs(0),
            kind: AlertKind::AdvisorUnavailable,
            severity: Severity::Warning,
        },
        AlertRule {
            counter_name: "runtime.error".into(),
            window: Window::FiveMinutes,
            threshold: 0.0,
            sustained_for: Duration::from_secs(0),
            kind: AlertKind::RuntimeUnavailable,
            severity: Severity::Critical,
        },
        AlertRule {
            counter_name: "memory.pressure".into(),
            window: Window::OneMinute,
            threshold: 0.85,
            sustained_for: Duration::from_secs(0),
            kind: AlertKind::MemoryPressure,
            severity: Severity::Warning,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_queries_a_counter() {
        let store = MetricsStore::new(default_alert_rules());
        store.counter("advisor.call", Tags::new(), 1.0);
        store.counter("advisor.call", Tags::new(), 1.0);
        let samples = store.query(Window::OneMinute, "advisor.call");
        assert_eq!(samples.len(), 2);
    }

    #[test]
    fn alerts_dedup_within_cooldown() {
        let rules = vec![AlertRule {
            counter_name: "memory.pressure".into(),
            window: Window::OneMinute,
            threshold: 0.0,
            sustained_for: Duration::from_secs(0),
            kind: AlertKind::MemoryPressure,
            severity: Severity::Warning,
        }];
        let store = MetricsStore::new(rules);
        store.gauge("memory.pressure", Tags::new(), 0.9);
        let first = store.evaluate_alerts();
        let second = store.evaluate_alerts();
        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
    }
}
