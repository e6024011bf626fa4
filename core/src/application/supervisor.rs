// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! The central state machine: one worker task per service, each owning a
//! bounded mailbox (capacity 32, spec §5). The worker is the only writer of
//! that service's observable state; `domain::supervisor_fsm::transition`
//! supplies the pure decision, this module carries out the resulting
//! container-driver calls and publishes the resulting events.

use std::collections::{BTreeMap, BinaryHeap};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, Notify};
use tracing::{error, info, warn};

use crate::domain::errors::GatewayError;
use crate::domain::events::ServiceEvent;
use crate::domain::service::{HealthProbeKind, Phase, Priority, Service, ServiceName};
use crate::domain::supervisor_fsm::{self, Action, SupervisorEvent};
use crate::infrastructure::container_driver::{ContainerDriver, ContainerError, ContainerHandle, ContainerSpec, PhaseHint};
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::metrics_store::MetricsStore;

use super::registry::ServiceRegistry;

const MAILBOX_CAPACITY: usize = 32;
/// Default headroom ceiling used by the wake admission controller (spec
/// §4.3: "85% of host memory" by default).
const DEFAULT_HEADROOM_PCT: f64 = 0.85;

pub enum SupervisorCommand {
    Start,
    Stop,
    Sleep,
    RequestWake { respond_to: oneshot::Sender<Result<(), GatewayError>> },
    RequestSleep { respond_to: oneshot::Sender<Result<bool, GatewayError>> },
}

/// How long the Control API waits for a synchronous sleep request before
/// treating the mailbox as stuck. Sleeping never depends on an external
/// call the way waking does, so this is a fixed ceiling rather than a
/// per-service budget.
const FORCE_SLEEP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct Supervisor {
    registry: ServiceRegistry,
    driver: Arc<dyn ContainerDriver>,
    events: EventBus,
    metrics: MetricsStore,
    host_memory_bytes: u64,
    http_client: reqwest::Client,
    mailboxes: Arc<Mutex<BTreeMap<ServiceName, mpsc::Sender<SupervisorCommand>>>>,
    handles: Arc<Mutex<BTreeMap<ServiceName, ContainerHandle>>>,
    admission: Arc<WakeAdmissionController>,
}

impl Supervisor {
    pub fn new(
        registry: ServiceRegistry,
        driver: Arc<dyn ContainerDriver>,
        events: EventBus,
        metrics: MetricsStore,
        host_memory_bytes: u64,
    ) -> Self {
        Self {
            registry,
            driver,
            events,
            metrics,
            host_memory_bytes,
            http_client: reqwest::Client::new(),
            mailboxes: Arc::new(Mutex::new(BTreeMap::new())),
            handles: Arc::new(Mutex::new(BTreeMap::new())),
            admission: Arc::new(WakeAdmissionController::new(DEFAULT_HEADROOM_PCT)),
        }
    }

    /// Spawns a worker for every declared service. Before deciding whether
    /// to issue `Start`, reconciles against the runtime's observed state
    /// (spec §4.3: "on restart, the Supervisor reconciles observed
    /// container states with its declared desired state", scenario S6): a
    /// container already RUNNING or PAUSED is adopted directly rather than
    /// re-created.
    pub async fn spawn_all(&self) {
        for service in self.registry.list() {
            self.spawn_worker(service.name.clone());
            if !service.policy.enabled {
                continue;
            }

            let handle = ContainerHandle(format!("gateway-{}", service.name));
            match self.driver.inspect(&handle).await {
                Ok(PhaseHint::Running) => {
                    self.adopt(&service, handle, Phase::Running);
                    continue;
                }
                Ok(PhaseHint::Paused) => {
                    self.adopt(&service, handle, Phase::Sleeping);
                    continue;
                }
                Ok(PhaseHint::Exited) | Ok(PhaseHint::Missing) | Err(_) => {}
            }

            if service.policy.auto_start {
                self.dispatch(&service.name, SupervisorCommand::Start);
            }
        }
    }

    /// Adopts an already-running or already-paused container discovered at
    /// startup into the matching phase without going through `create`.
    fn adopt(&self, service: &Service, handle: ContainerHandle, phase: Phase) {
        self.handles.lock().insert(service.name.clone(), handle);
        let from = service.phase;
        if self.registry.apply_phase(&service.name, phase).is_err() {
            return;
        }
        self.events.publish_service_event(ServiceEvent::PhaseChanged {
            service: service.name.clone(),
            from,
            to: phase,
            at: Utc::now(),
        });
        info!(service = %service.name, phase = %phase, "reconciled container observed on startup");
    }

    fn spawn_worker(&self, name: ServiceName) {
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        self.mailboxes.lock().insert(name.clone(), tx);
        let worker = self.clone();
        tokio::spawn(async move { worker.run_worker(name, rx).await });
    }

    fn dispatch(&self, name: &ServiceName, command: SupervisorCommand) {
        let sender = self.mailboxes.lock().get(name).cloned();
        if let Some(sender) = sender {
            if sender.try_send(command).is_err() {
                warn!(service = %name, "supervisor mailbox full or closed, dropping command");
            }
        } else {
            warn!(service = %name, "no supervisor worker for service");
        }
    }

    pub fn request_start(&self, name: &ServiceName) {
        self.dispatch(name, SupervisorCommand::Start);
    }

    pub fn request_stop(&self, name: &ServiceName) {
        self.dispatch(name, SupervisorCommand::Stop);
    }

    pub fn request_sleep(&self, name: &ServiceName) {
        self.dispatch(name, SupervisorCommand::Sleep);
    }

    /// Ensures the named service is RUNNING, waiting up to
    /// `wakeBudgetMs · wake_budget_multiplier` (C11 step 4). No-op if
    /// already RUNNING.
    pub async fn ensure_awake(&self, name: &ServiceName, wake_budget_multiplier: u32) -> Result<(), GatewayError> {
        let service = self.registry.get(name)?;
        if service.phase == Phase::Running {
            return Ok(());
        }
        if service.phase == Phase::Failed {
            return Err(GatewayError::ServiceUnavailable(format!("{name} is FAILED")));
        }

        let (tx, rx) = oneshot::channel();
        self.dispatch(name, SupervisorCommand::RequestWake { respond_to: tx });
        let deadline = Duration::from_millis(service.policy.wake_budget_ms * wake_budget_multiplier as u64);
        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(GatewayError::Internal("supervisor worker dropped wake request".into())),
            Err(_) => Err(GatewayError::ServiceUnavailable(format!("{name} did not wake within budget"))),
        }
    }

    /// Synchronous counterpart to `request_sleep`, used by the Control API
    /// (spec §6.1 `POST /services/{name}/sleep`) to report whether the
    /// call actually transitioned the service.
    pub async fn force_sleep(&self, name: &ServiceName) -> Result<bool, GatewayError> {
        let (tx, rx) = oneshot::channel();
        self.dispatch(name, SupervisorCommand::RequestSleep { respond_to: tx });
        match tokio::time::timeout(FORCE_SLEEP_TIMEOUT, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(GatewayError::Internal("supervisor worker dropped sleep request".into())),
            Err(_) => Err(GatewayError::ServiceUnavailable(format!("{name} did not respond to sleep request"))),
        }
    }

    /// Current resource usage of a running/sleeping service's container,
    /// if one has been created. `None` for services never started.
    pub async fn container_stats(&self, name: &ServiceName) -> Option<crate::infrastructure::container_driver::ContainerStats> {
        let handle = self.handles.lock().get(name).cloned()?;
        self.driver.stats(&handle).await.ok()
    }

    async fn run_worker(&self, name: ServiceName, mut rx: mpsc::Receiver<SupervisorCommand>) {
        while let Some(command) = rx.recv().await {
            if let Err(e) = self.handle_command(&name, command).await {
                error!(service = %name, error = %e, "supervisor command failed");
            }
        }
    }

    async fn handle_command(&self, name: &ServiceName, command: SupervisorCommand) -> Result<(), GatewayError> {
        match command {
            SupervisorCommand::Start => self.do_start(name).await,
            SupervisorCommand::Stop => self.do_stop(name).await,
            SupervisorCommand::Sleep => self.do_sleep(name).await.map(|_noop| ()),
            SupervisorCommand::RequestWake { respond_to } => {
                let result = self.do_wake(name).await;
                let _ = respond_to.send(result);
                Ok(())
            }
            SupervisorCommand::RequestSleep { respond_to } => {
                let result = self.do_sleep(name).await;
                let _ = respond_to.send(result);
                Ok(())
            }
        }
    }

    fn apply(&self, name: &ServiceName, event: SupervisorEvent, priority: Priority, phase: Phase) -> Option<supervisor_fsm::Transition> {
        let transition = supervisor_fsm::transition(phase, event, priority)?;
        let from = phase;
        if self.registry.apply_phase(name, transition.to).is_err() {
            return None;
        }
        self.events.publish_service_event(ServiceEvent::PhaseChanged {
            service: name.clone(),
            from,
            to: transition.to,
            at: Utc::now(),
        });
        self.metrics.transition(name.clone(), &from.to_string(), &transition.to.to_string(), 0);
        Some(transition)
    }

    /// Records `runtime.error` at the point a container-driver call fails
    /// (spec §4.4's `RuntimeUnavailable` alert) before surfacing the error.
    fn map_runtime_error(&self, error: ContainerError) -> GatewayError {
        self.metrics.counter("runtime.error", Default::default(), 1.0);
        GatewayError::RuntimeUnavailable(error.to_string())
    }

    async fn do_start(&self, name: &ServiceName) -> Result<(), GatewayError> {
        let service = self.registry.get(name)?;
        let Some(transition) = self.apply(name, SupervisorEvent::Start, service.policy.priority, service.phase) else {
            return Ok(());
        };
        for action in &transition.actions {
            if *action == Action::CreateAndStartContainer {
                self.create_and_start(&service).await?;
            }
        }
        self.probe_until_healthy(&service).await
    }

    async fn create_and_start(&self, service: &Service) -> Result<(), GatewayError> {
        let spec = ContainerSpec {
            name: format!("gateway-{}", service.name),
            image: service.image.clone(),
            env: vec![],
            resources: service.resources,
        };
        let handle = self.driver.create(&spec).await.map_err(|e| self.map_runtime_error(e))?;
        self.driver.start(&handle).await.map_err(|e| self.map_runtime_error(e))?;
        self.handles.lock().insert(service.name.clone(), handle);
        Ok(())
    }

    /// Dispatches one health-probe attempt on `service.health_probe.kind`
    /// (spec §3): an HTTP GET against `target`, a raw TCP connect, or — for
    /// `Exec` — an inspect of the service's own container (the driver
    /// exposes no exec capability, so a confirmed RUNNING container stands
    /// in for a successful exec probe).
    async fn probe_once(&self, service: &Service) -> bool {
        let probe = &service.health_probe;
        let timeout = Duration::from_millis(probe.timeout_ms.max(1));
        match probe.kind {
            HealthProbeKind::Http => {
                let url = if probe.target.starts_with("http://") || probe.target.starts_with("https://") {
                    probe.target.clone()
                } else {
                    format!(
                        "{}://{}:{}{}",
                        service.endpoint.scheme, service.endpoint.host, service.endpoint.port, probe.target
                    )
                };
                match tokio::time::timeout(timeout, self.http_client.get(&url).send()).await {
                    Ok(Ok(response)) => response.status().is_success(),
                    _ => false,
                }
            }
            HealthProbeKind::Tcp => {
                let target = if probe.target.contains(':') {
                    probe.target.clone()
                } else {
                    format!("{}:{}", service.endpoint.host, service.endpoint.port)
                };
                matches!(tokio::time::timeout(timeout, tokio::net::TcpStream::connect(&target)).await, Ok(Ok(_)))
            }
            HealthProbeKind::Exec => {
                let Some(handle) = self.handles.lock().get(&service.name).cloned() else { return false };
                matches!(self.driver.inspect(&handle).await, Ok(PhaseHint::Running))
            }
        }
    }

    async fn probe_until_healthy(&self, service: &Service) -> Result<(), GatewayError> {
        tokio::time::sleep(Duration::from_millis(service.health_probe.start_grace_ms)).await;
        for _ in 0..=service.health_probe.retries {
            if self.probe_once(service).await {
                self.apply(&service.name, SupervisorEvent::HealthOk, service.policy.priority, Phase::Starting);
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(service.health_probe.interval_ms)).await;
        }
        let streak = self.registry.mark_failure(&service.name)?;
        self.metrics.counter("service.repeated_failure", Default::default(), 1.0);
        self.apply(&service.name, SupervisorEvent::HealthFailExhausted, service.policy.priority, Phase::Starting);
        self.events.publish_service_event(ServiceEvent::Failed {
            service: service.name.clone(),
            failure_streak: streak,
            at: Utc::now(),
        });
        self.schedule_backoff_retry(service.name.clone(), streak);
        Err(GatewayError::ServiceUnavailable(format!("{} failed health checks", service.name)))
    }

    fn schedule_backoff_retry(&self, name: ServiceName, failure_streak: u32) {
        let supervisor = self.clone();
        let delay = supervisor_fsm::backoff_delay(failure_streak);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Ok(service) = supervisor.registry.get(&name) {
                if service.phase == Phase::Failed {
                    supervisor.apply(&name, SupervisorEvent::BackoffElapsed, service.policy.priority, Phase::Failed);
                    supervisor.request_start(&name);
                }
            }
        });
    }

    /// Returns `Ok(true)` when the call was a no-op (already asleep/stopped,
    /// or refused because `priority=high`), `Ok(false)` when it actually
    /// transitioned the service.
    async fn do_sleep(&self, name: &ServiceName) -> Result<bool, GatewayError> {
        let service = self.registry.get(name)?;
        let event = if service.is_idle(Utc::now()) {
            SupervisorEvent::IdleTimeoutElapsed
        } else {
            SupervisorEvent::Sleep
        };
        let Some(transition) = self.apply(name, event, service.policy.priority, service.phase) else {
            return Ok(true);
        };
        if transition.actions.contains(&Action::PauseContainer) {
            if let Some(handle) = self.handles.lock().get(name).cloned() {
                self.driver.pause(&handle).await.map_err(|e| self.map_runtime_error(e))?;
            }
        }
        self.events.publish_service_event(ServiceEvent::Slept { service: name.clone(), at: Utc::now() });
        Ok(false)
    }

    async fn do_wake(&self, name: &ServiceName) -> Result<(), GatewayError> {
        let service = self.registry.get(name)?;
        if service.phase == Phase::Running {
            return Ok(());
        }

        let pressure = self.sample_memory_pressure_pct();
        self.admission.admit(name.clone(), service.policy.priority, service.policy.wake_budget_ms, pressure).await;
        let result = self.do_wake_inner(name, &service).await;
        self.admission.release();
        result
    }

    async fn do_wake_inner(&self, name: &ServiceName, service: &Service) -> Result<(), GatewayError> {
        let started = std::time::Instant::now();
        let Some(_transition) = self.apply(name, SupervisorEvent::ActivityDemand, service.policy.priority, service.phase) else {
            return Err(GatewayError::Conflict(format!("{name} cannot wake from {:?}", service.phase)));
        };
        let handle = self.handles.lock().get(name).cloned();
        if let Some(handle) = handle {
            self.driver.unpause(&handle).await.map_err(|e| self.map_runtime_error(e))?;
        }
        if !self.probe_once(service).await {
            self.apply(name, SupervisorEvent::WakeTimeout, service.policy.priority, Phase::Waking);
            return Err(GatewayError::ServiceUnavailable(format!("{name} failed to wake")));
        }
        let latency_ms = started.elapsed().as_millis() as u64;
        self.apply(name, SupervisorEvent::HealthOk, service.policy.priority, Phase::Waking);
        self.metrics.timing("service.wake_latency", Default::default(), latency_ms as f64);
        if latency_ms > service.policy.wake_budget_ms.saturating_mul(2) {
            self.metrics.counter("service.wake_slow", Default::default(), 1.0);
        }
        self.events.publish_service_event(ServiceEvent::WakeComplete { service: name.clone(), latency_ms, at: Utc::now() });
        Ok(())
    }

    async fn do_stop(&self, name: &ServiceName) -> Result<(), GatewayError> {
        let service = self.registry.get(name)?;
        let Some(_transition) = self.apply(name, SupervisorEvent::Stop, service.policy.priority, service.phase) else {
            return Ok(());
        };
        if let Some(handle) = self.handles.lock().remove(name) {
            self.driver.stop(&handle, 10_000).await.map_err(|e| self.map_runtime_error(e))?;
            self.driver.remove(&handle).await.map_err(|e| self.map_runtime_error(e))?;
        }
        self.apply(name, SupervisorEvent::ContainerGone, service.policy.priority, Phase::Stopping);
        self.events.publish_service_event(ServiceEvent::Stopped { service: name.clone(), at: Utc::now() });
        Ok(())
    }

    /// Fraction of host memory in use, read fresh on every wake attempt
    /// and recorded as the `memory.pressure` gauge (spec §4.4). `0.0` when
    /// `host_memory_bytes` is unknown (e.g. non-Linux hosts) — admission
    /// never blocks on a signal it cannot sample.
    fn sample_memory_pressure_pct(&self) -> f64 {
        if self.host_memory_bytes == 0 {
            return 0.0;
        }
        let Some(available) = sampled_available_memory_bytes() else { return 0.0 };
        let used = self.host_memory_bytes.saturating_sub(available);
        let pct = used as f64 / self.host_memory_bytes as f64;
        self.metrics.gauge("memory.pressure", Default::default(), pct);
        pct
    }
}

#[cfg(target_os = "linux")]
fn sampled_available_memory_bytes() -> Option<u64> {
    let contents = std::fs::read_to_string("/proc/meminfo").ok()?;
    for line in contents.lines() {
        if let Some(rest) = line.strip_prefix("MemAvailable:") {
            let kb = rest.trim().split_whitespace().next()?.parse::<u64>().ok()?;
            return Some(kb * 1024);
        }
    }
    None
}

#[cfg(not(target_os = "linux"))]
fn sampled_available_memory_bytes() -> Option<u64> {
    None
}

/// Cross-service wake ordering under resource pressure (spec §4.3):
/// priority descending, then ascending `wakeBudgetMs`, then name ascending.
/// Held under a single short lock during admit/dequeue, as the spec
/// requires; admission itself only blocks the caller, never other workers.
struct WakeAdmissionController {
    headroom_pct: f64,
    queue: Mutex<BinaryHeap<WakeTicket>>,
    notify: Notify,
}

#[derive(Eq, PartialEq)]
struct WakeTicket {
    priority: Priority,
    wake_budget_ms: u64,
    name: ServiceName,
}

impl Ord for WakeTicket {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.wake_budget_ms.cmp(&self.wake_budget_ms))
            .then_with(|| other.name.cmp(&self.name))
    }
}

impl PartialOrd for WakeTicket {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl WakeAdmissionController {
    fn new(headroom_pct: f64) -> Self {
        Self { headroom_pct, queue: Mutex::new(BinaryHeap::new()), notify: Notify::new() }
    }

    /// Blocks the caller while `current_pressure_pct` stays at or above
    /// `headroom_pct`, admitting queued wakes in priority-desc,
    /// wakeBudgetMs-asc, name-asc order (spec §4.3, §5, scenario S4).
    /// `release` must be called once the admitted wake completes so the
    /// next-highest-priority waiter, if any, gets a turn.
    async fn admit(&self, name: ServiceName, priority: Priority, wake_budget_ms: u64, current_pressure_pct: f64) {
        if current_pressure_pct < self.headroom_pct {
            return;
        }
        warn!(%name, pressure = current_pressure_pct, headroom = self.headroom_pct, "queuing wake under memory pressure");
        self.queue.lock().push(WakeTicket { priority, wake_budget_ms, name: name.clone() });
        loop {
            self.notify.notified().await;
            let mut queue = self.queue.lock();
            match queue.peek() {
                Some(top) if top.name == name => {
                    queue.pop();
                    return;
                }
                _ => continue,
            }
        }
    }

    /// Wakes every queued waiter so the one now at the front of the heap
    /// can proceed; the rest re-check and go back to waiting.
    fn release(&self) {
        self.notify.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::{RouterPolicyConfig, ServiceConfig, VirtualServerConfigEntry};
    use crate::domain::service::{HealthProbe, HealthProbeKind, ServiceEndpoint};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FakeDriver {
        healthy: AtomicBool,
    }

    #[async_trait]
    impl ContainerDriver for FakeDriver {
        async fn create(&self, _spec: &ContainerSpec) -> Result<ContainerHandle, ContainerError> {
            Ok(ContainerHandle("fake".into()))
        }
        async fn start(&self, _handle: &ContainerHandle) -> Result<(), ContainerError> {
            Ok(())
        }
        async fn stop(&self, _handle: &ContainerHandle, _grace_ms: u64) -> Result<(), ContainerError> {
            Ok(())
        }
        async fn pause(&self, _handle: &ContainerHandle) -> Result<(), ContainerError> {
            Ok(())
        }
        async fn unpause(&self, _handle: &ContainerHandle) -> Result<(), ContainerError> {
            Ok(())
        }
        async fn remove(&self, _handle: &ContainerHandle) -> Result<(), ContainerError> {
            Ok(())
        }
        async fn stats(&self, _handle: &ContainerHandle) -> Result<crate::infrastructure::container_driver::ContainerStats, ContainerError> {
            Ok(crate::infrastructure::container_driver::ContainerStats { cpu_pct: 0.0, mem_bytes: 0 })
        }
        async fn inspect(&self, _handle: &ContainerHandle) -> Result<PhaseHint, ContainerError> {
            if self.healthy.load(Ordering::SeqCst) {
                Ok(PhaseHint::Running)
            } else {
                Ok(PhaseHint::Missing)
            }
        }
        async fn healthcheck(&self) -> Result<(), ContainerError> {
            if self.healthy.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(ContainerError::RuntimeUnavailable("down".into()))
            }
        }
    }

    fn config() -> crate::domain::config::GatewayConfig {
        crate::domain::config::GatewayConfig {
            services: vec![ServiceConfig {
                name: "fs".into(),
                image: "fs:latest".into(),
                endpoint: ServiceEndpoint { scheme: "http".into(), host: "localhost".into(), port: 9000, path: "".into() },
                priority: Priority::Normal,
                // Exec dispatches against the driver's own `inspect`, so
                // this fixture needs no reachable HTTP/TCP target.
                health_probe: HealthProbe { kind: HealthProbeKind::Exec, target: "".into(), interval_ms: 10, timeout_ms: 10, retries: 1, start_grace_ms: 0 },
                enabled: true,
                auto_start: false,
                idle_timeout: Duration::from_secs(600),
                wake_budget_ms: 50,
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

    #[tokio::test]
    async fn start_to_running_on_healthy_driver() {
        let registry = ServiceRegistry::new();
        registry.reload(&config()).unwrap();
        let driver = Arc::new(FakeDriver { healthy: AtomicBool::new(true) });
        let supervisor = Supervisor::new(registry.clone(), driver, EventBus::with_default_capacity(), MetricsStore::new(vec![]), 16_000_000_000);
        supervisor.spawn_all().await;
        supervisor.request_start(&ServiceName::new("fs"));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(registry.get(&ServiceName::new("fs")).unwrap().phase, Phase::Running);
    }

    #[tokio::test]
    async fn ensure_awake_is_noop_when_already_running() {
        let registry = ServiceRegistry::new();
        registry.reload(&config()).unwrap();
        registry.apply_phase(&ServiceName::new("fs"), Phase::Running).unwrap();
        let driver = Arc::new(FakeDriver { healthy: AtomicBool::new(true) });
        let supervisor = Supervisor::new(registry.clone(), driver, EventBus::with_default_capacity(), MetricsStore::new(vec![]), 16_000_000_000);
        supervisor.spawn_all().await;
        assert!(supervisor.ensure_awake(&ServiceName::new("fs"), 3).await.is_ok());
    }

    #[tokio::test]
    async fn reconciles_already_running_container_without_recreating() {
        let registry = ServiceRegistry::new();
        registry.reload(&config()).unwrap();
        let driver = Arc::new(FakeDriver { healthy: AtomicBool::new(true) });
        let supervisor = Supervisor::new(registry.clone(), driver, EventBus::with_default_capacity(), MetricsStore::new(vec![]), 16_000_000_000);
        supervisor.spawn_all().await;
        // No `request_start` call: adoption via `inspect` must be what
        // brings the service to RUNNING.
        assert_eq!(registry.get(&ServiceName::new("fs")).unwrap().phase, Phase::Running);
    }

    #[tokio::test]
    async fn admission_passes_through_when_not_under_pressure() {
        let admission = WakeAdmissionController::new(DEFAULT_HEADROOM_PCT);
        admission.admit(ServiceName::new("fs"), Priority::Normal, 50, 0.1).await;
    }
}
