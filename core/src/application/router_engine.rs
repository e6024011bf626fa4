// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Entry point for "execute this task" (C11, spec §4.11): resolves the
//! candidate tool set, selects, builds arguments, ensures the target
//! service is awake, invokes upstream, and records the resulting
//! `Invocation`. Re-entrant and stateless per call.

use std::time::{Duration, Instant};

use crate::domain::errors::{ErrorKind, GatewayError};
use crate::domain::events::RouterEvent;
use crate::domain::invocation::Invocation;
use crate::domain::tool::{Tool, VirtualServerName};
use crate::infrastructure::advisor_client::AdvisorClient;
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::metrics_store::MetricsStore;
use crate::infrastructure::tool_cache::ToolCache;
use crate::infrastructure::upstream_client::{Transport, UpstreamClient, UpstreamError};

use super::argument_builder::ArgumentBuilder;
use super::hybrid_selector::{HybridSelector, SelectorError};
use super::registry::ServiceRegistry;
use super::supervisor::Supervisor;
use super::virtual_servers::VirtualServerStore;

const MAX_CANDIDATE_ATTEMPTS: usize = 2;
const DEFAULT_INVOCATION_DEADLINE: Duration = Duration::from_secs(120);

pub struct RouterEngine<'a> {
    tool_cache: &'a ToolCache,
    advisor: &'a AdvisorClient,
    registry: &'a ServiceRegistry,
    supervisor: &'a Supervisor,
    upstream: &'a dyn UpstreamClient,
    metrics: &'a MetricsStore,
    events: &'a EventBus,
    virtual_servers: &'a VirtualServerStore,
    wake_budget_multiplier: u32,
}

impl<'a> RouterEngine<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tool_cache: &'a ToolCache,
        advisor: &'a AdvisorClient,
        registry: &'a ServiceRegistry,
        supervisor: &'a Supervisor,
        upstream: &'a dyn UpstreamClient,
        metrics: &'a MetricsStore,
        events: &'a EventBus,
        virtual_servers: &'a VirtualServerStore,
        wake_budget_multiplier: u32,
    ) -> Self {
        Self { tool_cache, advisor, registry, supervisor, upstream, metrics, events, virtual_servers, wake_budget_multiplier }
    }

    pub async fn execute(
        &self,
        task_text: &str,
        virtual_server_name: Option<&VirtualServerName>,
        policy: crate::domain::config::RouterPolicyConfig,
        deadline: Option<Duration>,
    ) -> Result<Invocation, GatewayError> {
        let started = Instant::now();
        let deadline = deadline.unwrap_or(DEFAULT_INVOCATION_DEADLINE);

        let candidates = self.resolve_candidates(virtual_server_name)?;
        if candidates.is_empty() {
            return Err(GatewayError::NoToolsAvailable);
        }

        let selector = HybridSelector::new(self.advisor, policy.clone());
        let selection = selector.select(task_text, &candidates).await.map_err(|e| match e {
            SelectorError::NoToolsAvailable => GatewayError::NoToolsAvailable,
        })?;
        self.events.publish_router_event(RouterEvent::SelectionRecorded {
            task_text: task_text.to_string(),
            method: selection.method,
            at: chrono::Utc::now(),
        });

        let attempt_order = selection.ranked();
        let mut last_error: Option<GatewayError> = None;
        let mut wake_required = false;
        let mut wake_latency_ms = None;
        let mut arguments_built = None;
        let mut target_service = None;
        let mut result = None;
        let mut error_kind = None;

        for fqtn in attempt_order.into_iter().take(MAX_CANDIDATE_ATTEMPTS) {
            if started.elapsed() >= deadline {
                error_kind = Some(ErrorKind::Timeout);
                last_error = Some(GatewayError::Timeout);
                break;
            }

            let Some(tool) = candidates.iter().find(|t| &t.fully_qualified_name == fqtn) else { continue };
            let Some(service_name) = tool.service_name() else { continue };
            target_service = Some(service_name.clone());

            let builder = ArgumentBuilder::new(self.advisor);
            let arguments = match builder.build(task_text, &tool.input_schema).await {
                Ok(args) => args,
                Err(e) => {
                    match e {
                        super::argument_builder::ArgumentBuildError::Incomplete { fields } => {
                            error_kind = Some(ErrorKind::ArgumentsIncomplete);
                            last_error = Some(GatewayError::ArgumentsIncomplete { fields });
                        }
                        super::argument_builder::ArgumentBuildError::SchemaViolation(msg) => {
                            error_kind = Some(ErrorKind::ValidationFailed);
                            last_error = Some(GatewayError::ValidationFailed(msg));
                        }
                    }
                    continue;
                }
            };
            arguments_built = Some(arguments.clone());

            let service = self.registry.get(&service_name)?;
            if matches!(service.phase, crate::domain::service::Phase::Sleeping | crate::domain::service::Phase::Stopped) {
                wake_required = true;
                let wake_started = Instant::now();
                if let Err(e) = self.supervisor.ensure_awake(&service_name, self.wake_budget_multiplier).await {
                    error_kind = Some(ErrorKind::ServiceUnavailable);
                    last_error = Some(e);
                    continue;
                }
                wake_latency_ms = Some(wake_started.elapsed().as_millis() as u64);
            }

            self.registry.record_activity(&service_name)?;
            let remaining = deadline.saturating_sub(started.elapsed());
            let (_service_name, local_name) = fqtn.split().ok_or_else(|| GatewayError::internal("malformed tool name"))?;

            match self.upstream.invoke(&service.endpoint, Transport::Http, local_name, arguments, remaining).await {
                Ok(value) => {
                    result = Some(value);
                    error_kind = None;
                    last_error = None;
                    break;
                }
                Err(UpstreamError::SchemaViolation(msg)) => {
                    error_kind = Some(ErrorKind::ValidationFailed);
                    last_error = Some(GatewayError::ValidationFailed(msg));
                    continue;
                }
                Err(e) => {
                    error_kind = Some(ErrorKind::ServiceUnavailable);
                    last_error = Some(GatewayError::ServiceUnavailable(e.to_string()));
                    continue;
                }
            }
        }

        let total_latency_ms = started.elapsed().as_millis() as u64;
        let succeeded = result.is_some();
        self.metrics.counter("router.invocation", Default::default(), 1.0);
        self.events.publish_router_event(RouterEvent::InvocationRecorded {
            target_service: target_service.clone(),
            succeeded,
            total_latency_ms,
            at: chrono::Utc::now(),
        });

        let invocation = Invocation {
            task_text: task_text.to_string(),
            selection,
            arguments_built,
            target_service,
            result,
            error_kind,
            total_latency_ms,
            wake_required,
            wake_latency_ms,
        };

        if !succeeded {
            if let Some(err) = last_error {
                return Err(err);
            }
        }
        Ok(invocation)
    }

    fn resolve_candidates(&self, virtual_server_name: Option<&VirtualServerName>) -> Result<Vec<Tool>, GatewayError> {
        match virtual_server_name {
            Some(name) => {
                let virtual_server = self.virtual_servers.get(name)?;
                Ok(self.tool_cache.resolve(&virtual_server).tools)
            }
            None => Ok(self.tool_cache.snapshot()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::{RouterPolicyConfig, ServiceConfig, VirtualServerConfigEntry};
    use crate::domain::schema::Schema;
    use crate::domain::service::{HealthProbe, HealthProbeKind, Priority, ServiceEndpoint, ServiceName};
    use crate::domain::tool::FullyQualifiedToolName;
    use crate::infrastructure::container_driver::{ContainerDriver, ContainerError, ContainerHandle, ContainerSpec, ContainerStats, PhaseHint};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct NoopDriver;

    #[async_trait]
    impl ContainerDriver for NoopDriver {
        async fn create(&self, _s: &ContainerSpec) -> Result<ContainerHandle, ContainerError> {
            Ok(ContainerHandle("x".into()))
        }
        async fn start(&self, _h: &ContainerHandle) -> Result<(), ContainerError> {
            Ok(())
        }
        async fn stop(&self, _h: &ContainerHandle, _g: u64) -> Result<(), ContainerError> {
            Ok(())
        }
        async fn pause(&self, _h: &ContainerHandle) -> Result<(), ContainerError> {
            Ok(())
        }
        async fn unpause(&self, _h: &ContainerHandle) -> Result<(), ContainerError> {
            Ok(())
        }
        async fn remove(&self, _h: &ContainerHandle) -> Result<(), ContainerError> {
            Ok(())
        }
        async fn stats(&self, _h: &ContainerHandle) -> Result<ContainerStats, ContainerError> {
            Ok(ContainerStats { cpu_pct: 0.0, mem_bytes: 0 })
        }
        async fn inspect(&self, _h: &ContainerHandle) -> Result<PhaseHint, ContainerError> {
            Ok(PhaseHint::Running)
        }
        async fn healthcheck(&self) -> Result<(), ContainerError> {
            Ok(())
        }
    }

    struct FakeUpstream;

    #[async_trait]
    impl UpstreamClient for FakeUpstream {
        async fn list_tools(&self, _s: &ServiceName, _e: &ServiceEndpoint, _t: Transport) -> Result<Vec<Tool>, UpstreamError> {
            Ok(vec![])
        }
        async fn invoke(&self, _e: &ServiceEndpoint, _t: Transport, _name: &str, _args: serde_json::Value, _deadline: Duration) -> Result<serde_json::Value, UpstreamError> {
            Ok(serde_json::json!({"ok": true}))
        }
        async fn probe(&self, _e: &ServiceEndpoint, _t: Transport) -> Result<(), UpstreamError> {
            Ok(())
        }
    }

    fn tool() -> Tool {
        Tool {
            fully_qualified_name: FullyQualifiedToolName::new(&ServiceName::new("fs"), "read"),
            local_name: "read".into(),
            description: "Read a file".into(),
            input_schema: Schema::Object { properties: Default::default(), required: vec![] },
            keywords: Default::default(),
        }
    }

    fn config() -> crate::domain::config::GatewayConfig {
        crate::domain::config::GatewayConfig {
            services: vec![ServiceConfig {
                name: "fs".into(),
                image: "fs:latest".into(),
                endpoint: ServiceEndpoint { scheme: "http".into(), host: "localhost".into(), port: 9000, path: "".into() },
                priority: Priority::Normal,
                health_probe: HealthProbe { kind: HealthProbeKind::Http, target: "/healthz".into(), interval_ms: 10, timeout_ms: 10, retries: 1, start_grace_ms: 0 },
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
    async fn empty_tool_cache_fails_fast() {
        let registry = ServiceRegistry::new();
        registry.reload(&config()).unwrap();
        registry.apply_phase(&ServiceName::new("fs"), crate::domain::service::Phase::Running).unwrap();
        let tool_cache = ToolCache::new();
        let advisor = AdvisorClient::new("http://127.0.0.1:1", "m", Duration::from_millis(10));
        let events = EventBus::with_default_capacity();
        let metrics = MetricsStore::new(vec![]);
        let driver: Arc<dyn ContainerDriver> = Arc::new(NoopDriver);
        let supervisor = Supervisor::new(registry.clone(), driver, events.clone(), metrics.clone(), 1_000_000_000);
        let upstream = FakeUpstream;
        let virtual_servers = VirtualServerStore::new();
        let engine = RouterEngine::new(&tool_cache, &advisor, &registry, &supervisor, &upstream, &metrics, &events, &virtual_servers, 3);
        let err = engine.execute("read a file", None, RouterPolicyConfig::default(), None).await.unwrap_err();
        assert!(matches!(err, GatewayError::NoToolsAvailable));
    }

    #[tokio::test]
    async fn routes_to_running_service_successfully() {
        let registry = ServiceRegistry::new();
        registry.reload(&config()).unwrap();
        registry.apply_phase(&ServiceName::new("fs"), crate::domain::service::Phase::Running).unwrap();
        let tool_cache = ToolCache::new();
        tool_cache.refresh(ServiceName::new("fs"), vec![tool()]);
        let advisor = AdvisorClient::new("http://127.0.0.1:1", "m", Duration::from_millis(10));
        let events = EventBus::with_default_capacity();
        let metrics = MetricsStore::new(vec![]);
        let driver: Arc<dyn ContainerDriver> = Arc::new(NoopDriver);
        let supervisor = Supervisor::new(registry.clone(), driver, events.clone(), metrics.clone(), 1_000_000_000);
        let upstream = FakeUpstream;
        let virtual_servers = VirtualServerStore::new();
        let engine = RouterEngine::new(&tool_cache, &advisor, &registry, &supervisor, &upstream, &metrics, &events, &virtual_servers, 3);
        let invocation = engine.execute("read a file", None, RouterPolicyConfig::default(), None).await.unwrap();
        assert!(invocation.succeeded());
    }

    #[tokio::test]
    async fn resolves_named_virtual_server_instead_of_full_snapshot() {
        let registry = ServiceRegistry::new();
        registry.reload(&config()).unwrap();
        registry.apply_phase(&ServiceName::new("fs"), crate::domain::service::Phase::Running).unwrap();
        let tool_cache = ToolCache::new();
        tool_cache.refresh(ServiceName::new("fs"), vec![tool()]);
        tool_cache.refresh(ServiceName::new("other"), vec![Tool {
            fully_qualified_name: FullyQualifiedToolName::new(&ServiceName::new("other"), "unrelated"),
            local_name: "unrelated".into(),
            description: "not a member of the virtual server under test".into(),
            input_schema: Schema::Object { properties: Default::default(), required: vec![] },
            keywords: Default::default(),
        }]);
        let advisor = AdvisorClient::new("http://127.0.0.1:1", "m", Duration::from_millis(10));
        let events = EventBus::with_default_capacity();
        let metrics = MetricsStore::new(vec![]);
        let driver: Arc<dyn ContainerDriver> = Arc::new(NoopDriver);
        let supervisor = Supervisor::new(registry.clone(), driver, events.clone(), metrics.clone(), 1_000_000_000);
        let upstream = FakeUpstream;
        let virtual_servers = VirtualServerStore::new();
        virtual_servers.reload(&crate::domain::config::GatewayConfig {
            services: vec![],
            virtual_servers: vec![crate::domain::config::VirtualServerConfigEntry {
                name: "fs-only".into(),
                enabled: true,
                members: vec![crate::domain::tool::VirtualServerMember::AllToolsOf(ServiceName::new("fs"))],
            }],
            router: RouterPolicyConfig::default(),
            flags: Default::default(),
        });
        let engine = RouterEngine::new(&tool_cache, &advisor, &registry, &supervisor, &upstream, &metrics, &events, &virtual_servers, 3);
        let name = crate::domain::tool::VirtualServerName::new("fs-only");
        let invocation = engine.execute("read a file", Some(&name), RouterPolicyConfig::default(), None).await.unwrap();
        assert_eq!(invocation.target_service, Some(ServiceName::new("fs")));
    }
}
