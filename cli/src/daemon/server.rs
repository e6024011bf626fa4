// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Composition root: wires every `gateway-core` component together and
//! serves the Control API. This is the only place in the workspace that
//! constructs concrete infrastructure adapters — everything downstream of
//! this function talks to trait objects.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;

use gateway_core::application::registry::ServiceRegistry;
use gateway_core::application::supervisor::Supervisor;
use gateway_core::application::virtual_servers::VirtualServerStore;
use gateway_core::domain::config::GatewayConfig;
use gateway_core::domain::events::{DomainEvent, ServiceEvent};
use gateway_core::domain::service::{Phase, ServiceName};
use gateway_core::infrastructure::advisor_client::AdvisorClient;
use gateway_core::infrastructure::config_loader::ConfigLoader;
use gateway_core::infrastructure::container_driver::{ContainerDriver, DockerContainerDriver};
use gateway_core::infrastructure::event_bus::EventBus;
use gateway_core::infrastructure::feature_flags::FeatureFlags;
use gateway_core::infrastructure::metrics_store::{default_alert_rules, MetricsStore};
use gateway_core::infrastructure::tool_cache::ToolCache;
use gateway_core::infrastructure::upstream_client::{ReqwestUpstreamClient, Transport, UpstreamClient};
use gateway_core::presentation::api::{self, AllowAllValidator, AppState, BearerValidator, SharedSecretValidator};

use super::{remove_pid_file, write_pid_file};

pub fn load_config(path: &PathBuf) -> Result<GatewayConfig> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("failed to read config file {path:?}"))?;
    let document: serde_json::Value = serde_yaml::from_str(&raw).with_context(|| format!("failed to parse config file {path:?}"))?;
    let config = ConfigLoader::from_value(document).context("config validation failed")?;
    Ok(ConfigLoader::apply_env_overrides(config))
}

struct PidFileGuard;

impl Drop for PidFileGuard {
    fn drop(&mut self) {
        let _ = remove_pid_file();
    }
}

pub async fn run_daemon(config_path: PathBuf, host: String, port: u16, token: Option<String>, advisor_endpoint: String, advisor_model: String) -> Result<()> {
    let pid = std::process::id();
    write_pid_file(pid)?;
    let _guard = PidFileGuard;

    info!("gatewayd starting (pid {pid})");

    let config = load_config(&config_path)?;

    let registry = ServiceRegistry::new();
    registry.reload(&config).context("failed to load declared services")?;

    let virtual_servers = VirtualServerStore::new();
    virtual_servers.reload(&config);

    let events = EventBus::with_default_capacity();
    let metrics = MetricsStore::new(default_alert_rules());
    let tool_cache = ToolCache::new();
    let flags = Arc::new(FeatureFlags::from_defaults(config.flags.defaults.clone()));

    let driver: Arc<dyn ContainerDriver> = Arc::new(DockerContainerDriver::connect(None).context("failed to connect to the container runtime")?);
    let upstream: Arc<dyn UpstreamClient> = Arc::new(ReqwestUpstreamClient::new());
    let advisor_client = AdvisorClient::new(advisor_endpoint, advisor_model, Duration::from_millis(config.router.advisor_timeout_ms))
        .with_metrics(metrics.clone());
    let advisor = Arc::new(advisor_client);

    let host_memory_bytes = host_memory_bytes();
    let supervisor = Supervisor::new(registry.clone(), driver.clone(), events.clone(), metrics.clone(), host_memory_bytes);
    supervisor.spawn_all().await;

    spawn_tool_cache_tasks(registry.clone(), tool_cache.clone(), upstream.clone(), events.clone());

    let auth: Arc<dyn BearerValidator> =
        match token { Some(secret) => Arc::new(SharedSecretValidator::new(secret)), None => Arc::new(AllowAllValidator) };

    let state = AppState {
        registry,
        supervisor,
        virtual_servers,
        tool_cache,
        advisor,
        driver,
        upstream,
        metrics,
        events,
        flags,
        router_policy: config.router.clone(),
        auth,
    };

    let listener = TcpListener::bind((host.as_str(), port)).await.with_context(|| format!("failed to bind {host}:{port}"))?;
    info!("Control API listening on {host}:{port}");

    axum::serve(listener, api::app(state)).with_graceful_shutdown(shutdown_signal()).await.context("Control API server failed")?;

    Ok(())
}

const TOOL_CACHE_REFRESH_INTERVAL: Duration = Duration::from_secs(300);

/// Wires the Tool Cache into the running system (spec §4.6): one task
/// refreshes a service's catalogue the moment it reaches RUNNING, another
/// sweeps every currently-RUNNING service on a 5-minute interval so a
/// silently-changed upstream catalogue is eventually picked up too.
fn spawn_tool_cache_tasks(
    registry: ServiceRegistry,
    tool_cache: ToolCache,
    upstream: Arc<dyn UpstreamClient>,
    events: EventBus,
) {
    let event_registry = registry.clone();
    let event_cache = tool_cache.clone();
    let event_upstream = upstream.clone();
    tokio::spawn(async move {
        let mut receiver = events.subscribe();
        loop {
            match receiver.recv().await {
                Ok(DomainEvent::Service(ServiceEvent::PhaseChanged { service, to: Phase::Running, .. })) => {
                    if let Ok(svc) = event_registry.get(&service) {
                        discover_and_cache_tools(&event_cache, event_upstream.as_ref(), &svc.name, &svc.endpoint).await;
                    }
                }
                Ok(_) => continue,
                Err(_) => break,
            }
        }
    });

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(TOOL_CACHE_REFRESH_INTERVAL);
        interval.tick().await;
        loop {
            interval.tick().await;
            for service in registry.list() {
                if service.phase == Phase::Running {
                    discover_and_cache_tools(&tool_cache, upstream.as_ref(), &service.name, &service.endpoint).await;
                }
            }
        }
    });
}

async fn discover_and_cache_tools(
    tool_cache: &ToolCache,
    upstream: &dyn UpstreamClient,
    service: &ServiceName,
    endpoint: &gateway_core::domain::service::ServiceEndpoint,
) {
    match upstream.list_tools(service, endpoint, Transport::Http).await {
        Ok(tools) => tool_cache.refresh(service.clone(), tools),
        Err(e) => tracing::warn!(service = %service, error = %e, "tool discovery failed"),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async { tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler") };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).expect("failed to install SIGTERM handler").recv().await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

fn host_memory_bytes() -> u64 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(contents) = std::fs::read_to_string("/proc/meminfo") {
            for line in contents.lines() {
                if let Some(rest) = line.strip_prefix("MemTotal:") {
                    if let Some(kb) = rest.trim().split_whitespace().next().and_then(|v| v.parse::<u64>().ok()) {
                        return kb * 1024;
                    }
                }
            }
        }
    }
    0
}
