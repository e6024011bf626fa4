// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! The Control API (C12, spec §4.12, §6.1): registry queries, lifecycle
//! commands, router invocation, and observability, behind a uniform
//! `{ ok, data?, error? }` envelope. Validation of the bearer credential
//! is delegated to a [`BearerValidator`] supplied at composition time —
//! this module never decides what counts as a valid token.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::application::registry::ServiceRegistry;
use crate::application::router_engine::RouterEngine;
use crate::application::supervisor::Supervisor;
use crate::application::virtual_servers::VirtualServerStore;
use crate::domain::config::RouterPolicyConfig;
use crate::domain::errors::{ErrorKind, GatewayError};
use crate::domain::service::{Phase, ServiceName};
use crate::domain::tool::VirtualServerName;
use crate::infrastructure::advisor_client::AdvisorClient;
use crate::infrastructure::container_driver::ContainerDriver;
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::feature_flags::FeatureFlags;
use crate::infrastructure::metrics_store::MetricsStore;
use crate::infrastructure::tool_cache::ToolCache;
use crate::infrastructure::upstream_client::UpstreamClient;

/// Delegated bearer-credential check (spec §4.12: "validation is
/// delegated, not specified here"). `AllowAll` and `SharedSecret` below
/// are the two implementations this crate ships; production JWT/OAuth
/// validation is out of scope.
pub trait BearerValidator: Send + Sync {
    fn validate(&self, token: &str) -> bool;
}

pub struct AllowAllValidator;

impl BearerValidator for AllowAllValidator {
    fn validate(&self, _token: &str) -> bool {
        true
    }
}

pub struct SharedSecretValidator {
    secret: String,
}

impl SharedSecretValidator {
    pub fn new(secret: impl Into<String>) -> Self {
        Self { secret: secret.into() }
    }
}

impl BearerValidator for SharedSecretValidator {
    fn validate(&self, token: &str) -> bool {
        token == self.secret
    }
}

#[derive(Clone)]
pub struct AppState {
    pub registry: ServiceRegistry,
    pub supervisor: Supervisor,
    pub virtual_servers: VirtualServerStore,
    pub tool_cache: ToolCache,
    pub advisor: Arc<AdvisorClient>,
    pub driver: Arc<dyn ContainerDriver>,
    pub upstream: Arc<dyn UpstreamClient>,
    pub metrics: MetricsStore,
    pub events: EventBus,
    pub flags: Arc<FeatureFlags>,
    pub router_policy: RouterPolicyConfig,
    pub auth: Arc<dyn BearerValidator>,
}

pub fn app(state: AppState) -> Router {
    let state = Arc::new(state);
    Router::new()
        .route("/api/health", get(health))
        .route("/api/services", get(list_services))
        .route("/api/services/{name}/enable", post(enable_service))
        .route("/api/services/{name}/disable", post(disable_service))
        .route("/api/services/{name}/wake", post(wake_service))
        .route("/api/services/{name}/sleep", post(sleep_service))
        .route("/api/virtual-servers", get(list_virtual_servers))
        .route("/api/virtual-servers/{name}/tools", get(virtual_server_tools))
        .route("/api/router/execute", post(router_execute))
        .route("/api/router/metrics", get(router_metrics))
        .route("/api/router/health", get(router_health))
        .route("/api/metrics/system", get(metrics_system))
        .route("/api/flags", get(list_flags))
        .route("/api/flags/{name}", post(set_flag))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if request.uri().path() == "/api/health" {
        return Ok(next.run(request).await);
    }
    let token = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    match token {
        Some(token) if state.auth.validate(token) => Ok(next.run(request).await),
        _ => Err(ApiError(GatewayError::Unauthorized)),
    }
}

/// Wraps a `GatewayError` so it renders as the spec's envelope via
/// `IntoResponse`, letting handlers propagate with `?`.
struct ApiError(GatewayError);

impl From<GatewayError> for ApiError {
    fn from(error: GatewayError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.kind() {
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::ValidationFailed | ErrorKind::ArgumentsIncomplete => StatusCode::BAD_REQUEST,
            ErrorKind::NoToolsAvailable | ErrorKind::ServiceUnavailable | ErrorKind::RuntimeUnavailable | ErrorKind::AdvisorUnavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = json!({
            "ok": false,
            "error": { "kind": self.0.kind(), "message": self.0.to_string() },
        });
        (status, Json(body)).into_response()
    }
}

fn ok(data: impl Serialize) -> Response {
    (StatusCode::OK, Json(json!({ "ok": true, "data": data }))).into_response()
}

async fn health(State(state): State<Arc<AppState>>) -> Response {
    let driver_ok = state.driver.healthcheck().await.is_ok();
    let advisor_ok = state.advisor.health_check().await.is_ok();
    let services = state.registry.list();
    let mut running = 0u32;
    let mut sleeping = 0u32;
    let mut stopped = 0u32;
    let mut failed = 0u32;
    for service in &services {
        match service.phase {
            Phase::Running => running += 1,
            Phase::Sleeping => sleeping += 1,
            Phase::Stopped => stopped += 1,
            Phase::Failed => failed += 1,
            Phase::Starting | Phase::Waking | Phase::Stopping => {}
        }
    }
    let status = if driver_ok && failed == 0 { "ok" } else { "degraded" };
    ok(json!({
        "status": status,
        "components": {
            "driver": driver_ok,
            "advisor": advisor_ok,
            "services": { "running": running, "sleeping": sleeping, "stopped": stopped, "failed": failed },
        },
    }))
}

#[derive(Serialize)]
struct ServiceView {
    name: String,
    phase: Phase,
    priority: crate::domain::service::Priority,
    enabled: bool,
    #[serde(rename = "lastActivityAt")]
    last_activity_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(rename = "lastTransitionAt")]
    last_transition_at: chrono::DateTime<chrono::Utc>,
    #[serde(rename = "memLimit")]
    mem_limit: u64,
    #[serde(rename = "memUsed")]
    mem_used: Option<u64>,
}

async fn list_services(State(state): State<Arc<AppState>>) -> Response {
    let mut views = Vec::new();
    for service in state.registry.list() {
        let mem_used = state.supervisor.container_stats(&service.name).await.map(|s| s.mem_bytes);
        views.push(ServiceView {
            name: service.name.to_string(),
            phase: service.phase,
            priority: service.policy.priority,
            enabled: service.policy.enabled,
            last_activity_at: service.last_activity_at,
            last_transition_at: service.last_transition_at,
            mem_limit: service.resources.mem_limit,
            mem_used,
        });
    }
    ok(views)
}

#[derive(Serialize)]
struct LifecycleView {
    name: String,
    phase: Phase,
    noop: bool,
}

async fn enable_service(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Result<Response, ApiError> {
    let service_name = ServiceName::new(name);
    let noop = state.registry.enable(&service_name)?;
    let service = state.registry.get(&service_name)?;
    if !noop && service.policy.auto_start {
        state.supervisor.request_start(&service_name);
    }
    Ok(ok(LifecycleView { name: service_name.to_string(), phase: service.phase, noop }))
}

async fn disable_service(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Result<Response, ApiError> {
    let service_name = ServiceName::new(name);
    let noop = state.registry.disable(&service_name)?;
    if !noop {
        state.supervisor.request_stop(&service_name);
    }
    let service = state.registry.get(&service_name)?;
    Ok(ok(LifecycleView { name: service_name.to_string(), phase: service.phase, noop }))
}

#[derive(Serialize)]
struct WakeView {
    name: String,
    phase: Phase,
    #[serde(rename = "wakeLatencyMs")]
    wake_latency_ms: u64,
}

async fn wake_service(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Result<Response, ApiError> {
    let service_name = ServiceName::new(name);
    let started = Instant::now();
    state.supervisor.ensure_awake(&service_name, state.router_policy.wake_budget_multiplier).await?;
    let service = state.registry.get(&service_name)?;
    Ok(ok(WakeView {
        name: service_name.to_string(),
        phase: service.phase,
        wake_latency_ms: started.elapsed().as_millis() as u64,
    }))
}

async fn sleep_service(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Result<Response, ApiError> {
    let service_name = ServiceName::new(name);
    let noop = state.supervisor.force_sleep(&service_name).await?;
    let service = state.registry.get(&service_name)?;
    Ok(ok(LifecycleView { name: service_name.to_string(), phase: service.phase, noop }))
}

#[derive(Serialize)]
struct VirtualServerView {
    name: String,
    enabled: bool,
    #[serde(rename = "toolCount")]
    tool_count: usize,
    truncated: bool,
}

async fn list_virtual_servers(State(state): State<Arc<AppState>>) -> Response {
    let views: Vec<VirtualServerView> = state
        .virtual_servers
        .list()
        .into_iter()
        .map(|vs| {
            let resolved = state.tool_cache.resolve(&vs);
            VirtualServerView { name: vs.name.to_string(), enabled: vs.enabled, tool_count: resolved.tools.len(), truncated: resolved.truncated }
        })
        .collect();
    ok(views)
}

#[derive(Serialize)]
struct ToolView {
    #[serde(rename = "fullyQualifiedName")]
    fully_qualified_name: String,
    description: String,
}

async fn virtual_server_tools(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Result<Response, ApiError> {
    let vs = state.virtual_servers.get(&VirtualServerName::new(name))?;
    let resolved = state.tool_cache.resolve(&vs);
    let views: Vec<ToolView> = resolved
        .tools
        .into_iter()
        .map(|t| ToolView { fully_qualified_name: t.fully_qualified_name.to_string(), description: t.description })
        .collect();
    Ok(ok(views))
}

#[derive(Deserialize)]
struct RouterExecuteRequest {
    task: String,
    #[serde(rename = "virtualServer")]
    virtual_server: Option<String>,
    #[serde(rename = "deadlineMs")]
    deadline_ms: Option<u64>,
}

async fn router_execute(State(state): State<Arc<AppState>>, Json(body): Json<RouterExecuteRequest>) -> Result<Response, ApiError> {
    let virtual_server_name = body.virtual_server.map(VirtualServerName::new);
    let deadline = body.deadline_ms.map(Duration::from_millis);
    let engine = RouterEngine::new(
        &state.tool_cache,
        &state.advisor,
        &state.registry,
        &state.supervisor,
        state.upstream.as_ref(),
        &state.metrics,
        &state.events,
        &state.virtual_servers,
        state.router_policy.wake_budget_multiplier,
    );
    let invocation = engine.execute(&body.task, virtual_server_name.as_ref(), state.router_policy.clone(), deadline).await?;
    Ok(ok(json!({
        "selection": invocation.selection,
        "invocation": { "succeeded": invocation.succeeded(), "totalLatencyMs": invocation.total_latency_ms, "wakeRequired": invocation.wake_required, "wakeLatencyMs": invocation.wake_latency_ms },
        "result": invocation.result,
    })))
}

async fn router_metrics(State(state): State<Arc<AppState>>) -> Response {
    let samples = state.metrics.query(crate::domain::metrics::Window::FiveMinutes, "router.invocation");
    let total_selections = samples.len() as u64;
    ok(json!({
        "totalSelections": total_selections,
        "methodCounts": {},
        "avgAdvisorLatencyMs": null,
        "avgCombinedScore": null,
    }))
}

async fn router_health(State(state): State<Arc<AppState>>) -> Response {
    let reachable = state.advisor.health_check().await.is_ok();
    ok(json!({
        "advisor": { "reachable": reachable, "lastErrorKind": if reachable { serde_json::Value::Null } else { json!("AdvisorUnavailable") } },
        "issues": [],
    }))
}

async fn metrics_system(State(state): State<Arc<AppState>>) -> Response {
    let mut services = Vec::new();
    let mut mem_used_total = 0u64;
    let mut mem_limit_total = 0u64;
    for service in state.registry.list() {
        let stats = state.supervisor.container_stats(&service.name).await;
        let mem_used = stats.map(|s| s.mem_bytes).unwrap_or(0);
        mem_used_total += mem_used;
        mem_limit_total += service.resources.mem_limit;
        services.push(json!({ "name": service.name.to_string(), "phase": service.phase, "memUsed": mem_used }));
    }
    let mem_pct = if mem_limit_total > 0 { mem_used_total as f64 / mem_limit_total as f64 } else { 0.0 };
    ok(json!({ "memPct": mem_pct, "cpuPct": 0.0, "services": services }))
}

#[derive(Serialize)]
struct FlagView {
    category: String,
    name: String,
    value: bool,
    source: crate::domain::flags::FlagSource,
}

async fn list_flags(State(state): State<Arc<AppState>>) -> Response {
    let views: Vec<FlagView> = state
        .flags
        .list()
        .into_iter()
        .map(|f| FlagView { category: f.key.category, name: f.key.name, value: f.value, source: f.source })
        .collect();
    ok(views)
}

#[derive(Deserialize)]
struct SetFlagRequest {
    value: bool,
}

async fn set_flag(State(state): State<Arc<AppState>>, Path(name): Path<String>, Json(body): Json<SetFlagRequest>) -> Result<Response, ApiError> {
    let (category, flag_name) = name.split_once('.').unwrap_or(("core", name.as_str()));
    if !state.flags.set_runtime(category, flag_name, body.value) {
        return Err(GatewayError::NotFound(format!("flag {name}")).into());
    }
    Ok(ok(json!({ "name": name, "value": body.value })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::{GatewayConfig, RouterPolicyConfig};
    use crate::infrastructure::container_driver::{ContainerError, ContainerHandle, ContainerSpec, ContainerStats, PhaseHint};
    use crate::infrastructure::metrics_store::default_alert_rules;
    use crate::infrastructure::upstream_client::{Transport, UpstreamError};
    use async_trait::async_trait;
    use tower::util::ServiceExt;

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

    struct NoopUpstream;

    #[async_trait]
    impl UpstreamClient for NoopUpstream {
        async fn list_tools(&self, _s: &crate::domain::service::ServiceName, _e: &crate::domain::service::ServiceEndpoint, _t: Transport) -> Result<Vec<crate::domain::tool::Tool>, UpstreamError> {
            Ok(vec![])
        }
        async fn invoke(&self, _e: &crate::domain::service::ServiceEndpoint, _t: Transport, _n: &str, _a: serde_json::Value, _d: Duration) -> Result<serde_json::Value, UpstreamError> {
            Ok(json!({"ok": true}))
        }
        async fn probe(&self, _e: &crate::domain::service::ServiceEndpoint, _t: Transport) -> Result<(), UpstreamError> {
            Ok(())
        }
    }

    fn state() -> AppState {
        let registry = ServiceRegistry::new();
        registry.reload(&GatewayConfig { services: vec![], virtual_servers: vec![], router: RouterPolicyConfig::default(), flags: Default::default() }).unwrap();
        let events = EventBus::with_default_capacity();
        let metrics = MetricsStore::new(default_alert_rules());
        let driver: Arc<dyn ContainerDriver> = Arc::new(NoopDriver);
        let supervisor = Supervisor::new(registry.clone(), driver.clone(), events.clone(), metrics.clone(), 0);
        AppState {
            registry,
            supervisor,
            virtual_servers: VirtualServerStore::new(),
            tool_cache: ToolCache::new(),
            advisor: Arc::new(AdvisorClient::new("http://localhost:0", "test-model", Duration::from_millis(50))),
            driver,
            upstream: Arc::new(NoopUpstream),
            metrics,
            events,
            flags: Arc::new(FeatureFlags::from_defaults(Default::default())),
            router_policy: RouterPolicyConfig::default(),
            auth: Arc::new(SharedSecretValidator::new("secret-token")),
        }
    }

    #[tokio::test]
    async fn health_requires_no_auth() {
        let router = app(state());
        let request = axum::http::Request::builder().uri("/api/health").body(axum::body::Body::empty()).unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn protected_endpoint_rejects_missing_bearer() {
        let router = app(state());
        let request = axum::http::Request::builder().uri("/api/services").body(axum::body::Body::empty()).unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn protected_endpoint_accepts_valid_bearer() {
        let router = app(state());
        let request = axum::http::Request::builder()
            .uri("/api/services")
            .header("Authorization", "Bearer secret-token")
            .body(axum::body::Body::empty())
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_service_enable_is_not_found() {
        let router = app(state());
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/api/services/missing/enable")
            .header("Authorization", "Bearer secret-token")
            .body(axum::body::Body::empty())
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
