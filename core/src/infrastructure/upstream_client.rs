// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Invokes tools on upstream MCP servers, lists their catalogues, and
//! health-probes them (C5, spec §4.5).

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::domain::schema::Schema;
use crate::domain::service::{ServiceEndpoint, ServiceName};
use crate::domain::tool::{FullyQualifiedToolName, Tool};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Http,
    HttpSse,
    StdioOverSocket,
}

#[derive(Debug, Error, Clone)]
pub enum UpstreamError {
    #[error("transient network error: {0}")]
    NetworkTransient(String),
    #[error("upstream busy")]
    UpstreamBusy,
    #[error("arguments violate the tool's schema: {0}")]
    SchemaViolation(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("operation exceeded its deadline")]
    Timeout,
}

impl UpstreamError {
    /// Per-kind retry policy (spec §4.5): transient network errors get up
    /// to 2 retries with 100ms/300ms backoff; busy gets a single retry
    /// after 250ms; schema/auth errors never retry.
    pub fn retry_backoffs(&self) -> &'static [Duration] {
        match self {
            UpstreamError::NetworkTransient(_) => &[Duration::from_millis(100), Duration::from_millis(300)],
            UpstreamError::UpstreamBusy => &[Duration::from_millis(250)],
            UpstreamError::SchemaViolation(_) | UpstreamError::Unauthorized | UpstreamError::Timeout => &[],
        }
    }
}

#[derive(Debug, Serialize)]
struct ToolListRequest;

/// The catalogue entry shape an upstream MCP server is expected to return
/// from `GET /tools`. `input_schema` is kept as a raw value rather than
/// `Schema` directly: an upstream that doesn't speak this gateway's exact
/// schema dialect still gets a tool entry, just with a permissive schema.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTool {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    input_schema: Option<serde_json::Value>,
    #[serde(default)]
    keywords: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ToolListResponse {
    tools: Vec<RawTool>,
}

fn permissive_object_schema() -> Schema {
    Schema::Object { properties: Default::default(), required: Vec::new() }
}

fn raw_tool_to_domain(service: &ServiceName, raw: RawTool) -> Tool {
    let input_schema = raw
        .input_schema
        .and_then(|value| serde_json::from_value::<Schema>(value).ok())
        .unwrap_or_else(permissive_object_schema);
    Tool {
        fully_qualified_name: FullyQualifiedToolName::new(service, &raw.name),
        local_name: raw.name,
        description: raw.description,
        input_schema,
        keywords: raw.keywords.into_iter().collect::<BTreeSet<_>>(),
    }
}

#[async_trait::async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn list_tools(&self, service: &ServiceName, endpoint: &ServiceEndpoint, transport: Transport) -> Result<Vec<Tool>, UpstreamError>;
    async fn invoke(
        &self,
        endpoint: &ServiceEndpoint,
        transport: Transport,
        local_tool_name: &str,
        arguments: serde_json::Value,
        deadline: Duration,
    ) -> Result<serde_json::Value, UpstreamError>;
    async fn probe(&self, endpoint: &ServiceEndpoint, transport: Transport) -> Result<(), UpstreamError>;
}

/// Default transport implementation. `HttpSse`/`StdioOverSocket` reduce to
/// the same JSON-RPC-ish request/response contract over their respective
/// byte streams; only the HTTP path is exercised by tests here, the other
/// two are documented seams for a follow-on transport.
pub struct ReqwestUpstreamClient {
    client: reqwest::Client,
}

impl ReqwestUpstreamClient {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }

    fn base_url(endpoint: &ServiceEndpoint) -> String {
        format!("{}://{}:{}{}", endpoint.scheme, endpoint.host, endpoint.port, endpoint.path)
    }

    fn map_transport_error(error: reqwest::Error) -> UpstreamError {
        if error.is_timeout() {
            UpstreamError::Timeout
        } else if error.is_connect() {
            UpstreamError::NetworkTransient(error.to_string())
        } else if let Some(status) = error.status() {
            match status.as_u16() {
                401 | 403 => UpstreamError::Unauthorized,
                422 | 400 => UpstreamError::SchemaViolation(error.to_string()),
                429 | 503 => UpstreamError::UpstreamBusy,
                _ => UpstreamError::NetworkTransient(error.to_string()),
            }
        } else {
            UpstreamError::NetworkTransient(error.to_string())
        }
    }
}

impl Default for ReqwestUpstreamClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl UpstreamClient for ReqwestUpstreamClient {
    async fn list_tools(&self, service: &ServiceName, endpoint: &ServiceEndpoint, transport: Transport) -> Result<Vec<Tool>, UpstreamError> {
        if !matches!(transport, Transport::Http | Transport::HttpSse) {
            warn!(?transport, "non-HTTP transport not implemented by this client");
            return Ok(vec![]);
        }
        let url = format!("{}/tools", Self::base_url(endpoint));
        let response = self.client.get(&url).send().await.map_err(Self::map_transport_error)?;
        let body: ToolListResponse = response.json().await.map_err(|e| UpstreamError::NetworkTransient(e.to_string()))?;
        Ok(body.tools.into_iter().map(|raw| raw_tool_to_domain(service, raw)).collect())
    }

    async fn invoke(
        &self,
        endpoint: &ServiceEndpoint,
        transport: Transport,
        local_tool_name: &str,
        arguments: serde_json::Value,
        deadline: Duration,
    ) -> Result<serde_json::Value, UpstreamError> {
        if !matches!(transport, Transport::Http | Transport::HttpSse) {
            return Err(UpstreamError::NetworkTransient("unsupported transport".into()));
        }
        let url = format!("{}/tools/{}/invoke", Self::base_url(endpoint), local_tool_name);
        let response = tokio::time::timeout(deadline, self.client.post(&url).json(&arguments).send())
            .await
            .map_err(|_| UpstreamError::Timeout)?
            .map_err(Self::map_transport_error)?;
        if !response.status().is_success() {
            return Err(Self::map_transport_error(
                response.error_for_status().unwrap_err(),
            ));
        }
        response.json().await.map_err(|e| UpstreamError::NetworkTransient(e.to_string()))
    }

    async fn probe(&self, endpoint: &ServiceEndpoint, transport: Transport) -> Result<(), UpstreamError> {
        if !matches!(transport, Transport::Http | Transport::HttpSse) {
            return Ok(());
        }
        let url = format!("{}/health", Self::base_url(endpoint));
        self.client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map(|_| ())
            .map_err(Self::map_transport_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_transient_gets_two_backoffs() {
        let err = UpstreamError::NetworkTransient("reset".into());
        assert_eq!(err.retry_backoffs().len(), 2);
    }

    #[test]
    fn schema_violation_never_retries() {
        let err = UpstreamError::SchemaViolation("missing field".into());
        assert!(err.retry_backoffs().is_empty());
    }

    #[test]
    fn busy_gets_single_retry() {
        assert_eq!(UpstreamError::UpstreamBusy.retry_backoffs().len(), 1);
    }
}
