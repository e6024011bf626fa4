// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! HTTP client for the running daemon's Control API (C12, spec §6.1).
//! Every response is unwrapped from the `{ ok, data?, error? }` envelope
//! here so command handlers work with plain `serde_json::Value`s.

use anyhow::{bail, Context, Result};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct GatewayClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl GatewayClient {
    pub fn new(host: &str, port: u16, token: Option<String>) -> Result<Self> {
        let client = Client::builder().build().context("failed to build HTTP client")?;
        let base_url =
            if host.starts_with("http://") || host.starts_with("https://") { format!("{host}:{port}") } else { format!("http://{host}:{port}") };
        Ok(Self { client, base_url, token })
    }

    async fn unwrap_envelope(response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        let body: Value = response.json().await.context("failed to parse daemon response")?;
        if !status.is_success() || body.get("ok").and_then(Value::as_bool) != Some(true) {
            let message = body.pointer("/error/message").and_then(Value::as_str).unwrap_or("unknown error");
            bail!("daemon returned {status}: {message}");
        }
        Ok(body.get("data").cloned().unwrap_or(Value::Null))
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    pub async fn health(&self) -> Result<Value> {
        let resp = self.client.get(format!("{}/api/health", self.base_url)).send().await.context("health check failed")?;
        Self::unwrap_envelope(resp).await
    }

    pub async fn list_services(&self) -> Result<Value> {
        let resp = self.authorize(self.client.get(format!("{}/api/services", self.base_url))).send().await.context("failed to list services")?;
        Self::unwrap_envelope(resp).await
    }

    pub async fn enable_service(&self, name: &str) -> Result<Value> {
        self.post_empty(&format!("/api/services/{name}/enable")).await
    }

    pub async fn disable_service(&self, name: &str) -> Result<Value> {
        self.post_empty(&format!("/api/services/{name}/disable")).await
    }

    pub async fn wake_service(&self, name: &str) -> Result<Value> {
        self.post_empty(&format!("/api/services/{name}/wake")).await
    }

    pub async fn sleep_service(&self, name: &str) -> Result<Value> {
        self.post_empty(&format!("/api/services/{name}/sleep")).await
    }

    pub async fn list_flags(&self) -> Result<Value> {
        let resp = self.authorize(self.client.get(format!("{}/api/flags", self.base_url))).send().await.context("failed to list flags")?;
        Self::unwrap_envelope(resp).await
    }

    pub async fn set_flag(&self, name: &str, value: bool) -> Result<Value> {
        #[derive(Serialize)]
        struct Body {
            value: bool,
        }
        let resp = self
            .authorize(self.client.post(format!("{}/api/flags/{name}", self.base_url)))
            .json(&Body { value })
            .send()
            .await
            .with_context(|| format!("failed to set flag {name}"))?;
        Self::unwrap_envelope(resp).await
    }

    async fn post_empty(&self, path: &str) -> Result<Value> {
        let resp =
            self.authorize(self.client.post(format!("{}{}", self.base_url, path))).send().await.with_context(|| format!("request to {path} failed"))?;
        Self::unwrap_envelope(resp).await
    }
}
