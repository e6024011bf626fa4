// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! HTTP client for the local language-model completion endpoint (C8,
//! spec §4.8). The reply must be machine-parseable; per spec §9 the
//! implementer must enforce strict parsing and treat any deviation as
//! `Unavailable` rather than attempting a lenient salvage.

use std::time::Duration;

use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use super::metrics_store::MetricsStore;

#[derive(Debug, Clone)]
pub struct AdvisorCandidate {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct RankedCandidate {
    pub name: String,
    pub confidence: f64,
    pub reason: Option<String>,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AdvisorError {
    #[error("advisor call timed out")]
    Timeout,
    #[error("advisor reply did not parse: {0}")]
    ParseFailure(String),
    #[error("advisor endpoint unreachable: {0}")]
    Unreachable(String),
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
}

#[derive(Deserialize)]
struct CompletionResponse {
    response: String,
}

/// One line per candidate: `name<TAB>confidence<TAB>reason?`. Strict and
/// trivially greppable — the point is that a free-text model either
/// produces this exactly or the reply is rejected outright.
#[derive(Deserialize)]
struct ParsedLine {
    name: String,
    confidence: f64,
    reason: Option<String>,
}

fn render_prompt(task_text: &str, candidates: &[AdvisorCandidate]) -> String {
    let mut prompt = String::new();
    prompt.push_str("Task: ");
    prompt.push_str(task_text);
    prompt.push_str("\n\nCandidate tools:\n");
    for (i, candidate) in candidates.iter().enumerate() {
        prompt.push_str(&format!("{}. {} - {}\n", i + 1, candidate.name, candidate.description));
    }
    prompt.push_str(
        "\nReply with one JSON object per line, each exactly \
         {\"name\": <candidate name>, \"confidence\": <0..1>, \"reason\": <string or null>}. \
         Only rank candidates from the list above. No other text.\n",
    );
    prompt
}

fn parse_reply(reply: &str, offered: &[AdvisorCandidate]) -> Result<Vec<RankedCandidate>, AdvisorError> {
    let offered_names: std::collections::HashSet<&str> =
        offered.iter().map(|c| c.name.as_str()).collect();
    let mut ranked = Vec::new();
    for line in reply.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let parsed: ParsedLine = serde_json::from_str(line)
            .map_err(|e| AdvisorError::ParseFailure(format!("line {line:?}: {e}")))?;
        if !(0.0..=1.0).contains(&parsed.confidence) {
            return Err(AdvisorError::ParseFailure(format!(
                "confidence out of range: {}",
                parsed.confidence
            )));
        }
        if !offered_names.contains(parsed.name.as_str()) {
            return Err(AdvisorError::ParseFailure(format!(
                "candidate {:?} not in offered set",
                parsed.name
            )));
        }
        ranked.push(RankedCandidate { name: parsed.name, confidence: parsed.confidence, reason: parsed.reason });
    }
    if ranked.is_empty() {
        return Err(AdvisorError::ParseFailure("empty ranked list".into()));
    }
    Ok(ranked)
}

pub struct AdvisorClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    timeout: Duration,
    metrics: Option<MetricsStore>,
}

impl AdvisorClient {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            // Pooled connections (default pool size 4, spec §5); reqwest
            // pools per-host automatically, we just cap idle connections.
            client: reqwest::Client::builder()
                .pool_max_idle_per_host(4)
                .build()
                .expect("reqwest client builds with default TLS backend"),
            endpoint: endpoint.into(),
            model: model.into(),
            timeout,
            metrics: None,
        }
    }

    /// Routes `advisor.error` into the shared `MetricsStore` so the
    /// `AdvisorUnavailable` alert rule (spec §4.4) actually fires; the
    /// `metrics` crate macros elsewhere in this file keep feeding the
    /// Prometheus exporter independently.
    pub fn with_metrics(mut self, metrics: MetricsStore) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn record_error(&self, kind: &str) {
        counter!("advisor.error", "kind" => kind.to_string()).increment(1);
        if let Some(metrics) = &self.metrics {
            let mut tags = crate::domain::metrics::Tags::new();
            tags.insert("kind".into(), kind.into());
            metrics.counter("advisor.error", tags, 1.0);
        }
    }

    pub async fn rank(
        &self,
        task_text: &str,
        candidates: &[AdvisorCandidate],
    ) -> Result<Vec<RankedCandidate>, AdvisorError> {
        let prompt = render_prompt(task_text, candidates);
        let reply = self.complete(prompt, self.timeout).await?;
        match parse_reply(&reply, candidates) {
            Ok(ranked) => Ok(ranked),
            Err(e) => {
                warn!(error = %e, "advisor reply failed strict parse");
                self.record_error("ParseFailure");
                Err(e)
            }
        }
    }

    /// The raw completion call shared by tool ranking (`rank`) and the
    /// Argument Builder's missing-field pass (C10 step 3), which renders
    /// its own prompt and applies its own timeout.
    pub async fn complete(&self, prompt: String, timeout: Duration) -> Result<String, AdvisorError> {
        counter!("advisor.call").increment(1);
        let request = CompletionRequest { model: &self.model, prompt, stream: false };

        let started = std::time::Instant::now();
        let outcome = tokio::time::timeout(
            timeout,
            self.client
                .post(format!("{}/api/generate", self.endpoint))
                .json(&request)
                .send(),
        )
        .await;
        histogram!("advisor.latency").record(started.elapsed().as_secs_f64() * 1000.0);

        let response = match outcome {
            Err(_elapsed) => {
                self.record_error("Timeout");
                return Err(AdvisorError::Timeout);
            }
            Ok(Err(e)) => {
                self.record_error("Unreachable");
                return Err(AdvisorError::Unreachable(e.to_string()));
            }
            Ok(Ok(response)) => response,
        };

        let body: CompletionResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                self.record_error("ParseFailure");
                return Err(AdvisorError::ParseFailure(e.to_string()));
            }
        };

        Ok(body.response)
    }

    pub async fn health_check(&self) -> Result<(), AdvisorError> {
        self.client
            .get(format!("{}/api/tags", self.endpoint))
            .send()
            .await
            .map(|_| ())
            .map_err(|e| AdvisorError::Unreachable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates() -> Vec<AdvisorCandidate> {
        vec![
            AdvisorCandidate { name: "fs/read".into(), description: "Read a file".into() },
            AdvisorCandidate { name: "fs/write".into(), description: "Write a file".into() },
        ]
    }

    #[test]
    fn rejects_candidates_outside_offered_set() {
        let reply = r#"{"name":"git/status","confidence":0.9,"reason":null}"#;
        let err = parse_reply(reply, &candidates()).unwrap_err();
        assert!(matches!(err, AdvisorError::ParseFailure(_)));
    }

    #[test]
    fn rejects_out_of_range_confidence() {
        let reply = r#"{"name":"fs/read","confidence":1.5,"reason":null}"#;
        let err = parse_reply(reply, &candidates()).unwrap_err();
        assert!(matches!(err, AdvisorError::ParseFailure(_)));
    }

    #[test]
    fn accepts_well_formed_multi_line_reply() {
        let reply = "{\"name\":\"fs/read\",\"confidence\":0.9,\"reason\":null}\n\
                      {\"name\":\"fs/write\",\"confidence\":0.2,\"reason\":\"less likely\"}";
        let ranked = parse_reply(reply, &candidates()).unwrap();
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].name, "fs/read");
    }

    #[test]
    fn rejects_non_json_lines_without_salvage() {
        let reply = "fs/read is probably right, confidence high";
        assert!(parse_reply(reply, &candidates()).is_err());
    }
}
