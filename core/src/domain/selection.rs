// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! The record of one Hybrid Selector decision (spec §3, §4.9).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::tool::FullyQualifiedToolName;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMethod {
    Hybrid,
    AdvisorOnly,
    KeywordFallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub tool: FullyQualifiedToolName,
    pub keyword_score: f64,
    pub advisor_score: Option<f64>,
    pub combined_score: f64,
    pub chosen: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Selection {
    pub task_text: String,
    pub candidates: Vec<Candidate>,
    pub method: SelectionMethod,
    pub advisor_latency_ms: Option<u64>,
    pub advisor_confidence: Option<f64>,
    pub duration_ms: u64,
    pub low_confidence: bool,
    pub recorded_at: DateTime<Utc>,
}

impl Selection {
    pub fn chosen_tool(&self) -> Option<&FullyQualifiedToolName> {
        self.candidates.iter().find(|c| c.chosen).map(|c| &c.tool)
    }

    pub fn ranked(&self) -> Vec<&FullyQualifiedToolName> {
        let mut sorted: Vec<&Candidate> = self.candidates.iter().collect();
        sorted.sort_by(|a, b| {
            b.combined_score
                .partial_cmp(&a.combined_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.keyword_score.partial_cmp(&a.keyword_score).unwrap_or(std::cmp::Ordering::Equal))
                .then_with(|| a.tool.as_str().cmp(b.tool.as_str()))
        });
        sorted.into_iter().map(|c| &c.tool).collect()
    }
}
