// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! The record of one end-to-end route through the Router Engine (spec §3,
//! §4.11).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::ErrorKind;
use super::selection::Selection;
use super::service::ServiceName;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invocation {
    pub task_text: String,
    pub selection: Selection,
    pub arguments_built: Option<serde_json::Value>,
    pub target_service: Option<ServiceName>,
    pub result: Option<serde_json::Value>,
    pub error_kind: Option<ErrorKind>,
    pub total_latency_ms: u64,
    pub wake_required: bool,
    pub wake_latency_ms: Option<u64>,
}

impl Invocation {
    pub fn succeeded(&self) -> bool {
        self.error_kind.is_none() && self.result.is_some()
    }
}
