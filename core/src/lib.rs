// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # gateway-core
//!
//! The MCP Aggregation Gateway's runtime: a Tool-Router core that picks
//! and invokes the right upstream tool for a task, and a Service-Lifecycle
//! core that starts, sleeps, wakes, and restarts the containers backing
//! those tools on demand.
//!
//! ## Components
//!
//! | Component | Module | Spec ref |
//! |---|---|---|
//! | Container Driver | [`infrastructure::container_driver`] | C1 |
//! | Service Registry | [`application::registry`] | C2 |
//! | Service Supervisor | [`application::supervisor`] | C3 |
//! | Metrics Store | [`infrastructure::metrics_store`] | C4 |
//! | Upstream Client | [`infrastructure::upstream_client`] | C5 |
//! | Tool Cache | [`infrastructure::tool_cache`] | C6 |
//! | Keyword Scorer | [`application::keyword_scorer`] | C7 |
//! | Advisor Client | [`infrastructure::advisor_client`] | C8 |
//! | Hybrid Selector | [`application::hybrid_selector`] | C9 |
//! | Argument Builder | [`application::argument_builder`] | C10 |
//! | Router Engine | [`application::router_engine`] | C11 |
//! | Control API | [`presentation::api`] | C12 |
//! | Feature Flags | [`infrastructure::feature_flags`] | C13 |
//! | Config Loader | [`infrastructure::config_loader`] | C14 |
//!
//! ## Layer structure
//!
//! ```text
//! presentation/   ← HTTP Control API (axum)
//!     ↓
//! application/    ← Use-cases: registry, supervisor, router, selection, args
//!     ↓
//! domain/         ← Services, tools, schema, events, errors — no I/O
//!     ↓
//! infrastructure/ ← Docker runtime, upstream/advisor HTTP clients, metrics, flags
//! ```

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;
