// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Adapters for everything the domain and application layers treat as an
//! external port: the container runtime, upstream MCP servers, the local
//! advisor model, and the process-wide metrics/flags/event-bus singletons.

pub mod advisor_client;
pub mod config_loader;
pub mod container_driver;
pub mod event_bus;
pub mod feature_flags;
pub mod metrics_store;
pub mod tool_cache;
pub mod upstream_client;
