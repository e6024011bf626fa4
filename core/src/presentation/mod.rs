// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Control API (`gateway-core`)
//!
//! HTTP surface that translates external requests into application-layer
//! calls. **No business logic lives here** — all real work is delegated to
//! `crate::application`.
//!
//! | Module | Transport | Description |
//! |--------|-----------|-------------|
//! | [`api`] | HTTP (Axum) | Registry queries, lifecycle commands, router invocation, metrics/health |

pub mod api;
