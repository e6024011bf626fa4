// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Use-case orchestration: wires domain entities and infrastructure ports
//! together to carry out one named operation. Nothing here is reusable
//! outside this crate's own control flow — contrast with `domain`, which
//! has no knowledge of `application` or `infrastructure` at all.

pub mod argument_builder;
pub mod hybrid_selector;
pub mod keyword_scorer;
pub mod registry;
pub mod router_engine;
pub mod supervisor;
pub mod virtual_servers;
