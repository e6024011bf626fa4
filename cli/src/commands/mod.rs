// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the `gatewayd` CLI.

pub mod config;
pub mod daemon;
pub mod flags;
pub mod service;

pub use self::config::ConfigCommand;
pub use self::daemon::DaemonCommand;
pub use self::flags::FlagsCommand;
pub use self::service::ServiceCommand;
