// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration validation. Loading and parsing YAML/JSON files is the
//! CLI's concern, not `gateway-core`'s (spec §1 Non-goals) — this is the
//! one place in the workspace that touches a config file on disk.

use std::path::PathBuf;

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Parse and validate a declared-service config file
    Validate {
        /// Path to the YAML/JSON config file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

pub async fn handle_command(command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Validate { file } => validate(file).await,
    }
}

async fn validate(file: PathBuf) -> Result<()> {
    let config = crate::daemon::server::load_config(&file)?;

    println!("{}", "✓ Configuration is valid".green());
    println!("  services: {}", config.services.len());
    println!("  virtual servers: {}", config.virtual_servers.len());
    println!("  advisor weight: {}", config.router.advisor_weight);

    Ok(())
}
