// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Feature flag inspection and overrides (spec §4.13, §6.1 `/api/flags*`).

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;

use crate::daemon::GatewayClient;

#[derive(Subcommand)]
pub enum FlagsCommand {
    /// List all known flags and their current values
    List,
    /// Set a flag's runtime value
    Set {
        /// Dotted `category.name`, e.g. `router.advisor_enabled`
        name: String,
        value: bool,
    },
}

pub async fn handle_command(command: FlagsCommand, client: &GatewayClient) -> Result<()> {
    match command {
        FlagsCommand::List => list(client).await,
        FlagsCommand::Set { name, value } => set(client, &name, value).await,
    }
}

async fn list(client: &GatewayClient) -> Result<()> {
    let flags = client.list_flags().await?;
    let Some(flags) = flags.as_array() else {
        println!("(no flags)");
        return Ok(());
    };
    println!("{:<16} {:<28} {:<8} SOURCE", "CATEGORY", "NAME", "VALUE");
    for flag in flags {
        let category = flag.get("category").and_then(|v| v.as_str()).unwrap_or("?");
        let name = flag.get("name").and_then(|v| v.as_str()).unwrap_or("?");
        let value = flag.get("value").and_then(|v| v.as_bool()).unwrap_or(false);
        let source = flag.get("source").and_then(|v| v.as_str()).unwrap_or("?");
        println!("{category:<16} {name:<28} {value:<8} {source}");
    }
    Ok(())
}

async fn set(client: &GatewayClient, name: &str, value: bool) -> Result<()> {
    client.set_flag(name, value).await?;
    println!("{}", format!("✓ {name} = {value}").green());
    Ok(())
}
