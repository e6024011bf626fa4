// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Service lifecycle commands, delegated to the running daemon's Control
//! API (spec §6.1 `/api/services*`).

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;

use crate::daemon::GatewayClient;

#[derive(Subcommand)]
pub enum ServiceCommand {
    /// List declared services and their lifecycle phase
    Ls,
    /// Enable a disabled service
    Enable { name: String },
    /// Disable a service, stopping it if running
    Disable { name: String },
    /// Force a sleeping/stopped service awake
    Wake { name: String },
    /// Force a running service to sleep
    Sleep { name: String },
}

pub async fn handle_command(command: ServiceCommand, client: &GatewayClient) -> Result<()> {
    match command {
        ServiceCommand::Ls => ls(client).await,
        ServiceCommand::Enable { name } => enable(client, &name).await,
        ServiceCommand::Disable { name } => disable(client, &name).await,
        ServiceCommand::Wake { name } => wake(client, &name).await,
        ServiceCommand::Sleep { name } => sleep(client, &name).await,
    }
}

async fn ls(client: &GatewayClient) -> Result<()> {
    let services = client.list_services().await?;
    let Some(services) = services.as_array() else {
        println!("(no services declared)");
        return Ok(());
    };
    println!("{:<24} {:<12} {:<9} {:<8} mem used / limit", "NAME", "PHASE", "PRIORITY", "ENABLED");
    for svc in services {
        let name = svc.get("name").and_then(|v| v.as_str()).unwrap_or("?");
        let phase = svc.get("phase").and_then(|v| v.as_str()).unwrap_or("?");
        let priority = svc.get("priority").and_then(|v| v.as_str()).unwrap_or("?");
        let enabled = svc.get("enabled").and_then(|v| v.as_bool()).unwrap_or(false);
        let mem_used = svc.get("memUsed").and_then(|v| v.as_u64());
        let mem_limit = svc.get("memLimit").and_then(|v| v.as_u64()).unwrap_or(0);
        let mem = match mem_used {
            Some(used) => format!("{used} / {mem_limit}"),
            None => format!("- / {mem_limit}"),
        };
        println!("{name:<24} {phase:<12} {priority:<9} {enabled:<8} {mem}");
    }
    Ok(())
}

async fn enable(client: &GatewayClient, name: &str) -> Result<()> {
    let result = client.enable_service(name).await?;
    report(&result, "enabled")
}

async fn disable(client: &GatewayClient, name: &str) -> Result<()> {
    let result = client.disable_service(name).await?;
    report(&result, "disabled")
}

async fn wake(client: &GatewayClient, name: &str) -> Result<()> {
    let result = client.wake_service(name).await?;
    let latency = result.get("wakeLatencyMs").and_then(|v| v.as_u64()).unwrap_or(0);
    let phase = result.get("phase").and_then(|v| v.as_str()).unwrap_or("?");
    println!("{}", format!("✓ {name} is now {phase} (woke in {latency}ms)").green());
    Ok(())
}

async fn sleep(client: &GatewayClient, name: &str) -> Result<()> {
    let result = client.sleep_service(name).await?;
    report(&result, "put to sleep")
}

fn report(result: &serde_json::Value, verb: &str) -> Result<()> {
    let phase = result.get("phase").and_then(|v| v.as_str()).unwrap_or("?");
    let noop = result.get("noop").and_then(|v| v.as_bool()).unwrap_or(false);
    if noop {
        println!("{}", format!("ℹ no change — already {phase}").yellow());
    } else {
        println!("{}", format!("✓ {verb}, now {phase}").green());
    }
    Ok(())
}
