// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Daemon lifecycle management: start, stop, status.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use tracing::{info, warn};

use crate::daemon::{check_daemon_running, stop_daemon, DaemonStatus};

#[derive(Subcommand)]
pub enum DaemonCommand {
    /// Start the daemon in the background (if not already running)
    Start {
        /// Path to the declared-service config file
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,
    },
    /// Stop the daemon gracefully
    Stop {
        /// Force-kill if the daemon doesn't stop gracefully
        #[arg(short, long)]
        force: bool,
        /// Seconds to wait for a graceful stop before escalating
        #[arg(short, long, default_value = "30")]
        timeout: u64,
    },
    /// Check daemon status
    Status,
}

pub async fn handle_command(command: DaemonCommand, host: &str, port: u16) -> Result<()> {
    match command {
        DaemonCommand::Start { config } => start(config, host, port).await,
        DaemonCommand::Stop { force, timeout } => stop(host, port, force, timeout).await,
        DaemonCommand::Status => status(host, port).await,
    }
}

async fn start(config: PathBuf, host: &str, port: u16) -> Result<()> {
    match check_daemon_running(host, port).await {
        Ok(DaemonStatus::Running { pid, .. }) => {
            println!("{}", format!("✓ daemon already running (pid {pid})").green());
            return Ok(());
        }
        Ok(DaemonStatus::Unhealthy { pid, error }) => {
            warn!("daemon pid {pid} is unhealthy ({error}), stopping it first");
            stop_daemon(false, 10).await?;
        }
        Ok(DaemonStatus::Stopped) => info!("daemon not running, starting"),
        Err(e) => warn!("failed to check daemon status: {e}"),
    }

    let current_exe = std::env::current_exe().context("failed to resolve current executable")?;
    let mut cmd = std::process::Command::new(current_exe);
    cmd.arg("serve").arg("--config").arg(&config).arg("--host").arg(host).arg("--port").arg(port.to_string());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let temp_dir = std::env::temp_dir();
    let stdout = std::fs::File::create(temp_dir.join("gatewayd.out")).context("failed to create stdout log file")?;
    let stderr = std::fs::File::create(temp_dir.join("gatewayd.err")).context("failed to create stderr log file")?;
    cmd.stdin(std::process::Stdio::null()).stdout(stdout).stderr(stderr);

    let child = cmd.spawn().context("failed to spawn daemon process")?;
    println!("{}", format!("✓ daemon starting (pid {})", child.id()).green());
    println!("check status with: gatewayd daemon status");

    Ok(())
}

async fn stop(host: &str, port: u16, force: bool, timeout: u64) -> Result<()> {
    match check_daemon_running(host, port).await {
        Ok(DaemonStatus::Stopped) => {
            println!("{}", "ℹ daemon not running".yellow());
            return Ok(());
        }
        _ => {
            stop_daemon(force, timeout).await?;
            println!("{}", "✓ daemon stopped".green());
        }
    }
    Ok(())
}

async fn status(host: &str, port: u16) -> Result<()> {
    match check_daemon_running(host, port).await {
        Ok(DaemonStatus::Running { pid, .. }) => {
            println!("{}", "✓ daemon is running".green());
            if pid != 0 {
                println!("  pid: {pid}");
            }
        }
        Ok(DaemonStatus::Stopped) => println!("{}", "✗ daemon is not running".red()),
        Ok(DaemonStatus::Unhealthy { pid, error }) => {
            println!("{}", format!("⚠ daemon unhealthy (pid {pid})").yellow());
            println!("  {error}");
        }
        Err(e) => {
            println!("{}", format!("✗ failed to check status: {e}").red());
            return Err(e);
        }
    }
    Ok(())
}
