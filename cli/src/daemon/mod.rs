// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Daemon detection and lifecycle helpers.
//!
//! Handles:
//! - PID file management
//! - HTTP health checks against the Control API
//! - Graceful shutdown

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;
#[cfg(unix)]
use tokio::time::sleep;
use tracing::info;
#[cfg(unix)]
use tracing::warn;

pub mod client;
pub mod server;

pub use client::GatewayClient;
pub use server::run_daemon;

#[cfg(unix)]
const PID_FILE: &str = "/var/run/gatewayd/gatewayd.pid";
#[cfg(unix)]
const PID_FILE_FALLBACK: &str = "/tmp/gatewayd.pid";

#[derive(Debug, Clone)]
pub enum DaemonStatus {
    Running { pid: u32, uptime: Option<u64> },
    Stopped,
    Unhealthy { pid: u32, error: String },
}

/// Checks whether the daemon is running via HTTP health check (primary) or
/// PID file (secondary). Mirrors the Control API's unauthenticated
/// `/api/health` endpoint.
pub async fn check_daemon_running(host: &str, port: u16) -> Result<DaemonStatus> {
    let client = reqwest::Client::builder().timeout(Duration::from_millis(500)).build()?;

    let base_url =
        if host.starts_with("http://") || host.starts_with("https://") { format!("{host}:{port}") } else { format!("http://{host}:{port}") };
    let health_url = format!("{base_url}/api/health");

    let pid_file = get_pid_file_path();
    let local_pid = std::fs::read_to_string(&pid_file).ok().and_then(|s| s.trim().parse::<u32>().ok());

    match client.get(&health_url).send().await {
        Ok(resp) if resp.status().is_success() => Ok(DaemonStatus::Running { pid: local_pid.unwrap_or(0), uptime: None }),
        Ok(resp) => {
            let pid = local_pid.unwrap_or(0);
            Ok(DaemonStatus::Unhealthy { pid, error: format!("HTTP {}", resp.status()) })
        }
        Err(e) => {
            if let Some(pid) = local_pid {
                if process_exists(pid) {
                    return Ok(DaemonStatus::Unhealthy { pid, error: e.to_string() });
                }
                let _ = std::fs::remove_file(&pid_file);
            }
            Ok(DaemonStatus::Stopped)
        }
    }
}

/// Stops the daemon gracefully, escalating to a forced kill on timeout.
pub async fn stop_daemon(force: bool, timeout_secs: u64) -> Result<()> {
    let pid_file = get_pid_file_path();
    let pid = std::fs::read_to_string(&pid_file).context("failed to read PID file")?.trim().parse::<u32>().context("invalid PID")?;

    info!("sending SIGTERM to process {pid}");

    #[cfg(unix)]
    {
        send_signal(pid, libc::SIGTERM)?;
        for _ in 0..timeout_secs {
            if !process_exists(pid) {
                info!("daemon stopped gracefully");
                let _ = std::fs::remove_file(&pid_file);
                return Ok(());
            }
            sleep(Duration::from_secs(1)).await;
        }
        if force {
            warn!("graceful shutdown timed out, sending SIGKILL");
            send_signal(pid, libc::SIGKILL)?;
            sleep(Duration::from_secs(1)).await;
        } else {
            anyhow::bail!("daemon did not stop within {timeout_secs}s");
        }
    }

    #[cfg(windows)]
    {
        let output = std::process::Command::new("taskkill").args(["/PID", &pid.to_string(), "/F"]).output().context("failed to run taskkill")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stderr.contains("not found") {
                anyhow::bail!("failed to stop daemon: {stderr}");
            }
        }
    }

    let _ = std::fs::remove_file(&pid_file);
    Ok(())
}

fn get_pid_file_path() -> PathBuf {
    #[cfg(unix)]
    {
        let uid = unsafe { libc::geteuid() };
        if uid == 0 { PathBuf::from(PID_FILE) } else { PathBuf::from(PID_FILE_FALLBACK) }
    }
    #[cfg(windows)]
    {
        PathBuf::from("C:\\ProgramData\\gatewayd\\gatewayd.pid")
    }
}

fn process_exists(_pid: u32) -> bool {
    #[cfg(unix)]
    {
        unsafe { libc::kill(_pid as i32, 0) == 0 }
    }
    #[cfg(windows)]
    {
        true
    }
}

#[cfg(unix)]
fn send_signal(pid: u32, signal: i32) -> Result<()> {
    unsafe {
        if libc::kill(pid as i32, signal) != 0 {
            anyhow::bail!("failed to send signal {signal} to process {pid}");
        }
    }
    Ok(())
}

pub fn write_pid_file(pid: u32) -> Result<()> {
    let pid_file = get_pid_file_path();
    if let Some(parent) = pid_file.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    std::fs::write(&pid_file, pid.to_string()).with_context(|| format!("failed to write PID file {pid_file:?}"))?;
    info!("wrote PID file {pid_file:?}");
    Ok(())
}

pub fn remove_pid_file() -> Result<()> {
    let pid_file = get_pid_file_path();
    if pid_file.exists() {
        std::fs::remove_file(&pid_file).with_context(|| format!("failed to remove PID file {pid_file:?}"))?;
    }
    Ok(())
}
