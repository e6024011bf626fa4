// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # `gatewayd` — MCP Aggregation Gateway CLI
//!
//! **CLI-first, daemon-backed**: operator subcommands (`service`, `flags`)
//! talk to a running Control API over HTTP; `serve` runs that API in the
//! foreground; `daemon` manages it as a background process via a PID file
//! plus HTTP health check.
//!
//! - `gatewayd serve --config FILE` — run the Control API + Supervisor
//! - `gatewayd daemon start|stop|status` — manage the background process
//! - `gatewayd service ls|enable|disable|wake|sleep` — lifecycle commands
//! - `gatewayd flags list|set` — feature flag inspection/overrides
//! - `gatewayd config validate FILE` — parse and validate a config file

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

mod commands;
mod daemon;

use commands::{ConfigCommand, DaemonCommand, FlagsCommand, ServiceCommand};
use daemon::GatewayClient;

#[derive(Parser)]
#[command(name = "gatewayd")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Control API host
    #[arg(long, global = true, env = "GATEWAY_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Control API port
    #[arg(long, global = true, env = "GATEWAY_PORT", default_value = "8000")]
    port: u16,

    /// Bearer token for the Control API; omit to run/connect unauthenticated
    #[arg(long, global = true, env = "GATEWAY_TOKEN")]
    token: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "GATEWAY_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the Control API and Supervisor in the foreground
    Serve {
        /// Path to the declared-service config file
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,
        /// Local advisor endpoint (spec §4.8)
        #[arg(long, env = "ADVISOR_ENDPOINT", default_value = "http://127.0.0.1:11434")]
        advisor_endpoint: String,
        /// Local advisor model name
        #[arg(long, env = "ADVISOR_MODEL", default_value = "llama3")]
        advisor_model: String,
    },
    /// Manage the background daemon process
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
    /// Service lifecycle commands
    Service {
        #[command(subcommand)]
        command: ServiceCommand,
    },
    /// Feature flag commands
    Flags {
        #[command(subcommand)]
        command: FlagsCommand,
    },
    /// Configuration commands
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    match cli.command {
        Commands::Serve { config, advisor_endpoint, advisor_model } => {
            daemon::run_daemon(config, cli.host, cli.port, cli.token, advisor_endpoint, advisor_model).await
        }
        Commands::Daemon { command } => commands::daemon::handle_command(command, &cli.host, cli.port).await,
        Commands::Service { command } => {
            let client = GatewayClient::new(&cli.host, cli.port, cli.token)?;
            commands::service::handle_command(command, &client).await
        }
        Commands::Flags { command } => {
            let client = GatewayClient::new(&cli.host, cli.port, cli.token)?;
            commands::flags::handle_command(command, &client).await
        }
        Commands::Config { command } => commands::config::handle_command(command).await,
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter =
        tracing_subscriber::EnvFilter::try_from_default_env().or_else(|_| tracing_subscriber::EnvFilter::try_new(level)).context("failed to build log filter")?;

    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).with_thread_ids(false).with_file(false).with_line_number(false).compact().init();

    Ok(())
}
