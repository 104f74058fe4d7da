//! avbridgectl - Avionics bridge control CLI
//!
//! Manages the bridge configuration file, checks destination settings and
//! decodes the UDP frames the bridge emits.

#![deny(static_mut_refs)]
#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]

mod commands;
mod error;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::*;
use crate::error::CliError;

#[derive(Parser)]
#[command(name = "avbridgectl")]
#[command(about = "Avionics bridge control CLI - configure the bridge and inspect its frames")]
#[command(version)]
#[command(long_about = "
avbridgectl manages the avionics bridge configuration and inspects the
telemetry frames the bridge publishes over UDP.

Use --json for machine-readable output suitable for scripting.
")]
struct Cli {
    /// Output format (human-readable or JSON)
    #[arg(
        long,
        global = true,
        help = "Output in JSON format for machine parsing"
    )]
    json: bool,

    /// Verbose logging
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Configuration file (defaults to the per-user location)
    #[arg(short, long, global = true, env = "AVBRIDGE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration file commands
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Destination settings commands
    #[command(subcommand)]
    Settings(SettingsCommands),

    /// Frame inspection commands
    #[command(subcommand)]
    Frame(FrameCommands),

    /// Listen for bridge frames and print them as they arrive
    Monitor(MonitorArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("avbridgectl={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    let result = execute_command(&cli).await;

    match result {
        Ok(()) => Ok(()),
        Err(e) => {
            if cli.json {
                output::print_error_json(&e);
            } else {
                output::print_error_human(&e);
            }

            let exit_code = match e.downcast_ref::<CliError>() {
                Some(error) => error.exit_code(),
                None => 1,
            };

            std::process::exit(exit_code);
        }
    }
}

async fn execute_command(cli: &Cli) -> Result<()> {
    let config_path = commands::config::resolve_path(cli.config.as_deref())?;
    match &cli.command {
        Commands::Config(cmd) => commands::config::execute(cmd, &config_path, cli.json).await,
        Commands::Settings(cmd) => commands::settings::execute(cmd, cli.json),
        Commands::Frame(cmd) => commands::frame::execute(cmd, &config_path, cli.json).await,
        Commands::Monitor(args) => commands::monitor::execute(args, &config_path, cli.json).await,
    }
}
