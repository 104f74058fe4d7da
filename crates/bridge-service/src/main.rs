//! Avionics bridge daemon (avbridged)

use anyhow::{Context, Result};
use avionics_bridge_service::{Bridge, BridgeCommand, BridgeConfig, build_source, run};
use clap::Parser;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "avbridged")]
#[command(about = "Poll simulator telemetry and republish it over UDP")]
#[command(version)]
struct Args {
    /// Configuration file (defaults to the per-user location)
    #[arg(short, long, env = "AVBRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Start broadcasting immediately, overriding the config file
    #[arg(long)]
    broadcast: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "avionics_bridge_service=debug,info".into()),
        )
        .init();

    info!("Starting avionics bridge v{}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => BridgeConfig::load_from_path(path).await,
        None => BridgeConfig::load().await,
    }
    .context("Failed to load bridge configuration")?;

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let source = build_source(&config.source, event_tx);
    let auto_connect = config.auto_connect;
    let auto_broadcast = config.auto_broadcast || args.broadcast;
    let mut bridge =
        Bridge::with_system_clock(config, source).context("Invalid telemetry field list")?;

    let (command_tx, command_rx) = mpsc::channel(32);
    if auto_connect {
        command_tx.send(BridgeCommand::Connect).await?;
    }
    if auto_broadcast {
        command_tx.send(BridgeCommand::ToggleBroadcast).await?;
    }

    let shutdown_tx = command_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error waiting for Ctrl+C: {}", e);
            return;
        }
        info!("Received Ctrl+C");
        if shutdown_tx.send(BridgeCommand::Shutdown).await.is_err() {
            warn!("Bridge loop already stopped");
        }
    });

    run(&mut bridge, command_rx, event_rx).await;

    let status = bridge.status();
    info!(
        frames_sent = status.frames_sent,
        send_failures = status.send_failures,
        "Avionics bridge stopped"
    );
    Ok(())
}
