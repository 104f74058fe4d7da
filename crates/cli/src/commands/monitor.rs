//! Live frame monitor.

use crate::commands::MonitorArgs;
use crate::commands::frame::schema_for;
use crate::output;
use anyhow::{Context, Result};
use avionics_bridge_core::{FrameSchema, TelemetryFrame};
use colored::*;
use serde::Serialize;
use serde_json::json;
use std::net::{SocketAddr, SocketAddrV4};
use std::path::Path;
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

const MAX_DATAGRAM_SIZE: usize = 4096;

#[derive(Debug, Serialize)]
struct MonitorSummary {
    listen: String,
    frames: u64,
    malformed: u64,
    timed_out: bool,
}

pub async fn execute(args: &MonitorArgs, config_path: &Path, json: bool) -> Result<()> {
    let bind_addr = SocketAddr::V4(SocketAddrV4::new(args.bind, args.port));
    let socket = UdpSocket::bind(bind_addr).await.with_context(|| {
        format!("failed to bind UDP monitor socket at {bind_addr} (is another process using this port?)")
    })?;
    let listen = socket.local_addr().unwrap_or(bind_addr);
    if !json {
        println!("{} {}", "Listening on".bold(), listen);
    }

    let timeout = Duration::from_millis(args.timeout_ms.max(1));
    let mut schema: Option<FrameSchema> = None;
    let mut buf = [0u8; MAX_DATAGRAM_SIZE];
    let mut summary = MonitorSummary {
        listen: listen.to_string(),
        frames: 0,
        malformed: 0,
        timed_out: false,
    };

    while args.count.is_none_or(|count| summary.frames < count) {
        let (len, source) = match tokio::time::timeout(timeout, socket.recv_from(&mut buf)).await {
            Ok(received) => received.context("monitor receive failed")?,
            Err(_elapsed) => {
                debug!(timeout_ms = args.timeout_ms, "No frame before timeout");
                summary.timed_out = true;
                break;
            }
        };

        let datagram = buf.get(..len).unwrap_or_default();
        let frame = match TelemetryFrame::decode_any(datagram) {
            Ok(frame) => frame,
            Err(e) => {
                summary.malformed = summary.malformed.saturating_add(1);
                warn!(error = %e, %source, len, "Ignoring malformed datagram");
                continue;
            }
        };

        if schema.as_ref().is_none_or(|s| s.field_count() != frame.values.len()) {
            schema = Some(schema_for(frame.values.len(), config_path).await);
        }
        let Some(schema) = schema.as_ref() else {
            continue;
        };

        summary.frames = summary.frames.saturating_add(1);
        if json {
            output::print_json_line(&json!({
                "source": source.to_string(),
                "frame": output::frame_json(&frame, schema),
            }));
        } else {
            println!("{} {} from {}", "Frame".cyan(), summary.frames, source);
            output::print_frame_human(&frame, schema);
        }
    }

    if json {
        output::print_json_line(&json!({ "success": true, "summary": summary }));
    } else {
        println!(
            "{} {} frames, {} malformed{}",
            "Done:".bold(),
            summary.frames,
            summary.malformed,
            if summary.timed_out { " (timed out)" } else { "" }
        );
    }
    Ok(())
}
