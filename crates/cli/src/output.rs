//! Output formatting for CLI responses

use anyhow::Error;
use avionics_bridge_core::{ConnectionSettings, FrameSchema, TelemetryFrame};
use avionics_bridge_service::BridgeConfig;
use colored::*;
use serde::Serialize;
use serde_json::json;
use std::path::Path;

/// Print error in JSON format
pub fn print_error_json(error: &Error) {
    let error_json = json!({
        "success": false,
        "error": {
            "message": error.to_string(),
            "chain": error.chain().skip(1).map(ToString::to_string).collect::<Vec<_>>(),
        }
    });
    match serde_json::to_string_pretty(&error_json) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("Failed to format error as JSON: {e}"),
    }
}

/// Print error in human-readable format
pub fn print_error_human(error: &Error) {
    eprintln!("{} {}", "Error:".red().bold(), error);

    for cause in error.chain().skip(1) {
        eprintln!("  {} {}", "Caused by:".yellow(), cause);
    }
}

/// Print `{ "success": true, <key>: value }`
pub fn print_success_json<T: Serialize>(key: &str, value: &T) {
    let output = json!({
        "success": true,
        key: value,
    });
    match serde_json::to_string_pretty(&output) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("Failed to format {key} as JSON: {e}"),
    }
}

/// Print one compact JSON object per line
pub fn print_json_line<T: Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("Failed to format output as JSON: {e}"),
    }
}

pub fn print_config(config: &BridgeConfig, path: &Path, json: bool) {
    if json {
        print_success_json("config", config);
        return;
    }

    println!("{} {}", "Configuration:".bold(), path.display());
    println!("  Schema: {}", config.schema_version);
    println!("  Session: {}", config.session_name);
    println!("  Tick interval: {} ms", config.tick_interval_ms);
    println!(
        "  Destination: {} {}:{}",
        config.broadcast.mode,
        config.broadcast.address.as_deref().unwrap_or("-"),
        config.broadcast.port
    );
    println!(
        "  Auto connect: {}  Auto broadcast: {}",
        yes_no(config.auto_connect),
        yes_no(config.auto_broadcast)
    );
    println!("  Timestamp clock: {:?}", config.timestamp_clock);
    println!("  {}", "Fields:".bold());
    for (index, field) in config.fields.iter().enumerate() {
        println!("    {index}. {} ({})", field.name, field.unit.dimmed());
    }
}

pub fn print_settings(settings: &ConnectionSettings, json: bool) {
    if json {
        print_success_json(
            "settings",
            &json!({
                "mode": settings.mode(),
                "address": settings.address().to_string(),
                "port": settings.port(),
                "destination": settings.destination().to_string(),
            }),
        );
        return;
    }

    println!("{} {}", "✓".green(), "Destination settings are valid".bold());
    println!("  Mode: {}", settings.mode());
    println!("  Destination: {}", settings.destination());
}

/// Frame as a JSON value keyed by field name.
pub fn frame_json(frame: &TelemetryFrame, schema: &FrameSchema) -> serde_json::Value {
    let values: serde_json::Map<String, serde_json::Value> = schema
        .field_names()
        .iter()
        .zip(&frame.values)
        .map(|(name, value)| (name.clone(), json!(value)))
        .collect();
    json!({
        "timestamp_ticks": frame.timestamp.0,
        "timestamp": format_timestamp(frame),
        "values": values,
    })
}

pub fn print_frame_human(frame: &TelemetryFrame, schema: &FrameSchema) {
    println!("{} {}", "Timestamp:".bold(), format_timestamp(frame));
    println!("  ticks: {}", frame.timestamp.0);
    for (name, value) in schema.field_names().iter().zip(&frame.values) {
        println!("  {name:<28} {value:>16.6}");
    }
}

fn format_timestamp(frame: &TelemetryFrame) -> String {
    frame
        .timestamp
        .to_naive()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| "out of range".to_string())
}

fn yes_no(value: bool) -> ColoredString {
    if value { "yes".green() } else { "no".dimmed() }
}
