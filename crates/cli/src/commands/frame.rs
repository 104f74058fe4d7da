//! Frame decoding.

use crate::commands::FrameCommands;
use crate::commands::config::read_optional;
use crate::error::CliError;
use crate::output;
use anyhow::Result;
use avionics_bridge_core::{FrameSchema, REFERENCE_FIELDS, TelemetryFrame};
use std::path::Path;

pub async fn execute(cmd: &FrameCommands, config_path: &Path, json: bool) -> Result<()> {
    match cmd {
        FrameCommands::Decode { hex, fields } => decode(hex, *fields, config_path, json).await,
    }
}

async fn decode(input: &str, fields: Option<usize>, config_path: &Path, json: bool) -> Result<()> {
    let cleaned: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    let bytes = hex::decode(cleaned.trim_start_matches("0x"))
        .map_err(|e| CliError::ValidationError(format!("Frame is not valid hex: {e}")))?;

    let frame = match fields {
        Some(count) => TelemetryFrame::decode(&bytes, count),
        None => TelemetryFrame::decode_any(&bytes),
    }
    .map_err(CliError::InvalidFrame)?;

    let schema = schema_for(frame.values.len(), config_path).await;
    if json {
        output::print_success_json("frame", &output::frame_json(&frame, &schema));
    } else {
        output::print_frame_human(&frame, &schema);
    }
    Ok(())
}

/// Field names for a frame carrying `count` values.
///
/// Prefers the configured field list, then the reference layout, and falls
/// back to positional names when neither matches.
pub async fn schema_for(count: usize, config_path: &Path) -> FrameSchema {
    if let Some(config) = read_optional(config_path).await
        && config.fields.len() == count
    {
        return FrameSchema::from_names(config.fields.into_iter().map(|f| f.name));
    }
    if REFERENCE_FIELDS.len() == count {
        return FrameSchema::from_names(REFERENCE_FIELDS.iter().map(|(name, _)| *name));
    }
    FrameSchema::from_names((0..count).map(|i| format!("field[{i}]")))
}
