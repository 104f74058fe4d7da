//! Configuration file commands.

use crate::commands::ConfigCommands;
use crate::error::CliError;
use crate::output;
use anyhow::{Context, Result};
use avionics_bridge_service::BridgeConfig;
use colored::*;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::debug;

pub async fn execute(cmd: &ConfigCommands, path: &Path, json: bool) -> Result<()> {
    match cmd {
        ConfigCommands::Init { force } => init(path, *force, json).await,
        ConfigCommands::Show => {
            let config = read(path).await?;
            output::print_config(&config, path, json);
            Ok(())
        }
        ConfigCommands::Validate => validate(path, json).await,
        ConfigCommands::Path => {
            if json {
                output::print_success_json("path", &path.display().to_string());
            } else {
                println!("{}", path.display());
            }
            Ok(())
        }
    }
}

/// `--config` if given, otherwise the per-user default.
pub fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => BridgeConfig::default_config_path(),
    }
}

/// Read, migrate and validate the file at `path` without creating it.
pub async fn read(path: &Path) -> Result<BridgeConfig> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Err(CliError::InvalidConfiguration(format!(
            "No configuration at {}; run `avbridgectl config init`",
            path.display()
        ))
        .into());
    }

    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(CliError::IoError)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let mut config: BridgeConfig = serde_json::from_str(&content).map_err(CliError::JsonError)?;

    if config
        .migrate()
        .map_err(|e| CliError::ValidationError(format!("{e:#}")))?
    {
        debug!(schema = %config.schema_version, "Configuration migrated in memory");
    }
    config
        .validate()
        .map_err(|e| CliError::ValidationError(format!("{e:#}")))?;
    Ok(config)
}

/// Configuration if one exists and is valid, otherwise `None`.
pub async fn read_optional(path: &Path) -> Option<BridgeConfig> {
    match read(path).await {
        Ok(config) => Some(config),
        Err(e) => {
            debug!(error = %e, "Using built-in field layout");
            None
        }
    }
}

async fn init(path: &Path, force: bool, json: bool) -> Result<()> {
    if !force && tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Err(CliError::InvalidConfiguration(format!(
            "{} already exists; pass --force to overwrite",
            path.display()
        ))
        .into());
    }

    BridgeConfig::default().save_to_path(path).await?;

    if json {
        output::print_success_json("path", &path.display().to_string());
    } else {
        println!("{} Wrote default configuration to {}", "✓".green(), path.display());
    }
    Ok(())
}

async fn validate(path: &Path, json: bool) -> Result<()> {
    let config = read(path).await?;

    if json {
        output::print_success_json(
            "validation",
            &json!({
                "path": path.display().to_string(),
                "valid": true,
                "fields": config.fields.len(),
                "tick_interval_ms": config.tick_interval_ms,
            }),
        );
    } else {
        println!("{} {} is valid", "✓".green(), path.display());
        println!(
            "  {} fields, tick every {} ms",
            config.fields.len(),
            config.tick_interval_ms
        );
    }
    Ok(())
}
