//! Bridge configuration management and validation
//!
//! The configuration is a single JSON document. A missing file is replaced by
//! the defaults, which reproduce the reference bridge: five GPS variables
//! broadcast on port 11000 once a second.

use anyhow::{Context, Result};
use avionics_bridge_core::{
    ConnectionSettings, DEFAULT_PORT, DestinationMode, REFERENCE_FIELDS, RegistryError,
    SettingsError, TelemetryRegistry, TimestampClock,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub const CONFIG_SCHEMA_VERSION: &str = "avionics-bridge.config/1";
pub const MIN_TICK_INTERVAL_MS: u64 = 10;
pub const MAX_TICK_INTERVAL_MS: u64 = 60_000;
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1000;

/// Complete bridge configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Configuration schema version
    pub schema_version: String,
    /// Session name announced to the telemetry source
    pub session_name: String,
    /// Polling and broadcast period
    pub tick_interval_ms: u64,
    /// Open the telemetry session at startup
    pub auto_connect: bool,
    /// Start broadcasting at startup
    pub auto_broadcast: bool,
    /// Frame destination
    pub broadcast: BroadcastConfig,
    /// Telemetry source selection
    pub source: SourceConfig,
    /// Polled variables, in frame order
    pub fields: Vec<FieldConfig>,
    /// Maximum retained source exception messages
    pub error_log_capacity: usize,
    /// Clock used for frame timestamps
    pub timestamp_clock: TimestampClock,
}

/// Raw destination settings, resolved when broadcasting starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    pub mode: DestinationMode,
    /// Target IPv4 address, unicast only
    pub address: Option<String>,
    /// Port as typed by the operator
    pub port: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Simulated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    /// Delay before the simulated source answers a request
    pub response_latency_ms: u64,
    /// Leave every Nth request unanswered (0 = answer all)
    pub drop_every: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldConfig {
    pub name: String,
    pub unit: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            schema_version: CONFIG_SCHEMA_VERSION.to_string(),
            session_name: "Avionics Bridge".to_string(),
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            auto_connect: true,
            auto_broadcast: false,
            broadcast: BroadcastConfig::default(),
            source: SourceConfig::default(),
            fields: REFERENCE_FIELDS
                .iter()
                .map(|(name, unit)| FieldConfig {
                    name: (*name).to_string(),
                    unit: (*unit).to_string(),
                })
                .collect(),
            error_log_capacity: 256,
            timestamp_clock: TimestampClock::Local,
        }
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            mode: DestinationMode::Broadcast,
            address: None,
            port: DEFAULT_PORT.to_string(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Simulated,
            response_latency_ms: 20,
            drop_every: 0,
        }
    }
}

impl BroadcastConfig {
    pub fn resolve(&self) -> Result<ConnectionSettings, SettingsError> {
        ConnectionSettings::resolve(self.mode, self.address.as_deref(), &self.port)
    }
}

impl BridgeConfig {
    /// Load configuration from default location
    pub async fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path).await
    }

    /// Load configuration from specific path, creating defaults if absent
    pub async fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            info!("Config file not found at {:?}, creating default", path);
            let config = Self::default();
            config.save_to_path(path).await?;
            return Ok(config);
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {path:?}"))?;

        let mut config: BridgeConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {path:?}"))?;

        if config.migrate()? {
            config.save_to_path(path).await?;
        }
        config.validate()?;

        debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Save configuration to default location
    pub async fn save(&self) -> Result<()> {
        let config_path = Self::default_config_path()?;
        self.save_to_path(&config_path).await
    }

    /// Save configuration to specific path
    pub async fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;

        tokio::fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write config file: {path:?}"))?;

        debug!("Saved config to {:?}", path);
        Ok(())
    }

    /// Get default configuration file path
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = if cfg!(windows) {
            PathBuf::from(
                std::env::var("LOCALAPPDATA")
                    .context("LOCALAPPDATA environment variable not set")?,
            )
        } else {
            PathBuf::from(std::env::var("HOME").context("HOME environment variable not set")?)
                .join(".config")
        };

        Ok(config_dir.join("avionics-bridge").join("bridge.json"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.schema_version != CONFIG_SCHEMA_VERSION {
            anyhow::bail!("Invalid schema version: {}", self.schema_version);
        }

        if !(MIN_TICK_INTERVAL_MS..=MAX_TICK_INTERVAL_MS).contains(&self.tick_interval_ms) {
            anyhow::bail!(
                "Invalid tick interval: {} ms (expected {}..={})",
                self.tick_interval_ms,
                MIN_TICK_INTERVAL_MS,
                MAX_TICK_INTERVAL_MS
            );
        }

        if self.session_name.trim().is_empty() {
            anyhow::bail!("Session name must not be empty");
        }

        if self.fields.is_empty() {
            anyhow::bail!("At least one telemetry field must be configured");
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.name.trim().is_empty() {
                anyhow::bail!("Telemetry field names must not be empty");
            }
            if !seen.insert(field.name.as_str()) {
                anyhow::bail!("Duplicate telemetry field: {}", field.name);
            }
        }

        if self.error_log_capacity == 0 {
            anyhow::bail!("Error log capacity must be greater than zero");
        }

        // Broadcast settings are re-resolved at start; an invalid entry here
        // is reported early but does not prevent polling.
        if self.auto_broadcast {
            self.broadcast
                .resolve()
                .context("Invalid broadcast settings with auto_broadcast enabled")?;
        }

        Ok(())
    }

    /// Migrate configuration to current schema version
    pub fn migrate(&mut self) -> Result<bool> {
        if self.schema_version == CONFIG_SCHEMA_VERSION {
            return Ok(false);
        }

        info!(
            "Migrating config from {} to {}",
            self.schema_version, CONFIG_SCHEMA_VERSION
        );

        match self.schema_version.as_str() {
            "avionics-bridge.config/0" => {
                // v0 stored no field list; fall back to the reference set.
                if self.fields.is_empty() {
                    self.fields = Self::default().fields;
                }
                self.schema_version = CONFIG_SCHEMA_VERSION.to_string();
            }
            _ => {
                anyhow::bail!("Unsupported config schema version: {}", self.schema_version);
            }
        }

        Ok(true)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Build the field registry in configured order.
    pub fn build_registry(&self) -> Result<TelemetryRegistry, RegistryError> {
        TelemetryRegistry::with_fields(
            self.fields
                .iter()
                .map(|f| (f.name.as_str(), f.unit.as_str())),
        )
    }
}

/// Clamp a requested tick interval to the supported range.
pub fn clamp_tick_interval_ms(ms: u64) -> u64 {
    ms.clamp(MIN_TICK_INTERVAL_MS, MAX_TICK_INTERVAL_MS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_default_config_is_valid_reference_bridge() -> TestResult {
        let config = BridgeConfig::default();
        config.validate()?;
        assert_eq!(config.tick_interval(), Duration::from_secs(1));
        assert_eq!(config.broadcast.port, "11000");
        assert_eq!(config.fields.len(), 5);
        assert_eq!(config.build_registry()?.len(), 5);
        Ok(())
    }

    #[tokio::test]
    async fn test_load_creates_default_when_missing() -> TestResult {
        let dir = TempDir::new()?;
        let path = dir.path().join("nested").join("bridge.json");

        let config = BridgeConfig::load_from_path(&path).await?;
        assert_eq!(config, BridgeConfig::default());
        assert!(path.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_save_then_load_preserves_values() -> TestResult {
        let dir = TempDir::new()?;
        let path = dir.path().join("bridge.json");

        let mut config = BridgeConfig::default();
        config.tick_interval_ms = 250;
        config.broadcast = BroadcastConfig {
            mode: DestinationMode::Unicast,
            address: Some("192.168.1.41".to_string()),
            port: "49002".to_string(),
        };
        config.save_to_path(&path).await?;

        let loaded = BridgeConfig::load_from_path(&path).await?;
        assert_eq!(loaded, config);
        Ok(())
    }

    #[tokio::test]
    async fn test_partial_file_fills_defaults() -> TestResult {
        let dir = TempDir::new()?;
        let path = dir.path().join("bridge.json");
        tokio::fs::write(
            &path,
            r#"{ "schema_version": "avionics-bridge.config/1", "tick_interval_ms": 100 }"#,
        )
        .await?;

        let loaded = BridgeConfig::load_from_path(&path).await?;
        assert_eq!(loaded.tick_interval_ms, 100);
        assert_eq!(loaded.fields, BridgeConfig::default().fields);
        Ok(())
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = BridgeConfig::default();
        config.tick_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = BridgeConfig::default();
        config.fields.push(FieldConfig {
            name: "GPS POSITION LAT".to_string(),
            unit: "degrees".to_string(),
        });
        assert!(config.validate().is_err());

        let mut config = BridgeConfig::default();
        config.fields.clear();
        assert!(config.validate().is_err());

        let mut config = BridgeConfig::default();
        config.error_log_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = BridgeConfig::default();
        config.auto_broadcast = true;
        config.broadcast.mode = DestinationMode::Unicast;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_migrate_from_v0() -> TestResult {
        let mut config = BridgeConfig {
            schema_version: "avionics-bridge.config/0".to_string(),
            fields: Vec::new(),
            ..Default::default()
        };
        assert!(config.migrate()?);
        assert_eq!(config.schema_version, CONFIG_SCHEMA_VERSION);
        assert_eq!(config.fields.len(), 5);
        assert!(!config.migrate()?);

        let mut unknown = BridgeConfig {
            schema_version: "other-tool.config/3".to_string(),
            ..Default::default()
        };
        assert!(unknown.migrate().is_err());
        Ok(())
    }

    #[test]
    fn test_clamp_tick_interval() {
        assert_eq!(clamp_tick_interval_ms(0), MIN_TICK_INTERVAL_MS);
        assert_eq!(clamp_tick_interval_ms(500), 500);
        assert_eq!(clamp_tick_interval_ms(u64::MAX), MAX_TICK_INTERVAL_MS);
    }
}
