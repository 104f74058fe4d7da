//! Avionics bridge runtime
//!
//! Wires the core polling controller to a telemetry source and a UDP frame
//! sink, and drives both from a single async loop.
//!
//! ## Modules
//! - `config` - JSON configuration file (`BridgeConfig`)
//! - `bridge` - Connection, broadcast and counters (`Bridge`, `BridgeStatus`)
//! - `runtime` - `tokio::select!` loop over commands, source events and ticks
//! - `simulated` - In-process telemetry source for unattended runs and tests
//! - `error_log` - Bounded log of source exceptions

#![deny(static_mut_refs)]

pub mod bridge;
pub mod config;
pub mod error_log;
pub mod runtime;
pub mod simulated;

pub use bridge::{Bridge, BridgeStatus, FrameClock};
pub use config::{
    BridgeConfig, BroadcastConfig, CONFIG_SCHEMA_VERSION, FieldConfig, SourceConfig, SourceKind,
};
pub use error_log::{ErrorLog, ErrorLogEntry};
pub use runtime::{BridgeCommand, run};
pub use simulated::{FlightPath, SimulatedSource, SourceEventReceiver, SourceEventSender};

use std::time::Duration;

/// Build the source selected by `config`, reporting on `events`.
pub fn build_source(config: &SourceConfig, events: SourceEventSender) -> SimulatedSource {
    match config.kind {
        SourceKind::Simulated => SimulatedSource::new(events)
            .with_latency(Duration::from_millis(config.response_latency_ms))
            .with_drop_every(config.drop_every),
    }
}
