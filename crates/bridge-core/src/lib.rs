//! Core telemetry polling and frame encoding for the avionics bridge.
//!
//! The bridge polls a small set of simulator variables from a telemetry
//! source and republishes their latest values as fixed-layout UDP frames.
//! This crate holds everything that carries state or invariants and does no
//! I/O of its own:
//!
//! ## Modules
//! - `field` - A single tracked quantity and its registration / in-flight state
//! - `registry` - Ordered field set with correlation id assignment
//! - `controller` - Per-tick request lifecycle (`PollingController`)
//! - `dispatcher` - Routes source responses back to their field
//! - `frame` - 8-byte timestamp + `f64` field values, little-endian
//! - `settings` - Destination mode / address / port resolution
//! - `source` - The telemetry source seam and its inbound events
//!
//! The telemetry source itself is injected through [`TelemetrySource`], so the
//! whole polling protocol runs deterministically against a test double.

#![deny(static_mut_refs)]

pub mod controller;
pub mod dispatcher;
pub mod error;
pub mod field;
pub mod frame;
pub mod registry;
pub mod settings;
pub mod source;

pub use controller::{ConnectionState, PollingController, TickReport};
pub use dispatcher::{DispatchOutcome, DispatcherStats, ResponseDispatcher};
pub use error::{FrameError, RegistryError, SettingsError, SourceError};
pub use field::{DefinitionId, FieldHandle, FieldSnapshot, RequestId, TelemetryField};
pub use frame::{
    FIELD_WIDTH, FrameEncoder, FrameSchema, FrameTimestamp, REFERENCE_FRAME_LEN, TIMESTAMP_WIDTH,
    TelemetryFrame, TimestampClock,
};
pub use registry::{REFERENCE_FIELDS, TelemetryRegistry};
pub use settings::{ConnectionSettings, DEFAULT_PORT, DestinationMode};
pub use source::{ConnectionHandle, SourceEvent, TelemetrySource};
