//! Error types for the bridge core.

use thiserror::Error;

/// Errors raised while building a [`TelemetryRegistry`](crate::TelemetryRegistry).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Field already registered: {name}")]
    DuplicateName { name: String },

    #[error("Field name must not be empty")]
    EmptyName,

    #[error("Correlation ids exhausted after {count} fields")]
    IdsExhausted { count: usize },
}

/// Errors raised when decoding a telemetry frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame too short: expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },

    #[error("Frame length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Frame payload of {payload} bytes is not a whole number of fields")]
    UnalignedPayload { payload: usize },
}

/// Errors raised while resolving broadcast connection settings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    #[error("Invalid port '{0}': expected a number between 1 and 65535")]
    InvalidPort(String),

    #[error("Unicast mode requires a target address")]
    MissingAddress,

    #[error("Invalid IPv4 address '{0}'")]
    InvalidAddress(String),

    #[error("Unknown destination mode '{0}': expected 'broadcast' or 'unicast'")]
    UnknownMode(String),
}

/// Errors surfaced by a [`TelemetrySource`](crate::TelemetrySource).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("Failed to open telemetry session '{session}': {reason}")]
    OpenFailed { session: String, reason: String },

    #[error("Telemetry session already open")]
    AlreadyOpen,

    #[error("Telemetry session not open")]
    NotOpen,

    #[error("Telemetry source refused definition for '{name}'")]
    Refused { name: String },
}
