//! Error types for avbridgectl CLI

use avionics_bridge_core::{FrameError, SettingsError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid destination settings: {0}")]
    InvalidSettings(#[from] SettingsError),

    #[error("Invalid frame: {0}")]
    InvalidFrame(#[from] FrameError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl CliError {
    /// Process exit code reported for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::ValidationError(_)
            | CliError::InvalidConfiguration(_)
            | CliError::InvalidSettings(_)
            | CliError::InvalidFrame(_)
            | CliError::JsonError(_) => 4,
            CliError::IoError(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CliError::ValidationError("x".into()).exit_code(), 4);
        assert_eq!(CliError::InvalidSettings(SettingsError::MissingAddress).exit_code(), 4);
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(CliError::IoError(io).exit_code(), 1);
    }
}
