//! The telemetry source seam.
//!
//! A source stands in for the simulator SDK: it opens a session, accepts
//! per-field data definitions and answers fire-and-forget requests. Answers
//! and session notifications come back later as [`SourceEvent`]s, delivered
//! on whatever channel the source was built with.

use crate::error::SourceError;
use crate::field::{DefinitionId, RequestId};
use serde::{Deserialize, Serialize};

/// An open session with a telemetry source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionHandle {
    id: u64,
    session_name: String,
}

impl ConnectionHandle {
    pub fn new(id: u64, session_name: impl Into<String>) -> Self {
        Self {
            id,
            session_name: session_name.into(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn session_name(&self) -> &str {
        &self.session_name
    }
}

/// Notifications raised by a telemetry source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SourceEvent {
    /// The session is established and accepts definitions.
    Open,
    /// The simulator ended the session.
    Quit,
    /// Non-fatal error reported by the simulator.
    Exception(u32),
    /// Answer to an earlier `request_field`.
    DataResponse { request_id: RequestId, value: f64 },
}

/// Simulator connection used by the polling controller.
pub trait TelemetrySource: Send {
    /// Open a session. `SourceEvent::Open` follows once it is usable.
    fn open(&mut self, session_name: &str) -> Result<ConnectionHandle, SourceError>;

    fn close(&mut self, handle: ConnectionHandle);

    /// Declare a field's data shape.
    ///
    /// Fails with [`SourceError::NotOpen`] when `handle` is not the current
    /// session, or [`SourceError::Refused`] when the source rejects the field.
    fn register_field(
        &mut self,
        handle: &ConnectionHandle,
        definition_id: DefinitionId,
        name: &str,
        unit: &str,
    ) -> Result<(), SourceError>;

    /// Ask for the current value of a registered field. The answer, if any,
    /// arrives as `SourceEvent::DataResponse` carrying `request_id`.
    fn request_field(
        &mut self,
        handle: &ConnectionHandle,
        request_id: RequestId,
        definition_id: DefinitionId,
    );
}
