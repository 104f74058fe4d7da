//! A single tracked telemetry quantity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Correlation token naming a data-shape declaration on the telemetry source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DefinitionId(pub u32);

/// Correlation token naming a poll of one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub u32);

impl fmt::Display for DefinitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "def#{}", self.0)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req#{}", self.0)
    }
}

/// Position of a field inside its registry.
///
/// Handles are only meaningful for the registry that issued them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldHandle(pub(crate) usize);

impl FieldHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

/// One named quantity polled from the telemetry source.
///
/// `registered` and `in_flight` only change through the registry owner
/// (controller and dispatcher); readers get the current state through the
/// accessors.
#[derive(Debug, Clone)]
pub struct TelemetryField {
    name: String,
    unit: String,
    definition_id: DefinitionId,
    request_id: RequestId,
    value: f64,
    registered: bool,
    in_flight: bool,
    missed_polls: u32,
}

impl TelemetryField {
    pub(crate) fn new(
        name: impl Into<String>,
        unit: impl Into<String>,
        definition_id: DefinitionId,
        request_id: RequestId,
    ) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
            definition_id,
            request_id,
            value: 0.0,
            registered: false,
            in_flight: false,
            missed_polls: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn definition_id(&self) -> DefinitionId {
        self.definition_id
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Last value received from the source, `0.0` until the first response.
    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Consecutive ticks skipped because the previous request is unanswered.
    pub fn missed_polls(&self) -> u32 {
        self.missed_polls
    }

    /// True once at least one poll was skipped waiting for a response.
    pub fn is_stale(&self) -> bool {
        self.missed_polls > 0
    }

    pub(crate) fn mark_registered(&mut self) {
        self.registered = true;
    }

    pub(crate) fn mark_requested(&mut self) {
        self.in_flight = true;
    }

    pub(crate) fn record_missed_poll(&mut self) {
        self.missed_polls = self.missed_polls.saturating_add(1);
    }

    pub(crate) fn apply_response(&mut self, value: f64) {
        self.value = value;
        self.in_flight = false;
        self.missed_polls = 0;
    }

    /// Drop all session state; the cached value survives.
    pub(crate) fn reset(&mut self) {
        self.registered = false;
        self.in_flight = false;
        self.missed_polls = 0;
    }

    pub fn snapshot(&self) -> FieldSnapshot {
        FieldSnapshot {
            name: self.name.clone(),
            unit: self.unit.clone(),
            definition_id: self.definition_id,
            request_id: self.request_id,
            value: self.value,
            registered: self.registered,
            in_flight: self.in_flight,
            missed_polls: self.missed_polls,
        }
    }
}

/// Serializable copy of a field's state for status reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSnapshot {
    pub name: String,
    pub unit: String,
    pub definition_id: DefinitionId,
    pub request_id: RequestId,
    pub value: f64,
    pub registered: bool,
    pub in_flight: bool,
    pub missed_polls: u32,
}
