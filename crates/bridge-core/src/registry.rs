//! Ordered set of telemetry fields with correlation id assignment.
//!
//! Ids are handed out in registration order starting at zero, one
//! definition id and one request id per field. The external source sees the
//! same order, and the frame layout follows it too.

use crate::error::RegistryError;
use crate::field::{DefinitionId, FieldHandle, FieldSnapshot, RequestId, TelemetryField};

/// The five simulator variables broadcast by the reference bridge, in frame order.
pub const REFERENCE_FIELDS: [(&str, &str); 5] = [
    ("GPS POSITION LAT", "degrees"),
    ("GPS POSITION LON", "degrees"),
    ("GPS GROUND SPEED", "meter/second"),
    ("GPS GROUND TRUE HEADING", "radians"),
    ("GPS GROUND TRUE TRACK", "radians"),
];

#[derive(Debug, Clone, Default)]
pub struct TelemetryRegistry {
    fields: Vec<TelemetryField>,
    next_definition: u32,
    next_request: u32,
}

impl TelemetryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding [`REFERENCE_FIELDS`].
    pub fn reference() -> Result<Self, RegistryError> {
        Self::with_fields(REFERENCE_FIELDS)
    }

    /// Build a registry from `(name, unit)` pairs, in order.
    pub fn with_fields<I, N, U>(fields: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = (N, U)>,
        N: Into<String>,
        U: Into<String>,
    {
        let mut registry = Self::new();
        for (name, unit) in fields {
            registry.register(name, unit)?;
        }
        Ok(registry)
    }

    /// Add a field and assign it the next unused id pair.
    ///
    /// Duplicate names are rejected: the source would see two definitions for
    /// the same variable and the frame would carry the value twice.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        unit: impl Into<String>,
    ) -> Result<FieldHandle, RegistryError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.fields.iter().any(|f| f.name() == name) {
            return Err(RegistryError::DuplicateName { name });
        }

        let (Some(next_definition), Some(next_request)) = (
            self.next_definition.checked_add(1),
            self.next_request.checked_add(1),
        ) else {
            return Err(RegistryError::IdsExhausted {
                count: self.fields.len(),
            });
        };

        let field = TelemetryField::new(
            name,
            unit,
            DefinitionId(self.next_definition),
            RequestId(self.next_request),
        );
        self.next_definition = next_definition;
        self.next_request = next_request;

        let handle = FieldHandle(self.fields.len());
        self.fields.push(field);
        Ok(handle)
    }

    pub fn get(&self, handle: FieldHandle) -> Option<&TelemetryField> {
        self.fields.get(handle.0)
    }

    pub(crate) fn get_mut(&mut self, handle: FieldHandle) -> Option<&mut TelemetryField> {
        self.fields.get_mut(handle.0)
    }

    pub fn find_by_name(&self, name: &str) -> Option<FieldHandle> {
        self.fields
            .iter()
            .position(|f| f.name() == name)
            .map(FieldHandle)
    }

    /// Field whose request id matches a source response.
    pub fn find_by_request(&self, request_id: RequestId) -> Option<FieldHandle> {
        self.fields
            .iter()
            .position(|f| f.request_id() == request_id)
            .map(FieldHandle)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TelemetryField> {
        self.fields.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut TelemetryField> {
        self.fields.iter_mut()
    }

    pub fn handles(&self) -> impl Iterator<Item = FieldHandle> + use<> {
        (0..self.fields.len()).map(FieldHandle)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Current cached values in registry order.
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.fields.iter().map(TelemetryField::value)
    }

    pub fn snapshots(&self) -> Vec<FieldSnapshot> {
        self.fields.iter().map(TelemetryField::snapshot).collect()
    }

    /// Clear registration and in-flight state of every field.
    pub(crate) fn reset_all(&mut self) {
        for field in &mut self.fields {
            field.reset();
        }
    }
}
