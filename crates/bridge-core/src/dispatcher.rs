//! Routes source responses to the field that asked for them.

use crate::field::{FieldHandle, RequestId};
use crate::registry::TelemetryRegistry;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Result of dispatching one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The response updated this field.
    Updated(FieldHandle),
    /// No field carries the request id; the response was dropped.
    Ignored,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherStats {
    pub updated: u64,
    pub ignored: u64,
}

/// Demultiplexes `DataResponse` events by request id.
#[derive(Debug, Default)]
pub struct ResponseDispatcher {
    stats: DispatcherStats,
}

impl ResponseDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` on the field owning `request_id` and clear its in-flight
    /// flag. Unknown ids are not an error: a source may still answer for
    /// definitions from an earlier session.
    pub fn dispatch(
        &mut self,
        registry: &mut TelemetryRegistry,
        request_id: RequestId,
        value: f64,
    ) -> DispatchOutcome {
        let Some(handle) = registry.find_by_request(request_id) else {
            self.stats.ignored = self.stats.ignored.saturating_add(1);
            trace!(request_id = %request_id, "Ignoring response for unknown request id");
            return DispatchOutcome::Ignored;
        };

        match registry.get_mut(handle) {
            Some(field) => {
                field.apply_response(value);
                self.stats.updated = self.stats.updated.saturating_add(1);
                trace!(field = %field.name(), request_id = %request_id, value, "Field updated");
                DispatchOutcome::Updated(handle)
            }
            None => {
                self.stats.ignored = self.stats.ignored.saturating_add(1);
                DispatchOutcome::Ignored
            }
        }
    }

    pub fn stats(&self) -> DispatcherStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_dispatch_updates_only_matching_field() -> TestResult {
        let mut registry = TelemetryRegistry::reference()?;
        let mut dispatcher = ResponseDispatcher::new();

        let outcome = dispatcher.dispatch(&mut registry, RequestId(1), -122.3088);
        let handle = registry
            .find_by_name("GPS POSITION LON")
            .ok_or("missing lon")?;
        assert_eq!(outcome, DispatchOutcome::Updated(handle));

        let values: Vec<u64> = registry.values().map(f64::to_bits).collect();
        assert_eq!(
            values,
            vec![
                0.0f64.to_bits(),
                (-122.3088f64).to_bits(),
                0.0f64.to_bits(),
                0.0f64.to_bits(),
                0.0f64.to_bits(),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_unknown_request_is_ignored() -> TestResult {
        let mut registry = TelemetryRegistry::reference()?;
        let before = registry.snapshots();
        let mut dispatcher = ResponseDispatcher::new();

        assert_eq!(
            dispatcher.dispatch(&mut registry, RequestId(42), 1.0),
            DispatchOutcome::Ignored
        );
        assert_eq!(registry.snapshots(), before);
        assert_eq!(dispatcher.stats(), DispatcherStats { updated: 0, ignored: 1 });
        Ok(())
    }

    #[test]
    fn test_dispatch_on_unregistered_field_still_stores_value() -> TestResult {
        let mut registry = TelemetryRegistry::reference()?;
        let mut dispatcher = ResponseDispatcher::new();

        dispatcher.dispatch(&mut registry, RequestId(0), 47.45);
        let field = registry.get(FieldHandle(0)).ok_or("missing lat")?;
        assert!(!field.is_registered());
        assert!(!field.is_in_flight());
        assert_eq!(field.value().to_bits(), 47.45f64.to_bits());
        Ok(())
    }
}
