//! Per-tick request lifecycle.
//!
//! Every field walks the same two-phase protocol against the source:
//!
//! 1. declare its data definition once per session (`registered`), then
//! 2. repeatedly request a value and wait for the answer (`in_flight`).
//!
//! A field never has more than one outstanding request. If the source is
//! slow, ticks that find the field still in flight are dropped rather than
//! queued, and counted as missed polls.

use crate::dispatcher::{DispatchOutcome, DispatcherStats, ResponseDispatcher};
use crate::error::SourceError;
use crate::field::RequestId;
use crate::registry::TelemetryRegistry;
use crate::source::{ConnectionHandle, TelemetrySource};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

/// What one `on_tick` did, field by field, summed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickReport {
    /// Fields whose definition was accepted during this tick.
    pub registered: usize,
    /// Fields that could not be registered and were skipped.
    pub registration_failed: usize,
    /// Requests issued.
    pub requested: usize,
    /// Fields skipped because a request was already outstanding.
    pub skipped_in_flight: usize,
}

/// Drives registration and polling of every field in a registry.
///
/// The controller owns both the registry and the source; all field state is
/// mutated from the single context that calls into it.
pub struct PollingController<S> {
    registry: TelemetryRegistry,
    source: S,
    dispatcher: ResponseDispatcher,
    connection: Option<ConnectionHandle>,
    state: ConnectionState,
}

impl<S: TelemetrySource> PollingController<S> {
    pub fn new(registry: TelemetryRegistry, source: S) -> Self {
        Self {
            registry,
            source,
            dispatcher: ResponseDispatcher::new(),
            connection: None,
            state: ConnectionState::Disconnected,
        }
    }

    pub fn registry(&self) -> &TelemetryRegistry {
        &self.registry
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// True between a successful `open` and the next disconnect.
    pub fn is_open(&self) -> bool {
        self.connection.is_some()
    }

    pub fn dispatcher_stats(&self) -> DispatcherStats {
        self.dispatcher.stats()
    }

    /// Open a session on the source. The controller stays `Disconnected`
    /// until the source confirms with `SourceEvent::Open`.
    pub fn open(&mut self, session_name: &str) -> Result<(), SourceError> {
        if self.connection.is_some() {
            return Err(SourceError::AlreadyOpen);
        }
        let handle = self.source.open(session_name)?;
        debug!(session = %handle.session_name(), id = handle.id(), "Telemetry session opened");
        self.connection = Some(handle);
        Ok(())
    }

    /// The source confirmed the session: register every field that is not
    /// registered yet. Returns the number of fields registered.
    pub fn on_connection_established(&mut self) -> usize {
        self.state = ConnectionState::Connected;

        let mut registered = 0usize;
        for handle in self.registry.handles() {
            let Some(field) = self.registry.get_mut(handle) else {
                continue;
            };
            if field.is_registered() {
                continue;
            }
            if try_register(&mut self.source, self.connection.as_ref(), field) {
                registered = registered.saturating_add(1);
            }
        }

        info!(
            registered,
            total = self.registry.len(),
            "Telemetry connection established"
        );
        registered
    }

    /// Advance every field one step, in registry order.
    pub fn on_tick(&mut self) -> TickReport {
        let mut report = TickReport::default();
        let connection = self.connection.as_ref();

        for field in self.registry.iter_mut() {
            if !field.is_registered() {
                if try_register(&mut self.source, connection, field) {
                    report.registered = report.registered.saturating_add(1);
                } else {
                    report.registration_failed = report.registration_failed.saturating_add(1);
                    continue;
                }
            }

            if field.is_in_flight() {
                field.record_missed_poll();
                report.skipped_in_flight = report.skipped_in_flight.saturating_add(1);
                trace!(
                    field = %field.name(),
                    missed_polls = field.missed_polls(),
                    "Request still outstanding; skipping poll"
                );
                continue;
            }

            // Registered fields always have a connection; the guard in
            // try_register never marks a field registered without one.
            let Some(connection) = connection else {
                continue;
            };
            self.source
                .request_field(connection, field.request_id(), field.definition_id());
            field.mark_requested();
            report.requested = report.requested.saturating_add(1);
        }

        trace!(
            requested = report.requested,
            skipped = report.skipped_in_flight,
            registered = report.registered,
            failed = report.registration_failed,
            "Tick processed"
        );
        report
    }

    /// Route a source response to its field.
    pub fn on_response(&mut self, request_id: RequestId, value: f64) -> DispatchOutcome {
        self.dispatcher.dispatch(&mut self.registry, request_id, value)
    }

    /// Tear down the session: close it on the source and reset every field
    /// so the next session re-registers and re-polls from scratch.
    pub fn on_disconnected(&mut self) {
        if let Some(handle) = self.connection.take() {
            debug!(id = handle.id(), "Closing telemetry session");
            self.source.close(handle);
        }
        self.state = ConnectionState::Disconnected;
        self.registry.reset_all();
        info!("Telemetry connection reset; all fields pending");
    }
}

fn try_register<S: TelemetrySource>(
    source: &mut S,
    connection: Option<&ConnectionHandle>,
    field: &mut crate::field::TelemetryField,
) -> bool {
    let Some(connection) = connection else {
        trace!(field = %field.name(), "No open session; registration deferred");
        return false;
    };

    match source.register_field(connection, field.definition_id(), field.name(), field.unit()) {
        Ok(()) => {
            field.mark_registered();
            debug!(
                field = %field.name(),
                definition_id = %field.definition_id(),
                "Field registered"
            );
            true
        }
        Err(e) => {
            warn!(field = %field.name(), error = %e, "Field registration failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::DefinitionId;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Open(String),
        Close,
        Register(DefinitionId, String),
        Request(RequestId),
    }

    #[derive(Default)]
    struct RecordingSource {
        calls: Vec<Call>,
        refuse: Vec<String>,
        fail_open: bool,
    }

    impl TelemetrySource for RecordingSource {
        fn open(&mut self, session_name: &str) -> Result<ConnectionHandle, SourceError> {
            if self.fail_open {
                return Err(SourceError::OpenFailed {
                    session: session_name.to_string(),
                    reason: "simulator not running".to_string(),
                });
            }
            self.calls.push(Call::Open(session_name.to_string()));
            Ok(ConnectionHandle::new(1, session_name))
        }

        fn close(&mut self, _handle: ConnectionHandle) {
            self.calls.push(Call::Close);
        }

        fn register_field(
            &mut self,
            _handle: &ConnectionHandle,
            definition_id: DefinitionId,
            name: &str,
            _unit: &str,
        ) -> Result<(), SourceError> {
            self.calls
                .push(Call::Register(definition_id, name.to_string()));
            if self.refuse.iter().any(|r| r == name) {
                return Err(SourceError::Refused {
                    name: name.to_string(),
                });
            }
            Ok(())
        }

        fn request_field(
            &mut self,
            _handle: &ConnectionHandle,
            request_id: RequestId,
            _definition_id: DefinitionId,
        ) {
            self.calls.push(Call::Request(request_id));
        }
    }

    fn single_field() -> Result<PollingController<RecordingSource>, Box<dyn std::error::Error>> {
        let registry = TelemetryRegistry::with_fields([("X", "unit")])?;
        Ok(PollingController::new(registry, RecordingSource::default()))
    }

    fn requests(controller: &PollingController<RecordingSource>) -> usize {
        controller
            .source()
            .calls
            .iter()
            .filter(|c| matches!(c, Call::Request(_)))
            .count()
    }

    #[test]
    fn test_tick_without_session_requests_nothing() -> TestResult {
        let mut controller = single_field()?;
        let report = controller.on_tick();
        assert_eq!(report.registration_failed, 1);
        assert_eq!(report.requested, 0);
        assert!(controller.source().calls.is_empty());
        Ok(())
    }

    #[test]
    fn test_in_flight_field_is_not_requested_twice() -> TestResult {
        let mut controller = single_field()?;
        controller.open("test")?;
        controller.on_connection_established();

        let first = controller.on_tick();
        assert_eq!(first.requested, 1);
        let second = controller.on_tick();
        assert_eq!(second.requested, 0);
        assert_eq!(second.skipped_in_flight, 1);
        assert_eq!(requests(&controller), 1);

        let field = controller.registry().iter().next().ok_or("no field")?;
        assert!(field.is_in_flight());
        assert_eq!(field.missed_polls(), 1);
        Ok(())
    }

    #[test]
    fn test_response_reopens_polling() -> TestResult {
        let mut controller = single_field()?;
        controller.open("test")?;
        controller.on_connection_established();
        controller.on_tick();

        let outcome = controller.on_response(RequestId(0), 42.5);
        assert!(matches!(outcome, DispatchOutcome::Updated(_)));
        let report = controller.on_tick();
        assert_eq!(report.requested, 1);
        assert_eq!(requests(&controller), 2);
        Ok(())
    }

    #[test]
    fn test_refused_registration_is_retried_each_tick() -> TestResult {
        let registry = TelemetryRegistry::with_fields([("A", "u"), ("B", "u")])?;
        let source = RecordingSource {
            refuse: vec!["B".to_string()],
            ..Default::default()
        };
        let mut controller = PollingController::new(registry, source);
        controller.open("test")?;
        assert_eq!(controller.on_connection_established(), 1);

        let report = controller.on_tick();
        assert_eq!(report.registration_failed, 1);
        assert_eq!(report.requested, 1);

        controller.source_mut().refuse.clear();
        let report = controller.on_tick();
        assert_eq!(report.registered, 1);
        // A is still waiting; B registered and polled in the same tick.
        assert_eq!(report.requested, 1);
        assert_eq!(report.skipped_in_flight, 1);
        Ok(())
    }

    #[test]
    fn test_disconnect_forces_full_reregistration() -> TestResult {
        let mut controller = single_field()?;
        controller.open("first")?;
        controller.on_connection_established();
        controller.on_tick();

        controller.on_disconnected();
        assert_eq!(controller.state(), ConnectionState::Disconnected);
        assert!(!controller.is_open());
        let field = controller.registry().iter().next().ok_or("no field")?;
        assert!(!field.is_registered());
        assert!(!field.is_in_flight());

        controller.source_mut().calls.clear();
        controller.open("second")?;
        controller.on_connection_established();
        controller.on_tick();
        assert_eq!(
            controller.source().calls,
            vec![
                Call::Open("second".to_string()),
                Call::Register(DefinitionId(0), "X".to_string()),
                Call::Request(RequestId(0)),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_open_twice_is_rejected() -> TestResult {
        let mut controller = single_field()?;
        controller.open("a")?;
        assert_eq!(controller.open("b"), Err(SourceError::AlreadyOpen));
        Ok(())
    }

    #[test]
    fn test_open_failure_leaves_controller_closed() -> TestResult {
        let registry = TelemetryRegistry::reference()?;
        let source = RecordingSource {
            fail_open: true,
            ..Default::default()
        };
        let mut controller = PollingController::new(registry, source);
        assert!(matches!(
            controller.open("bridge"),
            Err(SourceError::OpenFailed { .. })
        ));
        assert!(!controller.is_open());
        assert_eq!(controller.state(), ConnectionState::Disconnected);
        Ok(())
    }
}
