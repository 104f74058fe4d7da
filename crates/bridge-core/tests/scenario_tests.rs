//! End-to-end polling scenarios against a scripted telemetry source.

use avionics_bridge_core::frame::encode;
use avionics_bridge_core::{
    ConnectionHandle, ConnectionSettings, DefinitionId, DestinationMode, FrameTimestamp,
    PollingController, REFERENCE_FRAME_LEN, RequestId, SettingsError, SourceError,
    TelemetryFrame, TelemetryRegistry, TelemetrySource,
};

type TestResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Default)]
struct ScriptedSource {
    registrations: Vec<DefinitionId>,
    requests: Vec<RequestId>,
    open_sessions: u64,
}

impl TelemetrySource for ScriptedSource {
    fn open(&mut self, session_name: &str) -> Result<ConnectionHandle, SourceError> {
        self.open_sessions = self.open_sessions.saturating_add(1);
        Ok(ConnectionHandle::new(self.open_sessions, session_name))
    }

    fn close(&mut self, _handle: ConnectionHandle) {}

    fn register_field(
        &mut self,
        _handle: &ConnectionHandle,
        definition_id: DefinitionId,
        _name: &str,
        _unit: &str,
    ) -> Result<(), SourceError> {
        self.registrations.push(definition_id);
        Ok(())
    }

    fn request_field(
        &mut self,
        _handle: &ConnectionHandle,
        request_id: RequestId,
        _definition_id: DefinitionId,
    ) {
        self.requests.push(request_id);
    }
}

fn decoded_value(registry: &TelemetryRegistry) -> Result<f64, Box<dyn std::error::Error>> {
    let bytes = encode(registry, FrameTimestamp(1));
    let frame = TelemetryFrame::decode(&bytes, registry.len())?;
    Ok(*frame.values.first().ok_or("empty frame")?)
}

#[test]
fn single_field_request_response_cycle() -> TestResult {
    let registry = TelemetryRegistry::with_fields([("X", "unit")])?;
    let mut controller = PollingController::new(registry, ScriptedSource::default());
    controller.open("scenario")?;
    assert_eq!(controller.on_connection_established(), 1);

    // First tick issues the request.
    controller.on_tick();
    assert_eq!(controller.source().requests, vec![RequestId(0)]);
    let field = controller.registry().iter().next().ok_or("no field")?;
    assert!(field.is_in_flight());
    assert_eq!(decoded_value(controller.registry())?.to_bits(), 0.0f64.to_bits());

    // Second tick is dropped: still waiting.
    controller.on_tick();
    assert_eq!(controller.source().requests.len(), 1);
    let field = controller.registry().iter().next().ok_or("no field")?;
    assert!(field.is_in_flight());

    controller.on_response(RequestId(0), 42.5);
    let field = controller.registry().iter().next().ok_or("no field")?;
    assert!(!field.is_in_flight());
    assert_eq!(field.value().to_bits(), 42.5f64.to_bits());
    assert_eq!(decoded_value(controller.registry())?.to_bits(), 42.5f64.to_bits());

    controller.on_tick();
    assert_eq!(controller.source().requests, vec![RequestId(0), RequestId(0)]);
    Ok(())
}

#[test]
fn reconnect_registers_every_field_before_any_request() -> TestResult {
    let mut controller =
        PollingController::new(TelemetryRegistry::reference()?, ScriptedSource::default());
    controller.open("first")?;
    controller.on_connection_established();
    controller.on_tick();

    controller.on_disconnected();
    controller.source_mut().registrations.clear();
    controller.source_mut().requests.clear();

    controller.open("second")?;
    controller.on_connection_established();
    assert_eq!(controller.source().registrations.len(), 5);
    assert!(controller.source().requests.is_empty());

    let report = controller.on_tick();
    assert_eq!(report.requested, 5);
    assert_eq!(report.registered, 0);
    Ok(())
}

#[test]
fn frame_is_full_length_whatever_the_field_state() -> TestResult {
    let mut controller =
        PollingController::new(TelemetryRegistry::reference()?, ScriptedSource::default());
    assert_eq!(encode(controller.registry(), FrameTimestamp(0)).len(), REFERENCE_FRAME_LEN);

    controller.open("len")?;
    controller.on_connection_established();
    controller.on_tick();
    controller.on_response(RequestId(2), 64.0);
    let bytes = encode(controller.registry(), FrameTimestamp(0));
    assert_eq!(bytes.len(), REFERENCE_FRAME_LEN);
    assert_eq!(bytes.get(24..32), Some(&64.0f64.to_le_bytes()[..]));
    Ok(())
}

#[test]
fn invalid_unicast_address_is_declined() {
    let resolved =
        ConnectionSettings::resolve(DestinationMode::Unicast, Some("192.168.1.300"), "11000");
    assert_eq!(
        resolved,
        Err(SettingsError::InvalidAddress("192.168.1.300".to_string()))
    );
}
