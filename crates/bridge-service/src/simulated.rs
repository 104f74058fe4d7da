//! In-process telemetry source flying a slow circuit.
//!
//! Stands in for the simulator SDK. It answers requests asynchronously on the
//! event channel, after a configurable latency, so the bridge sees the same
//! request / late-response pattern as with a real simulator.

use avionics_bridge_core::{
    ConnectionHandle, DefinitionId, RequestId, SourceError, SourceEvent, TelemetrySource,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::f64::consts::{PI, TAU};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, trace};

pub type SourceEventSender = mpsc::UnboundedSender<SourceEvent>;
pub type SourceEventReceiver = mpsc::UnboundedReceiver<SourceEvent>;

/// Circuit flown around a fixed point.
#[derive(Debug, Clone, Copy)]
pub struct FlightPath {
    pub center_lat_deg: f64,
    pub center_lon_deg: f64,
    pub radius_deg: f64,
    pub period: Duration,
    pub ground_speed_mps: f64,
    /// Heading offset from track, radians
    pub crab_angle_rad: f64,
}

impl Default for FlightPath {
    fn default() -> Self {
        Self {
            center_lat_deg: 47.4502,
            center_lon_deg: -122.3088,
            radius_deg: 0.05,
            period: Duration::from_secs(300),
            ground_speed_mps: 65.0,
            crab_angle_rad: 0.02,
        }
    }
}

impl FlightPath {
    /// Value of simulator variable `name` after `elapsed` on the circuit.
    pub fn sample(&self, name: &str, elapsed: Duration) -> f64 {
        let period = self.period.as_secs_f64().max(f64::EPSILON);
        let angle = TAU * (elapsed.as_secs_f64() / period);
        let track = (angle + PI / 2.0).rem_euclid(TAU);

        match name {
            "GPS POSITION LAT" => self.center_lat_deg + self.radius_deg * angle.cos(),
            "GPS POSITION LON" => {
                let scale = self.center_lat_deg.to_radians().cos().max(0.01);
                self.center_lon_deg + self.radius_deg * angle.sin() / scale
            }
            "GPS GROUND SPEED" => self.ground_speed_mps,
            "GPS GROUND TRUE TRACK" => track,
            "GPS GROUND TRUE HEADING" => (track - self.crab_angle_rad).rem_euclid(TAU),
            _ => 0.0,
        }
    }
}

struct Session {
    id: u64,
    started: Instant,
    definitions: HashMap<DefinitionId, String>,
}

/// Id of the open session, `0` when closed.
///
/// Delayed responses hold the lock while they are queued, so once a session
/// is closed none of its answers can reach the event channel.
type LiveSession = Arc<Mutex<u64>>;

pub struct SimulatedSource {
    events: SourceEventSender,
    live: LiveSession,
    path: FlightPath,
    latency: Duration,
    drop_every: u32,
    requests_seen: u64,
    next_session_id: u64,
    session: Option<Session>,
}

impl SimulatedSource {
    pub fn new(events: SourceEventSender) -> Self {
        Self {
            events,
            live: Arc::new(Mutex::new(0)),
            path: FlightPath::default(),
            latency: Duration::ZERO,
            drop_every: 0,
            requests_seen: 0,
            next_session_id: 1,
            session: None,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Leave every `n`th request unanswered; `0` answers everything.
    pub fn with_drop_every(mut self, n: u32) -> Self {
        self.drop_every = n;
        self
    }

    pub fn with_path(mut self, path: FlightPath) -> Self {
        self.path = path;
        self
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    pub fn requests_seen(&self) -> u64 {
        self.requests_seen
    }

    /// Simulate the simulator shutting down.
    pub fn quit(&mut self) {
        if self.session.is_some() {
            self.end_session();
            self.emit(SourceEvent::Quit);
        }
    }

    /// Simulate a simulator-side exception notification.
    pub fn raise_exception(&self, code: u32) {
        self.emit(SourceEvent::Exception(code));
    }

    fn emit(&self, event: SourceEvent) {
        if self.events.send(event).is_err() {
            trace!("Source event receiver dropped");
        }
    }

    fn end_session(&mut self) {
        *self.live.lock() = 0;
        self.session = None;
    }

    fn session_for(&self, handle: &ConnectionHandle) -> Option<&Session> {
        self.session.as_ref().filter(|s| s.id == handle.id())
    }

    fn should_drop(&mut self) -> bool {
        self.requests_seen = self.requests_seen.saturating_add(1);
        self.drop_every != 0 && self.requests_seen % u64::from(self.drop_every) == 0
    }

    fn respond(&self, session_id: u64, request_id: RequestId, value: f64) {
        let event = SourceEvent::DataResponse { request_id, value };
        if self.latency.is_zero() {
            self.emit(event);
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let events = self.events.clone();
                let live = Arc::clone(&self.live);
                let latency = self.latency;
                runtime.spawn(async move {
                    tokio::time::sleep(latency).await;
                    let queued = {
                        let live = live.lock();
                        *live == session_id && events.send(event).is_ok()
                    };
                    if !queued {
                        trace!(request_id = %request_id, session_id, "Delayed response discarded");
                    }
                });
            }
            Err(_no_runtime) => self.emit(event),
        }
    }
}

impl TelemetrySource for SimulatedSource {
    fn open(&mut self, session_name: &str) -> Result<ConnectionHandle, SourceError> {
        if self.session.is_some() {
            return Err(SourceError::AlreadyOpen);
        }
        if self.events.is_closed() {
            return Err(SourceError::OpenFailed {
                session: session_name.to_string(),
                reason: "event channel closed".to_string(),
            });
        }

        let id = self.next_session_id;
        self.next_session_id = self.next_session_id.saturating_add(1);
        *self.live.lock() = id;
        self.session = Some(Session {
            id,
            started: Instant::now(),
            definitions: HashMap::new(),
        });
        debug!(session = %session_name, id, "Simulated telemetry session opened");
        self.emit(SourceEvent::Open);
        Ok(ConnectionHandle::new(id, session_name))
    }

    fn close(&mut self, handle: ConnectionHandle) {
        if self.session_for(&handle).is_some() {
            self.end_session();
            debug!(id = handle.id(), "Simulated telemetry session closed");
        }
    }

    fn register_field(
        &mut self,
        handle: &ConnectionHandle,
        definition_id: DefinitionId,
        name: &str,
        _unit: &str,
    ) -> Result<(), SourceError> {
        let session = self
            .session
            .as_mut()
            .filter(|s| s.id == handle.id())
            .ok_or(SourceError::NotOpen)?;
        session.definitions.insert(definition_id, name.to_string());
        Ok(())
    }

    fn request_field(
        &mut self,
        handle: &ConnectionHandle,
        request_id: RequestId,
        definition_id: DefinitionId,
    ) {
        let Some(session) = self.session_for(handle) else {
            return;
        };
        let session_id = session.id;
        let value = session
            .definitions
            .get(&definition_id)
            .map(|name| self.path.sample(name, session.started.elapsed()));
        let Some(value) = value else {
            self.emit(SourceEvent::Exception(UNRECOGNIZED_ID));
            return;
        };

        if self.should_drop() {
            trace!(request_id = %request_id, "Simulated source dropping request");
            return;
        }
        self.respond(session_id, request_id, value);
    }
}

/// Exception code raised for requests against an undeclared definition.
pub const UNRECOGNIZED_ID: u32 = 3;
