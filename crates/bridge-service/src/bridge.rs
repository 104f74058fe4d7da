//! Bridge state: telemetry session, broadcast socket and counters.
//!
//! [`Bridge`] is driven from a single task (see [`crate::runtime::run`]); every
//! method takes `&mut self` and nothing here is shared across threads.

use crate::config::{BridgeConfig, clamp_tick_interval_ms};
use crate::error_log::{ErrorLog, ErrorLogEntry, describe_exception};
use avionics_bridge_core::{
    ConnectionSettings, ConnectionState, FieldSnapshot, FrameEncoder, FrameTimestamp,
    PollingController, RegistryError, SourceError, SourceEvent, TelemetryRegistry,
    TelemetrySource, TickReport,
};
use avionics_bridge_transport::{FrameSink, TransportResult, UdpFrameSender};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Supplies the timestamp for each outgoing frame.
pub type FrameClock = Box<dyn Fn() -> FrameTimestamp + Send + Sync>;

/// Serializable snapshot of the whole bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeStatus {
    pub connection: ConnectionState,
    pub session_open: bool,
    pub ticking: bool,
    /// `None` while not broadcasting
    pub destination: Option<String>,
    pub tick_interval_ms: u64,
    pub tick_count: u64,
    pub heartbeat: bool,
    pub frames_sent: u64,
    pub send_failures: u64,
    pub responses_ignored: u64,
    pub fields: Vec<FieldSnapshot>,
    pub errors: Vec<ErrorLogEntry>,
}

pub struct Bridge<S> {
    config: BridgeConfig,
    controller: PollingController<S>,
    encoder: FrameEncoder,
    sink: Option<Box<dyn FrameSink>>,
    error_log: ErrorLog,
    clock: FrameClock,
    tick_interval: Duration,
    ticking: bool,
    tick_count: u64,
    heartbeat: bool,
    frames_sent: u64,
    send_failures: u64,
}

impl<S: TelemetrySource> Bridge<S> {
    pub fn new(config: BridgeConfig, source: S, clock: FrameClock) -> Result<Self, RegistryError> {
        let registry = config.build_registry()?;
        Ok(Self::with_registry(config, registry, source, clock))
    }

    /// As [`new`](Self::new), stamping frames with the configured wall clock.
    pub fn with_system_clock(config: BridgeConfig, source: S) -> Result<Self, RegistryError> {
        let timestamp_clock = config.timestamp_clock;
        Self::new(
            config,
            source,
            Box::new(move || FrameTimestamp::now(timestamp_clock)),
        )
    }

    fn with_registry(
        config: BridgeConfig,
        registry: TelemetryRegistry,
        source: S,
        clock: FrameClock,
    ) -> Self {
        let tick_interval =
            Duration::from_millis(clamp_tick_interval_ms(config.tick_interval_ms));
        Self {
            error_log: ErrorLog::new(config.error_log_capacity),
            controller: PollingController::new(registry, source),
            encoder: FrameEncoder::new(),
            sink: None,
            clock,
            tick_interval,
            ticking: false,
            tick_count: 0,
            heartbeat: false,
            frames_sent: 0,
            send_failures: 0,
            config,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn registry(&self) -> &TelemetryRegistry {
        self.controller.registry()
    }

    pub fn source_mut(&mut self) -> &mut S {
        self.controller.source_mut()
    }

    pub fn is_connected(&self) -> bool {
        self.controller.is_open()
    }

    pub fn is_ticking(&self) -> bool {
        self.ticking
    }

    pub fn is_broadcasting(&self) -> bool {
        self.sink.is_some()
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    pub fn error_log(&self) -> &ErrorLog {
        &self.error_log
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    pub fn send_failures(&self) -> u64 {
        self.send_failures
    }

    /// Open the telemetry session. Polling starts once the source confirms.
    pub fn connect(&mut self) -> Result<(), SourceError> {
        if self.controller.is_open() {
            debug!("Connect requested while already connected");
            return Ok(());
        }
        self.controller.open(&self.config.session_name)?;
        info!(session = %self.config.session_name, "Connecting to telemetry source");
        Ok(())
    }

    /// Close the session and stop polling. Cached values are kept.
    pub fn disconnect(&mut self) {
        if !self.controller.is_open() && !self.ticking {
            return;
        }
        self.controller.on_disconnected();
        self.ticking = false;
        self.tick_count = 0;
        self.heartbeat = false;
        info!("Disconnected from telemetry source");
    }

    pub fn toggle_connect(&mut self) -> Result<(), SourceError> {
        if self.controller.is_open() {
            self.disconnect();
            Ok(())
        } else {
            self.connect()
        }
    }

    /// Open a UDP socket for `settings` and start sending frames to it.
    pub async fn start_broadcast(&mut self, settings: ConnectionSettings) -> TransportResult<()> {
        let sender = UdpFrameSender::connect(&settings).await?;
        self.start_broadcast_with(Box::new(sender));
        Ok(())
    }

    /// Start sending frames to `sink`, replacing any current destination.
    pub fn start_broadcast_with(&mut self, sink: Box<dyn FrameSink>) {
        info!(destination = %sink.destination(), "Broadcast started");
        self.sink = Some(sink);
    }

    pub fn stop_broadcast(&mut self) {
        if let Some(sink) = self.sink.take() {
            info!(destination = %sink.destination(), "Broadcast stopped");
        }
    }

    /// Stop broadcasting, or start it with the configured destination.
    ///
    /// Invalid settings or a socket failure decline the start with a warning.
    /// Returns whether the bridge is broadcasting afterwards.
    pub async fn toggle_broadcast(&mut self) -> bool {
        if self.sink.is_some() {
            self.stop_broadcast();
            return false;
        }

        let settings = match self.config.broadcast.resolve() {
            Ok(settings) => settings,
            Err(e) => {
                warn!(error = %e, "Broadcast not started: invalid destination settings");
                return false;
            }
        };
        match self.start_broadcast(settings).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, destination = %settings, "Broadcast not started");
                false
            }
        }
    }

    /// Change the tick period, clamped to the supported range.
    pub fn set_tick_interval(&mut self, ms: u64) -> Duration {
        let clamped = clamp_tick_interval_ms(ms);
        if clamped != ms {
            debug!(requested = ms, applied = clamped, "Tick interval clamped");
        }
        self.tick_interval = Duration::from_millis(clamped);
        self.config.tick_interval_ms = clamped;
        info!(tick_interval_ms = clamped, "Tick interval changed");
        self.tick_interval
    }

    pub fn handle_source_event(&mut self, event: SourceEvent) {
        match event {
            SourceEvent::Open => {
                if !self.controller.is_open() {
                    debug!("Ignoring open notification without a session");
                    return;
                }
                self.controller.on_connection_established();
                self.ticking = true;
            }
            SourceEvent::Quit => {
                info!("Telemetry source quit");
                self.disconnect();
            }
            SourceEvent::Exception(code) => {
                let message = describe_exception(code);
                warn!(code, "{}", message);
                self.error_log.push(ErrorLogEntry {
                    received_at: chrono::Local::now().to_rfc3339(),
                    message,
                });
            }
            SourceEvent::DataResponse { request_id, value } => {
                trace!(request_id = %request_id, value, "Data response");
                self.controller.on_response(request_id, value);
            }
        }
    }

    /// One timer tick: poll every field, then send a frame if broadcasting.
    pub async fn tick(&mut self) -> TickReport {
        self.tick_count = self.tick_count.saturating_add(1);
        self.heartbeat = !self.heartbeat;

        let report = self.controller.on_tick();

        if let Some(sink) = self.sink.as_deref() {
            let timestamp = (self.clock)();
            let frame = self.encoder.encode(self.controller.registry(), timestamp);
            match sink.send(frame).await {
                Ok(written) => {
                    self.frames_sent = self.frames_sent.saturating_add(1);
                    trace!(bytes = written, tick = self.tick_count, "Frame sent");
                }
                Err(e) => {
                    self.send_failures = self.send_failures.saturating_add(1);
                    warn!(
                        error = %e,
                        destination = %sink.destination(),
                        failures = self.send_failures,
                        "Frame send failed"
                    );
                }
            }
        }

        report
    }

    pub fn status(&self) -> BridgeStatus {
        BridgeStatus {
            connection: self.controller.state(),
            session_open: self.controller.is_open(),
            ticking: self.ticking,
            destination: self.sink.as_ref().map(|s| s.destination().to_string()),
            tick_interval_ms: u64::try_from(self.tick_interval.as_millis()).unwrap_or(u64::MAX),
            tick_count: self.tick_count,
            heartbeat: self.heartbeat,
            frames_sent: self.frames_sent,
            send_failures: self.send_failures,
            responses_ignored: self.controller.dispatcher_stats().ignored,
            fields: self.controller.registry().snapshots(),
            errors: self.error_log.entries().cloned().collect(),
        }
    }
}
