//! Event loop driving a [`Bridge`].
//!
//! One task owns the bridge and multiplexes three inputs with
//! `tokio::select!`: operator commands, source events and the tick timer.
//! The timer only exists while the bridge is ticking, i.e. between the
//! source's open notification and the next disconnect.

use crate::bridge::{Bridge, BridgeStatus};
use crate::simulated::SourceEventReceiver;
use avionics_bridge_core::{ConnectionSettings, SourceEvent, TelemetrySource};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};

/// Operator request for the bridge loop.
#[derive(Debug)]
pub enum BridgeCommand {
    Connect,
    Disconnect,
    ToggleConnect,
    StartBroadcast(ConnectionSettings),
    StopBroadcast,
    ToggleBroadcast,
    /// New tick period in milliseconds; clamped
    SetTickInterval(u64),
    Status(oneshot::Sender<BridgeStatus>),
    Shutdown,
}

struct Ticker {
    period: Duration,
    interval: Interval,
}

impl Ticker {
    fn new(period: Duration) -> Self {
        // First tick one period after the timer starts, not immediately.
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { period, interval }
    }
}

/// Run until `Shutdown` is received or both input channels close.
///
/// On exit the broadcast socket is dropped and the session closed.
pub async fn run<S: TelemetrySource>(
    bridge: &mut Bridge<S>,
    mut commands: mpsc::Receiver<BridgeCommand>,
    mut events: SourceEventReceiver,
) {
    let mut ticker: Option<Ticker> = None;
    let mut commands_open = true;
    let mut events_open = true;

    info!("Bridge loop started");
    while commands_open || events_open {
        sync_ticker(bridge, &mut ticker);
        let was_connected = bridge.is_connected();

        tokio::select! {
            command = commands.recv(), if commands_open => match command {
                Some(BridgeCommand::Shutdown) => {
                    info!("Shutdown requested");
                    break;
                }
                Some(command) => handle_command(bridge, command).await,
                None => {
                    debug!("Command channel closed");
                    commands_open = false;
                }
            },
            event = events.recv(), if events_open => match event {
                Some(event) => bridge.handle_source_event(event),
                None => {
                    debug!("Source event channel closed");
                    events_open = false;
                }
            },
            () = next_tick(&mut ticker) => {
                bridge.tick().await;
            }
        }

        if was_connected && !bridge.is_connected() {
            discard_queued_responses(bridge, &mut events);
        }
    }

    bridge.stop_broadcast();
    bridge.disconnect();
    info!("Bridge loop stopped");
}

async fn handle_command<S: TelemetrySource>(bridge: &mut Bridge<S>, command: BridgeCommand) {
    match command {
        BridgeCommand::Connect => {
            if let Err(e) = bridge.connect() {
                warn!(error = %e, "Connect failed");
            }
        }
        BridgeCommand::Disconnect => bridge.disconnect(),
        BridgeCommand::ToggleConnect => {
            if let Err(e) = bridge.toggle_connect() {
                warn!(error = %e, "Connect failed");
            }
        }
        BridgeCommand::StartBroadcast(settings) => {
            if let Err(e) = bridge.start_broadcast(settings).await {
                warn!(error = %e, destination = %settings, "Broadcast not started");
            }
        }
        BridgeCommand::StopBroadcast => bridge.stop_broadcast(),
        BridgeCommand::ToggleBroadcast => {
            bridge.toggle_broadcast().await;
        }
        BridgeCommand::SetTickInterval(ms) => {
            bridge.set_tick_interval(ms);
        }
        BridgeCommand::Status(reply) => {
            if reply.send(bridge.status()).is_err() {
                debug!("Status requester went away");
            }
        }
        // Handled by the loop itself.
        BridgeCommand::Shutdown => {}
    }
}

/// Drop answers the closed session queued before it ended.
///
/// Request ids repeat across sessions, so a leftover answer would clear the
/// in-flight flag of the next session's still unanswered request. Other
/// queued events are handled normally.
fn discard_queued_responses<S: TelemetrySource>(
    bridge: &mut Bridge<S>,
    events: &mut SourceEventReceiver,
) {
    let mut discarded = 0u64;
    while let Ok(event) = events.try_recv() {
        match event {
            SourceEvent::DataResponse { .. } => discarded = discarded.saturating_add(1),
            other => bridge.handle_source_event(other),
        }
    }
    if discarded > 0 {
        debug!(discarded, "Discarded responses queued by the closed session");
    }
}

/// Start, stop or re-period the timer to match the bridge.
fn sync_ticker<S: TelemetrySource>(bridge: &Bridge<S>, ticker: &mut Option<Ticker>) {
    if !bridge.is_ticking() {
        if ticker.take().is_some() {
            debug!("Tick timer stopped");
        }
        return;
    }

    let period = bridge.tick_interval();
    if ticker.as_ref().is_some_and(|t| t.period == period) {
        return;
    }
    debug!(period_ms = period.as_millis(), "Tick timer started");
    *ticker = Some(Ticker::new(period));
}

async fn next_tick(ticker: &mut Option<Ticker>) {
    match ticker {
        Some(ticker) => {
            ticker.interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;
    use crate::simulated::SimulatedSource;
    use avionics_bridge_core::FrameTimestamp;
    use avionics_bridge_transport::MemorySink;
    use std::net::{Ipv4Addr, SocketAddrV4};

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    async fn status(
        commands: &mpsc::Sender<BridgeCommand>,
    ) -> Result<BridgeStatus, Box<dyn std::error::Error>> {
        let (tx, rx) = oneshot::channel();
        commands.send(BridgeCommand::Status(tx)).await?;
        Ok(rx.await?)
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_polls_and_broadcasts_while_connected() -> TestResult {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let config = BridgeConfig {
            tick_interval_ms: 100,
            ..Default::default()
        };
        let mut bridge = Bridge::new(
            config,
            SimulatedSource::new(event_tx),
            Box::new(|| FrameTimestamp(0)),
        )?;
        let sink = MemorySink::new(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 11000));
        bridge.start_broadcast_with(Box::new(sink.clone()));

        let (command_tx, command_rx) = mpsc::channel(8);
        let driver = tokio::spawn(async move {
            run(&mut bridge, command_rx, event_rx).await;
            bridge
        });

        // Nothing is sent before the session opens.
        tokio::time::sleep(Duration::from_millis(350)).await;
        assert!(sink.is_empty());

        command_tx.send(BridgeCommand::Connect).await?;
        tokio::time::sleep(Duration::from_millis(350)).await;
        let connected = status(&command_tx).await?;
        assert!(connected.ticking);
        assert_eq!(connected.tick_count, 3);
        assert_eq!(sink.len(), 3);

        command_tx.send(BridgeCommand::Disconnect).await?;
        let sent = sink.len();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(sink.len(), sent);

        command_tx.send(BridgeCommand::Shutdown).await?;
        let bridge = driver.await?;
        assert!(!bridge.is_broadcasting());
        assert!(!bridge.is_connected());
        Ok(())
    }

    #[tokio::test]
    async fn test_disconnect_discards_responses_already_queued() -> TestResult {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let mut bridge = Bridge::new(
            BridgeConfig::default(),
            SimulatedSource::new(event_tx),
            Box::new(|| FrameTimestamp(0)),
        )?;
        bridge.connect()?;
        while let Ok(event) = event_rx.try_recv() {
            bridge.handle_source_event(event);
        }

        // Immediate answers sit in the channel, followed by an exception.
        assert_eq!(bridge.tick().await.requested, 5);
        bridge.source_mut().raise_exception(1);
        bridge.disconnect();
        discard_queued_responses(&mut bridge, &mut event_rx);

        assert!(matches!(event_rx.try_recv(), Err(mpsc::error::TryRecvError::Empty)));
        let current = bridge.status();
        assert!(current.fields.iter().all(|f| f.value.abs() < f64::EPSILON && !f.in_flight));
        assert_eq!(current.errors.len(), 1);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_interval_change_takes_effect() -> TestResult {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let mut bridge = Bridge::new(
            BridgeConfig::default(),
            SimulatedSource::new(event_tx),
            Box::new(|| FrameTimestamp(0)),
        )?;
        let (command_tx, command_rx) = mpsc::channel(8);
        let driver = tokio::spawn(async move {
            run(&mut bridge, command_rx, event_rx).await;
        });

        command_tx.send(BridgeCommand::Connect).await?;
        command_tx.send(BridgeCommand::SetTickInterval(50)).await?;
        tokio::time::sleep(Duration::from_millis(520)).await;

        let current = status(&command_tx).await?;
        assert_eq!(current.tick_interval_ms, 50);
        assert_eq!(current.tick_count, 10);

        command_tx.send(BridgeCommand::Shutdown).await?;
        driver.await?;
        Ok(())
    }
}
