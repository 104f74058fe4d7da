//! UDP transport for telemetry frames.
//!
//! Frames are fire-and-forget: a failed send is reported to the caller and
//! never retried here. The [`FrameSink`] trait is the seam the bridge runtime
//! writes through, so tests can swap the socket for a [`MemorySink`].

#![deny(static_mut_refs)]

use async_trait::async_trait;
use avionics_bridge_core::ConnectionSettings;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::net::UdpSocket;
use tracing::info;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to bind UDP socket at {addr}: {source}")]
    Bind {
        addr: SocketAddrV4,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to configure UDP socket: {0}")]
    Configure(#[source] std::io::Error),

    #[error("Failed to connect UDP socket to {addr}: {source}")]
    Connect {
        addr: SocketAddrV4,
        #[source]
        source: std::io::Error,
    },

    #[error("Send failed: {0}")]
    Send(#[source] std::io::Error),

    #[error("Short send: wrote {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },
}

pub type TransportResult<T> = Result<T, TransportError>;

/// Destination for encoded frames.
#[async_trait]
pub trait FrameSink: Send + Sync {
    /// Send one frame as a single datagram.
    async fn send(&self, frame: &[u8]) -> TransportResult<usize>;

    /// Where frames are going.
    fn destination(&self) -> SocketAddrV4;
}

/// UDP socket bound to an ephemeral port and connected to one destination.
pub struct UdpFrameSender {
    socket: UdpSocket,
    settings: ConnectionSettings,
}

impl UdpFrameSender {
    /// Bind an ephemeral port on all interfaces and connect to `settings`.
    pub async fn connect(settings: &ConnectionSettings) -> TransportResult<Self> {
        Self::connect_from(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0), settings).await
    }

    /// As [`connect`](Self::connect), binding to `bind` instead.
    pub async fn connect_from(
        bind: SocketAddrV4,
        settings: &ConnectionSettings,
    ) -> TransportResult<Self> {
        let socket = UdpSocket::bind(bind)
            .await
            .map_err(|source| TransportError::Bind { addr: bind, source })?;

        if settings.is_broadcast() {
            socket
                .set_broadcast(true)
                .map_err(TransportError::Configure)?;
            socket
                .set_multicast_loop_v4(false)
                .map_err(TransportError::Configure)?;
        }

        let destination = settings.destination();
        socket
            .connect(destination)
            .await
            .map_err(|source| TransportError::Connect {
                addr: destination,
                source,
            })?;

        info!(
            mode = %settings.mode(),
            destination = %destination,
            local = ?socket.local_addr().ok(),
            "UDP frame sender ready"
        );

        Ok(Self {
            socket,
            settings: *settings,
        })
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    pub fn local_addr(&self) -> TransportResult<SocketAddr> {
        self.socket.local_addr().map_err(TransportError::Configure)
    }
}

#[async_trait]
impl FrameSink for UdpFrameSender {
    async fn send(&self, frame: &[u8]) -> TransportResult<usize> {
        let written = self.socket.send(frame).await.map_err(TransportError::Send)?;
        if written != frame.len() {
            return Err(TransportError::ShortWrite {
                written,
                expected: frame.len(),
            });
        }
        Ok(written)
    }

    fn destination(&self) -> SocketAddrV4 {
        self.settings.destination()
    }
}

/// In-memory sink that records every frame, optionally failing on demand.
#[derive(Clone)]
pub struct MemorySink {
    destination: SocketAddrV4,
    frames: Arc<Mutex<Vec<Vec<u8>>>>,
    failing: Arc<Mutex<bool>>,
}

impl MemorySink {
    pub fn new(destination: SocketAddrV4) -> Self {
        Self {
            destination,
            frames: Arc::new(Mutex::new(Vec::new())),
            failing: Arc::new(Mutex::new(false)),
        }
    }

    /// Make subsequent sends fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        // Recover from mutex poisoning: a test double must never panic.
        *self.failing.lock().unwrap_or_else(|e| e.into_inner()) = failing;
    }

    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.frames
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.frames.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send(&self, frame: &[u8]) -> TransportResult<usize> {
        if *self.failing.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(TransportError::Send(std::io::Error::new(
                std::io::ErrorKind::NetworkUnreachable,
                "network unreachable",
            )));
        }
        self.frames
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(frame.to_vec());
        Ok(frame.len())
    }

    fn destination(&self) -> SocketAddrV4 {
        self.destination
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avionics_bridge_core::DestinationMode;
    use std::time::Duration;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[tokio::test]
    async fn test_unicast_frame_reaches_listener() -> TestResult {
        let listener = UdpSocket::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();

        let settings = ConnectionSettings::resolve(
            DestinationMode::Unicast,
            Some("127.0.0.1"),
            &port.to_string(),
        )?;
        let sender = UdpFrameSender::connect(&settings).await?;
        assert_eq!(sender.destination(), SocketAddrV4::new(Ipv4Addr::LOCALHOST, port));

        let frame = [7u8; 48];
        assert_eq!(sender.send(&frame).await?, 48);

        let mut buf = [0u8; 128];
        let (len, _) =
            tokio::time::timeout(Duration::from_secs(2), listener.recv_from(&mut buf)).await??;
        assert_eq!(buf.get(..len), Some(&frame[..]));
        Ok(())
    }

    #[tokio::test]
    async fn test_broadcast_sender_targets_limited_broadcast() -> TestResult {
        let settings = ConnectionSettings::broadcast(11000);
        // Broadcast may be unavailable in sandboxed environments; only the
        // configured destination is checked when the socket can be created.
        if let Ok(sender) = UdpFrameSender::connect(&settings).await {
            assert_eq!(sender.destination().to_string(), "255.255.255.255:11000");
            assert!(sender.settings().is_broadcast());
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_memory_sink_records_and_fails_on_demand() -> TestResult {
        let sink = MemorySink::new(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 9));
        sink.send(&[1, 2, 3]).await?;
        sink.set_failing(true);
        assert!(matches!(sink.send(&[4]).await, Err(TransportError::Send(_))));
        assert_eq!(sink.frames(), vec![vec![1u8, 2, 3]]);
        Ok(())
    }
}
