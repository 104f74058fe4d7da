//! Broadcast destination resolution.
//!
//! Settings arrive as loosely typed user input (a mode, an optional address
//! string and a port string) and are resolved into a validated
//! [`ConnectionSettings`] before a socket is ever created.

use crate::error::SettingsError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::str::FromStr;

/// Port used by the reference instrument panel.
pub const DEFAULT_PORT: u16 = 11000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DestinationMode {
    /// Limited broadcast to `255.255.255.255`.
    #[default]
    Broadcast,
    /// A single IPv4 host.
    Unicast,
}

impl fmt::Display for DestinationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DestinationMode::Broadcast => f.write_str("broadcast"),
            DestinationMode::Unicast => f.write_str("unicast"),
        }
    }
}

impl FromStr for DestinationMode {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "broadcast" => Ok(DestinationMode::Broadcast),
            "unicast" => Ok(DestinationMode::Unicast),
            _ => Err(SettingsError::UnknownMode(s.to_string())),
        }
    }
}

/// A validated UDP destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    mode: DestinationMode,
    address: Ipv4Addr,
    port: u16,
}

impl ConnectionSettings {
    /// Validate raw destination input.
    ///
    /// The address is only consulted in unicast mode. The port must parse as
    /// a number in `1..=65535`; surrounding whitespace is tolerated.
    pub fn resolve(
        mode: DestinationMode,
        address: Option<&str>,
        port: &str,
    ) -> Result<Self, SettingsError> {
        let port = parse_port(port)?;
        let address = match mode {
            DestinationMode::Broadcast => Ipv4Addr::BROADCAST,
            DestinationMode::Unicast => {
                let raw = address
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .ok_or(SettingsError::MissingAddress)?;
                raw.parse::<Ipv4Addr>()
                    .map_err(|_parse| SettingsError::InvalidAddress(raw.to_string()))?
            }
        };
        Ok(Self {
            mode,
            address,
            port,
        })
    }

    pub fn broadcast(port: u16) -> Self {
        Self {
            mode: DestinationMode::Broadcast,
            address: Ipv4Addr::BROADCAST,
            port,
        }
    }

    pub fn unicast(address: Ipv4Addr, port: u16) -> Self {
        Self {
            mode: DestinationMode::Unicast,
            address,
            port,
        }
    }

    pub fn mode(&self) -> DestinationMode {
        self.mode
    }

    pub fn address(&self) -> Ipv4Addr {
        self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn destination(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.address, self.port)
    }

    pub fn is_broadcast(&self) -> bool {
        self.mode == DestinationMode::Broadcast
    }
}

impl fmt::Display for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.mode, self.destination())
    }
}

fn parse_port(raw: &str) -> Result<u16, SettingsError> {
    match raw.trim().parse::<u16>() {
        Ok(0) | Err(_) => Err(SettingsError::InvalidPort(raw.to_string())),
        Ok(port) => Ok(port),
    }
}
