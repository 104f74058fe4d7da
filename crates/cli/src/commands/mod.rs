//! Command implementations for avbridgectl CLI

pub mod config;
pub mod frame;
pub mod monitor;
pub mod settings;

use avionics_bridge_core::DestinationMode;
use clap::{Args, Subcommand};

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Print the configuration
    Show,

    /// Check the configuration without starting the bridge
    Validate,

    /// Print the configuration file location
    Path,
}

#[derive(Subcommand)]
pub enum SettingsCommands {
    /// Resolve a destination the way the bridge does before broadcasting
    Check {
        /// Destination mode
        #[arg(long, value_enum, default_value = "broadcast")]
        mode: ModeArg,
        /// Target IPv4 address (unicast only)
        #[arg(long)]
        address: Option<String>,
        /// Destination port
        #[arg(long, default_value = "11000")]
        port: String,
    },
}

#[derive(Subcommand)]
pub enum FrameCommands {
    /// Decode one hex-encoded frame
    Decode {
        /// Frame bytes as hex
        hex: String,
        /// Expected number of field values (inferred from length if omitted)
        #[arg(long)]
        fields: Option<usize>,
    },
}

#[derive(Args)]
pub struct MonitorArgs {
    /// UDP port to listen on
    #[arg(short, long, default_value = "11000")]
    pub port: u16,

    /// Local address to bind
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: std::net::Ipv4Addr,

    /// Stop after this many frames
    #[arg(short = 'n', long)]
    pub count: Option<u64>,

    /// Stop when no frame arrives for this long
    #[arg(long, default_value = "5000")]
    pub timeout_ms: u64,
}

#[derive(Clone, Copy, clap::ValueEnum)]
pub enum ModeArg {
    Broadcast,
    Unicast,
}

impl From<ModeArg> for DestinationMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Broadcast => DestinationMode::Broadcast,
            ModeArg::Unicast => DestinationMode::Unicast,
        }
    }
}
