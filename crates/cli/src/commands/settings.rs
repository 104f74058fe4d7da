//! Destination settings check.

use crate::commands::SettingsCommands;
use crate::error::CliError;
use crate::output;
use anyhow::Result;
use avionics_bridge_core::ConnectionSettings;

pub fn execute(cmd: &SettingsCommands, json: bool) -> Result<()> {
    match cmd {
        SettingsCommands::Check {
            mode,
            address,
            port,
        } => {
            let settings = ConnectionSettings::resolve((*mode).into(), address.as_deref(), port)
                .map_err(CliError::InvalidSettings)?;
            output::print_settings(&settings, json);
            Ok(())
        }
    }
}
