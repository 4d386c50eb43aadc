//! Command dispatch: bridges CLI args -> core Commands -> output formatting.

pub mod config_cmd;
pub mod device_cmd;
pub mod devices;
pub mod watch;

use bridgewatch_core::{Command as CoreCommand, ControlCenter};

use crate::cli::Command;
use crate::config::Settings;
use crate::error::CliError;

/// Dispatch a registry-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    center: &ControlCenter,
    settings: &Settings,
) -> Result<(), CliError> {
    match cmd {
        Command::Watch(args) => watch::handle(center, &args, settings).await,
        Command::Devices => devices::list(center, settings).await,
        Command::Device { udid } => devices::get(center, &udid, settings).await,

        Command::Reconnect { address } => {
            device_cmd::run(center, CoreCommand::ReconnectDevice { address }, settings).await
        }
        Command::KillServer { udid, pid } => {
            device_cmd::run(center, CoreCommand::KillServer { udid, pid }, settings).await
        }
        Command::StartServer { udid } => {
            device_cmd::run(center, CoreCommand::StartServer { udid }, settings).await
        }
        Command::UpdateInterfaces { udid } => {
            device_cmd::run(center, CoreCommand::UpdateInterfaces { udid }, settings).await
        }
        Command::Shell { udid, command } => {
            let command = command.join(" ");
            device_cmd::run(center, CoreCommand::RunCommand { udid, command }, settings).await
        }
        Command::Exec { json } => device_cmd::exec(center, &json, settings).await,

        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => unreachable!(),
    }
}
