//! Per-device command handlers.

use std::io::Read;
use std::time::Duration;

use tabled::Tabled;

use bridgewatch_core::{Command, CommandRequest, CommandResult, ControlCenter, NetworkInterface};

use crate::cli::OutputFormat;
use crate::config::Settings;
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct InterfaceRow {
    #[tabled(rename = "Interface")]
    name: String,
    #[tabled(rename = "IPv4")]
    ipv4: String,
}

impl From<&NetworkInterface> for InterfaceRow {
    fn from(i: &NetworkInterface) -> Self {
        Self {
            name: i.name.clone(),
            ipv4: i.ipv4.clone(),
        }
    }
}

/// Run `command` and print its result. Device-bound commands start the
/// registry and wait for the bridge to report the device first; a reconnect
/// runs straight away.
pub async fn run(
    center: &ControlCenter,
    command: Command,
    settings: &Settings,
) -> Result<(), CliError> {
    let result = execute(center, command, settings.settle).await;
    center.release().await;
    print_result(&result?, settings)
}

/// Parse a raw JSON command (or read it from stdin for `-`) and run it.
pub async fn exec(center: &ControlCenter, json: &str, settings: &Settings) -> Result<(), CliError> {
    let text = if json == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        json.to_owned()
    };
    let request: CommandRequest = serde_json::from_str(&text)?;
    let command = Command::try_from(request)?;
    run(center, command, settings).await
}

async fn execute(
    center: &ControlCenter,
    command: Command,
    settle: Duration,
) -> Result<CommandResult, CliError> {
    if !matches!(command, Command::ReconnectDevice { .. }) {
        center.start();
        center.wait_for_device(command.udid(), settle).await?;
    }
    Ok(center.execute(command).await?)
}

fn print_result(result: &CommandResult, settings: &Settings) -> Result<(), CliError> {
    if !matches!(settings.output, OutputFormat::Table | OutputFormat::Plain) {
        let out =
            output::render_single(&settings.output, result, |_| String::new(), |_| String::new())?;
        output::print_output(&out, settings.quiet);
        return Ok(());
    }

    let plain = matches!(settings.output, OutputFormat::Plain);
    match result {
        CommandResult::Ok => {
            if !settings.quiet && !plain {
                eprintln!("Done");
            }
        }
        CommandResult::ServerStarted { pid } => {
            if plain {
                output::print_output(&pid.to_string(), settings.quiet);
            } else if !settings.quiet {
                eprintln!("Server started (pid {pid})");
            }
        }
        CommandResult::Interfaces { interfaces } => {
            let out = output::render_list(
                &settings.output,
                interfaces,
                |i| InterfaceRow::from(i),
                |i| format!("{}\t{}", i.name, i.ipv4),
            )?;
            output::print_output(&out, settings.quiet);
        }
        CommandResult::ShellOutput { output: text } => {
            output::print_output(text.trim_end_matches('\n'), settings.quiet);
        }
    }
    Ok(())
}
