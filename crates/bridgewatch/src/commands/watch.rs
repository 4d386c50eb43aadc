//! `watch`: follow the registry until Ctrl-C.

use owo_colors::OwoColorize;

use bridgewatch_core::{ControlCenter, RegistryEvent};

use crate::cli::{OutputFormat, WatchArgs};
use crate::config::Settings;
use crate::error::CliError;
use crate::output;

use super::devices::{DeviceRow, local_time};

pub async fn handle(
    center: &ControlCenter,
    args: &WatchArgs,
    settings: &Settings,
) -> Result<(), CliError> {
    // Subscribe before starting so the first publications are not missed.
    let events = center.events();
    let snapshots = center.subscribe();
    center.start();
    if !settings.quiet {
        eprintln!(
            "Watching {} ({}), Ctrl-C to stop",
            center.name(),
            center.config().devices_config.display()
        );
    }

    let outcome = if args.snapshots {
        follow_snapshots(snapshots, settings).await
    } else {
        follow_events(events, settings).await
    };
    center.release().await;
    outcome
}

async fn follow_events(
    mut events: bridgewatch_core::EventStream,
    settings: &Settings,
) -> Result<(), CliError> {
    loop {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res?;
                return Ok(());
            }
            event = events.recv() => {
                let Some(event) = event else {
                    return Err(CliError::Closed);
                };
                let line = event_line(&event, settings)?;
                output::print_output(&line, settings.quiet);
            }
        }
    }
}

async fn follow_snapshots(
    mut snapshots: bridgewatch_core::DescriptorStream,
    settings: &Settings,
) -> Result<(), CliError> {
    let mut snap = snapshots.current().clone();
    loop {
        let out = output::render_list(
            &settings.output,
            snap.as_slice(),
            |d| DeviceRow::new(d, settings.color),
            |d| d.udid.clone(),
        )?;
        output::print_output(&out, settings.quiet);

        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res?;
                return Ok(());
            }
            next = snapshots.changed() => {
                snap = next.ok_or(CliError::Closed)?;
            }
        }
    }
}

/// One line per event. Structured formats emit JSON lines (or YAML
/// documents) so the stream stays parseable.
fn event_line(event: &RegistryEvent, settings: &Settings) -> Result<String, CliError> {
    match settings.output {
        OutputFormat::Json | OutputFormat::JsonCompact => output::render_json(event, true),
        OutputFormat::Yaml => Ok(format!("---\n{}", serde_yaml::to_string(event)?)),
        OutputFormat::Plain => Ok(match event {
            RegistryEvent::Device(d) => format!("{}\t{}", d.udid, d.state),
            RegistryEvent::Removed { udid } => format!("{udid}\tremoved"),
        }),
        OutputFormat::Table => Ok(match event {
            RegistryEvent::Device(d) => format!(
                "{}  {:<24} {:<14} {}",
                local_time(d.last_update_timestamp, "%H:%M:%S"),
                d.udid,
                output::state_label(&d.state, settings.color),
                d.model
            ),
            RegistryEvent::Removed { udid } => {
                let label = if settings.color {
                    "removed".red().to_string()
                } else {
                    "removed".to_owned()
                };
                format!("{}  {udid:<24} {label}", "--:--:--")
            }
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use bridgewatch_core::{ConnectivityState, DeviceDescriptor, RegistryConfig};

    fn settings(output: OutputFormat) -> Settings {
        Settings {
            registry: RegistryConfig::default(),
            output,
            color: false,
            quiet: false,
            settle: Duration::from_millis(10),
        }
    }

    #[test]
    fn json_events_are_single_lines() {
        let d = DeviceDescriptor::placeholder("emulator-5554", ConnectivityState::Connected);
        let line = event_line(
            &RegistryEvent::Device(Arc::new(d)),
            &settings(OutputFormat::Json),
        )
        .unwrap();
        assert!(!line.contains('\n'));
        assert!(line.contains(r#""event":"device""#));
    }

    #[test]
    fn plain_removal_line() {
        let line = event_line(
            &RegistryEvent::Removed {
                udid: "10.0.0.5".into(),
            },
            &settings(OutputFormat::Plain),
        )
        .unwrap();
        assert_eq!(line, "10.0.0.5\tremoved");
    }
}
