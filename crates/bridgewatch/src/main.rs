mod cli;
mod commands;
mod config;
mod error;
mod output;

use std::path::Path;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use bridgewatch_core::ControlCenter;

use crate::cli::{Cli, Command};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_guard = match init_tracing(cli.global.verbose, cli.global.log_file.as_deref()) {
        Ok(guard) => guard,
        Err(err) => exit_with(err),
    };

    if let Err(err) = run(cli).await {
        drop(log_guard);
        exit_with(err);
    }
}

fn exit_with(err: CliError) -> ! {
    let code = err.exit_code();
    eprintln!("{:?}", miette::Report::new(err));
    std::process::exit(code);
}

/// Logs go to stderr, or to `log_file` through a non-blocking writer whose
/// guard must live until exit so buffered lines are flushed.
fn init_tracing(verbosity: u8, log_file: Option<&Path>) -> Result<Option<WorkerGuard>, CliError> {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let Some(path) = log_file else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
        return Ok(None);
    };

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let name = path.file_name().ok_or_else(|| CliError::Validation {
        field: "log-file".into(),
        reason: format!("{} does not name a file", path.display()),
    })?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name.to_string_lossy().into_owned())
        .build(dir)
        .map_err(|e| CliError::Io(std::io::Error::other(e)))?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true),
        )
        .init();

    Ok(Some(guard))
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        // Config commands don't need a registry
        Command::Config(args) => commands::config_cmd::handle(args, &cli.global),

        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "bridgewatch", &mut std::io::stdout());
            Ok(())
        }

        cmd => {
            let settings = config::resolve(&cli.global)?;
            let center = ControlCenter::with_adb(settings.registry.clone());

            tracing::debug!(command = ?cmd, registry = %center.name(), "dispatching command");
            commands::dispatch(cmd, &center, &settings).await
        }
    }
}
