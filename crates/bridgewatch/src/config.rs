//! CLI configuration: the shared config crate plus `GlobalOpts` overrides.

use std::path::PathBuf;
use std::time::Duration;

use clap::ValueEnum;

use bridgewatch_config::Config;
use bridgewatch_core::RegistryConfig;

use crate::cli::{ColorMode, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

/// Everything a command handler needs after flags, env, and file are merged.
pub struct Settings {
    pub registry: RegistryConfig,
    pub output: OutputFormat,
    pub color: bool,
    pub quiet: bool,
    pub settle: Duration,
}

/// Config file in use: `--config` if given, else the platform default.
pub fn config_file(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(bridgewatch_config::config_path)
}

/// Load file + env config and apply flag overrides.
pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    let mut cfg = bridgewatch_config::load_config_from(&config_file(global))?;
    if let Some(ref path) = global.devices_config {
        cfg.devices_config.clone_from(path);
    }
    if let Some(ref adb) = global.adb {
        cfg.adb_program.clone_from(adb);
    }
    if let Some(ms) = global.settle_ms {
        cfg.defaults.settle_ms = ms;
    }
    Ok(cfg)
}

pub fn resolve(global: &GlobalOpts) -> Result<Settings, CliError> {
    let cfg = load(global)?;
    let registry = bridgewatch_config::to_registry_config(&cfg)?;

    let output = match global.output {
        Some(ref format) => format.clone(),
        None => parse_default("defaults.output", &cfg.defaults.output)?,
    };
    let color = match global.color {
        Some(ref mode) => mode.clone(),
        None => parse_default::<ColorMode>("defaults.color", &cfg.defaults.color)?,
    };

    Ok(Settings {
        registry,
        output,
        color: output::should_color(&color),
        quiet: global.quiet,
        settle: Duration::from_millis(cfg.defaults.settle_ms),
    })
}

fn parse_default<T: ValueEnum>(field: &str, value: &str) -> Result<T, CliError> {
    T::from_str(value, true).map_err(|reason| CliError::Validation {
        field: field.into(),
        reason,
    })
}
