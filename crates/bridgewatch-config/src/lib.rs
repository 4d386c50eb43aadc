//! Shared configuration for the bridgewatch CLI.
//!
//! A TOML file in the platform config directory, overridden by
//! `BRIDGEWATCH_*` environment variables, translated into
//! `bridgewatch_core::RegistryConfig`. The registry itself never reads
//! this file; the CLI loads it and hands the result in.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use bridgewatch_core::{BackoffConfig, RegistryConfig};

/// Prefix for environment overrides. Nested keys use `__`, e.g.
/// `BRIDGEWATCH_BACKOFF__MULTIPLIER=1.5`.
pub const ENV_PREFIX: &str = "BRIDGEWATCH_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Declared device list. Relative paths resolve against the working
    /// directory.
    #[serde(default = "default_devices_config")]
    pub devices_config: PathBuf,

    #[serde(default = "default_adb_program")]
    pub adb_program: String,

    /// Shell command that starts the on-device server.
    pub server_command: Option<String>,

    /// How often the devices config is checked for edits, in milliseconds.
    #[serde(default = "default_config_poll_ms")]
    pub config_poll_ms: u64,

    #[serde(default)]
    pub backoff: Backoff,

    #[serde(default)]
    pub defaults: Defaults,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            devices_config: default_devices_config(),
            adb_program: default_adb_program(),
            server_command: None,
            config_poll_ms: default_config_poll_ms(),
            backoff: Backoff::default(),
            defaults: Defaults::default(),
        }
    }
}

/// Tracker restart policy.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Backoff {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Cap on the restart delay. Unset means unbounded growth.
    pub max_delay_ms: Option<u64>,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            multiplier: default_multiplier(),
            max_delay_ms: None,
        }
    }
}

/// CLI presentation defaults.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// How long one-shot commands wait for the tracker to report devices,
    /// in milliseconds.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            settle_ms: default_settle_ms(),
        }
    }
}

fn default_devices_config() -> PathBuf {
    PathBuf::from("devices_config.json")
}
fn default_adb_program() -> String {
    "adb".into()
}
fn default_config_poll_ms() -> u64 {
    1000
}
fn default_initial_delay_ms() -> u64 {
    1000
}
fn default_multiplier() -> f64 {
    1.2
}
fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_settle_ms() -> u64 {
    1500
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("dev", "bridgewatch", "bridgewatch").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("bridgewatch");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file + environment. A missing file yields the
/// defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if it cannot be read.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Translation ─────────────────────────────────────────────────────

/// Build the runtime registry configuration, validating the numbers the
/// tracker and watcher depend on.
pub fn to_registry_config(cfg: &Config) -> Result<RegistryConfig, ConfigError> {
    let b = &cfg.backoff;
    if !b.multiplier.is_finite() || b.multiplier < 1.0 {
        return Err(ConfigError::Validation {
            field: "backoff.multiplier".into(),
            reason: format!("expected a finite number >= 1.0, got {}", b.multiplier),
        });
    }
    if b.initial_delay_ms == 0 {
        return Err(ConfigError::Validation {
            field: "backoff.initial_delay_ms".into(),
            reason: "must be greater than zero".into(),
        });
    }
    if let Some(max) = b.max_delay_ms {
        if max < b.initial_delay_ms {
            return Err(ConfigError::Validation {
                field: "backoff.max_delay_ms".into(),
                reason: format!("{max} is below initial_delay_ms ({})", b.initial_delay_ms),
            });
        }
    }
    if cfg.config_poll_ms == 0 {
        return Err(ConfigError::Validation {
            field: "config_poll_ms".into(),
            reason: "must be greater than zero".into(),
        });
    }

    Ok(RegistryConfig {
        devices_config: cfg.devices_config.clone(),
        backoff: BackoffConfig {
            initial_delay: Duration::from_millis(b.initial_delay_ms),
            multiplier: b.multiplier,
            max_delay: b.max_delay_ms.map(Duration::from_millis),
        },
        config_poll_interval: Duration::from_millis(cfg.config_poll_ms),
        adb_program: cfg.adb_program.clone(),
        server_command: cfg.server_command.clone(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_translate_to_registry_defaults() {
        let registry = to_registry_config(&Config::default()).unwrap();
        let expected = RegistryConfig::default();
        assert_eq!(registry.devices_config, expected.devices_config);
        assert_eq!(registry.backoff, expected.backoff);
        assert_eq!(registry.config_poll_interval, expected.config_poll_interval);
        assert_eq!(registry.adb_program, expected.adb_program);
        assert_eq!(registry.server_command, None);
    }

    #[test]
    fn file_values_override_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                    adb_program = "/opt/platform-tools/adb"
                    server_command = "CLASSPATH=/data/local/tmp/server.jar app_process / Server"

                    [backoff]
                    max_delay_ms = 30000
                "#,
            )?;
            let cfg = load_config_from(Path::new("config.toml")).unwrap();
            assert_eq!(cfg.adb_program, "/opt/platform-tools/adb");
            assert_eq!(cfg.backoff.initial_delay_ms, 1000);
            assert_eq!(cfg.backoff.max_delay_ms, Some(30_000));
            assert_eq!(cfg.defaults, Defaults::default());
            Ok(())
        });
    }

    #[test]
    fn env_overrides_nested_keys() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("config.toml", "config_poll_ms = 250")?;
            jail.set_env("BRIDGEWATCH_BACKOFF__MULTIPLIER", "2.0");
            jail.set_env("BRIDGEWATCH_DEVICES_CONFIG", "/etc/bridgewatch/devices.json");

            let cfg = load_config_from(Path::new("config.toml")).unwrap();
            assert_eq!(cfg.config_poll_ms, 250);
            assert!((cfg.backoff.multiplier - 2.0).abs() < f64::EPSILON);
            assert_eq!(
                cfg.devices_config,
                PathBuf::from("/etc/bridgewatch/devices.json")
            );
            Ok(())
        });
    }

    #[test]
    fn missing_file_yields_defaults() {
        figment::Jail::expect_with(|_| {
            let cfg = load_config_from(Path::new("nope.toml")).unwrap();
            assert_eq!(cfg, Config::default());
            Ok(())
        });
    }

    #[test]
    fn saved_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut cfg = Config::default();
        cfg.backoff.max_delay_ms = Some(60_000);
        cfg.defaults.output = "json".into();

        save_config_to(&cfg, &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("[backoff]"));

        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn rejects_shrinking_backoff() {
        let mut cfg = Config::default();
        cfg.backoff.multiplier = 0.5;
        let err = to_registry_config(&cfg).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "backoff.multiplier"));

        let mut cfg = Config::default();
        cfg.backoff.max_delay_ms = Some(10);
        assert!(to_registry_config(&cfg).is_err());
    }

    #[test]
    fn cap_is_carried_into_registry_config() {
        let mut cfg = Config::default();
        cfg.backoff.max_delay_ms = Some(5000);
        let registry = to_registry_config(&cfg).unwrap();
        assert_eq!(registry.backoff.max_delay, Some(Duration::from_secs(5)));
    }
}
