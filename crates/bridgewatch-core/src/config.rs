// ── Runtime registry configuration ──
//
// These types describe how the registry runs: where the declared device
// list lives, how the tracker backs off, and which adb executable to use.
// They never touch disk; the CLI builds a `RegistryConfig` and hands it in.

use std::path::PathBuf;
use std::time::Duration;

/// Restart policy for the device tracking stream.
///
/// Every failed attempt multiplies the delay by `multiplier`. Growth is
/// unbounded unless `max_delay` is set.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// Delay before the first restart. Default: 1s.
    pub initial_delay: Duration,
    /// Growth factor applied after each failed attempt. Default: 1.2.
    pub multiplier: f64,
    /// Optional upper bound on the delay.
    pub max_delay: Option<Duration>,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1000),
            multiplier: 1.2,
            max_delay: None,
        }
    }
}

/// Configuration for a single registry instance.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Path of the declared device list (`devices_config.json`).
    pub devices_config: PathBuf,
    /// Tracker restart policy.
    pub backoff: BackoffConfig,
    /// How often the devices config file is checked for changes.
    pub config_poll_interval: Duration,
    /// adb executable used by the bundled bridge collaborators.
    pub adb_program: String,
    /// Shell command that starts the on-device server, if any.
    pub server_command: Option<String>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            devices_config: PathBuf::from("devices_config.json"),
            backoff: BackoffConfig::default(),
            config_poll_interval: Duration::from_secs(1),
            adb_program: "adb".into(),
            server_command: None,
        }
    }
}
