//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use bridgewatch_config::ConfigError;
use bridgewatch_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const UNSUPPORTED: i32 = 5;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Bridge ───────────────────────────────────────────────────────
    #[error("Could not talk to the device bridge")]
    #[diagnostic(
        code(bridgewatch::bridge),
        help(
            "Check that adb is installed and on PATH, or pass --adb.\n\
             Detail: {reason}"
        )
    )]
    Bridge { reason: String },

    #[error("Reconnecting {address} failed")]
    #[diagnostic(
        code(bridgewatch::reconnect_failed),
        help("adb said: {reason}\nIs the device listening for adb over TCP?")
    )]
    ReconnectFailed { address: String, reason: String },

    #[error("Command failed on {udid}: {reason}")]
    #[diagnostic(code(bridgewatch::command_failed))]
    CommandFailed { udid: String, reason: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(bridgewatch::not_found),
        help("Run: bridgewatch {list_command} to see known {resource_type}s")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("Unsupported command: \"{kind}\"")]
    #[diagnostic(
        code(bridgewatch::unsupported),
        help(
            "Known types: RECONNECT_DEVICE, KILL_SERVER, START_SERVER, \
             UPDATE_INTERFACES, RUN_COMMAND"
        )
    )]
    Unsupported { kind: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(bridgewatch::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration file already exists")]
    #[diagnostic(
        code(bridgewatch::config_exists),
        help("Use --force to overwrite it.\nPath: {path}")
    )]
    ConfigExists { path: String },

    #[error(transparent)]
    #[diagnostic(code(bridgewatch::config))]
    Config(Box<ConfigError>),

    #[error("Devices config problem: {message}")]
    #[diagnostic(code(bridgewatch::devices_config))]
    DevicesConfig { message: String },

    // ── Lifecycle ────────────────────────────────────────────────────
    #[error("The registry stopped unexpectedly")]
    #[diagnostic(code(bridgewatch::closed))]
    Closed,

    #[error("Internal error: {0}")]
    #[diagnostic(code(bridgewatch::internal))]
    Internal(String),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    #[diagnostic(code(bridgewatch::json))]
    Json(#[from] serde_json::Error),

    #[error("YAML rendering failed: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML rendering failed: {0}")]
    Toml(#[from] toml::ser::Error),
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            other => Self::Config(Box::new(other)),
        }
    }
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Bridge { .. } | Self::ReconnectFailed { .. } => exit_code::CONNECTION,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Unsupported { .. } => exit_code::UNSUPPORTED,
            Self::Validation { .. } | Self::Json(_) => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::DeviceNotFound { udid } => CliError::NotFound {
                resource_type: "device".into(),
                identifier: udid,
                list_command: "devices".into(),
            },

            CoreError::UnsupportedCommand { kind } => CliError::Unsupported { kind },

            CoreError::ValidationFailed { field, reason } => CliError::Validation { field, reason },

            CoreError::ReconnectFailed { address, source } => CliError::ReconnectFailed {
                address,
                reason: source.to_string(),
            },

            CoreError::CommandFailed { udid, source } => CliError::CommandFailed {
                udid,
                reason: source.to_string(),
            },

            CoreError::Bridge(source) => CliError::Bridge {
                reason: source.to_string(),
            },

            err @ (CoreError::ConfigRead { .. }
            | CoreError::ConfigParse { .. }
            | CoreError::ConfigWrite { .. }) => CliError::DevicesConfig {
                message: err.to_string(),
            },

            CoreError::RegistryClosed => CliError::Closed,

            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}
