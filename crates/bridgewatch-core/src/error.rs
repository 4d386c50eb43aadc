// ── Core error types ──
//
// `CoreError` is what consumers of the registry see. Collaborator failures
// (the adb executable, the tracking stream) are reported as `BridgeError`
// and wrapped, never exposed as raw process output.

use std::path::PathBuf;

use thiserror::Error;

/// Failures reported by bridge collaborators.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Cannot reach the device bridge: {reason}")]
    Connection { reason: String },

    #[error("Device tracking stream closed")]
    StreamClosed,

    #[error("Malformed bridge output: {message}")]
    Protocol { message: String },

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {}{}", exit_label(.code.as_ref()), stderr_suffix(.stderr))]
    Command {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Operation not available: {operation}")]
    Unavailable { operation: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn exit_label(code: Option<&i32>) -> String {
    code.map_or_else(|| "a signal".into(), |c| format!("code {c}"))
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {trimmed}")
    }
}

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Command errors ───────────────────────────────────────────────
    #[error("Device not found: {udid}")]
    DeviceNotFound { udid: String },

    #[error("Unsupported command: \"{kind}\"")]
    UnsupportedCommand { kind: String },

    #[error("Invalid {field}: {reason}")]
    ValidationFailed { field: String, reason: String },

    #[error("Failed to reconnect {address}: {source}")]
    ReconnectFailed {
        address: String,
        #[source]
        source: BridgeError,
    },

    #[error("Command failed on {udid}: {source}")]
    CommandFailed {
        udid: String,
        #[source]
        source: BridgeError,
    },

    // ── Bridge errors ────────────────────────────────────────────────
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Cannot read devices config {}: {source}", .path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid devices config {}: {source}", .path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Cannot write devices config {}: {source}", .path.display())]
    ConfigWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Lifecycle errors ─────────────────────────────────────────────
    #[error("Registry is not running")]
    RegistryClosed,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Whether the error names a device the registry does not know.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::DeviceNotFound { .. })
    }
}
