// ── Bridge collaborators ──
//
// The registry never speaks the bridge protocol itself. Everything it
// needs from the outside world goes through these traits: listing and
// tracking devices, per-device operations, and the reconnect tool.

mod change_set;

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::error::BridgeError;
use crate::model::{DeviceProperties, NetworkInterface};

pub use change_set::{ChangeSet, DeviceEntry};

/// Stream of change sets from a running device tracker.
///
/// The stream ending, or yielding an error, means the tracker is down.
/// Dropping the stream ends the underlying tracker.
pub type ChangeStream = BoxStream<'static, Result<ChangeSet, BridgeError>>;

/// Client side of the device bridge.
#[async_trait]
pub trait BridgeClient: Send + Sync + 'static {
    /// Devices currently attached to the bridge.
    async fn list_devices(&self) -> Result<Vec<DeviceEntry>, BridgeError>;

    /// Open a tracking stream of device changes.
    async fn track_devices(&self) -> Result<ChangeStream, BridgeError>;

    /// Capability handle for one device.
    fn device(&self, udid: &str) -> Arc<dyn DeviceOps>;
}

/// Operations that run against a single device.
#[async_trait]
pub trait DeviceOps: Send + Sync {
    async fn fetch_properties(&self) -> Result<DeviceProperties, BridgeError>;

    async fn kill_server(&self, pid: i32) -> Result<(), BridgeError>;

    /// Start the on-device server, returning its pid.
    async fn start_server(&self) -> Result<i32, BridgeError>;

    async fn update_interfaces(&self) -> Result<Vec<NetworkInterface>, BridgeError>;

    /// Run a shell command, returning its standard output.
    async fn run_shell_command(&self, command: &str) -> Result<String, BridgeError>;
}

/// The external reconnect tool.
#[async_trait]
pub trait Reconnector: Send + Sync {
    /// Resolves when the tool exits with code 0.
    async fn reconnect(&self, address: &str) -> Result<(), BridgeError>;
}
