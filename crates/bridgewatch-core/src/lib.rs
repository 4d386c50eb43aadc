// bridgewatch-core: Device registry reconciling the ADB tracking stream
// with an operator-declared device list.

pub mod adb;
pub mod bridge;
pub mod command;
pub mod config;
pub mod config_store;
pub mod control_center;
pub mod error;
pub mod model;
pub mod store;
pub mod stream;
pub mod tracker;

mod reconcile;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod testing;

// ── Primary re-exports ──────────────────────────────────────────────
pub use bridge::{BridgeClient, ChangeSet, ChangeStream, DeviceEntry, DeviceOps, Reconnector};
pub use command::{Command, CommandDispatcher, CommandRequest, CommandResult, CommandType};
pub use config::{BackoffConfig, RegistryConfig};
pub use config_store::ConfigStore;
pub use control_center::ControlCenter;
pub use error::{BridgeError, CoreError};
pub use store::{DescriptorStore, DeviceStateStore, LiveData, LiveDevice, RegistryEvent, Snapshot};
pub use stream::{DescriptorStream, EventStream};
pub use tracker::{SessionState, TrackerEvent, TrackerSession};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    ConfiguredDevice, ConnectivityState, DeviceDescriptor, DeviceProperties, DevicesConfig,
    NO_PID, NOT_AVAILABLE, NetworkInterface,
};
