// ── Domain model ──
//
// Live devices, declared devices, and the merged descriptor that is
// published to consumers.

pub mod configured;
pub mod device;

pub use configured::{ConfiguredDevice, DevicesConfig};
pub use device::{
    ConnectivityState, DeviceDescriptor, DeviceProperties, NO_PID, NOT_AVAILABLE,
    NetworkInterface,
};
