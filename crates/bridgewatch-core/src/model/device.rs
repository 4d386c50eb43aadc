// ── Device domain types ──

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Placeholder for descriptor fields the bridge has not reported.
pub const NOT_AVAILABLE: &str = "N/A";

/// Server pid meaning "no server running".
pub const NO_PID: i32 = -1;

// ── ConnectivityState ───────────────────────────────────────────────

/// Connectivity state as reported by the bridge.
///
/// Known states get their own variant; anything else the bridge reports
/// (`"recovery"`, `"sideload"`, ...) is carried through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConnectivityState {
    /// The bridge reports `"device"`: attached and usable.
    Connected,
    Disconnected,
    Offline,
    Unauthorized,
    Other(String),
}

impl ConnectivityState {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Connected => "device",
            Self::Disconnected => "disconnected",
            Self::Offline => "offline",
            Self::Unauthorized => "unauthorized",
            Self::Other(s) => s,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl From<&str> for ConnectivityState {
    fn from(raw: &str) -> Self {
        match raw {
            "device" => Self::Connected,
            "disconnected" => Self::Disconnected,
            "offline" => Self::Offline,
            "unauthorized" => Self::Unauthorized,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl From<String> for ConnectivityState {
    fn from(raw: String) -> Self {
        Self::from(raw.as_str())
    }
}

impl FromStr for ConnectivityState {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ConnectivityState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ConnectivityState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::from)
    }
}

// ── Live data attached to a device ──────────────────────────────────

/// A network interface with its IPv4 address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInterface {
    pub name: String,
    pub ipv4: String,
}

/// System properties fetched from a connected device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProperties {
    pub manufacturer: String,
    pub model: String,
    pub os_version: String,
    pub sdk_version: String,
    pub cpu_abi: String,
    pub wifi_interface: String,
}

// ── DeviceDescriptor ────────────────────────────────────────────────

/// The merged, externally visible record for one device.
///
/// Field names on the wire follow the Android property names consumers
/// already key on (`ro.product.model`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub udid: String,
    pub state: ConnectivityState,
    #[serde(rename = "ro.product.manufacturer")]
    pub manufacturer: String,
    #[serde(rename = "ro.product.model")]
    pub model: String,
    #[serde(rename = "ro.build.version.release")]
    pub os_version: String,
    #[serde(rename = "ro.build.version.sdk")]
    pub sdk_version: String,
    #[serde(rename = "ro.product.cpu.abi")]
    pub cpu_abi: String,
    #[serde(rename = "wifi.interface")]
    pub wifi_interface: String,
    pub interfaces: Vec<NetworkInterface>,
    pub pid: i32,
    /// Milliseconds since the Unix epoch.
    #[serde(rename = "last.update.timestamp")]
    pub last_update_timestamp: i64,
}

impl DeviceDescriptor {
    /// A descriptor carrying only identity and state; every protocol field
    /// holds its sentinel value.
    pub fn placeholder(udid: impl Into<String>, state: ConnectivityState) -> Self {
        Self {
            udid: udid.into(),
            state,
            manufacturer: String::new(),
            model: String::new(),
            os_version: NOT_AVAILABLE.into(),
            sdk_version: NOT_AVAILABLE.into(),
            cpu_abi: NOT_AVAILABLE.into(),
            wifi_interface: String::new(),
            interfaces: Vec::new(),
            pid: NO_PID,
            last_update_timestamp: now_millis(),
        }
    }

    /// Field-for-field equality, ignoring `last_update_timestamp`.
    pub fn same_content(&self, other: &Self) -> bool {
        self.udid == other.udid
            && self.state == other.state
            && self.manufacturer == other.manufacturer
            && self.model == other.model
            && self.os_version == other.os_version
            && self.sdk_version == other.sdk_version
            && self.cpu_abi == other.cpu_abi
            && self.wifi_interface == other.wifi_interface
            && self.interfaces == other.interfaces
            && self.pid == other.pid
    }
}

pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn known_states_round_trip_through_wire_names() {
        for raw in ["device", "disconnected", "offline", "unauthorized"] {
            assert_eq!(ConnectivityState::from(raw).as_str(), raw);
        }
        assert!(ConnectivityState::from("device").is_connected());
    }

    #[test]
    fn unknown_state_is_passed_through() {
        let state: ConnectivityState = "recovery".parse().unwrap();
        assert_eq!(state, ConnectivityState::Other("recovery".into()));
        assert!(!state.is_connected());
        assert_eq!(state.to_string(), "recovery");
    }

    #[test]
    fn descriptor_serializes_with_property_names() {
        let mut descriptor = DeviceDescriptor::placeholder("10.0.0.5", ConnectivityState::Connected);
        descriptor.model = "Pixel".into();
        descriptor.last_update_timestamp = 42;

        let json = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(json["udid"], "10.0.0.5");
        assert_eq!(json["state"], "device");
        assert_eq!(json["ro.product.model"], "Pixel");
        assert_eq!(json["ro.build.version.sdk"], "N/A");
        assert_eq!(json["pid"], -1);
        assert_eq!(json["last.update.timestamp"], 42);
    }

    #[test]
    fn same_content_ignores_timestamp() {
        let a = DeviceDescriptor::placeholder("x", ConnectivityState::Offline);
        let mut b = a.clone();
        b.last_update_timestamp += 1000;
        assert!(a.same_content(&b));

        b.pid = 1234;
        assert!(!a.same_content(&b));
    }
}
