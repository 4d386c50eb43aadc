// ── Live device state ──
//
// One `LiveDevice` per id the bridge has ever reported. Entries are never
// removed; a vanished device stays in the store as `disconnected`.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};

use crate::model::{ConnectivityState, DeviceDescriptor, DeviceProperties, NO_PID, NetworkInterface};

/// Data gathered from a device after it was first seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum LiveData {
    Properties(DeviceProperties),
    Interfaces(Vec<NetworkInterface>),
    ServerPid(i32),
}

/// How an update changed the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// First sighting.
    Created,
    /// State moved away from `from`.
    Changed { from: ConnectivityState },
    /// Reported state equals the current one.
    Unchanged,
    /// New live data attached; state untouched.
    DataAttached,
}

/// One descriptor recomputation.
#[derive(Debug, Clone)]
pub struct DeviceUpdate {
    pub descriptor: DeviceDescriptor,
    pub transition: Transition,
}

impl DeviceUpdate {
    /// Whether the device just became usable.
    pub fn entered_connected(&self) -> bool {
        let now_connected = self.descriptor.state.is_connected();
        match &self.transition {
            Transition::Created => now_connected,
            Transition::Changed { from } => now_connected && !from.is_connected(),
            Transition::Unchanged | Transition::DataAttached => false,
        }
    }
}

// ── LiveDevice ──────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct LiveDevice {
    udid: String,
    state: ConnectivityState,
    properties: Option<DeviceProperties>,
    interfaces: Vec<NetworkInterface>,
    pid: i32,
    descriptor: DeviceDescriptor,
}

impl LiveDevice {
    fn new(udid: &str, state: ConnectivityState) -> Self {
        let descriptor = DeviceDescriptor::placeholder(udid, state.clone());
        Self {
            udid: udid.to_owned(),
            state,
            properties: None,
            interfaces: Vec::new(),
            pid: NO_PID,
            descriptor,
        }
    }

    pub fn udid(&self) -> &str {
        &self.udid
    }

    pub fn state(&self) -> &ConnectivityState {
        &self.state
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }

    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    fn set_state(&mut self, state: ConnectivityState) -> DeviceUpdate {
        let transition = if state == self.state {
            Transition::Unchanged
        } else {
            Transition::Changed {
                from: std::mem::replace(&mut self.state, state),
            }
        };
        self.rebuild();
        DeviceUpdate {
            descriptor: self.descriptor.clone(),
            transition,
        }
    }

    fn apply(&mut self, data: LiveData) -> DeviceUpdate {
        match data {
            LiveData::Properties(props) => self.properties = Some(props),
            LiveData::Interfaces(interfaces) => self.interfaces = interfaces,
            LiveData::ServerPid(pid) => self.pid = pid,
        }
        self.rebuild();
        DeviceUpdate {
            descriptor: self.descriptor.clone(),
            transition: Transition::DataAttached,
        }
    }

    /// Recompute the descriptor. The timestamp only moves when content does.
    fn rebuild(&mut self) {
        let mut next = DeviceDescriptor::placeholder(self.udid.clone(), self.state.clone());
        if let Some(props) = &self.properties {
            next.manufacturer.clone_from(&props.manufacturer);
            next.model.clone_from(&props.model);
            next.os_version.clone_from(&props.os_version);
            next.sdk_version.clone_from(&props.sdk_version);
            next.cpu_abi.clone_from(&props.cpu_abi);
            next.wifi_interface.clone_from(&props.wifi_interface);
        }
        next.interfaces.clone_from(&self.interfaces);
        next.pid = self.pid;

        if next.same_content(&self.descriptor) {
            next.last_update_timestamp = self.descriptor.last_update_timestamp;
        }
        self.descriptor = next;
    }
}

// ── DeviceStateStore ────────────────────────────────────────────────

/// Live devices keyed by bridge id.
///
/// Mutations come from the reconciliation task only; any task may read.
#[derive(Default)]
pub struct DeviceStateStore {
    devices: DashMap<String, LiveDevice>,
}

impl DeviceStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a reported state, creating the device on first sighting.
    pub fn report(&self, udid: &str, state: ConnectivityState) -> DeviceUpdate {
        match self.devices.entry(udid.to_owned()) {
            Entry::Occupied(mut entry) => entry.get_mut().set_state(state),
            Entry::Vacant(entry) => {
                let device = entry.insert(LiveDevice::new(udid, state));
                DeviceUpdate {
                    descriptor: device.descriptor.clone(),
                    transition: Transition::Created,
                }
            }
        }
    }

    /// Attach live data. `None` if the device is unknown.
    pub fn attach(&self, udid: &str, data: LiveData) -> Option<DeviceUpdate> {
        self.devices.get_mut(udid).map(|mut d| d.apply(data))
    }

    pub fn contains(&self, udid: &str) -> bool {
        self.devices.contains_key(udid)
    }

    pub fn get(&self, udid: &str) -> Option<LiveDevice> {
        self.devices.get(udid).map(|d| d.clone())
    }

    pub fn state(&self, udid: &str) -> Option<ConnectivityState> {
        self.devices.get(udid).map(|d| d.state.clone())
    }

    pub fn is_connected(&self, udid: &str) -> bool {
        self.devices.get(udid).is_some_and(|d| d.state.is_connected())
    }

    pub fn pid(&self, udid: &str) -> Option<i32> {
        self.devices.get(udid).map(|d| d.pid)
    }

    pub fn descriptor(&self, udid: &str) -> Option<DeviceDescriptor> {
        self.devices.get(udid).map(|d| d.descriptor.clone())
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// All known ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.devices.iter().map(|d| d.key().clone()).collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn props() -> DeviceProperties {
        DeviceProperties {
            manufacturer: "Google".into(),
            model: "Pixel 7".into(),
            os_version: "14".into(),
            sdk_version: "34".into(),
            cpu_abi: "arm64-v8a".into(),
            wifi_interface: "wlan0".into(),
        }
    }

    #[test]
    fn one_entry_per_id_with_latest_state() {
        let store = DeviceStateStore::new();
        let reports = [
            ("a", "device"),
            ("b", "offline"),
            ("a", "offline"),
            ("c", "unauthorized"),
            ("b", "device"),
            ("a", "disconnected"),
        ];
        for (udid, state) in reports {
            store.report(udid, state.into());
        }

        assert_eq!(store.ids(), ["a", "b", "c"]);
        assert_eq!(store.state("a"), Some(ConnectivityState::Disconnected));
        assert_eq!(store.state("b"), Some(ConnectivityState::Connected));
        assert_eq!(store.state("c"), Some(ConnectivityState::Unauthorized));
    }

    #[test]
    fn transitions_are_classified() {
        let store = DeviceStateStore::new();

        let created = store.report("a", ConnectivityState::Connected);
        assert_eq!(created.transition, Transition::Created);
        assert!(created.entered_connected());

        let dropped = store.report("a", ConnectivityState::Offline);
        assert_eq!(
            dropped.transition,
            Transition::Changed {
                from: ConnectivityState::Connected
            }
        );
        assert!(!dropped.entered_connected());

        let back = store.report("a", ConnectivityState::Connected);
        assert!(back.entered_connected());

        let same = store.report("a", ConnectivityState::Connected);
        assert_eq!(same.transition, Transition::Unchanged);
        assert!(!same.entered_connected());
    }

    #[test]
    fn repeated_state_yields_identical_descriptor() {
        let store = DeviceStateStore::new();
        let first = store.report("a", ConnectivityState::Connected).descriptor;
        let again = store.report("a", ConnectivityState::Connected).descriptor;
        assert_eq!(first, again);
    }

    #[test]
    fn live_data_flows_into_descriptor() {
        let store = DeviceStateStore::new();
        store.report("a", ConnectivityState::Connected);

        store.attach("a", LiveData::Properties(props())).unwrap();
        store.attach("a", LiveData::ServerPid(4242)).unwrap();
        let update = store
            .attach(
                "a",
                LiveData::Interfaces(vec![NetworkInterface {
                    name: "wlan0".into(),
                    ipv4: "192.168.1.42".into(),
                }]),
            )
            .unwrap();

        assert_eq!(update.transition, Transition::DataAttached);
        let d = update.descriptor;
        assert_eq!(d.model, "Pixel 7");
        assert_eq!(d.sdk_version, "34");
        assert_eq!(d.pid, 4242);
        assert_eq!(d.interfaces.len(), 1);
        assert_eq!(store.pid("a"), Some(4242));
    }

    #[test]
    fn live_data_survives_disconnect() {
        let store = DeviceStateStore::new();
        store.report("a", ConnectivityState::Connected);
        store.attach("a", LiveData::Properties(props()));

        let update = store.report("a", ConnectivityState::Disconnected);
        assert_eq!(update.descriptor.state, ConnectivityState::Disconnected);
        assert_eq!(update.descriptor.model, "Pixel 7");
        assert!(store.contains("a"));
        assert!(!store.is_connected("a"));
    }

    #[test]
    fn attach_to_unknown_device_is_ignored() {
        let store = DeviceStateStore::new();
        assert!(store.attach("ghost", LiveData::ServerPid(1)).is_none());
        assert!(store.is_empty());
    }
}
