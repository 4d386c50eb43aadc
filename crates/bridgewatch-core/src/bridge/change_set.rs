// ── Tracker change sets ──

use serde::{Deserialize, Serialize};

use crate::model::ConnectivityState;

/// One `(id, reported state)` pair from the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEntry {
    pub id: String,
    pub state: ConnectivityState,
}

impl DeviceEntry {
    pub fn new(id: impl Into<String>, state: impl Into<ConnectivityState>) -> Self {
        Self {
            id: id.into(),
            state: state.into(),
        }
    }
}

/// Disjoint batches of devices that appeared, vanished, or changed state
/// between two consecutive device lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub added: Vec<DeviceEntry>,
    pub removed: Vec<DeviceEntry>,
    pub changed: Vec<DeviceEntry>,
}

impl ChangeSet {
    /// Compute the change set that turns `previous` into `current`.
    ///
    /// Removed entries carry the last state they were seen in.
    pub fn diff(previous: &[DeviceEntry], current: &[DeviceEntry]) -> Self {
        let mut changes = Self::default();

        for entry in current {
            match previous.iter().find(|p| p.id == entry.id) {
                None => changes.added.push(entry.clone()),
                Some(old) if old.state != entry.state => changes.changed.push(entry.clone()),
                Some(_) => {}
            }
        }

        for entry in previous {
            if !current.iter().any(|c| c.id == entry.id) {
                changes.removed.push(entry.clone());
            }
        }

        changes
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn diff_from_empty_adds_everything() {
        let current = vec![
            DeviceEntry::new("emulator-5554", "device"),
            DeviceEntry::new("10.0.0.5:5555", "offline"),
        ];
        let changes = ChangeSet::diff(&[], &current);
        assert_eq!(changes.added, current);
        assert!(changes.removed.is_empty());
        assert!(changes.changed.is_empty());
    }

    #[test]
    fn diff_splits_into_disjoint_batches() {
        let previous = vec![
            DeviceEntry::new("a", "device"),
            DeviceEntry::new("b", "offline"),
            DeviceEntry::new("c", "device"),
        ];
        let current = vec![
            DeviceEntry::new("b", "device"),
            DeviceEntry::new("c", "device"),
            DeviceEntry::new("d", "unauthorized"),
        ];

        let changes = ChangeSet::diff(&previous, &current);
        assert_eq!(changes.added, vec![DeviceEntry::new("d", "unauthorized")]);
        assert_eq!(changes.removed, vec![DeviceEntry::new("a", "device")]);
        assert_eq!(changes.changed, vec![DeviceEntry::new("b", "device")]);
    }

    #[test]
    fn identical_lists_produce_no_changes() {
        let list = vec![DeviceEntry::new("a", "device")];
        assert!(ChangeSet::diff(&list, &list).is_empty());
    }
}
