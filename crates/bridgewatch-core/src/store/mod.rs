// ── Registry stores ──
//
// `DeviceStateStore` holds what the bridge reports; `DescriptorStore`
// holds the merged view that is published to consumers.

mod collection;
pub mod live;

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, watch};

use crate::model::DeviceDescriptor;

use self::collection::KeyedCollection;

pub use self::collection::Snapshot;
pub use self::live::{DeviceStateStore, DeviceUpdate, LiveData, LiveDevice, Transition};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// One publication from the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RegistryEvent {
    /// A descriptor was (re)published. Duplicates are expected.
    Device(Arc<DeviceDescriptor>),
    /// A configured-only descriptor left the registry.
    Removed { udid: String },
}

/// The published descriptor map plus its event feed.
pub struct DescriptorStore {
    descriptors: KeyedCollection<DeviceDescriptor>,
    events: broadcast::Sender<RegistryEvent>,
}

impl Default for DescriptorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DescriptorStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            descriptors: KeyedCollection::new(),
            events,
        }
    }

    /// Store and emit, unconditionally.
    pub fn publish(&self, descriptor: DeviceDescriptor) -> Arc<DeviceDescriptor> {
        let descriptor = Arc::new(descriptor);
        self.descriptors
            .upsert(descriptor.udid.clone(), Arc::clone(&descriptor));
        // No receivers is fine.
        let _ = self.events.send(RegistryEvent::Device(Arc::clone(&descriptor)));
        descriptor
    }

    /// Drop a descriptor and announce it.
    pub fn remove(&self, udid: &str) -> Option<Arc<DeviceDescriptor>> {
        let removed = self.descriptors.remove(udid)?;
        let _ = self.events.send(RegistryEvent::Removed {
            udid: udid.to_owned(),
        });
        Some(removed)
    }

    pub fn get(&self, udid: &str) -> Option<Arc<DeviceDescriptor>> {
        self.descriptors.get(udid)
    }

    pub fn contains(&self, udid: &str) -> bool {
        self.descriptors.contains(udid)
    }

    /// All descriptors, ordered by key.
    pub fn snapshot(&self) -> Snapshot<DeviceDescriptor> {
        self.descriptors.snapshot()
    }

    pub fn watch(&self) -> watch::Receiver<Snapshot<DeviceDescriptor>> {
        self.descriptors.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    pub fn keys(&self) -> Vec<String> {
        self.descriptors.keys()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.len() == 0
    }
}
