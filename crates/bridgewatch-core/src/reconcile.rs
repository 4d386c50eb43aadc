// ── Reconciliation ──
//
// The single writer of the registry. Tracker events, live data coming back
// from devices, and config reloads all funnel into one task, which updates
// the live store and republishes merged descriptors.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::bridge::{BridgeClient, DeviceEntry};
use crate::config_store::ConfigStore;
use crate::model::{ConnectivityState, DeviceDescriptor};
use crate::store::{DescriptorStore, DeviceStateStore, DeviceUpdate, LiveData};
use crate::tracker::TrackerEvent;

/// Data produced outside the reconciliation task for a known device.
#[derive(Debug, Clone)]
pub(crate) struct Feedback {
    pub udid: String,
    pub data: LiveData,
}

/// Receiving ends of the reconciliation inputs. Kept behind a mutex so the
/// task can be restarted after a release.
pub(crate) struct Inputs {
    pub tracker: mpsc::UnboundedReceiver<TrackerEvent>,
    pub feedback: mpsc::UnboundedReceiver<Feedback>,
}

pub(crate) struct Reconciler {
    live: Arc<DeviceStateStore>,
    config: Arc<ConfigStore>,
    descriptors: Arc<DescriptorStore>,
    client: Arc<dyn BridgeClient>,
    feedback: mpsc::UnboundedSender<Feedback>,
}

impl Reconciler {
    pub(crate) fn new(
        live: Arc<DeviceStateStore>,
        config: Arc<ConfigStore>,
        descriptors: Arc<DescriptorStore>,
        client: Arc<dyn BridgeClient>,
        feedback: mpsc::UnboundedSender<Feedback>,
    ) -> Self {
        Self {
            live,
            config,
            descriptors,
            client,
            feedback,
        }
    }

    // ── Tracker input ────────────────────────────────────────────────

    /// Apply a batch to the live store, then republish every touched
    /// device. A full listing also disconnects known devices it omits,
    /// since they may have left while the tracker was down.
    pub(crate) fn apply_tracker_event(&self, event: TrackerEvent) {
        let reports: Vec<(String, ConnectivityState)> = match event {
            TrackerEvent::Listed(entries) => {
                let vanished = self.missing_from(&entries);
                entries.into_iter().map(reported).chain(vanished).collect()
            }
            TrackerEvent::Changes(changes) => changes
                .added
                .into_iter()
                .map(reported)
                .chain(
                    changes
                        .removed
                        .into_iter()
                        .map(|e| (e.id, ConnectivityState::Disconnected)),
                )
                .chain(changes.changed.into_iter().map(reported))
                .collect(),
        };

        let updates: Vec<(String, DeviceUpdate)> = reports
            .into_iter()
            .map(|(udid, state)| {
                let update = self.live.report(&udid, state);
                (udid, update)
            })
            .collect();

        for (udid, update) in updates {
            if update.entered_connected() {
                self.spawn_property_fetch(&udid);
            }
            self.on_device_update(update);
        }
    }

    fn missing_from(&self, entries: &[DeviceEntry]) -> Vec<(String, ConnectivityState)> {
        let listed: HashSet<&str> = entries.iter().map(|e| e.id.as_str()).collect();
        self.live
            .ids()
            .into_iter()
            .filter(|udid| !listed.contains(udid.as_str()))
            .filter(|udid| {
                self.live
                    .state(udid)
                    .is_some_and(|s| s != ConnectivityState::Disconnected)
            })
            .map(|udid| {
                debug!(udid = %udid, "device absent from listing");
                (udid, ConnectivityState::Disconnected)
            })
            .collect()
    }

    fn spawn_property_fetch(&self, udid: &str) {
        let device = self.client.device(udid);
        let feedback = self.feedback.clone();
        let udid = udid.to_owned();
        tokio::spawn(async move {
            match device.fetch_properties().await {
                Ok(props) => {
                    let _ = feedback.send(Feedback {
                        udid,
                        data: LiveData::Properties(props),
                    });
                }
                Err(e) => warn!(udid = %udid, error = %e, "could not read device properties"),
            }
        });
    }

    // ── Live device updates ──────────────────────────────────────────

    /// Publish a live descriptor, with the configured name if its id
    /// matches a declared `ip`.
    pub(crate) fn on_device_update(&self, update: DeviceUpdate) -> Arc<DeviceDescriptor> {
        let merged = self.with_configured_name(update.descriptor);
        debug!(udid = %merged.udid, state = %merged.state, "publishing device");
        self.descriptors.publish(merged)
    }

    pub(crate) fn on_feedback(&self, feedback: Feedback) {
        match self.live.attach(&feedback.udid, feedback.data) {
            Some(update) => {
                self.on_device_update(update);
            }
            None => debug!(udid = %feedback.udid, "live data for unknown device dropped"),
        }
    }

    fn with_configured_name(&self, mut descriptor: DeviceDescriptor) -> DeviceDescriptor {
        if let Some(configured) = self.config.find_by_ip(&descriptor.udid) {
            descriptor.model = configured.name;
        }
        descriptor
    }

    // ── Config changes ───────────────────────────────────────────────

    /// Republish every declared device, then every live device that is
    /// not declared, then drop declared-only descriptors whose declaration
    /// is gone.
    pub(crate) fn on_config_change(&self) {
        let configured = self.config.list();
        let declared: HashSet<&str> = configured.iter().map(|d| d.ip.as_str()).collect();

        for device in &configured {
            let descriptor = match self.live.descriptor(&device.ip) {
                Some(live) => self.with_configured_name(live),
                None => ConfigStore::build_descriptor(device, self.live.is_connected(&device.ip)),
            };
            self.descriptors.publish(descriptor);
        }

        for udid in self.live.ids() {
            if declared.contains(udid.as_str()) {
                continue;
            }
            if let Some(live) = self.live.descriptor(&udid) {
                self.descriptors.publish(live);
            }
        }

        for key in self.descriptors.keys() {
            if !declared.contains(key.as_str()) && !self.live.contains(&key) {
                debug!(udid = %key, "declared device removed");
                self.descriptors.remove(&key);
            }
        }

        debug!(
            declared = configured.len(),
            live = self.live.len(),
            published = self.descriptors.len(),
            "config reconciled"
        );
    }
}

fn reported(entry: DeviceEntry) -> (String, ConnectivityState) {
    (entry.id, entry.state)
}

// ── Reconciliation task ─────────────────────────────────────────────

/// Process inputs one at a time until `cancel` fires.
pub(crate) async fn run(
    reconciler: Arc<Reconciler>,
    inputs: Arc<Mutex<Inputs>>,
    mut config_rx: watch::Receiver<u64>,
    cancel: CancellationToken,
) {
    let mut guard = inputs.lock().await;
    let Inputs { tracker, feedback } = &mut *guard;
    config_rx.borrow_and_update();
    reconciler.on_config_change();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            changed = config_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                config_rx.borrow_and_update();
                reconciler.on_config_change();
            }
            Some(event) = tracker.recv() => reconciler.apply_tracker_event(event),
            Some(data) = feedback.recv() => reconciler.on_feedback(data),
        }
    }

    debug!("reconciliation task exiting");
}
