// ── Declared device list ──
//
// Owns the devices config file: creates it on first use, parses it into
// an immutable snapshot, and polls it for external edits.
// Readers never block; every reload swaps in a whole new list.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use arc_swap::ArcSwap;
use indexmap::IndexMap;
use sha2::{Digest, Sha256};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::model::{ConfiguredDevice, ConnectivityState, DeviceDescriptor, DevicesConfig};

type DeviceMap = IndexMap<String, ConfiguredDevice>;

pub struct ConfigStore {
    path: PathBuf,
    devices: ArcSwap<DeviceMap>,
    /// Bumped after every load attempt, successful or not.
    version: watch::Sender<u64>,
}

impl ConfigStore {
    /// Open the store at `path`, creating an empty config if the file does
    /// not exist, and load it. Failures leave the store empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let (version, _) = watch::channel(0);
        let store = Self {
            path: path.into(),
            devices: ArcSwap::from_pointee(DeviceMap::new()),
            version,
        };

        if let Err(e) = store.ensure_exists() {
            warn!(error = %e, "could not create devices config");
        }
        // Failures are logged by `load`; the store starts empty.
        let _ = store.load();
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `{"devices": []}` if no config exists. Returns whether a file
    /// was created.
    pub fn ensure_exists(&self) -> Result<bool, CoreError> {
        if self.path.exists() {
            return Ok(false);
        }

        let write_err = |source| CoreError::ConfigWrite {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let body = serde_json::to_string_pretty(&DevicesConfig::default())
            .map_err(|e| CoreError::Internal(e.to_string()))?;
        std::fs::write(&self.path, body).map_err(write_err)?;

        info!(path = %self.path.display(), "created empty devices config");
        Ok(true)
    }

    /// Re-read and replace the list. On any failure the list is cleared.
    /// Subscribers are signalled either way.
    pub fn load(&self) -> Result<usize, CoreError> {
        let result = self.read();
        let count = match &result {
            Ok(devices) => {
                debug!(path = %self.path.display(), count = devices.len(), "devices config loaded");
                devices.len()
            }
            Err(e) => {
                warn!(error = %e, "devices config unusable, clearing declared devices");
                0
            }
        };

        self.devices
            .store(Arc::new(result.as_ref().cloned().unwrap_or_default()));
        self.version.send_modify(|v| *v += 1);

        result.map(|_| count)
    }

    fn read(&self) -> Result<DeviceMap, CoreError> {
        let raw = std::fs::read(&self.path).map_err(|source| CoreError::ConfigRead {
            path: self.path.clone(),
            source,
        })?;
        let parsed: DevicesConfig =
            serde_json::from_slice(&raw).map_err(|source| CoreError::ConfigParse {
                path: self.path.clone(),
                source,
            })?;

        let mut devices = DeviceMap::with_capacity(parsed.devices.len());
        for device in parsed.devices {
            if let Some(previous) = devices.insert(device.id.clone(), device) {
                warn!(id = %previous.id, "duplicate device id in config, keeping the last entry");
            }
        }
        Ok(devices)
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Current declared devices, in file order.
    pub fn list(&self) -> Vec<ConfiguredDevice> {
        self.devices.load().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.devices.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.load().is_empty()
    }

    pub fn find_by_id(&self, id: &str) -> Option<ConfiguredDevice> {
        self.devices.load().get(id).cloned()
    }

    pub fn find_by_ip(&self, ip: &str) -> Option<ConfiguredDevice> {
        self.devices.load().values().find(|d| d.ip == ip).cloned()
    }

    /// Descriptor for a declared device, keyed by its `ip`. Only `model`
    /// and `state` carry information; the rest hold sentinels.
    pub fn build_descriptor(device: &ConfiguredDevice, is_connected: bool) -> DeviceDescriptor {
        let state = if is_connected {
            ConnectivityState::Connected
        } else {
            ConnectivityState::Disconnected
        };
        let mut descriptor = DeviceDescriptor::placeholder(device.ip.clone(), state);
        descriptor.model.clone_from(&device.name);
        descriptor
    }

    /// Receive a signal after every load attempt.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    // ── Watching ─────────────────────────────────────────────────────

    /// Poll the file every `interval` and reload on change.
    /// Runs until `cancel` fires.
    pub fn spawn_watcher(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let store = Arc::clone(self);
        let mut last = fingerprint(&store.path);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!(path = %store.path.display(), "watching devices config");

            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let current = fingerprint(&store.path);
                if current != last {
                    last = current;
                    info!(path = %store.path.display(), "devices config changed, reloading");
                    let _ = store.load();
                }
            }

            debug!("devices config watcher exiting");
        })
    }
}

/// What the watcher compares between polls. The digest catches rewrites
/// that keep size and land inside one timestamp tick.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Fingerprint {
    modified: Option<SystemTime>,
    len: u64,
    digest: [u8; 32],
}

/// `None` if the file is unreadable.
fn fingerprint(path: &Path) -> Option<Fingerprint> {
    let meta = std::fs::metadata(path).ok()?;
    let raw = std::fs::read(path).ok()?;
    Some(Fingerprint {
        modified: meta.modified().ok(),
        len: meta.len(),
        digest: Sha256::digest(&raw).into(),
    })
}
