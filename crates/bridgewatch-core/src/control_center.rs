// ── ControlCenter ──
//
// The public face of the registry. Wires the config store, tracker
// session, reconciliation task, and command dispatcher together and owns
// their background tasks.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::adb::{AdbClient, AdbReconnector};
use crate::bridge::{BridgeClient, Reconnector};
use crate::command::{Command, CommandDispatcher, CommandRequest, CommandResult};
use crate::config::RegistryConfig;
use crate::config_store::ConfigStore;
use crate::error::CoreError;
use crate::model::{ConfiguredDevice, DeviceDescriptor};
use crate::reconcile::{self, Inputs, Reconciler};
use crate::store::{DescriptorStore, DeviceStateStore, LiveDevice, Snapshot};
use crate::stream::{DescriptorStream, EventStream};
use crate::tracker::{SessionState, TrackerSession};

/// Device registry handle.
///
/// Cheaply cloneable. Construct once, call [`start`](Self::start), and
/// [`release`](Self::release) when done.
#[derive(Clone)]
pub struct ControlCenter {
    inner: Arc<Inner>,
}

struct Inner {
    id: String,
    name: String,
    config: RegistryConfig,
    live: Arc<DeviceStateStore>,
    configs: Arc<ConfigStore>,
    descriptors: Arc<DescriptorStore>,
    tracker: TrackerSession,
    reconciler: Arc<Reconciler>,
    dispatcher: CommandDispatcher,
    inputs: Arc<tokio::sync::Mutex<Inputs>>,
    running: Mutex<Option<Running>>,
}

struct Running {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ControlCenter {
    /// Build a registry over the given collaborators. Opens (and if needed
    /// creates) the devices config but starts nothing.
    pub fn new(
        config: RegistryConfig,
        client: Arc<dyn BridgeClient>,
        reconnector: Arc<dyn Reconnector>,
    ) -> Self {
        let live = Arc::new(DeviceStateStore::new());
        let configs = Arc::new(ConfigStore::open(&config.devices_config));
        let descriptors = Arc::new(DescriptorStore::new());

        let (tracker_tx, tracker_rx) = mpsc::unbounded_channel();
        let (feedback_tx, feedback_rx) = mpsc::unbounded_channel();

        let tracker = TrackerSession::new(Arc::clone(&client), config.backoff.clone(), tracker_tx);
        let reconciler = Arc::new(Reconciler::new(
            Arc::clone(&live),
            Arc::clone(&configs),
            Arc::clone(&descriptors),
            Arc::clone(&client),
            feedback_tx.clone(),
        ));
        let dispatcher = CommandDispatcher::new(client, reconnector, Arc::clone(&live), feedback_tx);

        let host = hostname();
        Self {
            inner: Arc::new(Inner {
                id: instance_id(&host),
                name: format!("Android Debug Bridge Interface [{host}]"),
                config,
                live,
                configs,
                descriptors,
                tracker,
                reconciler,
                dispatcher,
                inputs: Arc::new(tokio::sync::Mutex::new(Inputs {
                    tracker: tracker_rx,
                    feedback: feedback_rx,
                })),
                running: Mutex::new(None),
            }),
        }
    }

    /// Registry backed by the `adb` executable named in `config`.
    pub fn with_adb(config: RegistryConfig) -> Self {
        let client = AdbClient::new(config.adb_program.clone())
            .with_server_command(config.server_command.clone());
        let reconnector = AdbReconnector::new(config.adb_program.clone());
        Self::new(config, Arc::new(client), Arc::new(reconnector))
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    /// Stable id for this registry instance.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Spawn the config watcher, the reconciliation task, and the tracker.
    /// A no-op if already started. Must be called within a tokio runtime.
    pub fn start(&self) {
        let mut running = lock(&self.inner.running);
        if running.is_some() {
            debug!("registry already started");
            return;
        }

        let cancel = CancellationToken::new();
        let watcher = self
            .inner
            .configs
            .spawn_watcher(self.inner.config.config_poll_interval, cancel.child_token());
        let reconcile = tokio::spawn(reconcile::run(
            Arc::clone(&self.inner.reconciler),
            Arc::clone(&self.inner.inputs),
            self.inner.configs.subscribe(),
            cancel.child_token(),
        ));
        self.inner.tracker.start();

        info!(id = %self.inner.id, config = %self.inner.configs.path().display(), "registry started");
        *running = Some(Running {
            cancel,
            tasks: vec![watcher, reconcile],
        });
    }

    /// Stop the tracker, the watcher, and reconciliation. Published state
    /// is kept; `start` may be called again.
    pub async fn release(&self) {
        self.inner.tracker.stop();
        let Some(running) = lock(&self.inner.running).take() else {
            return;
        };

        running.cancel.cancel();
        for task in running.tasks {
            let _ = task.await;
        }
        info!(id = %self.inner.id, "registry released");
    }

    pub fn is_running(&self) -> bool {
        lock(&self.inner.running).is_some()
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// All published descriptors, ordered by key.
    pub fn devices(&self) -> Snapshot<DeviceDescriptor> {
        self.inner.descriptors.snapshot()
    }

    pub fn descriptor(&self, udid: &str) -> Option<Arc<DeviceDescriptor>> {
        self.inner.descriptors.get(udid)
    }

    /// The live device the bridge reported under `udid`.
    pub fn device(&self, udid: &str) -> Option<LiveDevice> {
        self.inner.live.get(udid)
    }

    pub fn configured_devices(&self) -> Vec<ConfiguredDevice> {
        self.inner.configs.list()
    }

    /// Re-read the devices config now instead of waiting for the watcher.
    pub fn reload_config(&self) -> Result<usize, CoreError> {
        self.inner.configs.load()
    }

    // ── Subscriptions ────────────────────────────────────────────────

    pub fn subscribe(&self) -> DescriptorStream {
        DescriptorStream::new(self.inner.descriptors.watch())
    }

    pub fn events(&self) -> EventStream {
        EventStream::new(self.inner.descriptors.events())
    }

    pub fn session_state(&self) -> watch::Receiver<SessionState> {
        self.inner.tracker.watch_state()
    }

    /// Wait until the bridge reports `udid`.
    pub async fn wait_for_device(
        &self,
        udid: &str,
        timeout: Duration,
    ) -> Result<LiveDevice, CoreError> {
        let mut snapshots = self.inner.descriptors.watch();
        let wait = async {
            loop {
                if let Some(device) = self.inner.live.get(udid) {
                    return Ok::<_, CoreError>(device);
                }
                snapshots
                    .changed()
                    .await
                    .map_err(|_| CoreError::RegistryClosed)?;
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .unwrap_or_else(|_| {
                Err(CoreError::DeviceNotFound {
                    udid: udid.to_owned(),
                })
            })
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub async fn execute(&self, command: Command) -> Result<CommandResult, CoreError> {
        self.inner.dispatcher.dispatch(command).await
    }

    pub async fn execute_request(
        &self,
        request: CommandRequest,
    ) -> Result<CommandResult, CoreError> {
        self.inner.dispatcher.dispatch_request(request).await
    }
}

fn hostname() -> String {
    let host = gethostname::gethostname().to_string_lossy().trim().to_owned();
    if host.is_empty() {
        "localhost".into()
    } else {
        host
    }
}

/// Hex SHA-256 of host name and start time.
fn instance_id(host: &str) -> String {
    let started = chrono::Utc::now().timestamp_millis();
    let digest = Sha256::digest(format!("adb|{host}|{started}").as_bytes());
    digest.iter().fold(String::with_capacity(64), |mut out, b| {
        use std::fmt::Write;
        let _ = write!(out, "{b:02x}");
        out
    })
}
