// In-memory bridge collaborators for unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::bridge::{BridgeClient, ChangeSet, ChangeStream, DeviceEntry, DeviceOps, Reconnector};
use crate::error::BridgeError;
use crate::model::{DeviceProperties, NetworkInterface};

pub(crate) type Feed = mpsc::UnboundedSender<Result<ChangeSet, BridgeError>>;

/// Bridge whose tracking attempts are scripted in order. Once the script
/// runs out every attempt fails.
#[derive(Default)]
pub(crate) struct FakeBridge {
    script: Mutex<VecDeque<Option<ChangeStream>>>,
    listed: Mutex<Vec<DeviceEntry>>,
    track_calls: AtomicUsize,
    devices: Mutex<HashMap<String, Arc<FakeDevice>>>,
}

impl FakeBridge {
    /// Next tracking attempt succeeds; returns the feed for its stream.
    pub(crate) fn push_stream(&self) -> Feed {
        let (tx, rx) = mpsc::unbounded_channel();
        self.script
            .lock()
            .unwrap()
            .push_back(Some(UnboundedReceiverStream::new(rx).boxed()));
        tx
    }

    /// Next tracking attempt fails.
    pub(crate) fn push_failure(&self) {
        self.script.lock().unwrap().push_back(None);
    }

    pub(crate) fn set_listed(&self, devices: Vec<DeviceEntry>) {
        *self.listed.lock().unwrap() = devices;
    }

    pub(crate) fn track_calls(&self) -> usize {
        self.track_calls.load(Ordering::SeqCst)
    }

    /// The device handle that `device(udid)` returns.
    pub(crate) fn device_handle(&self, udid: &str) -> Arc<FakeDevice> {
        Arc::clone(
            self.devices
                .lock()
                .unwrap()
                .entry(udid.to_owned())
                .or_insert_with(|| Arc::new(FakeDevice::new(udid))),
        )
    }
}

#[async_trait]
impl BridgeClient for FakeBridge {
    async fn list_devices(&self) -> Result<Vec<DeviceEntry>, BridgeError> {
        Ok(self.listed.lock().unwrap().clone())
    }

    async fn track_devices(&self) -> Result<ChangeStream, BridgeError> {
        self.track_calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .flatten()
            .ok_or_else(|| BridgeError::Connection {
                reason: "scripted failure".into(),
            })
    }

    fn device(&self, udid: &str) -> Arc<dyn DeviceOps> {
        self.device_handle(udid)
    }
}

/// Device that records every call.
pub(crate) struct FakeDevice {
    udid: String,
    pub(crate) properties: Mutex<DeviceProperties>,
    pub(crate) interfaces: Mutex<Vec<NetworkInterface>>,
    pub(crate) calls: Mutex<Vec<String>>,
}

impl FakeDevice {
    fn new(udid: &str) -> Self {
        Self {
            udid: udid.to_owned(),
            properties: Mutex::new(DeviceProperties {
                manufacturer: "Google".into(),
                model: "Pixel 7".into(),
                os_version: "14".into(),
                sdk_version: "34".into(),
                cpu_abi: "arm64-v8a".into(),
                wifi_interface: "wlan0".into(),
            }),
            interfaces: Mutex::new(vec![NetworkInterface {
                name: "wlan0".into(),
                ipv4: "192.168.1.42".into(),
            }]),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

pub(crate) const FAKE_SERVER_PID: i32 = 4242;

#[async_trait]
impl DeviceOps for FakeDevice {
    async fn fetch_properties(&self) -> Result<DeviceProperties, BridgeError> {
        self.record("getprop".into());
        Ok(self.properties.lock().unwrap().clone())
    }

    async fn kill_server(&self, pid: i32) -> Result<(), BridgeError> {
        self.record(format!("kill {pid}"));
        Ok(())
    }

    async fn start_server(&self) -> Result<i32, BridgeError> {
        self.record("start".into());
        Ok(FAKE_SERVER_PID)
    }

    async fn update_interfaces(&self) -> Result<Vec<NetworkInterface>, BridgeError> {
        self.record("interfaces".into());
        Ok(self.interfaces.lock().unwrap().clone())
    }

    async fn run_shell_command(&self, command: &str) -> Result<String, BridgeError> {
        self.record(format!("shell {command}"));
        if command == "false" {
            return Err(BridgeError::Command {
                program: "adb".into(),
                code: Some(1),
                stderr: String::new(),
            });
        }
        Ok(format!("{}: {command}\n", self.udid))
    }
}

/// Reconnect tool that exits non-zero for selected addresses.
#[derive(Default)]
pub(crate) struct FakeReconnector {
    failing: Mutex<HashSet<String>>,
    pub(crate) calls: Mutex<Vec<String>>,
}

impl FakeReconnector {
    pub(crate) fn fail_for(&self, address: &str) {
        self.failing.lock().unwrap().insert(address.to_owned());
    }
}

#[async_trait]
impl Reconnector for FakeReconnector {
    async fn reconnect(&self, address: &str) -> Result<(), BridgeError> {
        self.calls.lock().unwrap().push(address.to_owned());
        if self.failing.lock().unwrap().contains(address) {
            return Err(BridgeError::Command {
                program: "adb".into(),
                code: Some(1),
                stderr: format!("failed to connect to {address}"),
            });
        }
        Ok(())
    }
}
