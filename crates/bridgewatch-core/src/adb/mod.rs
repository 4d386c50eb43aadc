// ── adb CLI collaborators ──
//
// Implementations of the bridge traits that shell out to the `adb`
// executable. Every call spawns a short-lived process except the device
// tracker, which keeps `adb track-devices` running for the stream's life.

pub mod protocol;

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use futures_core::Stream;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, Command as Process};
use tracing::{debug, info, warn};

use crate::bridge::{BridgeClient, ChangeSet, ChangeStream, DeviceEntry, DeviceOps, Reconnector};
use crate::error::BridgeError;
use crate::model::{DeviceProperties, NetworkInterface};

use self::protocol::{
    FrameDecoder, parse_device_list, parse_getprop, parse_ip_addr, properties_from,
};

const READ_CHUNK: usize = 4096;

// ── Process helpers ─────────────────────────────────────────────────

fn spawn_error(program: &str) -> impl FnOnce(std::io::Error) -> BridgeError + '_ {
    move |source| BridgeError::Spawn {
        program: program.to_owned(),
        source,
    }
}

/// Run `program args...` to completion, returning stdout on exit code 0.
async fn run(program: &str, args: &[&str]) -> Result<String, BridgeError> {
    let output = Process::new(program)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(spawn_error(program))?;

    if !output.status.success() {
        return Err(BridgeError::Command {
            program: program.to_owned(),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

// ── AdbClient ───────────────────────────────────────────────────────

/// Bridge client backed by the local adb server.
#[derive(Debug, Clone)]
pub struct AdbClient {
    program: String,
    server_command: Option<String>,
}

impl AdbClient {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            server_command: None,
        }
    }

    /// Shell command used by [`DeviceOps::start_server`] on every device.
    #[must_use]
    pub fn with_server_command(mut self, command: Option<String>) -> Self {
        self.server_command = command;
        self
    }
}

impl Default for AdbClient {
    fn default() -> Self {
        Self::new("adb")
    }
}

#[async_trait]
impl BridgeClient for AdbClient {
    async fn list_devices(&self) -> Result<Vec<DeviceEntry>, BridgeError> {
        let output = run(&self.program, &["devices"]).await?;
        Ok(parse_device_list(&output))
    }

    async fn track_devices(&self) -> Result<ChangeStream, BridgeError> {
        let mut child = Process::new(&self.program)
            .arg("track-devices")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_error(&self.program))?;

        let stdout = child.stdout.take().ok_or_else(|| BridgeError::Connection {
            reason: "tracker stdout was not captured".into(),
        })?;

        debug!(program = %self.program, pid = ?child.id(), "device tracker spawned");
        Ok(Box::pin(tracker_stream(stdout, Some(child))))
    }

    fn device(&self, udid: &str) -> Arc<dyn DeviceOps> {
        Arc::new(AdbDevice {
            program: self.program.clone(),
            serial: udid.to_owned(),
            server_command: self.server_command.clone(),
        })
    }
}

/// Turn a stream of tracker frames into change sets.
///
/// `child` is owned by the stream so the tracker process is killed when
/// the stream is dropped.
fn tracker_stream<R>(
    mut reader: R,
    child: Option<Child>,
) -> impl Stream<Item = Result<ChangeSet, BridgeError>> + Send + 'static
where
    R: AsyncRead + Unpin + Send + 'static,
{
    async_stream::try_stream! {
        let _child = child;
        let mut decoder = FrameDecoder::default();
        let mut previous: Vec<DeviceEntry> = Vec::new();
        let mut chunk = vec![0_u8; READ_CHUNK];

        loop {
            let read = reader.read(&mut chunk).await?;
            if read == 0 {
                break;
            }
            decoder.push(chunk.get(..read).unwrap_or_default());

            while let Some(frame) = decoder.next_frame()? {
                let current = parse_device_list(&frame);
                let changes = ChangeSet::diff(&previous, &current);
                previous = current;
                if !changes.is_empty() {
                    yield changes;
                }
            }
        }
    }
}

// ── AdbDevice ───────────────────────────────────────────────────────

/// Per-device operations via `adb -s <serial> shell`.
#[derive(Debug, Clone)]
pub struct AdbDevice {
    program: String,
    serial: String,
    server_command: Option<String>,
}

impl AdbDevice {
    async fn shell(&self, command: &str) -> Result<String, BridgeError> {
        run(&self.program, &["-s", &self.serial, "shell", command]).await
    }
}

#[async_trait]
impl DeviceOps for AdbDevice {
    async fn fetch_properties(&self) -> Result<DeviceProperties, BridgeError> {
        let output = self.shell("getprop").await?;
        Ok(properties_from(&parse_getprop(&output)))
    }

    async fn kill_server(&self, pid: i32) -> Result<(), BridgeError> {
        self.shell(&format!("kill {pid}")).await.map(drop)
    }

    async fn start_server(&self) -> Result<i32, BridgeError> {
        let Some(command) = self.server_command.as_deref() else {
            return Err(BridgeError::Unavailable {
                operation: "start server (no server command configured)".into(),
            });
        };

        let output = self
            .shell(&format!("{command} >/dev/null 2>&1 & echo $!"))
            .await?;
        output.trim().parse().map_err(|_| BridgeError::Protocol {
            message: format!("expected a pid, got {:?}", output.trim()),
        })
    }

    async fn update_interfaces(&self) -> Result<Vec<NetworkInterface>, BridgeError> {
        let output = self.shell("ip -4 -o addr show").await?;
        Ok(parse_ip_addr(&output))
    }

    async fn run_shell_command(&self, command: &str) -> Result<String, BridgeError> {
        self.shell(command).await
    }
}

// ── AdbReconnector ──────────────────────────────────────────────────

/// Reconnects network devices with `adb connect <address>`.
#[derive(Debug, Clone)]
pub struct AdbReconnector {
    program: String,
}

impl AdbReconnector {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl Reconnector for AdbReconnector {
    async fn reconnect(&self, address: &str) -> Result<(), BridgeError> {
        let mut child = Process::new(&self.program)
            .args(["connect", address])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_error(&self.program))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (_, stderr_text) = tokio::join!(
            log_lines(stdout, address, OutputStream::Stdout),
            log_lines(stderr, address, OutputStream::Stderr),
        );

        let status = child.wait().await?;
        info!(address, code = ?status.code(), "reconnect tool exited");

        if status.success() {
            Ok(())
        } else {
            Err(BridgeError::Command {
                program: self.program.clone(),
                code: status.code(),
                stderr: stderr_text,
            })
        }
    }
}

#[derive(Clone, Copy)]
enum OutputStream {
    Stdout,
    Stderr,
}

/// Log every line of a child's output. Stderr lines are also collected
/// for the error report.
async fn log_lines<R>(reader: Option<R>, address: &str, stream: OutputStream) -> String
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return String::new();
    };

    let mut collected = String::new();
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        match stream {
            OutputStream::Stdout => info!(address, "{line}"),
            OutputStream::Stderr => {
                warn!(address, "{line}");
                collected.push_str(&line);
                collected.push('\n');
            }
        }
    }
    collected
}
