// ── Command routing ──
//
// Commands run on the caller's task, concurrently with reconciliation.
// The dispatcher only reads the live store; pids and interfaces it learns
// are sent back to the reconciliation task as feedback.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::bridge::{BridgeClient, DeviceOps, Reconnector};
use crate::error::CoreError;
use crate::model::NO_PID;
use crate::reconcile::Feedback;
use crate::store::{DeviceStateStore, LiveData};

use super::{Command, CommandRequest, CommandResult};

pub struct CommandDispatcher {
    client: Arc<dyn BridgeClient>,
    reconnector: Arc<dyn Reconnector>,
    live: Arc<DeviceStateStore>,
    feedback: mpsc::UnboundedSender<Feedback>,
}

impl CommandDispatcher {
    pub(crate) fn new(
        client: Arc<dyn BridgeClient>,
        reconnector: Arc<dyn Reconnector>,
        live: Arc<DeviceStateStore>,
        feedback: mpsc::UnboundedSender<Feedback>,
    ) -> Self {
        Self {
            client,
            reconnector,
            live,
            feedback,
        }
    }

    /// Validate a wire request and run it.
    pub async fn dispatch_request(
        &self,
        request: CommandRequest,
    ) -> Result<CommandResult, CoreError> {
        let command = Command::try_from(request)?;
        self.dispatch(command).await
    }

    pub async fn dispatch(&self, command: Command) -> Result<CommandResult, CoreError> {
        info!(kind = %command.kind(), udid = command.udid(), "running command");

        match command {
            Command::ReconnectDevice { address } => {
                let result = self.reconnector.reconnect(&address).await;
                result.map_err(|source| CoreError::ReconnectFailed { address, source })?;
                Ok(CommandResult::Ok)
            }

            Command::KillServer { udid, pid } => {
                let device = self.device(&udid)?;
                let tracked = self.live.pid(&udid).filter(|p| *p != NO_PID);
                let Some(pid) = pid.or(tracked) else {
                    return Err(CoreError::ValidationFailed {
                        field: "pid".into(),
                        reason: format!("no pid given and no server is tracked on {udid}"),
                    });
                };

                let result = device.kill_server(pid).await;
                result.map_err(|source| CoreError::CommandFailed {
                    udid: udid.clone(),
                    source,
                })?;
                if tracked == Some(pid) {
                    self.feed(udid, LiveData::ServerPid(NO_PID));
                }
                Ok(CommandResult::Ok)
            }

            Command::StartServer { udid } => {
                let device = self.device(&udid)?;
                let result = device.start_server().await;
                let pid = result.map_err(|source| CoreError::CommandFailed {
                    udid: udid.clone(),
                    source,
                })?;
                self.feed(udid, LiveData::ServerPid(pid));
                Ok(CommandResult::ServerStarted { pid })
            }

            Command::UpdateInterfaces { udid } => {
                let device = self.device(&udid)?;
                let result = device.update_interfaces().await;
                let interfaces = result.map_err(|source| CoreError::CommandFailed {
                    udid: udid.clone(),
                    source,
                })?;
                self.feed(udid, LiveData::Interfaces(interfaces.clone()));
                Ok(CommandResult::Interfaces { interfaces })
            }

            Command::RunCommand { udid, command } => {
                let device = self.device(&udid)?;
                debug!(udid = %udid, command = %command, "running shell command");
                match device.run_shell_command(&command).await {
                    Ok(output) => Ok(CommandResult::ShellOutput { output }),
                    Err(source) => {
                        warn!(udid = %udid, command = %command, error = %source, "shell command failed");
                        Err(CoreError::CommandFailed { udid, source })
                    }
                }
            }
        }
    }

    fn device(&self, udid: &str) -> Result<Arc<dyn DeviceOps>, CoreError> {
        if !self.live.contains(udid) {
            warn!(udid = %udid, "command for unknown device");
            return Err(CoreError::DeviceNotFound {
                udid: udid.to_owned(),
            });
        }
        Ok(self.client.device(udid))
    }

    fn feed(&self, udid: String, data: LiveData) {
        if self.feedback.send(Feedback { udid, data }).is_err() {
            debug!("reconciliation task gone, dropping command feedback");
        }
    }
}
