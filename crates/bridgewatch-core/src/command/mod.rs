// ── Command API ──
//
// Operator actions arrive either as a typed `Command` or as the JSON
// `CommandRequest` envelope. Both end up in `CommandDispatcher`.

mod dispatch;

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::model::NetworkInterface;

pub use dispatch::CommandDispatcher;

/// Command names as they appear on the wire.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
    strum::EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandType {
    ReconnectDevice,
    KillServer,
    StartServer,
    UpdateInterfaces,
    RunCommand,
}

/// A validated operator command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the reconnect tool for `address`. Needs no live device.
    ReconnectDevice { address: String },
    /// Kill the on-device server. Without a pid, the tracked server pid
    /// is used.
    KillServer { udid: String, pid: Option<i32> },
    StartServer { udid: String },
    UpdateInterfaces { udid: String },
    RunCommand { udid: String, command: String },
}

impl Command {
    pub fn kind(&self) -> CommandType {
        match self {
            Self::ReconnectDevice { .. } => CommandType::ReconnectDevice,
            Self::KillServer { .. } => CommandType::KillServer,
            Self::StartServer { .. } => CommandType::StartServer,
            Self::UpdateInterfaces { .. } => CommandType::UpdateInterfaces,
            Self::RunCommand { .. } => CommandType::RunCommand,
        }
    }

    /// Target device id, or the address for a reconnect.
    pub fn udid(&self) -> &str {
        match self {
            Self::ReconnectDevice { address } => address,
            Self::KillServer { udid, .. }
            | Self::StartServer { udid }
            | Self::UpdateInterfaces { udid }
            | Self::RunCommand { udid, .. } => udid,
        }
    }
}

/// JSON envelope: `{"type": "...", "udid": "...", "pid"?: n, "command"?: "..."}`.
///
/// `type` stays a plain string so unknown commands are reported as
/// unsupported rather than as a parse error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub udid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl TryFrom<CommandRequest> for Command {
    type Error = CoreError;

    fn try_from(request: CommandRequest) -> Result<Self, Self::Error> {
        let kind = CommandType::from_str(&request.kind).map_err(|_| {
            CoreError::UnsupportedCommand {
                kind: request.kind.clone(),
            }
        })?;

        let udid = request.udid.trim().to_owned();
        if udid.is_empty() {
            return Err(CoreError::ValidationFailed {
                field: "udid".into(),
                reason: "must not be empty".into(),
            });
        }

        Ok(match kind {
            CommandType::ReconnectDevice => Self::ReconnectDevice { address: udid },
            CommandType::KillServer => Self::KillServer {
                udid,
                pid: request.pid,
            },
            CommandType::StartServer => Self::StartServer { udid },
            CommandType::UpdateInterfaces => Self::UpdateInterfaces { udid },
            CommandType::RunCommand => {
                let command = request
                    .command
                    .filter(|c| !c.trim().is_empty())
                    .ok_or_else(|| CoreError::ValidationFailed {
                        field: "command".into(),
                        reason: "RUN_COMMAND needs a shell command".into(),
                    })?;
                Self::RunCommand { udid, command }
            }
        })
    }
}

impl From<Command> for CommandRequest {
    fn from(command: Command) -> Self {
        let kind = command.kind().to_string();
        match command {
            Command::ReconnectDevice { address } => Self {
                kind,
                udid: address,
                pid: None,
                command: None,
            },
            Command::KillServer { udid, pid } => Self {
                kind,
                udid,
                pid,
                command: None,
            },
            Command::StartServer { udid } | Command::UpdateInterfaces { udid } => Self {
                kind,
                udid,
                pid: None,
                command: None,
            },
            Command::RunCommand { udid, command } => Self {
                kind,
                udid,
                pid: None,
                command: Some(command),
            },
        }
    }
}

/// Result of a command execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CommandResult {
    Ok,
    ServerStarted { pid: i32 },
    Interfaces { interfaces: Vec<NetworkInterface> },
    ShellOutput { output: String },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn request(json: &str) -> CommandRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn parses_wire_commands() {
        let cmd = Command::try_from(request(
            r#"{"type":"KILL_SERVER","udid":"emulator-5554","pid":1234}"#,
        ))
        .unwrap();
        assert_eq!(
            cmd,
            Command::KillServer {
                udid: "emulator-5554".into(),
                pid: Some(1234)
            }
        );

        let cmd = Command::try_from(request(
            r#"{"type":"RECONNECT_DEVICE","udid":"10.0.0.5:5555"}"#,
        ))
        .unwrap();
        assert_eq!(cmd.kind(), CommandType::ReconnectDevice);
        assert_eq!(cmd.udid(), "10.0.0.5:5555");
    }

    #[test]
    fn unknown_type_is_unsupported() {
        let err = Command::try_from(request(r#"{"type":"REBOOT","udid":"x"}"#)).unwrap_err();
        assert_eq!(err.to_string(), "Unsupported command: \"REBOOT\"");
    }

    #[test]
    fn run_command_requires_a_command() {
        let err =
            Command::try_from(request(r#"{"type":"RUN_COMMAND","udid":"x"}"#)).unwrap_err();
        assert!(matches!(err, CoreError::ValidationFailed { ref field, .. } if field == "command"));
    }

    #[test]
    fn empty_udid_is_rejected() {
        let err = Command::try_from(request(r#"{"type":"START_SERVER","udid":" "}"#)).unwrap_err();
        assert!(matches!(err, CoreError::ValidationFailed { ref field, .. } if field == "udid"));
    }

    #[test]
    fn command_converts_back_to_request() {
        let req = CommandRequest::from(Command::RunCommand {
            udid: "x".into(),
            command: "ls".into(),
        });
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            serde_json::json!({"type": "RUN_COMMAND", "udid": "x", "command": "ls"})
        );
    }

    #[test]
    fn result_serializes_with_tag() {
        let json = serde_json::to_value(CommandResult::ServerStarted { pid: 7 }).unwrap();
        assert_eq!(json, serde_json::json!({"result": "server_started", "pid": 7}));
    }
}
