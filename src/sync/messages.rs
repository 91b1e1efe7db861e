//! Message types crossing the host ↔ UI boundary
//!
//! All messages are JSON objects tagged by `type`. Over the WebSocket bridge
//! they are wrapped in [`ClientFrame`] / [`ServerFrame`], which add the
//! sequence number used to correlate requests with their responses.

use crate::session::ConnectionStatus;
use crate::window::{Mode, SurfaceCommand};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fire-and-forget messages from the UI to the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum UiCommand {
    /// Mode name as typed by the UI; validated by the host
    RequestModeChange { mode: String },
    RequestConnect,
    GetConfig { domain: String },
    SaveConfig { domain: String, value: Value },
    /// Remote service command such as `StartRecord` or `GetRecordStatus`
    RemoteCommand {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        args: Option<Value>,
    },
}

/// Requests from the UI that expect exactly one response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum UiRequest {
    GetCurrentMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum UiResponse {
    CurrentMode { mode: Mode },
}

/// Broadcasts from the host to UI listeners
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Notification {
    ModeChanged {
        mode: Mode,
        previous: Option<Mode>,
    },
    ConnectionStatus {
        status: ConnectionStatus,
        detail: Option<String>,
        /// Remediation hint to show while still loading
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hint: Option<String>,
    },
    Config {
        domain: String,
        value: Value,
    },
    Surface {
        command: SurfaceCommand,
    },
    RemoteEvent {
        name: String,
        data: Value,
    },
    CommandResult {
        name: String,
        ok: bool,
        data: Value,
    },
}

impl Notification {
    /// Channel name listeners subscribe to
    pub fn name(&self) -> &'static str {
        match self {
            Notification::ModeChanged { .. } => "mode-changed",
            Notification::ConnectionStatus { .. } => "connection-status",
            Notification::Config { .. } => "config",
            Notification::Surface { .. } => "surface",
            Notification::RemoteEvent { .. } => "remote-event",
            Notification::CommandResult { .. } => "command-result",
        }
    }
}

/// Frames sent by a UI client over the WebSocket bridge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ClientFrame {
    Command { command: UiCommand },
    Request { seq: u64, request: UiRequest },
    /// Replace this client's listeners with the given channel names
    Listen { names: Vec<String> },
}

/// Frames sent by the host over the WebSocket bridge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ServerFrame {
    Notification { notification: Notification },
    Response { seq: u64, response: UiResponse },
    Rejected { seq: u64, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ui_command_wire_format() {
        let command: UiCommand =
            serde_json::from_value(json!({ "type": "request-mode-change", "mode": "config" }))
                .unwrap();
        assert_eq!(
            command,
            UiCommand::RequestModeChange {
                mode: "config".into()
            }
        );

        let command: UiCommand =
            serde_json::from_value(json!({ "type": "remote-command", "name": "PauseRecord" }))
                .unwrap();
        assert_eq!(
            command,
            UiCommand::RemoteCommand {
                name: "PauseRecord".into(),
                args: None
            }
        );
    }

    #[test]
    fn test_notification_names_match_wire_tags() {
        let notifications = [
            Notification::ModeChanged {
                mode: Mode::Overlay,
                previous: Some(Mode::Loading),
            },
            Notification::ConnectionStatus {
                status: ConnectionStatus::Connected,
                detail: None,
                hint: None,
            },
            Notification::Config {
                domain: "obs".into(),
                value: Value::Null,
            },
            Notification::Surface {
                command: SurfaceCommand::Center,
            },
            Notification::RemoteEvent {
                name: "RecordStateChanged".into(),
                data: Value::Null,
            },
            Notification::CommandResult {
                name: "StartRecord".into(),
                ok: true,
                data: Value::Null,
            },
        ];
        for notification in notifications {
            let value = serde_json::to_value(&notification).unwrap();
            assert_eq!(value["type"], notification.name());
        }
    }

    #[test]
    fn test_client_frame_request() {
        let frame: ClientFrame = serde_json::from_value(json!({
            "kind": "request",
            "seq": 4,
            "request": { "type": "get-current-mode" }
        }))
        .unwrap();
        assert_eq!(
            frame,
            ClientFrame::Request {
                seq: 4,
                request: UiRequest::GetCurrentMode
            }
        );
    }
}
