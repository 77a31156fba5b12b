//! JSON text frames exchanged with remote clients.
//!
//! Every frame is `{"event": "<name>", "data": {...}}`. Clients may omit
//! `data` for events without fields.

use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Auth {
        token: String,
    },
    CreateTerminal {
        cwd: Option<String>,
        cols: Option<u16>,
        rows: Option<u16>,
    },
    TerminalInput {
        data: String,
    },
    TerminalResize {
        cols: u16,
        rows: u16,
    },
    KillTerminal,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),
    #[error("Unknown event: {0}")]
    UnknownEvent(String),
    #[error("Invalid data for {event}: {message}")]
    InvalidData { event: String, message: String },
}

#[derive(Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
struct AuthData {
    token: String,
}

#[derive(Deserialize, Default)]
struct CreateData {
    #[serde(default)]
    cwd: Option<String>,
    #[serde(default)]
    cols: Option<u16>,
    #[serde(default)]
    rows: Option<u16>,
}

#[derive(Deserialize)]
struct InputData {
    data: String,
}

#[derive(Deserialize)]
struct ResizeData {
    cols: u16,
    rows: u16,
}

impl ClientMessage {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope =
            serde_json::from_str(text).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;
        let event = envelope.event.as_str();
        let data = envelope.data;
        match event {
            "auth" => {
                let auth: AuthData = data_for(event, data)?;
                Ok(ClientMessage::Auth { token: auth.token })
            }
            "create_terminal" => {
                let create: CreateData = if data.is_null() {
                    CreateData::default()
                } else {
                    data_for(event, data)?
                };
                Ok(ClientMessage::CreateTerminal {
                    cwd: create.cwd.filter(|cwd| !cwd.trim().is_empty()),
                    cols: create.cols,
                    rows: create.rows,
                })
            }
            "terminal_input" => {
                let input: InputData = data_for(event, data)?;
                Ok(ClientMessage::TerminalInput { data: input.data })
            }
            "terminal_resize" => {
                let resize: ResizeData = data_for(event, data)?;
                Ok(ClientMessage::TerminalResize {
                    cols: resize.cols,
                    rows: resize.rows,
                })
            }
            "kill_terminal" => Ok(ClientMessage::KillTerminal),
            other => Err(ProtocolError::UnknownEvent(other.to_string())),
        }
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            ClientMessage::Auth { .. } => "auth",
            ClientMessage::CreateTerminal { .. } => "create_terminal",
            ClientMessage::TerminalInput { .. } => "terminal_input",
            ClientMessage::TerminalResize { .. } => "terminal_resize",
            ClientMessage::KillTerminal => "kill_terminal",
        }
    }
}

fn data_for<T: DeserializeOwned>(event: &str, data: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(data).map_err(|e| ProtocolError::InvalidData {
        event: event.to_string(),
        message: e.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    AuthSuccess {},
    AuthError {
        message: String,
    },
    TerminalReady {
        pid: u32,
    },
    TerminalData {
        data: String,
    },
    TerminalExit {
        #[serde(rename = "exitCode")]
        exit_code: i32,
    },
    TerminalKilled {},
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> String {
        // Plain data enums cannot fail to serialize.
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"event":"error","data":{"message":"serialization failed"}}"#.to_string()
        })
    }
}
