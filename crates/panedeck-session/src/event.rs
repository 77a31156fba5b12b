use panedeck_common::TerminalId;
use serde::Serialize;

/// Output pushed to consumers of a local terminal.
///
/// Serializes as `{"event": "data", "params": {"id", "data"}}` and
/// `{"event": "exit", "params": {"id", "exitCode"}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "params", rename_all = "lowercase")]
pub enum TerminalEvent {
    Data {
        id: TerminalId,
        data: String,
    },
    Exit {
        id: TerminalId,
        #[serde(rename = "exitCode")]
        exit_code: i32,
    },
}

impl TerminalEvent {
    pub fn id(&self) -> &TerminalId {
        match self {
            TerminalEvent::Data { id, .. } | TerminalEvent::Exit { id, .. } => id,
        }
    }

    pub fn is_exit(&self) -> bool {
        matches!(self, TerminalEvent::Exit { .. })
    }
}

pub trait TerminalEventSink: Send + Sync {
    fn deliver(&self, event: TerminalEvent);
}
