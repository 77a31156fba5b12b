use panedeck_common::TerminalId;
use panedeck_common::error_codes;
use panedeck_pty::PtyError;
use panedeck_pty::SpawnErrorKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Terminal not found: {0}")]
    NotFound(TerminalId),
    #[error("Failed to start terminal {id}: {source}")]
    Spawn {
        id: TerminalId,
        #[source]
        source: PtyError,
    },
    #[error("Invalid terminal size {cols}x{rows}")]
    InvalidSize { cols: u16, rows: u16 },
    #[error("Terminal {id}: {source}")]
    Io {
        id: TerminalId,
        #[source]
        source: PtyError,
    },
}

impl SessionError {
    pub fn code(&self) -> i32 {
        match self {
            SessionError::NotFound(_) => error_codes::TERMINAL_NOT_FOUND,
            SessionError::Spawn { source, .. } => match source.spawn_kind() {
                Some(SpawnErrorKind::NotFound) => error_codes::COMMAND_NOT_FOUND,
                Some(SpawnErrorKind::PermissionDenied) => error_codes::PERMISSION_DENIED,
                _ => error_codes::PTY_ERROR,
            },
            SessionError::InvalidSize { .. } => error_codes::INVALID_PARAMS,
            SessionError::Io { .. } => error_codes::PTY_ERROR,
        }
    }

    pub fn terminal_id(&self) -> Option<&TerminalId> {
        match self {
            SessionError::NotFound(id)
            | SessionError::Spawn { id, .. }
            | SessionError::Io { id, .. } => Some(id),
            SessionError::InvalidSize { .. } => None,
        }
    }

    pub fn suggestion(&self) -> String {
        match self {
            SessionError::NotFound(_) => {
                "Use 'list' to see running terminals or 'create' to start one.".to_string()
            }
            SessionError::Spawn { source, .. } | SessionError::Io { source, .. } => {
                source.suggestion()
            }
            SessionError::InvalidSize { .. } => {
                "Columns and rows must both be greater than zero.".to_string()
            }
        }
    }
}
