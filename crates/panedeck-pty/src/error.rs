//! PTY errors with an operation tag and an actionable suggestion.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnErrorKind {
    NotFound,
    PermissionDenied,
    Other,
}

#[derive(Error, Debug)]
pub enum PtyError {
    #[error("Failed to open PTY: {0}")]
    Open(String),
    #[error("Failed to spawn process: {reason}")]
    Spawn {
        reason: String,
        kind: SpawnErrorKind,
    },
    #[error("Failed to write to PTY: {0}")]
    Write(String),
    #[error("Failed to resize PTY: {0}")]
    Resize(String),
    #[error("Failed to kill PTY process: {0}")]
    Kill(String),
}

impl PtyError {
    pub fn spawn(reason: impl Into<String>, kind: SpawnErrorKind) -> Self {
        PtyError::Spawn {
            reason: reason.into(),
            kind,
        }
    }

    pub fn operation(&self) -> &'static str {
        match self {
            PtyError::Open(_) => "open",
            PtyError::Spawn { .. } => "spawn",
            PtyError::Write(_) => "write",
            PtyError::Resize(_) => "resize",
            PtyError::Kill(_) => "kill",
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            PtyError::Open(r) | PtyError::Write(r) | PtyError::Resize(r) | PtyError::Kill(r) => r,
            PtyError::Spawn { reason, .. } => reason,
        }
    }

    pub fn spawn_kind(&self) -> Option<SpawnErrorKind> {
        match self {
            PtyError::Spawn { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Open and spawn failures both mean no process came into existence.
    pub fn is_spawn_failure(&self) -> bool {
        matches!(self, PtyError::Open(_) | PtyError::Spawn { .. })
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, PtyError::Write(_))
    }

    pub fn suggestion(&self) -> String {
        match self {
            PtyError::Open(_) => {
                "PTY allocation failed. Check system resource limits (ulimit -n) or try restarting."
                    .to_string()
            }
            PtyError::Spawn { kind, .. } => match kind {
                SpawnErrorKind::NotFound => {
                    "Command not found. Check if the command exists and is in PATH.".to_string()
                }
                SpawnErrorKind::PermissionDenied => {
                    "Permission denied. Check file permissions.".to_string()
                }
                SpawnErrorKind::Other => {
                    "Process spawn failed. Check command syntax and permissions.".to_string()
                }
            },
            PtyError::Write(_) => {
                "Failed to send input to terminal. The process may have exited.".to_string()
            }
            PtyError::Resize(_) => {
                "Failed to resize terminal. Try again or restart the terminal.".to_string()
            }
            PtyError::Kill(_) => "The process may already have exited.".to_string(),
        }
    }
}
