use panedeck_pty::PtyError;
use thiserror::Error;

use crate::SocketId;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Remote connection limit reached ({limit})")]
    CapacityExceeded { limit: usize },
    #[error("Invalid access token")]
    AuthFailed,
    #[error("Not authenticated")]
    NotAuthenticated,
    #[error("A terminal already exists for this connection")]
    DuplicateTerminal,
    #[error("No terminal for this connection")]
    NoTerminal,
    #[error("Invalid terminal size {cols}x{rows}")]
    InvalidSize { cols: u16, rows: u16 },
    #[error("Unknown connection: {0}")]
    UnknownSocket(SocketId),
    #[error("Remote terminal error: {0}")]
    Pty(#[from] PtyError),
}

impl GatewayError {
    /// Message sent to the client for this failure.
    pub fn client_message(&self) -> String {
        match self {
            GatewayError::NotAuthenticated => "not authenticated".to_string(),
            GatewayError::Pty(err) if err.is_spawn_failure() => {
                format!("Failed to start terminal: {}", err.reason())
            }
            other => other.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum RemoteServerError {
    #[error("Remote access disabled")]
    Disabled,
    #[error("Invalid listen address: {message}")]
    InvalidListen { message: String },
    #[error("Remote server I/O error ({operation}): {source}")]
    Io {
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use panedeck_pty::SpawnErrorKind;

    #[test]
    fn test_client_messages() {
        assert_eq!(
            GatewayError::NotAuthenticated.client_message(),
            "not authenticated"
        );
        let spawn = GatewayError::from(PtyError::spawn("zsh: not found", SpawnErrorKind::NotFound));
        assert_eq!(spawn.client_message(), "Failed to start terminal: zsh: not found");
        assert_eq!(
            GatewayError::CapacityExceeded { limit: 1 }.client_message(),
            "Remote connection limit reached (1)"
        );
    }
}
