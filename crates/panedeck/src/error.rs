use thiserror::Error;

#[derive(Error, Debug)]
pub enum HostError {
    #[error("Failed to set up signal handling: {0}")]
    SignalSetup(String),
    #[error("Host I/O error ({operation}): {source}")]
    Io {
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl HostError {
    pub fn suggestion(&self) -> String {
        match self {
            HostError::SignalSetup(_) => "Check process limits and retry.".to_string(),
            HostError::Io { .. } => {
                "Check that stdin and stdout are connected to the UI process.".to_string()
            }
        }
    }
}
