use std::path::PathBuf;

use panedeck_common::env::env_bool;
use panedeck_common::env::env_parse;
use panedeck_common::env::env_string;

use crate::ConnectionLimit;
use crate::RotationPolicy;

const DEFAULT_REMOTE_LISTEN: &str = "127.0.0.1:0";

#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub enabled: bool,
    pub listen: String,
    pub allow_remote: bool,
    pub max_connections: ConnectionLimit,
    pub rotation: RotationPolicy,
    pub state_path: PathBuf,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: DEFAULT_REMOTE_LISTEN.to_string(),
            allow_remote: false,
            max_connections: ConnectionLimit::default(),
            rotation: RotationPolicy::default(),
            state_path: default_state_path(),
        }
    }
}

impl RemoteConfig {
    pub fn from_env() -> Self {
        Self {
            enabled: env_bool("PANEDECK_REMOTE_ENABLED", false),
            listen: env_string("PANEDECK_REMOTE_LISTEN")
                .unwrap_or_else(|| DEFAULT_REMOTE_LISTEN.to_string()),
            allow_remote: env_bool("PANEDECK_REMOTE_ALLOW_REMOTE", false),
            max_connections: env_parse(
                "PANEDECK_REMOTE_MAX_CONNECTIONS",
                ConnectionLimit::default(),
            ),
            rotation: env_parse("PANEDECK_REMOTE_TOKEN_ROTATION", RotationPolicy::default()),
            state_path: env_string("PANEDECK_REMOTE_STATE")
                .map(PathBuf::from)
                .unwrap_or_else(default_state_path),
        }
    }
}

fn default_state_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".panedeck").join("remote.json")
}
