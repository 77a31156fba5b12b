use panedeck_common::env::env_parse;
use panedeck_common::env::env_string;
use panedeck_pty::AgentProfile;
use panedeck_pty::DEFAULT_AGENT_PROGRAM;
use panedeck_pty::HostOs;
use panedeck_pty::PlatformProbe;
use panedeck_pty::ShellProfile;
use panedeck_pty::TerminalSize;
use panedeck_remote::GatewayConfig;
use panedeck_remote::RemoteConfig;
use panedeck_session::SessionConfig;
use serde_json::Value;
use serde_json::json;
use tracing::warn;

/// Everything the host needs to start, resolved from the environment and
/// then overridden by command-line flags.
#[derive(Debug, Clone)]
pub struct HostConfig {
    pub default_size: TerminalSize,
    /// Explicit shell program; `None` means platform detection.
    pub shell: Option<String>,
    pub agent: String,
    pub agent_args: Vec<String>,
    pub remote: RemoteConfig,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            default_size: TerminalSize::default(),
            shell: None,
            agent: DEFAULT_AGENT_PROGRAM.to_string(),
            agent_args: Vec::new(),
            remote: RemoteConfig::default(),
        }
    }
}

impl HostConfig {
    pub fn from_env() -> Self {
        let fallback = TerminalSize::default();
        let size = TerminalSize::new(
            env_parse("PANEDECK_COLS", fallback.cols),
            env_parse("PANEDECK_ROWS", fallback.rows),
        );
        Self {
            default_size: valid_size_or_default(size),
            shell: env_string("PANEDECK_SHELL"),
            agent: env_string("PANEDECK_AGENT").unwrap_or_else(|| DEFAULT_AGENT_PROGRAM.to_string()),
            agent_args: env_string("PANEDECK_AGENT_ARGS")
                .map(|raw| parse_agent_args(&raw))
                .unwrap_or_default(),
            remote: RemoteConfig::from_env(),
        }
    }

    pub fn shell_profile(&self) -> ShellProfile {
        let mut probe = PlatformProbe::from_host();
        if let Some(shell) = &self.shell {
            match probe.os {
                HostOs::Posix => probe.shell_env = Some(shell.clone()),
                HostOs::Windows => {
                    probe.powershell_on_path = false;
                    probe.comspec = Some(shell.clone());
                }
            }
        }
        ShellProfile::resolve(&probe)
    }

    pub fn agent_profile(&self) -> AgentProfile {
        AgentProfile::new(&self.agent, self.agent_args.clone())
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::new(self.shell_profile())
            .with_agent(self.agent_profile())
            .with_default_size(self.default_size)
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig::new(self.shell_profile())
            .with_default_size(self.default_size)
            .with_rotation(self.remote.rotation)
    }

    /// Resolved settings as shown by `panedeck env`. Never includes the token.
    pub fn describe(&self) -> Value {
        let shell = self.shell_profile();
        json!({
            "cols": self.default_size.cols,
            "rows": self.default_size.rows,
            "shell": shell.program,
            "shellArgs": shell.args,
            "agent": self.agent,
            "agentArgs": self.agent_args,
            "remote": {
                "enabled": self.remote.enabled,
                "listen": self.remote.listen,
                "allowRemote": self.remote.allow_remote,
                "maxConnections": self.remote.max_connections,
                "tokenRotation": self.remote.rotation.to_string(),
                "stateFile": self.remote.state_path.display().to_string(),
            },
        })
    }
}

pub(crate) fn valid_size_or_default(size: TerminalSize) -> TerminalSize {
    if size.is_valid() {
        size
    } else {
        warn!(%size, "Invalid default terminal size; using 80x24");
        TerminalSize::default()
    }
}

/// Splits agent arguments with shell quoting rules.
pub fn parse_agent_args(raw: &str) -> Vec<String> {
    match shell_words::split(raw) {
        Ok(args) => args,
        Err(err) => {
            warn!(value = %raw, error = %err, "Invalid PANEDECK_AGENT_ARGS; ignoring");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    struct EnvGuard {
        key: &'static str,
        prev: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &'static str, value: &str) -> Self {
            let prev = std::env::var(key).ok();
            // SAFETY: test-only env mutation.
            unsafe {
                std::env::set_var(key, value);
            }
            Self { key, prev }
        }

        fn remove(key: &'static str) -> Self {
            let prev = std::env::var(key).ok();
            // SAFETY: test-only env mutation.
            unsafe {
                std::env::remove_var(key);
            }
            Self { key, prev }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            if let Some(prev) = self.prev.take() {
                // SAFETY: test-only env restoration.
                unsafe {
                    std::env::set_var(self.key, prev);
                }
            } else {
                // SAFETY: test-only env cleanup.
                unsafe {
                    std::env::remove_var(self.key);
                }
            }
        }
    }

    #[test]
    fn host_config_reads_env() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _cols = EnvGuard::set("PANEDECK_COLS", "132");
        let _rows = EnvGuard::set("PANEDECK_ROWS", "43");
        let _agent = EnvGuard::set("PANEDECK_AGENT", "aider");
        let _args = EnvGuard::set("PANEDECK_AGENT_ARGS", "--model 'big one' --yes");
        let _shell = EnvGuard::set("PANEDECK_SHELL", "/usr/bin/fish");

        let config = HostConfig::from_env();

        assert_eq!(config.default_size, TerminalSize::new(132, 43));
        assert_eq!(config.agent, "aider");
        assert_eq!(config.agent_args, vec!["--model", "big one", "--yes"]);
        assert_eq!(config.shell.as_deref(), Some("/usr/bin/fish"));
    }

    #[test]
    fn host_config_falls_back_on_bad_values() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _cols = EnvGuard::set("PANEDECK_COLS", "0");
        let _rows = EnvGuard::set("PANEDECK_ROWS", "wide");
        let _agent = EnvGuard::remove("PANEDECK_AGENT");
        let _args = EnvGuard::set("PANEDECK_AGENT_ARGS", "'unterminated");

        let config = HostConfig::from_env();

        assert_eq!(config.default_size, TerminalSize::default());
        assert_eq!(config.agent, DEFAULT_AGENT_PROGRAM);
        assert!(config.agent_args.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn explicit_shell_is_used_as_login_shell() {
        let config = HostConfig {
            shell: Some("/bin/zsh".to_string()),
            ..HostConfig::default()
        };
        let shell = config.shell_profile();
        assert_eq!(shell.program, "/bin/zsh");
        assert_eq!(shell.args, vec!["-l"]);
    }

    #[test]
    fn describe_omits_token() {
        let description = HostConfig::default().describe();
        assert_eq!(description["cols"], 80);
        assert_eq!(description["remote"]["enabled"], false);
        assert!(description["remote"].get("token").is_none());
    }
}
