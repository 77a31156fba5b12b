//! Platform shell and agent program resolution.
//!
//! Resolution happens once at startup; the result is injected into the
//! session manager so nothing downstream branches on the platform.

use std::path::Path;
use std::path::PathBuf;

use crate::SpawnSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostOs {
    Posix,
    Windows,
}

impl HostOs {
    pub fn current() -> Self {
        if cfg!(windows) {
            HostOs::Windows
        } else {
            HostOs::Posix
        }
    }
}

/// Facts about the host that shell selection depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformProbe {
    pub os: HostOs,
    pub shell_env: Option<String>,
    pub comspec: Option<String>,
    pub powershell_on_path: bool,
    pub existing: Vec<PathBuf>,
}

impl PlatformProbe {
    pub fn from_host() -> Self {
        let os = HostOs::current();
        let existing = POSIX_FALLBACKS
            .iter()
            .map(PathBuf::from)
            .filter(|p| p.exists())
            .collect();
        Self {
            os,
            shell_env: std::env::var("SHELL").ok().filter(|s| !s.trim().is_empty()),
            comspec: std::env::var("COMSPEC").ok().filter(|s| !s.trim().is_empty()),
            powershell_on_path: os == HostOs::Windows && on_path("powershell.exe"),
            existing,
        }
    }

    fn exists(&self, path: &str) -> bool {
        self.existing.iter().any(|p| p == Path::new(path))
    }
}

const POSIX_FALLBACKS: [&str; 2] = ["/bin/bash", "/bin/sh"];

fn on_path(program: &str) -> bool {
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(program).is_file()))
        .unwrap_or(false)
}

/// The interactive shell used for plain terminals and agent fallbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellProfile {
    pub program: String,
    pub args: Vec<String>,
}

impl ShellProfile {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn detect() -> Self {
        Self::resolve(&PlatformProbe::from_host())
    }

    /// POSIX prefers `$SHELL` as a login shell, then `/bin/bash`, then `/bin/sh`.
    /// Windows prefers PowerShell when it is on `PATH`, then `%COMSPEC%`.
    pub fn resolve(probe: &PlatformProbe) -> Self {
        match probe.os {
            HostOs::Posix => {
                let program = probe
                    .shell_env
                    .clone()
                    .or_else(|| {
                        POSIX_FALLBACKS
                            .iter()
                            .find(|p| probe.exists(p))
                            .map(|p| (*p).to_string())
                    })
                    .unwrap_or_else(|| "/bin/sh".to_string());
                Self::new(program, vec!["-l".to_string()])
            }
            HostOs::Windows => {
                if probe.powershell_on_path {
                    Self::new("powershell.exe", vec!["-NoLogo".to_string()])
                } else {
                    let program = probe
                        .comspec
                        .clone()
                        .unwrap_or_else(|| "cmd.exe".to_string());
                    Self::new(program, Vec::new())
                }
            }
        }
    }

    pub fn spawn_spec(&self) -> SpawnSpec {
        SpawnSpec::new(&self.program).with_args(self.args.iter().cloned())
    }
}

/// The AI coding CLI launched by `runAgent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentProfile {
    pub program: String,
    pub args: Vec<String>,
}

pub const DEFAULT_AGENT_PROGRAM: &str = "claude";

impl Default for AgentProfile {
    fn default() -> Self {
        Self {
            program: DEFAULT_AGENT_PROGRAM.to_string(),
            args: Vec::new(),
        }
    }
}

impl AgentProfile {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn spawn_spec(&self) -> SpawnSpec {
        SpawnSpec::new(&self.program).with_args(self.args.iter().cloned())
    }
}
