use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use panedeck_common::TerminalId;
use panedeck_pty::AgentProfile;
use panedeck_pty::PtyError;
use panedeck_pty::PtySpawner;
use panedeck_pty::ShellProfile;
use panedeck_pty::SpawnSpec;
use panedeck_pty::TerminalSize;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::OutputTarget;
use crate::ProcessStamp;
use crate::SessionError;
use crate::TerminalEntry;
use crate::TerminalEvent;
use crate::TerminalEventSink;
use crate::TerminalInfo;
use crate::TerminalRegistry;
use crate::Ticket;
use crate::registry::Removed;
use crate::spawn_output_pump;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub shell: ShellProfile,
    pub agent: AgentProfile,
    pub default_size: TerminalSize,
    pub env: HashMap<String, String>,
}

impl SessionConfig {
    pub fn new(shell: ShellProfile) -> Self {
        Self {
            shell,
            agent: AgentProfile::default(),
            default_size: TerminalSize::default(),
            env: HashMap::new(),
        }
    }

    pub fn detect() -> Self {
        Self::new(ShellProfile::detect())
    }

    pub fn with_agent(mut self, agent: AgentProfile) -> Self {
        self.agent = agent;
        self
    }

    pub fn with_default_size(mut self, size: TerminalSize) -> Self {
        self.default_size = size;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created { pid: u32 },
    /// The id was already pending or live; nothing was spawned.
    AlreadyRunning,
    /// The agent could not start; a plain shell runs in its place.
    FellBack { pid: u32, reason: String },
    /// The terminal was killed before its process finished starting.
    Cancelled,
}

impl CreateOutcome {
    pub fn pid(&self) -> Option<u32> {
        match self {
            CreateOutcome::Created { pid } | CreateOutcome::FellBack { pid, .. } => Some(*pid),
            CreateOutcome::AlreadyRunning | CreateOutcome::Cancelled => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillOutcome {
    Killed { pid: u32 },
    CancelledPending,
    AlreadyAbsent,
}

enum Launch {
    Installed(ProcessStamp),
    Cancelled,
}

/// Owns the lifecycle of every local terminal.
pub struct SessionManager {
    registry: Arc<TerminalRegistry>,
    spawner: Arc<dyn PtySpawner>,
    sink: Arc<dyn TerminalEventSink>,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(
        spawner: Arc<dyn PtySpawner>,
        sink: Arc<dyn TerminalEventSink>,
        config: SessionConfig,
    ) -> Self {
        Self {
            registry: Arc::new(TerminalRegistry::new()),
            spawner,
            sink,
            config,
        }
    }

    pub fn registry(&self) -> &TerminalRegistry {
        &self.registry
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Starts a plain shell for `id`. A pending or live id is left alone.
    pub fn create(
        &self,
        id: &TerminalId,
        cwd: Option<PathBuf>,
    ) -> Result<CreateOutcome, SessionError> {
        let Some(ticket) = self.registry.reserve(id) else {
            debug!(%id, "Terminal already pending or live");
            return Ok(CreateOutcome::AlreadyRunning);
        };

        let spec = self.spec_for(self.config.shell.spawn_spec(), cwd);
        match self.launch(id, ticket, &spec, None) {
            Ok(Launch::Installed(stamp)) => Ok(CreateOutcome::Created { pid: stamp.pid }),
            Ok(Launch::Cancelled) => Ok(CreateOutcome::Cancelled),
            Err(source) => {
                self.registry.release(id, ticket);
                warn!(%id, error = %source, "Failed to start shell");
                Err(SessionError::Spawn {
                    id: id.clone(),
                    source,
                })
            }
        }
    }

    /// Starts the agent CLI for `id`, falling back to a plain shell.
    ///
    /// When the agent cannot be spawned, a shell is started in a fresh PTY
    /// and a banner naming the failure is published as its first output.
    pub fn run_agent(
        &self,
        id: &TerminalId,
        cwd: Option<PathBuf>,
    ) -> Result<CreateOutcome, SessionError> {
        let Some(ticket) = self.registry.reserve(id) else {
            debug!(%id, "Terminal already pending or live");
            return Ok(CreateOutcome::AlreadyRunning);
        };

        let agent_spec = self.spec_for(self.config.agent.spawn_spec(), cwd.clone());
        let agent_error = match self.launch(id, ticket, &agent_spec, None) {
            Ok(Launch::Installed(stamp)) => return Ok(CreateOutcome::Created { pid: stamp.pid }),
            Ok(Launch::Cancelled) => return Ok(CreateOutcome::Cancelled),
            Err(err) if err.is_spawn_failure() => err,
            Err(source) => {
                self.registry.release(id, ticket);
                return Err(SessionError::Spawn {
                    id: id.clone(),
                    source,
                });
            }
        };

        let reason = agent_error.to_string();
        warn!(%id, program = %agent_spec.program, error = %reason, "Agent failed to start; falling back to shell");

        let banner = fallback_banner(&agent_spec.program, &reason);
        let shell_spec = self.spec_for(self.config.shell.spawn_spec(), cwd);
        match self.launch(id, ticket, &shell_spec, Some(banner)) {
            Ok(Launch::Installed(stamp)) => Ok(CreateOutcome::FellBack {
                pid: stamp.pid,
                reason,
            }),
            Ok(Launch::Cancelled) => Ok(CreateOutcome::Cancelled),
            Err(source) => {
                self.registry.release(id, ticket);
                error!(%id, error = %source, "Fallback shell failed to start");
                Err(SessionError::Spawn {
                    id: id.clone(),
                    source,
                })
            }
        }
    }

    /// Forwards input. Never buffers for a terminal that is not live.
    pub fn write(&self, id: &TerminalId, data: &[u8]) -> Result<(), SessionError> {
        let entry = self.live_entry(id)?;
        entry.write(data).map_err(|source| SessionError::Io {
            id: id.clone(),
            source,
        })
    }

    pub fn resize(&self, id: &TerminalId, size: TerminalSize) -> Result<(), SessionError> {
        if !size.is_valid() {
            return Err(SessionError::InvalidSize {
                cols: size.cols,
                rows: size.rows,
            });
        }
        let entry = self.live_entry(id)?;
        entry.resize(size).map_err(|source| SessionError::Io {
            id: id.clone(),
            source,
        })
    }

    /// Removes `id` from any state. A process still starting is stopped as
    /// soon as its spawn completes.
    pub fn kill(&self, id: &TerminalId) -> KillOutcome {
        match self.registry.remove(id) {
            Some(Removed::Live(entry)) => {
                if let Err(err) = entry.kill() {
                    warn!(%id, pid = entry.pid(), error = %err, "Failed to kill terminal process");
                }
                info!(%id, pid = entry.pid(), "Terminal killed");
                KillOutcome::Killed { pid: entry.pid() }
            }
            Some(Removed::Pending) => {
                info!(%id, "Terminal killed while starting");
                KillOutcome::CancelledPending
            }
            None => KillOutcome::AlreadyAbsent,
        }
    }

    pub fn list(&self) -> Vec<TerminalInfo> {
        self.registry.list().iter().map(|e| e.info()).collect()
    }

    pub fn get_info(&self, id: &TerminalId) -> Option<TerminalInfo> {
        self.registry.get(id).map(|e| e.info())
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Kills every terminal. Returns how many live processes were stopped.
    pub fn shutdown(&self) -> usize {
        let entries = self.registry.drain();
        for entry in &entries {
            if let Err(err) = entry.kill() {
                warn!(id = %entry.id(), error = %err, "Failed to kill terminal during shutdown");
            }
        }
        if !entries.is_empty() {
            info!(count = entries.len(), "Stopped all terminals");
        }
        entries.len()
    }

    fn live_entry(&self, id: &TerminalId) -> Result<Arc<TerminalEntry>, SessionError> {
        self.registry
            .get(id)
            .ok_or_else(|| SessionError::NotFound(id.clone()))
    }

    fn spec_for(&self, base: SpawnSpec, cwd: Option<PathBuf>) -> SpawnSpec {
        let mut spec = base.with_cwd(cwd).with_size(self.config.default_size);
        for (key, value) in &self.config.env {
            spec.env.insert(key.clone(), value.clone());
        }
        spec
    }

    fn launch(
        &self,
        id: &TerminalId,
        ticket: Ticket,
        spec: &SpawnSpec,
        banner: Option<String>,
    ) -> Result<Launch, PtyError> {
        let spawned = self.spawner.spawn(spec)?;
        let stamp = ProcessStamp::new(spawned.pid, ticket.generation());
        let entry = Arc::new(TerminalEntry::new(
            id.clone(),
            stamp,
            &spec.program,
            spec.cwd.clone(),
            spec.size,
            spawned.control,
        ));

        if !self.registry.install(id, ticket, Arc::clone(&entry)) {
            info!(%id, pid = stamp.pid, "Terminal was killed while starting; stopping new process");
            if let Err(err) = entry.kill() {
                warn!(%id, pid = stamp.pid, error = %err, "Failed to kill cancelled process");
            }
            return Ok(Launch::Cancelled);
        }

        let target = Arc::new(LocalTarget {
            id: id.clone(),
            registry: Arc::clone(&self.registry),
            sink: Arc::clone(&self.sink),
        });
        let banner_shown = banner.map(|banner| target.accept_data(stamp, banner));
        if banner_shown == Some(false) {
            debug!(%id, pid = stamp.pid, "Terminal replaced before its banner was shown");
        }
        if let Err(err) = spawn_output_pump(format!("pty-pump-{id}"), stamp, spawned.events, target)
        {
            error!(%id, error = %err, "Failed to start output pump");
            if let Some(entry) = self.registry.remove_if_current(id, stamp) {
                let _ = entry.kill();
            }
            return Err(PtyError::Open(format!("failed to start output pump: {err}")));
        }

        info!(%id, pid = stamp.pid, program = %spec.program, "Terminal started");
        Ok(Launch::Installed(stamp))
    }
}

struct LocalTarget {
    id: TerminalId,
    registry: Arc<TerminalRegistry>,
    sink: Arc<dyn TerminalEventSink>,
}

impl OutputTarget for LocalTarget {
    fn accept_data(&self, stamp: ProcessStamp, data: String) -> bool {
        self.registry
            .if_current(&self.id, stamp, || {
                self.sink.deliver(TerminalEvent::Data {
                    id: self.id.clone(),
                    data,
                });
            })
            .is_some()
    }

    fn accept_exit(&self, stamp: ProcessStamp, exit_code: i32) -> bool {
        if self.registry.remove_if_current(&self.id, stamp).is_none() {
            return false;
        }
        info!(id = %self.id, pid = stamp.pid, exit_code, "Terminal exited");
        self.sink.deliver(TerminalEvent::Exit {
            id: self.id.clone(),
            exit_code,
        });
        true
    }
}

fn fallback_banner(program: &str, reason: &str) -> String {
    format!(
        "\x1b[33m[panedeck] Could not start {program}: {reason}\x1b[0m\r\n\
         [panedeck] Opened a plain shell instead.\r\n\r\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockSpawner;
    use crate::test_support::RecordingSink;

    fn local_target(
        manager: &SessionManager,
        sink: &Arc<RecordingSink>,
        id: &TerminalId,
    ) -> LocalTarget {
        LocalTarget {
            id: id.clone(),
            registry: Arc::clone(&manager.registry),
            sink: Arc::clone(sink) as Arc<dyn TerminalEventSink>,
        }
    }

    #[test]
    fn test_fallback_banner_names_program_and_reason() {
        let banner = fallback_banner("claude", "command not found");
        assert!(banner.contains("claude"));
        assert!(banner.contains("command not found"));
        assert!(banner.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_create_outcome_pid() {
        assert_eq!(CreateOutcome::Created { pid: 5 }.pid(), Some(5));
        assert_eq!(
            CreateOutcome::FellBack {
                pid: 6,
                reason: "x".into()
            }
            .pid(),
            Some(6)
        );
        assert_eq!(CreateOutcome::AlreadyRunning.pid(), None);
    }

    #[test]
    fn test_config_builders() {
        let config = SessionConfig::new(ShellProfile::new("/bin/sh", vec![]))
            .with_agent(AgentProfile::new("codex", vec![]))
            .with_default_size(TerminalSize::new(100, 30))
            .with_env("COLORTERM", "truecolor");
        assert_eq!(config.agent.program, "codex");
        assert_eq!(config.default_size, TerminalSize::new(100, 30));
        assert_eq!(config.env.get("COLORTERM").map(String::as_str), Some("truecolor"));
    }

    #[test]
    fn test_banner_for_replaced_process_is_dropped() {
        let sink = Arc::new(RecordingSink::new());
        let manager = SessionManager::new(
            Arc::new(MockSpawner::new()),
            Arc::clone(&sink) as Arc<dyn TerminalEventSink>,
            SessionConfig::new(ShellProfile::new("/bin/sh", vec![])),
        );
        let t1 = TerminalId::new("t1");
        manager.create(&t1, None).unwrap();
        let first = manager.registry().get(&t1).unwrap().stamp();
        manager.kill(&t1);
        manager.create(&t1, None).unwrap();
        let second = manager.registry().get(&t1).unwrap().stamp();

        let target = local_target(&manager, &sink, &t1);
        assert!(!target.accept_data(first, fallback_banner("claude", "gone")));
        assert_eq!(sink.output_of(&t1), "");

        assert!(target.accept_data(second, "ready".to_string()));
        assert_eq!(sink.output_of(&t1), "ready");
    }
}
