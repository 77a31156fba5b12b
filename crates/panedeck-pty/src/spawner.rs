use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use bytes::Bytes;
use crossbeam_channel::Receiver;
use serde::Deserialize;
use serde::Serialize;

use crate::PtyError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalSize {
    pub cols: u16,
    pub rows: u16,
}

impl TerminalSize {
    pub const fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }

    pub fn is_valid(&self) -> bool {
        self.cols > 0 && self.rows > 0
    }
}

impl Default for TerminalSize {
    fn default() -> Self {
        Self { cols: 80, rows: 24 }
    }
}

impl fmt::Display for TerminalSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.cols, self.rows)
    }
}

/// Everything needed to start one process attached to a fresh PTY.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: HashMap<String, String>,
    pub size: TerminalSize,
}

impl SpawnSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: HashMap::new(),
            size: TerminalSize::default(),
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_cwd(mut self, cwd: Option<PathBuf>) -> Self {
        self.cwd = cwd;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_size(mut self, size: TerminalSize) -> Self {
        self.size = size;
        self
    }
}

/// Output of a running PTY, in the order the process produced it.
///
/// `Exit` is always the final event for a process. An exit code of `-1`
/// means the status could not be collected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PtyEvent {
    Data(Bytes),
    Exit { code: i32 },
}

pub const UNKNOWN_EXIT_CODE: i32 = -1;

/// The write/resize/kill half of a PTY handle.
pub trait PtyControl: Send {
    fn write(&mut self, data: &[u8]) -> Result<(), PtyError>;

    fn resize(&mut self, size: TerminalSize) -> Result<(), PtyError>;

    /// Terminates the process. Killing an already-exited process is not an error.
    fn kill(&mut self) -> Result<(), PtyError>;
}

pub struct SpawnedPty {
    pub pid: u32,
    pub control: Box<dyn PtyControl>,
    pub events: Receiver<PtyEvent>,
}

impl fmt::Debug for SpawnedPty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpawnedPty")
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}

pub trait PtySpawner: Send + Sync {
    fn spawn(&self, spec: &SpawnSpec) -> Result<SpawnedPty, PtyError>;
}

impl<T: PtySpawner + ?Sized> PtySpawner for std::sync::Arc<T> {
    fn spawn(&self, spec: &SpawnSpec) -> Result<SpawnedPty, PtyError> {
        (**self).spawn(spec)
    }
}
