use std::fmt;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::DateTime;
use chrono::Utc;
use panedeck_common::TerminalId;
use panedeck_common::mutex_lock_or_recover;
use panedeck_pty::PtyControl;
use panedeck_pty::PtyError;
use panedeck_pty::TerminalSize;
use serde::Serialize;

/// Identity of one spawned process behind a terminal id.
///
/// The generation is assigned by the owner at reservation time and never
/// repeats, so a recycled pid cannot be mistaken for the current process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessStamp {
    pub pid: u32,
    pub generation: u64,
}

impl ProcessStamp {
    pub const fn new(pid: u32, generation: u64) -> Self {
        Self { pid, generation }
    }
}

impl fmt::Display for ProcessStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pid {} gen {}", self.pid, self.generation)
    }
}

pub struct TerminalEntry {
    id: TerminalId,
    stamp: ProcessStamp,
    program: String,
    cwd: Option<PathBuf>,
    created_at: DateTime<Utc>,
    size: Mutex<TerminalSize>,
    control: Mutex<Box<dyn PtyControl>>,
}

impl fmt::Debug for TerminalEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TerminalEntry")
            .field("id", &self.id)
            .field("stamp", &self.stamp)
            .field("program", &self.program)
            .finish_non_exhaustive()
    }
}

impl TerminalEntry {
    pub fn new(
        id: TerminalId,
        stamp: ProcessStamp,
        program: impl Into<String>,
        cwd: Option<PathBuf>,
        size: TerminalSize,
        control: Box<dyn PtyControl>,
    ) -> Self {
        Self {
            id,
            stamp,
            program: program.into(),
            cwd,
            created_at: Utc::now(),
            size: Mutex::new(size),
            control: Mutex::new(control),
        }
    }

    pub fn id(&self) -> &TerminalId {
        &self.id
    }

    pub fn stamp(&self) -> ProcessStamp {
        self.stamp
    }

    pub fn pid(&self) -> u32 {
        self.stamp.pid
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn size(&self) -> TerminalSize {
        *mutex_lock_or_recover(&self.size)
    }

    pub fn write(&self, data: &[u8]) -> Result<(), PtyError> {
        mutex_lock_or_recover(&self.control).write(data)
    }

    pub fn resize(&self, size: TerminalSize) -> Result<(), PtyError> {
        mutex_lock_or_recover(&self.control).resize(size)?;
        *mutex_lock_or_recover(&self.size) = size;
        Ok(())
    }

    pub fn kill(&self) -> Result<(), PtyError> {
        mutex_lock_or_recover(&self.control).kill()
    }

    pub fn info(&self) -> TerminalInfo {
        let size = self.size();
        TerminalInfo {
            id: self.id.clone(),
            pid: self.stamp.pid,
            program: self.program.clone(),
            cwd: self.cwd.as_ref().map(|p| p.display().to_string()),
            created_at: self.created_at.to_rfc3339(),
            cols: size.cols,
            rows: size.rows,
        }
    }
}

/// Snapshot of a live terminal for listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalInfo {
    pub id: TerminalId,
    pub pid: u32,
    pub program: String,
    pub cwd: Option<String>,
    pub created_at: String,
    pub cols: u16,
    pub rows: u16,
}
