use std::io;
use std::io::Read;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use bytes::Bytes;
use crossbeam_channel as channel;
use portable_pty::Child;
use portable_pty::ChildKiller;
use portable_pty::CommandBuilder;
use portable_pty::MasterPty;
use portable_pty::PtySize;
use portable_pty::native_pty_system;
use tracing::debug;
use tracing::warn;

use crate::PtyControl;
use crate::PtyError;
use crate::PtyEvent;
use crate::PtySpawner;
use crate::SpawnErrorKind;
use crate::SpawnSpec;
use crate::SpawnedPty;
use crate::TerminalSize;
use crate::spawner::UNKNOWN_EXIT_CODE;

const PTY_READ_CHANNEL_CAPACITY: usize = 256;
const PTY_READ_BUFFER_SIZE: usize = 8192;

/// Spawns processes on real pseudo-terminals through portable-pty.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativePtySpawner;

impl NativePtySpawner {
    pub fn new() -> Self {
        Self
    }
}

impl PtySpawner for NativePtySpawner {
    fn spawn(&self, spec: &SpawnSpec) -> Result<SpawnedPty, PtyError> {
        let pty_system = native_pty_system();
        let size = pty_size(spec.size);

        let pair = pty_system
            .openpty(size)
            .map_err(|e| PtyError::Open(e.to_string()))?;

        let mut cmd = CommandBuilder::new(&spec.program);
        cmd.args(&spec.args);
        if let Some(dir) = &spec.cwd {
            cmd.cwd(dir);
        }
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }
        cmd.env("TERM", "xterm-256color");

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| PtyError::Open(e.to_string()))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| PtyError::Open(e.to_string()))?;

        let child = pair.slave.spawn_command(cmd).map_err(|e| {
            let message = format!("{e:#}");
            let io_kind = e.downcast_ref::<io::Error>().map(io::Error::kind);
            PtyError::spawn(message.clone(), classify_spawn_failure(io_kind, &message))
        })?;
        // The slave side must close here so the reader sees EOF once the child exits.
        drop(pair.slave);

        let pid = child.process_id().unwrap_or(0);
        let mut killer = child.clone_killer();

        let exited = Arc::new(AtomicBool::new(false));
        let events = match spawn_reader(reader, child, Arc::clone(&exited), pid) {
            Ok(events) => events,
            Err(e) => {
                let _ = killer.kill();
                return Err(e);
            }
        };

        debug!(pid, program = %spec.program, size = %spec.size, "PTY spawned");

        Ok(SpawnedPty {
            pid,
            control: Box::new(NativePtyControl {
                master: pair.master,
                writer,
                killer,
                exited,
            }),
            events,
        })
    }
}

struct NativePtyControl {
    master: Box<dyn MasterPty + Send>,
    writer: Box<dyn Write + Send>,
    killer: Box<dyn ChildKiller + Send + Sync>,
    exited: Arc<AtomicBool>,
}

impl Drop for NativePtyControl {
    fn drop(&mut self) {
        if !self.exited.load(Ordering::Acquire) {
            let _ = self.kill();
        }
    }
}

impl PtyControl for NativePtyControl {
    fn write(&mut self, data: &[u8]) -> Result<(), PtyError> {
        if data.is_empty() {
            return Ok(());
        }

        let mut offset = 0;
        while offset < data.len() {
            match self.writer.write(&data[offset..]) {
                Ok(0) => {
                    return Err(PtyError::Write(
                        "write returned 0 bytes, PTY closed".to_string(),
                    ));
                }
                Ok(n) => offset += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => self.wait_writable()?,
                Err(e) => return Err(PtyError::Write(e.to_string())),
            }
        }
        self.writer
            .flush()
            .map_err(|e| PtyError::Write(e.to_string()))
    }

    fn resize(&mut self, size: TerminalSize) -> Result<(), PtyError> {
        self.master
            .resize(pty_size(size))
            .map_err(|e| PtyError::Resize(e.to_string()))
    }

    fn kill(&mut self) -> Result<(), PtyError> {
        // Once the reader has reaped the child its pid may belong to someone else.
        if self.exited.load(Ordering::Acquire) {
            return Ok(());
        }
        match self.killer.kill() {
            Ok(()) => Ok(()),
            Err(e) if e.raw_os_error() == Some(ESRCH) => Ok(()),
            Err(e) => Err(PtyError::Kill(e.to_string())),
        }
    }
}

#[cfg(unix)]
const ESRCH: i32 = libc::ESRCH;
#[cfg(not(unix))]
const ESRCH: i32 = 3;

impl NativePtyControl {
    fn wait_writable(&self) -> Result<(), PtyError> {
        #[cfg(unix)]
        {
            use libc::{POLLERR, POLLHUP, POLLOUT, poll, pollfd};

            let Some(fd) = self.master.as_raw_fd() else {
                return Ok(());
            };
            let mut fds = [pollfd {
                fd,
                events: POLLOUT,
                revents: 0,
            }];
            loop {
                // SAFETY: `fds` is a valid one-element array for the duration of the call.
                let rc = unsafe { poll(fds.as_mut_ptr(), 1, -1) };
                if rc < 0 {
                    let err = io::Error::last_os_error();
                    if err.kind() == io::ErrorKind::Interrupted {
                        continue;
                    }
                    return Err(PtyError::Write(err.to_string()));
                }
                let events = fds[0].revents;
                if events & (POLLHUP | POLLERR) != 0 {
                    return Err(PtyError::Write("PTY closed".to_string()));
                }
                if events & POLLOUT != 0 {
                    return Ok(());
                }
            }
        }
        #[cfg(not(unix))]
        {
            Ok(())
        }
    }
}

/// portable-pty resolves the program itself and reports resolution
/// failures as plain messages, so only exec errors carry an `io::ErrorKind`.
fn classify_spawn_failure(io_kind: Option<io::ErrorKind>, message: &str) -> SpawnErrorKind {
    match io_kind {
        Some(io::ErrorKind::NotFound) => return SpawnErrorKind::NotFound,
        Some(io::ErrorKind::PermissionDenied) => return SpawnErrorKind::PermissionDenied,
        _ => {}
    }
    if message.contains("not executable") {
        SpawnErrorKind::PermissionDenied
    } else if message.contains("No viable candidates found in PATH")
        || message.contains("does not exist")
        || message.contains("doesn't exist")
        || message.contains("Unable to resolve the PATH")
    {
        SpawnErrorKind::NotFound
    } else {
        SpawnErrorKind::Other
    }
}

fn pty_size(size: TerminalSize) -> PtySize {
    PtySize {
        rows: size.rows,
        cols: size.cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

fn spawn_reader(
    mut reader: Box<dyn Read + Send>,
    mut child: Box<dyn Child + Send + Sync>,
    exited: Arc<AtomicBool>,
    pid: u32,
) -> Result<channel::Receiver<PtyEvent>, PtyError> {
    let (tx, rx) = channel::bounded(PTY_READ_CHANNEL_CAPACITY);
    let span = tracing::debug_span!("pty_reader", pid);
    let builder = std::thread::Builder::new().name(format!("pty-reader-{pid}"));
    builder
        .spawn(move || {
            let _guard = span.enter();
            let mut buf = [0u8; PTY_READ_BUFFER_SIZE];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => {
                        debug!("PTY reader EOF");
                        break;
                    }
                    Ok(n) => {
                        if tx.send(PtyEvent::Data(Bytes::copy_from_slice(&buf[..n]))).is_err() {
                            debug!("PTY event receiver dropped");
                            break;
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    // Linux reports EIO on the master once the slave side is gone.
                    Err(e) => {
                        debug!(error = %e, "PTY reader closed");
                        break;
                    }
                }
            }

            let code = match child.wait() {
                Ok(status) => i32::try_from(status.exit_code()).unwrap_or(UNKNOWN_EXIT_CODE),
                Err(e) => {
                    warn!(error = %e, "Failed to collect PTY exit status");
                    UNKNOWN_EXIT_CODE
                }
            };
            exited.store(true, Ordering::Release);
            debug!(code, "PTY process exited");
            let _ = tx.send(PtyEvent::Exit { code });
        })
        .map_err(|e| PtyError::Open(format!("failed to start PTY reader: {e}")))?;
    Ok(rx)
}
