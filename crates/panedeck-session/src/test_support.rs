//! Scripted PTY spawner and event recorder for tests.
//!
//! Processes spawned by [`MockSpawner`] never run anything; tests drive
//! their output and exit through [`MockProcess`].

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use bytes::Bytes;
use crossbeam_channel as channel;
use panedeck_common::TerminalId;
use panedeck_common::mutex_lock_or_recover;
use panedeck_pty::PtyControl;
use panedeck_pty::PtyError;
use panedeck_pty::PtyEvent;
use panedeck_pty::PtySpawner;
use panedeck_pty::SpawnErrorKind;
use panedeck_pty::SpawnSpec;
use panedeck_pty::SpawnedPty;
use panedeck_pty::TerminalSize;

use crate::TerminalEvent;
use crate::TerminalEventSink;

const POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Default)]
struct ControlLog {
    written: Vec<u8>,
    resizes: Vec<TerminalSize>,
    kills: usize,
}

/// Handle to one process handed out by [`MockSpawner`].
#[derive(Clone)]
pub struct MockProcess {
    pub pid: u32,
    pub spec: SpawnSpec,
    events: channel::Sender<PtyEvent>,
    log: Arc<Mutex<ControlLog>>,
}

impl MockProcess {
    pub fn emit(&self, data: &str) {
        self.emit_bytes(data.as_bytes());
    }

    pub fn emit_bytes(&self, data: &[u8]) {
        let _ = self
            .events
            .send(PtyEvent::Data(Bytes::copy_from_slice(data)));
    }

    pub fn exit(&self, code: i32) {
        let _ = self.events.send(PtyEvent::Exit { code });
    }

    pub fn written(&self) -> String {
        String::from_utf8_lossy(&mutex_lock_or_recover(&self.log).written).into_owned()
    }

    pub fn resizes(&self) -> Vec<TerminalSize> {
        mutex_lock_or_recover(&self.log).resizes.clone()
    }

    pub fn was_killed(&self) -> bool {
        mutex_lock_or_recover(&self.log).kills > 0
    }

    /// Waits until whoever consumed this process's events has gone away.
    pub fn wait_until_released(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            // Empty chunks decode to nothing, so probing is invisible to consumers.
            if self.events.send(PtyEvent::Data(Bytes::new())).is_err() {
                return true;
            }
            thread::sleep(POLL_INTERVAL);
        }
        false
    }
}

struct MockControl {
    log: Arc<Mutex<ControlLog>>,
    events: channel::Sender<PtyEvent>,
    exit_on_kill: Option<i32>,
}

impl PtyControl for MockControl {
    fn write(&mut self, data: &[u8]) -> Result<(), PtyError> {
        let mut log = mutex_lock_or_recover(&self.log);
        if log.kills > 0 {
            return Err(PtyError::Write("PTY closed".to_string()));
        }
        log.written.extend_from_slice(data);
        Ok(())
    }

    fn resize(&mut self, size: TerminalSize) -> Result<(), PtyError> {
        mutex_lock_or_recover(&self.log).resizes.push(size);
        Ok(())
    }

    fn kill(&mut self) -> Result<(), PtyError> {
        let first = {
            let mut log = mutex_lock_or_recover(&self.log);
            log.kills += 1;
            log.kills == 1
        };
        if let (true, Some(code)) = (first, self.exit_on_kill) {
            let _ = self.events.send(PtyEvent::Exit { code });
        }
        Ok(())
    }
}

struct MockState {
    next_pid: u32,
    calls: usize,
    in_flight: usize,
    held: bool,
    exit_on_kill: Option<i32>,
    failures: HashMap<String, SpawnErrorKind>,
    processes: Vec<MockProcess>,
}

/// A [`PtySpawner`] that records calls and hands out scripted processes.
pub struct MockSpawner {
    state: Mutex<MockState>,
    changed: Condvar,
}

impl Default for MockSpawner {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSpawner {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                next_pid: 1000,
                calls: 0,
                in_flight: 0,
                held: false,
                exit_on_kill: None,
                failures: HashMap::new(),
                processes: Vec::new(),
            }),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        mutex_lock_or_recover(&self.state)
    }

    /// Makes every spawn of `program` fail with `kind`.
    pub fn fail_program(&self, program: &str, kind: SpawnErrorKind) {
        self.lock().failures.insert(program.to_string(), kind);
    }

    /// Killed processes report this exit code, like a real PTY would.
    pub fn exit_on_kill(&self, code: i32) {
        self.lock().exit_on_kill = Some(code);
    }

    /// Blocks subsequent spawns until [`MockSpawner::release`].
    pub fn hold(&self) {
        self.lock().held = true;
    }

    pub fn release(&self) {
        self.lock().held = false;
        self.changed.notify_all();
    }

    pub fn wait_for_in_flight(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        while state.in_flight < count {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return false;
            };
            state = match self.changed.wait_timeout(state, remaining) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }

    /// Number of spawn attempts, successful or not.
    pub fn spawn_count(&self) -> usize {
        self.lock().calls
    }

    pub fn processes(&self) -> Vec<MockProcess> {
        self.lock().processes.clone()
    }

    pub fn last_process(&self) -> Option<MockProcess> {
        self.lock().processes.last().cloned()
    }

    pub fn process(&self, pid: u32) -> Option<MockProcess> {
        self.lock().processes.iter().find(|p| p.pid == pid).cloned()
    }
}

impl PtySpawner for MockSpawner {
    fn spawn(&self, spec: &SpawnSpec) -> Result<SpawnedPty, PtyError> {
        let mut state = self.lock();
        state.calls += 1;
        state.in_flight += 1;
        self.changed.notify_all();
        while state.held {
            state = match self.changed.wait(state) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
        state.in_flight -= 1;

        if let Some(kind) = state.failures.get(&spec.program) {
            return Err(PtyError::spawn(
                format!("{}: command not found", spec.program),
                *kind,
            ));
        }

        let pid = state.next_pid;
        state.next_pid += 1;
        let (tx, rx) = channel::unbounded();
        let log = Arc::new(Mutex::new(ControlLog::default()));
        state.processes.push(MockProcess {
            pid,
            spec: spec.clone(),
            events: tx.clone(),
            log: Arc::clone(&log),
        });

        Ok(SpawnedPty {
            pid,
            control: Box::new(MockControl {
                log,
                events: tx,
                exit_on_kill: state.exit_on_kill,
            }),
            events: rx,
        })
    }
}

/// A sink that keeps every event it receives.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<TerminalEvent>>,
    changed: Condvar,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TerminalEvent> {
        mutex_lock_or_recover(&self.events).clone()
    }

    pub fn events_for(&self, id: &TerminalId) -> Vec<TerminalEvent> {
        mutex_lock_or_recover(&self.events)
            .iter()
            .filter(|e| e.id() == id)
            .cloned()
            .collect()
    }

    /// Concatenated data output of one terminal.
    pub fn output_of(&self, id: &TerminalId) -> String {
        self.events_for(id)
            .into_iter()
            .filter_map(|e| match e {
                TerminalEvent::Data { data, .. } => Some(data),
                TerminalEvent::Exit { .. } => None,
            })
            .collect()
    }

    pub fn wait_until(
        &self,
        timeout: Duration,
        predicate: impl Fn(&[TerminalEvent]) -> bool,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        let mut events = mutex_lock_or_recover(&self.events);
        while !predicate(&events) {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return false;
            };
            events = match self.changed.wait_timeout(events, remaining) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }
}

impl TerminalEventSink for RecordingSink {
    fn deliver(&self, event: TerminalEvent) {
        mutex_lock_or_recover(&self.events).push(event);
        self.changed.notify_all();
    }
}
