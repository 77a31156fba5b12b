#![expect(
    clippy::unwrap_used,
    reason = "Test-only assertions use unwrap for clarity."
)]

//! Local fan-out wired to a live session manager.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use panedeck_pty::ShellProfile;
use panedeck_session::LocalFanout;
use panedeck_session::LocalTransport;
use panedeck_session::SessionConfig;
use panedeck_session::SessionManager;
use panedeck_session::TerminalEvent;
use panedeck_session::TerminalId;
use panedeck_session::TransportClosed;
use panedeck_session::test_support::MockSpawner;

const WAIT: Duration = Duration::from_secs(5);

struct WindowTransport {
    alive: AtomicBool,
    received: Mutex<Vec<TerminalEvent>>,
}

impl LocalTransport for WindowTransport {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn send(&self, event: &TerminalEvent) -> Result<(), TransportClosed> {
        self.received.lock().unwrap().push(event.clone());
        Ok(())
    }
}

fn setup() -> (Arc<MockSpawner>, Arc<LocalFanout>, SessionManager) {
    let spawner = Arc::new(MockSpawner::new());
    let fanout = Arc::new(LocalFanout::new());
    let manager = SessionManager::new(
        spawner.clone(),
        fanout.clone(),
        SessionConfig::new(ShellProfile::new("/bin/sh", Vec::new())),
    );
    (spawner, fanout, manager)
}

#[test]
fn test_torn_down_window_drops_output_without_failing_terminal() {
    let (spawner, fanout, manager) = setup();
    let window = Arc::new(WindowTransport {
        alive: AtomicBool::new(true),
        received: Mutex::new(Vec::new()),
    });
    fanout.attach(window.clone());
    let id = TerminalId::new("t1");
    let observer = fanout.subscribe(&id);

    manager.create(&id, None).unwrap();
    let process = spawner.last_process().unwrap();

    process.emit("before");
    assert!(matches!(
        observer.recv_timeout(WAIT).unwrap(),
        TerminalEvent::Data { ref data, .. } if data == "before"
    ));

    window.alive.store(false, Ordering::SeqCst);
    process.emit("after");
    assert!(matches!(
        observer.recv_timeout(WAIT).unwrap(),
        TerminalEvent::Data { ref data, .. } if data == "after"
    ));

    // The terminal keeps working for other consumers.
    manager.write(&id, b"pwd\n").unwrap();
    assert_eq!(process.written(), "pwd\n");
    assert_eq!(window.received.lock().unwrap().len(), 1);
    assert_eq!(fanout.dropped_count(), 1);
}
