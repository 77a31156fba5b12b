#![expect(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

//! Native PTY tests against real processes.

#![cfg(unix)]

use std::time::Duration;
use std::time::Instant;

use crossbeam_channel::Receiver;
use panedeck_pty::NativePtySpawner;
use panedeck_pty::PtyEvent;
use panedeck_pty::PtySpawner;
use panedeck_pty::SpawnErrorKind;
use panedeck_pty::SpawnSpec;
use panedeck_pty::TerminalSize;
use panedeck_pty::Utf8ChunkDecoder;

const DEADLINE: Duration = Duration::from_secs(10);

/// Collects output until the exit event, returning the text and the code.
fn drain(events: &Receiver<PtyEvent>) -> (String, i32) {
    let started = Instant::now();
    let mut decoder = Utf8ChunkDecoder::new();
    let mut output = String::new();
    loop {
        let remaining = DEADLINE
            .checked_sub(started.elapsed())
            .expect("PTY did not exit in time");
        match events.recv_timeout(remaining).expect("PTY event") {
            PtyEvent::Data(bytes) => output.push_str(&decoder.decode(&bytes)),
            PtyEvent::Exit { code } => return (output, code),
        }
    }
}

#[test]
fn test_spawn_reports_output_then_exit_code() {
    let spec = SpawnSpec::new("/bin/sh").with_args(["-c", "printf ready; exit 3"]);
    let pty = NativePtySpawner::new().spawn(&spec).expect("spawn");
    assert!(pty.pid > 0);

    let (output, code) = drain(&pty.events);
    assert!(output.contains("ready"), "output was {output:?}");
    assert_eq!(code, 3);
}

#[test]
fn test_write_reaches_process() {
    let spec = SpawnSpec::new("/bin/sh").with_args(["-c", "read line; echo got:$line"]);
    let mut pty = NativePtySpawner::new().spawn(&spec).expect("spawn");

    pty.control.write(b"hello\n").expect("write");
    let (output, code) = drain(&pty.events);
    assert!(output.contains("got:hello"), "output was {output:?}");
    assert_eq!(code, 0);
}

#[test]
fn test_kill_terminates_process_and_emits_exit() {
    let spec = SpawnSpec::new("/bin/sh").with_args(["-c", "sleep 30"]);
    let mut pty = NativePtySpawner::new().spawn(&spec).expect("spawn");

    pty.control.kill().expect("kill");
    let (_, code) = drain(&pty.events);
    assert_ne!(code, 0);

    // The reaped child must not be signalled again.
    pty.control.kill().expect("second kill is a no-op");
}

#[test]
fn test_resize_is_visible_to_process() {
    let spec = SpawnSpec::new("/bin/sh")
        .with_args(["-c", "read line; stty size"])
        .with_size(TerminalSize::new(80, 24));
    let mut pty = NativePtySpawner::new().spawn(&spec).expect("spawn");

    pty.control.resize(TerminalSize::new(120, 40)).expect("resize");
    pty.control.write(b"\n").expect("write");
    let (output, _) = drain(&pty.events);
    assert!(output.contains("40 120"), "output was {output:?}");
}

#[test]
fn test_spawn_missing_program_fails() {
    let spec = SpawnSpec::new("/nonexistent/panedeck-no-such-program");
    let err = NativePtySpawner::new().spawn(&spec).unwrap_err();
    assert_eq!(err.operation(), "spawn");
    assert_eq!(err.spawn_kind(), Some(SpawnErrorKind::NotFound));
}

#[test]
fn test_spawn_program_missing_from_path_is_not_found() {
    let spec = SpawnSpec::new("panedeck-definitely-not-a-shell-xyz");
    let err = NativePtySpawner::new().spawn(&spec).unwrap_err();
    assert_eq!(err.spawn_kind(), Some(SpawnErrorKind::NotFound));
    assert!(err.suggestion().contains("Command not found"), "{}", err.suggestion());
}

#[test]
fn test_environment_reaches_process() {
    let spec = SpawnSpec::new("/bin/sh")
        .with_args(["-c", "echo $PANEDECK_TEST_VALUE:$TERM"])
        .with_env("PANEDECK_TEST_VALUE", "forty-two");
    let pty = NativePtySpawner::new().spawn(&spec).expect("spawn");

    let (output, _) = drain(&pty.events);
    assert!(output.contains("forty-two:xterm-256color"), "output was {output:?}");
}
