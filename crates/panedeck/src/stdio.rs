//! JSON-lines transport over the host's stdin and stdout.
//!
//! One writer thread owns stdout. Responses and terminal events are queued
//! to it through the same channel, so a line is never interleaved with
//! another.

use std::io;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::mpsc as std_mpsc;
use std::thread;
use std::time::Duration;

use crossbeam_channel as channel;
use crossbeam_channel::RecvTimeoutError;
use panedeck_session::LocalTransport;
use panedeck_session::TerminalEvent;
use panedeck_session::TransportClosed;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::Host;
use crate::HostConfig;
use crate::HostError;
use crate::router::handle_line;

const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(200);
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// The local UI connection: a line-oriented writer fed by a queue.
pub struct StdioTransport {
    tx: channel::Sender<String>,
    alive: Arc<AtomicBool>,
}

impl StdioTransport {
    /// Starts the writer thread. It exits once every clone of the
    /// transport is dropped and the queue is drained, or on a write error.
    pub fn spawn<W>(writer: W) -> Result<(Arc<Self>, thread::JoinHandle<()>), HostError>
    where
        W: Write + Send + 'static,
    {
        let (tx, rx) = channel::unbounded::<String>();
        let alive = Arc::new(AtomicBool::new(true));
        let writer_alive = Arc::clone(&alive);
        let join = thread::Builder::new()
            .name("stdio-writer".to_string())
            .spawn(move || {
                let mut writer = writer;
                for line in rx.iter() {
                    let written = writer
                        .write_all(line.as_bytes())
                        .and_then(|()| writer.write_all(b"\n"))
                        .and_then(|()| writer.flush());
                    if let Err(err) = written {
                        warn!(error = %err, "Local UI output closed");
                        break;
                    }
                }
                writer_alive.store(false, Ordering::SeqCst);
            })
            .map_err(|e| HostError::Io {
                operation: "spawn stdio writer",
                source: e,
            })?;
        Ok((Arc::new(Self { tx, alive }), join))
    }

    pub fn send_line(&self, line: String) -> Result<(), TransportClosed> {
        if !self.is_alive() {
            return Err(TransportClosed);
        }
        self.tx.send(line).map_err(|_| TransportClosed)
    }
}

impl LocalTransport for StdioTransport {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn send(&self, event: &TerminalEvent) -> Result<(), TransportClosed> {
        let line = serde_json::to_string(event).map_err(|_| TransportClosed)?;
        self.send_line(line)
    }
}

/// Reads lines on a background thread. The channel closes at end of input.
pub fn spawn_line_reader<R>(reader: R) -> Result<channel::Receiver<String>, HostError>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = channel::unbounded();
    thread::Builder::new()
        .name("stdio-reader".to_string())
        .spawn(move || {
            for line in reader.lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, "Failed to read from local UI");
                        break;
                    }
                }
            }
            debug!("Local UI input closed");
        })
        .map_err(|e| HostError::Io {
            operation: "spawn stdio reader",
            source: e,
        })?;
    Ok(rx)
}

/// Answers requests until input ends, output breaks or `shutdown` is set.
pub fn serve(
    host: &Host,
    transport: &StdioTransport,
    lines: &channel::Receiver<String>,
    shutdown: &AtomicBool,
) {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            info!("Shutdown requested");
            return;
        }
        match lines.recv_timeout(SHUTDOWN_POLL_INTERVAL) {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let response = handle_line(host, &line);
                if transport.send_line(response.to_line()).is_err() {
                    warn!("Local UI output closed; stopping");
                    return;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                info!("Local UI closed its input; stopping");
                return;
            }
        }
    }
}

/// Runs the host on this process's stdin and stdout until the UI goes away
/// or a termination signal arrives.
pub fn run(config: &HostConfig) -> Result<(), HostError> {
    let shutdown = Arc::new(AtomicBool::new(false));
    #[cfg(unix)]
    let _signals = crate::signal_handler::SignalHandler::setup(Arc::clone(&shutdown))?;

    let (transport, writer) = StdioTransport::spawn(io::stdout())?;
    let lines = spawn_line_reader(BufReader::new(io::stdin()))?;

    let host = Host::start(config);
    host.fanout().attach(transport.clone());
    info!(
        shell = %config.shell_profile().program,
        agent = %config.agent,
        "panedeck host ready"
    );

    serve(&host, &transport, &lines, &shutdown);

    host.shutdown();
    drop(transport);
    wait_for_writer(writer);
    Ok(())
}

fn wait_for_writer(writer: thread::JoinHandle<()>) {
    let (done_tx, done_rx) = std_mpsc::channel();
    let _ = thread::Builder::new()
        .name("stdio-drain".to_string())
        .spawn(move || {
            let _ = writer.join();
            let _ = done_tx.send(());
        });
    if done_rx.recv_timeout(WRITER_DRAIN_TIMEOUT).is_err() {
        warn!("Output writer did not finish within drain timeout");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn writer_emits_one_line_per_item() {
        let buffer = SharedBuffer::default();
        let (transport, join) = StdioTransport::spawn(buffer.clone()).unwrap();

        transport.send_line("{\"a\":1}".to_string()).unwrap();
        transport
            .send(&TerminalEvent::Exit {
                id: "t1".into(),
                exit_code: 0,
            })
            .unwrap();
        drop(transport);
        join.join().unwrap();

        let output = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        assert_eq!(
            output,
            "{\"a\":1}\n{\"event\":\"exit\",\"params\":{\"id\":\"t1\",\"exitCode\":0}}\n"
        );
    }

    #[test]
    fn broken_output_marks_transport_dead() {
        let (transport, join) = StdioTransport::spawn(BrokenPipe).unwrap();
        transport.send_line("x".to_string()).unwrap();
        join.join().unwrap();

        assert!(!transport.is_alive());
        assert_eq!(transport.send_line("y".to_string()), Err(TransportClosed));
    }

    #[test]
    fn line_reader_closes_at_end_of_input() {
        let rx = spawn_line_reader(io::Cursor::new(b"one\ntwo\n".to_vec())).unwrap();
        let lines: Vec<String> = rx.iter().collect();
        assert_eq!(lines, vec!["one", "two"]);
    }
}
