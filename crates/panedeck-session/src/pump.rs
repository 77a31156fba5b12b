use std::io;
use std::sync::Arc;
use std::thread;

use crossbeam_channel::Receiver;
use panedeck_pty::PtyEvent;
use panedeck_pty::UNKNOWN_EXIT_CODE;
use panedeck_pty::Utf8ChunkDecoder;
use tracing::debug;

use crate::ProcessStamp;

/// Where a pump publishes the output of one process.
///
/// Implementations decide, atomically with delivery, whether `stamp` is
/// still the process behind their terminal. Output from a superseded
/// process is refused and never reaches a consumer.
pub trait OutputTarget: Send + Sync {
    /// Delivers decoded output. Returns `false` if `stamp` is stale.
    fn accept_data(&self, stamp: ProcessStamp, data: String) -> bool;

    /// Handles the process exit. Returns `false` if `stamp` is stale.
    fn accept_exit(&self, stamp: ProcessStamp, exit_code: i32) -> bool;
}

/// Starts the thread that moves one process's output to `target`.
///
/// Events are handled strictly in order, so no data for a stamp can be
/// published after its exit.
pub fn spawn_output_pump(
    thread_name: String,
    stamp: ProcessStamp,
    events: Receiver<PtyEvent>,
    target: Arc<dyn OutputTarget>,
) -> io::Result<thread::JoinHandle<()>> {
    let span = tracing::debug_span!("output_pump", pid = stamp.pid, generation = stamp.generation);
    thread::Builder::new().name(thread_name).spawn(move || {
        let _guard = span.enter();
        pump_loop(stamp, &events, target.as_ref());
    })
}

fn pump_loop(stamp: ProcessStamp, events: &Receiver<PtyEvent>, target: &dyn OutputTarget) {
    let mut decoder = Utf8ChunkDecoder::new();
    for event in events.iter() {
        match event {
            PtyEvent::Data(bytes) => {
                let text = decoder.decode(&bytes);
                if text.is_empty() {
                    continue;
                }
                // A superseded process never becomes current again.
                if !target.accept_data(stamp, text) {
                    debug!("Discarding output of superseded process");
                    return;
                }
            }
            PtyEvent::Exit { code } => {
                finish(stamp, &mut decoder, code, target);
                return;
            }
        }
    }
    debug!("PTY event stream closed without exit status");
    finish(stamp, &mut decoder, UNKNOWN_EXIT_CODE, target);
}

fn finish(stamp: ProcessStamp, decoder: &mut Utf8ChunkDecoder, code: i32, target: &dyn OutputTarget) {
    let tail = decoder.finish();
    if !tail.is_empty() && !target.accept_data(stamp, tail) {
        debug!(code, "Discarding stale exit");
        return;
    }
    if !target.accept_exit(stamp, code) {
        debug!(code, "Discarding stale exit");
    }
}
