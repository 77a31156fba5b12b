use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::RwLock;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use crossbeam_channel as channel;
use panedeck_common::TerminalId;
use panedeck_common::mutex_lock_or_recover;
use panedeck_common::rwlock_read_or_recover;
use panedeck_common::rwlock_write_or_recover;
use thiserror::Error;
use tracing::debug;

use crate::TerminalEvent;
use crate::TerminalEventSink;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("local transport closed")]
pub struct TransportClosed;

/// The channel to the local UI.
pub trait LocalTransport: Send + Sync {
    fn is_alive(&self) -> bool;

    fn send(&self, event: &TerminalEvent) -> Result<(), TransportClosed>;
}

/// Forwards terminal output to the attached local transport.
///
/// Delivery is best effort: with no transport attached, or a transport that
/// has gone away, the event is dropped and counted. Nothing is queued for a
/// later transport. Extra per-terminal subscribers receive the same ordered
/// stream until they drop their receiver.
#[derive(Default)]
pub struct LocalFanout {
    transport: RwLock<Option<Arc<dyn LocalTransport>>>,
    subscribers: Mutex<HashMap<TerminalId, Vec<channel::Sender<TerminalEvent>>>>,
    dropped: AtomicU64,
}

impl LocalFanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, transport: Arc<dyn LocalTransport>) {
        *rwlock_write_or_recover(&self.transport) = Some(transport);
    }

    pub fn detach(&self) {
        *rwlock_write_or_recover(&self.transport) = None;
    }

    pub fn subscribe(&self, id: &TerminalId) -> channel::Receiver<TerminalEvent> {
        let (tx, rx) = channel::unbounded();
        mutex_lock_or_recover(&self.subscribers)
            .entry(id.clone())
            .or_default()
            .push(tx);
        rx
    }

    pub fn subscriber_count(&self, id: &TerminalId) -> usize {
        mutex_lock_or_recover(&self.subscribers)
            .get(id)
            .map_or(0, Vec::len)
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn send_to_transport(&self, event: &TerminalEvent) {
        let transport = rwlock_read_or_recover(&self.transport).clone();
        let Some(transport) = transport.filter(|t| t.is_alive()) else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };
        if let Err(err) = transport.send(event) {
            debug!(id = %event.id(), error = %err, "Dropping terminal event");
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn send_to_subscribers(&self, event: &TerminalEvent) {
        let mut subscribers = mutex_lock_or_recover(&self.subscribers);
        let Some(senders) = subscribers.get_mut(event.id()) else {
            return;
        };
        senders.retain(|tx| tx.send(event.clone()).is_ok());
        if senders.is_empty() || event.is_exit() {
            subscribers.remove(event.id());
        }
    }
}

impl TerminalEventSink for LocalFanout {
    fn deliver(&self, event: TerminalEvent) {
        self.send_to_transport(&event);
        self.send_to_subscribers(&event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[derive(Default)]
    struct FakeTransport {
        alive: AtomicBool,
        fail_sends: AtomicBool,
        sent: Mutex<Vec<TerminalEvent>>,
    }

    impl FakeTransport {
        fn alive() -> Arc<Self> {
            let transport = Arc::new(Self::default());
            transport.alive.store(true, Ordering::SeqCst);
            transport
        }

        fn sent(&self) -> Vec<TerminalEvent> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl LocalTransport for FakeTransport {
        fn is_alive(&self) -> bool {
            self.alive.load(Ordering::SeqCst)
        }

        fn send(&self, event: &TerminalEvent) -> Result<(), TransportClosed> {
            if self.fail_sends.load(Ordering::SeqCst) {
                return Err(TransportClosed);
            }
            self.sent.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    fn data(id: &str, text: &str) -> TerminalEvent {
        TerminalEvent::Data {
            id: TerminalId::new(id),
            data: text.into(),
        }
    }

    #[test]
    fn test_delivers_to_live_transport_in_order() {
        let fanout = LocalFanout::new();
        let transport = FakeTransport::alive();
        fanout.attach(transport.clone());

        fanout.deliver(data("a", "1"));
        fanout.deliver(data("b", "2"));
        fanout.deliver(data("a", "3"));

        assert_eq!(
            transport.sent(),
            vec![data("a", "1"), data("b", "2"), data("a", "3")]
        );
        assert_eq!(fanout.dropped_count(), 0);
    }

    #[test]
    fn test_dead_transport_drops_without_queueing() {
        let fanout = LocalFanout::new();
        let transport = FakeTransport::alive();
        fanout.attach(transport.clone());

        transport.alive.store(false, Ordering::SeqCst);
        fanout.deliver(data("a", "lost"));
        transport.alive.store(true, Ordering::SeqCst);
        fanout.deliver(data("a", "kept"));

        assert_eq!(transport.sent(), vec![data("a", "kept")]);
        assert_eq!(fanout.dropped_count(), 1);
    }

    #[test]
    fn test_failed_send_and_detached_transport_are_counted() {
        let fanout = LocalFanout::new();
        fanout.deliver(data("a", "nobody"));

        let transport = FakeTransport::alive();
        transport.fail_sends.store(true, Ordering::SeqCst);
        fanout.attach(transport);
        fanout.deliver(data("a", "closed"));

        fanout.detach();
        fanout.deliver(data("a", "detached"));

        assert_eq!(fanout.dropped_count(), 3);
    }

    #[test]
    fn test_subscribers_follow_one_terminal_until_exit() {
        let fanout = LocalFanout::new();
        let id = TerminalId::new("a");
        let rx = fanout.subscribe(&id);
        let other = fanout.subscribe(&TerminalId::new("b"));

        fanout.deliver(data("a", "hi"));
        fanout.deliver(TerminalEvent::Exit {
            id: id.clone(),
            exit_code: 0,
        });

        assert_eq!(rx.try_recv().unwrap(), data("a", "hi"));
        assert!(rx.try_recv().unwrap().is_exit());
        assert!(other.try_recv().is_err());
        assert_eq!(fanout.subscriber_count(&id), 0);
    }

    #[test]
    fn test_dropped_receiver_unsubscribes() {
        let fanout = LocalFanout::new();
        let id = TerminalId::new("a");
        let keep = fanout.subscribe(&id);
        drop(fanout.subscribe(&id));
        assert_eq!(fanout.subscriber_count(&id), 2);

        fanout.deliver(data("a", "x"));

        assert_eq!(fanout.subscriber_count(&id), 1);
        assert_eq!(keep.try_recv().unwrap(), data("a", "x"));
    }
}
