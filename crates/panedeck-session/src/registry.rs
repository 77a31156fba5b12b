//! Keyed store of local terminals.
//!
//! Every slot is either `Pending` (a spawn is in flight) or `Live`. An id
//! cannot be both because both states share one map, and every compound
//! check-then-act transition happens inside a single write-lock section.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use panedeck_common::TerminalId;
use panedeck_common::rwlock_read_or_recover;
use panedeck_common::rwlock_write_or_recover;

use crate::ProcessStamp;
use crate::TerminalEntry;

/// Proof of a pending reservation. Its generation becomes the stamp
/// generation of the process installed under it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

impl Ticket {
    pub fn generation(&self) -> u64 {
        self.0
    }
}

enum Slot {
    Pending(Ticket),
    Live(Arc<TerminalEntry>),
}

pub(crate) enum Removed {
    Pending,
    Live(Arc<TerminalEntry>),
}

pub struct TerminalRegistry {
    slots: RwLock<HashMap<TerminalId, Slot>>,
    next_generation: AtomicU64,
}

impl Default for TerminalRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalRegistry {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
        }
    }

    pub fn get(&self, id: &TerminalId) -> Option<Arc<TerminalEntry>> {
        match rwlock_read_or_recover(&self.slots).get(id) {
            Some(Slot::Live(entry)) => Some(Arc::clone(entry)),
            _ => None,
        }
    }

    /// True when `id` has a live process.
    pub fn has(&self, id: &TerminalId) -> bool {
        matches!(
            rwlock_read_or_recover(&self.slots).get(id),
            Some(Slot::Live(_))
        )
    }

    pub fn is_pending(&self, id: &TerminalId) -> bool {
        matches!(
            rwlock_read_or_recover(&self.slots).get(id),
            Some(Slot::Pending(_))
        )
    }

    pub fn is_current(&self, id: &TerminalId, stamp: ProcessStamp) -> bool {
        match rwlock_read_or_recover(&self.slots).get(id) {
            Some(Slot::Live(entry)) => entry.stamp() == stamp,
            _ => false,
        }
    }

    /// Runs `f` while `stamp` is guaranteed to stay the live process for `id`.
    pub(crate) fn if_current<R>(
        &self,
        id: &TerminalId,
        stamp: ProcessStamp,
        f: impl FnOnce() -> R,
    ) -> Option<R> {
        let slots = rwlock_read_or_recover(&self.slots);
        match slots.get(id) {
            Some(Slot::Live(entry)) if entry.stamp() == stamp => Some(f()),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        rwlock_read_or_recover(&self.slots)
            .values()
            .filter(|slot| matches!(slot, Slot::Live(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pending_count(&self) -> usize {
        rwlock_read_or_recover(&self.slots)
            .values()
            .filter(|slot| matches!(slot, Slot::Pending(_)))
            .count()
    }

    pub fn list(&self) -> Vec<Arc<TerminalEntry>> {
        let mut entries: Vec<Arc<TerminalEntry>> = rwlock_read_or_recover(&self.slots)
            .values()
            .filter_map(|slot| match slot {
                Slot::Live(entry) => Some(Arc::clone(entry)),
                Slot::Pending(_) => None,
            })
            .collect();
        entries.sort_by(|a, b| a.id().cmp(b.id()));
        entries
    }

    /// Marks `id` pending unless it is already pending or live.
    pub(crate) fn reserve(&self, id: &TerminalId) -> Option<Ticket> {
        let mut slots = rwlock_write_or_recover(&self.slots);
        if slots.contains_key(id) {
            return None;
        }
        let ticket = Ticket(self.next_generation.fetch_add(1, Ordering::Relaxed));
        slots.insert(id.clone(), Slot::Pending(ticket));
        Some(ticket)
    }

    /// Promotes our pending slot to live. Fails if the reservation was
    /// cancelled or replaced while the spawn was in flight.
    pub(crate) fn install(
        &self,
        id: &TerminalId,
        ticket: Ticket,
        entry: Arc<TerminalEntry>,
    ) -> bool {
        let mut slots = rwlock_write_or_recover(&self.slots);
        let Some(slot) = slots.get_mut(id) else {
            return false;
        };
        if !matches!(slot, Slot::Pending(t) if *t == ticket) {
            return false;
        }
        *slot = Slot::Live(entry);
        true
    }

    /// Drops our pending reservation after a failed spawn.
    pub(crate) fn release(&self, id: &TerminalId, ticket: Ticket) -> bool {
        let mut slots = rwlock_write_or_recover(&self.slots);
        if matches!(slots.get(id), Some(Slot::Pending(t)) if *t == ticket) {
            slots.remove(id);
            return true;
        }
        false
    }

    pub(crate) fn remove(&self, id: &TerminalId) -> Option<Removed> {
        rwlock_write_or_recover(&self.slots)
            .remove(id)
            .map(|slot| match slot {
                Slot::Pending(_) => Removed::Pending,
                Slot::Live(entry) => Removed::Live(entry),
            })
    }

    /// Removes the live entry only if it still belongs to `stamp`.
    pub(crate) fn remove_if_current(
        &self,
        id: &TerminalId,
        stamp: ProcessStamp,
    ) -> Option<Arc<TerminalEntry>> {
        let mut slots = rwlock_write_or_recover(&self.slots);
        let current = matches!(slots.get(id), Some(Slot::Live(entry)) if entry.stamp() == stamp);
        if !current {
            return None;
        }
        match slots.remove(id) {
            Some(Slot::Live(entry)) => Some(entry),
            _ => None,
        }
    }

    pub(crate) fn drain(&self) -> Vec<Arc<TerminalEntry>> {
        rwlock_write_or_recover(&self.slots)
            .drain()
            .filter_map(|(_, slot)| match slot {
                Slot::Live(entry) => Some(entry),
                Slot::Pending(_) => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use panedeck_pty::PtyControl;
    use panedeck_pty::PtyError;
    use panedeck_pty::TerminalSize;

    struct NullControl;

    impl PtyControl for NullControl {
        fn write(&mut self, _data: &[u8]) -> Result<(), PtyError> {
            Ok(())
        }

        fn resize(&mut self, _size: TerminalSize) -> Result<(), PtyError> {
            Ok(())
        }

        fn kill(&mut self) -> Result<(), PtyError> {
            Ok(())
        }
    }

    fn entry(id: &TerminalId, ticket: Ticket, pid: u32) -> Arc<TerminalEntry> {
        Arc::new(TerminalEntry::new(
            id.clone(),
            ProcessStamp::new(pid, ticket.generation()),
            "/bin/sh",
            None,
            TerminalSize::default(),
            Box::new(NullControl),
        ))
    }

    #[test]
    fn test_reserve_blocks_duplicates_while_pending_or_live() {
        let registry = TerminalRegistry::new();
        let id = TerminalId::new("a");

        let ticket = registry.reserve(&id).unwrap();
        assert!(registry.is_pending(&id));
        assert!(!registry.has(&id));
        assert!(registry.reserve(&id).is_none());

        assert!(registry.install(&id, ticket, entry(&id, ticket, 100)));
        assert!(registry.has(&id));
        assert!(!registry.is_pending(&id));
        assert!(registry.reserve(&id).is_none());
    }

    #[test]
    fn test_install_fails_after_cancel() {
        let registry = TerminalRegistry::new();
        let id = TerminalId::new("a");

        let first = registry.reserve(&id).unwrap();
        assert!(matches!(registry.remove(&id), Some(Removed::Pending)));
        let second = registry.reserve(&id).unwrap();
        assert_ne!(first, second);

        assert!(!registry.install(&id, first, entry(&id, first, 100)));
        assert!(registry.is_pending(&id));
        assert!(registry.install(&id, second, entry(&id, second, 101)));
        assert_eq!(registry.get(&id).unwrap().pid(), 101);
    }

    #[test]
    fn test_release_only_drops_own_ticket() {
        let registry = TerminalRegistry::new();
        let id = TerminalId::new("a");

        let stale = registry.reserve(&id).unwrap();
        registry.remove(&id);
        let fresh = registry.reserve(&id).unwrap();

        assert!(!registry.release(&id, stale));
        assert!(registry.is_pending(&id));
        assert!(registry.release(&id, fresh));
        assert!(!registry.is_pending(&id));
    }

    #[test]
    fn test_remove_if_current_compares_full_stamp() {
        let registry = TerminalRegistry::new();
        let id = TerminalId::new("a");
        let ticket = registry.reserve(&id).unwrap();
        registry.install(&id, ticket, entry(&id, ticket, 100));

        // Same pid, different generation: a recycled pid.
        let recycled = ProcessStamp::new(100, ticket.generation() + 1);
        assert!(!registry.is_current(&id, recycled));
        assert!(registry.remove_if_current(&id, recycled).is_none());
        assert!(registry.has(&id));

        let current = ProcessStamp::new(100, ticket.generation());
        assert!(registry.remove_if_current(&id, current).is_some());
        assert!(!registry.has(&id));
    }

    #[test]
    fn test_list_is_sorted_and_skips_pending() {
        let registry = TerminalRegistry::new();
        for name in ["c", "a", "b"] {
            let id = TerminalId::new(name);
            let ticket = registry.reserve(&id).unwrap();
            registry.install(&id, ticket, entry(&id, ticket, 1));
        }
        registry.reserve(&TerminalId::new("pending")).unwrap();

        let ids: Vec<String> = registry
            .list()
            .iter()
            .map(|e| e.id().to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.pending_count(), 1);

        assert_eq!(registry.drain().len(), 3);
        assert!(registry.is_empty());
        assert_eq!(registry.pending_count(), 0);
    }
}
