//! Lock access that survives a panicked holder.
//!
//! A pump thread that panics while holding a registry or layout lock must not
//! take every later request down with it, so poisoned guards are taken over
//! and counted.

use std::fmt;
use std::sync::LockResult;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::RwLock;
use std::sync::RwLockReadGuard;
use std::sync::RwLockWriteGuard;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use tracing::error;

static RECOVERED: AtomicU64 = AtomicU64::new(0);

/// Number of poisoned lock acquisitions taken over since process start.
pub fn poison_recovery_count() -> u64 {
    RECOVERED.load(Ordering::Relaxed)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Access {
    Lock,
    Read,
    Write,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Access::Lock => "mutex lock",
            Access::Read => "rwlock read",
            Access::Write => "rwlock write",
        })
    }
}

fn take_over<G>(result: LockResult<G>, access: Access) -> G {
    result.unwrap_or_else(|poisoned| {
        let total = RECOVERED.fetch_add(1, Ordering::Relaxed) + 1;
        error!(
            %access,
            recovered = total,
            "Lock poisoned by a panicked holder; continuing with its last state"
        );
        poisoned.into_inner()
    })
}

pub fn mutex_lock_or_recover<T>(lock: &Mutex<T>) -> MutexGuard<'_, T> {
    take_over(lock.lock(), Access::Lock)
}

pub fn rwlock_read_or_recover<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    take_over(lock.read(), Access::Read)
}

pub fn rwlock_write_or_recover<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    take_over(lock.write(), Access::Write)
}
