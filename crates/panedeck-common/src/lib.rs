#![deny(clippy::all)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

//! Shared utilities used across the panedeck crates.

pub mod env;
pub mod error_codes;
mod sync;
pub mod telemetry;
mod terminal_id;

pub use sync::mutex_lock_or_recover;
pub use sync::poison_recovery_count;
pub use sync::rwlock_read_or_recover;
pub use sync::rwlock_write_or_recover;
pub use terminal_id::TerminalId;
