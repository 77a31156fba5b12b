#![deny(clippy::all)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

//! The panedeck host process.
//!
//! A single [`Host`] owns the local terminals, the split layout and the
//! optional remote server. The UI drives it with JSON lines on stdin and
//! receives responses and terminal output on stdout.

pub mod cli;
pub mod config;
pub mod error;
mod handlers;
mod host;
pub mod router;
pub mod rpc;
#[cfg(unix)]
mod signal_handler;
pub mod stdio;

pub use config::HostConfig;
pub use error::HostError;
pub use host::Host;
pub use stdio::run;
