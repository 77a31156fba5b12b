#![deny(clippy::all)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

//! Terminal session orchestration.
//!
//! [`SessionManager`] owns every local PTY through a [`TerminalRegistry`].
//! Each id moves through `absent -> pending -> live -> absent`; the pending
//! step is taken atomically so duplicate create requests collapse into a
//! no-op. Output is published to a [`TerminalEventSink`], normally a
//! [`LocalFanout`].

mod entry;
mod error;
mod event;
mod fanout;
mod manager;
mod pump;
mod registry;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use entry::ProcessStamp;
pub use entry::TerminalEntry;
pub use entry::TerminalInfo;
pub use error::SessionError;
pub use event::TerminalEvent;
pub use event::TerminalEventSink;
pub use fanout::LocalFanout;
pub use fanout::LocalTransport;
pub use fanout::TransportClosed;
pub use manager::CreateOutcome;
pub use manager::KillOutcome;
pub use manager::SessionConfig;
pub use manager::SessionManager;
pub use pump::OutputTarget;
pub use pump::spawn_output_pump;
pub use registry::TerminalRegistry;
pub use registry::Ticket;

pub use panedeck_common::TerminalId;

pub type Result<T> = std::result::Result<T, SessionError>;
