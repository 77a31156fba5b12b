#![deny(clippy::all)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

//! PTY process handles for panedeck.
//!
//! The [`PtySpawner`] trait is the seam between the session layer and the
//! operating system; [`NativePtySpawner`] is the portable-pty backed
//! implementation used in production.

pub mod error;
mod native;
mod shell;
mod spawner;
mod utf8;

pub use error::PtyError;
pub use error::SpawnErrorKind;
pub use native::NativePtySpawner;
pub use shell::AgentProfile;
pub use shell::DEFAULT_AGENT_PROGRAM;
pub use shell::HostOs;
pub use shell::PlatformProbe;
pub use shell::ShellProfile;
pub use spawner::PtyControl;
pub use spawner::PtyEvent;
pub use spawner::PtySpawner;
pub use spawner::SpawnSpec;
pub use spawner::SpawnedPty;
pub use spawner::TerminalSize;
pub use spawner::UNKNOWN_EXIT_CODE;
pub use utf8::Utf8ChunkDecoder;

pub type Result<T> = std::result::Result<T, PtyError>;
