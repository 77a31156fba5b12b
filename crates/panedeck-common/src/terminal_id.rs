use std::borrow::Borrow;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// Caller-chosen logical name of a terminal.
///
/// The id outlives any single process: a terminal can be killed and
/// recreated under the same id, in which case the new process is a new
/// identity behind the same name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TerminalId(String);

impl TerminalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for TerminalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TerminalId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for TerminalId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<String> for TerminalId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for TerminalId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}
