use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde::Serializer;

/// How many remote connections may be registered at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionLimit {
    Limited(usize),
    Unlimited,
}

impl ConnectionLimit {
    /// Whether one more connection fits next to `current` registered ones.
    pub fn admits(&self, current: usize) -> bool {
        match self {
            ConnectionLimit::Limited(max) => current < *max,
            ConnectionLimit::Unlimited => true,
        }
    }

    pub fn as_option(&self) -> Option<usize> {
        match self {
            ConnectionLimit::Limited(max) => Some(*max),
            ConnectionLimit::Unlimited => None,
        }
    }
}

impl Default for ConnectionLimit {
    fn default() -> Self {
        ConnectionLimit::Limited(1)
    }
}

impl fmt::Display for ConnectionLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionLimit::Limited(max) => write!(f, "{max}"),
            ConnectionLimit::Unlimited => f.write_str("unlimited"),
        }
    }
}

impl FromStr for ConnectionLimit {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("unlimited") {
            return Ok(ConnectionLimit::Unlimited);
        }
        value
            .parse::<usize>()
            .map(ConnectionLimit::Limited)
            .map_err(|_| format!("expected a number or 'unlimited', got '{value}'"))
    }
}

impl Serialize for ConnectionLimit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ConnectionLimit::Limited(max) => serializer.serialize_u64(*max as u64),
            ConnectionLimit::Unlimited => serializer.serialize_str("unlimited"),
        }
    }
}

/// Source of the remote connection ceiling for the running edition.
pub trait EditionPolicy: Send + Sync {
    fn connection_limit(&self) -> ConnectionLimit;
}

/// A fixed ceiling taken from configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticEdition(pub ConnectionLimit);

impl EditionPolicy for StaticEdition {
    fn connection_limit(&self) -> ConnectionLimit {
        self.0
    }
}
