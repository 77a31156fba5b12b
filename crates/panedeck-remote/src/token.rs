use std::sync::RwLock;

use panedeck_common::rwlock_read_or_recover;
use panedeck_common::rwlock_write_or_recover;
use tracing::info;

const TOKEN_BYTES: usize = 32;
pub const TOKEN_HEX_LEN: usize = TOKEN_BYTES * 2;

struct TokenState {
    value: String,
    epoch: u64,
}

/// The single process-wide remote access secret.
///
/// Exactly one token is valid at a time. Rotation bumps the epoch.
pub struct AccessTokenStore {
    state: RwLock<TokenState>,
}

impl Default for AccessTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AccessTokenStore {
    pub fn new() -> Self {
        Self::with_token(generate_token())
    }

    pub fn with_token(value: impl Into<String>) -> Self {
        Self {
            state: RwLock::new(TokenState {
                value: value.into(),
                epoch: 0,
            }),
        }
    }

    pub fn current(&self) -> String {
        rwlock_read_or_recover(&self.state).value.clone()
    }

    pub fn epoch(&self) -> u64 {
        rwlock_read_or_recover(&self.state).epoch
    }

    pub fn validate(&self, candidate: &str) -> bool {
        let state = rwlock_read_or_recover(&self.state);
        constant_time_eq(state.value.as_bytes(), candidate.as_bytes())
    }

    /// Replaces the token; the previous value stops validating immediately.
    pub fn regenerate(&self) -> String {
        let value = generate_token();
        let mut state = rwlock_write_or_recover(&self.state);
        state.value = value.clone();
        state.epoch += 1;
        info!(epoch = state.epoch, "Remote access token rotated");
        value
    }
}

fn generate_token() -> String {
    let bytes: [u8; TOKEN_BYTES] = rand::random();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Equal-length inputs are compared without data-dependent branches.
fn constant_time_eq(expected: &[u8], candidate: &[u8]) -> bool {
    if expected.len() != candidate.len() {
        return false;
    }
    expected
        .iter()
        .zip(candidate)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
