//! Environment parsing helpers shared by the configuration layers.
//!
//! Every helper treats a missing or blank variable as "unset" and logs a
//! warning before falling back when a value is present but malformed.

use std::env;
use std::str::FromStr;

use tracing::warn;

pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Reads a trimmed, non-empty string variable.
pub fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().and_then(non_empty)
}

pub fn env_bool(key: &str, default: bool) -> bool {
    let Some(value) = env_string(key) else {
        return default;
    };
    match parse_bool(&value) {
        Some(parsed) => parsed,
        None => {
            warn!(value = %value, key, "Invalid boolean config; using default");
            default
        }
    }
}

/// Parses any `FromStr` value, warning and falling back on malformed input.
pub fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    let Some(value) = env_string(key) else {
        return default;
    };
    match value.parse::<T>() {
        Ok(parsed) => parsed,
        Err(_) => {
            warn!(value = %value, key, "Invalid config value; using default");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    struct EnvGuard {
        key: &'static str,
        prev: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &'static str, value: &str) -> Self {
            let prev = env::var(key).ok();
            // SAFETY: Test-only environment override, serialized by ENV_LOCK.
            unsafe {
                env::set_var(key, value);
            }
            Self { key, prev }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            if let Some(prev) = self.prev.take() {
                // SAFETY: Test-only environment restoration.
                unsafe {
                    env::set_var(self.key, prev);
                }
            } else {
                // SAFETY: Test-only environment cleanup.
                unsafe {
                    env::remove_var(self.key);
                }
            }
        }
    }

    #[test]
    fn test_parse_bool_variants() {
        assert_eq!(parse_bool("YES"), Some(true));
        assert_eq!(parse_bool(" off "), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_blank_values_are_unset() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::set("PANEDECK_TEST_BLANK", "   ");
        assert_eq!(env_string("PANEDECK_TEST_BLANK"), None);
        assert_eq!(env_parse("PANEDECK_TEST_BLANK", 7u16), 7);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _num = EnvGuard::set("PANEDECK_TEST_NUM", "lots");
        let _flag = EnvGuard::set("PANEDECK_TEST_FLAG", "sometimes");
        assert_eq!(env_parse("PANEDECK_TEST_NUM", 3usize), 3);
        assert!(env_bool("PANEDECK_TEST_FLAG", true));
    }

    #[test]
    fn test_valid_values_parse() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _num = EnvGuard::set("PANEDECK_TEST_NUM_OK", " 120 ");
        assert_eq!(env_parse("PANEDECK_TEST_NUM_OK", 80u16), 120);
    }
}
