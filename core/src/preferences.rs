//! Key/value preferences store consumed by the repositories.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Opaque `string -> string` store. A missing key reads as `""`.
pub trait Preferences: Send + Sync {
    fn string(&self, key: &str) -> String;

    fn set_string(&self, key: &str, value: &str) -> std::io::Result<()>;
}

/// Process-local preferences, used in tests and when no file store is
/// available.
#[derive(Debug, Default)]
pub struct MemoryPreferences {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Preferences for MemoryPreferences {
    fn string(&self, key: &str) -> String {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    fn set_string(&self, key: &str, value: &str) -> std::io::Result<()> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_empty() {
        let prefs = MemoryPreferences::new();
        assert_eq!(prefs.string("nope"), "");
        prefs.set_string("k", "v").unwrap();
        assert_eq!(prefs.string("k"), "v");
    }
}
