//! Serialized access to the settings backend.
//!
//! Every write goes through one mutex so a batch of related keys (e.g. offset
//! and shot count after a dose) lands together. Persistence failures are never
//! fatal: they are logged and the in-memory value stays authoritative.
use gbw_traits::{SettingValue, SettingsStore};
use std::sync::{Arc, Mutex};

/// Result of [`Persistence::lookup`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Stored {
    Missing,
    Value(SettingValue),
    Unreadable,
}

pub type SharedStore = Arc<Mutex<Box<dyn SettingsStore + Send>>>;

#[derive(Clone)]
pub struct Persistence {
    inner: SharedStore,
}

impl std::fmt::Debug for Persistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persistence").finish_non_exhaustive()
    }
}

impl Persistence {
    pub fn new<S: SettingsStore + Send + 'static>(store: S) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(store))),
        }
    }

    pub fn from_shared(inner: SharedStore) -> Self {
        Self { inner }
    }

    /// Read one key. Missing keys and backend errors both yield `None`.
    pub fn get(&self, key: &str) -> Option<SettingValue> {
        match self.lookup(key) {
            Stored::Value(v) => Some(v),
            Stored::Missing | Stored::Unreadable => None,
        }
    }

    /// Read one key, telling an absent key apart from one the backend holds
    /// but cannot return.
    pub fn lookup(&self, key: &str) -> Stored {
        let guard = match self.inner.lock() {
            Ok(g) => g,
            Err(_) => {
                tracing::warn!(key, "settings store lock poisoned");
                return Stored::Unreadable;
            }
        };
        match guard.get(key) {
            Ok(Some(v)) => Stored::Value(v),
            Ok(None) => Stored::Missing,
            Err(e) => {
                tracing::warn!(key, error = %e, "settings read failed");
                Stored::Unreadable
            }
        }
    }

    /// Write a batch of keys under one lock, then flush. Returns whether every
    /// write succeeded.
    pub fn save(&self, entries: &[(&str, SettingValue)]) -> bool {
        let mut guard = match self.inner.lock() {
            Ok(g) => g,
            Err(_) => {
                tracing::warn!("settings store lock poisoned; write skipped");
                return false;
            }
        };
        let mut ok = true;
        for (key, value) in entries {
            if let Err(e) = guard.put(key, *value) {
                tracing::warn!(key, error = %e, "settings write failed");
                ok = false;
            }
        }
        if let Err(e) = guard.flush() {
            tracing::warn!(error = %e, "settings flush failed");
            ok = false;
        }
        ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::MemoryStore;

    #[test]
    fn batch_write_is_visible() {
        let p = Persistence::new(MemoryStore::default());
        assert!(p.save(&[
            ("offset", SettingValue::Float(-1.5)),
            ("shotCount", SettingValue::UInt(3)),
        ]));
        assert_eq!(p.get("offset"), Some(SettingValue::Float(-1.5)));
        assert_eq!(p.get("shotCount"), Some(SettingValue::UInt(3)));
        assert_eq!(p.get("missing"), None);
    }

    #[test]
    fn failing_backend_is_not_fatal() {
        let p = Persistence::new(MemoryStore::failing());
        assert!(!p.save(&[("offset", SettingValue::Float(1.0))]));
        assert_eq!(p.get("offset"), None);
        assert_eq!(p.lookup("offset"), Stored::Unreadable);
    }

    #[test]
    fn lookup_separates_missing_from_present() {
        let p = Persistence::new(MemoryStore::default().with("cup", SettingValue::Float(70.0)));
        assert_eq!(p.lookup("cup"), Stored::Value(SettingValue::Float(70.0)));
        assert_eq!(p.lookup("offset"), Stored::Missing);
    }
}
