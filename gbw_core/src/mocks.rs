//! Test and helper mocks for gbw_core

use gbw_traits::{SettingValue, SettingsStore};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// A scale that always errors on read; useful when driving the control loop
/// with samples fed through `ControlLoop::on_sampler_event`.
pub struct NoopScale;

impl gbw_traits::Scale for NoopScale {
    fn read(
        &mut self,
        _timeout: std::time::Duration,
    ) -> Result<i32, Box<dyn std::error::Error + Send + Sync>> {
        Err(Box::new(std::io::Error::other("noop scale")))
    }
}

/// In-memory settings store. Clones share contents, so a test can keep a
/// handle and inspect what the controller persisted.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: Arc<Mutex<BTreeMap<String, SettingValue>>>,
    writes: Arc<Mutex<Vec<String>>>,
    fail: bool,
}

impl MemoryStore {
    /// A store whose every operation errors.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn with(self, key: &str, value: SettingValue) -> Self {
        if let Ok(mut m) = self.values.lock() {
            m.insert(key.to_string(), value);
        }
        self
    }

    pub fn value(&self, key: &str) -> Option<SettingValue> {
        self.values.lock().ok().and_then(|m| m.get(key).copied())
    }

    /// Keys in write order, one entry per `put`.
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }

    /// Number of `put` calls for `key`.
    pub fn write_count(&self, key: &str) -> usize {
        self.writes().iter().filter(|k| k.as_str() == key).count()
    }
}

impl SettingsStore for MemoryStore {
    fn get(
        &self,
        key: &str,
    ) -> Result<Option<SettingValue>, Box<dyn std::error::Error + Send + Sync>> {
        if self.fail {
            return Err(Box::new(std::io::Error::other("store unavailable")));
        }
        Ok(self.value(key))
    }

    fn put(
        &mut self,
        key: &str,
        value: SettingValue,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if self.fail {
            return Err(Box::new(std::io::Error::other("store unavailable")));
        }
        if let Ok(mut m) = self.values.lock() {
            m.insert(key.to_string(), value);
        }
        if let Ok(mut w) = self.writes.lock() {
            w.push(key.to_string());
        }
        Ok(())
    }
}

/// Relay that records every level written. Clones share the log.
#[derive(Debug, Clone, Default)]
pub struct RecordingRelay {
    writes: Arc<Mutex<Vec<bool>>>,
    fail: bool,
}

impl RecordingRelay {
    /// A relay whose every write errors.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn writes(&self) -> Vec<bool> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }

    /// Last level written; `false` if never written.
    pub fn engaged(&self) -> bool {
        self.writes().last().copied().unwrap_or(false)
    }
}

impl gbw_traits::Relay for RecordingRelay {
    fn set(&mut self, engaged: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if self.fail {
            return Err(Box::new(std::io::Error::other("relay unavailable")));
        }
        if let Ok(mut w) = self.writes.lock() {
            w.push(engaged);
        }
        Ok(())
    }
}
