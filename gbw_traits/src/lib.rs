//! Hardware and persistence seams for the grind-by-weight controller.
//!
//! Everything the control core touches in the outside world goes through one of
//! these traits: the load-cell ADC (`Scale`), the grinder relay (`Relay`), the
//! rotary encoder and trigger button (`Controls`), and the key/value settings
//! backend (`SettingsStore`).
pub mod clock;

pub use clock::{Clock, MonotonicClock, TestClock};

pub trait Scale {
    /// Block until one raw ADC conversion is available or `timeout` expires.
    fn read(
        &mut self,
        timeout: std::time::Duration,
    ) -> Result<i32, Box<dyn std::error::Error + Send + Sync>>;
}

/// Digital output driving the grinder.
///
/// `engaged` is the logical state; mapping it to an electrical level is the
/// implementation's job since relay boards differ in polarity.
pub trait Relay {
    fn set(&mut self, engaged: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Raw user input, already decoded from quadrature/button edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    /// Encoder moved by this many detents (positive = clockwise).
    Rotate(i32),
    /// Encoder push button clicked.
    Click,
}

pub trait Controls {
    /// Next pending encoder event, if any. Never blocks.
    fn poll_event(&mut self) -> Option<InputEvent>;
    /// Current level of the grind trigger button.
    fn trigger_pressed(&mut self) -> bool;
}

/// Typed value held by a [`SettingsStore`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SettingValue {
    Float(f64),
    Bool(bool),
    UInt(u32),
    Int(i64),
}

impl SettingValue {
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            SettingValue::Float(v) => Some(v),
            SettingValue::UInt(v) => Some(f64::from(v)),
            SettingValue::Int(v) => Some(v as f64),
            SettingValue::Bool(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            SettingValue::Bool(b) => Some(b),
            SettingValue::UInt(v) => Some(v != 0),
            SettingValue::Int(v) => Some(v != 0),
            SettingValue::Float(_) => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match *self {
            SettingValue::UInt(v) => Some(v),
            SettingValue::Int(v) => u32::try_from(v).ok(),
            SettingValue::Float(_) | SettingValue::Bool(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            SettingValue::Int(v) => Some(v),
            SettingValue::UInt(v) => Some(i64::from(v)),
            SettingValue::Float(_) | SettingValue::Bool(_) => None,
        }
    }
}

/// Durable key/value persistence.
///
/// Implementations are not required to be reentrant; callers serialize access.
pub trait SettingsStore {
    fn get(
        &self,
        key: &str,
    ) -> Result<Option<SettingValue>, Box<dyn std::error::Error + Send + Sync>>;
    fn put(
        &mut self,
        key: &str,
        value: SettingValue,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    /// Make buffered writes durable. Stores that write through can keep the default.
    fn flush(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
}
