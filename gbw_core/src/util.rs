//! Tick periods for the sampler, control loop and display refresh.

use std::time::Duration;

/// Tick period of a loop running at `hz`; 0 Hz is treated as 1 Hz.
pub fn tick_period(hz: u32) -> Duration {
    Duration::from_micros(period_us(hz))
}

#[inline]
pub fn period_us(hz: u32) -> u64 {
    (1_000_000 / u64::from(hz.max(1))).max(1)
}

/// Whole milliseconds, never below 1.
#[inline]
pub fn period_ms(hz: u32) -> u64 {
    (1_000 / u64::from(hz.max(1))).max(1)
}
