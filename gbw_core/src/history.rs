//! Fixed-capacity, time-indexed history of filtered weight estimates.
//!
//! The control loop owns the only `WeightHistory`; samples arrive in timestamp
//! order from the sampler thread. Window queries look back from a caller
//! supplied `now` and simply ignore whatever has already been evicted, so a
//! window wider than the retained span is not an error.
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// One filtered estimate in grams.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightSample {
    pub value: f32,
    pub at: Instant,
}

#[derive(Debug, Clone)]
pub struct WeightHistory {
    buf: VecDeque<WeightSample>,
}

impl Default for WeightHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl WeightHistory {
    /// Number of samples retained; ~10 s at the default sampling rate.
    pub const CAPACITY: usize = 100;

    pub fn new() -> Self {
        Self {
            buf: VecDeque::with_capacity(Self::CAPACITY),
        }
    }

    /// Append a sample, evicting the oldest when full.
    pub fn push(&mut self, sample: WeightSample) {
        if self.buf.len() == Self::CAPACITY {
            self.buf.pop_front();
        }
        self.buf.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn latest(&self) -> Option<WeightSample> {
        self.buf.back().copied()
    }

    /// True once the retained samples reach back at least `window` from `now`.
    pub fn spans(&self, now: Instant, window: Duration) -> bool {
        self.buf
            .front()
            .is_some_and(|s| now.saturating_duration_since(s.at) >= window)
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &WeightSample> {
        self.buf.iter()
    }

    // Newest first; stops at the first sample outside the window.
    fn window(&self, now: Instant, window: Duration) -> impl Iterator<Item = f32> + '_ {
        self.buf
            .iter()
            .rev()
            .take_while(move |s| now.saturating_duration_since(s.at) <= window)
            .map(|s| s.value)
    }

    pub fn average_over(&self, now: Instant, window: Duration) -> Option<f32> {
        let (sum, n) = self
            .window(now, window)
            .fold((0.0_f64, 0_u32), |(sum, n), v| (sum + f64::from(v), n + 1));
        (n > 0).then(|| (sum / f64::from(n)) as f32)
    }

    pub fn min_over(&self, now: Instant, window: Duration) -> Option<f32> {
        self.window(now, window).reduce(f32::min)
    }

    pub fn max_over(&self, now: Instant, window: Duration) -> Option<f32> {
        self.window(now, window).reduce(f32::max)
    }

    /// Newest sample strictly older than `age` relative to `now`.
    pub fn first_older_than(&self, now: Instant, age: Duration) -> Option<WeightSample> {
        self.buf
            .iter()
            .rev()
            .find(|s| now.saturating_duration_since(s.at) > age)
            .copied()
    }
}
