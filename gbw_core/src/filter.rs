//! One-dimensional Kalman estimator used to smooth load-cell readings.
use crate::config::FilterCfg;

/// Scalar Kalman filter with constant measurement error and process noise.
///
/// Deterministic: the same measurement sequence from a fresh (or reset) filter
/// yields the same estimates.
#[derive(Debug, Clone)]
pub struct KalmanFilter {
    cfg: FilterCfg,
    estimate_error: f32,
    estimate: f32,
}

impl KalmanFilter {
    pub fn new(cfg: FilterCfg) -> Self {
        Self {
            cfg,
            estimate_error: cfg.estimate_error,
            estimate: 0.0,
        }
    }

    /// Fold one measurement into the estimate and return the new estimate.
    pub fn update(&mut self, measurement: f32) -> f32 {
        let denom = self.estimate_error + self.cfg.measurement_error;
        let gain = if denom > 0.0 {
            self.estimate_error / denom
        } else {
            1.0
        };
        let previous = self.estimate;
        self.estimate += gain * (measurement - self.estimate);
        self.estimate_error = (1.0 - gain) * self.estimate_error
            + (previous - self.estimate).abs() * self.cfg.process_noise;
        self.estimate
    }

    pub fn estimate(&self) -> f32 {
        self.estimate
    }

    /// Forget all history. Called on every tare.
    pub fn reset(&mut self) {
        self.estimate = 0.0;
        self.estimate_error = self.cfg.estimate_error;
    }
}
