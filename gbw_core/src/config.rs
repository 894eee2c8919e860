//! Runtime configuration structs for the sampler, controllers and actuator.
//!
//! These are separate from the TOML-deserialized config in `gbw_config`; see
//! `conversions` for the bridge. Defaults match the appliance firmware.

/// Sampler thread configuration.
#[derive(Debug, Clone)]
pub struct SamplerCfg {
    /// Sampling rate in Hz.
    pub sample_rate_hz: u32,
    /// Max wait for one ADC conversion (ms).
    pub read_timeout_ms: u64,
    /// Raw reads averaged per estimate while idle.
    pub idle_reads: u8,
    /// Raw reads averaged per estimate while grinding.
    pub dosing_reads: u8,
    /// Estimates with `|v| < deadband_g` are reported as exactly 0.
    pub deadband_g: f32,
    /// Raw reads averaged to capture a new zero.
    pub tare_reads: u8,
    /// Tare attempts before reporting failure.
    pub tare_retries: u8,
    /// Sleep between failed tare attempts (ms).
    pub tare_backoff_ms: u64,
    /// A sample older than this is considered stale by the control loop (ms).
    pub stale_after_ms: u64,
}

impl Default for SamplerCfg {
    fn default() -> Self {
        Self {
            sample_rate_hz: 10,
            read_timeout_ms: 300,
            idle_reads: 5,
            dosing_reads: 2,
            deadband_g: 3.0,
            tare_reads: 20,
            tare_retries: 3,
            tare_backoff_ms: 20,
            stale_after_ms: 1_000,
        }
    }
}

/// Kalman estimator tuning. Fixed for the lifetime of a filter.
#[derive(Debug, Clone, Copy)]
pub struct FilterCfg {
    /// Measurement uncertainty.
    pub measurement_error: f32,
    /// Initial estimate uncertainty.
    pub estimate_error: f32,
    /// Process noise.
    pub process_noise: f32,
}

impl Default for FilterCfg {
    fn default() -> Self {
        Self {
            measurement_error: 0.02,
            estimate_error: 0.02,
            process_noise: 0.01,
        }
    }
}

/// Dosing state machine thresholds.
#[derive(Debug, Clone)]
pub struct DosingCfg {
    /// Control loop rate in Hz.
    pub control_hz: u32,
    /// Cup detection: trailing min and max must lie within this of the cup weight.
    pub cup_tolerance_g: f32,
    /// Trailing window inspected for cup detection (ms).
    pub cup_window_ms: u64,
    /// Window averaged to capture the empty cup weight (ms).
    pub cup_average_ms: u64,
    /// Trigger must be held this long to start a grind in button mode (ms).
    pub button_hold_ms: u64,
    /// Whether the button-mode target includes the weight on the scale at start.
    pub button_mode_includes_cup: bool,
    /// Trailing window whose max is compared against the target (ms).
    pub finish_window_ms: u64,
    /// A reading at or below this means the cup was taken away (g).
    pub removed_below_g: f32,
    /// Hard cap on a single grind (ms).
    pub max_grind_ms: u64,
    /// Stall detection window (ms).
    pub stall_window_ms: u64,
    /// Minimum gain across the stall window (g).
    pub stall_min_gain_g: f32,
    /// Scale/timer mode: grind clock starts once weight rises this far above the cup (g).
    pub timer_start_g: f32,
    /// Finished returns to idle when the scale reads below this (g).
    pub empty_below_g: f32,
    /// Delay after finishing before the settled weight is measured (ms).
    pub settle_ms: u64,
    /// After this long in Finished a cup-removal notice is logged once (ms).
    pub settle_notice_ms: u64,
    /// Window averaged to measure the settled weight (ms).
    pub settle_average_ms: u64,
    /// Offset errors within this band are ignored (g).
    pub offset_deadband_g: f32,
    /// Largest magnitude the learned offset may take (g).
    pub max_offset_g: f32,
    /// Learn the offset after each dose.
    pub auto_offset: bool,
    /// A Failed state is cleared once this much weight is on the scale (g).
    pub failed_reset_g: f32,
    /// Minimum time between tares before an automatic one is considered (ms).
    pub retare_interval_ms: u64,
    /// No automatic tare this soon after a manual one (ms).
    pub manual_tare_cooldown_ms: u64,
    /// Window averaged to detect zero drift (ms).
    pub retare_window_ms: u64,
    /// Drift band: retare when `min < |avg|` and `avg < max`.
    pub drift_min_g: f32,
    pub drift_max_g: f32,
    /// A change this large versus the 10 s average counts as activity (g).
    pub significant_change_g: f32,
}

impl Default for DosingCfg {
    fn default() -> Self {
        Self {
            control_hz: 20,
            cup_tolerance_g: 5.0,
            cup_window_ms: 1_000,
            cup_average_ms: 500,
            button_hold_ms: 600,
            button_mode_includes_cup: true,
            finish_window_ms: 200,
            removed_below_g: -20.0,
            max_grind_ms: 20_000,
            stall_window_ms: 2_000,
            stall_min_gain_g: 1.0,
            timer_start_g: 0.1,
            empty_below_g: 5.0,
            settle_ms: 1_500,
            settle_notice_ms: 5_000,
            settle_average_ms: 500,
            offset_deadband_g: 0.3,
            max_offset_g: 5.0,
            auto_offset: true,
            failed_reset_g: 150.0,
            retare_interval_ms: 10_000,
            manual_tare_cooldown_ms: 30_000,
            retare_window_ms: 10_000,
            drift_min_g: 0.2,
            drift_max_g: 3.0,
            significant_change_g: 5.0,
        }
    }
}

/// Rotary encoder and menu behaviour.
#[derive(Debug, Clone)]
pub struct InputCfg {
    /// Clicks closer than this are contact bounce and dropped (ms).
    pub bounce_ms: u64,
    /// A single click commits after this long without another click (ms).
    pub click_grace_ms: u64,
    /// Clicks needed inside the grace window to toggle debug mode.
    pub burst_clicks: u8,
    /// Target weight change per detent (g).
    pub target_step_g: f32,
    pub target_min_g: f32,
    pub target_max_g: f32,
    /// Offset change per detent (g).
    pub offset_step_g: f32,
    /// Sleep timeout change per detent (ms).
    pub sleep_step_ms: u64,
    pub sleep_min_ms: u64,
    pub sleep_max_ms: u64,
    /// Cup weight confirm needs more than this on the scale (g).
    pub min_cup_weight_g: f32,
    /// Known mass used by the Calibrate entry (g).
    pub calibration_mass_g: f32,
    /// Main-screen target edits are persisted after this much encoder quiet (ms).
    pub save_delay_ms: u64,
}

impl Default for InputCfg {
    fn default() -> Self {
        Self {
            bounce_ms: 40,
            click_grace_ms: 300,
            burst_clicks: 4,
            target_step_g: 0.1,
            target_min_g: 1.0,
            target_max_g: 100.0,
            offset_step_g: 0.1,
            sleep_step_ms: 5_000,
            sleep_min_ms: 10_000,
            sleep_max_ms: 600_000,
            min_cup_weight_g: 30.0,
            calibration_mass_g: 100.0,
            save_delay_ms: 1_500,
        }
    }
}

/// Grinder relay timing.
#[derive(Debug, Clone, Copy)]
pub struct GrinderCfg {
    /// Impulse mode pulse width (ms).
    pub pulse_ms: u64,
}

impl Default for GrinderCfg {
    fn default() -> Self {
        Self { pulse_ms: 100 }
    }
}
