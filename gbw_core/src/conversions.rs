//! `From` implementations bridging `gbw_config` types to `gbw_core` types.
//!
//! Thresholds the file does not expose keep their runtime defaults.

use crate::config::{DosingCfg, FilterCfg, GrinderCfg, InputCfg, SamplerCfg};
use crate::runner::RunCfg;

// ── SamplerCfg ───────────────────────────────────────────────────────────────

impl From<&gbw_config::SamplerCfg> for SamplerCfg {
    fn from(c: &gbw_config::SamplerCfg) -> Self {
        Self {
            sample_rate_hz: c.sample_rate_hz,
            read_timeout_ms: c.read_timeout_ms,
            idle_reads: c.idle_reads,
            dosing_reads: c.dosing_reads,
            deadband_g: c.deadband_g,
            tare_reads: c.tare_reads,
            tare_retries: c.tare_retries,
            tare_backoff_ms: c.tare_backoff_ms,
            stale_after_ms: c.stale_after_ms,
        }
    }
}

// ── FilterCfg ────────────────────────────────────────────────────────────────

impl From<&gbw_config::FilterCfg> for FilterCfg {
    fn from(c: &gbw_config::FilterCfg) -> Self {
        Self {
            measurement_error: c.measurement_error,
            estimate_error: c.estimate_error,
            process_noise: c.process_noise,
        }
    }
}

// ── DosingCfg ────────────────────────────────────────────────────────────────

impl From<&gbw_config::DosingCfg> for DosingCfg {
    fn from(c: &gbw_config::DosingCfg) -> Self {
        Self {
            control_hz: c.control_hz,
            cup_tolerance_g: c.cup_tolerance_g,
            button_hold_ms: c.button_hold_ms,
            button_mode_includes_cup: c.button_mode_includes_cup,
            removed_below_g: c.removed_below_g,
            max_grind_ms: c.max_grind_ms,
            stall_window_ms: c.stall_window_ms,
            stall_min_gain_g: c.stall_min_gain_g,
            settle_ms: c.settle_ms,
            offset_deadband_g: c.offset_deadband_g,
            max_offset_g: c.max_offset_g,
            auto_offset: c.auto_offset,
            failed_reset_g: c.failed_reset_g,
            retare_interval_ms: c.retare_interval_ms,
            manual_tare_cooldown_ms: c.manual_tare_cooldown_ms,
            ..Self::default()
        }
    }
}

// ── InputCfg ─────────────────────────────────────────────────────────────────

impl From<&gbw_config::InputCfg> for InputCfg {
    fn from(c: &gbw_config::InputCfg) -> Self {
        Self {
            bounce_ms: c.bounce_ms,
            click_grace_ms: c.click_grace_ms,
            burst_clicks: c.burst_clicks,
            target_step_g: c.target_step_g,
            target_min_g: c.target_min_g,
            target_max_g: c.target_max_g,
            offset_step_g: c.offset_step_g,
            sleep_step_ms: c.sleep_step_ms,
            sleep_min_ms: c.sleep_min_ms,
            sleep_max_ms: c.sleep_max_ms,
            min_cup_weight_g: c.min_cup_weight_g,
            calibration_mass_g: c.calibration_mass_g,
            save_delay_ms: c.save_delay_ms,
        }
    }
}

// ── GrinderCfg ───────────────────────────────────────────────────────────────

impl From<&gbw_config::RelayCfg> for GrinderCfg {
    fn from(c: &gbw_config::RelayCfg) -> Self {
        Self {
            pulse_ms: c.pulse_ms,
        }
    }
}

// ── RunCfg ───────────────────────────────────────────────────────────────────

impl From<&gbw_config::Config> for RunCfg {
    fn from(c: &gbw_config::Config) -> Self {
        Self {
            sampler: (&c.sampler).into(),
            filter: (&c.filter).into(),
            dosing: (&c.dosing).into(),
            input: (&c.input).into(),
            grinder: (&c.relay).into(),
            ..Self::default()
        }
    }
}
