#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas, settings storage and calibration parsing for the grinder.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated. Every
//!   section is optional; an empty file yields the appliance defaults.
//! - `FileStore` is the TOML-file backed `SettingsStore` used on dev hosts and
//!   the Pi (written atomically).
//! - `SettingsPatch`/`SettingsView` are the configuration page's field contract.
//! - Calibration CSV loader enforces headers and performs a robust refit
//!   to reduce outlier influence before slope/intercept estimation.
use serde::Deserialize;

pub mod calibration;
pub mod patch;
pub mod store;

pub use calibration::{Calibration, CalibrationRow, load_calibration_csv};
pub use patch::{SettingsPatch, SettingsView};
pub use store::{FileStore, write_atomic};

/// BCM pin numbers.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Pins {
    pub hx711_dt: u8,
    pub hx711_sck: u8,
    pub relay: u8,
    /// Grind trigger button; absent when only cup detection is used.
    pub trigger: Option<u8>,
    pub encoder_a: u8,
    pub encoder_b: u8,
    pub encoder_button: u8,
}

impl Default for Pins {
    fn default() -> Self {
        Self {
            hx711_dt: 19,
            hx711_sck: 18,
            relay: 33,
            trigger: Some(25),
            encoder_a: 23,
            encoder_b: 32,
            encoder_button: 27,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SamplerCfg {
    pub sample_rate_hz: u32,
    /// Max wait for one HX711 conversion (ms).
    pub read_timeout_ms: u64,
    pub idle_reads: u8,
    pub dosing_reads: u8,
    pub deadband_g: f32,
    pub tare_reads: u8,
    pub tare_retries: u8,
    pub tare_backoff_ms: u64,
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

/// Kalman filter tuning.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FilterCfg {
    pub measurement_error: f32,
    pub estimate_error: f32,
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

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DosingCfg {
    pub control_hz: u32,
    pub cup_tolerance_g: f32,
    pub button_hold_ms: u64,
    /// Include the weight on the scale at start in the button-mode target.
    pub button_mode_includes_cup: bool,
    pub removed_below_g: f32,
    pub max_grind_ms: u64,
    pub stall_window_ms: u64,
    pub stall_min_gain_g: f32,
    pub settle_ms: u64,
    pub offset_deadband_g: f32,
    pub max_offset_g: f32,
    pub auto_offset: bool,
    pub failed_reset_g: f32,
    pub retare_interval_ms: u64,
    pub manual_tare_cooldown_ms: u64,
}

impl Default for DosingCfg {
    fn default() -> Self {
        Self {
            control_hz: 20,
            cup_tolerance_g: 5.0,
            button_hold_ms: 600,
            button_mode_includes_cup: true,
            removed_below_g: -20.0,
            max_grind_ms: 20_000,
            stall_window_ms: 2_000,
            stall_min_gain_g: 1.0,
            settle_ms: 1_500,
            offset_deadband_g: 0.3,
            max_offset_g: 5.0,
            auto_offset: true,
            failed_reset_g: 150.0,
            retare_interval_ms: 10_000,
            manual_tare_cooldown_ms: 30_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct InputCfg {
    pub bounce_ms: u64,
    pub click_grace_ms: u64,
    pub burst_clicks: u8,
    pub target_step_g: f32,
    pub target_min_g: f32,
    pub target_max_g: f32,
    pub offset_step_g: f32,
    pub sleep_step_ms: u64,
    pub sleep_min_ms: u64,
    pub sleep_max_ms: u64,
    pub min_cup_weight_g: f32,
    pub calibration_mass_g: f32,
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

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RelayCfg {
    /// Drive the pin high to engage the grinder. Boards differ; check yours.
    pub active_high: bool,
    /// Impulse mode pulse width (ms).
    pub pulse_ms: u64,
}

impl Default for RelayCfg {
    fn default() -> Self {
        Self {
            active_high: true,
            pulse_ms: 100,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StoreCfg {
    /// Persisted settings file.
    pub path: String,
}

impl Default for StoreCfg {
    fn default() -> Self {
        Self {
            path: "gbw_settings.toml".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Config {
    pub pins: Pins,
    pub sampler: SamplerCfg,
    pub filter: FilterCfg,
    pub dosing: DosingCfg,
    pub input: InputCfg,
    pub relay: RelayCfg,
    pub logging: Logging,
    pub store: StoreCfg,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

fn finite_nonneg(v: f32) -> bool {
    v.is_finite() && v >= 0.0
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Sampler
        let s = &self.sampler;
        if s.sample_rate_hz == 0 {
            eyre::bail!("sampler.sample_rate_hz must be > 0");
        }
        if s.sample_rate_hz > 80 {
            eyre::bail!("sampler.sample_rate_hz must be <= 80 (HX711 limit)");
        }
        if s.read_timeout_ms == 0 {
            eyre::bail!("sampler.read_timeout_ms must be >= 1");
        }
        if s.idle_reads == 0 || s.dosing_reads == 0 {
            eyre::bail!("sampler.idle_reads and sampler.dosing_reads must be >= 1");
        }
        if !finite_nonneg(s.deadband_g) {
            eyre::bail!("sampler.deadband_g must be finite and >= 0");
        }
        if s.tare_reads == 0 {
            eyre::bail!("sampler.tare_reads must be >= 1");
        }
        if s.tare_retries == 0 {
            eyre::bail!("sampler.tare_retries must be >= 1");
        }
        if s.stale_after_ms == 0 {
            eyre::bail!("sampler.stale_after_ms must be >= 1");
        }

        // Filter
        let f = &self.filter;
        if !(f.measurement_error.is_finite() && f.measurement_error > 0.0) {
            eyre::bail!("filter.measurement_error must be > 0");
        }
        if !(f.estimate_error.is_finite() && f.estimate_error > 0.0) {
            eyre::bail!("filter.estimate_error must be > 0");
        }
        if !finite_nonneg(f.process_noise) {
            eyre::bail!("filter.process_noise must be >= 0");
        }

        // Dosing
        let d = &self.dosing;
        if d.control_hz == 0 {
            eyre::bail!("dosing.control_hz must be > 0");
        }
        if !(d.cup_tolerance_g.is_finite() && d.cup_tolerance_g > 0.0) {
            eyre::bail!("dosing.cup_tolerance_g must be > 0");
        }
        if !(d.removed_below_g.is_finite() && d.removed_below_g < 0.0) {
            eyre::bail!("dosing.removed_below_g must be negative");
        }
        if d.max_grind_ms == 0 {
            eyre::bail!("dosing.max_grind_ms must be >= 1");
        }
        if d.stall_window_ms >= d.max_grind_ms {
            eyre::bail!("dosing.stall_window_ms must be < dosing.max_grind_ms");
        }
        if !finite_nonneg(d.stall_min_gain_g) {
            eyre::bail!("dosing.stall_min_gain_g must be >= 0");
        }
        if !finite_nonneg(d.offset_deadband_g) {
            eyre::bail!("dosing.offset_deadband_g must be >= 0");
        }
        if !finite_nonneg(d.max_offset_g) {
            eyre::bail!("dosing.max_offset_g must be >= 0");
        }
        if !(d.failed_reset_g.is_finite() && d.failed_reset_g > 5.0) {
            eyre::bail!("dosing.failed_reset_g must be > 5");
        }

        // Input
        let i = &self.input;
        if i.bounce_ms >= i.click_grace_ms {
            eyre::bail!("input.bounce_ms must be < input.click_grace_ms");
        }
        if i.burst_clicks < 3 {
            eyre::bail!("input.burst_clicks must be >= 3");
        }
        if !(i.target_min_g > 0.0 && i.target_min_g < i.target_max_g) {
            eyre::bail!("input.target_min_g must be > 0 and < input.target_max_g");
        }
        if !(i.target_step_g > 0.0 && i.offset_step_g > 0.0) {
            eyre::bail!("input.target_step_g and input.offset_step_g must be > 0");
        }
        if i.sleep_min_ms > i.sleep_max_ms {
            eyre::bail!("input.sleep_min_ms must be <= input.sleep_max_ms");
        }
        if !(i.calibration_mass_g.is_finite() && i.calibration_mass_g > 0.0) {
            eyre::bail!("input.calibration_mass_g must be > 0");
        }

        // Relay
        if self.relay.pulse_ms == 0 || self.relay.pulse_ms > 2_000 {
            eyre::bail!("relay.pulse_ms must be in [1, 2000]");
        }

        // Logging
        if let Some(r) = self.logging.rotation.as_deref()
            && !matches!(r, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        // Store
        if self.store.path.trim().is_empty() {
            eyre::bail!("store.path must not be empty");
        }

        Ok(())
    }
}
