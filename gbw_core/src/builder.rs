//! Builder for `ControlLoop`.
//!
//! Required pieces (relay, settings store) are checked at `try_build()`, which
//! also validates the runtime configuration before anything touches hardware.
use crate::config::{DosingCfg, GrinderCfg, InputCfg, SamplerCfg};
use crate::dosing::DoseController;
use crate::error::{BuildError, Result};
use crate::grinder::{GrindMode, Grinder};
use crate::history::WeightHistory;
use crate::input::InputController;
use crate::params::CalibrationParameters;
use crate::presentation::SnapshotCell;
use crate::runner::ControlLoop;
use crate::store::Persistence;
use gbw_traits::Relay;
use gbw_traits::clock::Clock;

pub struct ControlLoopBuilder<R: Relay, C: Clock + Clone> {
    clock: C,
    relay: Option<R>,
    store: Option<Persistence>,
    params: Option<CalibrationParameters>,
    sampler: SamplerCfg,
    dosing: DosingCfg,
    input: InputCfg,
    grinder: GrinderCfg,
    snapshots: Option<SnapshotCell>,
}

impl<R: Relay, C: Clock + Clone> ControlLoopBuilder<R, C> {
    pub(crate) fn new(clock: C) -> Self {
        Self {
            clock,
            relay: None,
            store: None,
            params: None,
            sampler: SamplerCfg::default(),
            dosing: DosingCfg::default(),
            input: InputCfg::default(),
            grinder: GrinderCfg::default(),
            snapshots: None,
        }
    }

    pub fn relay(mut self, relay: R) -> Self {
        self.relay = Some(relay);
        self
    }

    pub fn store(mut self, store: Persistence) -> Self {
        self.store = Some(store);
        self
    }

    /// Use these parameters instead of loading them from the store.
    pub fn params(mut self, params: CalibrationParameters) -> Self {
        self.params = Some(params);
        self
    }

    pub fn sampler_cfg(mut self, cfg: SamplerCfg) -> Self {
        self.sampler = cfg;
        self
    }

    pub fn dosing_cfg(mut self, cfg: DosingCfg) -> Self {
        self.dosing = cfg;
        self
    }

    pub fn input_cfg(mut self, cfg: InputCfg) -> Self {
        self.input = cfg;
        self
    }

    pub fn grinder_cfg(mut self, cfg: GrinderCfg) -> Self {
        self.grinder = cfg;
        self
    }

    pub fn snapshots(mut self, cell: SnapshotCell) -> Self {
        self.snapshots = Some(cell);
        self
    }

    pub fn try_build(self) -> Result<ControlLoop<R, C>> {
        let relay = self
            .relay
            .ok_or_else(|| eyre::Report::new(BuildError::MissingRelay))?;
        let store = self
            .store
            .ok_or_else(|| eyre::Report::new(BuildError::MissingStore))?;
        validate(&self.sampler, &self.dosing, &self.input)?;

        let params = match self.params {
            Some(p) => p,
            None => CalibrationParameters::load(&store, self.dosing.max_offset_g),
        };
        let grinder = Grinder::new(
            relay,
            self.clock.clone(),
            self.grinder,
            GrindMode::from_continuous(params.grind_continuous_mode),
            params.scale_mode,
        );
        let now = self.clock.now();
        let max_offset = self.dosing.max_offset_g;
        Ok(ControlLoop {
            dose: DoseController::new(self.dosing, grinder, now),
            input: InputController::new(self.input, max_offset),
            clock: self.clock,
            sampler_cfg: self.sampler,
            params,
            store,
            history: WeightHistory::new(),
            weight: 0.0,
            last_sample_at: None,
            sensor_ready: false,
            snapshots: self.snapshots.unwrap_or_default(),
        })
    }
}

fn invalid(msg: &'static str) -> eyre::Report {
    eyre::Report::new(BuildError::InvalidConfig(msg))
}

fn validate(sampler: &SamplerCfg, dosing: &DosingCfg, input: &InputCfg) -> Result<()> {
    if sampler.sample_rate_hz == 0 {
        return Err(invalid("sample_rate_hz must be > 0"));
    }
    if sampler.read_timeout_ms == 0 {
        return Err(invalid("read_timeout_ms must be >= 1"));
    }
    if sampler.deadband_g.is_sign_negative() || !sampler.deadband_g.is_finite() {
        return Err(invalid("deadband_g must be finite and >= 0"));
    }
    if dosing.control_hz == 0 {
        return Err(invalid("control_hz must be > 0"));
    }
    if dosing.cup_tolerance_g <= 0.0 {
        return Err(invalid("cup_tolerance_g must be > 0"));
    }
    if dosing.max_grind_ms == 0 {
        return Err(invalid("max_grind_ms must be > 0"));
    }
    if !(dosing.max_offset_g.is_finite() && dosing.max_offset_g >= 0.0) {
        return Err(invalid("max_offset_g must be finite and >= 0"));
    }
    if dosing.failed_reset_g <= dosing.empty_below_g {
        return Err(invalid("failed_reset_g must exceed empty_below_g"));
    }
    if input.target_min_g <= 0.0 || input.target_min_g >= input.target_max_g {
        return Err(invalid("target range must satisfy 0 < min < max"));
    }
    if input.sleep_min_ms > input.sleep_max_ms {
        return Err(invalid("sleep_min_ms must be <= sleep_max_ms"));
    }
    if input.burst_clicks < 3 {
        return Err(invalid("burst_clicks must be >= 3"));
    }
    if input.calibration_mass_g <= 0.0 {
        return Err(invalid("calibration_mass_g must be > 0"));
    }
    Ok(())
}
