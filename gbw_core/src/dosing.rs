//! Dosing state machine.
//!
//! ```text
//!   Idle ──cup placed / trigger held──▶ Grinding ──target reached──▶ Finished
//!    ▲                                     │                          │
//!    │                              fault  ▼                          │
//!    └──── ≥150 g on scale / user ─── Failed(reason)    weight < 5 g ─┘
//! ```
//!
//! One transition function per state, driven once per control tick with the
//! latest weight and the history window. Every path out of `Grinding` stops
//! the grinder before the new state is entered.
use crate::config::DosingCfg;
use crate::error::FaultReason;
use crate::grinder::{GrindMode, Grinder};
use crate::history::WeightHistory;
use crate::params::{CalibrationParameters, GrindTrigger, clamp_offset, keys};
use crate::sampler::Averaging;
use crate::store::Persistence;
use gbw_traits::clock::Clock;
use gbw_traits::{Relay, SettingValue};
use std::time::{Duration, Instant};

/// Per-dose bookkeeping. Created when leaving Idle, dropped on return to Idle.
#[derive(Debug, Clone, PartialEq)]
pub struct DoseSession {
    /// Weight on the scale when the grind began.
    pub cup_weight_empty: f32,
    /// Whether `cup_weight_empty` is part of the target.
    pub include_cup: bool,
    /// `None` until the grind clock starts (deferred in scale mode).
    pub started_at: Option<Instant>,
    pub finished_at: Option<Instant>,
    pub target_weight: f32,
    /// Offset applied to this dose (0 in scale mode).
    pub target_offset: f32,
    /// Set while this dose still owes an offset self-calibration pass.
    pub pending_offset_adjustment: bool,
    pub trigger: GrindTrigger,
}

impl DoseSession {
    fn base(&self) -> f32 {
        if self.include_cup {
            self.cup_weight_empty
        } else {
            0.0
        }
    }

    /// Reading at which the grinder is stopped.
    pub fn target_total(&self) -> f32 {
        self.base() + self.target_weight + self.target_offset
    }

    /// Reading the dose should settle at.
    pub fn desired_total(&self) -> f32 {
        self.base() + self.target_weight
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DoseState {
    Idle,
    Grinding(DoseSession),
    Finished(DoseSession),
    Failed(FaultReason),
}

impl DoseState {
    pub fn name(&self) -> &'static str {
        match self {
            DoseState::Idle => "idle",
            DoseState::Grinding(_) => "grinding",
            DoseState::Finished(_) => "finished",
            DoseState::Failed(_) => "failed",
        }
    }

    pub fn session(&self) -> Option<&DoseSession> {
        match self {
            DoseState::Grinding(s) | DoseState::Finished(s) => Some(s),
            DoseState::Idle | DoseState::Failed(_) => None,
        }
    }
}

/// Everything the state machine reads in one tick.
#[derive(Debug, Clone, Copy)]
pub struct TickInput<'a> {
    pub now: Instant,
    /// Latest filtered weight.
    pub weight: f32,
    /// Sampler delivered a fresh sample recently.
    pub scale_ready: bool,
    pub history: &'a WeightHistory,
    pub trigger_pressed: bool,
    pub menu_open: bool,
}

/// Requests for the sampler produced by one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DoseEffects {
    pub request_tare: bool,
    pub averaging: Option<Averaging>,
}

pub struct DoseController<R: Relay, C: Clock> {
    cfg: DosingCfg,
    grinder: Grinder<R, C>,
    state: DoseState,
    trigger_since: Option<Instant>,
    trigger_latched: bool,
    last_significant_change_at: Instant,
    last_tare_at: Option<Instant>,
    last_manual_tare_at: Option<Instant>,
    retare_pending: bool,
    settle_notice_logged: bool,
    completed: u64,
}

fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

impl<R: Relay, C: Clock> DoseController<R, C> {
    pub fn new(cfg: DosingCfg, grinder: Grinder<R, C>, now: Instant) -> Self {
        Self {
            cfg,
            grinder,
            state: DoseState::Idle,
            trigger_since: None,
            trigger_latched: false,
            last_significant_change_at: now,
            last_tare_at: None,
            last_manual_tare_at: None,
            retare_pending: false,
            settle_notice_logged: false,
            completed: 0,
        }
    }

    pub fn state(&self) -> &DoseState {
        &self.state
    }

    pub fn cfg(&self) -> &DosingCfg {
        &self.cfg
    }

    pub fn grinder(&self) -> &Grinder<R, C> {
        &self.grinder
    }

    /// Doses that reached `Finished`.
    pub fn completed(&self) -> u64 {
        self.completed
    }

    pub fn last_significant_change_at(&self) -> Instant {
        self.last_significant_change_at
    }

    /// Treat user input as activity for sleep purposes.
    pub fn note_activity(&mut self, now: Instant) {
        self.last_significant_change_at = now;
    }

    /// A user-requested tare was issued; suppresses automatic retare for a while.
    pub fn note_manual_tare(&mut self, now: Instant) {
        self.last_manual_tare_at = Some(now);
    }

    /// Result of a tare reported by the sampler.
    pub fn on_tared(&mut self, ok: bool, at: Instant) {
        self.retare_pending = false;
        if ok {
            self.last_tare_at = Some(at);
        }
    }

    /// Explicit user acknowledgement of a fault.
    pub fn clear_fault(&mut self) -> bool {
        if let DoseState::Failed(reason) = self.state {
            tracing::info!(reason = reason.as_str(), "fault acknowledged");
            self.state = DoseState::Idle;
            return true;
        }
        false
    }

    /// Stop the grinder no matter what state we are in. Used on shutdown.
    pub fn shutdown(&mut self) {
        if let Err(e) = self.grinder.stop() {
            tracing::warn!(error = %e, "grinder stop failed during shutdown");
        }
        if matches!(self.state, DoseState::Grinding(_)) {
            self.state = DoseState::Idle;
        }
    }

    /// Advance the state machine by one tick.
    pub fn tick(
        &mut self,
        input: &TickInput<'_>,
        params: &mut CalibrationParameters,
        store: &Persistence,
    ) -> DoseEffects {
        self.grinder
            .set_mode(GrindMode::from_continuous(params.grind_continuous_mode));
        self.grinder.set_scale_only(params.scale_mode);

        let mut fx = DoseEffects::default();
        self.track_activity(input);

        let was_grinding = matches!(self.state, DoseState::Grinding(_));
        let state = std::mem::replace(&mut self.state, DoseState::Idle);
        self.state = match state {
            DoseState::Idle => self.idle(input, params, &mut fx),
            DoseState::Grinding(s) => self.grinding(s, input),
            DoseState::Finished(s) => self.finished(s, input, params, store),
            DoseState::Failed(r) => self.failed(r, input),
        };
        let is_grinding = matches!(self.state, DoseState::Grinding(_));

        if !is_grinding && self.grinder.is_running() {
            self.stop_grinder();
        }
        if is_grinding != was_grinding {
            fx.averaging = Some(if is_grinding {
                Averaging::Dosing
            } else {
                Averaging::Idle
            });
        }
        fx
    }

    fn track_activity(&mut self, input: &TickInput<'_>) {
        if let Some(avg) = input.history.average_over(input.now, ms(self.cfg.retare_window_ms))
            && (avg - input.weight).abs() > self.cfg.significant_change_g
        {
            self.last_significant_change_at = input.now;
        }
    }

    fn maybe_retare(&mut self, input: &TickInput<'_>, fx: &mut DoseEffects) {
        if self.retare_pending {
            return;
        }
        let since = |t: Option<Instant>| t.map(|t| input.now.saturating_duration_since(t));
        if since(self.last_tare_at).is_some_and(|d| d <= ms(self.cfg.retare_interval_ms)) {
            return;
        }
        if since(self.last_manual_tare_at).is_some_and(|d| d < ms(self.cfg.manual_tare_cooldown_ms)) {
            return;
        }
        let Some(avg) = input.history.average_over(input.now, ms(self.cfg.retare_window_ms)) else {
            return;
        };
        if avg.abs() > self.cfg.drift_min_g
            && avg < self.cfg.drift_max_g
            && input.weight < self.cfg.drift_max_g
        {
            tracing::info!(avg, "zero drift detected; requesting retare");
            self.retare_pending = true;
            fx.request_tare = true;
        }
    }

    fn idle(
        &mut self,
        input: &TickInput<'_>,
        params: &CalibrationParameters,
        fx: &mut DoseEffects,
    ) -> DoseState {
        self.maybe_retare(input, fx);

        let session = match params.grind_trigger {
            GrindTrigger::Cup => {
                // Button state is irrelevant here; forget any half-press.
                self.trigger_since = None;
                self.trigger_latched = false;
                self.cup_detected(input, params)
            }
            GrindTrigger::Button => self.button_held(input, params),
        };
        let Some(session) = session else {
            return DoseState::Idle;
        };
        if input.menu_open {
            return DoseState::Idle;
        }

        tracing::info!(
            trigger = ?session.trigger,
            cup = session.cup_weight_empty,
            target_total = session.target_total(),
            "grinding started"
        );
        if let Err(e) = self.grinder.start() {
            tracing::error!(error = %e, "grinder did not start");
            return DoseState::Failed(FaultReason::Actuator);
        }
        self.settle_notice_logged = false;
        DoseState::Grinding(session)
    }

    fn new_session(
        &self,
        input: &TickInput<'_>,
        params: &CalibrationParameters,
        trigger: GrindTrigger,
        cup_weight_empty: f32,
        include_cup: bool,
    ) -> DoseSession {
        DoseSession {
            cup_weight_empty,
            include_cup,
            started_at: (!params.scale_mode).then_some(input.now),
            finished_at: None,
            target_weight: params.target_weight,
            target_offset: if params.scale_mode { 0.0 } else { params.offset },
            pending_offset_adjustment: !params.scale_mode,
            trigger,
        }
    }

    fn cup_detected(
        &self,
        input: &TickInput<'_>,
        params: &CalibrationParameters,
    ) -> Option<DoseSession> {
        let window = ms(self.cfg.cup_window_ms);
        if !input.history.spans(input.now, window) {
            return None;
        }
        let lo = input.history.min_over(input.now, window)?;
        let hi = input.history.max_over(input.now, window)?;
        let tol = self.cfg.cup_tolerance_g;
        if (lo - params.cup_weight).abs() > tol || (hi - params.cup_weight).abs() > tol {
            return None;
        }
        let cup = input
            .history
            .average_over(input.now, ms(self.cfg.cup_average_ms))?;
        Some(self.new_session(input, params, GrindTrigger::Cup, cup, true))
    }

    fn button_held(
        &mut self,
        input: &TickInput<'_>,
        params: &CalibrationParameters,
    ) -> Option<DoseSession> {
        if !input.trigger_pressed {
            self.trigger_since = None;
            self.trigger_latched = false;
            return None;
        }
        let since = *self.trigger_since.get_or_insert(input.now);
        if self.trigger_latched
            || input.now.saturating_duration_since(since) < ms(self.cfg.button_hold_ms)
            || input.menu_open
        {
            return None;
        }
        self.trigger_latched = true;
        Some(self.new_session(
            input,
            params,
            GrindTrigger::Button,
            input.weight,
            self.cfg.button_mode_includes_cup,
        ))
    }

    fn fail(&mut self, reason: FaultReason, input: &TickInput<'_>) -> DoseState {
        self.stop_grinder();
        tracing::warn!(reason = reason.as_str(), weight = input.weight, "grinding failed");
        DoseState::Failed(reason)
    }

    fn stop_grinder(&mut self) {
        if let Err(e) = self.grinder.stop() {
            tracing::error!(error = %e, "grinder stop failed");
        }
    }

    fn grinding(&mut self, mut s: DoseSession, input: &TickInput<'_>) -> DoseState {
        let now = input.now;
        let gbw = s.started_at.is_some() && !self.grinder.scale_only();

        if input.weight <= self.cfg.removed_below_g {
            return self.fail(FaultReason::CupRemoved, input);
        }
        if !input.scale_ready {
            return self.fail(FaultReason::SensorLost, input);
        }
        if s.started_at.is_none() {
            if input.weight - s.cup_weight_empty >= self.cfg.timer_start_g {
                tracing::debug!("grind timer started");
                s.started_at = Some(now);
            }
            return DoseState::Grinding(s);
        }
        if gbw {
            let elapsed = s
                .started_at
                .map_or(Duration::ZERO, |t| now.saturating_duration_since(t));
            if elapsed > ms(self.cfg.max_grind_ms) {
                return self.fail(FaultReason::Timeout, input);
            }
            let stall = ms(self.cfg.stall_window_ms);
            if elapsed > stall
                && let Some(old) = input.history.first_older_than(now, stall)
                && input.weight - old.value < self.cfg.stall_min_gain_g
            {
                return self.fail(FaultReason::NoIncrease, input);
            }
            if let Some(lo) = input.history.min_over(now, ms(self.cfg.finish_window_ms))
                && lo < s.cup_weight_empty - self.cfg.cup_tolerance_g
            {
                return self.fail(FaultReason::CupLifted, input);
            }
        }
        if let Some(hi) = input.history.max_over(now, ms(self.cfg.finish_window_ms))
            && hi >= s.target_total()
        {
            self.stop_grinder();
            s.finished_at = Some(now);
            self.completed += 1;
            tracing::info!(weight = hi, target_total = s.target_total(), "grinding finished");
            return DoseState::Finished(s);
        }
        DoseState::Grinding(s)
    }

    fn finished(
        &mut self,
        mut s: DoseSession,
        input: &TickInput<'_>,
        params: &mut CalibrationParameters,
        store: &Persistence,
    ) -> DoseState {
        if input.weight < self.cfg.empty_below_g {
            tracing::debug!("cup removed; back to idle");
            return DoseState::Idle;
        }
        let since_finish = s
            .finished_at
            .map_or(Duration::ZERO, |t| input.now.saturating_duration_since(t));

        if s.pending_offset_adjustment
            && since_finish > ms(self.cfg.settle_ms)
            && let Some(actual) = input
                .history
                .average_over(input.now, ms(self.cfg.settle_average_ms))
        {
            s.pending_offset_adjustment = false;
            self.calibrate_offset(&s, actual, params, store);
        }

        if since_finish > ms(self.cfg.settle_notice_ms) && !self.settle_notice_logged {
            self.settle_notice_logged = true;
            tracing::info!(weight = input.weight, "waiting for cup removal");
        }
        DoseState::Finished(s)
    }

    // One pass per dose: nudge the offset by the settled error and count the shot.
    fn calibrate_offset(
        &mut self,
        s: &DoseSession,
        actual: f32,
        params: &mut CalibrationParameters,
        store: &Persistence,
    ) {
        let error = s.desired_total() - actual;
        let mut batch = Vec::with_capacity(2);
        if self.cfg.auto_offset && error.abs() > self.cfg.offset_deadband_g {
            let before = params.offset;
            params.offset = clamp_offset(before + error, params.target_weight, self.cfg.max_offset_g);
            tracing::info!(before, after = params.offset, error, actual, "offset adjusted");
            batch.push((keys::OFFSET, SettingValue::Float(f64::from(params.offset))));
        } else {
            tracing::debug!(error, actual, "offset within deadband");
        }
        params.shot_count = params.shot_count.saturating_add(1);
        batch.push((keys::SHOT_COUNT, SettingValue::UInt(params.shot_count)));
        store.save(&batch);
    }

    fn failed(&mut self, reason: FaultReason, input: &TickInput<'_>) -> DoseState {
        if input.weight >= self.cfg.failed_reset_g {
            tracing::info!(reason = reason.as_str(), "fault reset by load");
            return DoseState::Idle;
        }
        DoseState::Failed(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(include_cup: bool) -> DoseSession {
        DoseSession {
            cup_weight_empty: 70.0,
            include_cup,
            started_at: None,
            finished_at: None,
            target_weight: 18.0,
            target_offset: -2.5,
            pending_offset_adjustment: true,
            trigger: GrindTrigger::Cup,
        }
    }

    #[test]
    fn totals_include_cup_when_asked() {
        assert_eq!(session(true).target_total(), 85.5);
        assert_eq!(session(true).desired_total(), 88.0);
        assert_eq!(session(false).target_total(), 15.5);
        assert_eq!(session(false).desired_total(), 18.0);
    }

    #[test]
    fn state_names_are_stable() {
        assert_eq!(DoseState::Idle.name(), "idle");
        assert_eq!(DoseState::Failed(FaultReason::Timeout).name(), "failed");
        assert!(DoseState::Grinding(session(true)).session().is_some());
    }
}
