//! Control loop: glues sampler events, user input and the dose state machine.
//!
//! `ControlLoop` is the single owner of the weight history, the parameters and
//! both controllers. It is clock-driven and has no threads of its own, so tests
//! step it tick by tick with a `TestClock`. `run` wires it to a sampler thread
//! and real hardware and paces it at the configured control rate.
use crate::builder::ControlLoopBuilder;
use crate::config::{DosingCfg, FilterCfg, GrinderCfg, InputCfg, SamplerCfg};
use crate::dosing::{DoseController, DoseEffects, DoseState, TickInput};
use crate::error::{FaultReason, Result};
use crate::history::WeightHistory;
use crate::input::{InputContext, InputController, InputEffects, UiState};
use crate::params::{CalibrationParameters, GrindTrigger};
use crate::presentation::{Presentation, ScaleStatus, Snapshot, SnapshotCell};
use crate::sampler::{Sampler, SamplerCommand, SamplerEvent, WeightSampler};
use crate::store::Persistence;
use gbw_traits::clock::{Clock, MonotonicClock};
use gbw_traits::{Controls, InputEvent, Relay, Scale};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

pub struct ControlLoop<R: Relay, C: Clock + Clone> {
    pub(crate) clock: C,
    pub(crate) sampler_cfg: SamplerCfg,
    pub(crate) dose: DoseController<R, C>,
    pub(crate) input: InputController,
    pub(crate) params: CalibrationParameters,
    pub(crate) store: Persistence,
    pub(crate) history: WeightHistory,
    pub(crate) weight: f32,
    pub(crate) last_sample_at: Option<Instant>,
    pub(crate) sensor_ready: bool,
    pub(crate) snapshots: SnapshotCell,
}

// Copied out before borrowing the history so the input controller can take
// the parameters mutably.
#[derive(Debug, Clone, Copy)]
struct InputFlags {
    asleep: bool,
    dose_idle: bool,
    fault_active: bool,
}

impl InputFlags {
    fn context(self, now: Instant, weight: f32, history: &WeightHistory) -> InputContext<'_> {
        InputContext {
            now,
            weight,
            history,
            asleep: self.asleep,
            dose_idle: self.dose_idle,
            fault_active: self.fault_active,
        }
    }
}

/// A sample is fresh while younger than `stale_after`.
#[inline]
fn is_fresh(now: Instant, last: Option<Instant>, stale_after: Duration) -> bool {
    last.is_some_and(|t| now.saturating_duration_since(t) <= stale_after)
}

/// Asleep once nothing significant happened for `timeout_ms`.
#[inline]
fn is_asleep(now: Instant, last_activity: Instant, timeout_ms: u64) -> bool {
    now.saturating_duration_since(last_activity) > Duration::from_millis(timeout_ms)
}

impl<R: Relay, C: Clock + Clone> ControlLoop<R, C> {
    pub fn builder(clock: C) -> ControlLoopBuilder<R, C> {
        ControlLoopBuilder::new(clock)
    }

    pub fn state(&self) -> &DoseState {
        self.dose.state()
    }

    pub fn params(&self) -> &CalibrationParameters {
        &self.params
    }

    /// Override the grind trigger for this session without persisting it.
    pub fn set_grind_trigger(&mut self, trigger: GrindTrigger) {
        self.params.grind_trigger = trigger;
    }

    pub fn history(&self) -> &WeightHistory {
        &self.history
    }

    pub fn weight(&self) -> f32 {
        self.weight
    }

    pub fn ui(&self) -> UiState {
        self.input.ui()
    }

    pub fn debug_mode(&self) -> bool {
        self.input.debug_mode()
    }

    pub fn completed(&self) -> u64 {
        self.dose.completed()
    }

    pub fn relay_running(&self) -> bool {
        self.dose.grinder().is_running()
    }

    pub fn snapshots(&self) -> SnapshotCell {
        self.snapshots.clone()
    }

    /// Fold one sampler event into the loop state.
    pub fn on_sampler_event(&mut self, ev: SamplerEvent) {
        match ev {
            SamplerEvent::Sample(s) => {
                self.history.push(s);
                self.weight = s.value;
                self.last_sample_at = Some(s.at);
                self.sensor_ready = true;
            }
            SamplerEvent::NotReady { .. } => {
                self.sensor_ready = false;
            }
            SamplerEvent::Tared { ok, at } => {
                self.dose.on_tared(ok, at);
            }
        }
    }

    fn scale_ready(&self, now: Instant) -> bool {
        self.sensor_ready
            && is_fresh(
                now,
                self.last_sample_at,
                Duration::from_millis(self.sampler_cfg.stale_after_ms),
            )
    }

    fn apply_input(&mut self, fx: InputEffects, now: Instant, cmds: &mut Vec<SamplerCommand>) {
        if fx.wake {
            self.dose.note_activity(now);
        }
        if fx.clear_fault {
            self.dose.clear_fault();
        }
        if fx.request_tare {
            self.dose.note_manual_tare(now);
            cmds.push(SamplerCommand::Tare);
        }
        if let Some(f) = fx.scale_factor {
            cmds.push(SamplerCommand::SetScaleFactor(f));
        }
    }

    /// One control tick. Returns the requests for the sampler thread.
    pub fn tick(
        &mut self,
        inputs: &[InputEvent],
        trigger_pressed: bool,
        presentation: &mut dyn Presentation,
    ) -> Vec<SamplerCommand> {
        let now = self.clock.now();
        let scale_ready = self.scale_ready(now);
        let mut cmds = Vec::new();

        for ev in inputs {
            let flags = self.input_flags(now);
            let ctx = flags.context(now, self.weight, &self.history);
            let fx = self
                .input
                .on_event(*ev, &ctx, &mut self.params, &self.store, presentation);
            self.apply_input(fx, now, &mut cmds);
        }
        let flags = self.input_flags(now);
        let ctx = flags.context(now, self.weight, &self.history);
        let fx = self
            .input
            .poll(&ctx, &mut self.params, &self.store, presentation);
        self.apply_input(fx, now, &mut cmds);

        let tick = TickInput {
            now,
            weight: self.weight,
            scale_ready,
            history: &self.history,
            trigger_pressed,
            menu_open: self.input.menu_open(),
        };
        let DoseEffects {
            request_tare,
            averaging,
        } = self.dose.tick(&tick, &mut self.params, &self.store);
        if request_tare {
            cmds.push(SamplerCommand::Tare);
        }
        if let Some(a) = averaging {
            cmds.push(SamplerCommand::Averaging(a));
        }

        self.snapshots.publish(self.snapshot(now));
        cmds
    }

    fn input_flags(&self, now: Instant) -> InputFlags {
        InputFlags {
            asleep: self.asleep(now),
            dose_idle: matches!(self.dose.state(), DoseState::Idle),
            fault_active: matches!(self.dose.state(), DoseState::Failed(_)),
        }
    }

    fn asleep(&self, now: Instant) -> bool {
        matches!(self.dose.state(), DoseState::Idle)
            && !self.input.menu_open()
            && is_asleep(
                now,
                self.dose.last_significant_change_at(),
                self.params.sleep_timeout_ms,
            )
    }

    fn status(&self, now: Instant) -> ScaleStatus {
        match self.dose.state() {
            DoseState::Grinding(_) => return ScaleStatus::Grinding,
            DoseState::Finished(_) => return ScaleStatus::Finished,
            DoseState::Failed(r) => return ScaleStatus::Failed(*r),
            DoseState::Idle => {}
        }
        match self.input.ui() {
            UiState::Menu { .. } => return ScaleStatus::InMenu,
            UiState::Submenu { action, .. } => return ScaleStatus::InSubmenu(action),
            UiState::DebugMenu { .. } => return ScaleStatus::InDebugMenu,
            UiState::Main => {}
        }
        if self.last_sample_at.is_none() {
            return ScaleStatus::Initializing;
        }
        if !self.scale_ready(now) {
            return ScaleStatus::ScaleError;
        }
        if self.asleep(now) {
            return ScaleStatus::Asleep;
        }
        ScaleStatus::Idle
    }

    /// Build the display snapshot for `now`.
    pub fn snapshot(&self, now: Instant) -> Snapshot {
        let session = self.dose.state().session();
        let p = &self.params;
        Snapshot {
            taken_at: Some(now),
            scale_status: self.status(now),
            scale_weight: self.weight,
            set_weight: p.target_weight,
            cup_weight_empty: session.map(|s| s.cup_weight_empty),
            target_total: session.map(|s| s.target_total()),
            offset: p.offset,
            cup_weight: p.cup_weight,
            scale_factor: p.scale_factor,
            started_grinding_at: session.and_then(|s| s.started_at),
            finished_grinding_at: session.and_then(|s| s.finished_at),
            shot_count: p.shot_count,
            scale_mode: p.scale_mode,
            grind_continuous_mode: p.grind_continuous_mode,
            grind_trigger: p.grind_trigger,
            sleep_timeout_ms: p.sleep_timeout_ms,
            debug_mode: self.input.debug_mode(),
            menu: self.input.menu_view(),
        }
    }

    /// Leave the grinder stopped. Call before dropping the loop.
    pub fn shutdown(&mut self) {
        self.dose.shutdown();
        self.snapshots.publish(self.snapshot(self.clock.now()));
    }
}

/// Runtime knobs for `run`.
#[derive(Debug, Clone, Default)]
pub struct RunCfg {
    pub sampler: SamplerCfg,
    pub filter: FilterCfg,
    pub dosing: DosingCfg,
    pub input: InputCfg,
    pub grinder: GrinderCfg,
    /// Stop after this long.
    pub max_runtime: Option<Duration>,
    /// Stop once this many doses have finished and the cup was taken away.
    pub stop_after_doses: Option<u64>,
    /// Session-only grind trigger override.
    pub trigger_override: Option<GrindTrigger>,
}

/// What happened during `run`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub doses_completed: u64,
    pub ticks: u64,
    pub shot_count: u32,
    pub final_state: &'static str,
    /// Set when the loop stopped with an unacknowledged fault.
    pub fault: Option<FaultReason>,
    pub runtime_ms: u64,
}

/// Run the appliance until `shutdown` is set or a configured limit is reached.
#[allow(clippy::too_many_arguments)]
pub fn run<S, R, I>(
    scale: S,
    relay: R,
    mut controls: I,
    store: Persistence,
    cfg: RunCfg,
    presentation: &mut dyn Presentation,
    snapshots: SnapshotCell,
    shutdown: Arc<AtomicBool>,
) -> Result<RunSummary>
where
    S: Scale + Send + 'static,
    R: Relay,
    I: Controls,
{
    let clock = MonotonicClock::new();
    let mut cl = ControlLoop::builder(clock)
        .relay(relay)
        .store(store)
        .sampler_cfg(cfg.sampler.clone())
        .dosing_cfg(cfg.dosing.clone())
        .input_cfg(cfg.input.clone())
        .grinder_cfg(cfg.grinder)
        .snapshots(snapshots)
        .try_build()?;
    if let Some(t) = cfg.trigger_override {
        cl.set_grind_trigger(t);
    }

    let sampler = Sampler::spawn(WeightSampler::new(
        scale,
        clock,
        cfg.sampler.clone(),
        cfg.filter,
        cl.params().scale_factor,
    ));
    let period = crate::util::tick_period(cfg.dosing.control_hz);
    let start = clock.now();
    let mut ticks = 0_u64;
    tracing::info!(
        control_hz = cfg.dosing.control_hz,
        sample_hz = cfg.sampler.sample_rate_hz,
        trigger = ?cl.params().grind_trigger,
        "control loop started"
    );

    let mut inputs: Vec<InputEvent> = Vec::new();
    loop {
        if shutdown.load(Ordering::Relaxed) {
            tracing::info!("shutdown requested");
            break;
        }
        let tick_start = clock.now();
        if let Some(max) = cfg.max_runtime
            && tick_start.saturating_duration_since(start) >= max
        {
            tracing::info!(max_ms = max.as_millis() as u64, "max runtime reached");
            break;
        }

        for ev in sampler.drain() {
            cl.on_sampler_event(ev);
        }
        inputs.clear();
        while let Some(ev) = controls.poll_event() {
            inputs.push(ev);
        }
        let trigger = controls.trigger_pressed();
        for cmd in cl.tick(&inputs, trigger, presentation) {
            sampler.send(cmd);
        }
        ticks += 1;

        if let Some(n) = cfg.stop_after_doses
            && cl.completed() >= n
            && matches!(cl.state(), DoseState::Idle)
        {
            tracing::info!(doses = n, "requested doses completed");
            break;
        }

        let spent = clock.now().saturating_duration_since(tick_start);
        clock.sleep(period.saturating_sub(spent));
    }

    cl.shutdown();
    drop(sampler);
    let summary = RunSummary {
        doses_completed: cl.completed(),
        ticks,
        shot_count: cl.params().shot_count,
        final_state: cl.state().name(),
        fault: match cl.state() {
            DoseState::Failed(r) => Some(*r),
            _ => None,
        },
        runtime_ms: clock.ms_since(start),
    };
    tracing::info!(?summary, "control loop stopped");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::{is_asleep, is_fresh};
    use std::time::{Duration, Instant};

    #[test]
    fn freshness_window_is_inclusive() {
        let t0 = Instant::now();
        let stale = Duration::from_millis(1_000);
        assert!(!is_fresh(t0, None, stale));
        assert!(is_fresh(t0 + stale, Some(t0), stale));
        assert!(!is_fresh(t0 + stale + Duration::from_millis(1), Some(t0), stale));
    }

    #[test]
    fn sleep_after_timeout() {
        let t0 = Instant::now();
        assert!(!is_asleep(t0 + Duration::from_millis(60_000), t0, 60_000));
        assert!(is_asleep(t0 + Duration::from_millis(60_001), t0, 60_000));
        // Activity in the future (clock skew between tasks) never counts as asleep.
        assert!(!is_asleep(t0, t0 + Duration::from_secs(5), 10));
    }
}
