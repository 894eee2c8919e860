//! Weight acquisition: raw ADC reads → grams → Kalman estimate → deadband.
//!
//! `WeightSampler` is the synchronous pipeline; `Sampler` moves it onto its own
//! thread, publishes `SamplerEvent`s over a bounded channel and accepts
//! `SamplerCommand`s (tare, new scale factor, averaging depth) from the control
//! loop.
//!
//! Safety: each `Sampler` spawns exactly one thread that is shut down and
//! joined when the `Sampler` is dropped.
use crate::config::{FilterCfg, SamplerCfg};
use crate::error::{GbwError, Result};
use crate::filter::KalmanFilter;
use crate::history::WeightSample;
use crate::hw_error::map_boxed;
use crossbeam_channel as xch;
use eyre::WrapErr;
use gbw_traits::Scale;
use gbw_traits::clock::Clock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// How many raw reads are averaged per estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Averaging {
    /// More reads, steadier numbers.
    Idle,
    /// Fewer reads, lower latency while the grinder runs.
    Dosing,
}

pub struct WeightSampler<S: Scale, C: Clock> {
    scale: S,
    clock: C,
    cfg: SamplerCfg,
    filter: KalmanFilter,
    scale_factor: f32,
    zero_offset: f64,
    averaging: Averaging,
    ready: bool,
    last_updated: Option<Instant>,
    last_tare_at: Option<Instant>,
}

impl<S: Scale, C: Clock> WeightSampler<S, C> {
    pub fn new(scale: S, clock: C, cfg: SamplerCfg, filter: FilterCfg, scale_factor: f32) -> Self {
        Self {
            scale,
            clock,
            cfg,
            filter: KalmanFilter::new(filter),
            scale_factor,
            zero_offset: 0.0,
            averaging: Averaging::Idle,
            ready: false,
            last_updated: None,
            last_tare_at: None,
        }
    }

    pub fn cfg(&self) -> &SamplerCfg {
        &self.cfg
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn last_updated(&self) -> Option<Instant> {
        self.last_updated
    }

    pub fn last_tare_at(&self) -> Option<Instant> {
        self.last_tare_at
    }

    pub fn zero_offset(&self) -> f64 {
        self.zero_offset
    }

    pub fn scale_factor(&self) -> f32 {
        self.scale_factor
    }

    pub fn averaging(&self) -> Averaging {
        self.averaging
    }

    pub fn set_averaging(&mut self, averaging: Averaging) {
        self.averaging = averaging;
    }

    /// Replace the counts-per-gram factor. Non-finite or non-positive factors are rejected.
    pub fn set_scale_factor(&mut self, factor: f32) -> Result<()> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(eyre::Report::new(GbwError::InvalidInput(format!(
                "scale factor must be finite and > 0 (got {factor})"
            ))));
        }
        self.scale_factor = factor;
        Ok(())
    }

    fn reads_per_estimate(&self) -> u8 {
        match self.averaging {
            Averaging::Idle => self.cfg.idle_reads,
            Averaging::Dosing => self.cfg.dosing_reads,
        }
        .max(1)
    }

    // Mean of `n` raw reads; the first failed read aborts the run.
    fn read_average(&mut self, n: u8) -> Result<f64> {
        let timeout = Duration::from_millis(self.cfg.read_timeout_ms);
        let mut sum = 0.0_f64;
        for _ in 0..n {
            let raw = self
                .scale
                .read(timeout)
                .map_err(|e| eyre::Report::new(map_boxed(e.as_ref())))?;
            sum += f64::from(raw);
        }
        Ok(sum / f64::from(n.max(1)))
    }

    /// Take one estimate. `None` when the sensor did not deliver in time; the
    /// sampler is then marked not ready until a later read succeeds.
    pub fn sample(&mut self) -> Option<WeightSample> {
        let n = self.reads_per_estimate();
        match self.read_average(n) {
            Ok(raw) => {
                let grams = ((raw - self.zero_offset) / f64::from(self.scale_factor)) as f32;
                let mut value = self.filter.update(grams);
                if value.abs() < self.cfg.deadband_g {
                    value = 0.0;
                }
                let at = self.clock.now();
                self.ready = true;
                self.last_updated = Some(at);
                tracing::trace!(raw, grams, value, "sample");
                Some(WeightSample { value, at })
            }
            Err(e) => {
                if self.ready {
                    tracing::warn!(error = %e, "scale not ready");
                }
                self.ready = false;
                None
            }
        }
    }

    /// Capture the current load as the new zero and restart the filter.
    ///
    /// Retries a bounded number of times; on failure the previous zero is kept.
    pub fn tare(&mut self) -> Result<()> {
        self.tare_unless(|| false)
    }

    /// [`tare`](Self::tare) that gives up before the next attempt once
    /// `cancelled` returns true.
    pub fn tare_unless(&mut self, cancelled: impl Fn() -> bool) -> Result<()> {
        let attempts = self.cfg.tare_retries.max(1);
        let mut last_err = None;
        for attempt in 1..=attempts {
            if cancelled() {
                eyre::bail!("tare cancelled after {} attempts", attempt - 1);
            }
            match self.read_average(self.cfg.tare_reads.max(1)) {
                Ok(zero) => {
                    self.zero_offset = zero;
                    self.filter.reset();
                    self.last_tare_at = Some(self.clock.now());
                    self.ready = true;
                    tracing::info!(zero, attempt, "tared");
                    return Ok(());
                }
                Err(e) => {
                    tracing::debug!(attempt, error = %e, "tare attempt failed");
                    last_err = Some(e);
                    if attempt < attempts {
                        self.clock
                            .sleep(Duration::from_millis(self.cfg.tare_backoff_ms));
                    }
                }
            }
        }
        let err = last_err.unwrap_or_else(|| eyre::Report::new(GbwError::Timeout));
        Err(err).wrap_err_with(|| format!("tare failed after {attempts} attempts"))
    }
}

/// Published by the sampler thread.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SamplerEvent {
    Sample(WeightSample),
    NotReady { at: Instant },
    Tared { ok: bool, at: Instant },
}

/// Requests from the control loop to the sampler thread.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SamplerCommand {
    Tare,
    SetScaleFactor(f32),
    Averaging(Averaging),
}

const EVENT_CAPACITY: usize = 64;

pub struct Sampler {
    events: xch::Receiver<SamplerEvent>,
    commands: xch::Sender<SamplerCommand>,
    /// Shutdown flag for immediate response (atomic for lock-free check)
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl Sampler {
    /// Move `sampler` onto a new thread. The thread tares once before sampling.
    pub fn spawn<S, C>(mut sampler: WeightSampler<S, C>) -> Self
    where
        S: Scale + Send + 'static,
        C: Clock + Send + 'static,
    {
        let (tx, events) = xch::bounded(EVENT_CAPACITY);
        let (commands, cmd_rx) = xch::unbounded::<SamplerCommand>();
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let period = crate::util::tick_period(sampler.cfg.sample_rate_hz);

        let join_handle = std::thread::spawn(move || {
            let stopping = || shutdown_clone.load(Ordering::Relaxed);
            if !publish(&tx, tare_event(&mut sampler, &stopping)) {
                return;
            }
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    tracing::debug!("Sampler thread received shutdown signal");
                    break;
                }
                let started = sampler.clock.now();

                for cmd in cmd_rx.try_iter() {
                    match cmd {
                        SamplerCommand::Tare => {
                            if !publish(&tx, tare_event(&mut sampler, &stopping)) {
                                return;
                            }
                        }
                        SamplerCommand::SetScaleFactor(f) => {
                            if let Err(e) = sampler.set_scale_factor(f) {
                                tracing::warn!(error = %e, "scale factor rejected");
                            }
                        }
                        SamplerCommand::Averaging(a) => sampler.set_averaging(a),
                    }
                }

                let ev = match sampler.sample() {
                    Some(s) => SamplerEvent::Sample(s),
                    None => SamplerEvent::NotReady {
                        at: sampler.clock.now(),
                    },
                };
                if !publish(&tx, ev) {
                    break;
                }

                if shutdown_clone.load(Ordering::Relaxed) {
                    break;
                }
                let spent = sampler.clock.now().saturating_duration_since(started);
                sampler.clock.sleep(period.saturating_sub(spent));
            }
            tracing::trace!("Sampler thread exiting cleanly");
        });

        Self {
            events,
            commands,
            shutdown,
            join_handle: Some(join_handle),
        }
    }

    /// Drain everything published since the last call.
    pub fn drain(&self) -> Vec<SamplerEvent> {
        self.events.try_iter().collect()
    }

    /// Wait up to `timeout` for the next event.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<SamplerEvent> {
        self.events.recv_timeout(timeout).ok()
    }

    pub fn send(&self, cmd: SamplerCommand) {
        if self.commands.send(cmd).is_err() {
            tracing::warn!(?cmd, "sampler thread gone; command dropped");
        }
    }
}

fn tare_event<S: Scale, C: Clock>(
    sampler: &mut WeightSampler<S, C>,
    stopping: &dyn Fn() -> bool,
) -> SamplerEvent {
    let ok = match sampler.tare_unless(stopping) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "tare failed");
            false
        }
    };
    SamplerEvent::Tared {
        ok,
        at: sampler.clock.now(),
    }
}

// false once the consumer is gone. A full channel drops the event; the
// consumer only ever needs the latest samples.
fn publish(tx: &xch::Sender<SamplerEvent>, ev: SamplerEvent) -> bool {
    match tx.try_send(ev) {
        Ok(()) => true,
        Err(xch::TrySendError::Full(_)) => {
            tracing::trace!("sampler event channel full; dropping event");
            true
        }
        Err(xch::TrySendError::Disconnected(_)) => {
            tracing::debug!("Sampler consumer disconnected, exiting thread");
            false
        }
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        // The thread exits after the scale read in flight; a tare in progress
        // stops before its next attempt.
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => tracing::trace!("Sampler thread joined successfully"),
                Err(e) => tracing::warn!(?e, "Sampler thread panicked during shutdown"),
            }
        }
    }
}
