//! Simulated appliance for dev hosts.
//!
//! A `SimWorld` holds the physical state (load on the platter, grinder relay,
//! pending encoder events) and hands out `Scale`, `Relay` and `Controls`
//! handles that share it. Ground coffee accumulates while the relay is engaged,
//! plus a short tail after it opens. Time comes from the injected `Clock`, so
//! tests drive the world with `TestClock`.
mod script;

pub use script::{SimAction, SimScript, SimStep};

use crate::error::HwError;
use gbw_traits::{Clock, Controls, InputEvent, Relay, Scale};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone)]
pub struct SimCfg {
    /// Raw counts per gram of the simulated load cell.
    pub counts_per_gram: f32,
    /// Raw reading with nothing on the platter.
    pub zero_counts: i32,
    /// Grams per second delivered while the grinder runs.
    pub grind_rate_g_per_s: f32,
    /// Grams still falling after the grinder stops.
    pub tail_g: f32,
    /// Peak-to-peak read noise is `2 * noise_counts`.
    pub noise_counts: i32,
}

impl Default for SimCfg {
    fn default() -> Self {
        Self {
            counts_per_gram: 1396.21,
            zero_counts: 842_913,
            grind_rate_g_per_s: 2.0,
            tail_g: 1.2,
            noise_counts: 150,
        }
    }
}

#[derive(Debug)]
struct World {
    start: Instant,
    last: Instant,
    load_g: f32,
    ground_g: f32,
    grinder_on: bool,
    tail_left_g: f32,
    connected: bool,
    trigger_until: Option<Instant>,
    events: VecDeque<InputEvent>,
    script: VecDeque<SimStep>,
    rng: u32,
}

impl World {
    fn integrate(&mut self, cfg: &SimCfg, now: Instant) {
        let dt = now.saturating_duration_since(self.last).as_secs_f32();
        self.last = now;
        let flow = cfg.grind_rate_g_per_s * dt;
        let added = if self.grinder_on {
            flow
        } else if self.tail_left_g > 0.0 {
            let g = flow.min(self.tail_left_g);
            self.tail_left_g -= g;
            g
        } else {
            0.0
        };
        self.load_g += added;
        self.ground_g += added;
    }

    fn apply_due(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.start).as_millis();
        while self
            .script
            .front()
            .is_some_and(|s| u128::from(s.at_ms) <= elapsed)
        {
            let Some(step) = self.script.pop_front() else {
                break;
            };
            tracing::debug!(at_ms = step.at_ms, action = ?step.action, "sim step");
            match step.action {
                SimAction::Place(g) => self.load_g += g,
                SimAction::RemoveLoad => {
                    self.load_g = 0.0;
                    self.tail_left_g = 0.0;
                }
                SimAction::HoldTrigger(ms) => {
                    self.trigger_until =
                        Some(self.start + Duration::from_millis(step.at_ms.saturating_add(ms)));
                }
                SimAction::Rotate(d) => self.events.push_back(InputEvent::Rotate(d)),
                SimAction::Click => self.events.push_back(InputEvent::Click),
                SimAction::Disconnect => self.connected = false,
                SimAction::Reconnect => self.connected = true,
            }
        }
    }

    // xorshift32
    fn jitter(&mut self, amplitude: i32) -> i32 {
        if amplitude <= 0 {
            return 0;
        }
        let mut x = self.rng;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.rng = x;
        let span = amplitude.unsigned_abs() * 2 + 1;
        (x % span) as i32 - amplitude
    }
}

/// Shared simulated hardware. Clones refer to the same world.
#[derive(Debug, Clone)]
pub struct SimWorld<C: Clock + Clone> {
    cfg: SimCfg,
    clock: C,
    state: Arc<Mutex<World>>,
}

impl<C: Clock + Clone> SimWorld<C> {
    pub fn new(cfg: SimCfg, clock: C) -> Self {
        Self::with_script(cfg, clock, SimScript::default())
    }

    pub fn with_script(cfg: SimCfg, clock: C, script: SimScript) -> Self {
        let now = clock.now();
        let state = World {
            start: now,
            last: now,
            load_g: 0.0,
            ground_g: 0.0,
            grinder_on: false,
            tail_left_g: 0.0,
            connected: true,
            trigger_until: None,
            events: VecDeque::new(),
            script: script.steps().iter().copied().collect(),
            rng: 0x9E37_79B9,
        };
        Self {
            cfg,
            clock,
            state: Arc::new(Mutex::new(state)),
        }
    }

    // Bring the world up to the clock before touching it.
    fn with<R>(&self, f: impl FnOnce(&mut World, &SimCfg, Instant) -> R) -> R {
        let now = self.clock.now();
        let mut w = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        w.integrate(&self.cfg, now);
        w.apply_due(now);
        f(&mut w, &self.cfg, now)
    }

    pub fn scale(&self) -> SimulatedScale<C> {
        SimulatedScale { world: self.clone() }
    }

    pub fn relay(&self) -> SimulatedRelay<C> {
        SimulatedRelay { world: self.clone() }
    }

    pub fn controls(&self) -> SimulatedControls<C> {
        SimulatedControls { world: self.clone() }
    }

    /// Grams currently on the platter.
    pub fn grams(&self) -> f32 {
        self.with(|w, _, _| w.load_g)
    }

    /// Total grams the grinder delivered so far.
    pub fn ground_total(&self) -> f32 {
        self.with(|w, _, _| w.ground_g)
    }

    pub fn grinder_on(&self) -> bool {
        self.with(|w, _, _| w.grinder_on)
    }

    pub fn place(&self, grams: f32) {
        self.apply(SimAction::Place(grams));
    }

    pub fn remove_load(&self) {
        self.apply(SimAction::RemoveLoad);
    }

    /// Apply an action immediately, outside the script.
    pub fn apply(&self, action: SimAction) {
        self.with(|w, _, now| {
            let at_ms = u64::try_from(now.saturating_duration_since(w.start).as_millis())
                .unwrap_or(u64::MAX);
            w.script.push_front(SimStep { at_ms, action });
            w.apply_due(now);
        });
    }

    /// Steps of the script not yet reached.
    pub fn pending_steps(&self) -> usize {
        self.with(|w, _, _| w.script.len())
    }
}

pub struct SimulatedScale<C: Clock + Clone> {
    world: SimWorld<C>,
}

impl<C: Clock + Clone> Scale for SimulatedScale<C> {
    fn read(&mut self, _timeout: Duration) -> Result<i32, BoxError> {
        let raw = self.world.with(|w, cfg, _| {
            if !w.connected {
                return None;
            }
            let counts = (w.load_g * cfg.counts_per_gram).round() as i32;
            Some(cfg.zero_counts + counts + w.jitter(cfg.noise_counts))
        });
        let raw = raw.ok_or_else(|| Box::new(HwError::Disconnected) as BoxError)?;
        tracing::trace!(raw, "sim scale read");
        Ok(raw)
    }
}

pub struct SimulatedRelay<C: Clock + Clone> {
    world: SimWorld<C>,
}

impl<C: Clock + Clone> Relay for SimulatedRelay<C> {
    fn set(&mut self, engaged: bool) -> Result<(), BoxError> {
        self.world.with(|w, cfg, _| {
            if w.grinder_on && !engaged {
                w.tail_left_g = cfg.tail_g;
            }
            w.grinder_on = engaged;
        });
        tracing::debug!(engaged, "sim relay");
        Ok(())
    }
}

pub struct SimulatedControls<C: Clock + Clone> {
    world: SimWorld<C>,
}

impl<C: Clock + Clone> Controls for SimulatedControls<C> {
    fn poll_event(&mut self) -> Option<InputEvent> {
        self.world.with(|w, _, _| w.events.pop_front())
    }

    fn trigger_pressed(&mut self) -> bool {
        self.world
            .with(|w, _, now| w.trigger_until.is_some_and(|until| now < until))
    }
}
