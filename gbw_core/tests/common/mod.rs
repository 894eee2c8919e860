//! Tick-by-tick harness around `ControlLoop` with a manual clock.
#![allow(dead_code)]

use gbw_core::mocks::{MemoryStore, RecordingRelay};
use gbw_core::{
    CalibrationParameters, ControlLoop, DosingCfg, InputCfg, Persistence, Presentation,
    SamplerCommand, SamplerEvent, WeightSample,
};
use gbw_traits::clock::{Clock, TestClock};
use gbw_traits::InputEvent;
use std::time::Duration;

pub const TICK: Duration = Duration::from_millis(50);

#[derive(Debug, Default)]
pub struct Overlays {
    pub taring: usize,
    pub cup_screens: Vec<f32>,
    pub notices: Vec<String>,
}

impl Presentation for Overlays {
    fn show_taring_message(&mut self) {
        self.taring += 1;
    }
    fn show_cup_weight_set_screen(&mut self, weight: f32) {
        self.cup_screens.push(weight);
    }
    fn show_notice(&mut self, text: &str) {
        self.notices.push(text.to_string());
    }
}

pub struct Rig {
    pub clock: TestClock,
    pub relay: RecordingRelay,
    pub store: MemoryStore,
    pub cl: ControlLoop<RecordingRelay, TestClock>,
    pub overlays: Overlays,
    pub trigger: bool,
    /// Sampler commands emitted so far.
    pub commands: Vec<SamplerCommand>,
}

impl Rig {
    pub fn new(params: CalibrationParameters) -> Self {
        Self::with_cfg(params, DosingCfg::default(), InputCfg::default())
    }

    pub fn with_cfg(params: CalibrationParameters, dosing: DosingCfg, input: InputCfg) -> Self {
        let clock = TestClock::new();
        let relay = RecordingRelay::default();
        let store = MemoryStore::default();
        let mut cl = ControlLoop::builder(clock.clone())
            .relay(relay.clone())
            .store(Persistence::new(store.clone()))
            .params(params)
            .dosing_cfg(dosing)
            .input_cfg(input)
            .try_build()
            .expect("valid rig");
        cl.on_sampler_event(SamplerEvent::Tared {
            ok: true,
            at: clock.now(),
        });
        Self {
            clock,
            relay,
            store,
            cl,
            overlays: Overlays::default(),
            trigger: false,
            commands: Vec::new(),
        }
    }

    /// Deliver one sample stamped now, run one tick with `events`, then
    /// advance the clock by one tick period.
    pub fn step(&mut self, weight: Option<f32>, events: &[InputEvent]) {
        if let Some(value) = weight {
            self.cl.on_sampler_event(SamplerEvent::Sample(WeightSample {
                value,
                at: self.clock.now(),
            }));
        }
        let cmds = self.cl.tick(events, self.trigger, &mut self.overlays);
        self.commands.extend(cmds);
        self.clock.advance(TICK);
    }

    pub fn feed(&mut self, weight: f32) {
        self.step(Some(weight), &[]);
    }

    pub fn feed_n(&mut self, weight: f32, n: usize) {
        for _ in 0..n {
            self.feed(weight);
        }
    }

    /// One encoder event at the current weight.
    pub fn input(&mut self, ev: InputEvent) {
        let w = self.cl.weight();
        self.step(Some(w), &[ev]);
    }

    /// Hold the current weight for `ms`.
    pub fn idle_for(&mut self, ms: u64) {
        let w = self.cl.weight();
        for _ in 0..(ms / TICK.as_millis() as u64) {
            self.feed(w);
        }
    }

    pub fn state_name(&self) -> &'static str {
        self.cl.state().name()
    }
}

/// Cup-triggered, continuous-relay parameters so relay writes mirror the
/// grinder's running state.
pub fn cup_params() -> CalibrationParameters {
    CalibrationParameters {
        grind_trigger: gbw_core::GrindTrigger::Cup,
        grind_continuous_mode: true,
        ..CalibrationParameters::default()
    }
}

/// Place the 70 g cup and hold it until grinding starts.
pub fn start_cup_grind(rig: &mut Rig) {
    for _ in 0..40 {
        rig.feed(70.0);
        if rig.state_name() == "grinding" {
            return;
        }
    }
    panic!("grind did not start; state {}", rig.state_name());
}
