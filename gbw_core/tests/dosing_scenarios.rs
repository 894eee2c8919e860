//! Dose state machine driven through the control loop, tick by tick.
mod common;

use common::{Rig, TICK, cup_params, start_cup_grind};
use gbw_core::mocks::{MemoryStore, RecordingRelay};
use gbw_core::params::keys;
use gbw_core::{
    Averaging, CalibrationParameters, ControlLoop, DoseState, DosingCfg, FaultReason, GrindTrigger,
    InputCfg, NullPresentation, Persistence, SamplerCommand, SamplerEvent, WeightSample,
};
use gbw_traits::SettingValue;
use gbw_traits::clock::{Clock, TestClock};
use rstest::rstest;

fn failed(rig: &Rig) -> Option<FaultReason> {
    match rig.cl.state() {
        DoseState::Failed(r) => Some(*r),
        _ => None,
    }
}

#[test]
fn cup_on_scale_for_a_second_starts_grinding() {
    let mut rig = Rig::new(cup_params());
    // 68/72 alternating every tick; 20 ticks span 950 ms
    for k in 0..20 {
        rig.feed(if k % 2 == 0 { 68.0 } else { 72.0 });
    }
    assert_eq!(rig.state_name(), "idle");
    rig.feed(68.0); // t = 1000 ms
    assert_eq!(rig.state_name(), "grinding");

    // trailing 500 ms: ticks 10..=20, six 68s and five 72s
    let cup = rig.cl.state().session().unwrap().cup_weight_empty;
    assert!((cup - 768.0 / 11.0).abs() < 1e-3, "cup {cup}");
    assert!(rig.relay.engaged());
    assert!(rig.commands.contains(&SamplerCommand::Averaging(Averaging::Dosing)));
}

#[test]
fn wrong_cup_does_not_start() {
    let mut rig = Rig::new(cup_params());
    rig.feed_n(80.0, 40);
    assert_eq!(rig.state_name(), "idle");
    assert!(rig.relay.writes().is_empty());
}

#[test]
fn finishes_exactly_at_target_total() {
    let mut rig = Rig::new(cup_params());
    start_cup_grind(&mut rig);
    for g in 71..=85 {
        rig.feed(g as f32);
    }
    assert_eq!(rig.state_name(), "grinding");
    assert!(rig.relay.engaged());

    rig.feed(85.5);
    assert_eq!(rig.state_name(), "finished");
    assert!(!rig.relay.engaged());
    assert_eq!(rig.cl.completed(), 1);
    let snap = rig.cl.snapshots().load();
    assert_eq!(snap.target_total, Some(85.5));
    assert!(snap.finished_grinding_at.is_some());
    assert!(rig.commands.contains(&SamplerCommand::Averaging(Averaging::Idle)));
}

#[test]
fn flat_weight_fails_with_no_increase() {
    let mut rig = Rig::new(cup_params());
    start_cup_grind(&mut rig);
    rig.feed_n(70.0, 40);
    assert_eq!(rig.state_name(), "grinding");
    rig.feed_n(70.0, 2);
    assert_eq!(failed(&rig), Some(FaultReason::NoIncrease));
    assert_eq!(rig.relay.writes(), vec![true, false]);
}

#[test]
fn settled_overshoot_moves_offset_once() {
    let mut rig = Rig::new(cup_params());
    start_cup_grind(&mut rig);
    rig.feed(85.5);
    assert_eq!(rig.state_name(), "finished");

    // desired total 88, grounds settle at 89
    rig.feed_n(89.0, 60);
    assert_eq!(rig.state_name(), "finished");
    assert!((rig.cl.params().offset - -3.5).abs() < 1e-5);
    assert_eq!(rig.cl.params().shot_count, 1);
    assert_eq!(rig.store.value(keys::OFFSET), Some(SettingValue::Float(-3.5)));
    assert_eq!(rig.store.value(keys::SHOT_COUNT), Some(SettingValue::UInt(1)));
    assert_eq!(rig.store.write_count(keys::OFFSET), 1);
    assert_eq!(rig.store.write_count(keys::SHOT_COUNT), 1);

    rig.feed(0.0);
    assert_eq!(rig.state_name(), "idle");
}

#[test]
fn error_inside_deadband_only_counts_the_shot() {
    let mut rig = Rig::new(cup_params());
    start_cup_grind(&mut rig);
    rig.feed(85.5);
    rig.feed_n(88.2, 40);
    assert_eq!(rig.cl.params().offset, -2.5);
    assert_eq!(rig.store.write_count(keys::OFFSET), 0);
    assert_eq!(rig.store.write_count(keys::SHOT_COUNT), 1);
}

#[test]
fn learned_offset_is_clamped() {
    let mut rig = Rig::new(cup_params());
    start_cup_grind(&mut rig);
    rig.feed(85.5);
    // huge overshoot: -2.5 + (88 - 100) would be -14.5
    rig.feed_n(100.0, 40);
    assert_eq!(rig.cl.params().offset, -5.0);
}

#[test]
fn no_offset_pass_when_cup_removed_early() {
    let mut rig = Rig::new(cup_params());
    start_cup_grind(&mut rig);
    rig.feed(85.5);
    rig.feed_n(88.0, 10);
    rig.feed(0.0);
    assert_eq!(rig.state_name(), "idle");
    assert_eq!(rig.cl.params().shot_count, 0);
    assert!(rig.store.writes().is_empty());
}

#[rstest]
#[case(-25.0, FaultReason::CupRemoved)]
#[case(60.0, FaultReason::CupLifted)]
fn weight_drop_aborts(#[case] weight: f32, #[case] reason: FaultReason) {
    let mut rig = Rig::new(cup_params());
    start_cup_grind(&mut rig);
    rig.feed(74.0);
    rig.feed(weight);
    assert_eq!(failed(&rig), Some(reason));
    assert!(!rig.relay.engaged());
    assert!(!rig.cl.relay_running());
}

#[test]
fn sensor_not_ready_aborts() {
    let mut rig = Rig::new(cup_params());
    start_cup_grind(&mut rig);
    rig.cl.on_sampler_event(SamplerEvent::NotReady {
        at: rig.clock.now(),
    });
    rig.step(None, &[]);
    assert_eq!(failed(&rig), Some(FaultReason::SensorLost));
    assert!(!rig.relay.engaged());
}

#[test]
fn stale_samples_abort() {
    let mut rig = Rig::new(cup_params());
    start_cup_grind(&mut rig);
    for _ in 0..20 {
        rig.step(None, &[]);
    }
    assert_eq!(rig.state_name(), "grinding");
    rig.step(None, &[]);
    assert_eq!(failed(&rig), Some(FaultReason::SensorLost));
}

#[test]
fn long_grind_times_out() {
    let dosing = DosingCfg {
        max_grind_ms: 3_000,
        ..DosingCfg::default()
    };
    let mut rig = Rig::with_cfg(cup_params(), dosing, InputCfg::default());
    start_cup_grind(&mut rig);
    // 1 g/s: enough to pass the stall check, far from the target
    for k in 1..=60 {
        rig.feed(70.0 + 0.05 * k as f32);
    }
    assert_eq!(rig.state_name(), "grinding");
    rig.feed(73.05);
    assert_eq!(failed(&rig), Some(FaultReason::Timeout));
    assert!(!rig.relay.engaged());
}

#[test]
fn failed_state_is_sticky_below_reset_weight() {
    let mut rig = Rig::new(cup_params());
    start_cup_grind(&mut rig);
    rig.feed(-30.0);
    let writes = rig.relay.writes();
    for w in [0.0, 70.0, 100.0, 149.0] {
        rig.feed_n(w, 30);
        assert_eq!(failed(&rig), Some(FaultReason::CupRemoved));
    }
    assert_eq!(rig.relay.writes(), writes);

    rig.feed(150.0);
    assert_eq!(rig.state_name(), "idle");
}

#[test]
fn relay_error_fails_start() {
    let clock = TestClock::new();
    let mut cl = ControlLoop::builder(clock.clone())
        .relay(RecordingRelay::failing())
        .store(Persistence::new(MemoryStore::default()))
        .params(cup_params())
        .try_build()
        .unwrap();
    let mut ui = NullPresentation;
    for _ in 0..25 {
        cl.on_sampler_event(SamplerEvent::Sample(WeightSample {
            value: 70.0,
            at: clock.now(),
        }));
        cl.tick(&[], false, &mut ui);
        clock.advance(TICK);
    }
    assert_eq!(cl.state(), &DoseState::Failed(FaultReason::Actuator));
}

#[test]
fn button_hold_starts_once_per_press() {
    let params = CalibrationParameters {
        grind_trigger: GrindTrigger::Button,
        grind_continuous_mode: true,
        ..CalibrationParameters::default()
    };
    let mut rig = Rig::new(params);
    rig.feed_n(40.0, 5);
    rig.trigger = true;
    rig.feed_n(40.0, 12); // held 550 ms
    assert_eq!(rig.state_name(), "idle");
    rig.feed(40.0); // 600 ms
    assert_eq!(rig.state_name(), "grinding");
    let s = rig.cl.state().session().unwrap().clone();
    assert_eq!(s.cup_weight_empty, 40.0);
    assert_eq!(s.target_total(), 55.5);

    rig.feed(56.0);
    assert_eq!(rig.state_name(), "finished");
    rig.feed_n(0.0, 30);
    assert_eq!(rig.state_name(), "idle", "still held: no second grind");

    rig.trigger = false;
    rig.feed(0.0);
    rig.trigger = true;
    rig.feed_n(0.0, 13);
    assert_eq!(rig.state_name(), "grinding");
}

#[test]
fn button_mode_can_exclude_the_cup() {
    let params = CalibrationParameters {
        grind_trigger: GrindTrigger::Button,
        grind_continuous_mode: true,
        ..CalibrationParameters::default()
    };
    let dosing = DosingCfg {
        button_mode_includes_cup: false,
        ..DosingCfg::default()
    };
    let mut rig = Rig::with_cfg(params, dosing, InputCfg::default());
    rig.trigger = true;
    rig.feed_n(0.0, 13);
    assert_eq!(rig.state_name(), "grinding");
    assert_eq!(rig.cl.state().session().unwrap().target_total(), 15.5);
}

#[test]
fn scale_mode_times_without_driving_the_relay() {
    let params = CalibrationParameters {
        scale_mode: true,
        ..cup_params()
    };
    let mut rig = Rig::new(params);
    start_cup_grind(&mut rig);
    assert!(rig.cl.state().session().unwrap().started_at.is_none());
    rig.feed(70.5);
    assert!(rig.cl.state().session().unwrap().started_at.is_some());

    // no stall or timeout checks in scale mode
    rig.feed_n(70.5, 60);
    assert_eq!(rig.state_name(), "grinding");
    // offset ignored: target total is cup + target
    rig.feed(87.9);
    assert_eq!(rig.state_name(), "grinding");
    rig.feed(88.0);
    assert_eq!(rig.state_name(), "finished");
    rig.feed_n(88.0, 40);
    assert_eq!(rig.cl.params().shot_count, 0);
    assert!(rig.relay.writes().is_empty());
}

#[test]
fn drifting_zero_requests_one_retare() {
    let mut rig = Rig::new(CalibrationParameters::default());
    rig.feed_n(1.0, 210); // just past the 10 s retare interval
    let tares = |rig: &Rig| {
        rig.commands
            .iter()
            .filter(|c| **c == SamplerCommand::Tare)
            .count()
    };
    assert_eq!(tares(&rig), 1);
    rig.feed_n(1.0, 40);
    assert_eq!(tares(&rig), 1, "pending retare is not repeated");

    rig.cl.on_sampler_event(SamplerEvent::Tared {
        ok: true,
        at: rig.clock.now(),
    });
    rig.feed_n(0.0, 40);
    assert_eq!(tares(&rig), 1);
}

#[test]
fn no_retare_for_real_load() {
    let mut rig = Rig::new(CalibrationParameters::default());
    rig.feed_n(40.0, 250);
    assert!(!rig.commands.contains(&SamplerCommand::Tare));
}
