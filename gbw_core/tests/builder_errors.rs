use gbw_core::error::BuildError;
use gbw_core::mocks::{MemoryStore, RecordingRelay};
use gbw_core::params::keys;
use gbw_core::{ControlLoop, DosingCfg, InputCfg, Persistence, SamplerCfg};
use gbw_traits::SettingValue;
use gbw_traits::clock::TestClock;
use rstest::rstest;

fn builder() -> gbw_core::ControlLoopBuilder<RecordingRelay, TestClock> {
    ControlLoop::builder(TestClock::new())
}

#[rstest]
fn missing_relay_yields_typed_build_error() {
    let err = builder()
        .store(Persistence::new(MemoryStore::default()))
        .try_build()
        .err()
        .expect("should fail with MissingRelay");
    match err.downcast_ref::<BuildError>() {
        Some(BuildError::MissingRelay) => {}
        other => panic!("expected MissingRelay, got: {other:?}"),
    }
}

#[rstest]
fn missing_store_yields_typed_build_error() {
    let err = builder()
        .relay(RecordingRelay::default())
        .try_build()
        .err()
        .expect("should fail with MissingStore");
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::MissingStore)
    ));
}

#[rstest]
#[case(SamplerCfg { sample_rate_hz: 0, ..SamplerCfg::default() }, DosingCfg::default(), InputCfg::default(), "sample_rate_hz")]
#[case(SamplerCfg::default(), DosingCfg { control_hz: 0, ..DosingCfg::default() }, InputCfg::default(), "control_hz")]
#[case(SamplerCfg::default(), DosingCfg { failed_reset_g: 1.0, ..DosingCfg::default() }, InputCfg::default(), "failed_reset_g")]
#[case(SamplerCfg::default(), DosingCfg::default(), InputCfg { target_min_g: 0.0, ..InputCfg::default() }, "target range")]
#[case(SamplerCfg::default(), DosingCfg::default(), InputCfg { burst_clicks: 2, ..InputCfg::default() }, "burst_clicks")]
fn invalid_runtime_config_is_rejected(
    #[case] sampler: SamplerCfg,
    #[case] dosing: DosingCfg,
    #[case] input: InputCfg,
    #[case] needle: &str,
) {
    let err = builder()
        .relay(RecordingRelay::default())
        .store(Persistence::new(MemoryStore::default()))
        .sampler_cfg(sampler)
        .dosing_cfg(dosing)
        .input_cfg(input)
        .try_build()
        .err()
        .expect("should be rejected");
    match err.downcast_ref::<BuildError>() {
        Some(BuildError::InvalidConfig(msg)) => assert!(msg.contains(needle), "{msg}"),
        other => panic!("expected InvalidConfig, got: {other:?}"),
    }
}

#[rstest]
fn params_load_from_store_when_not_given() {
    let mem = MemoryStore::default()
        .with(keys::SET_WEIGHT, SettingValue::Float(21.0))
        .with(keys::CALIBRATION, SettingValue::Float(f64::NAN));
    let cl = builder()
        .relay(RecordingRelay::default())
        .store(Persistence::new(mem.clone()))
        .try_build()
        .unwrap();
    assert_eq!(cl.params().target_weight, 21.0);
    assert_eq!(cl.params().scale_factor, 1396.21);
    assert_eq!(mem.write_count(keys::CALIBRATION), 1);
}
