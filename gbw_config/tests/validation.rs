use gbw_config::load_toml;
use rstest::rstest;

#[test]
fn empty_file_is_valid_defaults() {
    let cfg = load_toml("").expect("parse TOML");
    cfg.validate().expect("defaults must validate");
    assert_eq!(cfg.pins.hx711_dt, 19);
    assert_eq!(cfg.pins.relay, 33);
    assert_eq!(cfg.pins.trigger, Some(25));
    assert_eq!(cfg.sampler.sample_rate_hz, 10);
    assert_eq!(cfg.store.path, "gbw_settings.toml");
    assert!(cfg.relay.active_high);
}

#[test]
fn partial_sections_keep_other_defaults() {
    let toml = r#"
[pins]
relay = 17

[relay]
active_high = false

[dosing]
max_grind_ms = 25000
"#;
    let cfg = load_toml(toml).expect("parse TOML");
    cfg.validate().expect("valid");
    assert_eq!(cfg.pins.relay, 17);
    assert_eq!(cfg.pins.hx711_sck, 18);
    assert!(!cfg.relay.active_high);
    assert_eq!(cfg.dosing.max_grind_ms, 25_000);
    assert_eq!(cfg.dosing.stall_window_ms, 2_000);
}

#[test]
fn unknown_value_type_fails_parse() {
    assert!(load_toml("[sampler]\nsample_rate_hz = \"fast\"\n").is_err());
}

#[rstest]
#[case("[sampler]\nsample_rate_hz = 0\n", "sampler.sample_rate_hz must be > 0")]
#[case("[sampler]\nsample_rate_hz = 120\n", "sampler.sample_rate_hz must be <= 80")]
#[case("[sampler]\ntare_retries = 0\n", "sampler.tare_retries must be >= 1")]
#[case("[sampler]\ndeadband_g = -1.0\n", "sampler.deadband_g")]
#[case("[filter]\nmeasurement_error = 0.0\n", "filter.measurement_error must be > 0")]
#[case("[dosing]\nremoved_below_g = 5.0\n", "dosing.removed_below_g must be negative")]
#[case("[dosing]\nstall_window_ms = 30000\n", "dosing.stall_window_ms must be <")]
#[case("[dosing]\nfailed_reset_g = 2.0\n", "dosing.failed_reset_g must be > 5")]
#[case("[input]\nburst_clicks = 2\n", "input.burst_clicks must be >= 3")]
#[case("[input]\ntarget_min_g = 50.0\ntarget_max_g = 40.0\n", "input.target_min_g")]
#[case("[input]\nbounce_ms = 400\n", "input.bounce_ms must be <")]
#[case("[relay]\npulse_ms = 0\n", "relay.pulse_ms must be in [1, 2000]")]
#[case("[logging]\nrotation = \"weekly\"\n", "logging.rotation must be one of")]
#[case("[store]\npath = \"  \"\n", "store.path must not be empty")]
fn rejects_invalid_values(#[case] toml: &str, #[case] needle: &str) {
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should be rejected");
    assert!(format!("{err}").contains(needle), "got: {err}");
}
