use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::{TempDir, tempdir};

fn gbw(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("gbw").unwrap();
    cmd.env_remove("RUST_LOG")
        .arg("--settings")
        .arg(settings_path(dir))
        .arg("--log-level")
        .arg("warn");
    cmd
}

fn settings_path(dir: &TempDir) -> PathBuf {
    dir.path().join("settings.toml")
}

fn stdout_json(out: &std::process::Output) -> serde_json::Value {
    serde_json::from_slice(&out.stdout).expect("stdout is one JSON object")
}

#[test]
fn help_lists_commands() {
    Command::cargo_bin("gbw")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("self-check"))
        .stdout(predicate::str::contains("settings"))
        .stdout(predicate::str::contains("calibrate"));
}

#[test]
fn settings_show_on_fresh_file_reports_defaults() {
    let dir = tempdir().unwrap();
    let out = gbw(&dir).args(["settings", "show"]).output().unwrap();
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let v = stdout_json(&out);
    assert_eq!(v["calibration"], 1396.21);
    assert_eq!(v["shotCount"], 0);
}

#[test]
fn settings_set_persists_and_show_reads_back() {
    let dir = tempdir().unwrap();
    gbw(&dir)
        .args(["settings", "set", "setWeight=17.5&offset=-1.5&grindMode=on"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""setWeight":17.5"#))
        .stdout(predicate::str::contains(r#""grindMode":true"#));

    let out = gbw(&dir).args(["settings", "show"]).output().unwrap();
    let v = stdout_json(&out);
    assert_eq!(v["setWeight"], 17.5);
    assert_eq!(v["offset"], -1.5);
    assert_eq!(v["grindMode"], true);
}

#[test]
fn settings_set_accepts_json_bodies() {
    let dir = tempdir().unwrap();
    gbw(&dir)
        .args([
            "settings",
            "set",
            "--content-type",
            "application/json",
            r#"{"scaleMode": true}"#,
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""scaleMode":true"#));
}

#[test]
fn json_body_with_only_unknown_fields_is_rejected_like_form() {
    let dir = tempdir().unwrap();
    gbw(&dir)
        .args([
            "settings",
            "set",
            "--content-type",
            "application/json",
            r#"{"bogus": 1}"#,
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no recognised settings fields"));
}

#[test]
fn wifi_credentials_ask_for_restart() {
    let dir = tempdir().unwrap();
    gbw(&dir)
        .args(["settings", "set", "ssid=home&password=secret"])
        .assert()
        .success()
        .stderr(predicate::str::contains("restart required"));
}

#[rstest]
#[case("setWeight=500", "setWeight must be within")]
#[case("setWeight=lots", "setWeight must be a number")]
#[case("bogus=1", "no recognised settings fields")]
fn settings_set_rejects_bad_values(#[case] body: &str, #[case] needle: &str) {
    let dir = tempdir().unwrap();
    gbw(&dir)
        .args(["settings", "set", body])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains(needle));
}

#[test]
fn settings_reset_keeps_shot_count() {
    let dir = tempdir().unwrap();
    fs::write(settings_path(&dir), "setWeight = 21.0\nshotCount = 42\n").unwrap();

    let out = gbw(&dir).args(["settings", "reset"]).output().unwrap();
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let v = stdout_json(&out);
    assert_eq!(v["setWeight"], 18.0);
    assert_eq!(v["shotCount"], 42);
}

#[test]
fn corrupt_settings_file_starts_from_defaults() {
    let dir = tempdir().unwrap();
    let path = settings_path(&dir);
    fs::write(&path, "calibration = nan\nsetWeight = \n").unwrap();

    let out = gbw(&dir).args(["settings", "show"]).output().unwrap();
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let v = stdout_json(&out);
    assert_eq!(v["calibration"], 1396.21);
    assert_eq!(v["setWeight"], 18.0);

    assert!(dir.path().join("settings.toml.corrupt").exists());
    let rewritten = fs::read_to_string(&path).unwrap();
    assert!(rewritten.contains("calibration = 1396.2"), "{rewritten}");
    assert!(rewritten.contains("setWeight = 18"), "{rewritten}");
}

#[test]
fn wrong_typed_setting_is_replaced_on_disk() {
    let dir = tempdir().unwrap();
    let path = settings_path(&dir);
    fs::write(&path, "calibration = \"x\"\nsetWeight = 20.0\n").unwrap();

    let out = gbw(&dir).args(["settings", "show"]).output().unwrap();
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(stdout_json(&out)["setWeight"], 20.0);

    let rewritten = fs::read_to_string(&path).unwrap();
    assert!(!rewritten.contains("\"x\""), "{rewritten}");
    assert!(rewritten.contains("calibration = 1396.2"), "{rewritten}");
}

#[test]
fn calibrate_rejects_bad_headers() {
    let dir = tempdir().unwrap();
    let csv = dir.path().join("cal.csv");
    fs::write(&csv, "counts,weight\n842913,0\n982534,100\n").unwrap();

    gbw(&dir)
        .arg("calibrate")
        .arg("--csv")
        .arg(&csv)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid headers in calibration CSV"));
}

#[test]
fn calibrate_save_updates_settings() {
    let dir = tempdir().unwrap();
    let csv = dir.path().join("cal.csv");
    // 1000 counts per gram, zero at 50_000
    fs::write(&csv, "raw,grams\n50000,0\n100000,50\n150000,100\n").unwrap();

    gbw(&dir)
        .arg("calibrate")
        .arg("--csv")
        .arg(&csv)
        .arg("--save")
        .assert()
        .success()
        .stdout(predicate::str::contains("zero_counts=50000"))
        .stdout(predicate::str::contains("(saved)"));

    let out = gbw(&dir).args(["settings", "show"]).output().unwrap();
    let factor = stdout_json(&out)["calibration"].as_f64().unwrap();
    assert!((factor - 1000.0).abs() < 0.01, "{factor}");
}

#[test]
fn invalid_config_fails_with_hint() {
    let dir = tempdir().unwrap();
    let cfg = dir.path().join("gbw.toml");
    fs::write(&cfg, "[sampler]\nsample_rate_hz = 0\n").unwrap();

    gbw(&dir)
        .arg("--config")
        .arg(&cfg)
        .args(["settings", "show"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Configuration is invalid"))
        .stderr(predicate::str::contains("sample_rate_hz"));
}

#[test]
fn json_mode_reports_errors_as_json() {
    let dir = tempdir().unwrap();
    let out = gbw(&dir)
        .args(["--json", "settings", "set", "setWeight=500"])
        .output()
        .unwrap();
    assert!(!out.status.success());
    let last = String::from_utf8_lossy(&out.stderr)
        .lines()
        .last()
        .unwrap_or_default()
        .to_string();
    let v: serde_json::Value = serde_json::from_str(&last).unwrap();
    assert_eq!(v["reason"], "error");
    assert!(v["message"].as_str().unwrap().contains("setWeight"));
}

#[test]
fn self_check_on_simulator() {
    let dir = tempdir().unwrap();
    gbw(&dir)
        .args(["self-check", "--sim"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ok: backend=sim"));
}

#[test]
fn sim_run_stops_at_max_runtime() {
    let dir = tempdir().unwrap();
    let script = dir.path().join("idle.sim");
    fs::write(&script, "# nothing happens\n").unwrap();

    let out = gbw(&dir)
        .arg("--json")
        .arg("run")
        .arg("--sim-script")
        .arg(&script)
        .args(["--max-runtime-ms", "800"])
        .output()
        .unwrap();
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let v = stdout_json(&out);
    assert_eq!(v["doses_completed"], 0);
    assert_eq!(v["final_state"], "idle");
    assert!(v["fault"].is_null());
}

#[test]
fn malformed_sim_script_is_reported() {
    let dir = tempdir().unwrap();
    let script = dir.path().join("bad.sim");
    fs::write(&script, "100 cup 70\nsoon remove\n").unwrap();

    gbw(&dir)
        .arg("run")
        .arg("--sim-script")
        .arg(&script)
        .assert()
        .failure()
        .stderr(predicate::str::contains("sim script line 2"));
}
