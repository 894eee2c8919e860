//! Human-readable error descriptions and structured JSON error formatting.

use gbw_core::error::{BuildError, FaultReason, GbwError};

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingRelay => {
                "What happened: No grinder relay was provided to the control loop.\nLikely causes: The relay pin failed to initialize.\nHow to fix: Check [pins] relay in the config and GPIO permissions.".to_string()
            }
            BuildError::MissingStore => {
                "What happened: No settings store was provided to the control loop.\nLikely causes: The settings file could not be opened.\nHow to fix: Check [store] path (or --settings) points to a writable location.".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
            ),
        };
    }

    if let Some(ge) = err.downcast_ref::<GbwError>() {
        return match ge {
            GbwError::Timeout => "What happened: Scale read timed out.\nLikely causes: HX711 not wired correctly, no power/ground, or read timeout too low.\nHow to fix: Verify DT/SCK pins and power, and consider increasing sampler.read_timeout_ms in the config.".to_string(),
            GbwError::Fault(reason) => fault_help(*reason).to_string(),
            GbwError::InvalidInput(msg) => format!(
                "What happened: Rejected value ({msg}).\nLikely causes: A setting outside its allowed range.\nHow to fix: Pick a value inside the range and retry."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let chain = format!("{err:#}");
    let lower = chain.to_ascii_lowercase();

    if (lower.contains("hx711") && lower.contains("timeout")) || lower.contains("data-ready timeout")
    {
        return "What happened: HX711 did not produce data within the configured timeout.\nLikely causes: Wrong DT/SCK pins, wiring/power issues, or timeout configured too low.\nHow to fix: Check [pins] in the config, verify 5V/GND, and raise sampler.read_timeout_ms.".to_string();
    }

    if lower.contains("open hx711") || lower.contains("open relay pin") || lower.contains("open encoder pins") {
        return format!(
            "What happened: Failed to initialize hardware pins ({chain}).\nLikely causes: Incorrect pin numbers or insufficient GPIO permissions.\nHow to fix: Fix the [pins] values in the config; ensure the process has permission to access GPIO."
        );
    }

    if lower.contains("built without hardware support") {
        return "What happened: This binary has no GPIO support.\nLikely causes: Built without the `hardware` feature.\nHow to fix: Use --sim, or rebuild with `--features hardware` on the Raspberry Pi.".to_string();
    }

    if lower.contains("invalid configuration") || lower.contains("parse config") {
        return format!(
            "What happened: Configuration is invalid ({chain}).\nLikely causes: A typo or out-of-range value in the TOML.\nHow to fix: Edit the TOML config and try again."
        );
    }

    if lower.contains("calibration csv must have headers") {
        return "Invalid headers in calibration CSV. Expected 'raw,grams'.".to_string();
    }

    if lower.contains("sim script line") {
        return format!("Invalid simulator script: {chain}");
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

fn fault_help(reason: FaultReason) -> &'static str {
    match reason {
        FaultReason::CupRemoved => "What happened: The cup was removed while grinding.\nLikely causes: Cup taken away early or knocked off the scale.\nHow to fix: Leave the cup in place until grinding finishes.",
        FaultReason::CupLifted => "What happened: The weight jumped while grinding.\nLikely causes: Cup lifted or pressed on during the grind.\nHow to fix: Do not touch the cup until grinding finishes.",
        FaultReason::SensorLost => "What happened: The scale stopped responding while grinding.\nLikely causes: Loose HX711 wiring or a failing load cell.\nHow to fix: Check the load-cell connector and HX711 power.",
        FaultReason::Timeout => "What happened: Grinding took longer than allowed.\nLikely causes: Empty hopper or very fine setting.\nHow to fix: Refill beans or raise dosing.max_grind_ms.",
        FaultReason::NoIncrease => "What happened: Weight stopped increasing while grinding.\nLikely causes: Empty hopper, clogged chute, or grinder not running.\nHow to fix: Check beans and the grinder, then start a new dose.",
        FaultReason::Actuator => "What happened: The grinder relay could not be switched.\nLikely causes: GPIO error on the relay pin.\nHow to fix: Check [pins] relay and the relay board power.",
    }
}

/// Stable exit codes for dose faults; other errors return 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if let Some(GbwError::Fault(reason)) = err.downcast_ref::<GbwError>() {
        return match reason {
            FaultReason::CupRemoved => 2,
            FaultReason::SensorLost => 3,
            FaultReason::Timeout => 4,
            FaultReason::NoIncrease => 5,
            FaultReason::CupLifted => 6,
            FaultReason::Actuator => 7,
        };
    }
    1
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    if let Some(GbwError::Fault(reason)) = err.downcast_ref::<GbwError>() {
        return json!({ "reason": reason.as_str(), "message": humanize(err) }).to_string();
    }
    json!({ "reason": "error", "message": humanize(err) }).to_string()
}
