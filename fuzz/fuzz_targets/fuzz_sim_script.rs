#![no_main]
use gbw_hardware::SimScript;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    if let Ok(script) = SimScript::parse(data) {
        // steps come back ordered by time
        assert!(script.steps().windows(2).all(|w| w[0].at_ms <= w[1].at_ms));
    }
});
