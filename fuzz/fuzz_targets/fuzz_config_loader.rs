#![no_main]
use libfuzzer_sys::fuzz_target;

// Parse and validation errors are fine; panics are not.
fuzz_target!(|data: &str| {
    if let Ok(cfg) = toml::from_str::<gbw_config::Config>(data) {
        let _ = cfg.validate();
    }
});
