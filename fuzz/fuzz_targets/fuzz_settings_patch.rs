#![no_main]
use gbw_config::SettingsPatch;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    let _ = SettingsPatch::from_form(data);
    if let Ok(p) = SettingsPatch::from_json(data) {
        let _ = p.wifi_changed();
    }
});
