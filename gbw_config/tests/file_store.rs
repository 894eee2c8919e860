use gbw_config::{FileStore, write_atomic};
use gbw_traits::{SettingValue, SettingsStore};
use rstest::rstest;
use tempfile::tempdir;

#[rstest]
fn missing_file_starts_empty() {
    let dir = tempdir().unwrap();
    let store = FileStore::open(dir.path().join("settings.toml")).unwrap();
    assert_eq!(store.get("setWeight").unwrap(), None);
    assert_eq!(store.keys().count(), 0);
}

#[rstest]
fn values_survive_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("settings.toml");
    {
        let mut store = FileStore::open(&path).unwrap();
        store.put("setWeight", SettingValue::Float(18.5)).unwrap();
        store.put("grindMode", SettingValue::Bool(true)).unwrap();
        store.put("shotCount", SettingValue::UInt(7)).unwrap();
        store.put("sleepTime", SettingValue::Int(60_000)).unwrap();
        store.flush().unwrap();
    }
    let store = FileStore::open(&path).unwrap();
    assert_eq!(store.get("setWeight").unwrap(), Some(SettingValue::Float(18.5)));
    assert_eq!(store.get("grindMode").unwrap(), Some(SettingValue::Bool(true)));
    // integers come back signed; readers convert
    let shots = store.get("shotCount").unwrap().and_then(|v| v.as_u32());
    assert_eq!(shots, Some(7));
    assert_eq!(store.get("sleepTime").unwrap(), Some(SettingValue::Int(60_000)));
}

#[rstest]
fn put_without_flush_is_not_durable() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("settings.toml");
    let mut store = FileStore::open(&path).unwrap();
    store.put("offset", SettingValue::Float(-2.5)).unwrap();
    assert!(!path.exists());
    store.flush().unwrap();
    assert!(path.exists());
    assert!(!path.with_extension("new").exists());
}

#[rstest]
fn clear_removes_keys_on_flush() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("settings.toml");
    let mut store = FileStore::open(&path).unwrap();
    store.put("cup", SettingValue::Float(70.0)).unwrap();
    store.flush().unwrap();
    store.clear();
    store.flush().unwrap();
    let reopened = FileStore::open(&path).unwrap();
    assert_eq!(reopened.get("cup").unwrap(), None);
}

#[rstest]
fn wrong_type_is_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("settings.toml");
    std::fs::write(&path, "setWeight = \"eighteen\"\n").unwrap();
    let store = FileStore::open(&path).unwrap();
    assert!(store.get("setWeight").is_err());
}

#[rstest]
#[case("this is = = not toml")]
#[case("calibration = nan\nsetWeight = \n")]
fn corrupt_file_is_set_aside(#[case] text: &str) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("settings.toml");
    std::fs::write(&path, text).unwrap();

    let mut store = FileStore::open(&path).unwrap();
    assert!(store.recovered());
    assert_eq!(store.keys().count(), 0);
    assert_eq!(store.get("calibration").unwrap(), None);
    let aside = dir.path().join("settings.toml.corrupt");
    assert_eq!(std::fs::read_to_string(&aside).unwrap(), text);

    store.put("calibration", SettingValue::Float(1396.21)).unwrap();
    store.flush().unwrap();
    let reopened = FileStore::open(&path).unwrap();
    assert!(!reopened.recovered());
    assert_eq!(reopened.get("calibration").unwrap(), Some(SettingValue::Float(1396.21)));
}

#[rstest]
fn recovered_store_flushes_even_without_puts() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("settings.toml");
    std::fs::write(&path, "[[[").unwrap();
    let mut store = FileStore::open(&path).unwrap();
    store.flush().unwrap();
    let reopened = FileStore::open(&path).unwrap();
    assert!(!reopened.recovered());
    assert_eq!(reopened.keys().count(), 0);
}

#[rstest]
fn write_atomic_replaces_contents() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("out.toml");
    write_atomic(&path, b"a = 1\n").unwrap();
    write_atomic(&path, b"a = 2\n").unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "a = 2\n");
}
