//! TOML-file settings backend.
use gbw_traits::{SettingValue, SettingsStore};
use std::path::{Path, PathBuf};
use std::{fs, io::Write};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Write via a sibling temp file and rename, so a crash never leaves a torn file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("new");
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(tmp, path)
}

/// Flat `key = value` TOML file. `put` buffers; `flush` writes the whole table.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    table: toml::Table,
    dirty: bool,
    recovered: bool,
}

impl FileStore {
    /// Open `path`, starting empty if the file does not exist yet.
    ///
    /// A file that is not valid TOML is moved to `<path>.corrupt` and the
    /// store starts empty, so the next flush writes a clean file.
    pub fn open(path: impl Into<PathBuf>) -> eyre::Result<Self> {
        let path = path.into();
        let (table, recovered) = match fs::read_to_string(&path) {
            Ok(s) => match s.parse::<toml::Table>() {
                Ok(t) => (t, false),
                Err(e) => {
                    let aside = corrupt_path(&path);
                    tracing::warn!(
                        path = %path.display(),
                        moved_to = %aside.display(),
                        error = %e,
                        "settings file is not valid TOML; starting from defaults"
                    );
                    if let Err(e) = fs::rename(&path, &aside) {
                        tracing::warn!(error = %e, "could not move corrupt settings file aside");
                    }
                    (toml::Table::new(), true)
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (toml::Table::new(), false),
            Err(e) => eyre::bail!("read settings file {}: {e}", path.display()),
        };
        Ok(Self {
            path,
            table,
            dirty: recovered,
            recovered,
        })
    }

    /// Whether `open` found an unparsable file and started empty.
    pub fn recovered(&self) -> bool {
        self.recovered
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drop every stored key (factory reset). Takes effect on the next flush.
    pub fn clear(&mut self) {
        self.table.clear();
        self.dirty = true;
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.table.keys().map(String::as_str)
    }
}

fn corrupt_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".corrupt");
    PathBuf::from(name)
}

fn to_toml(v: SettingValue) -> toml::Value {
    match v {
        SettingValue::Float(f) => toml::Value::Float(f),
        SettingValue::Bool(b) => toml::Value::Boolean(b),
        SettingValue::UInt(u) => toml::Value::Integer(i64::from(u)),
        SettingValue::Int(i) => toml::Value::Integer(i),
    }
}

impl SettingsStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<SettingValue>, BoxError> {
        match self.table.get(key) {
            None => Ok(None),
            Some(toml::Value::Float(f)) => Ok(Some(SettingValue::Float(*f))),
            Some(toml::Value::Boolean(b)) => Ok(Some(SettingValue::Bool(*b))),
            Some(toml::Value::Integer(i)) => Ok(Some(SettingValue::Int(*i))),
            Some(other) => Err(format!(
                "settings key {key} has unsupported type {}",
                other.type_str()
            )
            .into()),
        }
    }

    fn put(&mut self, key: &str, value: SettingValue) -> Result<(), BoxError> {
        let v = to_toml(value);
        if self.table.get(key) != Some(&v) {
            self.table.insert(key.to_string(), v);
            self.dirty = true;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), BoxError> {
        if !self.dirty {
            return Ok(());
        }
        let text = toml::to_string(&self.table)?;
        write_atomic(&self.path, text.as_bytes())?;
        self.dirty = false;
        tracing::debug!(path = %self.path.display(), keys = self.table.len(), "settings flushed");
        Ok(())
    }
}
