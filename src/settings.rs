use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::constants::{
    default_mode, KEY_DEATH_UNLOCKED, KEY_DELETE_SAVES, KEY_DIFFICULTY_MODE, KEY_WARNING_SHOWN,
    SETTINGS_FILE_VERSION,
};
use crate::policy::mode_from_persisted;
use crate::types::DifficultyMode;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("unsupported settings file version {version} at {}", path.display())]
    UnsupportedVersion { path: PathBuf, version: u8 },
    #[error("failed to write settings file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Str(String),
}

impl From<bool> for SettingValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for SettingValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

/// Persisted key-value settings owned by the host.
pub trait SettingsStore {
    fn has(&self, key: &str) -> bool;
    fn get(&self, key: &str, default: SettingValue) -> SettingValue;
    fn put(&mut self, key: &str, value: SettingValue);
    fn flush(&mut self) -> Result<(), SettingsError>;

    fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key, SettingValue::Bool(default)) {
            SettingValue::Bool(value) => value,
            SettingValue::Str(_) => default,
        }
    }

    fn get_string(&self, key: &str, default: &str) -> String {
        match self.get(key, SettingValue::from(default)) {
            SettingValue::Str(value) => value,
            SettingValue::Bool(_) => default.to_string(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct MemorySettings {
    values: BTreeMap<String, SettingValue>,
    flushes: usize,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, key: &str, value: impl Into<SettingValue>) -> Self {
        self.values.insert(key.to_string(), value.into());
        self
    }

    pub fn flush_count(&self) -> usize {
        self.flushes
    }
}

impl SettingsStore for MemorySettings {
    fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    fn get(&self, key: &str, default: SettingValue) -> SettingValue {
        self.values.get(key).cloned().unwrap_or(default)
    }

    fn put(&mut self, key: &str, value: SettingValue) {
        self.values.insert(key.to_string(), value);
    }

    fn flush(&mut self) -> Result<(), SettingsError> {
        self.flushes += 1;
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize)]
struct SettingsFile<'a> {
    version: u8,
    #[serde(rename = "updatedAt")]
    updated_at: String,
    values: &'a BTreeMap<String, SettingValue>,
}

#[derive(Clone, Debug, Deserialize)]
struct SettingsFileRaw {
    version: u8,
    #[serde(default)]
    values: BTreeMap<String, serde_json::Value>,
}

/// Settings persisted as a versioned JSON document.
pub struct JsonFileSettings {
    file_path: PathBuf,
    values: BTreeMap<String, SettingValue>,
}

impl JsonFileSettings {
    /// Opens the store. A missing or unreadable file starts empty.
    pub fn open(file_path: PathBuf) -> Self {
        let values = match load_values(&file_path) {
            Ok(values) => values,
            Err(error) => {
                warn!(%error, "[settings] starting with empty settings");
                BTreeMap::new()
            }
        };
        Self { file_path, values }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }
}

impl SettingsStore for JsonFileSettings {
    fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    fn get(&self, key: &str, default: SettingValue) -> SettingValue {
        self.values.get(key).cloned().unwrap_or(default)
    }

    fn put(&mut self, key: &str, value: SettingValue) {
        self.values.insert(key.to_string(), value);
    }

    fn flush(&mut self) -> Result<(), SettingsError> {
        if let Some(parent) = self.file_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| SettingsError::Write {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        let payload = SettingsFile {
            version: SETTINGS_FILE_VERSION,
            updated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            values: &self.values,
        };
        let text = serde_json::to_string_pretty(&payload)?;
        fs::write(&self.file_path, text).map_err(|source| SettingsError::Write {
            path: self.file_path.clone(),
            source,
        })?;
        debug!(path = %self.file_path.display(), "[settings] flushed");
        Ok(())
    }
}

fn load_values(path: &Path) -> Result<BTreeMap<String, SettingValue>, SettingsError> {
    let text = match fs::read_to_string(path) {
        Ok(value) => value,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            return Ok(BTreeMap::new());
        }
        Err(source) => {
            return Err(SettingsError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    let parsed: SettingsFileRaw =
        serde_json::from_str(&text).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    if parsed.version != SETTINGS_FILE_VERSION {
        return Err(SettingsError::UnsupportedVersion {
            path: path.to_path_buf(),
            version: parsed.version,
        });
    }

    let mut values = BTreeMap::new();
    for (key, raw) in parsed.values {
        match serde_json::from_value::<SettingValue>(raw) {
            Ok(value) => {
                values.insert(key, value);
            }
            Err(error) => {
                warn!(%key, %error, path = %path.display(), "[settings] dropping invalid entry");
            }
        }
    }
    Ok(values)
}

/// Typed view over the four keys the permadeath rules read and write.
pub struct DifficultySettings<S> {
    store: S,
    last_corrupt_mode: Option<String>,
}

impl<S: SettingsStore> DifficultySettings<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            last_corrupt_mode: None,
        }
    }

    /// Writes any absent default and flushes. Returns whether anything was written.
    pub fn initialize_defaults(&mut self) -> Result<bool, SettingsError> {
        let defaults = [
            (KEY_DIFFICULTY_MODE, SettingValue::from(default_mode().as_str())),
            (KEY_DELETE_SAVES, SettingValue::Bool(false)),
            (KEY_WARNING_SHOWN, SettingValue::Bool(false)),
            (KEY_DEATH_UNLOCKED, SettingValue::Bool(false)),
        ];
        let mut written = false;
        for (key, value) in defaults {
            if !self.store.has(key) {
                self.store.put(key, value);
                written = true;
            }
        }
        self.store.flush()?;
        if written {
            info!("[settings] defaults initialized");
        }
        Ok(written)
    }

    /// Reads the active mode. Re-read on every call; never cached.
    pub fn mode(&mut self) -> DifficultyMode {
        let raw = self
            .store
            .get_string(KEY_DIFFICULTY_MODE, default_mode().as_str());
        let mode = mode_from_persisted(&raw);
        if mode.is_normal() && raw != DifficultyMode::Normal.as_str() {
            if self.last_corrupt_mode.as_deref() != Some(raw.as_str()) {
                warn!(raw = %raw, "[settings] unknown difficulty mode, treating as normal");
                self.last_corrupt_mode = Some(raw);
            }
        } else {
            self.last_corrupt_mode = None;
        }
        mode
    }

    pub fn delete_saves(&self) -> bool {
        self.store.get_bool(KEY_DELETE_SAVES, false)
    }

    pub fn warning_shown(&self) -> bool {
        self.store.get_bool(KEY_WARNING_SHOWN, false)
    }

    pub fn death_unlocked(&self) -> bool {
        self.store.get_bool(KEY_DEATH_UNLOCKED, false)
    }

    pub fn set_mode(&mut self, mode: DifficultyMode) {
        self.store.put(KEY_DIFFICULTY_MODE, SettingValue::from(mode.as_str()));
    }

    pub fn set_delete_saves(&mut self, value: bool) {
        self.store.put(KEY_DELETE_SAVES, SettingValue::Bool(value));
    }

    pub fn set_warning_shown(&mut self, value: bool) {
        self.store.put(KEY_WARNING_SHOWN, SettingValue::Bool(value));
    }

    pub fn unlock_death_mode(&mut self) {
        self.store.put(KEY_DEATH_UNLOCKED, SettingValue::Bool(true));
    }

    pub fn flush(&mut self) -> Result<(), SettingsError> {
        self.store.flush()
    }

    /// Flushes, logging instead of propagating a failure.
    pub fn flush_logged(&mut self) {
        if let Err(error) = self.store.flush() {
            warn!(%error, "[settings] flush failed");
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(name: &str) -> PathBuf {
        let unique = format!(
            "{}-{}-{}",
            name,
            std::process::id(),
            rand::random::<u64>()
        );
        std::env::temp_dir().join(unique).join("settings.json")
    }

    #[test]
    fn defaults_are_written_once_and_never_overwrite() {
        let store = MemorySettings::new().with_value(KEY_DIFFICULTY_MODE, "ultra");
        let mut settings = DifficultySettings::new(store);

        assert!(settings.initialize_defaults().expect("memory flush"));
        assert_eq!(settings.mode(), DifficultyMode::Ultra);
        assert!(!settings.delete_saves());
        assert!(!settings.warning_shown());
        assert!(!settings.death_unlocked());

        assert!(!settings.initialize_defaults().expect("memory flush"));
        assert_eq!(settings.store().flush_count(), 2);
    }

    #[test]
    fn unknown_mode_reads_as_normal() {
        let store = MemorySettings::new().with_value(KEY_DIFFICULTY_MODE, "nightmare");
        let mut settings = DifficultySettings::new(store);
        assert_eq!(settings.mode(), DifficultyMode::Normal);

        let store = MemorySettings::new().with_value(KEY_DIFFICULTY_MODE, true);
        let mut settings = DifficultySettings::new(store);
        assert_eq!(settings.mode(), DifficultyMode::Normal);
    }

    #[test]
    fn padded_mode_names_do_not_escalate() {
        for raw in [" death", "death\n", "\tultra ", "hardcore "] {
            let store = MemorySettings::new().with_value(KEY_DIFFICULTY_MODE, raw);
            let mut settings = DifficultySettings::new(store);
            assert_eq!(settings.mode(), DifficultyMode::Normal, "{raw:?}");
            assert_eq!(settings.last_corrupt_mode.as_deref(), Some(raw));
        }
    }

    #[test]
    fn mode_is_reread_after_external_change() {
        let mut settings = DifficultySettings::new(MemorySettings::new());
        assert_eq!(settings.mode(), DifficultyMode::Normal);
        settings
            .store_mut()
            .put(KEY_DIFFICULTY_MODE, SettingValue::from("hardcore"));
        assert_eq!(settings.mode(), DifficultyMode::Hardcore);
    }

    #[test]
    fn bool_reads_fall_back_on_type_mismatch() {
        let store = MemorySettings::new().with_value(KEY_DELETE_SAVES, "yes");
        let settings = DifficultySettings::new(store);
        assert!(!settings.delete_saves());
    }

    #[test]
    fn json_store_persists_across_reopen() {
        let path = temp_file("onetry-settings-roundtrip");
        let mut store = JsonFileSettings::open(path.clone());
        store.put(KEY_DIFFICULTY_MODE, SettingValue::from("death"));
        store.put(KEY_DEATH_UNLOCKED, SettingValue::Bool(true));
        store.flush().expect("flush settings");

        let reopened = JsonFileSettings::open(path.clone());
        assert_eq!(reopened.get_string(KEY_DIFFICULTY_MODE, "normal"), "death");
        assert!(reopened.get_bool(KEY_DEATH_UNLOCKED, false));
        assert!(!reopened.has(KEY_WARNING_SHOWN));

        let _ = fs::remove_file(&path);
        if let Some(parent) = path.parent() {
            let _ = fs::remove_dir_all(parent);
        }
    }

    #[test]
    fn json_store_drops_invalid_entries_and_keeps_valid_ones() {
        let path = temp_file("onetry-settings-partial");
        let parent = path.parent().expect("parent exists").to_path_buf();
        fs::create_dir_all(&parent).expect("create dir");
        let raw = r#"{
  "version": 1,
  "updatedAt": "2026-01-01T00:00:00.000Z",
  "values": {
    "ot-difficulty-mode": "hardcore",
    "ot-delete-saves": 3,
    "ot-warning-shown": true
  }
}"#;
        fs::write(&path, raw).expect("write file");

        let store = JsonFileSettings::open(path.clone());
        assert_eq!(store.get_string(KEY_DIFFICULTY_MODE, "normal"), "hardcore");
        assert!(!store.has(KEY_DELETE_SAVES));
        assert!(store.get_bool(KEY_WARNING_SHOWN, false));

        let _ = fs::remove_dir_all(&parent);
    }

    #[test]
    fn json_store_starts_empty_on_unsupported_version() {
        let path = temp_file("onetry-settings-version");
        let parent = path.parent().expect("parent exists").to_path_buf();
        fs::create_dir_all(&parent).expect("create dir");
        fs::write(&path, r#"{"version": 9, "values": {"ot-difficulty-mode": "death"}}"#)
            .expect("write file");

        let store = JsonFileSettings::open(path.clone());
        assert!(!store.has(KEY_DIFFICULTY_MODE));
        assert!(matches!(
            load_values(&path),
            Err(SettingsError::UnsupportedVersion { version: 9, .. })
        ));

        let _ = fs::remove_dir_all(&parent);
    }
}
