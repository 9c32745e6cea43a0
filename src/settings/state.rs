//! Persisted session state: the reconnect flag and the devices to replay at startup
//!
//! Stored as indented JSON, e.g.
//! `{ "Reconnect": true, "LastDevices": ["<device id>", ...] }`.
//! Loading never fails: a missing or unreadable file yields the defaults.

use crate::error::{AppError, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSettings {
    #[serde(rename = "Reconnect", default)]
    pub reconnect: bool,

    #[serde(rename = "LastDevices", default, deserialize_with = "null_as_empty")]
    pub last_device_ids: Vec<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Reads and writes `PersistedSettings` at a fixed path
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the state, falling back to defaults on any error
    pub fn load(&self) -> PersistedSettings {
        match self.try_load() {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Could not load state from {:?}, using defaults: {}", self.path, e);
                PersistedSettings::default()
            }
        }
    }

    pub fn try_load(&self) -> Result<PersistedSettings> {
        if !self.path.exists() {
            debug!("State file {:?} not found, using defaults", self.path);
            return Ok(PersistedSettings::default());
        }

        let content = fs::read_to_string(&self.path)?;
        let settings: PersistedSettings = serde_json::from_str(&content)?;
        info!(
            "Loaded state: reconnect={}, {} device(s)",
            settings.reconnect,
            settings.last_device_ids.len()
        );
        Ok(settings)
    }

    /// Save the state; failures are logged and otherwise ignored
    pub fn save(&self, settings: &PersistedSettings) {
        if let Err(e) = self.try_save(settings) {
            warn!("Could not save state to {:?}: {}", self.path, e);
        }
    }

    /// Write through a temporary file and rename it over the target
    pub fn try_save(&self, settings: &PersistedSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let content = serde_json::to_string_pretty(settings)?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, content)?;
        fs::rename(&tmp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            AppError::IoError(e)
        })?;

        info!(
            "Saved state: reconnect={}, {} device(s)",
            settings.reconnect,
            settings.last_device_ids.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_field_names() {
        let settings = PersistedSettings {
            reconnect: true,
            last_device_ids: vec!["A".to_string()],
        };
        let json = serde_json::to_string(&settings).unwrap();
        assert_eq!(json, r#"{"Reconnect":true,"LastDevices":["A"]}"#);
    }

    #[test]
    fn test_null_devices_is_empty() {
        let parsed: PersistedSettings =
            serde_json::from_str(r#"{"Reconnect":true,"LastDevices":null}"#).unwrap();
        assert!(parsed.reconnect);
        assert!(parsed.last_device_ids.is_empty());
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let parsed: PersistedSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed, PersistedSettings::default());
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let parsed: PersistedSettings =
            serde_json::from_str(r#"{"Reconnect":false,"LastDevices":[],"Theme":"dark"}"#)
                .unwrap();
        assert!(!parsed.reconnect);
    }
}
