//! Persisted settings store
//!
//! Key-value settings keyed by domain (`obs`, `overlay`, ...). Values are
//! opaque JSON owned by the UI; the host only seeds defaults and reads the
//! `obs` domain to find the remote endpoint. Last write wins.

use crate::remote::Endpoint;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Domain holding the remote endpoint
pub const OBS_DOMAIN: &str = "obs";

/// Domain holding the overlay appearance settings
pub const OVERLAY_DOMAIN: &str = "overlay";

pub trait ConfigStore: Send + Sync {
    /// Stored value for `key`, or its default (`null` for unknown keys)
    fn get(&self, key: &str) -> Value;

    fn set(&self, key: &str, value: Value) -> Result<()>;

    /// Remote endpoint from the `obs` domain, defaults on a malformed value
    fn endpoint(&self) -> Endpoint {
        match serde_json::from_value(self.get(OBS_DOMAIN)) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                warn!("Malformed {} settings, using defaults: {}", OBS_DOMAIN, e);
                Endpoint::default()
            }
        }
    }
}

/// Overlay position preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayPosition {
    Center,
    Custom,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

/// Defaults seeded for the `overlay` domain
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlaySettings {
    pub show_status_text: bool,
    pub show_pause_button: bool,
    pub show_refresh_button: bool,
    pub show_move_button: bool,
    pub default_position: OverlayPosition,
    pub custom_position: Position,
    pub idle_time_seconds: u32,
    pub initial_opacity: f32,
    pub idle_opacity: f32,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            show_status_text: true,
            show_pause_button: true,
            show_refresh_button: true,
            show_move_button: true,
            default_position: OverlayPosition::Center,
            custom_position: Position::default(),
            idle_time_seconds: 5,
            initial_opacity: 1.0,
            idle_opacity: 0.3,
        }
    }
}

/// Default value for a settings domain
pub fn default_for(key: &str) -> Value {
    let value = match key {
        OBS_DOMAIN => serde_json::to_value(Endpoint::default()),
        OVERLAY_DOMAIN => serde_json::to_value(OverlaySettings::default()),
        _ => Ok(Value::Null),
    };
    value.unwrap_or(Value::Null)
}

/// Settings persisted as a single JSON object on disk
pub struct JsonFileStore {
    path: PathBuf,
    values: Mutex<Map<String, Value>>,
}

impl JsonFileStore {
    /// Open the store at the default location
    pub fn open_default() -> Result<Self> {
        Self::open(Self::default_path()?)
    }

    /// Open a store file, starting empty if it doesn't exist yet
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings file: {:?}", path))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse settings file: {:?}", path))?
        } else {
            Map::new()
        };

        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    /// Get the settings file path
    pub fn default_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "obsoverlay", "ObsOverlay")
            .context("Failed to determine data directory")?;
        Ok(proj_dirs.data_dir().join("settings.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, values: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create data directory: {:?}", parent))?;
        }

        let content =
            serde_json::to_string_pretty(values).context("Failed to serialize settings")?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write settings file: {:?}", self.path))?;
        Ok(())
    }
}

impl ConfigStore for JsonFileStore {
    fn get(&self, key: &str) -> Value {
        self.values
            .lock()
            .get(key)
            .cloned()
            .unwrap_or_else(|| default_for(key))
    }

    /// Memory only changes once the file write succeeded
    fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut values = self.values.lock();
        let mut updated = values.clone();
        updated.insert(key.to_string(), value);
        self.persist(&updated)?;
        *values = updated;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_for_known_domains() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("settings.json")).unwrap();

        assert_eq!(
            store.get(OBS_DOMAIN),
            json!({ "host": "localhost", "port": 4455, "password": "" })
        );
        assert_eq!(store.get(OVERLAY_DOMAIN)["idleTimeSeconds"], 5);
        assert_eq!(store.get("unknown"), Value::Null);
        assert_eq!(store.endpoint(), Endpoint::default());
    }

    #[test]
    fn test_set_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let store = JsonFileStore::open(&path).unwrap();

        store
            .set(OBS_DOMAIN, json!({ "host": "10.0.0.5", "port": 4456, "password": "pw" }))
            .unwrap();
        store.set(OBS_DOMAIN, json!({ "host": "10.0.0.6", "port": 4457 })).unwrap();

        let reopened = JsonFileStore::open(&path).unwrap();
        let endpoint = reopened.endpoint();
        assert_eq!(endpoint.host, "10.0.0.6");
        assert_eq!(endpoint.port, 4457);
        assert!(endpoint.password.is_empty());
    }

    #[test]
    fn test_malformed_endpoint_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("settings.json")).unwrap();
        store.set(OBS_DOMAIN, json!("not an object")).unwrap();
        assert_eq!(store.endpoint(), Endpoint::default());
    }

    #[test]
    fn test_failed_write_leaves_value_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the data directory should be
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let store = JsonFileStore::open(blocker.join("settings.json")).unwrap();

        let result = store.set(OBS_DOMAIN, json!({ "host": "studio.local", "port": 4456 }));

        assert!(result.is_err());
        assert_eq!(store.endpoint(), Endpoint::default());
    }
}
