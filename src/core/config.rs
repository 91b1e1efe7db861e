//! Configuration management

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Connection supervision configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Upper bound for a single connection attempt in milliseconds
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
    /// Background retry interval in milliseconds (0 disables automatic retry)
    #[serde(default = "default_retry_interval")]
    pub retry_interval_ms: u64,
    /// Consecutive failures in the loading modes before the remediation hint
    #[serde(default = "default_failure_hint_threshold")]
    pub failure_hint_threshold: u32,
}

fn default_timeout() -> u64 {
    10_000
}
fn default_retry_interval() -> u64 {
    5_000
}
fn default_failure_hint_threshold() -> u32 {
    2
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout(),
            retry_interval_ms: default_retry_interval(),
            failure_hint_threshold: default_failure_hint_threshold(),
        }
    }
}

impl ConnectionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_interval(&self) -> Option<Duration> {
        (self.retry_interval_ms > 0).then(|| Duration::from_millis(self.retry_interval_ms))
    }
}

/// Presentation mode timing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresentationConfig {
    /// Pause between reaching Connected and auto-advancing to the overlay
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,
    /// Hold after the fade-out phase of an animated transition
    #[serde(default = "default_fade_out")]
    pub fade_out_ms: u64,
    /// Hold after the resize phase of an animated transition
    #[serde(default = "default_resize")]
    pub resize_ms: u64,
    /// Pause before starting a transition that was queued during another one
    #[serde(default = "default_chain_delay")]
    pub chain_delay_ms: u64,
    /// Window opacity while an animated transition is resizing
    #[serde(default = "default_dim_opacity")]
    pub dim_opacity: f32,
}

fn default_settle_delay() -> u64 {
    1_000
}
fn default_fade_out() -> u64 {
    150
}
fn default_resize() -> u64 {
    100
}
fn default_chain_delay() -> u64 {
    100
}
fn default_dim_opacity() -> f32 {
    0.4
}

impl Default for PresentationConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay(),
            fade_out_ms: default_fade_out(),
            resize_ms: default_resize(),
            chain_delay_ms: default_chain_delay(),
            dim_opacity: default_dim_opacity(),
        }
    }
}

impl PresentationConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// UI bridge server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address for the UI WebSocket bridge
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_listen() -> String {
    "127.0.0.1:4460".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub presentation: PresentationConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from a file, falling back to defaults if it doesn't exist
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)
                .with_context(|| format!("Failed to read config file: {:?}", config_path))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "obsoverlay", "ObsOverlay")
            .context("Failed to determine config directory")?;
        Ok(proj_dirs.config_dir().join("config.toml"))
    }

    /// Get the default configuration embedded in the binary
    pub fn default_config_str() -> &'static str {
        include_str!("../../config/default.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.connection.timeout(), Duration::from_secs(10));
        assert_eq!(config.connection.retry_interval(), Some(Duration::from_secs(5)));
        assert_eq!(config.connection.failure_hint_threshold, 2);
        assert_eq!(config.presentation.settle_delay_ms, 1000);
        assert_eq!(config.server.listen, "127.0.0.1:4460");
    }

    #[test]
    fn test_embedded_default_matches_defaults() {
        let parsed: Config = toml::from_str(Config::default_config_str()).unwrap();
        let defaults = Config::default();
        assert_eq!(parsed.connection.timeout_ms, defaults.connection.timeout_ms);
        assert_eq!(parsed.presentation.fade_out_ms, defaults.presentation.fade_out_ms);
        assert_eq!(parsed.server.listen, defaults.server.listen);
    }

    #[test]
    fn test_partial_config_and_disabled_retry() {
        let config: Config = toml::from_str("[connection]\nretry_interval_ms = 0\n").unwrap();
        assert_eq!(config.connection.retry_interval(), None);
        assert_eq!(config.connection.timeout_ms, 10_000);
        assert_eq!(config.presentation.resize_ms, 100);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.connection.timeout_ms, 10_000);
    }
}
