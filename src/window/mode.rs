//! Presentation modes and their static window configurations

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Mutually exclusive presentation mode of the overlay window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Mode {
    /// Waiting for the first connection
    #[default]
    #[serde(rename = "loading")]
    Loading,
    /// Still connecting, with a remediation hint
    #[serde(rename = "loading-with-error")]
    LoadingError,
    /// Settings form
    #[serde(rename = "config")]
    Config,
    /// Compact always-on-top recording controls
    #[serde(rename = "overlay")]
    Overlay,
}

impl Mode {
    pub const ALL: [Mode; 4] = [Mode::Loading, Mode::LoadingError, Mode::Config, Mode::Overlay];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Loading => "loading",
            Mode::LoadingError => "loading-with-error",
            Mode::Config => "config",
            Mode::Overlay => "overlay",
        }
    }

    /// Whether this is one of the modes shown before the first connection
    pub fn is_loading(&self) -> bool {
        matches!(self, Mode::Loading | Mode::LoadingError)
    }

    /// Static window configuration for this mode
    pub fn config(&self) -> ModeConfig {
        match self {
            Mode::Loading => LOADING,
            Mode::LoadingError => LOADING_ERROR,
            Mode::Config => CONFIG,
            Mode::Overlay => OVERLAY,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for mode names outside the declared set
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModeError {
    #[error("invalid mode requested: {0:?}")]
    InvalidMode(String),
}

impl FromStr for Mode {
    type Err = ModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "loading" => Ok(Mode::Loading),
            "loading-with-error" | "loading-error" => Ok(Mode::LoadingError),
            "config" => Ok(Mode::Config),
            "overlay" => Ok(Mode::Overlay),
            other => Err(ModeError::InvalidMode(other.to_string())),
        }
    }
}

/// Stacking level for always-on-top windows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WindowLevel {
    Normal,
    /// Above fullscreen apps
    ScreenSaver,
}

/// Window configuration applied when a mode is entered
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ModeConfig {
    pub width: u32,
    pub height: u32,
    pub resizable: bool,
    pub maximizable: bool,
    /// `None` means a regular window
    pub always_on_top: Option<WindowLevel>,
    pub center: bool,
    pub opacity: f32,
    /// Animated transitions hold the final phase this long. Only modes that
    /// declare a duration take part in animated transitions.
    #[serde(skip)]
    pub transition: Option<Duration>,
}

const LOADING: ModeConfig = ModeConfig {
    width: 300,
    height: 108,
    resizable: false,
    maximizable: false,
    always_on_top: None,
    center: true,
    opacity: 1.0,
    transition: None,
};

const LOADING_ERROR: ModeConfig = ModeConfig {
    width: 300,
    height: 230,
    resizable: false,
    maximizable: false,
    always_on_top: None,
    center: false,
    opacity: 1.0,
    transition: None,
};

const OVERLAY: ModeConfig = ModeConfig {
    width: 300,
    height: 40,
    resizable: false,
    maximizable: false,
    always_on_top: Some(WindowLevel::ScreenSaver),
    center: false,
    opacity: 1.0,
    transition: Some(Duration::from_millis(300)),
};

const CONFIG: ModeConfig = ModeConfig {
    width: 800,
    height: 600,
    resizable: true,
    maximizable: true,
    always_on_top: None,
    center: true,
    opacity: 1.0,
    transition: Some(Duration::from_millis(250)),
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_names_round_trip_through_from_str() {
        for mode in Mode::ALL {
            assert_eq!(mode.as_str().parse::<Mode>().unwrap(), mode);
        }
    }

    #[test]
    fn test_invalid_mode() {
        assert_eq!(
            "fullscreen".parse::<Mode>(),
            Err(ModeError::InvalidMode("fullscreen".to_string()))
        );
    }

    #[test]
    fn test_serde_uses_wire_names() {
        assert_eq!(
            serde_json::to_string(&Mode::LoadingError).unwrap(),
            "\"loading-with-error\""
        );
        let mode: Mode = serde_json::from_str("\"overlay\"").unwrap();
        assert_eq!(mode, Mode::Overlay);
    }

    #[test]
    fn test_only_interactive_modes_animate() {
        assert!(Mode::Config.config().transition.is_some());
        assert!(Mode::Overlay.config().transition.is_some());
        assert!(Mode::Loading.config().transition.is_none());
        assert!(Mode::LoadingError.config().transition.is_none());
        assert!(Mode::Loading.is_loading() && Mode::LoadingError.is_loading());
        assert!(!Mode::Overlay.is_loading());
    }
}
