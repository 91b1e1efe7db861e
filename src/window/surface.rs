//! Presentation surface seam
//!
//! The window itself lives in the UI process. The host only emits surface
//! commands; [`ChannelSurface`] ships them over the state sync channel.

use super::mode::WindowLevel;
use crate::sync::{Notification, Notifier};
#[cfg(test)]
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// A single change to the window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum SurfaceCommand {
    /// Set size and maximum size
    Resize { width: u32, height: u32 },
    SetResizable { resizable: bool },
    SetMaximizable { maximizable: bool },
    SetAlwaysOnTop { level: Option<WindowLevel> },
    Center,
    SetOpacity { opacity: f32 },
}

pub trait PresentationSurface: Send + Sync {
    fn apply(&self, command: SurfaceCommand);
}

/// Forwards surface commands to the UI as `surface` notifications
pub struct ChannelSurface {
    notifier: Notifier,
}

impl ChannelSurface {
    pub fn new(notifier: Notifier) -> Self {
        Self { notifier }
    }
}

impl PresentationSurface for ChannelSurface {
    fn apply(&self, command: SurfaceCommand) {
        self.notifier.notify(Notification::Surface { command });
    }
}

/// Keeps every command it receives
#[cfg(test)]
#[derive(Default)]
pub struct RecordingSurface {
    commands: Mutex<Vec<SurfaceCommand>>,
}

#[cfg(test)]
impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> Vec<SurfaceCommand> {
        self.commands.lock().clone()
    }

    pub fn clear(&self) {
        self.commands.lock().clear();
    }
}

#[cfg(test)]
impl PresentationSurface for RecordingSurface {
    fn apply(&self, command: SurfaceCommand) {
        self.commands.lock().push(command);
    }
}
