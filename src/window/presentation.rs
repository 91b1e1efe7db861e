//! Presentation state machine
//!
//! Owns the current [`Mode`] and serializes mode changes. While a transition
//! is being applied, further requests land in a single pending slot where the
//! newest request overwrites the older one. When the running transition
//! finishes, a pending mode that differs from the mode just reached is
//! started next, so a burst of requests always converges to the last one
//! without building a backlog.
//!
//! Transitions between two modes that both declare a transition duration
//! (config and overlay) are animated in three phases:
//!
//! 1. [`TransitionPhase::FadeOut`]: dim the window and drop always-on-top
//! 2. [`TransitionPhase::Resize`]: size, resizability and centering
//! 3. [`TransitionPhase::Restore`]: always-on-top and full opacity
//!
//! Each phase is followed by its hold delay. The mode counts as reached only
//! after the last hold.

use super::mode::{Mode, ModeConfig};
use super::surface::{PresentationSurface, SurfaceCommand};
use crate::core::config::PresentationConfig;
use crate::core::events::{AppEvent, EventSender};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Snapshot of the machine's state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PresentationState {
    pub current_mode: Mode,
    pub previous_mode: Option<Mode>,
    pub transition_in_flight: bool,
    pub pending_mode: Option<Mode>,
}

/// Phase of an animated transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionPhase {
    FadeOut,
    Resize,
    Restore,
}

impl fmt::Display for TransitionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionPhase::FadeOut => write!(f, "fade-out"),
            TransitionPhase::Resize => write!(f, "resize"),
            TransitionPhase::Restore => write!(f, "restore"),
        }
    }
}

/// Delays used while applying transitions
#[derive(Debug, Clone)]
pub struct TransitionTiming {
    pub fade_out: Duration,
    pub resize: Duration,
    /// Pause before starting a transition that was pending
    pub chain_delay: Duration,
    pub dim_opacity: f32,
}

impl Default for TransitionTiming {
    fn default() -> Self {
        Self::from(&PresentationConfig::default())
    }
}

impl From<&PresentationConfig> for TransitionTiming {
    fn from(config: &PresentationConfig) -> Self {
        Self {
            fade_out: Duration::from_millis(config.fade_out_ms),
            resize: Duration::from_millis(config.resize_ms),
            chain_delay: Duration::from_millis(config.chain_delay_ms),
            dim_opacity: config.dim_opacity,
        }
    }
}

struct Inner {
    state: Mutex<PresentationState>,
    surface: Arc<dyn PresentationSurface>,
    timing: TransitionTiming,
    events: EventSender,
}

/// Handle to the presentation state machine. Clones share the same state.
#[derive(Clone)]
pub struct PresentationStateMachine {
    inner: Arc<Inner>,
}

impl PresentationStateMachine {
    /// Create a machine in [`Mode::Loading`]
    pub fn new(
        surface: Arc<dyn PresentationSurface>,
        timing: TransitionTiming,
        events: EventSender,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(PresentationState::default()),
                surface,
                timing,
                events,
            }),
        }
    }

    /// Request a change to `target`. Never blocks; the transition runs on a
    /// spawned task, so this must be called from within a tokio runtime.
    pub fn request_transition(&self, target: Mode) {
        let from = {
            let mut state = self.inner.state.lock();
            if state.transition_in_flight {
                debug!(
                    "Queued mode change to {} (transition to {} in flight)",
                    target, state.current_mode
                );
                state.pending_mode = Some(target);
                return;
            }
            if target == state.current_mode {
                return;
            }
            state.transition_in_flight = true;
            state.current_mode
        };

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner.run_transitions(from, target).await;
        });
    }

    /// The mode most recently reached (never the pending one)
    pub fn current_mode(&self) -> Mode {
        self.inner.state.lock().current_mode
    }

    pub fn snapshot(&self) -> PresentationState {
        *self.inner.state.lock()
    }
}

impl Inner {
    async fn run_transitions(&self, mut from: Mode, mut target: Mode) {
        loop {
            info!("Changing presentation mode from {} to {}", from, target);

            let config = target.config();
            let animate = from.config().transition.is_some() && config.transition.is_some();
            if animate {
                self.animate(&config).await;
            } else {
                self.apply(&config);
            }

            let has_pending = {
                let mut state = self.state.lock();
                state.previous_mode = Some(from);
                state.current_mode = target;
                let has_pending = state.pending_mode.is_some_and(|pending| pending != target);
                if !has_pending {
                    state.pending_mode = None;
                    state.transition_in_flight = false;
                }
                has_pending
            };
            let _ = self.events.send(AppEvent::ModeChanged {
                mode: target,
                previous: Some(from),
            });

            if !has_pending {
                return;
            }

            // Requests during the chain delay still overwrite the pending slot
            tokio::time::sleep(self.timing.chain_delay).await;

            let next = {
                let mut state = self.state.lock();
                match state.pending_mode.take() {
                    Some(next) if next != state.current_mode => Some(next),
                    _ => {
                        state.transition_in_flight = false;
                        None
                    }
                }
            };
            match next {
                Some(next) => {
                    from = target;
                    target = next;
                }
                None => return,
            }
        }
    }

    fn apply(&self, config: &ModeConfig) {
        self.apply_geometry(config);
        self.surface.apply(SurfaceCommand::SetAlwaysOnTop {
            level: config.always_on_top,
        });
        self.surface.apply(SurfaceCommand::SetOpacity {
            opacity: config.opacity,
        });
    }

    fn apply_geometry(&self, config: &ModeConfig) {
        self.surface.apply(SurfaceCommand::Resize {
            width: config.width,
            height: config.height,
        });
        self.surface.apply(SurfaceCommand::SetResizable {
            resizable: config.resizable,
        });
        self.surface.apply(SurfaceCommand::SetMaximizable {
            maximizable: config.maximizable,
        });
        if config.center {
            self.surface.apply(SurfaceCommand::Center);
        }
    }

    async fn animate(&self, config: &ModeConfig) {
        self.phase(TransitionPhase::FadeOut, config).await;
        self.phase(TransitionPhase::Resize, config).await;
        self.phase(TransitionPhase::Restore, config).await;
    }

    async fn phase(&self, phase: TransitionPhase, config: &ModeConfig) {
        debug!("Transition phase {}", phase);
        let hold = match phase {
            TransitionPhase::FadeOut => {
                self.surface.apply(SurfaceCommand::SetOpacity {
                    opacity: self.timing.dim_opacity,
                });
                self.surface
                    .apply(SurfaceCommand::SetAlwaysOnTop { level: None });
                self.timing.fade_out
            }
            TransitionPhase::Resize => {
                self.apply_geometry(config);
                self.timing.resize
            }
            TransitionPhase::Restore => {
                if config.always_on_top.is_some() {
                    self.surface.apply(SurfaceCommand::SetAlwaysOnTop {
                        level: config.always_on_top,
                    });
                }
                self.surface.apply(SurfaceCommand::SetOpacity {
                    opacity: config.opacity,
                });
                config.transition.unwrap_or_default()
            }
        };
        tokio::time::sleep(hold).await;
    }
}
