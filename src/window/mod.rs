//! Window module - Presentation modes and the state machine that switches them

pub mod mode;
pub mod presentation;
pub mod surface;

pub use mode::{Mode, ModeConfig, ModeError, WindowLevel};
pub use presentation::{
    PresentationState, PresentationStateMachine, TransitionPhase, TransitionTiming,
};
pub use surface::{ChannelSurface, PresentationSurface, SurfaceCommand};
#[cfg(test)]
pub use surface::RecordingSurface;
