//! OBS Overlay host
//!
//! Host side of a compact recording overlay for OBS Studio.
//!
//! # Features
//! - Supervises a single obs-websocket connection with bounded, guarded attempts
//! - Switches the overlay window between loading, config and overlay modes
//! - Bridges state to the UI process over a local WebSocket channel
//! - Persists connection and overlay settings as JSON

pub mod coordinator;
pub mod core;
pub mod remote;
pub mod session;
pub mod sync;
pub mod window;

pub use coordinator::{CoordinatorSettings, SessionCoordinator};
pub use core::config::Config;
pub use core::events::{AppEvent, EventSender};
pub use core::store::{ConfigStore, JsonFileStore};
pub use remote::{Endpoint, RemoteEvent, RemoteService};
pub use session::{ConnectionStatus, ConnectionSupervisor};
pub use sync::StateSyncChannel;
pub use window::{Mode, PresentationStateMachine};
