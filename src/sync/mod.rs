//! State sync channel between the host and the UI

pub mod channel;
pub mod messages;
pub mod ws;

pub use channel::{HostEnd, Inbound, Notifier, Responder, StateSyncChannel, SyncError, UiEnd};
pub use messages::{ClientFrame, Notification, ServerFrame, UiCommand, UiRequest, UiResponse};
