//! Application event definitions

use crate::remote::RemoteEvent;
use crate::session::ConnectionStatus;
use crate::window::Mode;
use tokio::sync::mpsc;

/// Sender for host-side events, wraps a tokio unbounded channel.
///
/// Both state owners report through one of these; the session coordinator
/// holds the receiving half.
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<AppEvent>,
}

impl EventSender {
    pub fn new(tx: mpsc::UnboundedSender<AppEvent>) -> Self {
        Self { tx }
    }

    /// Create a sender together with its receiver
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AppEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn send(&self, event: AppEvent) -> Result<(), mpsc::error::SendError<AppEvent>> {
        self.tx.send(event)
    }
}

/// Events flowing from the state owners to the session coordinator
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// The connection record changed status
    ConnectionStatus {
        status: ConnectionStatus,
        /// Consecutive attempts since the last successful connection
        attempt: u32,
        detail: Option<String>,
    },

    /// Service event from the live remote connection
    Remote(RemoteEvent),

    /// A presentation transition finished
    ModeChanged { mode: Mode, previous: Option<Mode> },
}
