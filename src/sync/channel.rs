//! In-process state sync channel
//!
//! [`StateSyncChannel::open`] returns the two ends of the conduit. The host
//! end receives UI commands and requests and broadcasts notifications through
//! a [`Notifier`]. The UI end sends commands, awaits request responses, and
//! registers notification listeners under a caller-chosen key.

use super::messages::{Notification, UiCommand, UiRequest, UiResponse};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

type Listener = (String, mpsc::UnboundedSender<Notification>);
type ListenerMap = Arc<Mutex<HashMap<String, Vec<Listener>>>>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("state sync channel closed")]
    Closed,
}

/// Message arriving at the host end
#[derive(Debug)]
pub enum Inbound {
    Command(UiCommand),
    Request {
        request: UiRequest,
        reply: Responder,
    },
}

/// Answers exactly one UI request
#[derive(Debug)]
pub struct Responder {
    tx: oneshot::Sender<Result<UiResponse, String>>,
}

impl Responder {
    pub fn respond(self, response: UiResponse) {
        let _ = self.tx.send(Ok(response));
    }

    #[cfg(test)]
    pub fn reject(self, reason: impl Into<String>) {
        let _ = self.tx.send(Err(reason.into()));
    }
}

pub struct StateSyncChannel;

impl StateSyncChannel {
    pub fn open() -> (HostEnd, UiEnd) {
        let (tx, rx) = mpsc::unbounded_channel();
        let listeners = ListenerMap::default();
        let host = HostEnd {
            notifier: Notifier {
                listeners: listeners.clone(),
            },
            inbound: rx,
        };
        let ui = UiEnd {
            inbound: tx,
            listeners,
        };
        (host, ui)
    }
}

/// Cloneable handle for broadcasting notifications to UI listeners
#[derive(Clone)]
pub struct Notifier {
    listeners: ListenerMap,
}

impl Notifier {
    /// Delivers to every listener registered for the notification's name.
    /// Listeners whose receiver is gone are dropped.
    pub fn notify(&self, notification: Notification) {
        let mut listeners = self.listeners.lock();
        let Some(entries) = listeners.get_mut(notification.name()) else {
            return;
        };
        entries.retain(|(key, tx)| {
            let delivered = tx.send(notification.clone()).is_ok();
            if !delivered {
                debug!("Pruning closed listener {} on {}", key, notification.name());
            }
            delivered
        });
    }
}

pub struct HostEnd {
    notifier: Notifier,
    inbound: mpsc::UnboundedReceiver<Inbound>,
}

impl HostEnd {
    pub fn notifier(&self) -> Notifier {
        self.notifier.clone()
    }

    /// Next command or request from the UI; `None` once every UI end is gone
    pub async fn recv(&mut self) -> Option<Inbound> {
        self.inbound.recv().await
    }
}

#[derive(Clone)]
pub struct UiEnd {
    inbound: mpsc::UnboundedSender<Inbound>,
    listeners: ListenerMap,
}

impl UiEnd {
    pub fn send(&self, command: UiCommand) -> Result<(), SyncError> {
        self.inbound
            .send(Inbound::Command(command))
            .map_err(|_| SyncError::Closed)
    }

    pub async fn request(&self, request: UiRequest) -> Result<UiResponse, SyncError> {
        let (tx, rx) = oneshot::channel();
        self.inbound
            .send(Inbound::Request {
                request,
                reply: Responder { tx },
            })
            .map_err(|_| SyncError::Closed)?;

        match rx.await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(reason)) => Err(SyncError::Rejected(reason)),
            Err(_) => Err(SyncError::Closed),
        }
    }

    /// Registers `key` on `name`. Registering the same key again replaces the
    /// earlier registration, whose receiver then ends.
    pub fn listen(&self, name: &str, key: &str) -> mpsc::UnboundedReceiver<Notification> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut listeners = self.listeners.lock();
        let entries = listeners.entry(name.to_string()).or_default();
        entries.retain(|(existing, _)| existing != key);
        entries.push((key.to_string(), tx));
        rx
    }

    pub fn unlisten(&self, name: &str, key: &str) {
        let mut listeners = self.listeners.lock();
        if let Some(entries) = listeners.get_mut(name) {
            entries.retain(|(existing, _)| existing != key);
            if entries.is_empty() {
                listeners.remove(name);
            }
        }
    }

    /// Drops every registration held by `key`
    pub fn unlisten_all(&self, key: &str) {
        let mut listeners = self.listeners.lock();
        listeners.retain(|_, entries| {
            entries.retain(|(existing, _)| existing != key);
            !entries.is_empty()
        });
    }
}
