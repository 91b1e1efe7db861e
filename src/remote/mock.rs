//! Scripted in-process remote service
//!
//! Each `connect` call consumes the next scripted [`MockConnect`] outcome,
//! falling back to the default once the script runs dry.

use super::{Endpoint, RemoteError, RemoteEvent, RemoteService};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::debug;

/// How a single connect call should behave
#[derive(Debug, Clone, PartialEq)]
pub enum MockConnect {
    Accept,
    Refuse(String),
    /// Never settles
    Hang,
    /// Accept after a delay
    Delay(Duration),
}

pub struct MockRemote {
    script: Mutex<VecDeque<MockConnect>>,
    fallback: MockConnect,
    connected: AtomicBool,
    connect_calls: AtomicUsize,
    disconnect_calls: AtomicUsize,
    calls: Mutex<Vec<(String, Option<Value>)>>,
    events: broadcast::Sender<RemoteEvent>,
}

impl MockRemote {
    pub fn new(fallback: MockConnect) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            connected: AtomicBool::new(false),
            connect_calls: AtomicUsize::new(0),
            disconnect_calls: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
            events,
        }
    }

    /// A remote that accepts every connection
    pub fn accepting() -> Self {
        Self::new(MockConnect::Accept)
    }

    /// Queue outcomes for the next connect calls, in order
    pub fn script(&self, outcomes: impl IntoIterator<Item = MockConnect>) {
        self.script.lock().extend(outcomes);
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn disconnect_calls(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Commands received through `call`, oldest first
    pub fn calls(&self) -> Vec<(String, Option<Value>)> {
        self.calls.lock().clone()
    }

    /// Simulate the server dropping the connection
    pub fn drop_connection(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            let _ = self.events.send(RemoteEvent::ConnectionClosed);
        }
    }

    /// Push a service event to subscribers
    pub fn emit(&self, event: RemoteEvent) {
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl RemoteService for MockRemote {
    async fn connect(&self, endpoint: &Endpoint) -> Result<(), RemoteError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        debug!("Mock connect to {} -> {:?}", endpoint.url(), outcome);

        match outcome {
            MockConnect::Accept => {}
            MockConnect::Refuse(reason) => return Err(RemoteError::Transport(reason)),
            MockConnect::Hang => std::future::pending::<()>().await,
            MockConnect::Delay(delay) => tokio::time::sleep(delay).await,
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), RemoteError> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn call(&self, command: &str, args: Option<Value>) -> Result<Value, RemoteError> {
        if !self.is_connected() {
            return Err(RemoteError::NotConnected);
        }
        self.calls.lock().push((command.to_string(), args));
        match command {
            "GetRecordStatus" => Ok(json!({
                "outputActive": false,
                "outputPaused": false,
                "outputDuration": 0,
            })),
            _ => Ok(Value::Null),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<RemoteEvent> {
        self.events.subscribe()
    }
}
