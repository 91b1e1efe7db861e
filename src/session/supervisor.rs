//! Connection supervisor
//!
//! Owns the [`ConnectionRecord`] for the single logical connection to the
//! remote service. `connect` is guarded: while one attempt is outstanding,
//! further calls return [`ConnectError::AttemptSkipped`] without touching the
//! network. Every attempt is raced against a fixed timeout and tagged with a
//! generation number; results and close notifications carrying a stale
//! generation are discarded.
//!
//! The supervisor never retries on its own. Callers decide when to call
//! `connect` again.

use crate::core::events::{AppEvent, EventSender};
use crate::remote::{Endpoint, RemoteError, RemoteEvent, RemoteService};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default upper bound for a single connection attempt
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Why a connect call did not produce a connection. None of these are fatal.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConnectError {
    #[error("connection attempt timed out after {0:?}")]
    Timeout(Duration),
    #[error("connection refused: {0}")]
    Refused(String),
    #[error("attempt skipped, already connecting")]
    AttemptSkipped,
    #[error("attempt superseded by disconnect")]
    Cancelled,
}

/// State of the supervised connection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionRecord {
    pub status: ConnectionStatus,
    /// Attempts since the last successful connection
    pub attempt_count: u32,
    pub endpoint: Option<Endpoint>,
    pub last_error: Option<String>,
}

#[derive(Default)]
struct SupervisorState {
    record: ConnectionRecord,
    in_flight: bool,
    generation: u64,
}

/// Releases the in-flight guard if a connect future is dropped mid-attempt.
struct AttemptGuard {
    state: Arc<Mutex<SupervisorState>>,
    generation: u64,
    armed: bool,
}

impl Drop for AttemptGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.state.lock();
        state.in_flight = false;
        if state.generation == self.generation
            && state.record.status == ConnectionStatus::Connecting
        {
            state.record.status = ConnectionStatus::Failed;
            state.record.last_error = Some(ConnectError::Cancelled.to_string());
        }
    }
}

pub struct ConnectionSupervisor {
    remote: Arc<dyn RemoteService>,
    state: Arc<Mutex<SupervisorState>>,
    close_observer: Mutex<Option<JoinHandle<()>>>,
    timeout: Duration,
    events: EventSender,
}

impl ConnectionSupervisor {
    pub fn new(remote: Arc<dyn RemoteService>, timeout: Duration, events: EventSender) -> Self {
        Self {
            remote,
            state: Arc::new(Mutex::new(SupervisorState::default())),
            close_observer: Mutex::new(None),
            timeout,
            events,
        }
    }

    pub fn record(&self) -> ConnectionRecord {
        self.state.lock().record.clone()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state.lock().record.status
    }

    /// Attempt a single connection to `endpoint`.
    pub async fn connect(&self, endpoint: Endpoint) -> Result<(), ConnectError> {
        let (generation, attempt) = {
            let mut state = self.state.lock();
            if state.in_flight {
                debug!("Connect skipped, attempt already in flight");
                return Err(ConnectError::AttemptSkipped);
            }
            state.in_flight = true;
            state.generation += 1;
            state.record.status = ConnectionStatus::Connecting;
            state.record.attempt_count += 1;
            state.record.endpoint = Some(endpoint.clone());
            (state.generation, state.record.attempt_count)
        };
        let mut guard = AttemptGuard {
            state: Arc::clone(&self.state),
            generation,
            armed: true,
        };
        self.emit_status(ConnectionStatus::Connecting, attempt, None);
        info!(
            "Connecting to {} (attempt {}, generation {})",
            endpoint.url(),
            attempt,
            generation
        );

        // Best-effort teardown of whatever the previous attempt left behind
        self.stop_close_observer();
        if let Err(e) = self.remote.disconnect().await {
            debug!("Ignoring stale connection teardown error: {}", e);
        }

        let events = self.remote.subscribe();
        let result = match tokio::time::timeout(self.timeout, self.remote.connect(&endpoint)).await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ConnectError::Refused(e.to_string())),
            Err(_) => Err(ConnectError::Timeout(self.timeout)),
        };

        let finished = {
            let mut state = self.state.lock();
            state.in_flight = false;
            guard.armed = false;

            if state.generation != generation {
                None
            } else {
                match &result {
                    Ok(()) => {
                        state.record.status = ConnectionStatus::Connected;
                        state.record.attempt_count = 0;
                        state.record.last_error = None;
                    }
                    Err(e) => {
                        state.record.status = ConnectionStatus::Failed;
                        state.record.last_error = Some(e.to_string());
                    }
                }
                Some((state.record.status, state.record.attempt_count))
            }
        };

        let Some((status, attempt)) = finished else {
            debug!("Discarding result of superseded attempt {}", generation);
            if result.is_ok() {
                // The connection came up after a disconnect was requested
                let _ = self.remote.disconnect().await;
            }
            return Err(ConnectError::Cancelled);
        };

        match &result {
            Ok(()) => {
                info!("Connected to {}", endpoint.url());
                let observer = self.spawn_close_observer(events, generation);
                if let Some(stale) = self.close_observer.lock().replace(observer) {
                    stale.abort();
                }
                self.emit_status(status, attempt, None);
            }
            Err(e) => {
                warn!("Connection to {} failed: {}", endpoint.url(), e);
                self.emit_status(status, attempt, Some(e.to_string()));
            }
        }
        result
    }

    /// Close the connection on request. The close observer is removed first
    /// so the local close is not reported a second time.
    pub async fn disconnect(&self) -> Result<(), RemoteError> {
        let attempt = {
            let mut state = self.state.lock();
            state.generation += 1;
            state.record.status = ConnectionStatus::Disconnected;
            state.record.attempt_count
        };
        self.stop_close_observer();
        let result = self.remote.disconnect().await;
        self.emit_status(ConnectionStatus::Disconnected, attempt, None);
        result
    }

    /// Forward a command to the live connection
    pub async fn call(&self, command: &str, args: Option<Value>) -> Result<Value, RemoteError> {
        if self.status() != ConnectionStatus::Connected {
            return Err(RemoteError::NotConnected);
        }
        self.remote.call(command, args).await
    }

    fn stop_close_observer(&self) {
        if let Some(observer) = self.close_observer.lock().take() {
            observer.abort();
        }
    }

    fn emit_status(&self, status: ConnectionStatus, attempt: u32, detail: Option<String>) {
        let _ = self.events.send(AppEvent::ConnectionStatus {
            status,
            attempt,
            detail,
        });
    }

    /// Watch the event stream of one connection. Service events are forwarded;
    /// the first `ConnectionClosed` for a current generation marks the record
    /// disconnected and ends the observer.
    fn spawn_close_observer(
        &self,
        mut events: broadcast::Receiver<RemoteEvent>,
        generation: u64,
    ) -> JoinHandle<()> {
        let state = Arc::clone(&self.state);
        let tx = self.events.clone();

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(RemoteEvent::ConnectionClosed) => {
                        let attempt = {
                            let mut state = state.lock();
                            if state.generation != generation
                                || state.record.status != ConnectionStatus::Connected
                            {
                                debug!("Ignoring close for stale generation {}", generation);
                                return;
                            }
                            state.record.status = ConnectionStatus::Disconnected;
                            state.record.attempt_count
                        };
                        info!("Remote connection closed");
                        let _ = tx.send(AppEvent::ConnectionStatus {
                            status: ConnectionStatus::Disconnected,
                            attempt,
                            detail: Some("connection closed".to_string()),
                        });
                        return;
                    }
                    Ok(event) => {
                        let _ = tx.send(AppEvent::Remote(event));
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Close observer lagged, skipped {} remote events", skipped);
                    }
                    Err(RecvError::Closed) => return,
                }
            }
        })
    }
}
