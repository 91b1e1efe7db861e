//! Remote control-plane service seam
//!
//! The connection supervisor only depends on the [`RemoteService`] shape:
//! connect, disconnect, call and an event stream. [`obs::ObsClient`] speaks
//! obs-websocket v5; [`mock::MockRemote`] is a scripted stand-in used by
//! tests and `--offline` runs.

pub mod mock;
pub mod obs;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

pub use mock::{MockConnect, MockRemote};
pub use obs::ObsClient;

/// Default obs-websocket host
pub const DEFAULT_HOST: &str = "localhost";

/// Default obs-websocket port
pub const DEFAULT_PORT: u16 = 4455;

/// Where the remote service lives and how to authenticate.
///
/// This is also the shape of the `obs` settings domain in the config store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Shared secret, empty when the server has authentication disabled
    #[serde(default)]
    pub password: String,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            password: String::new(),
        }
    }
}

impl Endpoint {
    /// WebSocket URL for this endpoint
    pub fn url(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }
}

/// Events pushed by the remote service
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteEvent {
    /// The live connection went away without being asked to
    ConnectionClosed,
    /// Service-specific state change, e.g. `RecordStateChanged`
    StateChanged { name: String, data: Value },
}

/// Errors reported by a remote service implementation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RemoteError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("not connected")]
    NotConnected,
    #[error("request {request} failed ({code}): {comment}")]
    Request {
        request: String,
        code: i64,
        comment: String,
    },
}

/// Connection-oriented remote control service.
#[async_trait]
pub trait RemoteService: Send + Sync + 'static {
    /// Open a connection. Resolves once the session is usable.
    async fn connect(&self, endpoint: &Endpoint) -> Result<(), RemoteError>;

    /// Close the current connection, if any. Must not emit
    /// [`RemoteEvent::ConnectionClosed`] for a locally requested close.
    async fn disconnect(&self) -> Result<(), RemoteError>;

    /// Issue a named command and wait for its reply.
    async fn call(&self, command: &str, args: Option<Value>) -> Result<Value, RemoteError>;

    /// Subscribe to events. Only events sent after subscribing are seen.
    fn subscribe(&self) -> broadcast::Receiver<RemoteEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_defaults_fill_missing_fields() {
        let endpoint: Endpoint = serde_json::from_str(r#"{"port": 4460}"#).unwrap();
        assert_eq!(endpoint.host, "localhost");
        assert_eq!(endpoint.port, 4460);
        assert!(endpoint.password.is_empty());
        assert_eq!(endpoint.url(), "ws://localhost:4460");
    }
}
