//! obs-websocket v5 client
//!
//! Handshake: server sends Hello (op 0), we answer Identify (op 1) with the
//! authentication string when the server asks for one, server confirms with
//! Identified (op 2). Afterwards Events (op 5) are broadcast to subscribers
//! and Requests (op 6) are correlated with RequestResponses (op 7) by
//! request id.

use super::{Endpoint, RemoteError, RemoteEvent, RemoteService};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

const OP_HELLO: u8 = 0;
const OP_IDENTIFY: u8 = 1;
const OP_IDENTIFIED: u8 = 2;
const OP_EVENT: u8 = 5;
const OP_REQUEST: u8 = 6;
const OP_REQUEST_RESPONSE: u8 = 7;

const RPC_VERSION: u32 = 1;

/// EventSubscription::Outputs (record/stream state changes)
const EVENT_SUBSCRIPTION_OUTPUTS: u32 = 1 << 6;

/// Upper bound for a single request round trip
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<Value>>>>;

/// Every obs-websocket message: `{"op": <u8>, "d": {...}}`
#[derive(Debug, Deserialize)]
struct Envelope {
    op: u8,
    #[serde(default)]
    d: Value,
}

struct ObsSession {
    outgoing: mpsc::UnboundedSender<Message>,
    alive: Arc<AtomicBool>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

pub struct ObsClient {
    session: Mutex<Option<ObsSession>>,
    pending: PendingMap,
    events: broadcast::Sender<RemoteEvent>,
    next_request_id: AtomicU64,
}

impl Default for ObsClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ObsClient {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            session: Mutex::new(None),
            pending: Arc::new(Mutex::new(HashMap::new())),
            events,
            next_request_id: AtomicU64::new(1),
        }
    }

    fn outgoing(&self) -> Result<mpsc::UnboundedSender<Message>, RemoteError> {
        match self.session.lock().as_ref() {
            Some(session) if session.alive.load(Ordering::SeqCst) => Ok(session.outgoing.clone()),
            _ => Err(RemoteError::NotConnected),
        }
    }
}

#[async_trait]
impl RemoteService for ObsClient {
    async fn connect(&self, endpoint: &Endpoint) -> Result<(), RemoteError> {
        let url = endpoint.url();
        info!("Connecting to OBS WebSocket at {}", url);

        let (mut ws, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        let hello = read_op(&mut ws, OP_HELLO).await?;
        let identify = identify_payload(&hello, &endpoint.password)?;
        ws.send(Message::text(
            json!({ "op": OP_IDENTIFY, "d": identify }).to_string(),
        ))
        .await
        .map_err(|e| RemoteError::Transport(e.to_string()))?;

        let identified = read_op(&mut ws, OP_IDENTIFIED).await.map_err(|e| match e {
            // The server drops the socket on a bad password
            RemoteError::Transport(reason) if hello.get("authentication").is_some() => {
                RemoteError::Auth(reason)
            }
            other => other,
        })?;
        debug!("Identified with OBS: {}", identified);

        let (mut sink, mut stream) = ws.split();
        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<Message>();
        let alive = Arc::new(AtomicBool::new(true));

        let writer = tokio::spawn(async move {
            while let Some(message) = outgoing_rx.recv().await {
                let closing = matches!(message, Message::Close(_));
                if sink.send(message).await.is_err() || closing {
                    break;
                }
            }
        });

        let reader = {
            let alive = Arc::clone(&alive);
            let pending = Arc::clone(&self.pending);
            let events = self.events.clone();
            tokio::spawn(async move {
                while let Some(message) = stream.next().await {
                    match message {
                        Ok(Message::Text(text)) => dispatch(text.as_str(), &pending, &events),
                        Ok(Message::Close(frame)) => {
                            info!("OBS closed the connection: {:?}", frame);
                            break;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!("OBS WebSocket read error: {}", e);
                            break;
                        }
                    }
                }
                // A local disconnect clears `alive` first and is not reported
                if alive.swap(false, Ordering::SeqCst) {
                    pending.lock().clear();
                    let _ = events.send(RemoteEvent::ConnectionClosed);
                }
            })
        };

        let previous = self.session.lock().replace(ObsSession {
            outgoing,
            alive,
            reader,
            writer,
        });
        if let Some(previous) = previous {
            previous.reader.abort();
            previous.writer.abort();
        }

        info!("Connected to OBS WebSocket");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), RemoteError> {
        let session = self.session.lock().take();
        let Some(session) = session else {
            return Ok(());
        };

        // Stop the reader first so a local close is never reported as ConnectionClosed
        session.alive.store(false, Ordering::SeqCst);
        session.reader.abort();
        self.pending.lock().clear();

        let _ = session.outgoing.send(Message::Close(None));
        drop(session.outgoing);
        if tokio::time::timeout(Duration::from_secs(1), session.writer)
            .await
            .is_err()
        {
            debug!("OBS writer did not finish closing in time");
        }
        info!("Disconnected from OBS WebSocket");
        Ok(())
    }

    async fn call(&self, command: &str, args: Option<Value>) -> Result<Value, RemoteError> {
        let outgoing = self.outgoing()?;
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed).to_string();

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(request_id.clone(), tx);

        let frame = encode_request(&request_id, command, args);
        if outgoing.send(Message::text(frame)).is_err() {
            self.pending.lock().remove(&request_id);
            return Err(RemoteError::NotConnected);
        }

        match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(response)) => decode_response(command, response),
            Ok(Err(_)) => Err(RemoteError::NotConnected),
            Err(_) => {
                self.pending.lock().remove(&request_id);
                Err(RemoteError::Protocol(format!("{} timed out", command)))
            }
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<RemoteEvent> {
        self.events.subscribe()
    }
}

/// Wait for the next message with the given opcode during the handshake.
async fn read_op(ws: &mut WsStream, op: u8) -> Result<Value, RemoteError> {
    while let Some(message) = ws.next().await {
        match message.map_err(|e| RemoteError::Transport(e.to_string()))? {
            Message::Text(text) => {
                let envelope: Envelope = serde_json::from_str(text.as_str())
                    .map_err(|e| RemoteError::Protocol(e.to_string()))?;
                if envelope.op == op {
                    return Ok(envelope.d);
                }
                debug!("Skipping op {} while waiting for op {}", envelope.op, op);
            }
            Message::Close(frame) => {
                let reason = frame
                    .map(|f| format!("{} {}", u16::from(f.code), f.reason.as_str()))
                    .unwrap_or_else(|| "closed".to_string());
                return Err(RemoteError::Transport(reason));
            }
            _ => {}
        }
    }
    Err(RemoteError::Transport("connection ended during handshake".into()))
}

/// Route a post-handshake message to subscribers or to a waiting request.
fn dispatch(text: &str, pending: &PendingMap, events: &broadcast::Sender<RemoteEvent>) {
    let envelope: Envelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!("Ignoring malformed OBS message: {}", e);
            return;
        }
    };

    match envelope.op {
        OP_EVENT => {
            if let Some(event) = decode_event(&envelope.d) {
                let _ = events.send(event);
            }
        }
        OP_REQUEST_RESPONSE => {
            let Some(request_id) = envelope.d.get("requestId").and_then(Value::as_str) else {
                return;
            };
            match pending.lock().remove(request_id) {
                Some(tx) => {
                    let _ = tx.send(envelope.d);
                }
                None => debug!("No pending request for id={}", request_id),
            }
        }
        op => debug!("Ignoring OBS op {}", op),
    }
}

/// Build the Identify body, answering the auth challenge if the Hello has one.
fn identify_payload(hello: &Value, password: &str) -> Result<Value, RemoteError> {
    let mut identify = json!({
        "rpcVersion": RPC_VERSION,
        "eventSubscriptions": EVENT_SUBSCRIPTION_OUTPUTS,
    });

    if let Some(auth) = hello.get("authentication") {
        let challenge = auth.get("challenge").and_then(Value::as_str);
        let salt = auth.get("salt").and_then(Value::as_str);
        let (Some(challenge), Some(salt)) = (challenge, salt) else {
            return Err(RemoteError::Protocol(
                "authentication block without challenge/salt".into(),
            ));
        };
        identify["authentication"] = Value::String(auth_response(password, salt, challenge));
    }

    Ok(identify)
}

/// base64(sha256(base64(sha256(password + salt)) + challenge))
fn auth_response(password: &str, salt: &str, challenge: &str) -> String {
    let secret = STANDARD.encode(Sha256::digest(format!("{}{}", password, salt).as_bytes()));
    STANDARD.encode(Sha256::digest(format!("{}{}", secret, challenge).as_bytes()))
}

fn encode_request(request_id: &str, command: &str, args: Option<Value>) -> String {
    let mut d = json!({
        "requestType": command,
        "requestId": request_id,
    });
    if let Some(args) = args {
        d["requestData"] = args;
    }
    json!({ "op": OP_REQUEST, "d": d }).to_string()
}

fn decode_event(d: &Value) -> Option<RemoteEvent> {
    let name = d.get("eventType")?.as_str()?.to_string();
    let data = d.get("eventData").cloned().unwrap_or(Value::Null);
    Some(RemoteEvent::StateChanged { name, data })
}

fn decode_response(command: &str, d: Value) -> Result<Value, RemoteError> {
    let status = d.get("requestStatus");
    let ok = status
        .and_then(|s| s.get("result"))
        .and_then(Value::as_bool)
        .unwrap_or(false);

    if ok {
        return Ok(d.get("responseData").cloned().unwrap_or(Value::Null));
    }

    Err(RemoteError::Request {
        request: command.to_string(),
        code: status
            .and_then(|s| s.get("code"))
            .and_then(Value::as_i64)
            .unwrap_or_default(),
        comment: status
            .and_then(|s| s.get("comment"))
            .and_then(Value::as_str)
            .unwrap_or("no comment")
            .to_string(),
    })
}
