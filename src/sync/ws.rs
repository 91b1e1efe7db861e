//! WebSocket bridge exposing the UI end of the state sync channel
//!
//! The UI process connects to `/ws` and exchanges JSON text frames. Each
//! connection registers its listeners under its own key, so a reconnecting
//! client never receives a notification twice.

use super::channel::UiEnd;
use super::messages::{ClientFrame, ServerFrame};
use super::SyncError;
use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub fn router(ui: UiEnd) -> Router {
    Router::new().route("/ws", get(ws_handler)).with_state(ui)
}

/// Binds `listen` and serves the bridge until the server fails
pub async fn serve(listen: &str, ui: UiEnd) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .with_context(|| format!("Failed to bind UI bridge on {}", listen))?;
    info!("UI bridge listening on ws://{}/ws", listen);
    axum::serve(listener, router(ui))
        .await
        .context("UI bridge server failed")
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(ui): State<UiEnd>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, ui))
}

async fn handle_socket(socket: WebSocket, ui: UiEnd) {
    let key = uuid::Uuid::new_v4().to_string();
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (client_tx, mut client_rx) = mpsc::unbounded_channel::<ServerFrame>();
    info!("UI client {} connected", key);

    let writer = tokio::spawn(async move {
        while let Some(frame) = client_rx.recv().await {
            let text = match serde_json::to_string(&frame) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to encode frame: {}", e);
                    continue;
                }
            };
            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let mut forwarders: Vec<JoinHandle<()>> = Vec::new();

    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let frame = match serde_json::from_str::<ClientFrame>(text.as_str()) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!("Malformed frame from {}: {}", key, e);
                        if let Some(rejected) = reject_malformed(text.as_str(), &e) {
                            let _ = client_tx.send(rejected);
                        }
                        continue;
                    }
                };
                handle_frame(frame, &ui, &key, &client_tx, &mut forwarders);
            }
            Ok(Message::Close(_)) => break,
            Err(e) => {
                warn!("WS read error: {}", e);
                break;
            }
            _ => {}
        }
    }

    ui.unlisten_all(&key);
    for forwarder in forwarders {
        forwarder.abort();
    }
    writer.abort();
    info!("UI client {} disconnected", key);
}

/// A request frame that fails to parse still owes its sender a reply when
/// the sequence number is readable.
fn reject_malformed(text: &str, error: &serde_json::Error) -> Option<ServerFrame> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    if value.get("kind").and_then(serde_json::Value::as_str) != Some("request") {
        return None;
    }
    let seq = value.get("seq").and_then(serde_json::Value::as_u64)?;
    Some(ServerFrame::Rejected {
        seq,
        reason: error.to_string(),
    })
}

fn handle_frame(
    frame: ClientFrame,
    ui: &UiEnd,
    key: &str,
    client_tx: &mpsc::UnboundedSender<ServerFrame>,
    forwarders: &mut Vec<JoinHandle<()>>,
) {
    match frame {
        ClientFrame::Command { command } => {
            if ui.send(command).is_err() {
                warn!("Host end closed, dropping command from {}", key);
            }
        }
        ClientFrame::Request { seq, request } => {
            let ui = ui.clone();
            let client_tx = client_tx.clone();
            tokio::spawn(async move {
                let frame = match ui.request(request).await {
                    Ok(response) => ServerFrame::Response { seq, response },
                    Err(SyncError::Rejected(reason)) => ServerFrame::Rejected { seq, reason },
                    Err(e) => ServerFrame::Rejected {
                        seq,
                        reason: e.to_string(),
                    },
                };
                let _ = client_tx.send(frame);
            });
        }
        ClientFrame::Listen { names } => {
            ui.unlisten_all(key);
            for forwarder in forwarders.drain(..) {
                forwarder.abort();
            }
            debug!("UI client {} listening on {:?}", key, names);
            for name in names {
                let mut rx = ui.listen(&name, key);
                let client_tx = client_tx.clone();
                forwarders.push(tokio::spawn(async move {
                    while let Some(notification) = rx.recv().await {
                        if client_tx
                            .send(ServerFrame::Notification { notification })
                            .is_err()
                        {
                            break;
                        }
                    }
                }));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{Inbound, Notification, StateSyncChannel, UiCommand, UiRequest, UiResponse};
    use crate::window::Mode;
    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    async fn next_frame<S>(stream: &mut S) -> ServerFrame
    where
        S: futures_util::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        loop {
            match stream.next().await {
                Some(Ok(WsMessage::Text(text))) => {
                    return serde_json::from_str(text.as_str()).unwrap()
                }
                Some(Ok(_)) => continue,
                other => panic!("unexpected message: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_bridge_relays_commands_requests_and_notifications() {
        let (mut host, ui) = StateSyncChannel::open();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(ui)).await.unwrap();
        });

        let (socket, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr))
            .await
            .unwrap();
        let (mut tx, mut rx) = socket.split();

        let send = |frame: ClientFrame| WsMessage::Text(serde_json::to_string(&frame).unwrap().into());

        tx.send(send(ClientFrame::Command {
            command: UiCommand::RequestConnect,
        }))
        .await
        .unwrap();
        assert!(matches!(
            host.recv().await,
            Some(Inbound::Command(UiCommand::RequestConnect))
        ));

        tx.send(send(ClientFrame::Request {
            seq: 7,
            request: UiRequest::GetCurrentMode,
        }))
        .await
        .unwrap();
        match host.recv().await {
            Some(Inbound::Request { reply, .. }) => {
                reply.respond(UiResponse::CurrentMode {
                    mode: Mode::Overlay,
                })
            }
            other => panic!("unexpected inbound: {:?}", other),
        }
        assert_eq!(
            next_frame(&mut rx).await,
            ServerFrame::Response {
                seq: 7,
                response: UiResponse::CurrentMode {
                    mode: Mode::Overlay
                }
            }
        );

        // Listening twice on the same name still yields a single delivery
        for _ in 0..2 {
            tx.send(send(ClientFrame::Listen {
                names: vec!["mode-changed".into()],
            }))
            .await
            .unwrap();
        }
        // Listen frames are handled in order; a request round trip proves both landed
        tx.send(send(ClientFrame::Request {
            seq: 8,
            request: UiRequest::GetCurrentMode,
        }))
        .await
        .unwrap();
        if let Some(Inbound::Request { reply, .. }) = host.recv().await {
            reply.reject("busy");
        }
        assert_eq!(
            next_frame(&mut rx).await,
            ServerFrame::Rejected {
                seq: 8,
                reason: "busy".into()
            }
        );

        let notification = Notification::ModeChanged {
            mode: Mode::Config,
            previous: Some(Mode::Overlay),
        };
        host.notifier().notify(notification.clone());
        host.notifier().notify(Notification::ModeChanged {
            mode: Mode::Overlay,
            previous: Some(Mode::Config),
        });
        assert_eq!(
            next_frame(&mut rx).await,
            ServerFrame::Notification { notification }
        );
        assert_eq!(
            next_frame(&mut rx).await,
            ServerFrame::Notification {
                notification: Notification::ModeChanged {
                    mode: Mode::Overlay,
                    previous: Some(Mode::Config),
                }
            }
        );
    }

    #[tokio::test]
    async fn test_unparseable_request_is_rejected_with_its_seq() {
        let (mut host, ui) = StateSyncChannel::open();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(ui)).await.unwrap();
        });
        let (socket, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr))
            .await
            .unwrap();
        let (mut tx, mut rx) = socket.split();

        // Unknown request type with a readable seq
        tx.send(WsMessage::Text(
            r#"{"kind":"request","seq":5,"request":{"type":"get-mode"}}"#.to_string().into(),
        ))
        .await
        .unwrap();
        match next_frame(&mut rx).await {
            ServerFrame::Rejected { seq, reason } => {
                assert_eq!(seq, 5);
                assert!(!reason.is_empty());
            }
            other => panic!("unexpected frame: {:?}", other),
        }

        // Garbage without a request seq gets no reply; the next request still works
        tx.send(WsMessage::Text(r#"{"kind":"command"}"#.to_string().into()))
            .await
            .unwrap();
        tx.send(WsMessage::Text("not json".to_string().into())).await.unwrap();
        tx.send(WsMessage::Text(
            serde_json::to_string(&ClientFrame::Request {
                seq: 6,
                request: UiRequest::GetCurrentMode,
            })
            .unwrap()
            .into(),
        ))
        .await
        .unwrap();
        match host.recv().await {
            Some(Inbound::Request { reply, .. }) => reply.respond(UiResponse::CurrentMode {
                mode: Mode::Loading,
            }),
            other => panic!("unexpected inbound: {:?}", other),
        }
        assert_eq!(
            next_frame(&mut rx).await,
            ServerFrame::Response {
                seq: 6,
                response: UiResponse::CurrentMode {
                    mode: Mode::Loading
                }
            }
        );
    }
}
