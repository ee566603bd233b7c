//! Real-time delivery of log and status updates to dashboard viewers.
//!
//! All events flow through one process-wide broadcast channel; each WebSocket
//! connection watches a single project and forwards only that project's
//! events. A new viewer receives a `Snapshot` with the accumulated log before
//! the live stream begins.

use axum::{
    body::Bytes,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink, stream::SplitStream};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::api::SharedState;
use crate::project::ProjectState;

/// How often to send WebSocket Ping frames.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How long to wait for a Pong response before considering the connection dead.
const PONG_TIMEOUT: Duration = Duration::from_secs(60);

// ── Broadcast message types ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WsMessage {
    /// A chunk of freshly-appended log text.
    LogUpdate { project: String, chunk: String },
    /// The project entered a new lifecycle state.
    StatusUpdate {
        project: String,
        state: ProjectState,
    },
    /// Full log history, sent once when a viewer attaches.
    Snapshot {
        project: String,
        state: ProjectState,
        log: String,
    },
    ProjectDeleted { project: String },
}

impl WsMessage {
    /// Name of the project this event belongs to.
    pub fn project(&self) -> &str {
        match self {
            Self::LogUpdate { project, .. }
            | Self::StatusUpdate { project, .. }
            | Self::Snapshot { project, .. }
            | Self::ProjectDeleted { project } => project,
        }
    }
}

/// Publish an event to all connected viewers. Fire-and-forget: returns
/// silently when no viewer is attached.
pub fn broadcast_message(tx: &broadcast::Sender<WsMessage>, msg: WsMessage) {
    let _ = tx.send(msg);
}

// ── WebSocket handler ────────────────────────────────────────────────

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(name): Path<String>,
    State(state): State<SharedState>,
) -> Response {
    let Some(snapshot) = state.orchestrator.get_project(&name) else {
        return (StatusCode::NOT_FOUND, "Project not found").into_response();
    };

    let rx = state.orchestrator.subscribe();
    let initial = WsMessage::Snapshot {
        project: snapshot.name.clone(),
        state: snapshot.state,
        log: snapshot.log,
    };
    ws.on_upgrade(move |socket| handle_socket(socket, name, initial, rx))
        .into_response()
}

async fn handle_socket(
    socket: WebSocket,
    name: String,
    initial: WsMessage,
    rx: broadcast::Receiver<WsMessage>,
) {
    let (mut sender, receiver) = socket.split();
    if send_message(&mut sender, &initial).await.is_err() {
        return;
    }
    run_socket_loop(sender, receiver, rx, &name).await;
}

async fn send_message(
    sender: &mut SplitSink<WebSocket, Message>,
    msg: &WsMessage,
) -> Result<(), axum::Error> {
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json.into())).await,
        Err(e) => {
            eprintln!("[ws] Failed to serialize WsMessage: {}", e);
            Ok(())
        }
    }
}

/// Core WebSocket loop with ping/pong keepalive.
///
/// Combines broadcast forwarding (filtered to one project), client message
/// receiving, and periodic ping/pong health checking into a single select
/// loop. If no Pong is received within [`PONG_TIMEOUT`] after a Ping is
/// sent, the connection is considered dead and the loop exits.
async fn run_socket_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    mut rx: broadcast::Receiver<WsMessage>,
    project: &str,
) {
    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    // The first tick completes immediately; consume it so the first real
    // ping fires after PING_INTERVAL has elapsed.
    ping_interval.tick().await;

    let mut last_pong = Instant::now();
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            // ── Periodic ping ───────────────────────────────────────
            _ = ping_interval.tick() => {
                if awaiting_pong && last_pong.elapsed() > PONG_TIMEOUT {
                    // Connection is dead — no pong received in time
                    break;
                }
                if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
                awaiting_pong = true;
            }

            // ── Broadcast forwarding ────────────────────────────────
            result = rx.recv() => {
                match result {
                    Ok(msg) => {
                        if msg.project() != project {
                            continue;
                        }
                        if send_message(&mut sender, &msg).await.is_err() {
                            break;
                        }
                        if matches!(msg, WsMessage::ProjectDeleted { .. }) {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        // Missed some messages; continue receiving
                        continue;
                    }
                }
            }

            // ── Client messages (pong, close, etc.) ─────────────────
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Pong(_))) => {
                        last_pong = Instant::now();
                        awaiting_pong = false;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {
                        // Ignore other messages from client (Text, Binary, Ping)
                    }
                    Some(Err(_)) => break,
                }
            }
        }
    }

    // Best-effort close frame
    let _ = sender.send(Message::Close(None)).await;
}

// ── Tests ────────────────────────────────────────────────────────────
