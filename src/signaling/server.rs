use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tracing::{debug, info};

use super::client::{ClientSession, MAX_MESSAGE_SIZE};
use super::hub::Hub;
use super::messages::{LabelPolicy, SignalMessage};
use super::types::{Role, RoomId, SignalingError};

// Application close codes carried on the close frame.
pub const CLOSE_UNKNOWN_ERROR: u16 = 3000;
pub const CLOSE_INVALID_ROLE: u16 = 3001;
pub const CLOSE_MISSING_ROOM_ID: u16 = 3002;
pub const CLOSE_ROOM_ID_COLLISION: u16 = 3003;
pub const CLOSE_ROOM_NOT_FOUND: u16 = 3004;
pub const CLOSE_ROOM_FULL: u16 = 3005;

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Hub>,
    /// Set when graceful shutdown begins; flips the readiness probe to 503.
    pub draining: Arc<AtomicBool>,
    pub label_policy: LabelPolicy,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

async fn healthz(State(state): State<AppState>) -> Response {
    if state.draining.load(Ordering::Relaxed) {
        (StatusCode::SERVICE_UNAVAILABLE, "Shutting down").into_response()
    } else {
        (StatusCode::OK, "OK").into_response()
    }
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    role: Option<String>,
    #[serde(rename = "roomId")]
    room_id: Option<String>,
}

/// Upgrade the connection and hand it to the session plumbing. Browser
/// peers connect cross-origin, so no origin restriction is applied;
/// validation failures are reported on the close frame after the upgrade.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    ws.max_message_size(MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_socket(socket, query, state))
}

async fn handle_socket(socket: WebSocket, query: WsQuery, state: AppState) {
    let Some(role) = query.role.as_deref().and_then(Role::from_query) else {
        return reject(socket, CLOSE_INVALID_ROLE, "role must be 'host' or 'client'").await;
    };

    let room = match role {
        Role::Host => match state.hub.allocate_room().await {
            Ok(room) => {
                // the room outlives this handler; its lifetime timer runs on
                // its own task under the process-root cancellation
                let hub = Arc::clone(&state.hub);
                let running = Arc::clone(&room);
                tokio::spawn(async move { hub.run_room(running).await });
                room
            }
            Err(err) => {
                return reject(socket, CLOSE_ROOM_ID_COLLISION, &err.to_string()).await;
            }
        },
        Role::Guest => {
            let raw = match query.room_id.as_deref() {
                Some(raw) if !raw.is_empty() => raw,
                _ => {
                    return reject(
                        socket,
                        CLOSE_MISSING_ROOM_ID,
                        "roomId is required when role is 'client'",
                    )
                    .await;
                }
            };
            let room = match RoomId::parse(raw) {
                Some(id) => state.hub.get_room(&id).await,
                None => None,
            };
            match room {
                Some(room) => room,
                None => {
                    let reason = SignalingError::RoomNotFound.to_string();
                    return reject(socket, CLOSE_ROOM_NOT_FOUND, &reason).await;
                }
            }
        }
    };

    let (session, outbound) = ClientSession::new(role, state.label_policy);
    if let Err(err) = room.add_occupant(&session).await {
        return reject(socket, CLOSE_ROOM_FULL, &err.to_string()).await;
    }

    if role == Role::Host {
        session.send_message(&SignalMessage::RoomMeta { room_id: room.id });
    }

    info!(session_id = %session.id, room_id = %room.id, role = %role, "client connected");
    session.run(socket, outbound, &room).await;
    room.remove_occupant(&session).await;
    info!(session_id = %session.id, room_id = %room.id, "client disconnected");
}

/// Close a freshly upgraded socket with an application close code.
async fn reject(mut socket: WebSocket, code: u16, reason: &str) {
    debug!(code, reason, "rejecting connection");
    let frame = CloseFrame {
        code,
        reason: Utf8Bytes::from(reason.to_owned()),
    };
    let _ = socket.send(Message::Close(Some(frame))).await;
}
