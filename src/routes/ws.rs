//! WebSocket handler: authenticated board event relay.
//!
//! DESIGN
//! ======
//! The credential is verified before the upgrade; a bad one gets a plain
//! HTTP 401 and no socket. After the upgrade the connection enters a
//! `select!` loop:
//! - Incoming client text → parse → `Session::handle` → replies to sender
//! - Room broadcasts queued on the session channel → forward to client
//!
//! Each connection processes its inbound events one at a time, in order.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → send `connected` with the session and user
//! 2. Client sends events → session dispatch → reply / broadcast
//! 3. Close → session disconnect (leave room, announce, settle if last)

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio::sync::mpsc;
use tracing::{Level, debug, error, info, warn};

use crate::event::{ClientEvent, ServerEvent};
use crate::model::UserRecord;
use crate::services::identity::{self, IdentityError};
use crate::services::session::Session;
use crate::state::AppState;

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(State(state): State<AppState>, headers: HeaderMap, ws: WebSocketUpgrade) -> Response {
    let token = identity::extract_token(&headers);
    let user = match identity::verify(state.store.as_ref(), token.as_deref()).await {
        Ok(user) => user,
        Err(IdentityError::Unauthenticated) => {
            return (StatusCode::UNAUTHORIZED, "authentication required").into_response();
        }
        Err(e) => {
            error!(error = %e, "ws: identity lookup failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "identity lookup failed").into_response();
        }
    };

    ws.on_upgrade(move |socket| run_ws(socket, state, user))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState, user: UserRecord) {
    // Per-session channel for room broadcasts.
    let (client_tx, mut client_rx) = mpsc::channel::<ServerEvent>(state.config.client_channel_capacity);
    let mut session = Session::new(user, client_tx);
    let session_id = session.id;

    if send_event(&mut socket, &session.welcome()).await.is_err() {
        return;
    }
    info!(%session_id, user_id = %session.user.id, username = %session.user.username, "ws: session connected");

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        let replies = process_inbound_text(&state, &mut session, text.as_str()).await;
                        if send_all(&mut socket, &replies).await.is_err() {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(event) = client_rx.recv() => {
                if send_event(&mut socket, &event).await.is_err() {
                    break;
                }
            }
        }
    }

    session.disconnect(&state).await;
    info!(%session_id, "ws: session disconnected");
}

/// Parse and handle one inbound text message; returns events for the sender.
///
/// Kept apart from the socket so tests can drive dispatch directly.
async fn process_inbound_text(state: &AppState, session: &mut Session, text: &str) -> Vec<ServerEvent> {
    let event = match ClientEvent::parse(text) {
        Ok(event) => event,
        Err(e) => {
            warn!(session_id = %session.id, error = %e, "ws: dropped malformed event");
            return Vec::new();
        }
    };

    match recv_level(&event) {
        Some(level) if level == Level::DEBUG => {
            debug!(session_id = %session.id, event = event.name(), "ws: recv event");
        }
        Some(_) => info!(session_id = %session.id, event = event.name(), "ws: recv event"),
        None => {}
    }
    session.handle(state, event).await
}

// =============================================================================
// HELPERS
// =============================================================================

/// Cursor moves are not logged; strokes arrive per pointer segment and log
/// at debug.
fn recv_level(event: &ClientEvent) -> Option<Level> {
    match event {
        ClientEvent::CursorMove(_) => None,
        ClientEvent::CanvasStroke(_) => Some(Level::DEBUG),
        _ => Some(Level::INFO),
    }
}

async fn send_all(socket: &mut WebSocket, events: &[ServerEvent]) -> Result<(), axum::Error> {
    for event in events {
        send_event(socket, event).await?;
    }
    Ok(())
}

async fn send_event(socket: &mut WebSocket, event: &ServerEvent) -> Result<(), axum::Error> {
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, event = event.name(), "ws: failed to serialize event");
            return Ok(());
        }
    };
    if !event.is_cursor() {
        debug!(event = event.name(), "ws: send event");
    }
    socket.send(Message::Text(json.into())).await
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
