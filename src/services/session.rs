//! Session coordinator: per-connection state machine and event routing.
//!
//! DESIGN
//! ======
//! A session is `Unbound` after the handshake, `Bound(board)` after a
//! successful join, and `Disconnected` once its socket closes. Board-scoped
//! events received while unbound are dropped.
//!
//! Handlers validate, hand durable work to the batcher, and return an
//! `Outcome`. The dispatch step owns fan-out: broadcasts go through the room
//! registry, and anything the sender itself should see is returned to the
//! websocket loop. Every broadcast carries an `Actor` stamped from the
//! authenticated identity.
//!
//! ERROR HANDLING
//! ==============
//! Only join failures reach the client, as an `error` event. Malformed input
//! is dropped with a debug log. Persistence failures on live events are
//! logged and swallowed; collaborators already saw the change.

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::event::{Actor, BoardStatePayload, ClientEvent, CursorPosition, DEFAULT_CURSOR_COLOR, Member, ServerEvent};
use crate::model::{BoardRecord, ChatMessage, Element, ElementPatch, SharedNote, Stroke, UserRecord};
use crate::services::room::{Departure, JoinOutcome, RoomMember};
use crate::state::AppState;
use crate::store::StoreError;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("board not found: {0}")]
    BoardNotFound(String),
    #[error("failed to join board")]
    JoinFailed(#[source] StoreError),
}

impl crate::event::ErrorCode for SessionError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::BoardNotFound(_) => "E_BOARD_NOT_FOUND",
            Self::JoinFailed(_) => "E_JOIN_FAILED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unbound,
    Bound(Uuid),
    Disconnected,
}

/// Who receives the event a handler produced.
enum Outcome {
    /// Nothing to send.
    Ignore,
    /// Everyone in the room except the sender.
    BroadcastExcludeSender(ServerEvent),
    /// Everyone in the room including the sender.
    Broadcast(ServerEvent),
}

/// Durable write performed after the broadcast went out.
enum Followup {
    UpsertElement(Element),
    ClearCanvas,
}

pub struct Session {
    pub id: Uuid,
    pub user: UserRecord,
    state: SessionState,
    tx: mpsc::Sender<ServerEvent>,
}

impl Session {
    #[must_use]
    pub fn new(user: UserRecord, tx: mpsc::Sender<ServerEvent>) -> Self {
        Self { id: Uuid::new_v4(), user, state: SessionState::Unbound, tx }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn board_id(&self) -> Option<Uuid> {
        match self.state {
            SessionState::Bound(board_id) => Some(board_id),
            SessionState::Unbound | SessionState::Disconnected => None,
        }
    }

    /// First event sent after the upgrade.
    #[must_use]
    pub fn welcome(&self) -> ServerEvent {
        ServerEvent::Connected { session_id: self.id, user: self.user.clone() }
    }

    #[must_use]
    pub fn actor(&self) -> Actor {
        Actor { session_id: self.id, user_id: self.user.id, username: self.user.username.clone() }
    }

    fn as_member(&self) -> RoomMember {
        RoomMember {
            user_id: self.user.id,
            username: self.user.username.clone(),
            avatar_url: self.user.avatar_url.clone(),
            tx: self.tx.clone(),
        }
    }

    // -------------------------------------------------------------------------
    // dispatch
    // -------------------------------------------------------------------------

    /// Process one inbound event. Returns the events to send to this
    /// session directly; everything else goes out through the room.
    pub async fn handle(&mut self, state: &AppState, event: ClientEvent) -> Vec<ServerEvent> {
        if self.state == SessionState::Disconnected {
            return Vec::new();
        }

        let board_id = match event {
            ClientEvent::JoinBoard { board_id } => {
                return match self.join_board(state, &board_id).await {
                    Ok(events) => events,
                    Err(e) => {
                        warn!(session_id = %self.id, board_id = %board_id, error = %e, "join-board failed");
                        vec![ServerEvent::error_from(&e)]
                    }
                };
            }
            ClientEvent::LeaveBoard => {
                self.leave_board(state).await;
                return Vec::new();
            }
            _ => match self.state {
                SessionState::Bound(board_id) => board_id,
                SessionState::Unbound | SessionState::Disconnected => {
                    debug!(session_id = %self.id, event = event.name(), "dropped board event before join");
                    return Vec::new();
                }
            },
        };

        let (outcome, followup) = self.route(state, board_id, event).await;
        let reply = self.dispatch(state, board_id, outcome).await;
        if let Some(followup) = followup {
            self.persist(state, board_id, followup).await;
        }
        reply
    }

    async fn route(&self, state: &AppState, board_id: Uuid, event: ClientEvent) -> (Outcome, Option<Followup>) {
        match event {
            ClientEvent::CursorMove(pos) => (self.on_cursor(pos), None),
            ClientEvent::CanvasStroke(stroke) => (self.on_stroke(state, board_id, stroke), None),
            ClientEvent::CanvasElement(element) => self.on_element(element),
            ClientEvent::CanvasElementUpdate(patch) => (self.on_element_update(state, board_id, patch), None),
            ClientEvent::CanvasClear => (
                Outcome::BroadcastExcludeSender(ServerEvent::CanvasClear { actor: self.actor() }),
                Some(Followup::ClearCanvas),
            ),
            ClientEvent::ChatMessage { text } => (self.on_chat(state, board_id, &text).await, None),
            ClientEvent::NotesUpdate { content } => {
                state
                    .batcher
                    .queue_note(board_id, content.clone(), self.user.id);
                (Outcome::BroadcastExcludeSender(ServerEvent::NotesUpdate { actor: self.actor(), content }), None)
            }
            ClientEvent::BoardNameUpdate { name } => (self.on_board_name(state, board_id, &name), None),
            // Handled before routing.
            ClientEvent::JoinBoard { .. } | ClientEvent::LeaveBoard => (Outcome::Ignore, None),
        }
    }

    async fn dispatch(&self, state: &AppState, board_id: Uuid, outcome: Outcome) -> Vec<ServerEvent> {
        match outcome {
            Outcome::Ignore => Vec::new(),
            Outcome::BroadcastExcludeSender(event) => {
                state
                    .rooms
                    .broadcast(board_id, &event, Some(self.id))
                    .await;
                Vec::new()
            }
            Outcome::Broadcast(event) => {
                state
                    .rooms
                    .broadcast(board_id, &event, Some(self.id))
                    .await;
                vec![event]
            }
        }
    }

    async fn persist(&self, state: &AppState, board_id: Uuid, followup: Followup) {
        let result = match followup {
            Followup::UpsertElement(element) => state.batcher.upsert_element(board_id, element).await,
            Followup::ClearCanvas => state.batcher.clear(board_id).await,
        };
        if let Err(e) = result {
            error!(error = %e, %board_id, session_id = %self.id, "canvas write failed");
        }
    }

    // -------------------------------------------------------------------------
    // handlers
    // -------------------------------------------------------------------------

    fn on_cursor(&self, pos: CursorPosition) -> Outcome {
        if !pos.x.is_finite() || !pos.y.is_finite() {
            return Outcome::Ignore;
        }
        Outcome::BroadcastExcludeSender(ServerEvent::CursorUpdate {
            actor: self.actor(),
            x: pos.x.clamp(0.0, 1.0),
            y: pos.y.clamp(0.0, 1.0),
            color: pos
                .color
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| DEFAULT_CURSOR_COLOR.to_owned()),
        })
    }

    fn on_stroke(&self, state: &AppState, board_id: Uuid, stroke: Stroke) -> Outcome {
        let Some(stroke) = stroke.normalized() else {
            debug!(session_id = %self.id, "dropped stroke with non-finite coordinates");
            return Outcome::Ignore;
        };
        state.batcher.queue_stroke(board_id, stroke.clone());
        Outcome::BroadcastExcludeSender(ServerEvent::CanvasStroke { actor: self.actor(), stroke })
    }

    fn on_element(&self, element: Element) -> (Outcome, Option<Followup>) {
        if element.id.is_empty() || !element.x.is_finite() || !element.y.is_finite() {
            debug!(session_id = %self.id, "dropped malformed canvas element");
            return (Outcome::Ignore, None);
        }
        debug!(session_id = %self.id, element_id = %element.id, kind = element.kind.name(), "canvas element");
        let event = ServerEvent::CanvasElement { actor: self.actor(), element: element.clone() };
        (Outcome::BroadcastExcludeSender(event), Some(Followup::UpsertElement(element)))
    }

    fn on_element_update(&self, state: &AppState, board_id: Uuid, patch: ElementPatch) -> Outcome {
        let finite = [patch.x, patch.y, patch.width, patch.height]
            .into_iter()
            .flatten()
            .all(f64::is_finite);
        if patch.id.is_empty() || !finite {
            debug!(session_id = %self.id, "dropped malformed element update");
            return Outcome::Ignore;
        }
        state.batcher.queue_element_patch(board_id, patch.clone());
        Outcome::BroadcastExcludeSender(ServerEvent::CanvasElementUpdate { actor: self.actor(), patch })
    }

    async fn on_chat(&self, state: &AppState, board_id: Uuid, text: &str) -> Outcome {
        let text = text.trim();
        if text.is_empty() {
            return Outcome::Ignore;
        }
        match state
            .store
            .append_chat_message(board_id, self.user.id, text)
            .await
        {
            Ok(message) => Outcome::Broadcast(ServerEvent::ChatMessage(message)),
            Err(e) => {
                error!(error = %e, %board_id, session_id = %self.id, "chat message persist failed; dropped");
                Outcome::Ignore
            }
        }
    }

    fn on_board_name(&self, state: &AppState, board_id: Uuid, name: &str) -> Outcome {
        let name = name.trim();
        if name.is_empty() {
            return Outcome::Ignore;
        }
        state.batcher.queue_name(board_id, name.to_owned());
        Outcome::Broadcast(ServerEvent::BoardNameUpdate { actor: self.actor(), name: name.to_owned() })
    }

    // -------------------------------------------------------------------------
    // membership
    // -------------------------------------------------------------------------

    /// Bind this session to a board and build its hydration payload.
    ///
    /// The session registers in the room before notes, history and the
    /// canvas are read, so anything a peer persists while those reads are in
    /// flight reaches it live even if the reads miss it.
    ///
    /// # Errors
    ///
    /// [`SessionError::BoardNotFound`] for unknown or malformed board ids;
    /// [`SessionError::JoinFailed`] if any hydration read fails. The session
    /// state and room membership are unchanged on error.
    pub async fn join_board(&mut self, state: &AppState, raw_board_id: &str) -> Result<Vec<ServerEvent>, SessionError> {
        let board_id =
            Uuid::parse_str(raw_board_id).map_err(|_| SessionError::BoardNotFound(raw_board_id.to_owned()))?;

        state
            .store
            .get_board(board_id)
            .await
            .map_err(SessionError::JoinFailed)?
            .ok_or_else(|| SessionError::BoardNotFound(raw_board_id.to_owned()))?;

        let joined = state
            .rooms
            .join(board_id, self.id, self.as_member())
            .await;
        let (board, notes, messages) = match load_hydration(state, board_id, raw_board_id).await {
            Ok(hydration) => hydration,
            Err(e) => {
                self.undo_join(state, board_id, joined).await;
                return Err(e);
            }
        };

        if let Some(previous) = joined.previous {
            self.announce_departure(state, previous).await;
        }
        self.state = SessionState::Bound(board_id);

        if !joined.already_member {
            let member = Member {
                session_id: self.id,
                user_id: self.user.id,
                username: self.user.username.clone(),
                avatar_url: self.user.avatar_url.clone(),
            };
            state
                .rooms
                .broadcast(board_id, &ServerEvent::UserJoined(member), Some(self.id))
                .await;
        }

        let users = state.rooms.list_members(board_id).await;
        info!(
            session_id = %self.id,
            %board_id,
            strokes = board.canvas.strokes.len(),
            elements = board.canvas.elements.len(),
            messages = messages.len(),
            rejoin = joined.already_member,
            "session joined board"
        );

        let payload = BoardStatePayload {
            board: board.into(),
            notes: notes.map(|n| n.content).unwrap_or_default(),
            messages,
            users,
        };
        Ok(vec![ServerEvent::BoardState(Box::new(payload))])
    }

    /// Unbind from the current board. No-op when unbound.
    pub async fn leave_board(&mut self, state: &AppState) {
        let SessionState::Bound(board_id) = self.state else {
            return;
        };
        let left = state.rooms.leave(board_id, self.id).await;
        self.state = SessionState::Unbound;
        if left.removed {
            self.announce_departure(state, Departure { board_id, room_emptied: left.room_emptied })
                .await;
        }
    }

    /// Terminal transition. Later events are ignored.
    pub async fn disconnect(&mut self, state: &AppState) {
        self.leave_board(state).await;
        self.state = SessionState::Disconnected;
    }

    /// Put room membership back the way it was before a failed join.
    async fn undo_join(&self, state: &AppState, board_id: Uuid, joined: JoinOutcome) {
        if joined.already_member {
            return;
        }
        state.rooms.leave(board_id, self.id).await;
        if let Some(previous) = joined.previous {
            state
                .rooms
                .join(previous.board_id, self.id, self.as_member())
                .await;
        }
    }

    async fn announce_departure(&self, state: &AppState, departure: Departure) {
        let event = ServerEvent::UserLeft {
            session_id: self.id,
            user_id: self.user.id,
            username: self.user.username.clone(),
        };
        state
            .rooms
            .broadcast(departure.board_id, &event, None)
            .await;
        if departure.room_emptied {
            state.batcher.settle(departure.board_id).await;
        }
    }
}

async fn load_hydration(
    state: &AppState,
    board_id: Uuid,
    raw_board_id: &str,
) -> Result<(BoardRecord, Option<SharedNote>, Vec<ChatMessage>), SessionError> {
    let board = state
        .store
        .get_board(board_id)
        .await
        .map_err(SessionError::JoinFailed)?
        .ok_or_else(|| SessionError::BoardNotFound(raw_board_id.to_owned()))?;
    let notes = state
        .store
        .get_shared_note(board_id)
        .await
        .map_err(SessionError::JoinFailed)?;
    let messages = state
        .store
        .list_recent_messages(board_id, state.config.chat_history_limit)
        .await
        .map_err(SessionError::JoinFailed)?;
    Ok((board, notes, messages))
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
