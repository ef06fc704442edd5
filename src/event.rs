//! Events: the closed set of messages exchanged over a board websocket.
//!
//! ARCHITECTURE
//! ============
//! Every websocket text message is `{"event": "<name>", "data": <payload>}`.
//! Inbound messages parse into [`ClientEvent`], outbound messages are
//! [`ServerEvent`]. Both are tagged unions, so the session coordinator
//! dispatches by exhaustive `match` instead of by string prefix.
//!
//! DESIGN
//! ======
//! - Broadcasts carry an [`Actor`] stamped by the server from the session's
//!   authenticated identity; client-supplied identity claims are never relayed.
//! - Session ids and user ids are distinct fields. One user may hold several
//!   sessions at once.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{BoardRecord, CanvasSnapshot, ChatMessage, Element, ElementPatch, Stroke, UserRecord};

/// Cursor color used when the client does not send one.
pub const DEFAULT_CURSOR_COLOR: &str = "#2563EB";

// =============================================================================
// ERROR CODES
// =============================================================================

/// Grepable error code for structured `error` events.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;
}

// =============================================================================
// INBOUND
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CursorPosition {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub color: Option<String>,
}

/// Client → server events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    JoinBoard {
        #[serde(rename = "boardId")]
        board_id: String,
    },
    CursorMove(CursorPosition),
    CanvasStroke(Stroke),
    CanvasElement(Element),
    CanvasElementUpdate(ElementPatch),
    CanvasClear,
    ChatMessage {
        text: String,
    },
    NotesUpdate {
        content: String,
    },
    BoardNameUpdate {
        name: String,
    },
    LeaveBoard,
}

impl ClientEvent {
    /// Parse one inbound websocket text message.
    ///
    /// # Errors
    ///
    /// Returns the JSON error for unparseable text or unknown events.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Event name, for logging.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinBoard { .. } => "join-board",
            Self::CursorMove(_) => "cursor-move",
            Self::CanvasStroke(_) => "canvas-stroke",
            Self::CanvasElement(_) => "canvas-element",
            Self::CanvasElementUpdate(_) => "canvas-element-update",
            Self::CanvasClear => "canvas-clear",
            Self::ChatMessage { .. } => "chat-message",
            Self::NotesUpdate { .. } => "notes-update",
            Self::BoardNameUpdate { .. } => "board-name-update",
            Self::LeaveBoard => "leave-board",
        }
    }
}

// =============================================================================
// OUTBOUND
// =============================================================================

/// Originator of a broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub username: String,
}

/// A session present in a board room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub avatar_url: Option<String>,
}

/// Board metadata plus canvas, as served in hydration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardView {
    pub id: Uuid,
    pub name: String,
    pub owner_id: Option<Uuid>,
    pub canvas: CanvasSnapshot,
}

impl From<BoardRecord> for BoardView {
    fn from(board: BoardRecord) -> Self {
        Self { id: board.id, name: board.name, owner_id: board.owner_id, canvas: board.canvas }
    }
}

/// Full hydration payload sent to a session that just joined.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardStatePayload {
    pub board: BoardView,
    pub notes: String,
    pub messages: Vec<ChatMessage>,
    pub users: Vec<Member>,
}

/// Server → client events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    Connected { session_id: Uuid, user: UserRecord },
    BoardState(Box<BoardStatePayload>),
    UserJoined(Member),
    #[serde(rename_all = "camelCase")]
    UserLeft { session_id: Uuid, user_id: Uuid, username: String },
    CursorUpdate { actor: Actor, x: f64, y: f64, color: String },
    CanvasStroke { actor: Actor, stroke: Stroke },
    CanvasElement { actor: Actor, element: Element },
    CanvasElementUpdate { actor: Actor, patch: ElementPatch },
    CanvasClear { actor: Actor },
    ChatMessage(ChatMessage),
    NotesUpdate { actor: Actor, content: String },
    BoardNameUpdate { actor: Actor, name: String },
    Error { code: String, message: String },
}

impl ServerEvent {
    /// Build an `error` event from a typed error.
    #[must_use]
    pub fn error_from(err: &(impl ErrorCode + ?Sized)) -> Self {
        Self::Error { code: err.error_code().to_owned(), message: err.to_string() }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::BoardState(_) => "board-state",
            Self::UserJoined(_) => "user-joined",
            Self::UserLeft { .. } => "user-left",
            Self::CursorUpdate { .. } => "cursor-update",
            Self::CanvasStroke { .. } => "canvas-stroke",
            Self::CanvasElement { .. } => "canvas-element",
            Self::CanvasElementUpdate { .. } => "canvas-element-update",
            Self::CanvasClear { .. } => "canvas-clear",
            Self::ChatMessage(_) => "chat-message",
            Self::NotesUpdate { .. } => "notes-update",
            Self::BoardNameUpdate { .. } => "board-name-update",
            Self::Error { .. } => "error",
        }
    }

    /// Cursor traffic is high-volume and skipped by per-event logging.
    #[must_use]
    pub fn is_cursor(&self) -> bool {
        matches!(self, Self::CursorUpdate { .. })
    }
}

// =============================================================================
// TESTS
// =============================================================================
