//! Store: durable board state behind an async trait.
//!
//! DESIGN
//! ======
//! The sync core only talks to [`BoardStore`]. `PgStore` is the production
//! backend; `MemoryStore` serves tests and local runs without a database.
//! Every method is one logical read or write. Callers treat any error as
//! "log and drop" except where a join needs the board to exist.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use uuid::Uuid;

use crate::model::{BoardPatch, BoardRecord, ChatMessage, SharedNote, UserRecord};

// =============================================================================
// ERROR
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("board not found: {0}")]
    BoardNotFound(Uuid),
    #[error("user not found: {0}")]
    UserNotFound(Uuid),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("stored document is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl crate::event::ErrorCode for StoreError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::BoardNotFound(_) => "E_BOARD_NOT_FOUND",
            Self::UserNotFound(_) => "E_USER_NOT_FOUND",
            Self::Database(_) | Self::Malformed(_) | Self::Unavailable(_) => "E_STORE",
        }
    }
}

// =============================================================================
// TRAIT
// =============================================================================

/// Durable document store keyed by board id.
#[async_trait::async_trait]
pub trait BoardStore: Send + Sync {
    /// Load a board with its canvas snapshot.
    async fn get_board(&self, board_id: Uuid) -> Result<Option<BoardRecord>, StoreError>;

    /// Apply a partial write to a board.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::BoardNotFound`] if the board does not exist.
    async fn update_board(&self, board_id: Uuid, patch: BoardPatch) -> Result<(), StoreError>;

    /// Persist a chat message. The store assigns `id` and `created_at`.
    async fn append_chat_message(&self, board_id: Uuid, user_id: Uuid, text: &str) -> Result<ChatMessage, StoreError>;

    /// The most recent `limit` messages for a board, oldest first.
    async fn list_recent_messages(&self, board_id: Uuid, limit: usize) -> Result<Vec<ChatMessage>, StoreError>;

    async fn get_shared_note(&self, board_id: Uuid) -> Result<Option<SharedNote>, StoreError>;

    /// Create or overwrite the board's shared note.
    async fn upsert_shared_note(&self, board_id: Uuid, content: &str, author_id: Uuid) -> Result<(), StoreError>;

    /// Resolve an unexpired session token to its user.
    async fn find_session_user(&self, token: &str) -> Result<Option<UserRecord>, StoreError>;
}
