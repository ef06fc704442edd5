//! In-process store. Used by tests and by local runs without `DATABASE_URL`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use uuid::Uuid;

use super::{BoardStore, StoreError};
use crate::model::{BoardPatch, BoardRecord, CanvasSnapshot, ChatMessage, SharedNote, UserRecord, now_ms};

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    users: HashMap<Uuid, UserRecord>,
    sessions: HashMap<String, Uuid>,
    boards: HashMap<Uuid, BoardRecord>,
    /// All boards, insertion order.
    messages: Vec<ChatMessage>,
    notes: HashMap<Uuid, SharedNote>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert_user(&self, username: &str, avatar_url: Option<&str>) -> UserRecord {
        let user = UserRecord { id: Uuid::new_v4(), username: username.to_owned(), avatar_url: avatar_url.map(str::to_owned) };
        self.lock().users.insert(user.id, user.clone());
        user
    }

    /// Register a session token for an existing user.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UserNotFound`] for unknown users.
    pub fn insert_session(&self, token: &str, user_id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if !inner.users.contains_key(&user_id) {
            return Err(StoreError::UserNotFound(user_id));
        }
        inner.sessions.insert(token.to_owned(), user_id);
        Ok(())
    }

    pub fn revoke_session(&self, token: &str) {
        self.lock().sessions.remove(token);
    }

    pub fn insert_board(&self, name: &str, owner_id: Option<Uuid>) -> BoardRecord {
        let now = now_ms();
        let board = BoardRecord {
            id: Uuid::new_v4(),
            name: name.to_owned(),
            owner_id,
            canvas: CanvasSnapshot::default(),
            created_at: now,
            updated_at: now,
        };
        self.lock().boards.insert(board.id, board.clone());
        board
    }

    /// Seed one user, session, and empty board for local development.
    ///
    /// # Errors
    ///
    /// Propagates the session insert failure.
    pub fn seed_demo(&self, token: &str) -> Result<(UserRecord, BoardRecord), StoreError> {
        let user = self.insert_user("demo", None);
        self.insert_session(token, user.id)?;
        let board = self.insert_board("Demo Board", Some(user.id));
        Ok((user, board))
    }
}

#[async_trait::async_trait]
impl BoardStore for MemoryStore {
    async fn get_board(&self, board_id: Uuid) -> Result<Option<BoardRecord>, StoreError> {
        Ok(self.lock().boards.get(&board_id).cloned())
    }

    async fn update_board(&self, board_id: Uuid, patch: BoardPatch) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let board = inner
            .boards
            .get_mut(&board_id)
            .ok_or(StoreError::BoardNotFound(board_id))?;
        if let Some(name) = patch.name {
            board.name = name;
        }
        if let Some(canvas) = patch.canvas {
            board.canvas = canvas;
        }
        board.updated_at = now_ms();
        Ok(())
    }

    async fn append_chat_message(&self, board_id: Uuid, user_id: Uuid, text: &str) -> Result<ChatMessage, StoreError> {
        let mut inner = self.lock();
        if !inner.boards.contains_key(&board_id) {
            return Err(StoreError::BoardNotFound(board_id));
        }
        let author = inner
            .users
            .get(&user_id)
            .cloned()
            .ok_or(StoreError::UserNotFound(user_id))?;

        // Keep timestamps monotonic per board even within one millisecond.
        let last = inner
            .messages
            .iter()
            .rev()
            .find(|m| m.board_id == board_id)
            .map_or(0, |m| m.created_at);
        let message = ChatMessage {
            id: Uuid::new_v4(),
            board_id,
            author,
            text: text.to_owned(),
            created_at: now_ms().max(last),
        };
        inner.messages.push(message.clone());
        Ok(message)
    }

    async fn list_recent_messages(&self, board_id: Uuid, limit: usize) -> Result<Vec<ChatMessage>, StoreError> {
        let inner = self.lock();
        let mut recent: Vec<ChatMessage> = inner
            .messages
            .iter()
            .rev()
            .filter(|m| m.board_id == board_id)
            .take(limit)
            .cloned()
            .collect();
        recent.reverse();
        Ok(recent)
    }

    async fn get_shared_note(&self, board_id: Uuid) -> Result<Option<SharedNote>, StoreError> {
        Ok(self.lock().notes.get(&board_id).cloned())
    }

    async fn upsert_shared_note(&self, board_id: Uuid, content: &str, author_id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if !inner.boards.contains_key(&board_id) {
            return Err(StoreError::BoardNotFound(board_id));
        }
        inner.notes.insert(
            board_id,
            SharedNote { board_id, content: content.to_owned(), last_updated_by: Some(author_id), updated_at: now_ms() },
        );
        Ok(())
    }

    async fn find_session_user(&self, token: &str) -> Result<Option<UserRecord>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .sessions
            .get(token)
            .and_then(|user_id| inner.users.get(user_id))
            .cloned())
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod tests;
