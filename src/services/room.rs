//! Room registry: which sessions are present in which board room.
//!
//! DESIGN
//! ======
//! One `RwLock` guards both directions of the membership map: board → room
//! members, and session → board. Keeping them under a single lock makes the
//! "a session belongs to at most one room" invariant trivially hold across a
//! swap. Rooms are created on first join and deleted when they empty.
//!
//! The lock is never held across an `.await` that leaves this module; the
//! outbound channel sends in `broadcast` use `try_send`.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::event::{Member, ServerEvent};

// =============================================================================
// TYPES
// =============================================================================

/// One session's presence in a room, plus its outbound channel.
#[derive(Debug, Clone)]
pub struct RoomMember {
    pub user_id: Uuid,
    pub username: String,
    pub avatar_url: Option<String>,
    pub tx: mpsc::Sender<ServerEvent>,
}

#[derive(Default)]
struct Room {
    members: HashMap<Uuid, RoomMember>,
}

#[derive(Default)]
struct Registry {
    rooms: HashMap<Uuid, Room>,
    sessions: HashMap<Uuid, Uuid>,
}

impl Registry {
    fn remove(&mut self, board_id: Uuid, session_id: Uuid) -> Leave {
        let Some(room) = self.rooms.get_mut(&board_id) else {
            return Leave::default();
        };
        if room.members.remove(&session_id).is_none() {
            return Leave::default();
        }
        if self.sessions.get(&session_id) == Some(&board_id) {
            self.sessions.remove(&session_id);
        }
        let room_emptied = room.members.is_empty();
        if room_emptied {
            self.rooms.remove(&board_id);
        }
        Leave { removed: true, room_emptied }
    }
}

/// A session left its previous room as part of a join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Departure {
    pub board_id: Uuid,
    pub room_emptied: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinOutcome {
    /// Set when the session was in a different room before this join.
    pub previous: Option<Departure>,
    /// The session was already in this room; nothing changed.
    pub already_member: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Leave {
    pub removed: bool,
    pub room_emptied: bool,
}

// =============================================================================
// REGISTRY
// =============================================================================

#[derive(Clone, Default)]
pub struct RoomRegistry {
    inner: Arc<RwLock<Registry>>,
}

impl RoomRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session to a board room, leaving any other room first.
    pub async fn join(&self, board_id: Uuid, session_id: Uuid, member: RoomMember) -> JoinOutcome {
        let mut registry = self.inner.write().await;

        let previous = match registry.sessions.get(&session_id).copied() {
            Some(current) if current == board_id => {
                // Refresh the channel in case the caller reconnected it.
                if let Some(existing) = registry
                    .rooms
                    .get_mut(&board_id)
                    .and_then(|room| room.members.get_mut(&session_id))
                {
                    *existing = member;
                }
                return JoinOutcome { previous: None, already_member: true };
            }
            Some(current) => {
                let left = registry.remove(current, session_id);
                Some(Departure { board_id: current, room_emptied: left.room_emptied })
            }
            None => None,
        };

        let room = registry.rooms.entry(board_id).or_default();
        room.members.insert(session_id, member);
        let members = room.members.len();
        registry.sessions.insert(session_id, board_id);

        info!(%board_id, %session_id, members, "session joined room");
        JoinOutcome { previous, already_member: false }
    }

    /// Remove a session from a board room. Deletes the room if it empties.
    pub async fn leave(&self, board_id: Uuid, session_id: Uuid) -> Leave {
        let left = self.inner.write().await.remove(board_id, session_id);
        if left.removed {
            info!(%board_id, %session_id, room_emptied = left.room_emptied, "session left room");
        }
        left
    }

    /// Snapshot of the room's members, ordered by username then session id.
    pub async fn list_members(&self, board_id: Uuid) -> Vec<Member> {
        let registry = self.inner.read().await;
        let Some(room) = registry.rooms.get(&board_id) else {
            return Vec::new();
        };
        let mut members: Vec<Member> = room
            .members
            .iter()
            .map(|(session_id, m)| Member {
                session_id: *session_id,
                user_id: m.user_id,
                username: m.username.clone(),
                avatar_url: m.avatar_url.clone(),
            })
            .collect();
        members.sort_by(|a, b| {
            a.username
                .cmp(&b.username)
                .then(a.session_id.cmp(&b.session_id))
        });
        members
    }

    /// Send an event to every member of a room, optionally excluding one
    /// session. Returns the number of members the event was queued for.
    pub async fn broadcast(&self, board_id: Uuid, event: &ServerEvent, exclude: Option<Uuid>) -> usize {
        let registry = self.inner.read().await;
        let Some(room) = registry.rooms.get(&board_id) else {
            return 0;
        };

        let mut delivered = 0;
        for (session_id, member) in &room.members {
            if exclude == Some(*session_id) {
                continue;
            }
            // Best-effort: a full or closed channel skips this member.
            match member.tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => debug!(%board_id, %session_id, event = event.name(), error = %e, "broadcast skipped member"),
            }
        }
        delivered
    }

    pub async fn board_of(&self, session_id: Uuid) -> Option<Uuid> {
        self.inner.read().await.sessions.get(&session_id).copied()
    }

    pub async fn contains(&self, board_id: Uuid) -> bool {
        self.inner.read().await.rooms.contains_key(&board_id)
    }

    pub async fn room_count(&self) -> usize {
        self.inner.read().await.rooms.len()
    }
}

#[cfg(test)]
#[path = "room_test.rs"]
mod tests;
