//! Mutation batcher: bounds durable write rate under high-frequency input.
//!
//! DESIGN
//! ======
//! Two policies, both keyed per board:
//! - Canvas batching: strokes and element patches queue in memory. The first
//!   queued item arms a flush timer; when it fires, the whole batch lands in
//!   one snapshot write. Idle boards arm nothing and write nothing.
//! - Debouncing: every notes or board-name edit restarts that field's timer.
//!   Only the value present when the timer finally fires is persisted.
//!
//! Live broadcasts never wait on any of this. The session coordinator fans
//! out first and hands the mutation here.
//!
//! ERROR HANDLING
//! ==============
//! A failed write is logged and its batch dropped; there is no retry. The
//! live broadcast already reached collaborators, so only durability of that
//! batch is lost.
//!
//! CLEAR
//! =====
//! `clear` cancels the flush timer, drops queued canvas work, and bumps the
//! clear epoch of any flush already in flight for the board. Such a flush
//! checks its epoch again under the canvas lock and discards itself on
//! mismatch, so stale strokes can never land on top of a cleared board.
//! Flight records exist only while a flush runs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::BatchConfig;
use crate::model::{BoardPatch, Element, ElementPatch, Stroke};
use crate::services::canvas;
use crate::services::scheduler::Scheduler;
use crate::store::{BoardStore, StoreError};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    CanvasFlush,
    NoteSave,
    NameSave,
}

type TaskKey = (Uuid, TaskKind);

#[derive(Debug, Default)]
struct CanvasBatch {
    strokes: Vec<Stroke>,
    patches: Vec<ElementPatch>,
}

impl CanvasBatch {
    fn is_empty(&self) -> bool {
        self.strokes.is_empty() && self.patches.is_empty()
    }
}

#[derive(Debug)]
struct PendingNote {
    content: String,
    author_id: Uuid,
}

/// Canvas flushes for one board that have taken their batch but not yet
/// finished writing.
#[derive(Debug, Default)]
struct Flight {
    count: usize,
    /// Bumped by every clear while the flight is open.
    epoch: u64,
}

#[derive(Default)]
struct Pending {
    canvas: HashMap<Uuid, CanvasBatch>,
    notes: HashMap<Uuid, PendingNote>,
    names: HashMap<Uuid, String>,
    in_flight: HashMap<Uuid, Flight>,
}

impl Pending {
    fn epoch(&self, board_id: Uuid) -> u64 {
        self.in_flight.get(&board_id).map_or(0, |f| f.epoch)
    }
}

/// Holds a board's flight open until dropped.
struct FlightGuard<'a> {
    pending: &'a Mutex<Pending>,
    board_id: Uuid,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let landed = match pending.in_flight.get_mut(&self.board_id) {
            Some(flight) => {
                flight.count = flight.count.saturating_sub(1);
                flight.count == 0
            }
            None => false,
        };
        if landed {
            pending.in_flight.remove(&self.board_id);
        }
    }
}

// =============================================================================
// BATCHER
// =============================================================================

#[derive(Clone)]
pub struct MutationBatcher {
    store: Arc<dyn BoardStore>,
    config: BatchConfig,
    pending: Arc<Mutex<Pending>>,
    scheduler: Scheduler<TaskKey>,
    /// Serializes snapshot read-modify-write cycles.
    canvas_lock: Arc<tokio::sync::Mutex<()>>,
}

impl MutationBatcher {
    #[must_use]
    pub fn new(store: Arc<dyn BoardStore>, config: BatchConfig) -> Self {
        Self {
            store,
            config,
            pending: Arc::new(Mutex::new(Pending::default())),
            scheduler: Scheduler::new(),
            canvas_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -------------------------------------------------------------------------
    // canvas
    // -------------------------------------------------------------------------

    /// Queue a stroke for the board's next canvas flush.
    pub fn queue_stroke(&self, board_id: Uuid, stroke: Stroke) {
        self.lock()
            .canvas
            .entry(board_id)
            .or_default()
            .strokes
            .push(stroke);
        self.arm_canvas_flush(board_id);
    }

    /// Queue an element patch for the board's next canvas flush.
    pub fn queue_element_patch(&self, board_id: Uuid, patch: ElementPatch) {
        self.lock()
            .canvas
            .entry(board_id)
            .or_default()
            .patches
            .push(patch);
        self.arm_canvas_flush(board_id);
    }

    fn arm_canvas_flush(&self, board_id: Uuid) {
        let this = self.clone();
        let armed = self
            .scheduler
            .schedule_if_idle((board_id, TaskKind::CanvasFlush), self.config.stroke_flush, async move {
                this.flush_canvas(board_id).await;
            });
        if armed {
            debug!(%board_id, delay_ms = self.config.stroke_flush.as_millis(), "canvas flush armed");
        }
    }

    /// Persist an element immediately. Queued patches for the same id are
    /// dropped: the element carries the complete, newer value.
    ///
    /// # Errors
    ///
    /// Returns the store error if the upsert fails.
    pub async fn upsert_element(&self, board_id: Uuid, element: Element) -> Result<(), StoreError> {
        if let Some(batch) = self.lock().canvas.get_mut(&board_id) {
            batch.patches.retain(|p| p.id != element.id);
        }
        let _guard = self.canvas_lock.lock().await;
        canvas::upsert_element(self.store.as_ref(), board_id, element).await
    }

    /// Reset the board's canvas, discarding any queued canvas work.
    ///
    /// # Errors
    ///
    /// Returns the store error if the reset write fails.
    pub async fn clear(&self, board_id: Uuid) -> Result<(), StoreError> {
        self.scheduler.cancel(&(board_id, TaskKind::CanvasFlush));
        let dropped = {
            let mut pending = self.lock();
            if let Some(flight) = pending.in_flight.get_mut(&board_id) {
                flight.epoch += 1;
            }
            pending.canvas.remove(&board_id)
        };
        if let Some(batch) = dropped {
            debug!(%board_id, strokes = batch.strokes.len(), patches = batch.patches.len(), "clear dropped pending canvas batch");
        }
        let _guard = self.canvas_lock.lock().await;
        canvas::clear(self.store.as_ref(), board_id).await
    }

    /// Write the board's queued canvas batch now.
    pub async fn flush_canvas(&self, board_id: Uuid) {
        let (batch, epoch) = {
            let mut pending = self.lock();
            let Some(batch) = pending.canvas.remove(&board_id).filter(|b| !b.is_empty()) else {
                return;
            };
            let flight = pending.in_flight.entry(board_id).or_default();
            flight.count += 1;
            (batch, flight.epoch)
        };
        let _flight = FlightGuard { pending: &self.pending, board_id };

        let _guard = self.canvas_lock.lock().await;
        if self.lock().epoch(board_id) != epoch {
            debug!(%board_id, "board cleared while flush was waiting; batch discarded");
            return;
        }

        let stroke_count = batch.strokes.len();
        match canvas::apply_batch(self.store.as_ref(), board_id, batch.strokes, &batch.patches).await {
            Ok(applied) => {
                info!(%board_id, strokes = stroke_count, patches = applied, "canvas batch flushed");
            }
            Err(e) => {
                error!(error = %e, %board_id, strokes = stroke_count, patches = batch.patches.len(), "canvas flush failed; batch dropped");
            }
        }
    }

    // -------------------------------------------------------------------------
    // notes / name
    // -------------------------------------------------------------------------

    /// Record the latest notes content and restart the notes debounce.
    pub fn queue_note(&self, board_id: Uuid, content: String, author_id: Uuid) {
        self.lock()
            .notes
            .insert(board_id, PendingNote { content, author_id });
        let this = self.clone();
        self.scheduler
            .schedule((board_id, TaskKind::NoteSave), self.config.notes_debounce, async move {
                this.flush_note(board_id).await;
            });
    }

    /// Record the latest board name and restart the name debounce.
    pub fn queue_name(&self, board_id: Uuid, name: String) {
        self.lock().names.insert(board_id, name);
        let this = self.clone();
        self.scheduler
            .schedule((board_id, TaskKind::NameSave), self.config.name_debounce, async move {
                this.flush_name(board_id).await;
            });
    }

    pub async fn flush_note(&self, board_id: Uuid) {
        let Some(note) = self.lock().notes.remove(&board_id) else {
            return;
        };
        if let Err(e) = self
            .store
            .upsert_shared_note(board_id, &note.content, note.author_id)
            .await
        {
            error!(error = %e, %board_id, "notes save failed; edit dropped");
        }
    }

    pub async fn flush_name(&self, board_id: Uuid) {
        let Some(name) = self.lock().names.remove(&board_id) else {
            return;
        };
        if let Err(e) = self
            .store
            .update_board(board_id, BoardPatch::name(name))
            .await
        {
            error!(error = %e, %board_id, "board name save failed; edit dropped");
        }
    }

    // -------------------------------------------------------------------------
    // lifecycle
    // -------------------------------------------------------------------------

    /// Cancel every timer for the board and flush what is pending now.
    /// Called when a room empties so no timer outlives its room.
    pub async fn settle(&self, board_id: Uuid) {
        for kind in [TaskKind::CanvasFlush, TaskKind::NoteSave, TaskKind::NameSave] {
            self.scheduler.cancel(&(board_id, kind));
        }
        self.flush_canvas(board_id).await;
        self.flush_note(board_id).await;
        self.flush_name(board_id).await;
    }

    /// Settle every board with pending work. Used at shutdown.
    pub async fn settle_all(&self) {
        let boards: Vec<Uuid> = {
            let pending = self.lock();
            let mut ids: Vec<Uuid> = pending
                .canvas
                .keys()
                .chain(pending.notes.keys())
                .chain(pending.names.keys())
                .copied()
                .collect();
            ids.sort_unstable();
            ids.dedup();
            ids
        };
        for board_id in boards {
            self.settle(board_id).await;
        }
    }

    #[must_use]
    pub fn has_pending(&self, board_id: Uuid) -> bool {
        let pending = self.lock();
        pending.canvas.contains_key(&board_id)
            || pending.notes.contains_key(&board_id)
            || pending.names.contains_key(&board_id)
    }

    #[must_use]
    pub fn pending_stroke_count(&self, board_id: Uuid) -> usize {
        self.lock()
            .canvas
            .get(&board_id)
            .map_or(0, |b| b.strokes.len())
    }

    #[must_use]
    pub fn is_armed(&self, board_id: Uuid, kind: TaskKind) -> bool {
        self.scheduler.is_armed(&(board_id, kind))
    }
}

#[cfg(test)]
#[path = "batcher_test.rs"]
mod tests;
