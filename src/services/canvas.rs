//! Canvas reconciler: merges element writes and stroke batches into the
//! persisted snapshot.
//!
//! DESIGN
//! ======
//! Elements are upserted by id: an existing element is replaced in place
//! (keeping its stacking position), a new one is appended. Every durable
//! operation here is one snapshot read followed by one full-snapshot write.
//! Callers serialize these read-modify-write cycles; see `batcher`.

use uuid::Uuid;

use crate::model::{BoardPatch, CanvasSnapshot, Element, ElementKind, ElementPatch, Stroke};
use crate::store::{BoardStore, StoreError};

// =============================================================================
// SNAPSHOT OPERATIONS
// =============================================================================

impl CanvasSnapshot {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty() && self.elements.is_empty()
    }

    #[must_use]
    pub fn element(&self, id: &str) -> Option<&Element> {
        self.elements.iter().find(|e| e.id == id)
    }

    pub fn append_strokes(&mut self, strokes: impl IntoIterator<Item = Stroke>) {
        self.strokes.extend(strokes);
    }

    /// Insert or replace by id. Returns `true` if an element was replaced.
    pub fn upsert_element(&mut self, element: Element) -> bool {
        if let Some(existing) = self.elements.iter_mut().find(|e| e.id == element.id) {
            *existing = element;
            return true;
        }
        self.elements.push(element);
        false
    }

    /// Apply a patch to the element it targets. Returns `false` when no
    /// element has the patch's id.
    pub fn apply_patch(&mut self, patch: &ElementPatch) -> bool {
        let Some(element) = self.elements.iter_mut().find(|e| e.id == patch.id) else {
            return false;
        };
        patch.apply_to(element);
        true
    }
}

impl ElementPatch {
    /// Overwrite the fields present in the patch. Content fields that the
    /// element's kind does not carry are ignored.
    pub fn apply_to(&self, element: &mut Element) {
        if let Some(x) = self.x {
            element.x = x;
        }
        if let Some(y) = self.y {
            element.y = y;
        }
        if let Some(width) = self.width {
            element.width = Some(width);
        }
        if let Some(height) = self.height {
            element.height = Some(height);
        }

        match &mut element.kind {
            ElementKind::StickyNote { text, color } => {
                set_if_some(text, self.text.as_ref());
                set_if_some(color, self.color.as_ref());
            }
            ElementKind::Card { title, body } => {
                set_if_some(title, self.title.as_ref());
                set_if_some(body, self.body.as_ref());
            }
            ElementKind::Text { text } => {
                set_if_some(text, self.text.as_ref());
            }
            ElementKind::Image { src } => {
                set_if_some(src, self.src.as_ref());
            }
        }
    }
}

fn set_if_some(field: &mut String, value: Option<&String>) {
    if let Some(value) = value {
        field.clone_from(value);
    }
}

// =============================================================================
// DURABLE OPERATIONS
// =============================================================================

async fn load_canvas(store: &dyn BoardStore, board_id: Uuid) -> Result<CanvasSnapshot, StoreError> {
    store
        .get_board(board_id)
        .await?
        .map(|board| board.canvas)
        .ok_or(StoreError::BoardNotFound(board_id))
}

/// Upsert one element into the persisted snapshot.
///
/// # Errors
///
/// Returns [`StoreError::BoardNotFound`] for unknown boards, or any store error.
pub async fn upsert_element(store: &dyn BoardStore, board_id: Uuid, element: Element) -> Result<(), StoreError> {
    let mut canvas = load_canvas(store, board_id).await?;
    canvas.upsert_element(element);
    store.update_board(board_id, BoardPatch::canvas(canvas)).await
}

/// Append strokes and apply element patches in one write. Patches for
/// unknown ids are skipped. Returns the number of patches applied.
///
/// # Errors
///
/// Returns [`StoreError::BoardNotFound`] for unknown boards, or any store error.
pub async fn apply_batch(
    store: &dyn BoardStore,
    board_id: Uuid,
    strokes: Vec<Stroke>,
    patches: &[ElementPatch],
) -> Result<usize, StoreError> {
    let mut canvas = load_canvas(store, board_id).await?;
    canvas.append_strokes(strokes);
    let applied = patches.iter().filter(|p| canvas.apply_patch(p)).count();
    store
        .update_board(board_id, BoardPatch::canvas(canvas))
        .await?;
    Ok(applied)
}

/// Reset the board to an empty canvas.
///
/// # Errors
///
/// Returns any store error.
pub async fn clear(store: &dyn BoardStore, board_id: Uuid) -> Result<(), StoreError> {
    store
        .update_board(board_id, BoardPatch::canvas(CanvasSnapshot::default()))
        .await
}

#[cfg(test)]
#[path = "canvas_test.rs"]
mod tests;
