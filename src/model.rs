//! Board data model: strokes, canvas elements, chat, and shared notes.
//!
//! DESIGN
//! ======
//! These types are both the wire payloads and the persisted document shape.
//! Field names are camelCase on the wire to match the browser client.
//! Elements are a closed sum type keyed by a `type` discriminator so every
//! place that renders or reconciles them matches exhaustively.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current time as milliseconds since Unix epoch.
pub(crate) fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

// =============================================================================
// STROKES
// =============================================================================

/// A point in normalized board space, `[0,1] x [0,1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    fn clamped(self) -> Self {
        Self { x: self.x.clamp(0.0, 1.0), y: self.y.clamp(0.0, 1.0) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    #[serde(alias = "pen")]
    Draw,
    #[serde(alias = "eraser")]
    Erase,
}

/// One straight ink segment. Strokes have no identity and are append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stroke {
    pub from: Point,
    pub to: Point,
    pub color: String,
    pub size: f64,
    pub tool_type: ToolKind,
}

impl Stroke {
    /// Clamp endpoints into board space. Returns `None` for strokes with
    /// non-finite coordinates or size.
    #[must_use]
    pub fn normalized(self) -> Option<Self> {
        if !self.from.is_finite() || !self.to.is_finite() || !self.size.is_finite() {
            return None;
        }
        Some(Self { from: self.from.clamped(), to: self.to.clamped(), ..self })
    }
}

// =============================================================================
// ELEMENTS
// =============================================================================

fn default_sticky_color() -> String {
    "#FEF08A".into()
}

/// Kind-specific element payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ElementKind {
    StickyNote {
        #[serde(default)]
        text: String,
        #[serde(default = "default_sticky_color")]
        color: String,
    },
    Card {
        #[serde(default)]
        title: String,
        #[serde(default)]
        body: String,
    },
    Text {
        #[serde(default)]
        text: String,
    },
    Image {
        src: String,
    },
}

impl ElementKind {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::StickyNote { .. } => "sticky-note",
            Self::Card { .. } => "card",
            Self::Text { .. } => "text",
            Self::Image { .. } => "image",
        }
    }
}

/// A movable, resizable canvas object. Ids are chosen by the client and are
/// unique within a board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub id: String,
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(flatten)]
    pub kind: ElementKind,
}

/// Partial update for an existing element. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElementPatch {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
}

/// Full persisted canvas: ink plus elements in stacking order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasSnapshot {
    pub strokes: Vec<Stroke>,
    pub elements: Vec<Element>,
}

// =============================================================================
// BOARDS
// =============================================================================

/// Durable board document.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardRecord {
    pub id: Uuid,
    pub name: String,
    pub owner_id: Option<Uuid>,
    pub canvas: CanvasSnapshot,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Partial board write. `None` fields are left as persisted.
#[derive(Debug, Clone, Default)]
pub struct BoardPatch {
    pub name: Option<String>,
    pub canvas: Option<CanvasSnapshot>,
}

impl BoardPatch {
    #[must_use]
    pub fn name(name: impl Into<String>) -> Self {
        Self { name: Some(name.into()), canvas: None }
    }

    #[must_use]
    pub fn canvas(canvas: CanvasSnapshot) -> Self {
        Self { name: None, canvas: Some(canvas) }
    }
}

// =============================================================================
// USERS, CHAT, NOTES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: Uuid,
    pub username: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: Uuid,
    pub board_id: Uuid,
    pub author: UserRecord,
    pub text: String,
    /// Assigned by the store when the message is persisted.
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedNote {
    pub board_id: Uuid,
    pub content: String,
    pub last_updated_by: Option<Uuid>,
    pub updated_at: i64,
}
