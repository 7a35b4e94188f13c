//! Core domain types for medinfo.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// SessionId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for conversation session identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Generate a new time-sortable session identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// MedicineRecord
// ---------------------------------------------------------------------------

/// One row of the medicine dataset.
///
/// Field names on the wire match the CSV headers of the published
/// medicine-details dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicineRecord {
    /// Identifying name; the case-insensitive match key.
    #[serde(rename = "Medicine Name")]
    pub name: String,
    #[serde(rename = "Composition")]
    pub composition: String,
    #[serde(rename = "Uses")]
    pub uses: String,
    #[serde(rename = "Side_effects")]
    pub side_effects: String,
    #[serde(rename = "Manufacturer")]
    pub manufacturer: String,
    /// Share of excellent reviews, 0-100.
    #[serde(rename = "Excellent Review %")]
    pub excellent_review_pct: f32,
    /// Share of average reviews, 0-100.
    #[serde(rename = "Average Review %")]
    pub average_review_pct: f32,
    /// Share of poor reviews, 0-100.
    #[serde(rename = "Poor Review %")]
    pub poor_review_pct: f32,
    #[serde(rename = "Image URL")]
    pub image_url: String,
}

impl MedicineRecord {
    /// The three review percentages in display order (excellent, average, poor).
    pub fn reviews(&self) -> [f32; 3] {
        [
            self.excellent_review_pct,
            self.average_review_pct,
            self.poor_review_pct,
        ]
    }
}

// ---------------------------------------------------------------------------
// ConversationTurn
// ---------------------------------------------------------------------------

/// Who produced a transcript turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "You"),
            Self::Assistant => write!(f, "Assistant"),
        }
    }
}

/// A single entry in the conversation transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    /// Rendered text; may span multiple lines and embed a Markdown image link.
    pub text: String,
    pub at: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            at: Utc::now(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            at: Utc::now(),
        }
    }
}
