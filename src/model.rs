//! Core data model.
//!
//! A word entry is one vocabulary word travelling through the pipeline:
//! submitted, generated (text + illustration), optionally reviewed, then
//! exported as a flashcard.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Word Entry
// ---------------------------------------------------------------------------

/// A persisted vocabulary word and its generated flashcard content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordEntry {
    /// Unique identifier, assigned at submission.
    pub id: EntryId,

    /// Source text. Trimmed, never empty.
    pub word: String,

    #[serde(default)]
    pub definition: String,

    #[serde(default)]
    pub example: String,

    /// Scene description the illustration was rendered from.
    #[serde(default)]
    pub image_prompt: String,

    /// Data URL or remote URL of the illustration. Empty when absent.
    #[serde(default)]
    pub image_url: String,

    /// Why the illustration is missing, when generation was attempted and failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_error: Option<String>,

    pub status: WordState,

    pub added_at: DateTime<Utc>,
}

impl WordEntry {
    /// Create a pending entry for `word`. Returns `None` for blank input.
    pub fn new(word: &str) -> Option<Self> {
        let word = word.trim();
        if word.is_empty() {
            return None;
        }
        Some(Self {
            id: EntryId::new(),
            word: word.to_string(),
            definition: String::new(),
            example: String::new(),
            image_prompt: String::new(),
            image_url: String::new(),
            image_error: None,
            status: WordState::Pending,
            added_at: Utc::now(),
        })
    }

    /// Move to `to`, enforcing the transition table.
    pub fn transition(&mut self, to: WordState) -> Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(Error::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    /// True once the generation stage has run, successfully or not.
    pub fn ai_generated(&self) -> bool {
        self.status.is_processed()
    }

    pub fn has_image(&self) -> bool {
        !self.image_url.is_empty()
    }

    /// Whether the export pipeline should turn this entry into a card.
    pub fn is_export_ready(&self, policy: ExportPolicy) -> bool {
        match (policy, self.status) {
            (_, WordState::Approved) => true,
            (ExportPolicy::Generated, WordState::Generated) => {
                !self.definition.is_empty() && !self.example.is_empty()
            }
            _ => false,
        }
    }
}

/// Newtype for word entry IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryId(pub Uuid);

impl EntryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short display: first 8 chars of UUID
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::str::FromStr for EntryId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| Error::NotFound(s.to_string()))
    }
}

/// Split submitted text into words: one per non-blank line, trimmed.
pub fn parse_words(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Lifecycle state of a word entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WordState {
    /// Submitted or re-requested, waiting for generation.
    Pending,
    /// Content generated successfully.
    Generated,
    /// Generation ran and failed. Terminal until regenerated.
    GenerationFailed,
    /// Reviewed and accepted for export.
    Approved,
    /// Reviewed and excluded from export.
    Rejected,
}

impl WordState {
    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: WordState) -> bool {
        use WordState::*;
        matches!(
            (self, to),
            (Pending, Generated)
                | (Pending, GenerationFailed)
                | (Generated, Pending)          // regeneration
                | (GenerationFailed, Pending)
                | (Approved, Pending)
                | (Rejected, Pending)
                | (Generated, Approved)
                | (Generated, Rejected)
                | (Approved, Rejected)
                | (Rejected, Approved)
        )
    }

    /// Has the generation stage finished with this entry?
    pub fn is_processed(self) -> bool {
        !matches!(self, WordState::Pending)
    }
}

impl std::fmt::Display for WordState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WordState::Pending => "pending",
            WordState::Generated => "generated",
            WordState::GenerationFailed => "generation_failed",
            WordState::Approved => "approved",
            WordState::Rejected => "rejected",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for WordState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(WordState::Pending),
            "generated" => Ok(WordState::Generated),
            "generation_failed" | "failed" => Ok(WordState::GenerationFailed),
            "approved" => Ok(WordState::Approved),
            "rejected" => Ok(WordState::Rejected),
            other => Err(Error::Other(format!("unknown word state: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Export policy
// ---------------------------------------------------------------------------

/// Which entries the export pipeline picks up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportPolicy {
    /// Generated entries with content, plus approved ones.
    #[default]
    Generated,
    /// Only entries a reviewer approved.
    ApprovedOnly,
}

// ---------------------------------------------------------------------------
// Queue Job
// ---------------------------------------------------------------------------

/// Admission record for one in-flight generation request. Never persisted.
#[derive(Debug, Clone, Copy)]
pub struct QueueJob {
    pub word_id: EntryId,
    pub enqueued_at: DateTime<Utc>,
}

impl QueueJob {
    pub fn new(word_id: EntryId) -> Self {
        Self {
            word_id,
            enqueued_at: Utc::now(),
        }
    }
}
