//! Streaming transcript accumulation and turn commit.
//!
//! The remote session interleaves partial transcript fragments for both
//! speakers within a turn. Fragments accumulate per speaker and are only
//! committed as durable [`Message`]s on the turn-complete signal — at most
//! one message per speaker per turn, user before tutor, never a partial.

use crate::correction::Correction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who produced a piece of transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Tutor,
}

impl std::fmt::Display for Speaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Tutor => write!(f, "tutor"),
        }
    }
}

/// One finalized utterance within a live session, in commit order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnEntry {
    pub speaker: Speaker,
    pub text: String,
}

/// The durable unit of conversation history.
///
/// Created exactly once per finalized utterance (live turn commit) or per
/// text-mode exchange; never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correction: Option<Correction>,
}

impl Message {
    /// Create a message with a fresh id and the current timestamp.
    pub fn new(speaker: Speaker, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            speaker,
            text: text.into(),
            timestamp: Utc::now(),
            correction: None,
        }
    }

    /// Attach a correction (text-mode tutor replies only).
    #[must_use]
    pub fn with_correction(mut self, correction: Option<Correction>) -> Self {
        self.correction = correction;
        self
    }
}

/// Append-only text buffer for one speaker's in-progress utterance.
///
/// Reset to empty at turn commit and (tutor side only) at barge-in.
#[derive(Debug, Default)]
pub struct TranscriptAccumulator {
    text: String,
}

impl TranscriptAccumulator {
    /// Append a streaming fragment.
    pub fn push_fragment(&mut self, fragment: &str) {
        self.text.push_str(fragment);
    }

    /// The running text, for live display.
    pub fn running_text(&self) -> &str {
        &self.text
    }

    /// Whether nothing has accumulated yet.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Take the trimmed accumulated text, resetting the buffer.
    ///
    /// Returns `None` if the buffer held only whitespace.
    pub fn take_trimmed(&mut self) -> Option<String> {
        let text = std::mem::take(&mut self.text);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_owned())
        }
    }

    /// Discard accumulated text without committing it.
    pub fn discard(&mut self) {
        self.text.clear();
    }
}

/// Finalize a turn: drain both accumulators into ordered entries.
///
/// The user entry (if any) precedes the tutor entry (if any). Both
/// accumulators are reset regardless of whether anything is committed, so a
/// repeated turn-complete signal can never re-commit the same turn.
pub fn commit_turn(
    user: &mut TranscriptAccumulator,
    tutor: &mut TranscriptAccumulator,
) -> Vec<TurnEntry> {
    let mut entries = Vec::with_capacity(2);
    if let Some(text) = user.take_trimmed() {
        entries.push(TurnEntry {
            speaker: Speaker::User,
            text,
        });
    }
    if let Some(text) = tutor.take_trimmed() {
        entries.push(TurnEntry {
            speaker: Speaker::Tutor,
            text,
        });
    }
    entries
}
