//! Extraction of the structured correction block from a tutor reply.
//!
//! In text mode the tutor may embed one fenced ```json block describing a
//! grammar correction. The block is detached from the surrounding prose and
//! parsed permissively; a malformed block falls back to the untouched reply
//! with no correction.

use serde::{Deserialize, Serialize};
use tracing::warn;

const FENCE_OPEN: &str = "```json";
const FENCE_CLOSE: &str = "```";

/// A grammar correction attached to a tutor message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correction {
    /// What the learner wrote.
    pub original: String,
    /// The corrected form.
    pub corrected: String,
    /// Why the correction applies.
    pub explanation: String,
    /// An alternative phrasing, when the tutor offers one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternative: Option<String>,
}

/// Split a reply into prose and an optional embedded [`Correction`].
///
/// On success the fenced block is removed and the remaining prose is
/// trimmed. If the block is absent, unterminated, or fails to parse, the
/// original text is returned unchanged with no correction; the parse
/// failure is logged, never surfaced.
pub fn split_correction(text: &str) -> (String, Option<Correction>) {
    let Some(open) = text.find(FENCE_OPEN) else {
        return (text.to_owned(), None);
    };

    let body_start = open + FENCE_OPEN.len();
    let Some(close_rel) = text[body_start..].find(FENCE_CLOSE) else {
        warn!("unterminated correction block, keeping reply as-is");
        return (text.to_owned(), None);
    };
    let body_end = body_start + close_rel;

    let inner = text[body_start..body_end].trim();
    match serde_json::from_str::<Correction>(inner) {
        Ok(correction) => {
            let mut clean = String::with_capacity(text.len());
            clean.push_str(&text[..open]);
            clean.push_str(&text[body_end + FENCE_CLOSE.len()..]);
            (clean.trim().to_owned(), Some(correction))
        }
        Err(e) => {
            warn!("failed to parse correction block: {e}");
            (text.to_owned(), None)
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn test_extracts_correction_and_cleans_prose() {
        let reply = "Great job!\n```json\n{\"original\":\"I go yesterday\",\"corrected\":\"I went yesterday\",\"explanation\":\"past tense\"}\n```";
        let (clean, correction) = split_correction(reply);
        assert_eq!(clean, "Great job!");
        let correction = correction.unwrap();
        assert_eq!(correction.original, "I go yesterday");
        assert_eq!(correction.corrected, "I went yesterday");
        assert_eq!(correction.explanation, "past tense");
        assert!(correction.alternative.is_none());
    }

    #[test]
    fn test_alternative_field_is_preserved() {
        let reply = "Nice.\n```json\n{\"original\":\"a\",\"corrected\":\"b\",\"explanation\":\"c\",\"alternative\":\"d\"}\n```\nKeep going!";
        let (clean, correction) = split_correction(reply);
        assert_eq!(clean, "Nice.\n\nKeep going!");
        assert_eq!(correction.unwrap().alternative.as_deref(), Some("d"));
    }

    #[test]
    fn test_malformed_block_falls_back_to_full_text() {
        let reply = "Well done!\n```json\n{not valid json}\n```";
        let (clean, correction) = split_correction(reply);
        assert_eq!(clean, reply);
        assert!(correction.is_none());
    }

    #[test]
    fn test_unterminated_block_falls_back() {
        let reply = "Hmm.\n```json\n{\"original\":\"x\"";
        let (clean, correction) = split_correction(reply);
        assert_eq!(clean, reply);
        assert!(correction.is_none());
    }

    #[test]
    fn test_plain_reply_passes_through() {
        let (clean, correction) = split_correction("Just a normal reply.");
        assert_eq!(clean, "Just a normal reply.");
        assert!(correction.is_none());
    }

    #[test]
    fn test_unknown_fields_are_tolerated() {
        let reply = "Ok\n```json\n{\"original\":\"a\",\"corrected\":\"b\",\"explanation\":\"c\",\"severity\":3}\n```";
        let (clean, correction) = split_correction(reply);
        assert_eq!(clean, "Ok");
        assert!(correction.is_some());
    }
}
