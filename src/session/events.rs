//! Event types flowing into and out of the session engine.

use crate::audio::pcm::AudioFrame;
use crate::service::LiveEvent;
use crate::transcript::{Message, TurnEntry};

/// Lifecycle of one live voice session attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
    Errored,
}

impl SessionState {
    /// Whether the session has reached a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Errored)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
            Self::Errored => "errored",
        };
        write!(f, "{name}")
    }
}

/// Everything the engine publishes to the surrounding UI.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Session state transition, for UI gating.
    StateChanged(SessionState),
    /// Running partial transcript of the learner's current utterance.
    PartialUser(String),
    /// Running partial transcript of the tutor's current utterance.
    PartialTutor(String),
    /// Per-frame RMS loudness in [0, 1], for the input gauge.
    Loudness(f32),
    /// A finalized turn: ordered entries for the live view and the
    /// corresponding durable messages, user before tutor.
    TurnCommitted {
        entries: Vec<TurnEntry>,
        messages: Vec<Message>,
    },
    /// User-visible connection failure; restart is user-initiated.
    ConnectionError(String),
}

/// Inputs serialized through the engine's single event queue.
///
/// Capture frames, remote events, and control commands all funnel through
/// one consumer, which is what makes shared-state handling interleaving-free.
#[derive(Debug)]
pub(crate) enum EngineInput {
    /// A captured microphone frame.
    Frame(AudioFrame),
    /// An inbound event from the remote session.
    Remote(LiveEvent),
    /// Explicit user-initiated stop.
    Stop,
}
