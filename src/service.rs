//! Abstract interfaces to the remote conversational service.
//!
//! The engine never talks to a concrete backend; it consumes these
//! capabilities. Production implementations (network transport, service
//! protocol) live outside this crate, and tests substitute mocks.

use crate::audio::pcm::PcmPacket;
use crate::error::Result;
use crate::profile::UserProfile;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Inbound events from an open live session.
///
/// Delivered in arrival order; transcript fragments, audio chunks, and
/// control signals interleave freely within one turn.
#[derive(Debug, Clone)]
pub enum LiveEvent {
    /// Remote acknowledged the session; the duplex stream is open.
    Opened,
    /// Partial transcript fragment of the learner's speech.
    InputTranscript(String),
    /// Partial transcript fragment of the tutor's speech.
    OutputTranscript(String),
    /// Base64-encoded response audio (16-bit LE PCM, 24kHz mono).
    Audio(String),
    /// The tutor's speech was cut off by the learner speaking.
    Interrupted,
    /// Both sides of the current turn are final.
    TurnComplete,
    /// Remote closed the session.
    Closed,
    /// Transport failure; the session is unusable.
    Error(String),
}

/// One-shot text conversation plus speech synthesis.
#[async_trait]
pub trait TutorChat: Send + Sync {
    /// Establish a conversational context for this learner.
    ///
    /// # Errors
    ///
    /// Returns an error if the context cannot be created.
    async fn init_conversation(&self, profile: &UserProfile) -> Result<()>;

    /// Send one message, receive one reply.
    ///
    /// # Errors
    ///
    /// Fails with [`crate::EngineError::Chat`] if called before
    /// [`TutorChat::init_conversation`].
    async fn send_text(&self, text: &str) -> Result<String>;

    /// Synthesize speech for a reply.
    ///
    /// Returns 16-bit LE PCM at 24kHz mono.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EngineError::Synthesis`] when unavailable; callers
    /// fall back to visual-only output.
    async fn synthesize_speech(&self, text: &str) -> Result<Vec<u8>>;
}

/// Factory for duplex streaming sessions.
#[async_trait]
pub trait LiveConversation: Send + Sync {
    /// Open a live session; inbound events flow into `events`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EngineError::Transport`] if the session cannot be
    /// established.
    async fn open(
        &self,
        profile: &UserProfile,
        events: mpsc::UnboundedSender<LiveEvent>,
    ) -> Result<Box<dyn LiveSessionHandle>>;
}

/// An open duplex session.
#[async_trait]
pub trait LiveSessionHandle: Send + Sync {
    /// Send one PCM packet of captured audio. Best-effort: callers log
    /// failures and move on, since frame loss is tolerable.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport rejects the packet.
    async fn send_audio(&self, packet: PcmPacket) -> Result<()>;

    /// Close the session. Idempotent; closing a closed session is a no-op.
    async fn close(&self);
}
