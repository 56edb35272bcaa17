//! Error types for the conversation engine.

/// Top-level error type for the voice tutoring engine.
///
/// Only microphone-permission and transport failures are meant to reach the
/// user; everything else is recovered locally or at most logged.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Microphone permission denied or no usable input device.
    ///
    /// Fatal to session start. Never retried automatically.
    #[error("Mic access denied: {0}")]
    MicAccess(String),

    /// Audio device or stream error.
    #[error("audio error: {0}")]
    Audio(String),

    /// Streaming transport failure (connection lost mid-session).
    ///
    /// Fatal to the current session; restart is user-initiated.
    #[error("transport error: {0}")]
    Transport(String),

    /// Session lifecycle violation (e.g. starting while already active).
    #[error("session error: {0}")]
    Session(String),

    /// Text-mode conversation error.
    #[error("chat error: {0}")]
    Chat(String),

    /// Text-to-speech synthesis unavailable.
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, EngineError>;
