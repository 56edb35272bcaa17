//! Parlare: real-time duplex voice conversation engine for language
//! tutoring.
//!
//! The engine captures microphone audio, streams it to a remote
//! conversational speech service, and turns the interleaved reply stream
//! (partial transcripts, response audio, turn and interruption signals)
//! into gapless playback and a durable turn-by-turn transcript.
//!
//! # Architecture
//!
//! One session, one owner: a live session is a single task that
//! exclusively holds the capture guard, the playback scheduler, and both
//! transcript accumulators. Capture frames and remote events are messages
//! into that task's queue, so event handling never interleaves:
//!
//! - **Audio capture**: microphone frames via `cpal`, downsampled to 16kHz
//! - **Live session**: state machine over the remote duplex stream
//! - **Playback**: cursor-scheduled, interruptible 24kHz output via `cpal`
//! - **Transcript**: per-speaker accumulation, exactly-once turn commit
//! - **Chat**: one-shot text exchanges sharing the playback path

pub mod audio;
pub mod chat;
pub mod config;
pub mod correction;
pub mod error;
pub mod playback;
pub mod profile;
pub mod service;
pub mod session;
pub mod transcript;

pub use chat::{ChatExchange, ChatSession};
pub use config::EngineConfig;
pub use correction::{Correction, split_correction};
pub use error::{EngineError, Result};
pub use playback::PlaybackScheduler;
pub use profile::{LearningGoal, ProficiencyLevel, UserProfile};
pub use service::{LiveConversation, LiveEvent, LiveSessionHandle, TutorChat};
pub use session::{EngineEvent, SessionEngine, SessionState};
pub use transcript::{Message, Speaker, TurnEntry};
