//! Configuration types for the conversation engine.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration for the tutoring engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Audio capture/playback settings.
    pub audio: AudioConfig,
    /// Live voice session settings.
    pub session: SessionConfig,
    /// Text-mode chat settings.
    pub chat: ChatConfig,
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| EngineError::Config(format!("invalid config: {e}")))
    }

    /// Save configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: &Path) -> Result<()> {
        let raw = toml::to_string_pretty(self)
            .map_err(|e| EngineError::Config(format!("cannot serialize config: {e}")))?;
        std::fs::write(path, raw)?;
        Ok(())
    }
}

/// Audio I/O configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Capture sample rate in Hz. The remote service expects 16kHz mono.
    pub input_sample_rate: u32,
    /// Playback sample rate in Hz. Response audio arrives at 24kHz mono.
    pub output_sample_rate: u32,
    /// Capture frame size in samples (256ms at 16kHz).
    pub frame_size: usize,
    /// Input device name (None = system default).
    pub input_device: Option<String>,
    /// Output device name (None = system default).
    pub output_device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: 16_000,
            output_sample_rate: 24_000,
            frame_size: 4096,
            input_device: None,
            output_device: None,
        }
    }
}

/// Live session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Capacity of the capture frame channel.
    ///
    /// The audio callback never blocks; frames beyond this backlog are
    /// dropped (frame loss is tolerable, stalls are not).
    pub frame_channel_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            frame_channel_size: 64,
        }
    }
}

/// Text-mode chat configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Maximum number of characters sent to speech synthesis per reply.
    pub max_tts_chars: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self { max_tts_chars: 500 }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.audio.input_sample_rate, 16_000);
        assert_eq!(config.audio.output_sample_rate, 24_000);
        assert_eq!(config.audio.frame_size, 4096);
        assert_eq!(config.session.frame_channel_size, 64);
        assert_eq!(config.chat.max_tts_chars, 500);
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let config: EngineConfig = toml::from_str("[audio]\nframe_size = 2048\n").unwrap();
        assert_eq!(config.audio.frame_size, 2048);
        assert_eq!(config.audio.input_sample_rate, 16_000);
        assert_eq!(config.chat.max_tts_chars, 500);
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parlare.toml");

        let mut config = EngineConfig::default();
        config.audio.input_device = Some("USB Mic".into());
        config.chat.max_tts_chars = 300;
        config.save(&path).unwrap();

        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded.audio.input_device.as_deref(), Some("USB Mic"));
        assert_eq!(loaded.chat.max_tts_chars, 300);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = EngineConfig::load(Path::new("/nonexistent/parlare.toml")).unwrap_err();
        assert!(matches!(err, EngineError::Io(_)));
    }
}
