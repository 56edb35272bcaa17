//! Text-mode conversation path.
//!
//! One-shot request/response: send a message, receive a reply, detach the
//! embedded correction block, and speak the cleaned reply through the
//! shared playback scheduler. Voice is a convenience here, so synthesis
//! failures fall back to visual-only output without surfacing an error.

use crate::config::ChatConfig;
use crate::correction::split_correction;
use crate::error::{EngineError, Result};
use crate::playback::PlaybackScheduler;
use crate::profile::UserProfile;
use crate::service::TutorChat;
use crate::transcript::{Message, Speaker};
use std::sync::Arc;
use tracing::{debug, warn};

/// One committed text exchange: the learner's message and the tutor's
/// reply (with any extracted correction attached).
#[derive(Debug, Clone)]
pub struct ChatExchange {
    pub user: Message,
    pub tutor: Message,
}

/// Text-mode conversation with the tutor.
pub struct ChatSession {
    service: Arc<dyn TutorChat>,
    config: ChatConfig,
    initialized: bool,
}

impl ChatSession {
    pub fn new(service: Arc<dyn TutorChat>, config: ChatConfig) -> Self {
        Self {
            service,
            config,
            initialized: false,
        }
    }

    /// Establish the conversational context for this learner.
    ///
    /// # Errors
    ///
    /// Propagates service failures; the session stays uninitialized.
    pub async fn init(&mut self, profile: &UserProfile) -> Result<()> {
        self.service.init_conversation(profile).await?;
        self.initialized = true;
        Ok(())
    }

    /// Send one message and commit the exchange.
    ///
    /// The reply's correction block (if any) is detached and attached to
    /// the tutor message; a malformed block degrades to the untouched
    /// reply text. The cleaned reply is handed to speech synthesis, whose
    /// failure is swallowed.
    ///
    /// # Errors
    ///
    /// Fails if the session is uninitialized, the input is empty after
    /// trimming, or the exchange itself fails.
    pub async fn send(
        &mut self,
        text: &str,
        scheduler: &mut PlaybackScheduler,
    ) -> Result<ChatExchange> {
        if !self.initialized {
            return Err(EngineError::Chat("conversation not initialized".into()));
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(EngineError::Chat("empty message".into()));
        }

        let user = Message::new(Speaker::User, text);
        let reply = self.service.send_text(text).await?;

        let (clean, correction) = split_correction(&reply);
        let tutor = Message::new(Speaker::Tutor, clean).with_correction(correction);

        self.speak(&tutor.text, scheduler).await;

        Ok(ChatExchange { user, tutor })
    }

    /// Synthesize and schedule speech for a reply; failures are logged,
    /// never propagated.
    pub async fn speak(&self, text: &str, scheduler: &mut PlaybackScheduler) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let clipped: String = text.chars().take(self.config.max_tts_chars).collect();

        match self.service.synthesize_speech(&clipped).await {
            Ok(audio) => {
                debug!("spoke {} chars", clipped.chars().count());
                scheduler.enqueue_pcm(&audio);
            }
            Err(e) => {
                // Visual-only fallback; no retry, no user-facing error.
                warn!("speech synthesis unavailable, showing text only: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::audio::output::{AudioOut, SourceId};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct NullOut {
        scheduled: AtomicUsize,
    }

    impl AudioOut for NullOut {
        fn now(&self) -> f64 {
            0.0
        }
        fn schedule(&self, _samples: Vec<f32>, _start: f64) -> SourceId {
            self.scheduled.fetch_add(1, Ordering::SeqCst) as SourceId
        }
        fn stop(&self, _id: SourceId) {}
        fn take_finished(&self) -> Vec<SourceId> {
            Vec::new()
        }
    }

    struct MockChat {
        reply: String,
        synth_fails: bool,
        initialized: AtomicBool,
        spoken: Mutex<Vec<String>>,
    }

    impl MockChat {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_owned(),
                synth_fails: false,
                initialized: AtomicBool::new(false),
                spoken: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TutorChat for MockChat {
        async fn init_conversation(&self, _profile: &UserProfile) -> Result<()> {
            self.initialized.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn send_text(&self, _text: &str) -> Result<String> {
            if !self.initialized.load(Ordering::SeqCst) {
                return Err(EngineError::Chat("not initialized".into()));
            }
            Ok(self.reply.clone())
        }

        async fn synthesize_speech(&self, text: &str) -> Result<Vec<u8>> {
            if self.synth_fails {
                return Err(EngineError::Synthesis("service unavailable".into()));
            }
            self.spoken.lock().unwrap().push(text.to_owned());
            Ok(vec![0u8; 480])
        }
    }

    fn scheduler(out: &Arc<NullOut>) -> PlaybackScheduler {
        PlaybackScheduler::new(Arc::clone(out) as Arc<dyn AudioOut>, 24_000)
    }

    #[tokio::test]
    async fn test_send_before_init_fails() {
        let service = Arc::new(MockChat::new("hi"));
        let mut chat = ChatSession::new(service, ChatConfig::default());
        let out = Arc::new(NullOut::default());
        let err = chat.send("hello", &mut scheduler(&out)).await.unwrap_err();
        assert!(matches!(err, EngineError::Chat(_)));
    }

    #[tokio::test]
    async fn test_exchange_extracts_correction_and_speaks() {
        let reply = "Great job!\n```json\n{\"original\":\"I go yesterday\",\"corrected\":\"I went yesterday\",\"explanation\":\"past tense\"}\n```";
        let service = Arc::new(MockChat::new(reply));
        let mut chat = ChatSession::new(Arc::clone(&service) as Arc<dyn TutorChat>, ChatConfig::default());
        chat.init(&UserProfile::default()).await.unwrap();

        let out = Arc::new(NullOut::default());
        let mut sched = scheduler(&out);
        let exchange = chat.send("  I go yesterday  ", &mut sched).await.unwrap();

        assert_eq!(exchange.user.text, "I go yesterday");
        assert_eq!(exchange.user.speaker, Speaker::User);
        assert_eq!(exchange.tutor.text, "Great job!");
        let correction = exchange.tutor.correction.unwrap();
        assert_eq!(correction.corrected, "I went yesterday");

        // The cleaned text, not the raw reply, was synthesized and queued.
        assert_eq!(service.spoken.lock().unwrap().as_slice(), &["Great job!"]);
        assert_eq!(out.scheduled.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_malformed_correction_degrades_to_full_text() {
        let reply = "Sure!\n```json\n{broken\n```";
        let service = Arc::new(MockChat::new(reply));
        let mut chat = ChatSession::new(service, ChatConfig::default());
        chat.init(&UserProfile::default()).await.unwrap();

        let out = Arc::new(NullOut::default());
        let exchange = chat.send("hi", &mut scheduler(&out)).await.unwrap();
        assert_eq!(exchange.tutor.text, reply);
        assert!(exchange.tutor.correction.is_none());
    }

    #[tokio::test]
    async fn test_synthesis_failure_is_swallowed() {
        let mut service = MockChat::new("Spoken reply.");
        service.synth_fails = true;
        let service = Arc::new(service);
        let mut chat = ChatSession::new(service, ChatConfig::default());
        chat.init(&UserProfile::default()).await.unwrap();

        let out = Arc::new(NullOut::default());
        let exchange = chat.send("hi", &mut scheduler(&out)).await.unwrap();
        assert_eq!(exchange.tutor.text, "Spoken reply.");
        assert_eq!(out.scheduled.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_tts_input_is_clipped() {
        let long_reply = "x".repeat(900);
        let service = Arc::new(MockChat::new(&long_reply));
        let mut chat = ChatSession::new(Arc::clone(&service) as Arc<dyn TutorChat>, ChatConfig::default());
        chat.init(&UserProfile::default()).await.unwrap();

        let out = Arc::new(NullOut::default());
        chat.send("hi", &mut scheduler(&out)).await.unwrap();
        assert_eq!(service.spoken.lock().unwrap()[0].chars().count(), 500);
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let service = Arc::new(MockChat::new("hi"));
        let mut chat = ChatSession::new(service, ChatConfig::default());
        chat.init(&UserProfile::default()).await.unwrap();
        let out = Arc::new(NullOut::default());
        let err = chat.send("   ", &mut scheduler(&out)).await.unwrap_err();
        assert!(matches!(err, EngineError::Chat(_)));
    }
}
