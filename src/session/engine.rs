//! The session engine: one owned context per live session, driven by a
//! single serialized event queue.
//!
//! All shared mutable state — the transcript accumulators, the playback
//! cursor and active set, the capture guard — is owned exclusively by the
//! session task. Capture frames and remote events are messages into that
//! task, so handlers never interleave. Every exit path (explicit stop,
//! remote close, transport error, queue teardown) funnels through the same
//! teardown, which releases the microphone and quiesces playback exactly
//! once.

use crate::audio::capture::{AudioCapture, CaptureGuard};
use crate::audio::output::AudioOut;
use crate::audio::pcm::{self, PcmPacket};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::playback::PlaybackScheduler;
use crate::profile::UserProfile;
use crate::service::{LiveConversation, LiveEvent, LiveSessionHandle};
use crate::session::events::{EngineEvent, EngineInput, SessionState};
use crate::transcript::{Message, TranscriptAccumulator, commit_turn};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Owns at most one live voice session at a time.
pub struct SessionEngine {
    config: EngineConfig,
    live: Arc<dyn LiveConversation>,
    capture: Arc<dyn AudioCapture>,
    out: Arc<dyn AudioOut>,
    current: Option<ActiveSession>,
}

struct ActiveSession {
    input_tx: mpsc::UnboundedSender<EngineInput>,
    join: JoinHandle<()>,
    state: Arc<Mutex<SessionState>>,
}

impl SessionEngine {
    pub fn new(
        config: EngineConfig,
        live: Arc<dyn LiveConversation>,
        capture: Arc<dyn AudioCapture>,
        out: Arc<dyn AudioOut>,
    ) -> Self {
        Self {
            config,
            live,
            capture,
            out,
            current: None,
        }
    }

    /// Current session state; `Idle` when no session was ever started.
    pub fn state(&self) -> SessionState {
        match &self.current {
            Some(session) => *lock_state(&session.state),
            None => SessionState::Idle,
        }
    }

    /// Whether a session is connecting or open.
    pub fn is_active(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|s| !s.join.is_finished())
    }

    /// Start a live voice session.
    ///
    /// UI-facing events flow into `ui` for the lifetime of the session.
    ///
    /// # Errors
    ///
    /// Rejects with [`EngineError::Session`] if a session is already
    /// connecting or open, and propagates transport failures from opening
    /// the remote session.
    pub async fn start(
        &mut self,
        profile: &UserProfile,
        ui: mpsc::UnboundedSender<EngineEvent>,
    ) -> Result<()> {
        if self.is_active() {
            return Err(EngineError::Session(
                "a live session is already active".into(),
            ));
        }
        self.current = None;

        let state = Arc::new(Mutex::new(SessionState::Connecting));
        let _ = ui.send(EngineEvent::StateChanged(SessionState::Connecting));

        let (input_tx, input_rx) = mpsc::unbounded_channel::<EngineInput>();

        // Remote events are forwarded into the single serialized queue.
        let (remote_tx, mut remote_rx) = mpsc::unbounded_channel::<LiveEvent>();
        let forward_tx = input_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = remote_rx.recv().await {
                if forward_tx.send(EngineInput::Remote(event)).is_err() {
                    break;
                }
            }
        });

        let live = match self.live.open(profile, remote_tx).await {
            Ok(live) => live,
            Err(e) => {
                *lock_state(&state) = SessionState::Errored;
                let _ = ui.send(EngineEvent::ConnectionError(e.to_string()));
                let _ = ui.send(EngineEvent::StateChanged(SessionState::Errored));
                return Err(e);
            }
        };
        info!("live session connecting for learner '{}'", profile.name);

        let ctx = SessionContext {
            config: self.config.clone(),
            capture_source: Arc::clone(&self.capture),
            live,
            scheduler: PlaybackScheduler::new(
                Arc::clone(&self.out),
                self.config.audio.output_sample_rate,
            ),
            user_acc: TranscriptAccumulator::default(),
            tutor_acc: TranscriptAccumulator::default(),
            capture: None,
            ui,
            state: Arc::clone(&state),
            input_tx: input_tx.clone(),
        };

        let join = tokio::spawn(run_session(ctx, input_rx));
        self.current = Some(ActiveSession {
            input_tx,
            join,
            state,
        });
        Ok(())
    }

    /// Stop the current session, releasing the microphone and playback.
    ///
    /// Idempotent: stopping a never-started or already-stopped session is
    /// a no-op.
    pub async fn stop(&mut self) {
        let Some(session) = self.current.take() else {
            return;
        };
        // Fails only when the loop already exited; either way the join
        // below observes completed teardown.
        let _ = session.input_tx.send(EngineInput::Stop);
        if session.join.await.is_err() {
            warn!("session task panicked during stop");
        }
    }
}

/// Exclusive owner of all per-session resources.
struct SessionContext {
    config: EngineConfig,
    capture_source: Arc<dyn AudioCapture>,
    live: Box<dyn LiveSessionHandle>,
    scheduler: PlaybackScheduler,
    user_acc: TranscriptAccumulator,
    tutor_acc: TranscriptAccumulator,
    capture: Option<CaptureGuard>,
    ui: mpsc::UnboundedSender<EngineEvent>,
    state: Arc<Mutex<SessionState>>,
    input_tx: mpsc::UnboundedSender<EngineInput>,
}

impl SessionContext {
    fn state(&self) -> SessionState {
        *lock_state(&self.state)
    }

    fn set_state(&self, next: SessionState) {
        *lock_state(&self.state) = next;
        let _ = self.ui.send(EngineEvent::StateChanged(next));
    }

    fn emit(&self, event: EngineEvent) {
        let _ = self.ui.send(event);
    }

    /// Attach the capture pipeline to the outbound path (entering `Open`).
    fn attach_capture(&mut self) -> Result<()> {
        let (frame_tx, mut frame_rx) =
            mpsc::channel::<pcm::AudioFrame>(self.config.session.frame_channel_size);
        let guard = self.capture_source.open(frame_tx)?;
        self.capture = Some(guard);

        let forward_tx = self.input_tx.clone();
        tokio::spawn(async move {
            while let Some(frame) = frame_rx.recv().await {
                if forward_tx.send(EngineInput::Frame(frame)).is_err() {
                    break;
                }
            }
        });
        Ok(())
    }

    /// Release everything this session owns, exactly once.
    async fn teardown(&mut self, final_state: SessionState) {
        if let Some(mut guard) = self.capture.take() {
            guard.release();
        }
        self.live.close().await;
        self.scheduler.interrupt();
        self.user_acc.discard();
        self.tutor_acc.discard();
        self.set_state(final_state);
        info!("live session ended: {final_state}");
    }
}

/// The serialized event loop: one consumer for frames, remote events, and
/// commands.
async fn run_session(mut ctx: SessionContext, mut input: mpsc::UnboundedReceiver<EngineInput>) {
    let final_state = loop {
        let Some(event) = input.recv().await else {
            // Every sender dropped; treat as a stop.
            break SessionState::Closed;
        };

        match event {
            EngineInput::Remote(remote) => {
                if let Some(terminal) = handle_remote(&mut ctx, remote).await {
                    break terminal;
                }
            }
            EngineInput::Frame(frame) => handle_frame(&mut ctx, frame).await,
            EngineInput::Stop => {
                ctx.set_state(SessionState::Closing);
                break SessionState::Closed;
            }
        }
    };

    ctx.teardown(final_state).await;
}

/// Handle one inbound remote event; returns the terminal state when the
/// session must end.
async fn handle_remote(ctx: &mut SessionContext, event: LiveEvent) -> Option<SessionState> {
    match event {
        LiveEvent::Opened => {
            if ctx.state() != SessionState::Connecting {
                debug!("ignoring duplicate open acknowledgment");
                return None;
            }
            match ctx.attach_capture() {
                Ok(()) => ctx.set_state(SessionState::Open),
                Err(e) => {
                    // Mic denial is fatal to session start; no retry.
                    ctx.emit(EngineEvent::ConnectionError(e.to_string()));
                    return Some(SessionState::Errored);
                }
            }
        }
        LiveEvent::InputTranscript(fragment) => {
            ctx.user_acc.push_fragment(&fragment);
            ctx.emit(EngineEvent::PartialUser(ctx.user_acc.running_text().to_owned()));
        }
        LiveEvent::OutputTranscript(fragment) => {
            ctx.tutor_acc.push_fragment(&fragment);
            ctx.emit(EngineEvent::PartialTutor(
                ctx.tutor_acc.running_text().to_owned(),
            ));
        }
        LiveEvent::Audio(encoded) => match BASE64.decode(encoded.as_bytes()) {
            Ok(bytes) => ctx.scheduler.enqueue_pcm(&bytes),
            Err(e) => warn!("undecodable audio chunk, skipping: {e}"),
        },
        LiveEvent::Interrupted => {
            // The learner barged in: stop all scheduled output and drop the
            // tutor's unheard text. The learner is still mid-utterance, so
            // their accumulator stays.
            ctx.scheduler.interrupt();
            ctx.tutor_acc.discard();
            ctx.emit(EngineEvent::PartialTutor(String::new()));
        }
        LiveEvent::TurnComplete => {
            let entries = commit_turn(&mut ctx.user_acc, &mut ctx.tutor_acc);
            ctx.emit(EngineEvent::PartialUser(String::new()));
            ctx.emit(EngineEvent::PartialTutor(String::new()));
            if !entries.is_empty() {
                let messages: Vec<Message> = entries
                    .iter()
                    .map(|e| Message::new(e.speaker, e.text.clone()))
                    .collect();
                ctx.emit(EngineEvent::TurnCommitted { entries, messages });
            }
        }
        LiveEvent::Closed => {
            // Remote-initiated close runs the same cleanup as a stop.
            return Some(SessionState::Closed);
        }
        LiveEvent::Error(message) => {
            ctx.emit(EngineEvent::ConnectionError(message));
            return Some(SessionState::Errored);
        }
    }
    None
}

/// Encode and forward one captured frame; publish its loudness.
async fn handle_frame(ctx: &mut SessionContext, frame: pcm::AudioFrame) {
    if ctx.state() != SessionState::Open {
        return;
    }

    ctx.emit(EngineEvent::Loudness(pcm::rms(&frame.samples)));

    let packet = PcmPacket::from(&frame);
    if let Err(e) = ctx.live.send_audio(packet).await {
        // Frame loss is tolerable; a stalled transport will surface its
        // own error event.
        debug!("audio packet dropped: {e}");
    }
}

fn lock_state(state: &Arc<Mutex<SessionState>>) -> std::sync::MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
