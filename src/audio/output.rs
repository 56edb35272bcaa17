//! Mixed audio output via cpal.
//!
//! A single output stream at the playback rate drives a sample-accurate
//! clock; scheduled sources are mixed additively at their start offsets.
//! The [`AudioOut`] trait is the seam the playback scheduler talks to, so
//! scheduling logic can be tested against a manual clock.

use crate::config::AudioConfig;
use crate::error::{EngineError, Result};
use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Identifier of a scheduled playback source.
pub type SourceId = u64;

/// Output device abstraction used by the playback scheduler.
///
/// Times are in seconds on the device's own audio clock, which starts at
/// zero when the output opens and only ever moves forward.
pub trait AudioOut: Send + Sync {
    /// Current position of the audio clock, in seconds.
    fn now(&self) -> f64;

    /// Schedule a mono buffer to start playing at `start` seconds.
    ///
    /// A start time already in the past plays immediately.
    fn schedule(&self, samples: Vec<f32>, start: f64) -> SourceId;

    /// Stop a source immediately. Best-effort: stopping an unknown or
    /// already-finished source is a no-op.
    fn stop(&self, id: SourceId);

    /// Drain the ids of sources that reached their natural end since the
    /// last call.
    fn take_finished(&self) -> Vec<SourceId>;
}

struct ScheduledSource {
    id: SourceId,
    samples: Vec<f32>,
    start_frame: u64,
    pos: usize,
}

#[derive(Default)]
struct MixerState {
    clock_frames: u64,
    next_id: SourceId,
    sources: Vec<ScheduledSource>,
    finished: Vec<SourceId>,
}

/// Speaker output via cpal: one stream, additive mixing of scheduled
/// sources, frame-counter clock.
pub struct CpalOutput {
    state: Arc<Mutex<MixerState>>,
    sample_rate: u32,
    cancel: CancellationToken,
    join: Option<std::thread::JoinHandle<()>>,
}

impl CpalOutput {
    /// Open the output device and start the mixer stream.
    ///
    /// # Errors
    ///
    /// Returns an error if no output device is available or the stream
    /// cannot be built.
    pub fn new(config: &AudioConfig) -> Result<Self> {
        let state = Arc::new(Mutex::new(MixerState::default()));
        let cancel = CancellationToken::new();
        let thread_cancel = cancel.clone();
        let thread_state = Arc::clone(&state);
        let config = config.clone();
        let sample_rate = config.output_sample_rate;
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<()>>();

        // Same pattern as capture: cpal streams are !Send, so the stream
        // lives on its own thread for the lifetime of the output.
        let join = std::thread::Builder::new()
            .name("parlare-playback".into())
            .spawn(move || {
                let stream = match build_output_stream(&config, thread_state) {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                while !thread_cancel.is_cancelled() {
                    std::thread::sleep(Duration::from_millis(25));
                }

                drop(stream);
                info!("audio output stopped");
            })
            .map_err(|e| EngineError::Audio(format!("cannot spawn playback thread: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                state,
                sample_rate,
                cancel,
                join: Some(join),
            }),
            Ok(Err(e)) => {
                let _ = join.join();
                Err(e)
            }
            Err(_) => {
                cancel.cancel();
                let _ = join.join();
                Err(EngineError::Audio("playback thread died during open".into()))
            }
        }
    }

    /// Close the output stream and release the device. Idempotent.
    pub fn close(&mut self) {
        self.cancel.cancel();
        if let Some(join) = self.join.take()
            && join.join().is_err()
        {
            warn!("playback thread panicked during close");
        }
    }

    fn locked(&self) -> std::sync::MutexGuard<'_, MixerState> {
        // A poisoned mixer lock means the audio callback panicked; the
        // state itself is still coherent for bookkeeping.
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        self.close();
    }
}

impl AudioOut for CpalOutput {
    fn now(&self) -> f64 {
        let st = self.locked();
        st.clock_frames as f64 / f64::from(self.sample_rate)
    }

    fn schedule(&self, samples: Vec<f32>, start: f64) -> SourceId {
        let mut st = self.locked();
        let id = st.next_id;
        st.next_id += 1;

        if samples.is_empty() {
            st.finished.push(id);
            return id;
        }

        let start_frame =
            ((start * f64::from(self.sample_rate)).round().max(0.0) as u64).max(st.clock_frames);
        st.sources.push(ScheduledSource {
            id,
            samples,
            start_frame,
            pos: 0,
        });
        id
    }

    fn stop(&self, id: SourceId) {
        let mut st = self.locked();
        st.sources.retain(|s| s.id != id);
    }

    fn take_finished(&self) -> Vec<SourceId> {
        let mut st = self.locked();
        std::mem::take(&mut st.finished)
    }
}

fn build_output_stream(
    config: &AudioConfig,
    state: Arc<Mutex<MixerState>>,
) -> Result<cpal::Stream> {
    let host = cpal::default_host();

    let device = if let Some(ref name) = config.output_device {
        host.output_devices()
            .map_err(|e| EngineError::Audio(format!("cannot enumerate devices: {e}")))?
            .find(|d| {
                d.description()
                    .ok()
                    .map(|desc| desc.name() == name)
                    .unwrap_or(false)
            })
            .ok_or_else(|| EngineError::Audio(format!("output device '{name}' not found")))?
    } else {
        host.default_output_device()
            .ok_or_else(|| EngineError::Audio("no default output device".into()))?
    };

    let device_name = device
        .description()
        .map(|d| d.name().to_owned())
        .unwrap_or_else(|_| "<unknown>".into());
    info!("using output device: {device_name}");

    let stream_config = StreamConfig {
        channels: 1,
        sample_rate: config.output_sample_rate,
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                let Ok(mut st) = state.lock() else { return };
                mix_into(&mut st, data);
            },
            move |err| {
                warn!("audio output stream error: {err}");
            },
            None,
        )
        .map_err(|e| EngineError::Audio(format!("failed to build output stream: {e}")))?;

    stream
        .play()
        .map_err(|e| EngineError::Audio(format!("failed to start output stream: {e}")))?;

    Ok(stream)
}

/// Mix all due sources into one output buffer and advance the clock.
fn mix_into(st: &mut MixerState, data: &mut [f32]) {
    data.fill(0.0);
    let base = st.clock_frames;
    let len = data.len() as u64;

    for src in &mut st.sources {
        if src.start_frame >= base + len {
            continue;
        }
        let begin = src.start_frame.saturating_sub(base) as usize;
        let mut pos = src.pos;
        for slot in &mut data[begin..] {
            if pos >= src.samples.len() {
                break;
            }
            *slot += src.samples[pos];
            pos += 1;
        }
        src.pos = pos;
    }

    for slot in data.iter_mut() {
        *slot = slot.clamp(-1.0, 1.0);
    }

    st.clock_frames += len;
    let finished: Vec<SourceId> = st
        .sources
        .iter()
        .filter(|s| s.pos >= s.samples.len())
        .map(|s| s.id)
        .collect();
    st.sources.retain(|s| s.pos < s.samples.len());
    st.finished.extend(finished);
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn source(id: SourceId, samples: Vec<f32>, start_frame: u64) -> ScheduledSource {
        ScheduledSource {
            id,
            samples,
            start_frame,
            pos: 0,
        }
    }

    #[test]
    fn test_mix_respects_start_offset() {
        let mut st = MixerState::default();
        st.sources.push(source(1, vec![0.5; 4], 2));

        let mut data = [0.0f32; 8];
        mix_into(&mut st, &mut data);

        assert_eq!(&data[..2], &[0.0, 0.0]);
        assert_eq!(&data[2..6], &[0.5; 4]);
        assert_eq!(&data[6..], &[0.0, 0.0]);
        assert_eq!(st.clock_frames, 8);
        assert_eq!(st.finished, vec![1]);
        assert!(st.sources.is_empty());
    }

    #[test]
    fn test_mix_sums_overlapping_sources_and_clamps() {
        let mut st = MixerState::default();
        st.sources.push(source(1, vec![0.8; 4], 0));
        st.sources.push(source(2, vec![0.8; 4], 0));

        let mut data = [0.0f32; 4];
        mix_into(&mut st, &mut data);
        assert_eq!(data, [1.0; 4]);
    }

    #[test]
    fn test_source_spans_multiple_callbacks() {
        let mut st = MixerState::default();
        st.sources.push(source(7, vec![0.25; 6], 0));

        let mut first = [0.0f32; 4];
        mix_into(&mut st, &mut first);
        assert_eq!(first, [0.25; 4]);
        assert!(st.finished.is_empty());

        let mut second = [0.0f32; 4];
        mix_into(&mut st, &mut second);
        assert_eq!(&second[..2], &[0.25, 0.25]);
        assert_eq!(&second[2..], &[0.0, 0.0]);
        assert_eq!(st.finished, vec![7]);
    }

    #[test]
    fn test_future_source_is_untouched() {
        let mut st = MixerState::default();
        st.sources.push(source(3, vec![0.5; 2], 100));

        let mut data = [0.0f32; 4];
        mix_into(&mut st, &mut data);
        assert_eq!(data, [0.0; 4]);
        assert_eq!(st.sources.len(), 1);
        assert_eq!(st.sources[0].pos, 0);
    }
}
