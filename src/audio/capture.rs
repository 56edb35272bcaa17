//! Microphone capture via cpal.
//!
//! Captures at the device's native configuration, downmixes to mono,
//! downsamples to 16kHz, and reassembles fixed-size frames for the session.
//! The stream lives on a dedicated thread scoped by a [`CaptureGuard`]; the
//! guard releases the microphone exactly once, on whichever exit path
//! triggers teardown first.

use crate::audio::pcm::AudioFrame;
use crate::config::AudioConfig;
use crate::error::{EngineError, Result};
use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Source of fixed-size capture frames.
///
/// The production implementation is [`MicCapture`]; tests substitute a mock
/// that feeds frames directly.
pub trait AudioCapture: Send + Sync {
    /// Open the capture stream and begin delivering frames to `tx`.
    ///
    /// The stream runs until the returned guard is released or dropped.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::MicAccess`] if the microphone cannot be
    /// opened (permission denied, no input device).
    fn open(&self, tx: mpsc::Sender<AudioFrame>) -> Result<CaptureGuard>;
}

/// Scoped ownership of an open capture stream.
///
/// Releasing an already-released guard is a no-op; dropping the guard
/// releases it. This is the single owner of the microphone for a session.
#[derive(Debug)]
pub struct CaptureGuard {
    cancel: CancellationToken,
    join: Option<std::thread::JoinHandle<()>>,
}

impl CaptureGuard {
    /// Build a guard around a cancellation token with no backing thread.
    ///
    /// Used by mock capture sources in tests.
    pub fn from_token(cancel: CancellationToken) -> Self {
        Self { cancel, join: None }
    }

    /// Stop the capture stream and release the microphone. Idempotent.
    pub fn release(&mut self) {
        self.cancel.cancel();
        if let Some(join) = self.join.take()
            && join.join().is_err()
        {
            warn!("capture thread panicked during release");
        }
    }

    /// Whether release has been requested.
    pub fn is_released(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Microphone capture via cpal.
pub struct MicCapture {
    config: AudioConfig,
}

impl MicCapture {
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

impl AudioCapture for MicCapture {
    fn open(&self, tx: mpsc::Sender<AudioFrame>) -> Result<CaptureGuard> {
        let cancel = CancellationToken::new();
        let thread_cancel = cancel.clone();
        let config = self.config.clone();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<()>>();

        // cpal streams are !Send, so the stream is built and held on its
        // own thread; the open result is reported back synchronously.
        let join = std::thread::Builder::new()
            .name("parlare-capture".into())
            .spawn(move || {
                let stream = match build_input_stream(&config, tx) {
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
                info!("audio capture stopped");
            })
            .map_err(|e| EngineError::Audio(format!("cannot spawn capture thread: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(CaptureGuard {
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
                Err(EngineError::Audio("capture thread died during open".into()))
            }
        }
    }
}

fn build_input_stream(config: &AudioConfig, tx: mpsc::Sender<AudioFrame>) -> Result<cpal::Stream> {
    let host = cpal::default_host();

    let device = if let Some(ref name) = config.input_device {
        host.input_devices()
            .map_err(|e| EngineError::Audio(format!("cannot enumerate devices: {e}")))?
            .find(|d| {
                d.description()
                    .ok()
                    .map(|desc| desc.name() == name)
                    .unwrap_or(false)
            })
            .ok_or_else(|| EngineError::MicAccess(format!("input device '{name}' not found")))?
    } else {
        host.default_input_device()
            .ok_or_else(|| EngineError::MicAccess("no default input device".into()))?
    };

    let device_name = device
        .description()
        .map(|d| d.name().to_owned())
        .unwrap_or_else(|_| "<unknown>".into());
    info!("using input device: {device_name}");

    let default_config = device
        .default_input_config()
        .map_err(|e| EngineError::MicAccess(format!("no default input config: {e}")))?;

    let native_rate = default_config.sample_rate();
    let native_channels = default_config.channels();
    let stream_config = StreamConfig {
        channels: native_channels,
        sample_rate: native_rate,
        buffer_size: cpal::BufferSize::Default,
    };

    let target_rate = config.input_sample_rate;
    let frame_size = config.frame_size;
    let mut pending: Vec<f32> = Vec::with_capacity(frame_size * 2);

    let stream = device
        .build_input_stream(
            &stream_config,
            move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                let mono = if native_channels > 1 {
                    to_mono(data, native_channels)
                } else {
                    data.to_vec()
                };

                let samples = if native_rate != target_rate {
                    downsample(&mono, native_rate, target_rate)
                } else {
                    mono
                };
                pending.extend_from_slice(&samples);

                while pending.len() >= frame_size {
                    let frame = AudioFrame {
                        samples: pending.drain(..frame_size).collect(),
                        sample_rate: target_rate,
                        captured_at: Instant::now(),
                    };
                    // Never block the audio thread; drop on backlog.
                    if tx.try_send(frame).is_err() {
                        debug!("frame channel full, dropping frame");
                    }
                }
            },
            move |err| {
                warn!("audio input stream error: {err}");
            },
            None,
        )
        .map_err(|e| EngineError::MicAccess(format!("failed to open input stream: {e}")))?;

    stream
        .play()
        .map_err(|e| EngineError::MicAccess(format!("failed to start input stream: {e}")))?;

    info!("audio capture started: native {native_rate}Hz -> target {target_rate}Hz");
    Ok(stream)
}

/// Convert interleaved multi-channel audio to mono by averaging channels.
fn to_mono(data: &[f32], channels: u16) -> Vec<f32> {
    let ch = channels as usize;
    data.chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

/// Simple linear-interpolation downsampler.
///
/// Sufficient quality for speech (48kHz → 16kHz); no anti-alias filter
/// needed since speech energy sits below 8kHz.
fn downsample(samples: &[f32], src_rate: u32, dst_rate: u32) -> Vec<f32> {
    if src_rate == dst_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = f64::from(src_rate) / f64::from(dst_rate);
    let out_len = (samples.len() as f64 / ratio) as usize;
    let mut output = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let src_pos = i as f64 * ratio;
        let idx = src_pos as usize;
        let frac = src_pos - idx as f64;

        let sample = if idx + 1 < samples.len() {
            f64::from(samples[idx]) * (1.0 - frac) + f64::from(samples[idx + 1]) * frac
        } else {
            f64::from(samples[idx.min(samples.len() - 1)])
        };

        output.push(sample as f32);
    }

    output
}
