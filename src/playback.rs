//! Gapless playback scheduling for response audio.
//!
//! Response chunks arrive asynchronously, faster or slower than real time.
//! Ordering comes from scheduling, not buffering: a monotonically
//! non-decreasing cursor places each decoded chunk immediately after the
//! previous one (or at the clock's current position, whichever is later),
//! so output is contiguous with no overlap and latency is bounded by one
//! chunk's decode, not by queue depth.

use crate::audio::output::{AudioOut, SourceId};
use crate::audio::pcm;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Schedules decoded response audio back-to-back on an [`AudioOut`].
pub struct PlaybackScheduler {
    out: Arc<dyn AudioOut>,
    sample_rate: u32,
    /// Start time for the next chunk, in clock seconds.
    next_start: f64,
    /// Sources scheduled and not yet finished or stopped.
    active: HashSet<SourceId>,
}

impl PlaybackScheduler {
    pub fn new(out: Arc<dyn AudioOut>, sample_rate: u32) -> Self {
        Self {
            out,
            sample_rate,
            next_start: 0.0,
            active: HashSet::new(),
        }
    }

    /// Decode a 16-bit LE PCM chunk and schedule it at the cursor.
    ///
    /// Seeding the cursor with `max(cursor, now)` absorbs arrival jitter
    /// without ever scheduling in the past or overlapping the previous
    /// chunk. Empty chunks are ignored.
    pub fn enqueue_pcm(&mut self, bytes: &[u8]) {
        self.reap();

        let samples = pcm::decode_pcm16le(bytes);
        if samples.is_empty() {
            return;
        }
        let duration = samples.len() as f64 / f64::from(self.sample_rate);

        let start = self.next_start.max(self.out.now());
        let id = self.out.schedule(samples, start);
        self.active.insert(id);
        self.next_start = start + duration;
        debug!("scheduled {duration:.3}s of audio at t={start:.3}");
    }

    /// Drop bookkeeping for sources that finished playing naturally.
    pub fn reap(&mut self) {
        for id in self.out.take_finished() {
            self.active.remove(&id);
        }
    }

    /// Barge-in: force-stop everything scheduled and rewind the cursor to
    /// the clock's current position so the next chunk starts immediately.
    ///
    /// Stop is best-effort; a source that already finished is simply gone.
    pub fn interrupt(&mut self) {
        self.reap();
        for id in self.active.drain() {
            self.out.stop(id);
        }
        self.next_start = self.out.now();
        debug!("playback interrupted, cursor reset to {:.3}", self.next_start);
    }

    /// Number of sources still scheduled or playing.
    pub fn active_count(&mut self) -> usize {
        self.reap();
        self.active.len()
    }

    /// Current cursor position, in clock seconds.
    pub fn cursor(&self) -> f64 {
        self.next_start
    }
}
