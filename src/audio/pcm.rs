//! PCM sample conversion between the engine's f32 frames and the wire.
//!
//! Outbound audio is 16-bit signed little-endian PCM at 16kHz mono;
//! inbound response audio is the same encoding at 24kHz mono.

use std::time::Instant;

/// A fixed-size frame of captured microphone audio.
///
/// Consumed immediately by PCM encoding; never retained across ticks.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// f32 samples in [-1, 1], mono, at the capture sample rate.
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Timestamp when this frame was captured.
    pub captured_at: Instant,
}

/// Little-endian 16-bit signed PCM derived from one [`AudioFrame`].
///
/// Ownership transfers to the outbound transport on send.
#[derive(Debug, Clone)]
pub struct PcmPacket {
    bytes: Vec<u8>,
}

impl PcmPacket {
    /// Encode f32 samples by linear scaling and clamping to the i16 range.
    pub fn from_samples(samples: &[f32]) -> Self {
        let mut bytes = Vec::with_capacity(samples.len() * 2);
        for &s in samples {
            let v = (f64::from(s) * 32768.0).clamp(-32768.0, 32767.0) as i16;
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        Self { bytes }
    }

    /// The encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume the packet, yielding the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Number of encoded samples.
    pub fn sample_count(&self) -> usize {
        self.bytes.len() / 2
    }
}

impl From<&AudioFrame> for PcmPacket {
    fn from(frame: &AudioFrame) -> Self {
        Self::from_samples(&frame.samples)
    }
}

/// Decode little-endian 16-bit signed PCM bytes to f32 samples.
///
/// A trailing odd byte is ignored.
pub fn decode_pcm16le(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
        .collect()
}

/// Root-mean-square loudness of a frame, for UI metering.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn test_encode_scales_and_clamps() {
        let packet = PcmPacket::from_samples(&[0.0, 0.5, -0.5, 1.5, -1.5]);
        let decoded = decode_pcm16le(packet.as_bytes());
        assert_eq!(decoded.len(), 5);
        assert!((decoded[0]).abs() < 1e-6);
        assert!((decoded[1] - 0.5).abs() < 1e-3);
        assert!((decoded[2] + 0.5).abs() < 1e-3);
        // Over-range input clamps to full scale instead of wrapping.
        assert!((decoded[3] - 32767.0 / 32768.0).abs() < 1e-6);
        assert!((decoded[4] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_decode_known_bytes() {
        // 0x0000 = 0, 0x4000 = 16384 -> 0.5, 0x8000 = -32768 -> -1.0
        let samples = decode_pcm16le(&[0x00, 0x00, 0x00, 0x40, 0x00, 0x80]);
        assert_eq!(samples.len(), 3);
        assert!((samples[0]).abs() < 1e-6);
        assert!((samples[1] - 0.5).abs() < 1e-6);
        assert!((samples[2] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_decode_ignores_trailing_byte() {
        assert_eq!(decode_pcm16le(&[0x00, 0x40, 0x7f]).len(), 1);
    }

    #[test]
    fn test_rms() {
        assert_eq!(rms(&[]), 0.0);
        assert!((rms(&[0.5; 128]) - 0.5).abs() < 1e-6);
        assert!((rms(&[0.5, -0.5, 0.5, -0.5]) - 0.5).abs() < 1e-6);
        assert_eq!(rms(&[0.0; 64]), 0.0);
    }
}
