//! Audio bridge between host capture/playback and realtime sessions.
//!
//! Realtime providers exchange PCM 16-bit signed little-endian audio while
//! host audio stacks typically work in 32-bit float. This module provides the
//! sample conversions plus a strict-FIFO playout queue ([`PlayoutQueue`]) that
//! serializes provider audio chunks into a host [`AudioSink`].
//!
//! # Sample Scaling
//!
//! Conversion is asymmetric around zero: negative samples scale against
//! i16::MIN (0x8000) and non-negative samples against i16::MAX (0x7FFF), so
//! -1.0 maps to -32768 and 1.0 maps to 32767 with no clipping on either rail.

use bytes::Bytes;
use thiserror::Error;

mod playback;

pub use playback::{AudioSink, PlayoutQueue};

/// Errors that can occur in the audio bridge.
#[derive(Debug, Error)]
pub enum AudioError {
    /// The host sink failed to play a chunk
    #[error("Audio sink error: {0}")]
    Sink(String),

    /// Opus encode/decode failure
    #[error("Codec error: {0}")]
    Codec(String),
}

/// Convert 32-bit float samples to PCM 16-bit.
///
/// Input samples are clamped to [-1.0, 1.0] first. Negative values scale by
/// 0x8000 and non-negative values by 0x7FFF.
pub fn f32_to_pcm16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&sample| {
            let s = sample.clamp(-1.0, 1.0);
            if s < 0.0 {
                (s * 0x8000 as f32) as i16
            } else {
                (s * 0x7FFF as f32) as i16
            }
        })
        .collect()
}

/// Convert PCM 16-bit samples to 32-bit float in [-1.0, 1.0].
///
/// Mirror of [`f32_to_pcm16`]: negative values divide by 0x8000 and
/// non-negative values by 0x7FFF.
pub fn pcm16_to_f32(samples: &[i16]) -> Vec<f32> {
    samples
        .iter()
        .map(|&s| {
            if s < 0 {
                s as f32 / 0x8000 as f32
            } else {
                s as f32 / 0x7FFF as f32
            }
        })
        .collect()
}

/// Decode little-endian PCM16 bytes into samples.
///
/// A trailing odd byte is dropped.
pub fn pcm16_bytes_to_samples(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Encode PCM16 samples as little-endian bytes.
pub fn samples_to_pcm16_bytes(samples: &[i16]) -> Bytes {
    let mut buf = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        buf.extend_from_slice(&s.to_le_bytes());
    }
    Bytes::from(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f32_to_pcm16_full_scale() {
        let samples = f32_to_pcm16(&[-1.0, 0.0, 1.0]);
        assert_eq!(samples, vec![-32768, 0, 32767]);
    }

    #[test]
    fn test_f32_to_pcm16_clamps_out_of_range() {
        let samples = f32_to_pcm16(&[-2.0, 1.5]);
        assert_eq!(samples, vec![-32768, 32767]);
    }

    #[test]
    fn test_f32_to_pcm16_asymmetric_scaling() {
        let samples = f32_to_pcm16(&[-0.5, 0.5]);
        assert_eq!(samples[0], -16384); // -0.5 * 0x8000
        assert_eq!(samples[1], 16383); // 0.5 * 0x7FFF truncated
    }

    #[test]
    fn test_pcm16_to_f32_full_scale() {
        let samples = pcm16_to_f32(&[i16::MIN, 0, i16::MAX]);
        assert_eq!(samples, vec![-1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_round_trip_preserves_sign() {
        let original = vec![-0.75_f32, -0.01, 0.0, 0.01, 0.75];
        let back = pcm16_to_f32(&f32_to_pcm16(&original));
        for (a, b) in original.iter().zip(back.iter()) {
            assert!((a - b).abs() < 1e-3, "{a} vs {b}");
            assert_eq!(a.signum() < 0.0, b.signum() < 0.0);
        }
    }

    #[test]
    fn test_pcm16_bytes_round_trip() {
        let samples = vec![-32768_i16, -1, 0, 1, 32767];
        let bytes = samples_to_pcm16_bytes(&samples);
        assert_eq!(bytes.len(), 10);
        assert_eq!(pcm16_bytes_to_samples(&bytes), samples);
    }

    #[test]
    fn test_pcm16_bytes_drops_trailing_odd_byte() {
        let samples = pcm16_bytes_to_samples(&[0x01, 0x00, 0xFF]);
        assert_eq!(samples, vec![1]);
    }
}
