//! PCM helpers for the client audio path (16-bit signed mono).

use crate::providers::AudioChunk;

/// Decodes little-endian s16 bytes. A trailing odd byte is ignored.
pub fn decode_s16le(bytes: &[u8]) -> AudioChunk {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

pub fn encode_s16le(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

/// Converts normalized f32 samples [-1.0, 1.0] to s16.
pub fn from_f32(samples: &[f32]) -> AudioChunk {
    samples
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * 32767.0) as i16)
        .collect()
}

/// Root-mean-square level normalized to 0.0-1.0.
pub fn rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples
        .iter()
        .map(|&s| {
            let v = s as f64 / 32768.0;
            v * v
        })
        .sum();
    (sum / samples.len() as f64).sqrt() as f32
}
