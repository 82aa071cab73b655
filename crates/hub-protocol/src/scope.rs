//! Scope (I/Q) payload decoding
//!
//! A scope payload is a run of little-endian `i16` values made of four
//! equal-length blocks: `[ch1.i..., ch1.q..., ch2.i..., ch2.q...]`. Each
//! channel is split into its I, Q and amplitude (`sqrt(i² + q²)`) arrays.

use serde::{Deserialize, Serialize};

/// Decoded samples of one channel
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopeChannel {
    pub i: Vec<f32>,
    pub q: Vec<f32>,
    pub a: Vec<f32>,
}

impl ScopeChannel {
    fn with_len(n: usize) -> Self {
        Self {
            i: vec![0.0; n],
            q: vec![0.0; n],
            a: vec![0.0; n],
        }
    }

    fn set(&mut self, k: usize, i: i16, q: i16) {
        let (i, q) = (f32::from(i), f32::from(q));
        self.i[k] = i;
        self.q[k] = q;
        self.a[k] = (i * i + q * q).sqrt();
    }
}

/// Both channels of one scope frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopeChannels {
    /// Samples per channel
    pub count: usize,
    pub ch1: ScopeChannel,
    pub ch2: ScopeChannel,
}

/// Reusable scope decoder
///
/// Buffers are reallocated only when the sample count changes; frames of the
/// same length overwrite the previous arrays in place.
#[derive(Debug, Default)]
pub struct ScopeDecoder {
    channels: ScopeChannels,
    allocations: usize,
}

impl ScopeDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a scope payload (tag stripped)
    ///
    /// Trailing samples that do not fill all four blocks are ignored.
    pub fn decode(&mut self, payload: &[u8]) -> &ScopeChannels {
        let count = payload.len() / 8;
        if count != self.channels.count {
            self.channels = ScopeChannels {
                count,
                ch1: ScopeChannel::with_len(count),
                ch2: ScopeChannel::with_len(count),
            };
            self.allocations += 1;
        }

        let sample = |n: usize| i16::from_le_bytes([payload[2 * n], payload[2 * n + 1]]);
        for k in 0..count {
            self.channels.ch1.set(k, sample(k), sample(k + count));
            self.channels.ch2.set(k, sample(k + 2 * count), sample(k + 3 * count));
        }
        &self.channels
    }

    /// Last decoded channels
    pub fn channels(&self) -> &ScopeChannels {
        &self.channels
    }

    /// Number of times the buffers have been (re)allocated
    pub fn allocations(&self) -> usize {
        self.allocations
    }
}

/// Encode two channels of I/Q samples into a scope payload (tag not included)
pub fn encode_scope(ch1: &[(i16, i16)], ch2: &[(i16, i16)]) -> Vec<u8> {
    let n = ch1.len().min(ch2.len());
    let mut out = Vec::with_capacity(n * 8);
    for (samples, quadrature) in [(ch1, false), (ch1, true), (ch2, false), (ch2, true)] {
        for &(i, q) in &samples[..n] {
            let v = if quadrature { q } else { i };
            out.extend_from_slice(&v.to_le_bytes());
        }
    }
    out
}
