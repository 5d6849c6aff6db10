// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Resampling operations.
//!
//! Samples are decoded to `f32` in their native range (0..=255 for `u8`,
//! 0..=65535 for `u16`, unbounded for `f32`), filtered, then rounded and
//! clamped back on write.

mod kernel;
mod resample;

pub use kernel::{AxisWeights, ResampleKernel};
pub use resample::{resample, ResamplePlan};

use crate::BitDepth;

/// Reads sample `idx` (in samples, not bytes) from an interleaved buffer.
#[inline]
pub(crate) fn read_sample(bytes: &[u8], idx: usize, depth: BitDepth) -> f32 {
    match depth {
        BitDepth::U8 => bytes[idx] as f32,
        BitDepth::U16 => {
            let o = idx * 2;
            u16::from_ne_bytes([bytes[o], bytes[o + 1]]) as f32
        }
        BitDepth::F32 => {
            let o = idx * 4;
            f32::from_ne_bytes([bytes[o], bytes[o + 1], bytes[o + 2], bytes[o + 3]])
        }
    }
}

/// Writes `value` as sample `idx`, rounding and clamping integer depths.
#[inline]
pub(crate) fn write_sample(bytes: &mut [u8], idx: usize, depth: BitDepth, value: f32) {
    match depth {
        BitDepth::U8 => {
            bytes[idx] = value.round().clamp(0.0, depth.max_value()) as u8;
        }
        BitDepth::U16 => {
            let v = value.round().clamp(0.0, depth.max_value()) as u16;
            bytes[idx * 2..idx * 2 + 2].copy_from_slice(&v.to_ne_bytes());
        }
        BitDepth::F32 => {
            bytes[idx * 4..idx * 4 + 4].copy_from_slice(&value.to_ne_bytes());
        }
    }
}

/// Decodes every sample of an interleaved buffer to `f32`.
pub fn decode_samples(bytes: &[u8], depth: BitDepth) -> Vec<f32> {
    let n = bytes.len() / depth.size_bytes();
    (0..n).map(|i| read_sample(bytes, i, depth)).collect()
}

/// Encodes `samples` into `out`, rounding and clamping integer depths.
///
/// Writes `min(samples.len(), out.len() / depth.size_bytes())` samples.
pub fn encode_samples(samples: &[f32], depth: BitDepth, out: &mut [u8]) {
    let n = samples.len().min(out.len() / depth.size_bytes());
    for (i, &v) in samples[..n].iter().enumerate() {
        write_sample(out, i, depth, v);
    }
}
