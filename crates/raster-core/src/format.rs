// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Pixel formats: channel count and per-channel sample depth.

use crate::RasterError;
use std::fmt;

/// Storage depth of a single channel sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BitDepth {
    /// 8-bit unsigned integer samples.
    U8,
    /// 16-bit unsigned integer samples (native endian).
    U16,
    /// 32-bit IEEE 754 float samples (native endian).
    F32,
}

impl BitDepth {
    /// Returns the size of a single sample in bytes.
    pub fn size_bytes(self) -> usize {
        match self {
            BitDepth::U8 => 1,
            BitDepth::U16 => 2,
            BitDepth::F32 => 4,
        }
    }

    /// Returns a human-readable label.
    pub fn as_str(self) -> &'static str {
        match self {
            BitDepth::U8 => "u8",
            BitDepth::U16 => "u16",
            BitDepth::F32 => "f32",
        }
    }

    /// Largest representable sample value, used for clamping integer output.
    pub(crate) fn max_value(self) -> f32 {
        match self {
            BitDepth::U8 => u8::MAX as f32,
            BitDepth::U16 => u16::MAX as f32,
            BitDepth::F32 => f32::MAX,
        }
    }
}

/// Interleaved pixel layout: `channels` samples of `depth` per pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct PixelFormat {
    channels: u8,
    depth: BitDepth,
}

impl PixelFormat {
    /// Single-channel 8-bit.
    pub const GRAY8: Self = Self { channels: 1, depth: BitDepth::U8 };
    /// Three-channel 8-bit.
    pub const RGB8: Self = Self { channels: 3, depth: BitDepth::U8 };
    /// Four-channel 8-bit.
    pub const RGBA8: Self = Self { channels: 4, depth: BitDepth::U8 };
    /// Four-channel 16-bit.
    pub const RGBA16: Self = Self { channels: 4, depth: BitDepth::U16 };
    /// Four-channel 32-bit float.
    pub const RGBA32F: Self = Self { channels: 4, depth: BitDepth::F32 };

    /// Creates a format, rejecting channel counts outside `1..=4`.
    pub fn new(channels: u8, depth: BitDepth) -> Result<Self, RasterError> {
        if !(1..=4).contains(&channels) {
            return Err(RasterError::InvalidChannels(channels));
        }
        Ok(Self { channels, depth })
    }

    /// Number of interleaved channels.
    pub fn channels(self) -> u8 {
        self.channels
    }

    /// Sample depth.
    pub fn depth(self) -> BitDepth {
        self.depth
    }

    /// Bytes occupied by one pixel.
    pub fn bytes_per_pixel(self) -> usize {
        self.channels as usize * self.depth.size_bytes()
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.channels, self.depth.as_str())
    }
}
