// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Image dimensions and the workspace-wide rounding policy.
//!
//! Every scaled dimension in the engine goes through [`round_half_up`]:
//! stage outputs, final outputs and preview sizes alike. Stage outputs are
//! always derived from the *source* dimensions and the cumulative factor, so
//! per-stage rounding never accumulates drift.

use crate::PixelFormat;
use std::fmt;

/// Rounds a positive real dimension half-up and clamps it to `[1, u32::MAX]`.
///
/// # Examples
/// ```
/// use raster_core::round_half_up;
/// assert_eq!(round_half_up(2.5), 3);
/// assert_eq!(round_half_up(2.49), 2);
/// assert_eq!(round_half_up(0.2), 1);
/// ```
pub fn round_half_up(value: f64) -> u32 {
    let rounded = (value + 0.5).floor();
    if rounded < 1.0 {
        1
    } else if rounded >= u32::MAX as f64 {
        u32::MAX
    } else {
        rounded as u32
    }
}

/// Width and height of a raster in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Dims {
    pub width: u32,
    pub height: u32,
}

impl Dims {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns `true` if either side is zero.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Total number of pixels.
    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Bytes needed to store these dimensions in `format`, saturating at
    /// `u64::MAX`.
    pub fn size_bytes(&self, format: PixelFormat) -> u64 {
        self.pixel_count().saturating_mul(format.bytes_per_pixel() as u64)
    }

    /// Bytes in one row of `format` pixels.
    pub fn row_bytes(&self, format: PixelFormat) -> usize {
        self.width as usize * format.bytes_per_pixel()
    }

    /// Dimensions after multiplying both sides by `factor`.
    pub fn scaled(&self, factor: f64) -> Dims {
        Dims {
            width: round_half_up(self.width as f64 * factor),
            height: round_half_up(self.height as f64 * factor),
        }
    }

    /// Like [`Dims::scaled`], but `None` if either rounded side would not
    /// fit in a `u32` or `factor` is not finite.
    pub fn checked_scaled(&self, factor: f64) -> Option<Dims> {
        let side = |v: u32| {
            let rounded = (v as f64 * factor + 0.5).floor();
            (rounded.is_finite() && rounded <= u32::MAX as f64).then(|| round_half_up(rounded))
        };
        Some(Dims {
            width: side(self.width)?,
            height: side(self.height)?,
        })
    }

    /// Largest dimensions with the same aspect ratio whose longer edge does
    /// not exceed `max_edge`. Returns `self` unchanged if it already fits.
    pub fn fit_within(&self, max_edge: u32) -> Dims {
        let longest = self.width.max(self.height);
        if longest <= max_edge || longest == 0 {
            return *self;
        }
        self.scaled(max_edge as f64 / longest as f64)
    }
}

impl fmt::Display for Dims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_half_up() {
        assert_eq!(round_half_up(1.5), 2);
        assert_eq!(round_half_up(30000.0), 30000);
        assert_eq!(round_half_up(4.4999), 4);
        assert_eq!(round_half_up(-3.0), 1);
    }

    #[test]
    fn test_scaled() {
        let d = Dims::new(2000, 3000);
        assert_eq!(d.scaled(15.0), Dims::new(30000, 45000));
        assert_eq!(Dims::new(3, 5).scaled(1.5), Dims::new(5, 8)); // 4.5 → 5, 7.5 → 8
    }

    #[test]
    fn test_size_bytes() {
        let d = Dims::new(10, 20);
        assert_eq!(d.pixel_count(), 200);
        assert_eq!(d.size_bytes(PixelFormat::RGBA8), 800);
        assert_eq!(d.row_bytes(PixelFormat::RGB8), 30);
    }

    #[test]
    fn test_size_bytes_saturates() {
        let huge = Dims::new(u32::MAX, u32::MAX);
        assert_eq!(huge.size_bytes(PixelFormat::RGBA16), u64::MAX);
        assert_eq!(huge.size_bytes(PixelFormat::GRAY8), huge.pixel_count());
    }

    #[test]
    fn test_checked_scaled() {
        let d = Dims::new(10, 10);
        assert_eq!(d.checked_scaled(2.5), Some(Dims::new(25, 25)));
        assert_eq!(d.checked_scaled(1e9), None);
        assert_eq!(d.checked_scaled(f64::INFINITY), None);
        assert_eq!(Dims::new(1, 5).checked_scaled(1e9), None);
        assert_eq!(Dims::new(1, 2).checked_scaled(2e9), Some(Dims::new(2_000_000_000, 4_000_000_000)));
    }

    #[test]
    fn test_fit_within() {
        assert_eq!(Dims::new(4000, 2000).fit_within(1000), Dims::new(1000, 500));
        assert_eq!(Dims::new(300, 200).fit_within(1000), Dims::new(300, 200));
        assert_eq!(Dims::new(1000, 3000).fit_within(1500), Dims::new(500, 1500));
    }

    #[test]
    fn test_display() {
        assert_eq!(Dims::new(640, 480).to_string(), "640x480");
    }
}
