// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Owned raster buffers exchanged at the engine boundary.

use crate::{Dims, PixelFormat, RasterError};

/// An owned, row-major, interleaved raster.
///
/// `RasterImage` is what a decoder hands to the engine and what the engine
/// hands back to an encoder. Inside the pipeline, pixels live in pooled
/// blocks instead; see `stage_exec::ImageBuffer`.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    dims: Dims,
    format: PixelFormat,
    pixels: Vec<u8>,
}

impl RasterImage {
    /// Wraps raw pixel bytes, validating the length against dims and format.
    pub fn new(dims: Dims, format: PixelFormat, pixels: Vec<u8>) -> Result<Self, RasterError> {
        if dims.is_empty() {
            return Err(RasterError::ZeroDimension {
                width: dims.width,
                height: dims.height,
            });
        }
        let expected = dims.size_bytes(format) as usize;
        if pixels.len() != expected {
            return Err(RasterError::BufferSizeMismatch {
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self { dims, format, pixels })
    }

    /// Creates a zero-filled raster.
    pub fn zeros(dims: Dims, format: PixelFormat) -> Result<Self, RasterError> {
        let len = dims.size_bytes(format) as usize;
        Self::new(dims, format, vec![0u8; len])
    }

    /// Builds a raster by evaluating `f(x, y, channel)` for every sample.
    ///
    /// Values are rounded and clamped for integer depths.
    pub fn from_fn(
        dims: Dims,
        format: PixelFormat,
        mut f: impl FnMut(u32, u32, u8) -> f32,
    ) -> Result<Self, RasterError> {
        let mut image = Self::zeros(dims, format)?;
        let channels = format.channels();
        let depth = format.depth();
        let mut idx = 0usize;
        for y in 0..dims.height {
            for x in 0..dims.width {
                for c in 0..channels {
                    crate::ops::write_sample(&mut image.pixels, idx, depth, f(x, y, c));
                    idx += 1;
                }
            }
        }
        Ok(image)
    }

    pub fn dims(&self) -> Dims {
        self.dims
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Raw pixel bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.pixels
    }

    /// Mutable raw pixel bytes.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    /// Consumes the image and returns its pixel bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.pixels
    }

    /// Memory footprint in bytes.
    pub fn size_bytes(&self) -> usize {
        self.pixels.len()
    }

    /// Reads one sample as `f32` in the depth's native range.
    ///
    /// # Panics
    /// Panics if the coordinates are out of bounds.
    pub fn sample(&self, x: u32, y: u32, channel: u8) -> f32 {
        assert!(x < self.dims.width && y < self.dims.height && channel < self.format.channels());
        let idx = (y as usize * self.dims.width as usize + x as usize)
            * self.format.channels() as usize
            + channel as usize;
        crate::ops::read_sample(&self.pixels, idx, self.format.depth())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BitDepth;

    #[test]
    fn test_new_validates_length() {
        let dims = Dims::new(4, 2);
        assert!(RasterImage::new(dims, PixelFormat::RGB8, vec![0; 24]).is_ok());
        assert!(matches!(
            RasterImage::new(dims, PixelFormat::RGB8, vec![0; 23]),
            Err(RasterError::BufferSizeMismatch { expected: 24, actual: 23 })
        ));
    }

    #[test]
    fn test_zero_dims_rejected() {
        assert!(matches!(
            RasterImage::zeros(Dims::new(0, 10), PixelFormat::GRAY8),
            Err(RasterError::ZeroDimension { .. })
        ));
    }

    #[test]
    fn test_from_fn_and_sample() {
        let img = RasterImage::from_fn(Dims::new(3, 2), PixelFormat::RGB8, |x, y, c| {
            (x * 10 + y * 100 + c as u32) as f32
        })
        .unwrap();
        assert_eq!(img.sample(2, 1, 2), 122.0);
        assert_eq!(img.sample(0, 0, 1), 1.0);
    }

    #[test]
    fn test_from_fn_clamps_u8() {
        let img = RasterImage::from_fn(Dims::new(1, 1), PixelFormat::GRAY8, |_, _, _| 300.0).unwrap();
        assert_eq!(img.as_bytes(), &[255]);
    }

    #[test]
    fn test_f32_samples() {
        let fmt = PixelFormat::new(1, BitDepth::F32).unwrap();
        let img = RasterImage::from_fn(Dims::new(2, 1), fmt, |x, _, _| x as f32 * 0.25).unwrap();
        assert_eq!(img.size_bytes(), 8);
        assert_eq!(img.sample(1, 0, 0), 0.25);
    }
}
