// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Decode and encode at the pipeline edges via the `image` crate.
//!
//! Only these two functions touch file formats; the engine itself works on
//! [`RasterImage`]s.

use crate::UpscaleError;
use image::{DynamicImage, ImageBuffer};
use raster_core::{BitDepth, Dims, PixelFormat, RasterImage};
use std::path::Path;

/// Decodes an image file into a [`RasterImage`].
pub fn decode_file(path: &Path) -> Result<RasterImage, UpscaleError> {
    let img = image::open(path).map_err(|e| UpscaleError::Codec(format!("{}: {e}", path.display())))?;
    from_dynamic(img)
}

/// Encodes `image` to `path`; the format follows the file extension.
pub fn encode_file(image: &RasterImage, path: &Path) -> Result<(), UpscaleError> {
    to_dynamic(image)?
        .save(path)
        .map_err(|e| UpscaleError::Codec(format!("{}: {e}", path.display())))
}

fn u16_bytes(samples: Vec<u16>) -> Vec<u8> {
    samples.into_iter().flat_map(u16::to_ne_bytes).collect()
}

fn f32_bytes(samples: Vec<f32>) -> Vec<u8> {
    samples.into_iter().flat_map(f32::to_ne_bytes).collect()
}

/// Converts a decoded image, keeping its channel count and bit depth where
/// the engine supports them.
pub fn from_dynamic(img: DynamicImage) -> Result<RasterImage, UpscaleError> {
    let dims = Dims::new(img.width(), img.height());
    let (format, pixels) = match img {
        DynamicImage::ImageLuma8(b) => (PixelFormat::GRAY8, b.into_raw()),
        DynamicImage::ImageLumaA8(b) => (PixelFormat::new(2, BitDepth::U8)?, b.into_raw()),
        DynamicImage::ImageRgb8(b) => (PixelFormat::RGB8, b.into_raw()),
        DynamicImage::ImageRgba8(b) => (PixelFormat::RGBA8, b.into_raw()),
        DynamicImage::ImageLuma16(b) => (PixelFormat::new(1, BitDepth::U16)?, u16_bytes(b.into_raw())),
        DynamicImage::ImageLumaA16(b) => (PixelFormat::new(2, BitDepth::U16)?, u16_bytes(b.into_raw())),
        DynamicImage::ImageRgb16(b) => (PixelFormat::new(3, BitDepth::U16)?, u16_bytes(b.into_raw())),
        DynamicImage::ImageRgba16(b) => (PixelFormat::RGBA16, u16_bytes(b.into_raw())),
        DynamicImage::ImageRgb32F(b) => (PixelFormat::new(3, BitDepth::F32)?, f32_bytes(b.into_raw())),
        DynamicImage::ImageRgba32F(b) => (PixelFormat::RGBA32F, f32_bytes(b.into_raw())),
        other => (PixelFormat::RGBA8, other.to_rgba8().into_raw()),
    };
    Ok(RasterImage::new(dims, format, pixels)?)
}

fn u16_samples(bytes: &[u8]) -> Vec<u16> {
    bytes.chunks_exact(2).map(|c| u16::from_ne_bytes([c[0], c[1]])).collect()
}

fn f32_samples(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn mismatch(image: &RasterImage) -> UpscaleError {
    UpscaleError::Codec(format!("buffer does not match {} {}", image.dims(), image.format()))
}

/// Converts a [`RasterImage`] into an `image` crate buffer.
pub fn to_dynamic(image: &RasterImage) -> Result<DynamicImage, UpscaleError> {
    let Dims { width: w, height: h } = image.dims();
    let bytes = image.as_bytes();
    let format = image.format();
    let dynamic = match (format.channels(), format.depth()) {
        (1, BitDepth::U8) => ImageBuffer::from_raw(w, h, bytes.to_vec()).map(DynamicImage::ImageLuma8),
        (2, BitDepth::U8) => ImageBuffer::from_raw(w, h, bytes.to_vec()).map(DynamicImage::ImageLumaA8),
        (3, BitDepth::U8) => ImageBuffer::from_raw(w, h, bytes.to_vec()).map(DynamicImage::ImageRgb8),
        (4, BitDepth::U8) => ImageBuffer::from_raw(w, h, bytes.to_vec()).map(DynamicImage::ImageRgba8),
        (1, BitDepth::U16) => ImageBuffer::from_raw(w, h, u16_samples(bytes)).map(DynamicImage::ImageLuma16),
        (2, BitDepth::U16) => ImageBuffer::from_raw(w, h, u16_samples(bytes)).map(DynamicImage::ImageLumaA16),
        (3, BitDepth::U16) => ImageBuffer::from_raw(w, h, u16_samples(bytes)).map(DynamicImage::ImageRgb16),
        (4, BitDepth::U16) => ImageBuffer::from_raw(w, h, u16_samples(bytes)).map(DynamicImage::ImageRgba16),
        (3, BitDepth::F32) => ImageBuffer::from_raw(w, h, f32_samples(bytes)).map(DynamicImage::ImageRgb32F),
        (4, BitDepth::F32) => ImageBuffer::from_raw(w, h, f32_samples(bytes)).map(DynamicImage::ImageRgba32F),
        (c, d) => {
            return Err(UpscaleError::Codec(format!(
                "no encoder layout for {c} channels of {}",
                d.as_str()
            )))
        }
    };
    dynamic.ok_or_else(|| mismatch(image))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(format: PixelFormat) -> RasterImage {
        RasterImage::from_fn(Dims::new(7, 5), format, |x, y, c| (x * 30 + y * 10 + c as u32 * 3) as f32).unwrap()
    }

    #[test]
    fn test_png_roundtrip_rgb8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("img.png");
        let img = gradient(PixelFormat::RGB8);
        encode_file(&img, &path).unwrap();
        assert_eq!(decode_file(&path).unwrap(), img);
    }

    #[test]
    fn test_png_roundtrip_rgba16() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("img16.png");
        let img = gradient(PixelFormat::RGBA16);
        encode_file(&img, &path).unwrap();
        assert_eq!(decode_file(&path).unwrap(), img);
    }

    #[test]
    fn test_gray_f32_has_no_layout() {
        let img = gradient(PixelFormat::new(1, BitDepth::F32).unwrap());
        assert!(matches!(to_dynamic(&img), Err(UpscaleError::Codec(_))));
    }

    #[test]
    fn test_missing_file_is_codec_error() {
        let err = decode_file(Path::new("/nonexistent/input.png")).unwrap_err();
        assert!(matches!(err, UpscaleError::Codec(_)));
    }
}
