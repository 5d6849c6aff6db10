// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for raster operations.

/// Errors that can occur when building or resampling rasters.
#[derive(Debug, thiserror::Error)]
pub enum RasterError {
    /// The provided buffer size does not match the dimensions and format.
    #[error("buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    /// Channel counts outside `1..=4` are not supported.
    #[error("unsupported channel count {0}; expected 1 to 4")]
    InvalidChannels(u8),

    /// One of the dimensions is zero.
    #[error("image dimensions must be non-zero, got {width}x{height}")]
    ZeroDimension { width: u32, height: u32 },

    /// A kernel name could not be parsed.
    #[error("unknown resampling kernel '{0}'; expected 'bilinear', 'bicubic' or 'lanczos3'")]
    UnknownKernel(String),

    /// A band request falls outside the destination image.
    #[error("row band {start}..{end} is outside destination height {height}")]
    BandOutOfRange { start: u32, end: u32, height: u32 },
}
