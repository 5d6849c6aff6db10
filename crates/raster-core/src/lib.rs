// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # raster-core
//!
//! Raster types and resampling kernels shared by every execution lane of the
//! upscaling engine.
//!
//! This crate provides:
//! - [`RasterImage`]: an owned, row-major, interleaved pixel buffer used at
//!   the engine boundary (decoder in, encoder out).
//! - [`Dims`]: image dimensions plus the single rounding policy used for
//!   every scaled dimension in the workspace.
//! - [`PixelFormat`] / [`BitDepth`]: channel count and sample depth.
//! - [`ResampleKernel`] and [`ResamplePlan`]: separable bilinear, bicubic
//!   and Lanczos resampling that can be evaluated band by band.
//!
//! # Determinism
//! [`ResamplePlan::resample_band`] produces bit-identical rows no matter how
//! the output is split into bands. The CPU lane tiles the output across
//! worker threads and the emulated GPU device processes it in fixed bands;
//! both produce the same bytes as a single full-frame pass.

mod dims;
mod error;
mod format;
mod image;
mod ops;

pub use dims::{round_half_up, Dims};
pub use error::RasterError;
pub use format::{BitDepth, PixelFormat};
pub use image::RasterImage;
pub use ops::{decode_samples, encode_samples, resample, AxisWeights, ResampleKernel, ResamplePlan};
