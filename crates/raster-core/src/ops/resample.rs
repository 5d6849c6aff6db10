// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Separable two-pass resampling, evaluated one band of output rows at a time.

use super::{read_sample, write_sample, AxisWeights, ResampleKernel};
use crate::{Dims, PixelFormat, RasterError, RasterImage};
use std::ops::Range;

/// Precomputed horizontal and vertical weights for one `src → dst` resize.
///
/// A plan is cheap to share between threads. Each call to
/// [`ResamplePlan::resample_band`] needs only the source rows that feed the
/// requested output rows, so callers can bound working memory by choosing
/// the band height.
#[derive(Debug, Clone)]
pub struct ResamplePlan {
    src: Dims,
    dst: Dims,
    format: PixelFormat,
    kernel: ResampleKernel,
    horizontal: AxisWeights,
    vertical: AxisWeights,
}

impl ResamplePlan {
    pub fn new(
        src: Dims,
        dst: Dims,
        format: PixelFormat,
        kernel: ResampleKernel,
    ) -> Result<Self, RasterError> {
        for d in [src, dst] {
            if d.is_empty() {
                return Err(RasterError::ZeroDimension { width: d.width, height: d.height });
            }
        }
        Ok(Self {
            src,
            dst,
            format,
            kernel,
            horizontal: AxisWeights::new(src.width, dst.width, kernel),
            vertical: AxisWeights::new(src.height, dst.height, kernel),
        })
    }

    pub fn src(&self) -> Dims {
        self.src
    }

    pub fn dst(&self) -> Dims {
        self.dst
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn kernel(&self) -> ResampleKernel {
        self.kernel
    }

    /// Column weights of the horizontal pass.
    pub fn horizontal(&self) -> &AxisWeights {
        &self.horizontal
    }

    /// Row weights of the vertical pass.
    pub fn vertical(&self) -> &AxisWeights {
        &self.vertical
    }

    /// Bytes in one destination row.
    pub fn dst_row_bytes(&self) -> usize {
        self.dst.row_bytes(self.format)
    }

    /// Source rows read while producing destination `rows`.
    pub fn src_rows_for(&self, rows: Range<u32>) -> Range<u32> {
        let mut lo = u32::MAX;
        let mut hi = 0u32;
        for y in rows {
            let (start, ws) = self.vertical.span(y as usize);
            lo = lo.min(start);
            hi = hi.max(start + ws.len() as u32);
        }
        if lo > hi {
            0..0
        } else {
            lo..hi
        }
    }

    /// Intermediate `f32` bytes needed to produce destination `rows`.
    pub fn scratch_bytes_for(&self, rows: Range<u32>) -> u64 {
        let src_rows = self.src_rows_for(rows);
        (src_rows.end - src_rows.start) as u64
            * self.dst.width as u64
            * self.format.channels() as u64
            * 4
    }

    /// Worst-case scratch over all bands of `band_rows` output rows.
    pub fn max_band_scratch_bytes(&self, band_rows: u32) -> u64 {
        let band_rows = band_rows.max(1);
        let mut worst = 0u64;
        let mut y = 0u32;
        while y < self.dst.height {
            let end = (y + band_rows).min(self.dst.height);
            worst = worst.max(self.scratch_bytes_for(y..end));
            y = end;
        }
        worst
    }

    /// Resamples destination `rows` from the full source `src` into `out`.
    ///
    /// `out` must hold exactly `rows.len()` destination rows. The result is
    /// independent of how the destination is split into bands.
    pub fn resample_band(
        &self,
        src: &[u8],
        rows: Range<u32>,
        out: &mut [u8],
    ) -> Result<(), RasterError> {
        let expected_src = self.src.size_bytes(self.format) as usize;
        if src.len() != expected_src {
            return Err(RasterError::BufferSizeMismatch { expected: expected_src, actual: src.len() });
        }
        if rows.start > rows.end || rows.end > self.dst.height {
            return Err(RasterError::BandOutOfRange {
                start: rows.start,
                end: rows.end,
                height: self.dst.height,
            });
        }
        let expected_out = (rows.end - rows.start) as usize * self.dst_row_bytes();
        if out.len() != expected_out {
            return Err(RasterError::BufferSizeMismatch { expected: expected_out, actual: out.len() });
        }
        if rows.is_empty() {
            return Ok(());
        }

        let channels = self.format.channels() as usize;
        let depth = self.format.depth();
        let src_w = self.src.width as usize;
        let dst_w = self.dst.width as usize;
        let tmp_row = dst_w * channels;

        // Horizontal pass over only the source rows this band needs.
        let src_rows = self.src_rows_for(rows.clone());
        let mut tmp = vec![0f32; (src_rows.end - src_rows.start) as usize * tmp_row];
        for (r, sy) in src_rows.clone().enumerate() {
            let row_base = sy as usize * src_w * channels;
            let tmp_base = r * tmp_row;
            for x in 0..dst_w {
                let (start, ws) = self.horizontal.span(x);
                for c in 0..channels {
                    let mut acc = 0f32;
                    for (k, w) in ws.iter().enumerate() {
                        let idx = row_base + (start as usize + k) * channels + c;
                        acc += w * read_sample(src, idx, depth);
                    }
                    tmp[tmp_base + x * channels + c] = acc;
                }
            }
        }

        // Vertical pass into the output band.
        for (r, y) in rows.enumerate() {
            let (start, ws) = self.vertical.span(y as usize);
            let first = (start - src_rows.start) as usize;
            let out_base = r * tmp_row;
            for i in 0..tmp_row {
                let mut acc = 0f32;
                for (k, w) in ws.iter().enumerate() {
                    acc += w * tmp[(first + k) * tmp_row + i];
                }
                write_sample(out, out_base + i, depth, acc);
            }
        }
        Ok(())
    }

    /// Resamples the whole destination in one band.
    pub fn resample_all(&self, src: &[u8]) -> Result<Vec<u8>, RasterError> {
        let mut out = vec![0u8; self.dst.size_bytes(self.format) as usize];
        self.resample_band(src, 0..self.dst.height, &mut out)?;
        Ok(out)
    }
}

/// Resizes `image` to `dst` with `kernel` in a single pass.
pub fn resample(
    image: &RasterImage,
    dst: Dims,
    kernel: ResampleKernel,
) -> Result<RasterImage, RasterError> {
    let plan = ResamplePlan::new(image.dims(), dst, image.format(), kernel)?;
    let pixels = plan.resample_all(image.as_bytes())?;
    RasterImage::new(dst, image.format(), pixels)
}
