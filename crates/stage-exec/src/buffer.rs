// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Pooled image buffers passed between stages.

use crate::ExecError;
use memory_manager::{BufferPool, PooledBuffer, Resource};
use raster_core::{Dims, PixelFormat, RasterError, RasterImage};

/// Host pool used for every engine-visible image buffer.
pub type HostPool = BufferPool<Vec<u8>>;

/// An image whose pixels live in a pooled, budget-tracked block.
///
/// Exactly one stage owns an `ImageBuffer` at a time; executors take it by
/// value and either return a new buffer or hand the input back. Dropping it
/// parks the block in its pool.
#[derive(Debug)]
pub struct ImageBuffer {
    dims: Dims,
    format: PixelFormat,
    data: PooledBuffer<Vec<u8>>,
}

impl ImageBuffer {
    /// Acquires a zeroed buffer for `dims` × `format` from `pool`.
    pub fn allocate(dims: Dims, format: PixelFormat, pool: &HostPool) -> Result<Self, ExecError> {
        if dims.is_empty() {
            return Err(RasterError::ZeroDimension {
                width: dims.width,
                height: dims.height,
            }
            .into());
        }
        let data = pool.acquire(dims.size_bytes(format))?;
        Ok(Self { dims, format, data })
    }

    /// Copies a boundary raster into a pooled buffer.
    pub fn from_raster(image: &RasterImage, pool: &HostPool) -> Result<Self, ExecError> {
        let mut buffer = Self::allocate(image.dims(), image.format(), pool)?;
        buffer.as_bytes_mut().copy_from_slice(image.as_bytes());
        Ok(buffer)
    }

    /// Wraps an already acquired block.
    pub(crate) fn from_parts(dims: Dims, format: PixelFormat, data: PooledBuffer<Vec<u8>>) -> Self {
        Self { dims, format, data }
    }

    pub fn dims(&self) -> Dims {
        self.dims
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// The tracked resource holding the pixels.
    pub fn location(&self) -> Resource {
        self.data.resource()
    }

    /// Bytes charged to the tracker for this buffer.
    pub fn charged_bytes(&self) -> u64 {
        self.data.capacity_bytes()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.data.as_slice()
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        self.data.as_mut_slice()
    }

    /// Moves the pixels out of the pool and into a boundary raster.
    ///
    /// The reservation is released; the returned image is no longer tracked.
    pub fn into_raster(self) -> Result<RasterImage, RasterError> {
        let pixels = self.data.detach();
        RasterImage::new(self.dims, self.format, pixels)
    }
}
