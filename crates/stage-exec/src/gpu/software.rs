// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! In-process reference device.
//!
//! Holds pixels in their native encoding and runs the same banded
//! resampler as the CPU lane on the calling thread. Results are therefore
//! bit-identical across lanes, which keeps fallback invisible in the
//! output.

use super::{DeviceMemory, DispatchJob, GpuDevice};
use crate::DeviceError;
use raster_core::{Dims, PixelFormat, ResampleKernel, ResamplePlan};
use std::any::Any;

const BAND_ROWS: u32 = 128;

#[derive(Debug)]
struct HostBlock(Vec<u8>);

impl DeviceMemory for HostBlock {
    fn size_bytes(&self) -> u64 {
        self.0.len() as u64
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn block(mem: &dyn DeviceMemory) -> Result<&HostBlock, DeviceError> {
    mem.as_any()
        .downcast_ref::<HostBlock>()
        .ok_or_else(|| DeviceError::InvalidBuffer("not a software device block".into()))
}

fn block_mut(mem: &mut dyn DeviceMemory) -> Result<&mut HostBlock, DeviceError> {
    mem.as_any_mut()
        .downcast_mut::<HostBlock>()
        .ok_or_else(|| DeviceError::InvalidBuffer("not a software device block".into()))
}

fn prefix(len: usize, available: usize) -> Result<usize, DeviceError> {
    if len > available {
        return Err(DeviceError::InvalidBuffer(format!(
            "block of {available} bytes cannot hold {len} bytes"
        )));
    }
    Ok(len)
}

/// Reference [`GpuDevice`] backed by host memory.
#[derive(Debug, Clone, Default)]
pub struct SoftwareDevice {
    name: String,
}

impl SoftwareDevice {
    pub fn new() -> Self {
        Self { name: "software".to_string() }
    }
}

impl GpuDevice for SoftwareDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn storage_bytes(&self, dims: Dims, format: PixelFormat) -> u64 {
        dims.size_bytes(format)
    }

    fn scratch_bytes(&self, plan: &ResamplePlan) -> u64 {
        plan.max_band_scratch_bytes(BAND_ROWS)
    }

    fn allocate(&self, bytes: u64) -> Result<Box<dyn DeviceMemory>, DeviceError> {
        let len = usize::try_from(bytes).map_err(|_| DeviceError::OutOfMemory { requested_bytes: bytes })?;
        Ok(Box::new(HostBlock(vec![0u8; len])))
    }

    fn prepare(&self, _kernel: ResampleKernel) -> Result<(), DeviceError> {
        Ok(())
    }

    fn upload(&self, src: &[u8], _format: PixelFormat, dst: &mut dyn DeviceMemory) -> Result<(), DeviceError> {
        let dst = block_mut(dst)?;
        let n = prefix(src.len(), dst.0.len())?;
        dst.0[..n].copy_from_slice(src);
        Ok(())
    }

    fn dispatch(
        &self,
        job: &DispatchJob<'_>,
        src: &dyn DeviceMemory,
        dst: &mut dyn DeviceMemory,
    ) -> Result<(), DeviceError> {
        let plan = job.plan;
        let src_len = prefix(plan.src().size_bytes(plan.format()) as usize, src.size_bytes() as usize)?;
        let src = &block(src)?.0[..src_len];
        let dst = block_mut(dst)?;
        let dst_len = prefix(plan.dst().size_bytes(plan.format()) as usize, dst.0.len())?;
        let out = &mut dst.0[..dst_len];
        let row_bytes = plan.dst_row_bytes();
        let height = plan.dst().height;

        let mut y = 0u32;
        while y < height {
            let end = (y + BAND_ROWS).min(height);
            let band = &mut out[y as usize * row_bytes..end as usize * row_bytes];
            plan.resample_band(src, y..end, band)
                .map_err(|e| DeviceError::InvalidBuffer(e.to_string()))?;
            y = end;
        }
        Ok(())
    }

    fn download(&self, src: &dyn DeviceMemory, _format: PixelFormat, dst: &mut [u8]) -> Result<(), DeviceError> {
        let src = block(src)?;
        let n = prefix(dst.len(), src.0.len())?;
        dst.copy_from_slice(&src.0[..n]);
        Ok(())
    }
}
