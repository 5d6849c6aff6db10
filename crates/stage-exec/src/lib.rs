// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # stage-exec
//!
//! Runs one planned resampling [`Stage`](scale_planner::Stage) on one lane.
//!
//! Both executors implement [`StageExecutor`] and return a tagged
//! [`StageOutcome`] instead of an error: the orchestrator decides from the
//! tag whether to continue, fall back to the CPU or abort the session.
//!
//! | Executor | Lane | Memory charged |
//! |---|---|---|
//! | [`CpuExecutor`] | CPU | host output + band scratch of tiles in flight |
//! | [`GpuExecutor`] | GPU | device input, output and scratch; host output |
//!
//! Image buffers between stages are [`ImageBuffer`]s drawn from the host
//! [`BufferPool`](memory_manager::BufferPool).

mod buffer;
mod cpu;
mod error;
mod executor;
pub mod gpu;
mod outcome;

pub use buffer::{HostPool, ImageBuffer};
pub use cpu::{CpuExecutor, DEFAULT_TILE_ROWS};
pub use error::{DeviceError, ExecError};
pub use executor::StageExecutor;
#[cfg(feature = "wgpu")]
pub use gpu::WgpuDevice;
pub use gpu::{
    DeviceMemory, DevicePool, DispatchJob, Fault, FaultInjector, GpuDevice, GpuExecutor,
    SoftwareDevice,
};
pub use outcome::{FailureReason, StageOutcome};

use memory_manager::{BufferPool, MemoryError, PoolBlock, Reservation};

/// Reserves working memory next to `pool`'s blocks, reclaiming idle blocks
/// once if the first attempt is rejected. Zero bytes reserve nothing.
pub(crate) fn reserve_scratch<B: PoolBlock>(
    pool: &BufferPool<B>,
    bytes: u64,
) -> Result<Option<Reservation>, MemoryError> {
    if bytes == 0 {
        return Ok(None);
    }
    match pool.tracker().try_reserve(bytes) {
        Ok(r) => Ok(Some(r)),
        Err(MemoryError::Rejected { .. }) if pool.idle_bytes() > 0 => {
            pool.reclaim();
            pool.tracker().try_reserve(bytes).map(Some)
        }
        Err(e) => Err(e),
    }
}
