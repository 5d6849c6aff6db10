// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! CPU lane: tiled resampling on a dedicated rayon pool.
//!
//! The destination is split into bands of `tile_rows` rows; each band is
//! produced independently from the shared source, so tiles run in parallel
//! and the result does not depend on the tile height. Only the band
//! scratch of the tiles in flight is charged to the host tracker.

use crate::{ExecError, FailureReason, HostPool, ImageBuffer, StageExecutor, StageOutcome};
use raster_core::{ResampleKernel, ResamplePlan};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use scale_planner::{Lane, Stage};
use tracing::{debug, warn};

/// Default number of destination rows per CPU tile.
pub const DEFAULT_TILE_ROWS: u32 = 64;

/// Executor for [`Lane::Cpu`] stages.
pub struct CpuExecutor {
    threads: ThreadPool,
    pool: HostPool,
    kernel: ResampleKernel,
    tile_rows: u32,
}

impl CpuExecutor {
    /// Builds an executor with `num_threads` workers (`None` = one per core).
    pub fn new(
        pool: HostPool,
        kernel: ResampleKernel,
        tile_rows: u32,
        num_threads: Option<usize>,
    ) -> Result<Self, ExecError> {
        let mut builder = ThreadPoolBuilder::new().thread_name(|i| format!("upscale-cpu-{i}"));
        if let Some(n) = num_threads {
            builder = builder.num_threads(n.max(1));
        }
        let threads = builder
            .build()
            .map_err(|e| ExecError::ThreadPool(e.to_string()))?;
        Ok(Self {
            threads,
            pool,
            kernel,
            tile_rows: tile_rows.max(1),
        })
    }

    pub fn num_threads(&self) -> usize {
        self.threads.current_num_threads()
    }

    pub fn tile_rows(&self) -> u32 {
        self.tile_rows
    }

    /// Host scratch charged while a stage with `plan` is running.
    pub fn scratch_bytes(&self, plan: &ResamplePlan) -> u64 {
        let tiles = plan.dst().height.div_ceil(self.tile_rows) as u64;
        let in_flight = tiles.min(self.num_threads() as u64).max(1);
        plan.max_band_scratch_bytes(self.tile_rows) * in_flight
    }
}

impl StageExecutor for CpuExecutor {
    fn lane(&self) -> Lane {
        Lane::Cpu
    }

    fn execute(&self, stage: &Stage, input: ImageBuffer, label: &str) -> StageOutcome {
        if input.dims() == stage.output {
            return StageOutcome::Completed(input);
        }
        if input.dims() != stage.input {
            return StageOutcome::Fatal {
                reason: FailureReason::Internal(format!(
                    "stage {} expects input {} but got {}",
                    stage.index,
                    stage.input,
                    input.dims()
                )),
            };
        }

        let format = input.format();
        let plan = match ResamplePlan::new(input.dims(), stage.output, format, self.kernel) {
            Ok(plan) => plan,
            Err(e) => return StageOutcome::Fatal { reason: FailureReason::Internal(e.to_string()) },
        };

        let out_bytes = stage.output.size_bytes(format);
        let data = match self.pool.acquire(out_bytes) {
            Ok(data) => data,
            Err(e) => {
                warn!(session = label, stage = stage.index, error = %e, "host output rejected");
                return StageOutcome::Fatal {
                    reason: FailureReason::HostOutOfMemory { requested_bytes: out_bytes },
                };
            }
        };
        let mut output = ImageBuffer::from_parts(stage.output, format, data);

        let scratch_bytes = self.scratch_bytes(&plan);
        let _scratch = match crate::reserve_scratch(&self.pool, scratch_bytes) {
            Ok(r) => r,
            Err(e) => {
                warn!(session = label, stage = stage.index, error = %e, "host scratch rejected");
                return StageOutcome::Fatal {
                    reason: FailureReason::HostOutOfMemory { requested_bytes: scratch_bytes },
                };
            }
        };

        debug!(
            session = label,
            stage = stage.index,
            from = %stage.input,
            to = %stage.output,
            tile_rows = self.tile_rows,
            scratch_bytes,
            "cpu stage"
        );

        let tile_rows = self.tile_rows;
        let height = stage.output.height;
        let chunk = tile_rows as usize * plan.dst_row_bytes();
        let src = input.as_bytes();
        let result = self.threads.install(|| {
            output
                .as_bytes_mut()
                .par_chunks_mut(chunk)
                .enumerate()
                .try_for_each(|(i, band)| {
                    let start = i as u32 * tile_rows;
                    let end = (start + tile_rows).min(height);
                    plan.resample_band(src, start..end, band)
                })
        });

        match result {
            Ok(()) => StageOutcome::Completed(output),
            Err(e) => StageOutcome::Fatal { reason: FailureReason::Internal(e.to_string()) },
        }
    }
}

impl std::fmt::Debug for CpuExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpuExecutor")
            .field("threads", &self.num_threads())
            .field("kernel", &self.kernel)
            .field("tile_rows", &self.tile_rows)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memory_manager::{BufferPool, MemoryBudget, MemoryTracker, PoolConfig, Resource, ResourceBudget};
    use raster_core::{resample, Dims, PixelFormat, RasterImage};

    fn host_pool(limit: u64) -> HostPool {
        let budget = ResourceBudget::new(MemoryBudget::from_bytes(limit), 1.0).unwrap();
        BufferPool::host(MemoryTracker::new(Resource::Host, budget), PoolConfig::default())
    }

    fn stage(input: Dims, output: Dims) -> Stage {
        Stage {
            index: 0,
            multiplier: output.width as f64 / input.width as f64,
            lane: Lane::Cpu,
            input,
            output,
            cumulative_factor: output.width as f64 / input.width as f64,
            estimated_memory_bytes: 0,
        }
    }

    fn gradient(dims: Dims) -> RasterImage {
        RasterImage::from_fn(dims, PixelFormat::RGB8, |x, y, c| ((x * 7 + y * 3 + c as u32 * 40) % 256) as f32)
            .unwrap()
    }

    #[test]
    fn test_matches_single_pass() {
        let pool = host_pool(64 << 20);
        let exec = CpuExecutor::new(pool.clone(), ResampleKernel::Lanczos3, 5, Some(3)).unwrap();
        let src = gradient(Dims::new(40, 30));
        let dst = Dims::new(80, 60);
        let expected = resample(&src, dst, ResampleKernel::Lanczos3).unwrap();

        let input = ImageBuffer::from_raster(&src, &pool).unwrap();
        let StageOutcome::Completed(out) = exec.execute(&stage(src.dims(), dst), input, "t") else {
            panic!("stage did not complete");
        };
        assert_eq!(out.dims(), dst);
        assert_eq!(out.into_raster().unwrap(), expected);
    }

    #[test]
    fn test_tile_height_does_not_change_result() {
        let pool = host_pool(64 << 20);
        let src = gradient(Dims::new(33, 17));
        let dst = Dims::new(50, 26);
        let mut results = Vec::new();
        for rows in [1, 7, 64] {
            let exec = CpuExecutor::new(pool.clone(), ResampleKernel::Bicubic, rows, Some(2)).unwrap();
            let input = ImageBuffer::from_raster(&src, &pool).unwrap();
            match exec.execute(&stage(src.dims(), dst), input, "t") {
                StageOutcome::Completed(out) => results.push(out.into_raster().unwrap()),
                other => panic!("unexpected {}", other.kind()),
            }
        }
        assert_eq!(results[0], results[1]);
        assert_eq!(results[1], results[2]);
    }

    #[test]
    fn test_identity_passes_through() {
        let pool = host_pool(1 << 20);
        let exec = CpuExecutor::new(pool.clone(), ResampleKernel::Bilinear, 8, Some(1)).unwrap();
        let src = gradient(Dims::new(10, 10));
        let input = ImageBuffer::from_raster(&src, &pool).unwrap();
        let outcome = exec.execute(&stage(src.dims(), src.dims()), input, "t");
        match outcome {
            StageOutcome::Completed(out) => assert_eq!(out.into_raster().unwrap(), src),
            other => panic!("unexpected {}", other.kind()),
        }
    }

    #[test]
    fn test_host_exhaustion_is_fatal() {
        // Room for the input only.
        let pool = host_pool(400);
        let exec = CpuExecutor::new(pool.clone(), ResampleKernel::Bilinear, 8, Some(1)).unwrap();
        let src = gradient(Dims::new(10, 10));
        let input = ImageBuffer::from_raster(&src, &pool).unwrap();
        let outcome = exec.execute(&stage(src.dims(), Dims::new(20, 20)), input, "t");
        assert!(matches!(
            outcome,
            StageOutcome::Fatal { reason: FailureReason::HostOutOfMemory { .. } }
        ));
        assert_eq!(pool.tracker().usage().reserved_bytes, 0);
    }

    #[test]
    fn test_scratch_released_after_stage() {
        let pool = host_pool(64 << 20);
        let exec = CpuExecutor::new(pool.clone(), ResampleKernel::Lanczos3, 4, Some(2)).unwrap();
        let src = gradient(Dims::new(16, 16));
        let input = ImageBuffer::from_raster(&src, &pool).unwrap();
        let out = match exec.execute(&stage(src.dims(), Dims::new(32, 32)), input, "t") {
            StageOutcome::Completed(out) => out,
            other => panic!("unexpected {}", other.kind()),
        };
        assert_eq!(pool.tracker().usage().reserved_bytes, out.charged_bytes());
        assert!(pool.tracker().stats().peak_committed_bytes > out.charged_bytes() + 768);
    }
}
