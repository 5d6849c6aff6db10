// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! GPU lane.
//!
//! The executor is written against the [`GpuDevice`] trait so the same
//! reservation and fallback logic drives every backend:
//!
//! - [`SoftwareDevice`]: in-process reference device, always available.
//! - [`FaultInjector`]: wraps another device and fails scripted dispatches.
//! - `WgpuDevice` (feature `wgpu`): WGSL compute shader on a real adapter.
//!
//! # Stage protocol
//! 1. Reserve device input, device output and device scratch.
//! 2. Acquire the host block that will receive the result.
//! 3. Compile (once), upload, dispatch, download.
//!
//! No pixels reach the device before every reservation has succeeded, so
//! a budget failure leaves no partial state behind. Device errors are
//! reported as recoverable and the input is handed back unchanged.

pub mod fault;
pub mod software;
#[cfg(feature = "wgpu")]
pub mod wgpu_backend;

pub use fault::{Fault, FaultInjector};
#[cfg(feature = "wgpu")]
pub use wgpu_backend::WgpuDevice;
pub use software::SoftwareDevice;

use crate::{DeviceError, FailureReason, HostPool, ImageBuffer, StageExecutor, StageOutcome};
use memory_manager::{BufferPool, MemoryTracker, PoolBlock, PoolConfig};
use raster_core::{Dims, PixelFormat, ResampleKernel, ResamplePlan};
use scale_planner::{Lane, Stage};
use std::any::Any;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A block of device memory owned by one [`GpuDevice`].
pub trait DeviceMemory: Send + 'static {
    /// Allocated size in bytes.
    fn size_bytes(&self) -> u64;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl PoolBlock for Box<dyn DeviceMemory> {
    // Device blocks are fully overwritten by the next upload or dispatch.
    fn reset(&mut self, _len: u64) {}
}

/// Pool of device blocks charged to the GPU tracker.
pub type DevicePool = BufferPool<Box<dyn DeviceMemory>>;

/// One resampling submission.
#[derive(Debug, Clone, Copy)]
pub struct DispatchJob<'a> {
    /// Session label the work belongs to.
    pub label: &'a str,
    /// Stage index within the session.
    pub stage_index: usize,
    pub plan: &'a ResamplePlan,
}

/// A compute device able to run one resampling pass.
///
/// Buffers passed to `upload`, `dispatch` and `download` come from
/// `allocate` on the same device and may be larger than requested.
pub trait GpuDevice: Send + Sync {
    /// Human-readable adapter name.
    fn name(&self) -> &str;

    /// Device bytes needed to hold an image of `dims` × `format`.
    fn storage_bytes(&self, dims: Dims, format: PixelFormat) -> u64;

    /// Extra device bytes needed while running `plan`.
    fn scratch_bytes(&self, plan: &ResamplePlan) -> u64;

    fn allocate(&self, bytes: u64) -> Result<Box<dyn DeviceMemory>, DeviceError>;

    /// Builds the resampling kernel. Called before every dispatch; devices
    /// cache the result.
    fn prepare(&self, kernel: ResampleKernel) -> Result<(), DeviceError>;

    fn upload(
        &self,
        src: &[u8],
        format: PixelFormat,
        dst: &mut dyn DeviceMemory,
    ) -> Result<(), DeviceError>;

    fn dispatch(
        &self,
        job: &DispatchJob<'_>,
        src: &dyn DeviceMemory,
        dst: &mut dyn DeviceMemory,
    ) -> Result<(), DeviceError>;

    fn download(
        &self,
        src: &dyn DeviceMemory,
        format: PixelFormat,
        dst: &mut [u8],
    ) -> Result<(), DeviceError>;
}

/// Builds a pool whose blocks are allocated on `device`.
pub fn device_pool(device: Arc<dyn GpuDevice>, tracker: MemoryTracker, config: PoolConfig) -> DevicePool {
    BufferPool::new(tracker, config, move |bytes| {
        device.allocate(bytes).map_err(|e| Box::new(e) as memory_manager::AllocError)
    })
}

fn failure_for(error: DeviceError) -> FailureReason {
    match error {
        DeviceError::OutOfMemory { requested_bytes } => FailureReason::GpuOutOfMemory { requested_bytes },
        DeviceError::KernelCompileFailed(msg) => FailureReason::KernelCompileFailed(msg),
        DeviceError::DeviceLost(msg) => FailureReason::DeviceLost(msg),
        DeviceError::InvalidBuffer(msg) => FailureReason::Internal(msg),
    }
}

/// Executor for [`Lane::Gpu`] stages.
pub struct GpuExecutor {
    device: Arc<dyn GpuDevice>,
    pool: DevicePool,
    host: HostPool,
    kernel: ResampleKernel,
}

impl GpuExecutor {
    pub fn new(
        device: Arc<dyn GpuDevice>,
        gpu_tracker: MemoryTracker,
        pool_config: PoolConfig,
        host: HostPool,
        kernel: ResampleKernel,
    ) -> Self {
        let pool = device_pool(Arc::clone(&device), gpu_tracker, pool_config);
        info!(device = device.name(), limit = pool.tracker().limit_bytes(), "GPU executor ready");
        Self {
            device,
            pool,
            host,
            kernel,
        }
    }

    pub fn device_name(&self) -> &str {
        self.device.name()
    }

    /// The pool of device blocks, for reclamation under pressure.
    pub fn device_pool(&self) -> &DevicePool {
        &self.pool
    }

    /// Device bytes a stage with `plan` will reserve.
    pub fn stage_device_bytes(&self, plan: &ResamplePlan) -> u64 {
        self.device.storage_bytes(plan.src(), plan.format())
            + self.device.storage_bytes(plan.dst(), plan.format())
            + self.device.scratch_bytes(plan)
    }

    fn run_on_device(
        &self,
        job: &DispatchJob<'_>,
        input: &ImageBuffer,
        dev_in: &mut dyn DeviceMemory,
        dev_out: &mut dyn DeviceMemory,
        output: &mut ImageBuffer,
    ) -> Result<(), DeviceError> {
        let format = input.format();
        self.device.prepare(self.kernel)?;
        self.device.upload(input.as_bytes(), format, dev_in)?;
        self.device.dispatch(job, dev_in, dev_out)?;
        self.device.download(dev_out, format, output.as_bytes_mut())
    }
}

impl StageExecutor for GpuExecutor {
    fn lane(&self) -> Lane {
        Lane::Gpu
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

        let in_bytes = self.device.storage_bytes(plan.src(), format);
        let out_bytes = self.device.storage_bytes(plan.dst(), format);
        let scratch_bytes = self.device.scratch_bytes(&plan);

        let mut dev_in = match self.pool.acquire(in_bytes) {
            Ok(b) => b,
            Err(e) => {
                debug!(session = label, stage = stage.index, error = %e, "device input rejected");
                return StageOutcome::Recoverable {
                    reason: FailureReason::GpuOutOfMemory { requested_bytes: in_bytes },
                    input,
                };
            }
        };
        let mut dev_out = match self.pool.acquire(out_bytes) {
            Ok(b) => b,
            Err(e) => {
                debug!(session = label, stage = stage.index, error = %e, "device output rejected");
                return StageOutcome::Recoverable {
                    reason: FailureReason::GpuOutOfMemory { requested_bytes: out_bytes },
                    input,
                };
            }
        };
        let _scratch = match crate::reserve_scratch(&self.pool, scratch_bytes) {
            Ok(r) => r,
            Err(e) => {
                debug!(session = label, stage = stage.index, error = %e, "device scratch rejected");
                return StageOutcome::Recoverable {
                    reason: FailureReason::GpuOutOfMemory { requested_bytes: scratch_bytes },
                    input,
                };
            }
        };

        let host_bytes = stage.output.size_bytes(format);
        let mut output = match self.host.acquire(host_bytes) {
            Ok(data) => ImageBuffer::from_parts(stage.output, format, data),
            Err(e) => {
                warn!(session = label, stage = stage.index, error = %e, "host output rejected");
                return StageOutcome::Fatal {
                    reason: FailureReason::HostOutOfMemory { requested_bytes: host_bytes },
                };
            }
        };

        debug!(
            session = label,
            stage = stage.index,
            device = self.device.name(),
            from = %stage.input,
            to = %stage.output,
            device_bytes = in_bytes + out_bytes + scratch_bytes,
            "gpu stage"
        );

        let job = DispatchJob { label, stage_index: stage.index, plan: &plan };
        match self.run_on_device(&job, &input, &mut **dev_in, &mut **dev_out, &mut output) {
            Ok(()) => StageOutcome::Completed(output),
            Err(e) => {
                warn!(session = label, stage = stage.index, error = %e, "gpu stage failed");
                let reason = failure_for(e);
                if matches!(reason, FailureReason::DeviceLost(_)) {
                    // Blocks from a lost device cannot be trusted for reuse.
                    drop(dev_in);
                    drop(dev_out);
                    self.pool.reclaim();
                }
                StageOutcome::Recoverable { reason, input }
            }
        }
    }
}

impl std::fmt::Debug for GpuExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuExecutor")
            .field("device", &self.device.name())
            .field("kernel", &self.kernel)
            .finish()
    }
}
