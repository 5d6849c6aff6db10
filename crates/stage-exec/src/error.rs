// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for stage execution.

use raster_core::RasterError;

/// Failures reported by a [`GpuDevice`](crate::GpuDevice).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    /// The device could not allocate or run within its memory.
    #[error("device out of memory ({requested_bytes} bytes requested)")]
    OutOfMemory { requested_bytes: u64 },

    /// The resampling kernel could not be built for this device.
    #[error("kernel compilation failed: {0}")]
    KernelCompileFailed(String),

    /// The device stopped responding or was removed.
    #[error("device lost: {0}")]
    DeviceLost(String),

    /// A buffer handed to the device does not belong to it or has the wrong size.
    #[error("invalid device buffer: {0}")]
    InvalidBuffer(String),
}

/// Errors raised while constructing executors or buffers.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// The CPU worker pool could not be started.
    #[error("failed to build cpu worker pool: {0}")]
    ThreadPool(String),

    /// Reserving memory for a buffer failed.
    #[error(transparent)]
    Memory(#[from] memory_manager::MemoryError),

    /// A raster-level invariant was violated.
    #[error(transparent)]
    Raster(#[from] RasterError),
}
