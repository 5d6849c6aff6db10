// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tagged results of running one stage.

use crate::ImageBuffer;
use std::fmt;

/// Why a stage did not complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// GPU memory could not be reserved or allocated.
    GpuOutOfMemory { requested_bytes: u64 },
    /// The GPU could not build the resampling kernel.
    KernelCompileFailed(String),
    /// The GPU was lost mid-session.
    DeviceLost(String),
    /// Host memory could not be reserved.
    HostOutOfMemory { requested_bytes: u64 },
    /// An invariant inside the executor was violated.
    Internal(String),
}

impl FailureReason {
    /// `true` for failures that mean the GPU is unusable for this session.
    pub fn disables_gpu(&self) -> bool {
        matches!(
            self,
            FailureReason::KernelCompileFailed(_) | FailureReason::DeviceLost(_)
        )
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::GpuOutOfMemory { requested_bytes } => {
                write!(f, "gpu out of memory ({requested_bytes} bytes)")
            }
            FailureReason::KernelCompileFailed(msg) => write!(f, "kernel compile failed: {msg}"),
            FailureReason::DeviceLost(msg) => write!(f, "device lost: {msg}"),
            FailureReason::HostOutOfMemory { requested_bytes } => {
                write!(f, "host out of memory ({requested_bytes} bytes)")
            }
            FailureReason::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

/// Result of [`StageExecutor::execute`](crate::StageExecutor::execute).
///
/// A recoverable failure hands the untouched input back so the orchestrator
/// can rerun the stage on another lane without redoing earlier work.
#[derive(Debug)]
pub enum StageOutcome {
    Completed(ImageBuffer),
    Recoverable {
        reason: FailureReason,
        input: ImageBuffer,
    },
    Fatal {
        reason: FailureReason,
    },
}

impl StageOutcome {
    /// Short label for logging and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            StageOutcome::Completed(_) => "completed",
            StageOutcome::Recoverable { .. } => "recoverable",
            StageOutcome::Fatal { .. } => "fatal",
        }
    }
}
