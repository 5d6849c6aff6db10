// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Scripted device failures for tests and drills.

use super::{DeviceMemory, DispatchJob, GpuDevice};
use crate::DeviceError;
use raster_core::{Dims, PixelFormat, ResampleKernel, ResamplePlan};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Failure to inject in place of a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    OutOfMemory,
    KernelCompile,
    DeviceLost,
}

impl Fault {
    fn to_error(self, job: &DispatchJob<'_>) -> DeviceError {
        match self {
            Fault::OutOfMemory => DeviceError::OutOfMemory {
                requested_bytes: job.plan.dst().size_bytes(job.plan.format()),
            },
            Fault::KernelCompile => {
                DeviceError::KernelCompileFailed(format!("injected at stage {}", job.stage_index))
            }
            Fault::DeviceLost => DeviceError::DeviceLost(format!("injected at stage {}", job.stage_index)),
        }
    }
}

#[derive(Debug, Default)]
struct Script {
    /// Dispatches seen so far, per session label.
    counts: HashMap<String, usize>,
    /// `(label, dispatch index) -> fault`.
    once: HashMap<(String, usize), Fault>,
    /// Faults raised on every dispatch for a label.
    always: HashMap<String, Fault>,
}

/// Wraps a device and fails selected dispatches.
///
/// Faults are keyed by session label and by the number of dispatches that
/// label has already issued, so concurrent sessions do not disturb each
/// other's scripts.
pub struct FaultInjector {
    inner: Arc<dyn GpuDevice>,
    name: String,
    script: Mutex<Script>,
}

impl FaultInjector {
    pub fn new(inner: Arc<dyn GpuDevice>) -> Self {
        let name = format!("{}+faults", inner.name());
        Self {
            inner,
            name,
            script: Mutex::new(Script::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fails the `at_dispatch`-th dispatch (zero-based) issued for `label`.
    pub fn inject(&self, label: &str, at_dispatch: usize, fault: Fault) {
        self.lock().once.insert((label.to_string(), at_dispatch), fault);
    }

    /// Fails every dispatch issued for `label`.
    pub fn inject_always(&self, label: &str, fault: Fault) {
        self.lock().always.insert(label.to_string(), fault);
    }

    /// Dispatches issued so far for `label`, failed ones included.
    pub fn dispatch_count(&self, label: &str) -> usize {
        self.lock().counts.get(label).copied().unwrap_or(0)
    }
}

impl GpuDevice for FaultInjector {
    fn name(&self) -> &str {
        &self.name
    }

    fn storage_bytes(&self, dims: Dims, format: PixelFormat) -> u64 {
        self.inner.storage_bytes(dims, format)
    }

    fn scratch_bytes(&self, plan: &ResamplePlan) -> u64 {
        self.inner.scratch_bytes(plan)
    }

    fn allocate(&self, bytes: u64) -> Result<Box<dyn DeviceMemory>, DeviceError> {
        self.inner.allocate(bytes)
    }

    fn prepare(&self, kernel: ResampleKernel) -> Result<(), DeviceError> {
        self.inner.prepare(kernel)
    }

    fn upload(&self, src: &[u8], format: PixelFormat, dst: &mut dyn DeviceMemory) -> Result<(), DeviceError> {
        self.inner.upload(src, format, dst)
    }

    fn dispatch(
        &self,
        job: &DispatchJob<'_>,
        src: &dyn DeviceMemory,
        dst: &mut dyn DeviceMemory,
    ) -> Result<(), DeviceError> {
        let fault = {
            let mut script = self.lock();
            let count = script.counts.entry(job.label.to_string()).or_insert(0);
            let index = *count;
            *count += 1;
            script
                .once
                .remove(&(job.label.to_string(), index))
                .or_else(|| script.always.get(job.label).copied())
        };
        if let Some(fault) = fault {
            tracing::debug!(session = job.label, stage = job.stage_index, ?fault, "injecting device fault");
            return Err(fault.to_error(job));
        }
        self.inner.dispatch(job, src, dst)
    }

    fn download(&self, src: &dyn DeviceMemory, format: PixelFormat, dst: &mut [u8]) -> Result<(), DeviceError> {
        self.inner.download(src, format, dst)
    }
}
