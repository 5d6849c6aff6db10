// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Subcommands and the helpers they share.

pub mod plan;
pub mod run;
pub mod status;

use crate::HardwareArgs;
use anyhow::Context;
use hardware_profile::HardwareProfile;
use memory_manager::MemoryBudget;
use runtime::EngineConfig;
use stage_exec::{GpuDevice, SoftwareDevice};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Device backing the GPU lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DeviceKind {
    /// No GPU lane.
    None,
    /// Emulated device running the shared resampling kernel on the host.
    Software,
    /// Hardware adapter through wgpu (requires the `wgpu` feature).
    Wgpu,
}

/// Installs the global subscriber. `RUST_LOG` wins over `-v`.
pub fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose >= 3)
        .init();
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("failed to load config from '{}'", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

fn parse_budget(value: &str) -> anyhow::Result<u64> {
    MemoryBudget::parse(value)
        .map(|b| b.as_bytes())
        .map_err(|e| anyhow::anyhow!("invalid budget '{value}': {e}"))
}

/// Builds the hardware profile and, if requested, the GPU device.
pub fn hardware(args: &HardwareArgs) -> anyhow::Result<(HardwareProfile, Option<Arc<dyn GpuDevice>>)> {
    let mut profile = match &args.host_memory {
        Some(host) => {
            let cores = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
            HardwareProfile::cpu_only(parse_budget(host)?, cores)
        }
        None => HardwareProfile::detect_host().context("could not detect host memory; pass --host-memory")?,
    };
    if let Some(cores) = args.cores {
        profile.cpu_core_count = cores;
    }

    let Some(gpu) = &args.gpu_memory else {
        return Ok((profile, None));
    };
    let device: Option<Arc<dyn GpuDevice>> = match args.device {
        DeviceKind::None => None,
        DeviceKind::Software => Some(Arc::new(SoftwareDevice::new())),
        DeviceKind::Wgpu => Some(wgpu_device()?),
    };
    if device.is_some() {
        profile = profile.with_gpu(parse_budget(gpu)?);
    }
    Ok((profile, device))
}

#[cfg(feature = "wgpu")]
fn wgpu_device() -> anyhow::Result<Arc<dyn GpuDevice>> {
    let device = stage_exec::WgpuDevice::new().context("failed to open a wgpu adapter")?;
    Ok(Arc::new(device))
}

#[cfg(not(feature = "wgpu"))]
fn wgpu_device() -> anyhow::Result<Arc<dyn GpuDevice>> {
    anyhow::bail!("this build has no wgpu support; rebuild with `--features wgpu` or use --device software")
}

pub(crate) fn mb(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}
