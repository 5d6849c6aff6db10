// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The hardware profile handed to the engine at construction.

use crate::{HostMemory, ProfileError};

/// Capabilities of the machine the engine runs on.
///
/// The engine never enumerates devices itself; whoever constructs it fills
/// in this profile, either by hand, from configuration, or with
/// [`HardwareProfile::detect_host`] plus a GPU size from the device layer.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct HardwareProfile {
    /// Device memory of the GPU lane in bytes (`0` when there is none).
    pub gpu_memory_bytes: u64,
    /// Host memory the engine may budget against, in bytes.
    pub host_memory_bytes: u64,
    /// Worker threads for the CPU lane.
    pub cpu_core_count: usize,
    /// Whether a GPU lane exists at all.
    pub gpu_available: bool,
}

impl HardwareProfile {
    /// A CPU-only profile.
    pub fn cpu_only(host_memory_bytes: u64, cpu_core_count: usize) -> Self {
        Self {
            gpu_memory_bytes: 0,
            host_memory_bytes,
            cpu_core_count,
            gpu_available: false,
        }
    }

    /// Returns a copy with a GPU lane of `gpu_memory_bytes`.
    pub fn with_gpu(mut self, gpu_memory_bytes: u64) -> Self {
        self.gpu_memory_bytes = gpu_memory_bytes;
        self.gpu_available = gpu_memory_bytes > 0;
        self
    }

    /// Detects host memory from `/proc/meminfo` and the core count from the
    /// standard library. The GPU lane is left disabled.
    ///
    /// Budgets against *available* rather than total memory, so other
    /// processes on the host keep their working set.
    pub fn detect_host() -> Result<Self, ProfileError> {
        let memory = HostMemory::read()?;
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        tracing::debug!(
            available_mb = memory.available_mb(),
            cores,
            "Detected host profile"
        );
        Ok(Self::cpu_only(memory.available_bytes, cores))
    }

    /// `true` if the GPU lane can be used.
    pub fn has_gpu(&self) -> bool {
        self.gpu_available && self.gpu_memory_bytes > 0
    }

    /// Checks that the profile can drive an engine.
    pub fn validate(&self) -> Result<(), ProfileError> {
        if self.host_memory_bytes == 0 {
            return Err(ProfileError::Invalid("host memory must be non-zero".into()));
        }
        if self.cpu_core_count == 0 {
            return Err(ProfileError::Invalid("cpu core count must be at least 1".into()));
        }
        if self.gpu_available && self.gpu_memory_bytes == 0 {
            return Err(ProfileError::Invalid(
                "gpu marked available with zero memory".into(),
            ));
        }
        Ok(())
    }

    /// Returns a human-readable summary.
    pub fn summary(&self) -> String {
        let gb = |b: u64| b as f64 / (1024.0 * 1024.0 * 1024.0);
        let gpu = if self.has_gpu() {
            format!("{:.2} GB", gb(self.gpu_memory_bytes))
        } else {
            "none".to_string()
        };
        format!(
            "GPU: {gpu} | Host: {:.2} GB | CPU cores: {}",
            gb(self.host_memory_bytes),
            self.cpu_core_count,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GB: u64 = 1024 * 1024 * 1024;

    #[test]
    fn test_builders() {
        let p = HardwareProfile::cpu_only(8 * GB, 4);
        assert!(!p.has_gpu());
        let p = p.with_gpu(3 * GB);
        assert!(p.has_gpu());
        assert_eq!(p.gpu_memory_bytes, 3 * GB);
        p.validate().unwrap();
    }

    #[test]
    fn test_validate() {
        assert!(HardwareProfile::cpu_only(0, 4).validate().is_err());
        assert!(HardwareProfile::cpu_only(GB, 0).validate().is_err());
        let bad = HardwareProfile {
            gpu_memory_bytes: 0,
            host_memory_bytes: GB,
            cpu_core_count: 1,
            gpu_available: true,
        };
        assert!(matches!(bad.validate(), Err(ProfileError::Invalid(_))));
    }

    #[test]
    fn test_summary() {
        let s = HardwareProfile::cpu_only(16 * GB, 8).with_gpu(3 * GB).summary();
        assert!(s.contains("GPU: 3.00 GB"));
        assert!(s.contains("Host: 16.00 GB"));
        assert!(s.contains("CPU cores: 8"));
        assert!(HardwareProfile::cpu_only(GB, 1).summary().contains("GPU: none"));
    }

    #[test]
    fn test_serde_toml() {
        let p = HardwareProfile::cpu_only(4 * GB, 2).with_gpu(GB);
        let text = toml::to_string(&p).unwrap();
        let back: HardwareProfile = toml::from_str(&text).unwrap();
        assert_eq!(back, p);
        let json = serde_json::to_string(&p).unwrap();
        assert!(json.contains("\"gpu_available\":true"));
    }

    #[test]
    fn test_detect_host() {
        if std::path::Path::new("/proc/meminfo").exists() {
            let p = HardwareProfile::detect_host().unwrap();
            assert!(p.host_memory_bytes > 0);
            assert!(p.cpu_core_count >= 1);
            assert!(!p.gpu_available);
        }
    }
}
