// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Session profiling metrics.
//!
//! [`UpscaleMetrics`] collects per-stage timing and lane data plus the
//! fallback history of one session. These are the primary tool for
//! comparing strategies and budgets.

use raster_core::Dims;
use scale_planner::Lane;
use std::time::Duration;

/// Metrics for one executed stage attempt.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StageMetrics {
    pub index: usize,
    pub lane: Lane,
    pub multiplier: f64,
    pub input: Dims,
    pub output: Dims,
    pub duration: Duration,
    /// `"completed"`, `"recoverable"` or `"fatal"`.
    pub outcome: &'static str,
}

/// Aggregate metrics for one session.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct UpscaleMetrics {
    /// Strategy that produced the initial plan.
    pub strategy: String,
    /// Wall-clock time from submission to result.
    pub total_duration: Duration,
    /// Stages in the initial plan.
    pub planned_stages: usize,
    /// Every stage attempt, failed ones included.
    pub stages: Vec<StageMetrics>,
    /// GPU-to-CPU fallbacks.
    pub fallbacks: usize,
    /// Suffix replans.
    pub replans: usize,
    /// Stages moved to the CPU by the pressure check.
    pub pressure_downgrades: usize,
    /// Bytes freed by pressure-triggered reclamation.
    pub reclaimed_bytes: u64,
    pub peak_gpu_bytes: u64,
    pub peak_host_bytes: u64,
    /// `true` when the result is a preview.
    pub preview: bool,
}

impl UpscaleMetrics {
    pub fn new(strategy: &str) -> Self {
        Self {
            strategy: strategy.to_string(),
            ..Default::default()
        }
    }

    pub fn record_stage(&mut self, stage: StageMetrics) {
        self.stages.push(stage);
    }

    /// Completed stages on `lane`.
    pub fn completed_on(&self, lane: Lane) -> usize {
        self.stages
            .iter()
            .filter(|s| s.lane == lane && s.outcome == "completed")
            .count()
    }

    pub fn compute_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }

    /// Returns a human-readable summary suitable for CLI output.
    pub fn summary(&self) -> String {
        let mb = |b: u64| b as f64 / (1024.0 * 1024.0);
        format!(
            "Upscale: {:.2}ms total, {} stages ({} gpu, {} cpu), {:.2}ms compute, \
             {} fallbacks, {} replans, {} pressure downgrades, \
             peak gpu {:.2} MB, peak host {:.2} MB{}",
            self.total_duration.as_secs_f64() * 1000.0,
            self.completed_on(Lane::Gpu) + self.completed_on(Lane::Cpu),
            self.completed_on(Lane::Gpu),
            self.completed_on(Lane::Cpu),
            self.compute_duration().as_secs_f64() * 1000.0,
            self.fallbacks,
            self.replans,
            self.pressure_downgrades,
            mb(self.peak_gpu_bytes),
            mb(self.peak_host_bytes),
            if self.preview { " (preview)" } else { "" },
        )
    }
}
