// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Planner inputs: what to scale, from where, and with how much memory.

use memory_manager::UsageSnapshot;
use raster_core::{Dims, PixelFormat};
use std::fmt;

/// Execution lane for one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lane {
    Gpu,
    Cpu,
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lane::Gpu => f.write_str("gpu"),
            Lane::Cpu => f.write_str("cpu"),
        }
    }
}

/// Which lanes the planner may assign.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LanePolicy {
    /// Use the GPU whenever a stage fits its headroom.
    #[default]
    GpuPreferred,
    /// Never assign the GPU lane.
    CpuOnly,
}

/// Memory available to the planner at the time of the call.
///
/// Headroom is `limit − reserved`: idle pool entries count as available
/// because they can be reclaimed before the stage runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct BudgetSnapshot {
    /// GPU headroom, or `None` if there is no usable GPU.
    pub gpu_headroom: Option<u64>,
    pub host_headroom: u64,
    /// Host ceiling, used for the 1× feasibility check.
    pub host_limit: u64,
}

impl BudgetSnapshot {
    pub fn new(gpu_headroom: Option<u64>, host_headroom: u64, host_limit: u64) -> Self {
        Self {
            gpu_headroom,
            host_headroom,
            host_limit,
        }
    }

    /// Builds a snapshot from tracker usage.
    pub fn from_usage(gpu: Option<&UsageSnapshot>, host: &UsageSnapshot) -> Self {
        Self {
            gpu_headroom: gpu.map(UsageSnapshot::headroom_bytes),
            host_headroom: host.headroom_bytes(),
            host_limit: host.limit_bytes,
        }
    }

    /// Headroom of `lane`; `None` if the lane is unavailable.
    pub fn headroom(&self, lane: Lane) -> Option<u64> {
        match lane {
            Lane::Gpu => self.gpu_headroom,
            Lane::Cpu => Some(self.host_headroom),
        }
    }
}

/// A request for a full plan or for the remaining suffix of one.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanRequest {
    pub source: Dims,
    pub format: PixelFormat,
    pub target_factor: f64,
    /// Cumulative factor already produced by completed stages.
    pub completed_factor: f64,
    /// Index given to the first planned stage.
    pub first_index: usize,
    pub budget: BudgetSnapshot,
    pub policy: LanePolicy,
}

impl PlanRequest {
    /// A request for a complete plan starting from the source image.
    pub fn new(source: Dims, format: PixelFormat, target_factor: f64, budget: BudgetSnapshot) -> Self {
        Self {
            source,
            format,
            target_factor,
            completed_factor: 1.0,
            first_index: 0,
            budget,
            policy: LanePolicy::GpuPreferred,
        }
    }

    /// Plans only the stages after `completed_stages` stages that together
    /// reached `completed_factor`.
    pub fn resume_from(mut self, completed_factor: f64, completed_stages: usize) -> Self {
        self.completed_factor = completed_factor;
        self.first_index = completed_stages;
        self
    }

    pub fn with_policy(mut self, policy: LanePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// `true` if this request continues a partially executed plan.
    pub fn is_suffix(&self) -> bool {
        self.first_index > 0
    }

    /// Dimensions of the image the first planned stage reads.
    pub fn current_dims(&self) -> Dims {
        if self.first_index == 0 {
            self.source
        } else {
            self.source.scaled(self.completed_factor)
        }
    }

    /// Final output dimensions.
    pub fn target_dims(&self) -> Dims {
        if self.target_factor <= 1.0 {
            self.source
        } else {
            self.source.scaled(self.target_factor)
        }
    }

    /// Lanes the planner may try, in preference order.
    pub(crate) fn lanes(&self) -> &'static [Lane] {
        match (self.policy, self.budget.gpu_headroom) {
            (LanePolicy::GpuPreferred, Some(_)) => &[Lane::Gpu, Lane::Cpu],
            _ => &[Lane::Cpu],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memory_manager::Resource;

    #[test]
    fn test_from_usage() {
        let gpu = UsageSnapshot {
            resource: Resource::Gpu,
            limit_bytes: 1000,
            reserved_bytes: 300,
            pooled_bytes: 200,
        };
        let host = UsageSnapshot {
            resource: Resource::Host,
            limit_bytes: 10_000,
            reserved_bytes: 1_000,
            pooled_bytes: 0,
        };
        let snap = BudgetSnapshot::from_usage(Some(&gpu), &host);
        assert_eq!(snap.gpu_headroom, Some(700));
        assert_eq!(snap.headroom(Lane::Cpu), Some(9_000));
        assert_eq!(snap.host_limit, 10_000);

        let no_gpu = BudgetSnapshot::from_usage(None, &host);
        assert_eq!(no_gpu.headroom(Lane::Gpu), None);
    }

    #[test]
    fn test_lanes() {
        let budget = BudgetSnapshot::new(Some(1), 1, 1);
        let req = PlanRequest::new(Dims::new(10, 10), PixelFormat::RGB8, 2.0, budget);
        assert_eq!(req.lanes(), &[Lane::Gpu, Lane::Cpu]);
        assert_eq!(req.clone().with_policy(LanePolicy::CpuOnly).lanes(), &[Lane::Cpu]);

        let no_gpu = PlanRequest::new(Dims::new(10, 10), PixelFormat::RGB8, 2.0, BudgetSnapshot::new(None, 1, 1));
        assert_eq!(no_gpu.lanes(), &[Lane::Cpu]);
    }

    #[test]
    fn test_dims() {
        let budget = BudgetSnapshot::new(None, 1, 1);
        let req = PlanRequest::new(Dims::new(100, 50), PixelFormat::RGB8, 3.0, budget);
        assert_eq!(req.current_dims(), Dims::new(100, 50));
        assert_eq!(req.target_dims(), Dims::new(300, 150));

        let resumed = req.resume_from(1.5, 1);
        assert!(resumed.is_suffix());
        assert_eq!(resumed.current_dims(), Dims::new(150, 75));
    }
}
