// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Scale plan: the output of the scale planner.
//!
//! A plan is an ordered sequence of [`Stage`]s. Each stage reads the
//! previous stage's output (or the source), resamples it by one multiplier
//! on one lane, and hands the result on. The plan is the contract between
//! the planner and the orchestrator.

use crate::{Lane, PlannerError};
use raster_core::{Dims, PixelFormat};

/// Relative tolerance for the product of stage multipliers.
pub const FACTOR_TOLERANCE: f64 = 0.005;

/// One resampling pass.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Stage {
    /// Position of this stage in the session, counting completed stages.
    pub index: usize,
    /// Scale applied by this stage; `1.0` for the identity stage.
    pub multiplier: f64,
    pub lane: Lane,
    pub input: Dims,
    pub output: Dims,
    /// Product of all multipliers up to and including this stage.
    pub cumulative_factor: f64,
    /// Planning estimate of the stage's peak memory.
    pub estimated_memory_bytes: u64,
}

impl Stage {
    /// Returns `true` if the stage copies its input unchanged.
    pub fn is_identity(&self) -> bool {
        self.input == self.output
    }
}

/// Planning estimate for a stage producing `output`:
/// `output_pixels × bytes_per_pixel × overhead`, saturating at `u64::MAX`.
pub fn estimate_stage_bytes(output: Dims, format: PixelFormat, overhead: f64) -> u64 {
    (output.size_bytes(format) as f64 * overhead).ceil() as u64
}

/// The complete plan produced by a [`crate::ScaleStrategy`].
#[derive(Debug, Clone, serde::Serialize)]
pub struct ScalePlan {
    /// Strategy name that produced this plan.
    pub strategy_name: String,
    pub source: Dims,
    pub format: PixelFormat,
    /// Effective target factor (at least `1.0`).
    pub target_factor: f64,
    pub target: Dims,
    /// Cumulative factor already reached before the first stage.
    pub start_factor: f64,
    pub stages: Vec<Stage>,
}

impl ScalePlan {
    pub fn num_stages(&self) -> usize {
        self.stages.len()
    }

    /// Returns `true` for a single pass-through stage.
    pub fn is_identity(&self) -> bool {
        self.stages.len() == 1 && self.stages[0].is_identity()
    }

    pub fn multipliers(&self) -> Vec<f64> {
        self.stages.iter().map(|s| s.multiplier).collect()
    }

    /// Number of stages assigned to `lane`.
    pub fn count_lane(&self, lane: Lane) -> usize {
        self.stages.iter().filter(|s| s.lane == lane).count()
    }

    /// Largest single-stage estimate.
    pub fn peak_estimate_bytes(&self) -> u64 {
        self.stages
            .iter()
            .map(|s| s.estimated_memory_bytes)
            .max()
            .unwrap_or(0)
    }

    /// Validates the plan.
    ///
    /// Checks:
    /// - Plan is non-empty.
    /// - Stage indices are consecutive.
    /// - Each stage reads the previous stage's output dims.
    /// - The last stage produces exactly the target dims.
    /// - `start_factor × Π multipliers` equals the target factor within
    ///   [`FACTOR_TOLERANCE`].
    pub fn validate(&self) -> Result<(), PlannerError> {
        let fail = |detail: String| PlannerError::StrategyFailed {
            strategy: self.strategy_name.clone(),
            detail,
        };

        let (first, last) = match (self.stages.first(), self.stages.last()) {
            (Some(f), Some(l)) => (f, l),
            _ => return Err(PlannerError::EmptyPlan),
        };

        let mut expected_index = first.index;
        let mut expected_input = first.input;
        for stage in &self.stages {
            if stage.index != expected_index {
                return Err(fail(format!(
                    "expected stage index {expected_index}, got {}",
                    stage.index
                )));
            }
            if stage.input != expected_input {
                return Err(fail(format!(
                    "stage {} reads {} but previous output is {}",
                    stage.index, stage.input, expected_input
                )));
            }
            if !(stage.multiplier.is_finite() && stage.multiplier >= 1.0) {
                return Err(fail(format!(
                    "stage {} has invalid multiplier {}",
                    stage.index, stage.multiplier
                )));
            }
            expected_index += 1;
            expected_input = stage.output;
        }

        if last.output != self.target {
            return Err(fail(format!(
                "final output {} does not match target {}",
                last.output, self.target
            )));
        }

        let product: f64 = self.start_factor * self.stages.iter().map(|s| s.multiplier).product::<f64>();
        let relative = (product - self.target_factor).abs() / self.target_factor;
        if relative > FACTOR_TOLERANCE {
            return Err(fail(format!(
                "multipliers reach {product:.4}, target is {:.4}",
                self.target_factor
            )));
        }

        Ok(())
    }

    /// Returns a human-readable summary of the plan.
    pub fn summary(&self) -> String {
        let peak_mb = self.peak_estimate_bytes() as f64 / (1024.0 * 1024.0);
        let steps: Vec<String> = self
            .stages
            .iter()
            .map(|s| format!("{:.3}x@{}", s.multiplier, s.lane))
            .collect();

        format!(
            "Plan '{}': {} → {} ({:.3}x), {} stages ({} gpu, {} cpu), peak estimate {:.2} MB, \
             stages: [{}]",
            self.strategy_name,
            self.source,
            self.target,
            self.target_factor,
            self.num_stages(),
            self.count_lane(Lane::Gpu),
            self.count_lane(Lane::Cpu),
            peak_mb,
            steps.join(", "),
        )
    }
}

/// Builder helper for constructing a `ScalePlan` stage by stage.
///
/// Used internally by strategy implementations.
pub(crate) struct PlanBuilder {
    strategy_name: String,
    source: Dims,
    format: PixelFormat,
    target_factor: f64,
    target: Dims,
    start_factor: f64,
    next_index: usize,
    cumulative: f64,
    current: Dims,
    stages: Vec<Stage>,
}

impl PlanBuilder {
    pub fn new(strategy_name: &str, request: &crate::PlanRequest) -> Self {
        Self {
            strategy_name: strategy_name.to_string(),
            source: request.source,
            format: request.format,
            target_factor: request.target_factor.max(1.0),
            target: request.target_dims(),
            start_factor: request.completed_factor,
            next_index: request.first_index,
            cumulative: request.completed_factor,
            current: request.current_dims(),
            stages: Vec::new(),
        }
    }

    /// Cumulative factor reached so far.
    pub fn cumulative(&self) -> f64 {
        self.cumulative
    }

    pub fn next_index(&self) -> usize {
        self.next_index
    }

    /// Output dims for a stage that reaches `cumulative`; exactly the
    /// target when `is_final`.
    pub fn output_for(&self, cumulative: f64, is_final: bool) -> Dims {
        if is_final {
            self.target
        } else {
            self.source.scaled(cumulative)
        }
    }

    /// Appends a stage.
    pub fn push(&mut self, multiplier: f64, lane: Lane, output: Dims, estimated_memory_bytes: u64) {
        self.cumulative *= multiplier;
        self.stages.push(Stage {
            index: self.next_index,
            multiplier,
            lane,
            input: self.current,
            output,
            cumulative_factor: self.cumulative,
            estimated_memory_bytes,
        });
        self.next_index += 1;
        self.current = output;
    }

    /// Consumes the builder and returns the plan.
    pub fn build(self) -> ScalePlan {
        ScalePlan {
            strategy_name: self.strategy_name,
            source: self.source,
            format: self.format,
            target_factor: self.target_factor,
            target: self.target,
            start_factor: self.start_factor,
            stages: self.stages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BudgetSnapshot, PlanRequest};

    fn request(factor: f64) -> PlanRequest {
        PlanRequest::new(
            Dims::new(100, 60),
            PixelFormat::RGB8,
            factor,
            BudgetSnapshot::new(None, u64::MAX, u64::MAX),
        )
    }

    fn sample_plan() -> ScalePlan {
        let req = request(3.0);
        let mut b = PlanBuilder::new("test", &req);
        let out = b.output_for(2.0, false);
        b.push(2.0, Lane::Gpu, out, 1000);
        let out = b.output_for(3.0, true);
        b.push(1.5, Lane::Cpu, out, 2000);
        b.build()
    }

    #[test]
    fn test_builder_chains_dims() {
        let plan = sample_plan();
        assert_eq!(plan.num_stages(), 2);
        assert_eq!(plan.stages[0].input, Dims::new(100, 60));
        assert_eq!(plan.stages[0].output, Dims::new(200, 120));
        assert_eq!(plan.stages[1].input, Dims::new(200, 120));
        assert_eq!(plan.stages[1].output, Dims::new(300, 180));
        assert!((plan.stages[1].cumulative_factor - 3.0).abs() < 1e-12);
        plan.validate().unwrap();
    }

    #[test]
    fn test_plan_serializes_to_json() {
        let json = serde_json::to_value(sample_plan()).unwrap();
        assert_eq!(json["strategy_name"], "test");
        assert_eq!(json["target"]["width"], 300);
        let stages = json["stages"].as_array().unwrap();
        assert_eq!(stages.len(), 2);
        assert_eq!(stages[0]["lane"], "gpu");
        assert_eq!(stages[1]["lane"], "cpu");
        assert_eq!(stages[1]["multiplier"], 1.5);
        assert_eq!(stages[1]["estimated_memory_bytes"], 2000);
    }

    #[test]
    fn test_validate_empty() {
        let mut plan = sample_plan();
        plan.stages.clear();
        assert!(matches!(plan.validate(), Err(PlannerError::EmptyPlan)));
    }

    #[test]
    fn test_validate_bad_product() {
        let mut plan = sample_plan();
        plan.stages[1].multiplier = 1.4;
        assert!(matches!(plan.validate(), Err(PlannerError::StrategyFailed { .. })));
    }

    #[test]
    fn test_validate_broken_chain() {
        let mut plan = sample_plan();
        plan.stages[1].input = Dims::new(201, 120);
        assert!(plan.validate().is_err());
    }

    #[test]
    fn test_validate_bad_index() {
        let mut plan = sample_plan();
        plan.stages[1].index = 5;
        assert!(plan.validate().is_err());
    }

    #[test]
    fn test_validate_wrong_target() {
        let mut plan = sample_plan();
        plan.stages[1].output = Dims::new(299, 180);
        assert!(plan.validate().is_err());
    }

    #[test]
    fn test_summary() {
        let s = sample_plan().summary();
        assert!(s.contains("'test'"));
        assert!(s.contains("2 stages (1 gpu, 1 cpu)"));
        assert!(s.contains("2.000x@gpu"));
        assert!(s.contains("100x60"));
    }

    #[test]
    fn test_estimate() {
        assert_eq!(estimate_stage_bytes(Dims::new(10, 10), PixelFormat::RGBA8, 2.25), 900);
        assert_eq!(estimate_stage_bytes(Dims::new(3, 1), PixelFormat::GRAY8, 1.5), 5);
        let huge = Dims::new(u32::MAX, u32::MAX);
        assert_eq!(estimate_stage_bytes(huge, PixelFormat::RGBA16, 2.25), u64::MAX);
    }

    #[test]
    fn test_helpers() {
        let plan = sample_plan();
        assert_eq!(plan.multipliers(), vec![2.0, 1.5]);
        assert_eq!(plan.peak_estimate_bytes(), 2000);
        assert!(!plan.is_identity());
    }
}
