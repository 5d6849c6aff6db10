// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Direct single-stage strategy.
//!
//! Resamples straight to the target in one stage: on the GPU if the whole
//! output fits its headroom, otherwise on the CPU. There is no ladder and no
//! refinement.
//!
//! # When to use
//! - Small factors where one pass is cheaper than a chain.
//! - As a baseline when comparing plans.

use super::{estimate, fits_lane, preflight, ScaleStrategy};
use crate::plan::PlanBuilder;
use crate::{PlanRequest, PlannerError, ScalePlan};

/// One stage, straight to the target.
#[derive(Debug, Clone)]
pub struct DirectScale {
    overhead_factor: f64,
}

impl Default for DirectScale {
    fn default() -> Self {
        Self { overhead_factor: 2.25 }
    }
}

impl DirectScale {
    pub fn new(overhead_factor: f64) -> Self {
        Self { overhead_factor }
    }
}

impl ScaleStrategy for DirectScale {
    fn name(&self) -> &str {
        "direct"
    }

    fn plan(&self, request: &PlanRequest) -> Result<ScalePlan, PlannerError> {
        if let Some(plan) = preflight(self.name(), request)? {
            return Ok(plan);
        }

        let mut builder = PlanBuilder::new(self.name(), request);
        let multiplier = request.target_factor / builder.cumulative();
        let output = builder.output_for(request.target_factor, true);
        let est = estimate(request, output, self.overhead_factor);

        let lane = request
            .lanes()
            .iter()
            .copied()
            .find(|&lane| fits_lane(request, lane, output, est))
            .ok_or_else(|| PlannerError::InfeasibleScale {
                detail: format!("single stage to {output} needs {est} bytes, which fits no lane"),
            })?;

        builder.push(multiplier, lane, output, est);
        let plan = builder.build();
        plan.validate()?;
        tracing::info!(%lane, "Planned direct {} → {}", plan.source, plan.target);
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BudgetSnapshot, Lane};
    use raster_core::{Dims, PixelFormat};

    fn request(factor: f64, gpu: Option<u64>, host: u64) -> PlanRequest {
        PlanRequest::new(Dims::new(100, 100), PixelFormat::RGBA8, factor, BudgetSnapshot::new(gpu, host, host))
    }

    #[test]
    fn test_single_stage_on_gpu() {
        let p = DirectScale::default().plan(&request(4.0, Some(1 << 30), 1 << 30)).unwrap();
        assert_eq!(p.num_stages(), 1);
        assert_eq!(p.stages[0].lane, Lane::Gpu);
        assert_eq!(p.stages[0].multiplier, 4.0);
        assert_eq!(p.target, Dims::new(400, 400));
    }

    #[test]
    fn test_falls_back_to_cpu() {
        // 400x400x4x2.25 = 1.44 MB; the GPU has 1 MB.
        let p = DirectScale::default().plan(&request(4.0, Some(1 << 20), 1 << 30)).unwrap();
        assert_eq!(p.stages[0].lane, Lane::Cpu);
    }

    #[test]
    fn test_infeasible() {
        let result = DirectScale::default().plan(&request(4.0, None, 1 << 20));
        assert!(matches!(result, Err(PlannerError::InfeasibleScale { .. })));
    }

    #[test]
    fn test_unrepresentable_target_is_infeasible() {
        let budget = BudgetSnapshot::new(Some(1 << 30), 1 << 30, 1 << 30);
        let req = PlanRequest::new(Dims::new(10, 10), PixelFormat::RGBA16, 1e9, budget);
        let result = DirectScale::default().plan(&req);
        assert!(matches!(result, Err(PlannerError::InfeasibleScale { .. })));
    }

    #[test]
    fn test_identity() {
        let p = DirectScale::default().plan(&request(1.0, None, 1 << 20)).unwrap();
        assert!(p.is_identity());
    }
}
