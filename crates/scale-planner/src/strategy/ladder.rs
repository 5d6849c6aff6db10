// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Adaptive ladder strategy.
//!
//! Walks a descending ladder of per-stage multipliers. Each stage takes the
//! largest multiplier whose estimate fits the GPU headroom, then falls back
//! to the CPU lane against host headroom. The multiplier that would
//! overshoot the target is clamped so the final stage lands exactly on it.
//!
//! # Memory Model
//!
//! A stage's peak is dominated by its output. The estimate is
//!
//! ```text
//! stage_mem = output_pixels × bytes_per_pixel × overhead
//! ```
//!
//! with `overhead` (default 2.25) covering the input, the output and
//! interpolation scratch. Because stage outputs grow monotonically, the
//! early large multipliers are cheap and the ladder shrinks toward 1.1 as
//! the image approaches the GPU ceiling, after which the CPU lane takes over.
//!
//! # When to use
//! - Default strategy; the only one that can keep large factors on a small GPU.

use super::{estimate, fits_lane, preflight, ScaleStrategy};
use crate::plan::PlanBuilder;
use crate::{Lane, PlanRequest, PlannerError, ScalePlan, FACTOR_TOLERANCE};

/// Tunables for [`AdaptiveLadder`].
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LadderParams {
    /// Preferred multipliers, largest first.
    pub ladder: Vec<f64>,
    /// Extra multiplier added when no ladder entry fits any lane.
    pub refine_step: f64,
    /// Estimate overhead over the raw output size.
    pub overhead_factor: f64,
    /// Relative tolerance for closing the final stage.
    pub factor_tolerance: f64,
}

impl Default for LadderParams {
    fn default() -> Self {
        Self {
            ladder: vec![2.0, 1.5, 1.1],
            refine_step: 1.05,
            overhead_factor: 2.25,
            factor_tolerance: FACTOR_TOLERANCE,
        }
    }
}

/// Greedy ladder walk across the GPU and CPU lanes.
#[derive(Debug, Clone)]
pub struct AdaptiveLadder {
    params: LadderParams,
    ladder: Vec<f64>,
    refined: Vec<f64>,
}

impl Default for AdaptiveLadder {
    fn default() -> Self {
        Self::from_params(LadderParams::default())
    }
}

fn sorted_desc(mut values: Vec<f64>) -> Vec<f64> {
    values.sort_by(|a, b| b.total_cmp(a));
    values.dedup();
    values
}

impl AdaptiveLadder {
    /// Creates the strategy, rejecting ladders with entries `≤ 1.0`.
    pub fn new(params: LadderParams) -> Result<Self, PlannerError> {
        if params.ladder.is_empty() {
            return Err(PlannerError::InvalidLadder("ladder is empty".into()));
        }
        for &m in params.ladder.iter().chain(std::iter::once(&params.refine_step)) {
            if !(m.is_finite() && m > 1.0) {
                return Err(PlannerError::InvalidLadder(format!(
                    "multiplier {m} must be a finite value > 1.0"
                )));
            }
        }
        if !(params.overhead_factor.is_finite() && params.overhead_factor >= 1.0) {
            return Err(PlannerError::InvalidLadder(format!(
                "overhead factor {} must be >= 1.0",
                params.overhead_factor
            )));
        }
        if !(0.0..0.5).contains(&params.factor_tolerance) {
            return Err(PlannerError::InvalidLadder(format!(
                "factor tolerance {} must be in [0, 0.5)",
                params.factor_tolerance
            )));
        }

        Ok(Self::from_params(params))
    }

    /// Derives the primary and refined ladders from already validated params.
    fn from_params(params: LadderParams) -> Self {
        let ladder = sorted_desc(params.ladder.clone());
        let mut refined = ladder.clone();
        refined.push(params.refine_step);
        let refined = sorted_desc(refined);
        Self {
            params,
            ladder,
            refined,
        }
    }

    pub fn params(&self) -> &LadderParams {
        &self.params
    }

    /// Picks `(multiplier, lane, is_final)` for the next stage.
    fn choose(&self, builder: &PlanBuilder, request: &PlanRequest) -> Option<(f64, Lane, bool)> {
        let cumulative = builder.cumulative();
        let remaining = effective_target(request) / cumulative;
        let tol = self.params.factor_tolerance;

        for (pass, ladder) in [&self.ladder, &self.refined].into_iter().enumerate() {
            if pass == 1 {
                tracing::debug!(stage = builder.next_index(), "Primary ladder exhausted, trying refined ladder");
            }
            for &lane in request.lanes() {
                for &m in ladder {
                    let is_final = remaining <= m * (1.0 + tol);
                    let m_eff = if is_final { remaining } else { m };
                    let output = builder.output_for(cumulative * m_eff, is_final);
                    let est = estimate(request, output, self.params.overhead_factor);
                    if fits_lane(request, lane, output, est) {
                        return Some((m_eff, lane, is_final));
                    }
                }
            }
        }
        None
    }
}

fn effective_target(request: &PlanRequest) -> f64 {
    request.target_factor.max(1.0)
}

impl ScaleStrategy for AdaptiveLadder {
    fn name(&self) -> &str {
        "adaptive-ladder"
    }

    fn plan(&self, request: &PlanRequest) -> Result<ScalePlan, PlannerError> {
        if let Some(plan) = preflight(self.name(), request)? {
            return Ok(plan);
        }

        let mut builder = PlanBuilder::new(self.name(), request);
        loop {
            let Some((m, lane, is_final)) = self.choose(&builder, request) else {
                let target = request.target_dims();
                return Err(PlannerError::InfeasibleScale {
                    detail: format!(
                        "no multiplier fits stage {} at {:.3}x toward {target} on any lane",
                        builder.next_index(),
                        builder.cumulative(),
                    ),
                });
            };

            let output = builder.output_for(builder.cumulative() * m, is_final);
            let est = estimate(request, output, self.params.overhead_factor);
            tracing::debug!(
                stage = builder.next_index(),
                multiplier = m,
                %lane,
                %output,
                estimate = est,
                "Planned stage"
            );
            builder.push(m, lane, output, est);
            if is_final {
                break;
            }
        }

        let plan = builder.build();
        plan.validate()?;
        tracing::info!(
            stages = plan.num_stages(),
            gpu = plan.count_lane(Lane::Gpu),
            cpu = plan.count_lane(Lane::Cpu),
            suffix = request.is_suffix(),
            "Planned {} → {}",
            plan.source,
            plan.target
        );
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BudgetSnapshot, LanePolicy};
    use raster_core::{Dims, PixelFormat};

    const GB: u64 = 1024 * 1024 * 1024;

    fn budget(gpu: Option<u64>, host: u64) -> BudgetSnapshot {
        BudgetSnapshot::new(gpu, host, host)
    }

    fn plan(source: Dims, factor: f64, budget: BudgetSnapshot) -> Result<ScalePlan, PlannerError> {
        AdaptiveLadder::default().plan(&PlanRequest::new(source, PixelFormat::RGB8, factor, budget))
    }

    fn product(plan: &ScalePlan) -> f64 {
        plan.multipliers().iter().product()
    }

    #[test]
    fn test_unconstrained_prefers_largest_multiplier() {
        let p = plan(Dims::new(100, 100), 8.0, budget(Some(GB), 4 * GB)).unwrap();
        assert_eq!(p.multipliers(), vec![2.0, 2.0, 2.0]);
        assert_eq!(p.count_lane(Lane::Gpu), 3);
        assert_eq!(p.target, Dims::new(800, 800));
    }

    #[test]
    fn test_final_stage_is_clamped() {
        let p = plan(Dims::new(100, 100), 5.0, budget(Some(GB), 4 * GB)).unwrap();
        // 2 × 2 × 1.25: the last stage closes the gap instead of overshooting.
        assert_eq!(p.num_stages(), 3);
        assert!((p.stages[2].multiplier - 1.25).abs() < 1e-9);
        assert_eq!(p.stages[2].output, Dims::new(500, 500));
        assert!((product(&p) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_scenario_large_factor_small_gpu() {
        let source = Dims::new(2000, 3000);
        let gpu = (3 * GB) * 7 / 10;
        let b = budget(Some(gpu), 64 * GB);
        let p = plan(source, 15.0, b).unwrap();
        p.validate().unwrap();

        // Not a pure 2.0 chain, and the product closes on 15.
        assert!(p.multipliers().iter().any(|&m| m < 2.0));
        assert!((product(&p) - 15.0).abs() / 15.0 <= FACTOR_TOLERANCE);
        assert_eq!(p.target, Dims::new(30000, 45000));

        // The ladder mixes multipliers on the GPU before handing over.
        let gpu_stages: Vec<_> = p.stages.iter().filter(|s| s.lane == Lane::Gpu).collect();
        assert!(gpu_stages.len() >= 3);
        assert!(gpu_stages.iter().all(|s| s.estimated_memory_bytes <= gpu));
        assert!(gpu_stages.iter().any(|s| s.multiplier == 2.0));
        assert!(gpu_stages.iter().any(|s| s.multiplier < 2.0));

        // CPU takes over once even 1.1 no longer fits the GPU.
        let first_cpu = p.stages.iter().position(|s| s.lane == Lane::Cpu).unwrap();
        assert!(p.stages[first_cpu..].iter().all(|s| s.lane == Lane::Cpu));
        let before = p.stages[first_cpu].input;
        let cumulative = p.stages[first_cpu].cumulative_factor / p.stages[first_cpu].multiplier;
        let smallest = source.scaled(cumulative * 1.1);
        let smallest_est = crate::estimate_stage_bytes(smallest, PixelFormat::RGB8, 2.25);
        assert!(smallest_est > gpu, "1.1x from {before} would still fit the gpu");
    }

    #[test]
    fn test_identity_plan() {
        let p = plan(Dims::new(4000, 6000), 1.0, budget(Some(GB), 4 * GB)).unwrap();
        assert!(p.is_identity());
        assert_eq!(p.stages[0].multiplier, 1.0);
        assert_eq!(p.target, Dims::new(4000, 6000));

        let down = plan(Dims::new(40, 60), 0.5, budget(None, GB)).unwrap();
        assert!(down.is_identity());
        assert_eq!(down.target, Dims::new(40, 60));
    }

    #[test]
    fn test_source_exceeds_host_limit() {
        let source = Dims::new(1000, 1000); // 3 MB as RGB8
        let result = plan(source, 2.0, budget(Some(GB), 1_000_000));
        assert!(matches!(result, Err(PlannerError::InfeasibleScale { .. })));
    }

    #[test]
    fn test_huge_factors_are_infeasible_not_clamped() {
        // 10 x 1e9 does not fit in u32.
        let result = AdaptiveLadder::default().plan(&PlanRequest::new(
            Dims::new(10, 10),
            PixelFormat::RGBA16,
            1e9,
            budget(Some(GB), 4 * GB),
        ));
        assert!(matches!(result, Err(PlannerError::InfeasibleScale { .. })));

        // Representable but astronomically large: no lane has room.
        let result = plan(Dims::new(10, 10), 4e8, budget(Some(GB), 4 * GB));
        assert!(matches!(result, Err(PlannerError::InfeasibleScale { .. })));
    }

    #[test]
    fn test_nothing_fits_anywhere() {
        let result = plan(Dims::new(100, 100), 4.0, budget(Some(1000), 100_000));
        assert!(matches!(result, Err(PlannerError::InfeasibleScale { .. })));
    }

    #[test]
    fn test_no_gpu_plans_cpu_only() {
        let p = plan(Dims::new(64, 64), 6.0, budget(None, GB)).unwrap();
        assert_eq!(p.count_lane(Lane::Gpu), 0);
        assert_eq!(p.multipliers(), vec![2.0, 2.0, 1.5]);
    }

    #[test]
    fn test_cpu_only_policy() {
        let req = PlanRequest::new(Dims::new(64, 64), PixelFormat::RGB8, 3.0, budget(Some(GB), GB))
            .with_policy(LanePolicy::CpuOnly);
        let p = AdaptiveLadder::default().plan(&req).unwrap();
        assert_eq!(p.count_lane(Lane::Gpu), 0);
    }

    #[test]
    fn test_suffix_replan() {
        let source = Dims::new(100, 80);
        let full = plan(source, 6.0, budget(Some(GB), GB)).unwrap();
        assert_eq!(full.multipliers(), vec![2.0, 2.0, 1.5]);

        let req = PlanRequest::new(source, PixelFormat::RGB8, 6.0, budget(Some(GB), GB))
            .resume_from(full.stages[0].cumulative_factor, 1)
            .with_policy(LanePolicy::CpuOnly);
        let suffix = AdaptiveLadder::default().plan(&req).unwrap();
        assert_eq!(suffix.stages[0].index, 1);
        assert_eq!(suffix.stages[0].input, full.stages[0].output);
        assert_eq!(suffix.stages.last().unwrap().output, full.target);
        assert_eq!(suffix.count_lane(Lane::Gpu), 0);
        assert!((suffix.start_factor * product(&suffix) - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_suffix_with_nothing_left() {
        let req = PlanRequest::new(Dims::new(10, 10), PixelFormat::RGB8, 2.0, budget(None, GB))
            .resume_from(2.0, 1);
        assert!(matches!(AdaptiveLadder::default().plan(&req), Err(PlannerError::EmptyPlan)));
    }

    #[test]
    fn test_factor_near_one() {
        let p = plan(Dims::new(4000, 100), 1.003, budget(None, GB)).unwrap();
        assert_eq!(p.num_stages(), 1);
        assert_eq!(p.target, Dims::new(4012, 100));
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(plan(Dims::new(10, 10), f64::NAN, budget(None, GB)), Err(PlannerError::InvalidFactor(_))));
        assert!(matches!(plan(Dims::new(10, 10), -2.0, budget(None, GB)), Err(PlannerError::InvalidFactor(_))));

        let bad = LadderParams {
            ladder: vec![2.0, 1.0],
            ..LadderParams::default()
        };
        assert!(matches!(AdaptiveLadder::new(bad), Err(PlannerError::InvalidLadder(_))));
        let empty = LadderParams {
            ladder: vec![],
            ..LadderParams::default()
        };
        assert!(AdaptiveLadder::new(empty).is_err());
    }

    #[test]
    fn test_custom_ladder_is_sorted() {
        let s = AdaptiveLadder::new(LadderParams {
            ladder: vec![1.5, 3.0, 1.5],
            ..LadderParams::default()
        })
        .unwrap();
        let p = s
            .plan(&PlanRequest::new(Dims::new(10, 10), PixelFormat::RGB8, 4.5, budget(None, GB)))
            .unwrap();
        assert_eq!(p.multipliers(), vec![3.0, 1.5]);
    }

    #[test]
    fn test_default_matches_default_params() {
        let from_params = AdaptiveLadder::new(LadderParams::default()).unwrap();
        let default = AdaptiveLadder::default();
        assert_eq!(default.params(), from_params.params());
        assert_eq!(default.ladder, vec![2.0, 1.5, 1.1]);
        assert_eq!(default.refined, from_params.refined);
        assert_eq!(default.refined.last(), Some(&LadderParams::default().refine_step));
    }

    /// Sweep: every feasible plan closes on the target factor and dims.
    #[test]
    fn test_sweep_product_and_dims() {
        let sources = [Dims::new(1, 1), Dims::new(37, 19), Dims::new(640, 480), Dims::new(2000, 3000)];
        let gpus = [None, Some(10 * 1024 * 1024), Some(512 * 1024 * 1024), Some(3 * GB)];
        let mut feasible = 0;
        for source in sources {
            for gpu in gpus {
                for step in 0..60 {
                    let factor = 1.0 + step as f64 * 0.25;
                    match plan(source, factor, budget(gpu, 64 * GB)) {
                        Ok(p) => {
                            p.validate().unwrap();
                            let rel = (product(&p) - factor).abs() / factor;
                            assert!(rel <= FACTOR_TOLERANCE, "{source} x{factor}: product off by {rel}");
                            assert_eq!(p.stages.last().unwrap().output, source.scaled(factor));
                            for s in &p.stages {
                                if s.lane == Lane::Gpu {
                                    assert!(s.estimated_memory_bytes <= gpu.unwrap());
                                }
                            }
                            feasible += 1;
                        }
                        Err(PlannerError::InfeasibleScale { .. }) => {}
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                }
            }
        }
        assert!(feasible > 0);
    }

    #[test]
    fn test_estimates_are_monotone() {
        let p = plan(Dims::new(300, 200), 12.0, budget(Some(GB), 16 * GB)).unwrap();
        for pair in p.stages.windows(2) {
            assert!(pair[1].estimated_memory_bytes >= pair[0].estimated_memory_bytes);
        }
    }
}
