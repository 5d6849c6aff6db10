// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The [`ScaleStrategy`] trait and strategy implementations.

pub mod direct;
pub mod ladder;

use crate::plan::{estimate_stage_bytes, PlanBuilder};
use crate::{Lane, PlanRequest, PlannerError, ScalePlan};

/// Trait for scale strategies.
///
/// Each strategy takes a [`PlanRequest`] and produces a [`ScalePlan`] whose
/// stages fit the request's budget snapshot.
///
/// Strategies are purely algorithmic, with no I/O or device access, which
/// makes them unit-testable against synthetic budgets.
pub trait ScaleStrategy: Send + Sync {
    /// Human-readable name of this strategy.
    fn name(&self) -> &str;

    /// Produces a plan (or the remaining suffix of one) for the request.
    fn plan(&self, request: &PlanRequest) -> Result<ScalePlan, PlannerError>;
}

/// Validates a request without planning it.
///
/// Rejects non-finite or non-positive factors, targets whose sides do not
/// fit in a `u32`, and sources larger than the host limit. Every strategy
/// runs this first; callers that skip planning (previews) run it directly.
pub fn check_feasible(request: &PlanRequest) -> Result<(), PlannerError> {
    for factor in [request.target_factor, request.completed_factor] {
        if !(factor.is_finite() && factor > 0.0) {
            return Err(PlannerError::InvalidFactor(factor));
        }
    }

    if request.target_factor > 1.0 && request.source.checked_scaled(request.target_factor).is_none() {
        return Err(PlannerError::InfeasibleScale {
            detail: format!(
                "target of {} x {} does not fit in {}-bit dimensions",
                request.source,
                request.target_factor,
                u32::BITS
            ),
        });
    }

    let source_bytes = request.source.size_bytes(request.format);
    if source_bytes > request.budget.host_limit {
        return Err(PlannerError::InfeasibleScale {
            detail: format!(
                "source {} ({source_bytes} bytes) exceeds the host limit of {} bytes",
                request.source, request.budget.host_limit
            ),
        });
    }
    Ok(())
}

/// Checks shared by every strategy.
///
/// Returns `Some(plan)` when the request resolves to the identity plan and
/// no walk is needed.
pub(crate) fn preflight(strategy: &str, request: &PlanRequest) -> Result<Option<ScalePlan>, PlannerError> {
    check_feasible(request)?;
    let source_bytes = request.source.size_bytes(request.format);

    if !request.is_suffix() && request.target_factor <= 1.0 {
        let mut builder = PlanBuilder::new(strategy, request);
        builder.push(1.0, Lane::Cpu, request.source, source_bytes);
        tracing::info!(source = %request.source, factor = request.target_factor, "Identity plan");
        return Ok(Some(builder.build()));
    }

    if request.is_suffix() && request.target_factor / request.completed_factor <= 1.0 {
        return Err(PlannerError::EmptyPlan);
    }

    Ok(None)
}

/// Returns `true` if a stage producing `output` with estimate `estimate`
/// fits `lane` under the request's budget.
///
/// A GPU stage also needs host room for the downloaded output.
pub(crate) fn fits_lane(request: &PlanRequest, lane: Lane, output: raster_core::Dims, estimate: u64) -> bool {
    match request.budget.headroom(lane) {
        None => false,
        Some(headroom) => {
            estimate <= headroom
                && (lane == Lane::Cpu || output.size_bytes(request.format) <= request.budget.host_headroom)
        }
    }
}

/// Estimate with the given overhead; re-exported for strategies.
pub(crate) fn estimate(request: &PlanRequest, output: raster_core::Dims, overhead: f64) -> u64 {
    estimate_stage_bytes(output, request.format, overhead)
}
