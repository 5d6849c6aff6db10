// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the scale planner.

/// Errors that can occur during scale planning.
#[derive(Debug, thiserror::Error)]
pub enum PlannerError {
    /// No sequence of stages fits the available memory on any lane.
    #[error("infeasible scale: {detail}")]
    InfeasibleScale { detail: String },

    /// The requested factor is not a finite positive number.
    #[error("invalid scale factor {0}; expected a finite value > 0")]
    InvalidFactor(f64),

    /// The multiplier ladder is unusable.
    #[error("invalid ladder: {0}")]
    InvalidLadder(String),

    /// There is nothing left to plan.
    #[error("no stages remain to be planned")]
    EmptyPlan,

    /// A produced plan broke one of its own invariants.
    #[error("strategy '{strategy}' failed: {detail}")]
    StrategyFailed { strategy: String, detail: String },
}
