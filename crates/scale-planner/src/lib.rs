// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # scale-planner
//!
//! Turns "scale this image by N" into an ordered sequence of resampling
//! stages, each with a multiplier, a lane (GPU or CPU) and a memory
//! estimate that fits the budget snapshot it was planned against.
//!
//! # Strategies
//!
//! | Strategy | Stages | GPU usage | Fallback |
//! |---|---|---|---|
//! | [`AdaptiveLadder`] | Few (largest multiplier that fits) | Until 1.1× no longer fits | CPU, then refined ladder |
//! | [`DirectScale`] | One | Only if the full output fits | CPU |
//!
//! # Suffix planning
//!
//! After a stage fails on the GPU, the orchestrator asks for the remaining
//! stages only, via [`PlanRequest::resume_from`] and
//! [`LanePolicy::CpuOnly`]. Completed stages are never replanned.
//!
//! # Rounding
//!
//! Stage outputs are `round_half_up(source × cumulative factor)`; the final
//! stage is always exactly `round_half_up(source × target)`.
//!
//! # Example
//! ```
//! use scale_planner::{AdaptiveLadder, BudgetSnapshot, PlanRequest, ScaleStrategy};
//! use raster_core::{Dims, PixelFormat};
//!
//! let budget = BudgetSnapshot::new(Some(2 << 30), 16 << 30, 16 << 30);
//! let request = PlanRequest::new(Dims::new(2000, 3000), PixelFormat::RGB8, 15.0, budget);
//! let plan = AdaptiveLadder::default().plan(&request).unwrap();
//! println!("{}", plan.summary());
//! ```

mod error;
mod plan;
mod request;
pub mod strategy;

pub use error::PlannerError;
pub use plan::{estimate_stage_bytes, ScalePlan, Stage, FACTOR_TOLERANCE};
pub use request::{BudgetSnapshot, Lane, LanePolicy, PlanRequest};
pub use strategy::direct::DirectScale;
pub use strategy::ladder::{AdaptiveLadder, LadderParams};
pub use strategy::{check_feasible, ScaleStrategy};
