// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The executor seam shared by both lanes.

use crate::{ImageBuffer, StageOutcome};
use scale_planner::{Lane, Stage};

/// Runs single resampling stages on one lane.
///
/// `execute` is synchronous and may block for the length of the stage; the
/// orchestrator calls it from a blocking worker. Implementations must
/// reserve all memory they need before doing irreversible work and must
/// hand the input back in [`StageOutcome::Recoverable`] when they fail
/// before producing output.
pub trait StageExecutor: Send + Sync {
    /// The lane this executor serves.
    fn lane(&self) -> Lane;

    /// Resamples `input` to `stage.output`.
    ///
    /// `label` identifies the session in logs and device work submissions.
    fn execute(&self, stage: &Stage, input: ImageBuffer, label: &str) -> StageOutcome;
}
