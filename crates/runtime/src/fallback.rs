// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Fallback policy: what the orchestrator does after each stage.
//!
//! [`decide`] looks only at the lane that ran and the outcome tag, so the
//! whole policy is testable without a device.

use scale_planner::Lane;
use stage_exec::{FailureReason, StageOutcome};

/// Next step for the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Keep the output and move to the next stage.
    Advance,
    /// Stall, replan the remaining stages on the CPU lane and resume.
    ReplanOnCpu {
        /// Disable the GPU lane for the rest of the session.
        disable_gpu: bool,
        reason: FailureReason,
    },
    /// End the session with a terminal error.
    Fail(FailureReason),
}

/// Maps a stage outcome on `lane` to the next transition.
pub fn decide(lane: Lane, outcome: &StageOutcome) -> Transition {
    match outcome {
        StageOutcome::Completed(_) => Transition::Advance,
        StageOutcome::Recoverable { reason, .. } => match (lane, reason) {
            (_, FailureReason::HostOutOfMemory { .. }) => Transition::Fail(reason.clone()),
            (Lane::Gpu, reason) => Transition::ReplanOnCpu {
                disable_gpu: reason.disables_gpu(),
                reason: reason.clone(),
            },
            // Nothing left to fall back to.
            (Lane::Cpu, reason) => Transition::Fail(reason.clone()),
        },
        StageOutcome::Fatal { reason } => Transition::Fail(reason.clone()),
    }
}
