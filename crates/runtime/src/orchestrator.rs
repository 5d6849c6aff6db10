// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Per-session state machine.
//!
//! ```text
//! Planning ──▶ Executing ──▶ (stage complete ──▶ Executing)* ──▶ Complete
//!                 │  ▲
//!                 ▼  │ replan remaining stages on the CPU lane
//!               Stalled
//!
//! Executing / Stalled ──▶ Failed   (host exhaustion, cancellation, internal)
//! ```
//!
//! Stages run strictly in order. Before each stage the orchestrator checks
//! memory pressure: above the high-water mark it reclaims idle pool blocks
//! under the exclusive gate, and if GPU pressure is still high the next stage
//! alone is moved to the CPU lane. Executors run on the blocking pool; a
//! cancellation that arrives mid-stage is observed once the stage returns.

use crate::engine::{EngineShared, UpscaleOutput, UpscaleRequest, UpscaleResult};
use crate::fallback::{self, Transition};
use crate::{preview, ProgressPublisher, SessionId, SessionState, StageMetrics, UpscaleError, UpscaleMetrics};
use memory_manager::MemoryTracker;
use raster_core::{Dims, PixelFormat, RasterImage};
use scale_planner::{Lane, LanePolicy, PlanRequest, Stage};
use stage_exec::{FailureReason, ImageBuffer, StageExecutor, StageOutcome};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub(crate) struct Orchestrator {
    shared: Arc<EngineShared>,
    id: SessionId,
    label: String,
    token: CancellationToken,
    progress: ProgressPublisher,
    metrics: UpscaleMetrics,
    gpu_disabled: bool,
}

/// Fixed facts about the job, shared by the initial plan and every replan.
#[derive(Clone, Copy)]
struct Job {
    source: Dims,
    format: PixelFormat,
    factor: f64,
}

impl Orchestrator {
    pub(crate) fn new(
        shared: Arc<EngineShared>,
        id: SessionId,
        label: String,
        token: CancellationToken,
        progress: ProgressPublisher,
    ) -> Self {
        let metrics = UpscaleMetrics::new(shared.strategy.name());
        let gpu_disabled = shared.gpu.is_none();
        Self {
            shared,
            id,
            label,
            token,
            progress,
            metrics,
            gpu_disabled,
        }
    }

    /// Runs the session to a terminal state.
    pub(crate) async fn run(mut self, request: UpscaleRequest) -> Result<UpscaleResult, UpscaleError> {
        let started = Instant::now();
        info!(
            session = %self.id,
            label = %self.label,
            source = %request.image.dims(),
            factor = request.factor,
            "Session started"
        );

        let result = self.drive(request).await;

        self.metrics.total_duration = started.elapsed();
        self.metrics.peak_host_bytes = self.shared.host_tracker().stats().peak_committed_bytes;
        self.metrics.peak_gpu_bytes = self
            .shared
            .gpu_tracker()
            .map_or(0, |t| t.stats().peak_committed_bytes);
        self.shared
            .sessions
            .update(self.id, |s| s.finish(result.as_ref().map(|_| ())));

        match result {
            Ok(output) => {
                info!(session = %self.id, "{}", self.metrics.summary());
                Ok(UpscaleResult {
                    session: self.id,
                    output,
                    metrics: self.metrics,
                })
            }
            Err(e) => {
                warn!(session = %self.id, kind = e.kind(), error = %e, "Session failed");
                Err(e)
            }
        }
    }

    async fn drive(&mut self, request: UpscaleRequest) -> Result<UpscaleOutput, UpscaleError> {
        self.check_cancelled()?;
        let job = Job {
            source: request.image.dims(),
            format: request.image.format(),
            factor: request.factor,
        };

        let feasibility = PlanRequest::new(job.source, job.format, job.factor, self.shared.budget_snapshot(false));
        scale_planner::check_feasible(&feasibility)?;
        let target = feasibility.target_dims();
        if preview::needs_preview(request.output, target, job.format) {
            return self.preview(request.image, target).await;
        }

        let policy = if self.gpu_disabled {
            LanePolicy::CpuOnly
        } else {
            LanePolicy::GpuPreferred
        };
        let plan_request = PlanRequest::new(
            job.source,
            job.format,
            job.factor,
            self.shared.budget_snapshot(!self.gpu_disabled),
        )
        .with_policy(policy);
        let plan = self.shared.plan(&plan_request)?;
        self.metrics.planned_stages = plan.num_stages();
        let target = plan.target;
        debug!(session = %self.id, "{}", plan.summary());

        let mut current = ImageBuffer::from_raster(&request.image, &self.shared.host)
            .map_err(|e| UpscaleError::ResourceExhausted(format!("source copy: {e}")))?;
        drop(request);

        let mut pending: VecDeque<Stage> = plan.stages.into();
        let mut completed = 0usize;
        let mut completed_factor = 1.0;
        let mut total = pending.len();
        self.set_state(SessionState::Executing, 0, total);

        while let Some(mut stage) = pending.pop_front() {
            self.check_cancelled()?;
            self.prepare_lane(&mut stage).await;
            self.shared.sessions.update(self.id, |s| {
                s.state = SessionState::Executing;
                s.current_stage_index = stage.index;
                s.total_stages = total;
            });

            let started = Instant::now();
            let outcome = self.execute(stage.clone(), current).await?;
            self.metrics.record_stage(StageMetrics {
                index: stage.index,
                lane: stage.lane,
                multiplier: stage.multiplier,
                input: stage.input,
                output: stage.output,
                duration: started.elapsed(),
                outcome: outcome.kind(),
            });
            debug!(
                session = %self.id,
                stage = stage.index,
                lane = %stage.lane,
                outcome = outcome.kind(),
                elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
                "Stage finished"
            );

            let transition = fallback::decide(stage.lane, &outcome);
            current = match (transition, outcome) {
                (Transition::Advance, StageOutcome::Completed(output)) => {
                    completed += 1;
                    completed_factor = stage.cumulative_factor;
                    let percent = self.progress.stage(
                        completed,
                        total,
                        format!("stage {} complete ({:.3}x)", stage.index, completed_factor),
                    );
                    self.shared.sessions.update(self.id, |s| {
                        s.current_stage_index = completed;
                        s.progress_percent = percent;
                    });
                    output
                }
                (Transition::ReplanOnCpu { disable_gpu, reason }, StageOutcome::Recoverable { input, .. }) => {
                    self.stall(&stage, disable_gpu, &reason, total);
                    pending = self.replan_on_cpu(job, completed, completed_factor)?;
                    total = completed + pending.len();
                    self.metrics.replans += 1;
                    self.set_state(SessionState::Executing, completed, total);
                    input
                }
                (Transition::Fail(reason), _) => return Err(terminal(reason)),
                (transition, outcome) => {
                    return Err(UpscaleError::Internal(format!(
                        "transition {transition:?} does not match {} outcome",
                        outcome.kind()
                    )))
                }
            };
        }

        self.check_cancelled()?;
        let image = current.into_raster()?;
        if image.dims() != target {
            return Err(UpscaleError::Internal(format!(
                "result is {} but the plan targets {target}",
                image.dims()
            )));
        }
        self.progress.complete(total, format!("upscaled to {target}"));
        Ok(UpscaleOutput::Full(image))
    }

    async fn preview(&mut self, source: RasterImage, target: Dims) -> Result<UpscaleOutput, UpscaleError> {
        self.metrics.preview = true;
        self.set_state(SessionState::Executing, 0, 1);
        let shared = Arc::clone(&self.shared);
        let label = self.label.clone();
        let descriptor = tokio::task::spawn_blocking(move || {
            preview::generate(
                &source,
                target,
                shared.config.max_preview_edge,
                &shared.cpu,
                &shared.host,
                &label,
            )
        })
        .await
        .map_err(|e| UpscaleError::Internal(format!("preview task failed: {e}")))??;
        self.check_cancelled()?;
        self.progress.complete(1, format!("preview of {target}"));
        Ok(UpscaleOutput::Preview(descriptor))
    }

    /// Applies the pressure rules and the session's GPU state to `stage`.
    async fn prepare_lane(&mut self, stage: &mut Stage) {
        if stage.lane == Lane::Gpu && self.gpu_disabled {
            stage.lane = Lane::Cpu;
            return;
        }

        let high_water = self.shared.config.pressure_high_water;
        let host_pressure = self.shared.host_tracker().pressure();
        let gpu_pressure = self.shared.gpu_tracker().map_or(0.0, MemoryTracker::pressure);
        if host_pressure <= high_water && gpu_pressure <= high_water {
            return;
        }

        let reclaimed = {
            let _exclusive = self.shared.gate.write().await;
            self.shared.reclaim_idle()
        };
        self.metrics.reclaimed_bytes += reclaimed;
        warn!(
            session = %self.id,
            stage = stage.index,
            host_pressure,
            gpu_pressure,
            reclaimed,
            "Memory pressure above high-water mark; reclaimed idle blocks"
        );

        let still_high = self
            .shared
            .gpu_tracker()
            .is_some_and(|t| t.pressure() > high_water);
        if stage.lane == Lane::Gpu && still_high {
            stage.lane = Lane::Cpu;
            self.metrics.pressure_downgrades += 1;
            warn!(session = %self.id, stage = stage.index, "GPU pressure persists; stage moved to CPU");
        }
    }

    async fn execute(&self, stage: Stage, input: ImageBuffer) -> Result<StageOutcome, UpscaleError> {
        let _dispatch = match stage.lane {
            Lane::Gpu => Some(self.shared.gate.read().await),
            Lane::Cpu => None,
        };
        let shared = Arc::clone(&self.shared);
        let label = self.label.clone();
        tokio::task::spawn_blocking(move || match (stage.lane, shared.gpu.as_ref()) {
            (Lane::Gpu, Some(gpu)) => gpu.execute(&stage, input, &label),
            _ => shared.cpu.execute(&stage, input, &label),
        })
        .await
        .map_err(|e| UpscaleError::Internal(format!("stage task failed: {e}")))
    }

    fn stall(&mut self, stage: &Stage, disable_gpu: bool, reason: &FailureReason, total: usize) {
        self.metrics.fallbacks += 1;
        if disable_gpu {
            self.gpu_disabled = true;
        }
        warn!(
            session = %self.id,
            stage = stage.index,
            %reason,
            disable_gpu,
            "GPU stage failed; replanning remaining stages on CPU"
        );
        let gpu_disabled = self.gpu_disabled;
        self.shared.sessions.update(self.id, |s| {
            s.state = SessionState::Stalled;
            s.fallbacks += 1;
            s.gpu_disabled = gpu_disabled;
            s.last_error = Some(reason.to_string());
        });
        self.progress
            .note(stage.index, total, format!("stage {} fell back to CPU: {reason}", stage.index));
    }

    fn replan_on_cpu(
        &self,
        job: Job,
        completed: usize,
        completed_factor: f64,
    ) -> Result<VecDeque<Stage>, UpscaleError> {
        let mut request = PlanRequest::new(job.source, job.format, job.factor, self.shared.budget_snapshot(false))
            .with_policy(LanePolicy::CpuOnly);
        if completed > 0 {
            request = request.resume_from(completed_factor, completed);
        }
        let plan = self.shared.plan(&request).map_err(|e| match e {
            // Stages already ran, so this is exhaustion rather than an infeasible request.
            UpscaleError::InfeasibleScale(detail) => UpscaleError::ResourceExhausted(detail),
            other => other,
        })?;
        info!(
            session = %self.id,
            from_stage = completed,
            stages = plan.num_stages(),
            "Replanned on CPU"
        );
        Ok(plan.stages.into())
    }

    fn set_state(&self, state: SessionState, stage_index: usize, total: usize) {
        self.shared.sessions.update(self.id, |s| {
            s.state = state;
            s.current_stage_index = stage_index;
            s.total_stages = total;
        });
    }

    fn check_cancelled(&self) -> Result<(), UpscaleError> {
        if self.token.is_cancelled() {
            info!(session = %self.id, "Session cancelled");
            return Err(UpscaleError::Cancelled);
        }
        Ok(())
    }
}

fn terminal(reason: FailureReason) -> UpscaleError {
    match reason {
        FailureReason::HostOutOfMemory { .. } => UpscaleError::ResourceExhausted(reason.to_string()),
        other => UpscaleError::Internal(other.to_string()),
    }
}
