// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The upscaling engine: shared state, session submission and results.
//!
//! ```text
//! UpscaleEngine::new(config, profile, device)
//!     │  .submit(request, token)
//!     ▼
//! SessionHandle ── progress events ──▶ caller
//!     │  .wait()
//!     ▼
//! UpscaleResult { output: Full | Preview, metrics }
//! ```
//!
//! The engine owns one host tracker and, when the profile reports a GPU and
//! a device is supplied, one GPU tracker. Every session draws from these
//! shared trackers; nothing in the pipeline allocates image memory around
//! them.

use crate::orchestrator::Orchestrator;
use crate::{
    EngineConfig, OutputMode, PreviewDescriptor, ProgressPublisher, ProgressReceiver, SessionId,
    SessionInfo, SessionStore, UpscaleError, UpscaleMetrics,
};
use hardware_profile::HardwareProfile;
use memory_manager::{BufferPool, MemoryBudget, MemoryTracker, Resource, ResourceBudget, UsageSnapshot};
use raster_core::{Dims, PixelFormat, RasterImage};
use scale_planner::{BudgetSnapshot, LanePolicy, PlanRequest, ScalePlan, ScaleStrategy};
use stage_exec::{CpuExecutor, GpuDevice, GpuExecutor, HostPool};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// One upscale job.
#[derive(Debug, Clone)]
pub struct UpscaleRequest {
    pub image: RasterImage,
    pub factor: f64,
    /// Session label for logs and device submissions; defaults to the id.
    pub label: Option<String>,
    pub output: OutputMode,
}

impl UpscaleRequest {
    pub fn new(image: RasterImage, factor: f64) -> Self {
        Self {
            image,
            factor,
            label: None,
            output: OutputMode::Materialize,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }
}

/// The delivered result.
#[derive(Debug, Clone)]
pub enum UpscaleOutput {
    Full(RasterImage),
    Preview(PreviewDescriptor),
}

impl UpscaleOutput {
    /// Dimensions of the requested result (for a preview, the virtual target).
    pub fn target_dims(&self) -> Dims {
        match self {
            UpscaleOutput::Full(image) => image.dims(),
            UpscaleOutput::Preview(p) => p.target(),
        }
    }

    pub fn is_preview(&self) -> bool {
        matches!(self, UpscaleOutput::Preview(_))
    }

    pub fn into_full(self) -> Option<RasterImage> {
        match self {
            UpscaleOutput::Full(image) => Some(image),
            UpscaleOutput::Preview(_) => None,
        }
    }
}

/// A finished session.
#[derive(Debug)]
pub struct UpscaleResult {
    pub session: SessionId,
    pub output: UpscaleOutput,
    pub metrics: UpscaleMetrics,
}

/// Tracker snapshots for both resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct EngineUsage {
    pub gpu: Option<UsageSnapshot>,
    pub host: UsageSnapshot,
}

/// State shared by the engine handle and every running session.
pub(crate) struct EngineShared {
    pub(crate) config: EngineConfig,
    pub(crate) profile: HardwareProfile,
    pub(crate) strategy: Box<dyn ScaleStrategy>,
    pub(crate) host: HostPool,
    pub(crate) cpu: CpuExecutor,
    pub(crate) gpu: Option<GpuExecutor>,
    /// GPU stages hold a read guard; pressure reclamation takes the write guard.
    pub(crate) gate: RwLock<()>,
    pub(crate) sessions: SessionStore,
}

impl EngineShared {
    pub(crate) fn host_tracker(&self) -> &MemoryTracker {
        self.host.tracker()
    }

    pub(crate) fn gpu_tracker(&self) -> Option<&MemoryTracker> {
        self.gpu.as_ref().map(|g| g.device_pool().tracker())
    }

    /// Current headroom; the GPU lane is left out when `gpu_enabled` is false.
    pub(crate) fn budget_snapshot(&self, gpu_enabled: bool) -> BudgetSnapshot {
        let gpu = self
            .gpu_tracker()
            .filter(|_| gpu_enabled)
            .map(MemoryTracker::usage);
        BudgetSnapshot::from_usage(gpu.as_ref(), &self.host_tracker().usage())
    }

    pub(crate) fn plan(&self, request: &PlanRequest) -> Result<ScalePlan, UpscaleError> {
        Ok(self.strategy.plan(request)?)
    }

    /// Frees idle blocks in both pools. Callers hold the write gate.
    pub(crate) fn reclaim_idle(&self) -> u64 {
        let gpu = self.gpu.as_ref().map_or(0, |g| g.device_pool().reclaim());
        gpu + self.host.reclaim()
    }
}

/// Handle to a running session.
pub struct SessionHandle {
    id: SessionId,
    progress: Option<ProgressReceiver>,
    task: JoinHandle<Result<UpscaleResult, UpscaleError>>,
    shared: Arc<EngineShared>,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Takes the progress stream. Returns `None` on the second call.
    pub fn take_progress(&mut self) -> Option<ProgressReceiver> {
        self.progress.take()
    }

    /// Current state of the session.
    pub fn info(&self) -> Option<SessionInfo> {
        self.shared.sessions.get(self.id)
    }

    /// Waits for the session to finish and removes it from the store.
    pub async fn wait(self) -> Result<UpscaleResult, UpscaleError> {
        let joined = self.task.await;
        self.shared.sessions.remove(self.id);
        joined.map_err(|e| UpscaleError::Internal(format!("session task failed: {e}")))?
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle").field("id", &self.id).finish()
    }
}

/// The primary upscaling engine.
///
/// Cheap to clone; clones share trackers, pools and the session store.
///
/// # Example
/// ```no_run
/// use hardware_profile::HardwareProfile;
/// use raster_core::{Dims, PixelFormat, RasterImage};
/// use runtime::{EngineConfig, UpscaleEngine, UpscaleRequest};
///
/// # async fn example() -> Result<(), runtime::UpscaleError> {
/// let profile = HardwareProfile::cpu_only(1 << 30, 4);
/// let engine = UpscaleEngine::new(EngineConfig::default(), profile, None)?;
/// let image = RasterImage::zeros(Dims::new(64, 48), PixelFormat::RGB8)?;
/// let result = engine.run(UpscaleRequest::new(image, 3.0)).await?;
/// println!("{}", result.metrics.summary());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct UpscaleEngine {
    shared: Arc<EngineShared>,
}

impl UpscaleEngine {
    /// Builds an engine for `profile`.
    ///
    /// The GPU lane exists only if the profile reports GPU memory and a
    /// `device` is supplied.
    pub fn new(
        config: EngineConfig,
        profile: HardwareProfile,
        device: Option<Arc<dyn GpuDevice>>,
    ) -> Result<Self, UpscaleError> {
        config.validate()?;
        profile.validate()?;
        let strategy = config.create_strategy()?;

        let host_budget = ResourceBudget::new(
            MemoryBudget::from_bytes(profile.host_memory_bytes),
            config.host_safety_fraction,
        )?;
        let host = BufferPool::host(MemoryTracker::new(Resource::Host, host_budget), config.pool_config());

        let threads = config.resolve_threads(profile.cpu_core_count);
        let cpu = CpuExecutor::new(host.clone(), config.kernel, config.tile_rows, Some(threads))?;

        let gpu = match (profile.has_gpu(), device) {
            (true, Some(device)) => {
                let budget = ResourceBudget::new(
                    MemoryBudget::from_bytes(profile.gpu_memory_bytes),
                    config.gpu_safety_fraction,
                )?;
                Some(GpuExecutor::new(
                    device,
                    MemoryTracker::new(Resource::Gpu, budget),
                    config.pool_config(),
                    host.clone(),
                    config.kernel,
                ))
            }
            (true, None) => {
                tracing::warn!("profile reports a GPU but no device was supplied; running CPU-only");
                None
            }
            (false, _) => None,
        };

        tracing::info!(
            strategy = strategy.name(),
            kernel = %config.kernel,
            threads,
            host_limit = host.tracker().limit_bytes(),
            gpu = gpu.as_ref().map(|g| g.device_name().to_string()),
            "engine created"
        );

        Ok(Self {
            shared: Arc::new(EngineShared {
                config,
                profile,
                strategy,
                host,
                cpu,
                gpu,
                gate: RwLock::new(()),
                sessions: SessionStore::new(),
            }),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    pub fn profile(&self) -> &HardwareProfile {
        &self.shared.profile
    }

    pub fn strategy_name(&self) -> &str {
        self.shared.strategy.name()
    }

    pub fn has_gpu(&self) -> bool {
        self.shared.gpu.is_some()
    }

    pub fn host_tracker(&self) -> &MemoryTracker {
        self.shared.host_tracker()
    }

    pub fn gpu_tracker(&self) -> Option<&MemoryTracker> {
        self.shared.gpu_tracker()
    }

    pub fn usage(&self) -> EngineUsage {
        EngineUsage {
            gpu: self.shared.gpu_tracker().map(MemoryTracker::usage),
            host: self.shared.host_tracker().usage(),
        }
    }

    /// Plans `source × factor` against the current budgets without running it.
    pub fn plan(&self, source: Dims, format: PixelFormat, factor: f64) -> Result<ScalePlan, UpscaleError> {
        let budget = self.shared.budget_snapshot(true);
        let policy = if self.has_gpu() { LanePolicy::GpuPreferred } else { LanePolicy::CpuOnly };
        self.shared
            .plan(&PlanRequest::new(source, format, factor, budget).with_policy(policy))
    }

    /// Starts a session on the current tokio runtime.
    ///
    /// # Panics
    /// Panics if called outside a tokio runtime.
    pub fn submit(&self, request: UpscaleRequest, token: CancellationToken) -> SessionHandle {
        self.shared.sessions.gc_expired(self.shared.config.session_ttl());

        let provisional = request.label.clone().unwrap_or_else(|| "session".to_string());
        let id = self.shared.sessions.insert(&provisional);
        let label = request.label.clone().unwrap_or_else(|| id.to_string());
        self.shared.sessions.update(id, |s| s.label = label.clone());

        let (publisher, progress) = ProgressPublisher::channel(id);
        let orchestrator = Orchestrator::new(Arc::clone(&self.shared), id, label, token, publisher);
        let task = tokio::spawn(orchestrator.run(request));

        SessionHandle {
            id,
            progress: Some(progress),
            task,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Runs one session to completion.
    pub async fn run(&self, request: UpscaleRequest) -> Result<UpscaleResult, UpscaleError> {
        self.submit(request, CancellationToken::new()).wait().await
    }

    pub fn session(&self, id: SessionId) -> Option<SessionInfo> {
        self.shared.sessions.get(id)
    }

    pub fn sessions(&self) -> Vec<SessionInfo> {
        self.shared.sessions.list()
    }

    /// Frees every idle pool block, waiting for in-flight GPU stages first.
    pub async fn reclaim_idle(&self) -> u64 {
        let _exclusive = self.shared.gate.write().await;
        self.shared.reclaim_idle()
    }
}

impl std::fmt::Debug for UpscaleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpscaleEngine")
            .field("strategy", &self.shared.strategy.name())
            .field("gpu", &self.shared.gpu.as_ref().map(|g| g.device_name()))
            .field("host_limit", &self.shared.host_tracker().limit_bytes())
            .field("sessions", &self.shared.sessions.len())
            .finish()
    }
}
