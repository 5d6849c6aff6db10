// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Integration tests: end-to-end upscaling sessions.
//!
//! These tests drive the engine from submission through planning, stage
//! execution, fallback and delivery, checking that the planner, trackers,
//! executors and orchestrator compose correctly.

use hardware_profile::HardwareProfile;
use memory_manager::MemoryBudget;
use raster_core::{Dims, PixelFormat, RasterImage, ResampleKernel, ResamplePlan};
use runtime::{
    CancellationToken, EngineConfig, OutputMode, UpscaleEngine, UpscaleError, UpscaleRequest,
};
use scale_planner::{Lane, FACTOR_TOLERANCE};
use stage_exec::{DeviceError, DeviceMemory, DispatchJob, Fault, FaultInjector, GpuDevice, SoftwareDevice};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

const MB: u64 = 1024 * 1024;

// ── Helpers ────────────────────────────────────────────────────

fn gradient(w: u32, h: u32) -> RasterImage {
    RasterImage::from_fn(Dims::new(w, h), PixelFormat::RGB8, |x, y, c| {
        ((x * 7 + y * 13 + c as u32 * 40) % 256) as f32
    })
    .unwrap()
}

fn cpu_engine(host_bytes: u64) -> UpscaleEngine {
    let profile = HardwareProfile::cpu_only(host_bytes, 2);
    UpscaleEngine::new(EngineConfig::default(), profile, None).unwrap()
}

fn gpu_engine(config: EngineConfig, gpu_bytes: u64, device: Arc<dyn GpuDevice>) -> UpscaleEngine {
    let profile = HardwareProfile::cpu_only(256 * MB, 2).with_gpu(gpu_bytes);
    UpscaleEngine::new(config, profile, Some(device)).unwrap()
}

fn faulty_engine() -> (UpscaleEngine, Arc<FaultInjector>) {
    let faults = Arc::new(FaultInjector::new(Arc::new(SoftwareDevice::new())));
    let engine = gpu_engine(EngineConfig::default(), 256 * MB, faults.clone());
    (engine, faults)
}

// ── Planning properties ────────────────────────────────────────

#[test]
fn test_multipliers_multiply_to_target() {
    let budgets = [(None, 256 * MB), (Some(2 * MB), 256 * MB), (Some(256 * MB), 256 * MB)];
    for (gpu, host) in budgets {
        let profile = HardwareProfile::cpu_only(host, 4);
        let (profile, device): (_, Option<Arc<dyn GpuDevice>>) = match gpu {
            Some(bytes) => (profile.with_gpu(bytes), Some(Arc::new(SoftwareDevice::new()))),
            None => (profile, None),
        };
        let engine = UpscaleEngine::new(EngineConfig::default(), profile, device).unwrap();

        for factor in [1.0, 1.3, 2.0, 2.75, 4.0, 7.3, 15.0] {
            let source = Dims::new(120, 80);
            let plan = engine.plan(source, PixelFormat::RGB8, factor).unwrap();
            let product: f64 = plan.multipliers().iter().product();
            assert!(
                (product - factor).abs() / factor <= FACTOR_TOLERANCE,
                "factor {factor}: product {product} ({:?})",
                plan.multipliers()
            );
            let last = plan.stages.last().unwrap();
            assert_eq!(last.output, source.scaled(factor), "factor {factor}");
            for pair in plan.stages.windows(2) {
                assert_eq!(pair[0].output, pair[1].input);
            }
        }
    }
}

#[test]
fn test_large_photo_mixes_ladder_and_falls_back_to_cpu() {
    let profile = HardwareProfile::cpu_only(MemoryBudget::from_gb(64).as_bytes(), 8)
        .with_gpu(MemoryBudget::from_gb(3).as_bytes());
    let engine = UpscaleEngine::new(EngineConfig::default(), profile, Some(Arc::new(SoftwareDevice::new()))).unwrap();
    let gpu_limit = engine.gpu_tracker().unwrap().limit_bytes();

    let plan = engine.plan(Dims::new(2000, 3000), PixelFormat::RGB8, 15.0).unwrap();
    let multipliers = plan.multipliers();

    assert_eq!(plan.target, Dims::new(30000, 45000));
    assert!(multipliers.iter().any(|&m| m != 2.0), "not a pure 2x chain: {multipliers:?}");
    assert!(multipliers.contains(&1.5));
    assert!(multipliers.contains(&1.1));
    assert!(plan.count_lane(Lane::Gpu) > 0);
    assert!(plan.count_lane(Lane::Cpu) > 0);

    for stage in plan.stages.iter().filter(|s| s.lane == Lane::Gpu) {
        assert!(stage.estimated_memory_bytes <= gpu_limit, "stage {} over budget", stage.index);
    }
    // GPU stages come first; once the ladder outgrows the GPU it stays on CPU.
    let first_cpu = plan.stages.iter().position(|s| s.lane == Lane::Cpu).unwrap();
    assert!(plan.stages[first_cpu..].iter().all(|s| s.lane == Lane::Cpu));
}

// ── Session properties ─────────────────────────────────────────

#[tokio::test]
async fn test_output_dims_are_rounded_target() {
    let engine = cpu_engine(256 * MB);
    let source = gradient(37, 23);
    for factor in [1.3, 2.5, 3.7] {
        let result = engine.run(UpscaleRequest::new(source.clone(), factor)).await.unwrap();
        let out = result.output.into_full().unwrap();
        assert_eq!(out.dims(), source.dims().scaled(factor), "factor {factor}");
        assert_eq!(out.format(), PixelFormat::RGB8);
    }
}

#[tokio::test]
async fn test_lanes_produce_identical_pixels() {
    let source = gradient(40, 30);
    let cpu = cpu_engine(256 * MB)
        .run(UpscaleRequest::new(source.clone(), 8.0))
        .await
        .unwrap();
    let gpu = gpu_engine(EngineConfig::default(), 256 * MB, Arc::new(SoftwareDevice::new()))
        .run(UpscaleRequest::new(source, 8.0))
        .await
        .unwrap();

    assert_eq!(gpu.metrics.completed_on(Lane::Cpu), 0);
    assert_eq!(cpu.output.into_full().unwrap(), gpu.output.into_full().unwrap());
}

#[tokio::test]
async fn test_memory_never_exceeds_limits() {
    let profile = HardwareProfile::cpu_only(8 * MB, 2).with_gpu(2 * MB);
    let engine = UpscaleEngine::new(EngineConfig::default(), profile, Some(Arc::new(SoftwareDevice::new()))).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let request = UpscaleRequest::new(gradient(64, 48), 6.0).with_label(format!("job-{i}"));
            engine.submit(request, CancellationToken::new())
        })
        .collect();
    for handle in handles {
        let result = handle.wait().await.unwrap();
        assert_eq!(result.output.target_dims(), Dims::new(384, 288));
    }

    let host = engine.host_tracker();
    let gpu = engine.gpu_tracker().unwrap();
    assert!(host.stats().peak_committed_bytes <= host.limit_bytes());
    assert!(gpu.stats().peak_committed_bytes <= gpu.limit_bytes());
    assert_eq!(host.usage().reserved_bytes, 0);
    assert_eq!(gpu.usage().reserved_bytes, 0);
}

#[tokio::test]
async fn test_gpu_oom_midway_reuses_completed_stages() {
    let (engine, faults) = faulty_engine();
    faults.inject("oom", 1, Fault::OutOfMemory);

    let source = gradient(40, 30);
    let result = engine
        .run(UpscaleRequest::new(source.clone(), 8.0).with_label("oom"))
        .await
        .unwrap();
    let stages = &result.metrics.stages;

    assert_eq!(result.metrics.fallbacks, 1);
    assert_eq!(result.metrics.replans, 1);
    assert_eq!((stages[0].lane, stages[0].outcome), (Lane::Gpu, "completed"));
    assert_eq!((stages[1].lane, stages[1].outcome), (Lane::Gpu, "recoverable"));
    // The retried stage starts from stage 0's output, not from the source.
    assert_eq!(stages[2].index, 1);
    assert_eq!(stages[2].lane, Lane::Cpu);
    assert_eq!(stages[2].input, stages[0].output);
    assert!(stages[2..].iter().all(|s| s.lane == Lane::Cpu && s.outcome == "completed"));

    let reference = cpu_engine(256 * MB).run(UpscaleRequest::new(source, 8.0)).await.unwrap();
    assert_eq!(result.output.into_full().unwrap(), reference.output.into_full().unwrap());
}

#[tokio::test]
async fn test_device_lost_disables_gpu_for_its_session_only() {
    let (engine, faults) = faulty_engine();
    faults.inject_always("lost", Fault::DeviceLost);

    let lost = engine.submit(
        UpscaleRequest::new(gradient(40, 30), 8.0).with_label("lost"),
        CancellationToken::new(),
    );
    let healthy = engine.submit(
        UpscaleRequest::new(gradient(40, 30), 8.0).with_label("healthy"),
        CancellationToken::new(),
    );
    let (lost, healthy) = (lost.wait().await.unwrap(), healthy.wait().await.unwrap());

    // One failed dispatch, then the session never touches the device again.
    assert_eq!(faults.dispatch_count("lost"), 1);
    assert_eq!(lost.metrics.completed_on(Lane::Gpu), 0);
    assert_eq!(lost.metrics.fallbacks, 1);
    assert_eq!(lost.output.target_dims(), Dims::new(320, 240));

    assert_eq!(healthy.metrics.fallbacks, 0);
    assert_eq!(healthy.metrics.completed_on(Lane::Cpu), 0);
    assert_eq!(faults.dispatch_count("healthy"), healthy.metrics.completed_on(Lane::Gpu));
    assert!(engine.has_gpu());
}

#[tokio::test]
async fn test_compile_failure_falls_back_to_cpu() {
    let (engine, faults) = faulty_engine();
    faults.inject("compile", 0, Fault::KernelCompile);

    let result = engine
        .run(UpscaleRequest::new(gradient(40, 30), 4.0).with_label("compile"))
        .await
        .unwrap();
    assert_eq!(result.metrics.fallbacks, 1);
    assert_eq!(result.metrics.completed_on(Lane::Gpu), 0);
    assert_eq!(faults.dispatch_count("compile"), 1);
    assert_eq!(result.output.target_dims(), Dims::new(160, 120));
}

#[tokio::test]
async fn test_cancelled_before_start_returns_reservations() {
    let engine = cpu_engine(256 * MB);
    let baseline = engine.usage().host.reserved_bytes;

    let token = CancellationToken::new();
    token.cancel();
    let err = engine
        .submit(UpscaleRequest::new(gradient(40, 30), 4.0), token)
        .wait()
        .await
        .unwrap_err();

    assert!(matches!(err, UpscaleError::Cancelled));
    assert_eq!(engine.usage().host.reserved_bytes, baseline);
    assert_eq!(engine.host_tracker().stats().total_acquires, 0);
}

/// Software device that parks one dispatch until the test lets it go.
struct GatedDevice {
    inner: SoftwareDevice,
    hold_at: usize,
    dispatches: AtomicUsize,
    entered: mpsc::UnboundedSender<usize>,
    release: Mutex<std_mpsc::Receiver<()>>,
}

impl GatedDevice {
    fn new(hold_at: usize) -> (Arc<Self>, mpsc::UnboundedReceiver<usize>, std_mpsc::Sender<()>) {
        let (entered, entered_rx) = mpsc::unbounded_channel();
        let (release_tx, release) = std_mpsc::channel();
        let device = Arc::new(Self {
            inner: SoftwareDevice::new(),
            hold_at,
            dispatches: AtomicUsize::new(0),
            entered,
            release: Mutex::new(release),
        });
        (device, entered_rx, release_tx)
    }

    fn dispatch_count(&self) -> usize {
        self.dispatches.load(Ordering::SeqCst)
    }
}

impl GpuDevice for GatedDevice {
    fn name(&self) -> &str {
        "gated"
    }

    fn storage_bytes(&self, dims: Dims, format: PixelFormat) -> u64 {
        self.inner.storage_bytes(dims, format)
    }

    fn scratch_bytes(&self, plan: &ResamplePlan) -> u64 {
        self.inner.scratch_bytes(plan)
    }

    fn allocate(&self, bytes: u64) -> Result<Box<dyn DeviceMemory>, DeviceError> {
        self.inner.allocate(bytes)
    }

    fn prepare(&self, kernel: ResampleKernel) -> Result<(), DeviceError> {
        self.inner.prepare(kernel)
    }

    fn upload(&self, src: &[u8], format: PixelFormat, dst: &mut dyn DeviceMemory) -> Result<(), DeviceError> {
        self.inner.upload(src, format, dst)
    }

    fn dispatch(&self, job: &DispatchJob<'_>, src: &dyn DeviceMemory, dst: &mut dyn DeviceMemory) -> Result<(), DeviceError> {
        let n = self.dispatches.fetch_add(1, Ordering::SeqCst);
        if n == self.hold_at {
            let _ = self.entered.send(n);
            let _ = self.release.lock().unwrap().recv();
        }
        self.inner.dispatch(job, src, dst)
    }

    fn download(&self, src: &dyn DeviceMemory, format: PixelFormat, dst: &mut [u8]) -> Result<(), DeviceError> {
        self.inner.download(src, format, dst)
    }
}

#[tokio::test]
async fn test_cancel_mid_session_releases_everything() {
    // 40x30 at 8x on a roomy GPU is three 2x GPU stages; park the second.
    let (device, mut entered, release) = GatedDevice::new(1);
    let engine = gpu_engine(EngineConfig::default(), 256 * MB, device.clone());
    let plan = engine.plan(Dims::new(40, 30), PixelFormat::RGB8, 8.0).unwrap();
    assert_eq!(plan.num_stages(), 3);
    assert_eq!(plan.count_lane(Lane::Gpu), 3);

    let baseline = engine.usage();
    let token = CancellationToken::new();
    let handle = engine.submit(
        UpscaleRequest::new(gradient(40, 30), 8.0).with_label("cancel"),
        token.clone(),
    );

    assert_eq!(entered.recv().await, Some(1));
    token.cancel();
    release.send(()).unwrap();

    let err = handle.wait().await.unwrap_err();
    assert!(matches!(err, UpscaleError::Cancelled), "unexpected {err}");
    // The parked stage finished, its output was dropped and stage 2 never ran.
    assert_eq!(device.dispatch_count(), 2);

    let usage = engine.usage();
    assert_eq!(usage.host.reserved_bytes, baseline.host.reserved_bytes);
    assert_eq!(usage.gpu.unwrap().reserved_bytes, baseline.gpu.unwrap().reserved_bytes);

    engine.reclaim_idle().await;
    let usage = engine.usage();
    assert_eq!(usage.host.committed_bytes(), 0);
    assert_eq!(usage.gpu.unwrap().committed_bytes(), 0);
}

#[tokio::test]
async fn test_progress_is_monotonic_and_completes() {
    let (engine, faults) = faulty_engine();
    faults.inject("progress", 1, Fault::OutOfMemory);

    let mut handle = engine.submit(
        UpscaleRequest::new(gradient(40, 30), 8.0).with_label("progress"),
        CancellationToken::new(),
    );
    let id = handle.id();
    let mut rx = handle.take_progress().unwrap();
    assert!(handle.take_progress().is_none());
    handle.wait().await.unwrap();

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    assert!(events.iter().all(|e| e.session == id));
    assert!(events.windows(2).all(|w| w[0].percent <= w[1].percent));
    assert_eq!(events.last().unwrap().percent, 100.0);
    assert!(events.iter().any(|e| e.message.contains("fell back")));
}

#[tokio::test]
async fn test_pressure_moves_stages_to_cpu() {
    let config = EngineConfig {
        pressure_high_water: 0.05,
        ..EngineConfig::default()
    };
    let engine = gpu_engine(config, 256 * MB, Arc::new(SoftwareDevice::new()));
    let gpu = engine.gpu_tracker().unwrap();
    let held = gpu.try_reserve(gpu.limit_bytes() / 10).unwrap();

    let result = engine.run(UpscaleRequest::new(gradient(40, 30), 4.0)).await.unwrap();
    drop(held);

    assert!(result.metrics.pressure_downgrades > 0);
    assert_eq!(result.metrics.pressure_downgrades, result.metrics.planned_stages);
    assert_eq!(result.metrics.completed_on(Lane::Gpu), 0);
    assert_eq!(result.metrics.fallbacks, 0);
    assert_eq!(result.output.target_dims(), Dims::new(160, 120));
}

// ── Scenarios ──────────────────────────────────────────────────

#[tokio::test]
async fn test_unit_factor_is_single_passthrough() {
    let engine = cpu_engine(MemoryBudget::from_gb(1).as_bytes());
    let source = RasterImage::zeros(Dims::new(4000, 6000), PixelFormat::RGB8).unwrap();

    let plan = engine.plan(source.dims(), source.format(), 1.0).unwrap();
    assert!(plan.is_identity());
    assert_eq!(plan.num_stages(), 1);

    let result = engine.run(UpscaleRequest::new(source.clone(), 1.0)).await.unwrap();
    assert_eq!(result.metrics.stages.len(), 1);
    assert_eq!(result.metrics.stages[0].multiplier, 1.0);
    // Only the source copy is ever allocated.
    assert_eq!(engine.host_tracker().stats().total_acquires, 1);
    assert_eq!(result.output.into_full().unwrap(), source);
}

#[tokio::test]
async fn test_source_larger_than_host_is_infeasible() {
    let engine = cpu_engine(MB);
    let source = gradient(1000, 1000);

    assert!(matches!(
        engine.plan(source.dims(), source.format(), 2.0),
        Err(UpscaleError::InfeasibleScale(_))
    ));
    let err = engine.run(UpscaleRequest::new(source, 2.0)).await.unwrap_err();
    assert!(matches!(err, UpscaleError::InfeasibleScale(_)), "got {err}");
    assert_eq!(engine.host_tracker().stats().total_acquires, 0);
}

#[tokio::test]
async fn test_display_mode_checks_feasibility_first() {
    let engine = cpu_engine(MB);
    let request =
        UpscaleRequest::new(gradient(1000, 1000), 2.0).with_output(OutputMode::Display { max_bytes: 10_000 });
    let err = engine.run(request).await.unwrap_err();
    assert!(matches!(err, UpscaleError::InfeasibleScale(_)), "got {err}");
    assert_eq!(engine.host_tracker().stats().total_acquires, 0);
}

#[tokio::test]
async fn test_unrepresentable_target_is_infeasible() {
    let engine = cpu_engine(256 * MB);
    let source = RasterImage::zeros(Dims::new(10, 10), PixelFormat::RGBA16).unwrap();

    assert!(matches!(
        engine.plan(source.dims(), source.format(), 1e9),
        Err(UpscaleError::InfeasibleScale(_))
    ));
    for output in [OutputMode::Materialize, OutputMode::Display { max_bytes: 10_000 }] {
        let request = UpscaleRequest::new(source.clone(), 1e9).with_output(output);
        let err = engine.run(request).await.unwrap_err();
        assert!(matches!(err, UpscaleError::InfeasibleScale(_)), "{output:?}: got {err}");
    }
}

#[tokio::test]
async fn test_display_mode_returns_preview() {
    let config = EngineConfig {
        max_preview_edge: 256,
        ..EngineConfig::default()
    };
    let engine = UpscaleEngine::new(config, HardwareProfile::cpu_only(256 * MB, 2), None).unwrap();

    let request = UpscaleRequest::new(gradient(100, 80), 10.0).with_output(OutputMode::Display { max_bytes: 10_000 });
    let result = engine.run(request).await.unwrap();

    assert!(result.metrics.preview);
    assert!(result.metrics.stages.is_empty());
    assert!(result.output.is_preview());
    assert_eq!(result.output.target_dims(), Dims::new(1000, 800));
    let runtime::UpscaleOutput::Preview(descriptor) = result.output else {
        unreachable!()
    };
    assert!(descriptor.is_virtual);
    assert!(descriptor.preview.dims().width.max(descriptor.preview.dims().height) <= 256);
}

#[tokio::test]
async fn test_display_mode_materializes_small_results() {
    let engine = cpu_engine(256 * MB);
    let request = UpscaleRequest::new(gradient(10, 8), 2.0).with_output(OutputMode::Display { max_bytes: MB });
    let result = engine.run(request).await.unwrap();
    assert!(!result.output.is_preview());
    assert_eq!(result.output.target_dims(), Dims::new(20, 16));
}
