// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Example: Compare scale plans across GPU budgets, then run one session.
//!
//! Shows how the ladder trades stage count for per-stage memory as the GPU
//! shrinks, and where the plan hands over to the CPU lane.
//!
//! ```bash
//! cargo run -p runtime --example plan_comparison
//! ```

use hardware_profile::HardwareProfile;
use memory_manager::MemoryBudget;
use raster_core::{Dims, PixelFormat, RasterImage};
use runtime::{EngineConfig, UpscaleEngine, UpscaleRequest};
use scale_planner::Lane;
use stage_exec::SoftwareDevice;
use std::sync::Arc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .init();

    let source = Dims::new(2000, 3000);
    let host = MemoryBudget::from_gb(64);
    let gpus = [
        MemoryBudget::from_mb(512),
        MemoryBudget::from_gb(3),
        MemoryBudget::from_gb(24),
    ];

    println!(
        "{:<10} {:>7} {:>8} {:>5} {:>5} {:>14}  Multipliers",
        "GPU", "Factor", "Stages", "GPU", "CPU", "Peak est. MB",
    );
    println!("{}", "-".repeat(80));

    for gpu in gpus {
        let profile = HardwareProfile::cpu_only(host.as_bytes(), 8).with_gpu(gpu.as_bytes());
        let engine = UpscaleEngine::new(EngineConfig::default(), profile, Some(Arc::new(SoftwareDevice::new())))?;
        for factor in [4.0, 8.0, 15.0] {
            match engine.plan(source, PixelFormat::RGB8, factor) {
                Ok(plan) => {
                    let multipliers: Vec<String> = plan.multipliers().iter().map(|m| format!("{m:.3}")).collect();
                    println!(
                        "{:<10} {:>7.1} {:>8} {:>5} {:>5} {:>14.1}  {}",
                        format!("{gpu}"),
                        factor,
                        plan.num_stages(),
                        plan.count_lane(Lane::Gpu),
                        plan.count_lane(Lane::Cpu),
                        plan.peak_estimate_bytes() as f64 / (1024.0 * 1024.0),
                        multipliers.join(" "),
                    );
                }
                Err(e) => println!("{:<10} {:>7.1} FAIL: {e}", format!("{gpu}"), factor),
            }
        }
    }

    println!("\n--- Running a small session on the software device ---\n");
    let profile = HardwareProfile::cpu_only(MemoryBudget::from_gb(1).as_bytes(), 4)
        .with_gpu(MemoryBudget::from_mb(256).as_bytes());
    let engine = UpscaleEngine::new(EngineConfig::default(), profile, Some(Arc::new(SoftwareDevice::new())))?;
    let image = RasterImage::from_fn(Dims::new(200, 150), PixelFormat::RGB8, |x, y, ch| {
        ((x + y) as f32 * 2.0 + ch as f32 * 50.0) % 256.0
    })?;

    let rt = tokio::runtime::Runtime::new()?;
    let result = rt.block_on(engine.run(UpscaleRequest::new(image, 6.0)))?;

    println!("Output: {}", result.output.target_dims());
    println!("Metrics: {}", result.metrics.summary());
    println!("Host: {}", engine.host_tracker().stats().summary());

    Ok(())
}
