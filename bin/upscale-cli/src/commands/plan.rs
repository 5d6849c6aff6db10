// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `upscale plan` command: print the stage plan for a hypothetical source.
//!
//! No pixels are allocated; the plan is computed against the budgets of
//! the given hardware exactly as a session would see them at submission.

use super::{hardware, mb};
use crate::HardwareArgs;
use raster_core::{BitDepth, Dims, PixelFormat};
use runtime::{EngineConfig, UpscaleEngine};

pub fn execute(
    config: EngineConfig,
    hardware_args: HardwareArgs,
    width: u32,
    height: u32,
    factor: f64,
    channels: u8,
    json: bool,
) -> anyhow::Result<()> {
    let (profile, device) = hardware(&hardware_args)?;
    let format = PixelFormat::new(channels, BitDepth::U8)?;
    let engine = UpscaleEngine::new(config, profile, device)?;
    let plan = engine.plan(Dims::new(width, height), format, factor)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    println!("  Hardware: {}", engine.profile().summary());
    if let Some(gpu) = engine.gpu_tracker() {
        println!("  GPU limit:  {:.2} MB", mb(gpu.limit_bytes()));
    }
    println!("  Host limit: {:.2} MB", mb(engine.host_tracker().limit_bytes()));
    println!("  Plan: {}", plan.summary());
    println!();
    println!(
        "  {:>5}  {:<4} {:>8} {:>13} {:>13} {:>10} {:>12}",
        "Stage", "Lane", "Mult", "Input", "Output", "Cumul.", "Est. MB",
    );
    println!("  {}", "-".repeat(72));
    for stage in &plan.stages {
        println!(
            "  {:>5}  {:<4} {:>8.3} {:>13} {:>13} {:>10.3} {:>12.2}",
            stage.index,
            stage.lane.to_string(),
            stage.multiplier,
            stage.input.to_string(),
            stage.output.to_string(),
            stage.cumulative_factor,
            mb(stage.estimated_memory_bytes),
        );
    }
    println!();
    println!("  Peak estimate: {:.2} MB", mb(plan.peak_estimate_bytes()));
    Ok(())
}
