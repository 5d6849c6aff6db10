// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `upscale status` command: display host resources and engine configuration.
//!
//! Reads memory from procfs. On platforms without it the memory section is
//! skipped and the rest of the report still prints.

use super::mb;
use hardware_profile::{HardwareProfile, HostMemory};
use memory_manager::{MemoryBudget, ResourceBudget};
use runtime::EngineConfig;

pub fn execute(config: EngineConfig) -> anyhow::Result<()> {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║              upscale · Resource Status               ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();

    // ── Memory ─────────────────────────────────────────────────
    match HostMemory::read() {
        Ok(memory) => {
            let used = memory.total_bytes.saturating_sub(memory.available_bytes);
            let ratio = used as f64 / memory.total_bytes.max(1) as f64;
            println!("  Memory");
            println!("   Total:        {:.0} MB", mb(memory.total_bytes));
            println!("   Available:    {:.0} MB", mb(memory.available_bytes));
            println!("   Used:         {:.0} MB ({:.1}%)  {}", mb(used), ratio * 100.0, usage_bar(ratio));

            let budget = ResourceBudget::new(
                MemoryBudget::from_bytes(memory.available_bytes),
                config.host_safety_fraction,
            )?;
            println!(
                "   Host limit:   {:.0} MB ({:.0}% of available)",
                mb(budget.limit_bytes()),
                config.host_safety_fraction * 100.0,
            );
            println!();
        }
        Err(e) => {
            tracing::warn!("host memory unavailable: {e}");
            println!("  Memory: unavailable ({e})");
            println!();
        }
    }

    // ── CPU ────────────────────────────────────────────────────
    let cores = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    println!("  CPU");
    println!("   Cores:        {cores}");
    println!("   Workers:      {}", config.resolve_threads(cores));
    println!();

    // ── Engine ─────────────────────────────────────────────────
    println!("  Engine");
    println!("   Strategy:     {}", config.strategy);
    println!("   Ladder:       {:?}", config.ladder);
    println!("   Kernel:       {}", config.kernel);
    println!("   Overhead:     {:.2}x", config.overhead_factor);
    println!(
        "   Safety:       gpu {:.0}%, host {:.0}%",
        config.gpu_safety_fraction * 100.0,
        config.host_safety_fraction * 100.0,
    );
    println!("   High water:   {:.0}%", config.pressure_high_water * 100.0);
    println!();

    if let Ok(profile) = HardwareProfile::detect_host() {
        println!("{}", profile.summary());
    }
    Ok(())
}

/// Creates a visual usage bar (0.0-1.0 scale).
fn usage_bar(ratio: f64) -> String {
    let filled = ((ratio * 20.0).round() as usize).min(20);
    let symbol = if ratio >= 0.9 {
        "#"
    } else if ratio >= 0.7 {
        "="
    } else {
        "-"
    };
    format!("[{}{}]", symbol.repeat(filled), ".".repeat(20 - filled))
}
