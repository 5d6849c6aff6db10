// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `upscale run` command: decode, upscale, encode.
//!
//! ```text
//! decode ─▶ UpscaleEngine::submit ─▶ progress ─▶ wait ─▶ encode | preview
//! ```
//! Ctrl-C cancels the session; everything it reserved is released before
//! the command exits.

use super::{hardware, mb, parse_budget};
use crate::HardwareArgs;
use anyhow::Context;
use raster_core::{Dims, PixelFormat};
use runtime::{
    codec, preview, CancellationToken, EngineConfig, OutputMode, UpscaleEngine, UpscaleOutput, UpscaleRequest,
};
use std::path::PathBuf;

/// Target dims when `mode` will produce a preview instead of running stages.
fn preview_target(mode: OutputMode, source: Dims, format: PixelFormat, factor: f64) -> Option<Dims> {
    let target = source.checked_scaled(factor.max(1.0))?;
    preview::needs_preview(mode, target, format).then_some(target)
}

pub async fn execute(
    config: EngineConfig,
    hardware_args: HardwareArgs,
    input: PathBuf,
    output: PathBuf,
    factor: f64,
    display_max: Option<String>,
) -> anyhow::Result<()> {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║               upscale · Session Runner               ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();

    // ── Configuration ──────────────────────────────────────────
    let (profile, device) = hardware(&hardware_args)?;
    let mode = match display_max {
        Some(limit) => OutputMode::Display {
            max_bytes: parse_budget(&limit)?,
        },
        None => OutputMode::Materialize,
    };

    let image = codec::decode_file(&input).with_context(|| format!("failed to read '{}'", input.display()))?;
    println!("  Input:    {} ({}, {})", input.display(), image.dims(), image.format());
    println!("  Factor:   {factor}");
    println!("  Hardware: {}", profile.summary());
    println!("  Strategy: {} / {}", config.strategy, config.kernel);
    println!();

    let engine = UpscaleEngine::new(config, profile, device)?;
    match preview_target(mode, image.dims(), image.format(), factor) {
        Some(target) => println!("  Plan:     preview only, the {target} result exceeds the display limit"),
        None => match engine.plan(image.dims(), image.format(), factor) {
            Ok(plan) => println!("  Plan:     {}", plan.summary()),
            Err(e) if matches!(mode, OutputMode::Display { .. }) => println!("  Plan:     unavailable ({e})"),
            Err(e) => return Err(e.into()),
        },
    }
    println!();

    // ── Session ────────────────────────────────────────────────
    let token = CancellationToken::new();
    let request = UpscaleRequest::new(image, factor)
        .with_label(input.file_stem().map_or_else(|| "input".into(), |s| s.to_string_lossy().into_owned()))
        .with_output(mode);
    let mut handle = engine.submit(request, token.clone());

    let cancel = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; cancelling");
            cancel.cancel();
        }
    });

    if let Some(mut progress) = handle.take_progress() {
        tokio::spawn(async move {
            while let Some(event) = progress.recv().await {
                println!("  [{:>5.1}%] {}", event.percent, event.message);
            }
        });
    }

    let result = handle.wait().await?;
    println!();

    // ── Output ─────────────────────────────────────────────────
    match &result.output {
        UpscaleOutput::Full(image) => {
            codec::encode_file(image, &output).with_context(|| format!("failed to write '{}'", output.display()))?;
            println!("  Wrote {} ({})", output.display(), image.dims());
        }
        UpscaleOutput::Preview(preview) => {
            codec::encode_file(&preview.preview, &output)
                .with_context(|| format!("failed to write '{}'", output.display()))?;
            println!(
                "  Wrote preview {} ({}) of a virtual {} result",
                output.display(),
                preview.preview.dims(),
                preview.target(),
            );
        }
    }
    println!();
    println!("  Metrics:");
    println!("   {}", result.metrics.summary());
    for stage in &result.metrics.stages {
        println!(
            "   stage {:>2}  {:<3}  x{:<6.3} {:>11} -> {:<11} {:>9.2} ms  {}",
            stage.index,
            stage.lane,
            stage.multiplier,
            stage.input.to_string(),
            stage.output.to_string(),
            stage.duration.as_secs_f64() * 1000.0,
            stage.outcome,
        );
    }

    let usage = engine.usage();
    println!();
    println!("  Memory:");
    println!("   Host peak {:.2} MB of {:.2} MB", mb(result.metrics.peak_host_bytes), mb(usage.host.limit_bytes));
    if let Some(gpu) = usage.gpu {
        println!("   GPU  peak {:.2} MB of {:.2} MB", mb(result.metrics.peak_gpu_bytes), mb(gpu.limit_bytes));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_target() {
        let display = OutputMode::Display { max_bytes: 10_000 };
        let source = Dims::new(100, 80);

        assert_eq!(preview_target(display, source, PixelFormat::RGB8, 10.0), Some(Dims::new(1000, 800)));
        assert_eq!(preview_target(display, Dims::new(20, 10), PixelFormat::RGB8, 2.0), None);
        assert_eq!(preview_target(OutputMode::Materialize, source, PixelFormat::RGB8, 10.0), None);
        // Unrepresentable targets are left to the engine to reject.
        assert_eq!(preview_target(display, source, PixelFormat::RGB8, 1e9), None);
    }
}
