// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Previews for results too large to materialize for display.
//!
//! The preview is resampled from the original source straight to a bounded
//! size. The full-resolution result is never allocated.

use crate::UpscaleError;
use raster_core::{Dims, PixelFormat, RasterImage};
use scale_planner::{Lane, Stage};
use stage_exec::{CpuExecutor, FailureReason, HostPool, ImageBuffer, StageExecutor, StageOutcome};

/// How the caller wants the result delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputMode {
    /// Always produce the full-resolution output.
    #[default]
    Materialize,
    /// Return a preview when the full output would exceed `max_bytes`.
    Display { max_bytes: u64 },
}

/// A bounded stand-in for an output too large to materialize.
#[derive(Debug, Clone)]
pub struct PreviewDescriptor {
    pub preview: RasterImage,
    pub target_width: u32,
    pub target_height: u32,
    /// Always `true`: the full result does not exist.
    pub is_virtual: bool,
}

impl PreviewDescriptor {
    pub fn target(&self) -> Dims {
        Dims::new(self.target_width, self.target_height)
    }
}

/// Returns `true` if `mode` asks for a preview of a `target` × `format` result.
pub fn needs_preview(mode: OutputMode, target: Dims, format: PixelFormat) -> bool {
    match mode {
        OutputMode::Materialize => false,
        OutputMode::Display { max_bytes } => target.size_bytes(format) > max_bytes,
    }
}

/// Preview dims: `target` scaled to fit `max_edge`, aspect preserved.
pub fn preview_dims(target: Dims, max_edge: u32) -> Dims {
    target.fit_within(max_edge)
}

/// Resamples `source` directly to the preview size of `target`.
pub fn generate(
    source: &RasterImage,
    target: Dims,
    max_edge: u32,
    cpu: &CpuExecutor,
    host: &HostPool,
    label: &str,
) -> Result<PreviewDescriptor, UpscaleError> {
    let dims = preview_dims(target, max_edge);
    let input = ImageBuffer::from_raster(source, host)
        .map_err(|e| UpscaleError::ResourceExhausted(format!("preview input: {e}")))?;
    let stage = Stage {
        index: 0,
        multiplier: dims.width as f64 / source.dims().width as f64,
        lane: Lane::Cpu,
        input: source.dims(),
        output: dims,
        cumulative_factor: dims.width as f64 / source.dims().width as f64,
        estimated_memory_bytes: dims.size_bytes(source.format()),
    };
    tracing::info!(session = label, %target, preview = %dims, "Generating preview");

    let preview = match cpu.execute(&stage, input, label) {
        StageOutcome::Completed(out) => out.into_raster()?,
        StageOutcome::Recoverable { reason, .. } | StageOutcome::Fatal { reason } => {
            return Err(match reason {
                FailureReason::HostOutOfMemory { .. } => UpscaleError::ResourceExhausted(reason.to_string()),
                other => UpscaleError::Internal(other.to_string()),
            });
        }
    };
    Ok(PreviewDescriptor {
        preview,
        target_width: target.width,
        target_height: target.height,
        is_virtual: true,
    })
}
