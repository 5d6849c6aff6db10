// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # runtime
//!
//! The progressive upscaling engine.
//!
//! The runtime takes:
//! - A `RasterImage` and a target factor.
//! - A `HardwareProfile` describing GPU memory, host memory and cores.
//! - An optional `GpuDevice` from `stage-exec`.
//!
//! And runs the image through a ladder of resampling stages planned by
//! `scale-planner`, moving each stage between the GPU and CPU lanes as memory
//! allows and replanning on the CPU when a GPU stage fails.
//!
//! # Session lifecycle
//! ```text
//! submit ─▶ Planning ─▶ Executing ⇄ Stalled ─▶ Complete | Failed
//! ```
//! Each session runs as one tokio task. Sessions share the engine's memory
//! trackers; the trackers are the only source of truth for capacity.
//!
//! # Output
//! `OutputMode::Materialize` always yields the full image. With
//! `OutputMode::Display { max_bytes }` a target larger than `max_bytes` yields
//! a bounded preview and the stage pipeline never runs.

pub mod codec;
mod config;
mod engine;
mod error;
pub mod fallback;
mod metrics;
mod orchestrator;
pub mod preview;
mod progress;
mod session;

pub use config::EngineConfig;
pub use engine::{EngineUsage, SessionHandle, UpscaleEngine, UpscaleOutput, UpscaleRequest, UpscaleResult};
pub use error::UpscaleError;
pub use metrics::{StageMetrics, UpscaleMetrics};
pub use preview::{OutputMode, PreviewDescriptor};
pub use progress::{ProgressEvent, ProgressPublisher, ProgressReceiver};
pub use session::{SessionId, SessionInfo, SessionState, SessionStore};
pub use tokio_util::sync::CancellationToken;
