// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Engine configuration loaded from TOML files or constructed programmatically.
//!
//! # TOML Format
//! ```toml
//! strategy = "adaptive-ladder"
//! ladder = [2.0, 1.5, 1.1]
//! overhead_factor = 2.25
//! gpu_safety_fraction = 0.7
//! host_safety_fraction = 0.7
//! pressure_high_water = 0.8
//! factor_tolerance = 0.005
//! kernel = "lanczos3"
//! tile_rows = 64
//! pool_slack = 0.1
//! pool_retain_fraction = 0.25
//! max_preview_edge = 2048
//! session_ttl_secs = 600
//! num_threads = 4
//! ```

use crate::UpscaleError;
use memory_manager::PoolConfig;
use raster_core::ResampleKernel;
use scale_planner::{AdaptiveLadder, DirectScale, LadderParams, ScaleStrategy, FACTOR_TOLERANCE};
use std::path::Path;
use std::time::Duration;

/// Configuration for the upscaling engine.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Scale strategy name: `"adaptive-ladder"` or `"direct"`.
    pub strategy: String,
    /// Stage multipliers tried largest first.
    pub ladder: Vec<f64>,
    /// Planning estimate multiplier over the raw output bytes.
    pub overhead_factor: f64,
    /// Fraction of GPU memory the engine may use.
    pub gpu_safety_fraction: f64,
    /// Fraction of host memory the engine may use.
    pub host_safety_fraction: f64,
    /// Pressure above which idle pool blocks are reclaimed before a stage.
    pub pressure_high_water: f64,
    /// Relative tolerance on the product of stage multipliers.
    pub factor_tolerance: f64,
    pub kernel: ResampleKernel,
    /// Destination rows per CPU tile.
    pub tile_rows: u32,
    /// Relative slack within which an idle pool block is reused.
    pub pool_slack: f64,
    /// Fraction of each limit the pools may retain as idle blocks.
    pub pool_retain_fraction: f64,
    /// Longest edge of a preview image.
    pub max_preview_edge: u32,
    /// Finished sessions are forgotten after this many seconds.
    pub session_ttl_secs: u64,
    /// CPU worker threads (defaults to the profile's core count).
    pub num_threads: Option<usize>,
}

impl EngineConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, UpscaleError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            UpscaleError::Config(format!("cannot read config '{}': {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, UpscaleError> {
        let config: Self = toml::from_str(toml_str)
            .map_err(|e| UpscaleError::Config(format!("TOML parse error: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialises configuration to TOML.
    pub fn to_toml(&self) -> Result<String, UpscaleError> {
        toml::to_string_pretty(self)
            .map_err(|e| UpscaleError::Config(format!("TOML serialise error: {e}")))
    }

    /// Checks ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), UpscaleError> {
        for (name, v) in [
            ("gpu_safety_fraction", self.gpu_safety_fraction),
            ("host_safety_fraction", self.host_safety_fraction),
            ("pressure_high_water", self.pressure_high_water),
            ("pool_retain_fraction", self.pool_retain_fraction),
        ] {
            if !(v > 0.0 && v <= 1.0) {
                return Err(UpscaleError::Config(format!("{name} must be in (0, 1], got {v}")));
            }
        }
        if !(self.pool_slack >= 0.0 && self.pool_slack.is_finite()) {
            return Err(UpscaleError::Config(format!("pool_slack must be >= 0, got {}", self.pool_slack)));
        }
        if !(self.overhead_factor >= 1.0 && self.overhead_factor.is_finite()) {
            return Err(UpscaleError::Config(format!(
                "overhead_factor must be >= 1, got {}",
                self.overhead_factor
            )));
        }
        if self.tile_rows == 0 || self.max_preview_edge == 0 {
            return Err(UpscaleError::Config("tile_rows and max_preview_edge must be positive".into()));
        }
        Ok(())
    }

    /// Resolves the number of CPU worker threads.
    pub fn resolve_threads(&self, cpu_core_count: usize) -> usize {
        self.num_threads.unwrap_or(cpu_core_count).max(1)
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            slack: self.pool_slack,
            retain_fraction: self.pool_retain_fraction,
        }
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn ladder_params(&self) -> LadderParams {
        LadderParams {
            ladder: self.ladder.clone(),
            overhead_factor: self.overhead_factor,
            factor_tolerance: self.factor_tolerance,
            ..LadderParams::default()
        }
    }

    /// Creates the scale strategy specified by this config.
    pub fn create_strategy(&self) -> Result<Box<dyn ScaleStrategy>, UpscaleError> {
        match self.strategy.to_lowercase().as_str() {
            "adaptive-ladder" | "ladder" | "adaptive" => Ok(Box::new(AdaptiveLadder::new(self.ladder_params())?)),
            "direct" => Ok(Box::new(DirectScale::new(self.overhead_factor))),
            other => Err(UpscaleError::Config(format!(
                "unknown strategy '{other}'; expected 'adaptive-ladder' or 'direct'"
            ))),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strategy: "adaptive-ladder".to_string(),
            ladder: vec![2.0, 1.5, 1.1],
            overhead_factor: 2.25,
            gpu_safety_fraction: 0.7,
            host_safety_fraction: 0.7,
            pressure_high_water: 0.8,
            factor_tolerance: FACTOR_TOLERANCE,
            kernel: ResampleKernel::default(),
            tile_rows: stage_exec::DEFAULT_TILE_ROWS,
            pool_slack: 0.1,
            pool_retain_fraction: 0.25,
            max_preview_edge: 2048,
            session_ttl_secs: 600,
            num_threads: None,
        }
    }
}
