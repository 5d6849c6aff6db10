// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the upscaling runtime.

use scale_planner::PlannerError;

/// The single terminal error a session can end with.
#[derive(Debug, thiserror::Error)]
pub enum UpscaleError {
    /// No plan fits the budgets; no stage was executed.
    #[error("infeasible scale: {0}")]
    InfeasibleScale(String),

    /// Host memory ran out mid-session.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// The caller cancelled the session.
    #[error("session cancelled")]
    Cancelled,

    /// Decoding or encoding at the pipeline edge failed.
    #[error("codec error: {0}")]
    Codec(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The planner rejected the request for a reason other than capacity.
    #[error("planner error: {0}")]
    Planner(PlannerError),

    #[error("memory error: {0}")]
    Memory(#[from] memory_manager::MemoryError),

    #[error("executor error: {0}")]
    Exec(#[from] stage_exec::ExecError),

    #[error("hardware profile error: {0}")]
    Profile(#[from] hardware_profile::ProfileError),

    #[error("raster error: {0}")]
    Raster(#[from] raster_core::RasterError),

    /// An invariant inside the engine was violated.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<PlannerError> for UpscaleError {
    fn from(e: PlannerError) -> Self {
        match e {
            PlannerError::InfeasibleScale { detail } => UpscaleError::InfeasibleScale(detail),
            other => UpscaleError::Planner(other),
        }
    }
}

impl From<image::ImageError> for UpscaleError {
    fn from(e: image::ImageError) -> Self {
        UpscaleError::Codec(e.to_string())
    }
}

impl UpscaleError {
    /// Short, stable name for the error category.
    pub fn kind(&self) -> &'static str {
        match self {
            UpscaleError::InfeasibleScale(_) => "infeasible-scale",
            UpscaleError::ResourceExhausted(_) => "resource-exhausted",
            UpscaleError::Cancelled => "cancelled",
            UpscaleError::Codec(_) => "codec",
            UpscaleError::Config(_) => "config",
            UpscaleError::Planner(_) => "planner",
            UpscaleError::Memory(_) => "memory",
            UpscaleError::Exec(_) => "executor",
            UpscaleError::Profile(_) => "profile",
            UpscaleError::Raster(_) => "raster",
            UpscaleError::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infeasible_maps_from_planner() {
        let e: UpscaleError = PlannerError::InfeasibleScale { detail: "too big".into() }.into();
        assert!(matches!(e, UpscaleError::InfeasibleScale(ref d) if d == "too big"));
        assert_eq!(e.kind(), "infeasible-scale");

        let e: UpscaleError = PlannerError::InvalidFactor(-1.0).into();
        assert!(matches!(e, UpscaleError::Planner(_)));
    }
}
