// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for hardware profiling.

/// Errors that can occur when building or detecting a hardware profile.
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    /// Failed to read a procfs file.
    #[error("failed to read {path}: {source}")]
    ReadError {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse a numeric value from a system file.
    #[error("failed to parse value from {path}: {detail}")]
    ParseError { path: String, detail: String },

    /// A profile field is out of range.
    #[error("invalid hardware profile: {0}")]
    Invalid(String),
}
