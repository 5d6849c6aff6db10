// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for memory management.

use crate::Resource;

/// Errors that can occur while reserving or pooling memory.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// The reservation would push the resource past its safety limit.
    #[error("{resource} reservation rejected: requested {requested_bytes} bytes, {available_bytes} available (limit {limit_bytes})")]
    Rejected {
        resource: Resource,
        requested_bytes: u64,
        available_bytes: u64,
        limit_bytes: u64,
    },

    /// Attempted to reserve or allocate zero bytes.
    #[error("cannot allocate zero-sized buffer")]
    ZeroSizedAllocation,

    /// The backing allocator failed after the reservation was granted.
    #[error("{resource} allocation of {bytes} bytes failed: {reason}")]
    AllocationFailed {
        resource: Resource,
        bytes: u64,
        reason: String,
    },

    /// A budget string or value could not be interpreted.
    #[error("invalid memory budget: {0}")]
    InvalidBudget(String),
}
