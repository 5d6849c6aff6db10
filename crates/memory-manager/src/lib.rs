// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # memory-manager
//!
//! Budget tracking and buffer pooling for the GPU and host memory used by
//! the upscaling pipeline.
//!
//! # Key Components
//!
//! - [`MemoryBudget`]: a capacity with human-readable parsing (`"512M"`,
//!   `"3G"`), and [`ResourceBudget`], which adds the safety fraction.
//! - [`MemoryTracker`]: per-resource counters and the binding
//!   [`try_reserve`](MemoryTracker::try_reserve) check. The only way the
//!   pipeline commits memory.
//! - [`Reservation`]: an RAII guard for reserved bytes.
//! - [`BufferPool`]: reusable blocks with slack-based reuse, a retention
//!   cap and reclamation under pressure. Generic over the block type so the
//!   same pool serves host vectors and device allocations.
//! - [`PooledBuffer`]: an RAII wrapper that parks its block back in the pool.
//! - [`AllocationStats`]: hit ratio, rejections, peak committed bytes.
//!
//! # Ownership Model
//!
//! ```text
//! BufferPool::acquire(size)
//!       │  hit: unpark idle block     miss: MemoryTracker::try_reserve
//!       ▼
//!   PooledBuffer  ◄─── owns block + Reservation, holds Arc<PoolShared>
//!       │
//!       │  drop()
//!       ▼
//!   PoolShared::give_back()  ──► free list (bytes move reserved → pooled)
//! ```

mod budget;
mod error;
mod guard;
pub mod pool;
mod stats;
mod tracker;

pub use budget::{MemoryBudget, ResourceBudget};
pub use error::MemoryError;
pub use guard::{PooledBuffer, Reservation};
pub use pool::{AllocError, BufferPool, PoolBlock, PoolConfig};
pub use stats::AllocationStats;
pub use tracker::{MemoryTracker, Resource, UsageSnapshot};
