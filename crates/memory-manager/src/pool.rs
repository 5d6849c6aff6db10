// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Reusable block pools on top of a [`MemoryTracker`].
//!
//! A [`BufferPool`] keeps idle blocks binned by exact capacity. A request
//! reuses an idle block whose capacity is at least the request and at most
//! `request × (1 + slack)`; otherwise it takes a fresh reservation and asks
//! the allocator for a new block. Idle blocks stay charged to the tracker
//! as *pooled* bytes until they are reused or reclaimed.
//!
//! # Thread Safety
//! The free list sits behind a single mutex, so two sessions can never be
//! handed the same idle block. The pool lock is always taken before the
//! tracker lock.

use crate::{MemoryError, MemoryTracker, PooledBuffer, Reservation, Resource};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Error type returned by block allocators.
pub type AllocError = Box<dyn std::error::Error + Send + Sync>;

type Allocator<B> = Box<dyn Fn(u64) -> Result<B, AllocError> + Send + Sync>;

/// A memory block that can be parked in a pool and handed out again.
pub trait PoolBlock: Send + 'static {
    /// Prepares a reused block to serve a request of `len` bytes.
    fn reset(&mut self, len: u64);
}

impl PoolBlock for Vec<u8> {
    fn reset(&mut self, len: u64) {
        self.clear();
        self.resize(len as usize, 0);
    }
}

/// Tunables for reuse and retention.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PoolConfig {
    /// Relative slack above the request within which an idle block is reused.
    pub slack: f64,
    /// Fraction of the tracker limit the pool may keep as idle blocks.
    pub retain_fraction: f64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            slack: 0.1,
            retain_fraction: 0.25,
        }
    }
}

pub(crate) struct PoolShared<B> {
    tracker: MemoryTracker,
    config: PoolConfig,
    allocator: Allocator<B>,
    free: Mutex<BTreeMap<u64, Vec<B>>>,
}

impl<B: PoolBlock> PoolShared<B> {
    fn lock(&self) -> MutexGuard<'_, BTreeMap<u64, Vec<B>>> {
        self.free.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn resource(&self) -> Resource {
        self.tracker.resource()
    }

    /// Called by `PooledBuffer::drop` to park a block for reuse.
    pub(crate) fn give_back(&self, block: B, reservation: Reservation) {
        let capacity = reservation.bytes();
        let retain_cap = (self.tracker.limit_bytes() as f64 * self.config.retain_fraction) as u64;

        let mut free = self.lock();
        if self.tracker.usage().pooled_bytes + capacity <= retain_cap {
            reservation.park();
            free.entry(capacity).or_default().push(block);
        } else {
            drop(free);
            drop(reservation);
            drop(block);
        }
    }

    fn take_idle(self: &Arc<Self>, bytes: u64) -> Option<(B, Reservation)> {
        let max_capacity = (bytes as f64 * (1.0 + self.config.slack)).floor() as u64;
        let mut free = self.lock();
        let capacity = free
            .range(bytes..=max_capacity.max(bytes))
            .find(|(_, blocks)| !blocks.is_empty())
            .map(|(cap, _)| *cap)?;
        let blocks = free.get_mut(&capacity)?;
        let block = blocks.pop()?;
        if blocks.is_empty() {
            free.remove(&capacity);
        }
        let reservation = self.tracker.inner().unpark(capacity);
        Some((block, reservation))
    }

    fn reclaim(&self) -> u64 {
        let drained = std::mem::take(&mut *self.lock());
        let bytes: u64 = drained
            .iter()
            .map(|(cap, blocks)| cap * blocks.len() as u64)
            .sum();
        if bytes > 0 {
            self.tracker.inner().unpool(bytes, true);
        }
        drop(drained);
        bytes
    }
}

/// A pool of reusable blocks charged against one tracker.
///
/// # Example
/// ```
/// use memory_manager::{BufferPool, MemoryBudget, MemoryTracker, PoolConfig, Resource, ResourceBudget};
///
/// let budget = ResourceBudget::new(MemoryBudget::from_mb(64), 1.0).unwrap();
/// let tracker = MemoryTracker::new(Resource::Host, budget);
/// let pool = BufferPool::host(tracker.clone(), PoolConfig::default());
///
/// let buf = pool.acquire(1024 * 1024).unwrap();
/// assert_eq!(tracker.usage().reserved_bytes, 1024 * 1024);
///
/// // The block is parked for reuse when the buffer is dropped.
/// drop(buf);
/// assert_eq!(tracker.usage().reserved_bytes, 0);
/// assert_eq!(tracker.usage().pooled_bytes, 1024 * 1024);
/// ```
pub struct BufferPool<B: PoolBlock> {
    shared: Arc<PoolShared<B>>,
}

impl<B: PoolBlock> Clone for BufferPool<B> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<B: PoolBlock> BufferPool<B> {
    /// Creates a pool whose fresh blocks come from `allocator`.
    pub fn new(
        tracker: MemoryTracker,
        config: PoolConfig,
        allocator: impl Fn(u64) -> Result<B, AllocError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                tracker,
                config,
                allocator: Box::new(allocator),
                free: Mutex::new(BTreeMap::new()),
            }),
        }
    }

    /// Checks out a block of at least `bytes`.
    ///
    /// Reuses an idle block within the slack if one exists. Otherwise takes a
    /// fresh reservation; if the tracker rejects it, idle blocks are
    /// reclaimed once and the reservation is retried.
    pub fn acquire(&self, bytes: u64) -> Result<PooledBuffer<B>, MemoryError> {
        if bytes == 0 {
            return Err(MemoryError::ZeroSizedAllocation);
        }

        if let Some((mut block, reservation)) = self.shared.take_idle(bytes) {
            block.reset(bytes);
            tracing::trace!(resource = %self.resource(), bytes, capacity = reservation.bytes(), "Pool hit");
            return Ok(PooledBuffer::new(block, reservation, bytes, Arc::clone(&self.shared)));
        }

        self.shared.tracker.inner().record_miss();
        let reservation = match self.shared.tracker.try_reserve(bytes) {
            Ok(r) => r,
            Err(MemoryError::Rejected { .. }) if self.idle_bytes() > 0 => {
                let freed = self.reclaim();
                tracing::debug!(resource = %self.resource(), freed, "Reclaimed idle blocks after rejection");
                self.shared.tracker.try_reserve(bytes)?
            }
            Err(e) => return Err(e),
        };

        let block = (self.shared.allocator)(bytes).map_err(|e| MemoryError::AllocationFailed {
            resource: self.resource(),
            bytes,
            reason: e.to_string(),
        })?;
        Ok(PooledBuffer::new(block, reservation, bytes, Arc::clone(&self.shared)))
    }

    /// Frees every idle block and returns the bytes released.
    pub fn reclaim(&self) -> u64 {
        self.shared.reclaim()
    }

    /// Bytes held by idle blocks.
    pub fn idle_bytes(&self) -> u64 {
        self.shared
            .lock()
            .iter()
            .map(|(cap, blocks)| cap * blocks.len() as u64)
            .sum()
    }

    /// Number of idle blocks.
    pub fn idle_count(&self) -> usize {
        self.shared.lock().values().map(Vec::len).sum()
    }

    pub fn resource(&self) -> Resource {
        self.shared.resource()
    }

    pub fn tracker(&self) -> &MemoryTracker {
        &self.shared.tracker
    }

    pub fn config(&self) -> PoolConfig {
        self.shared.config
    }
}

impl BufferPool<Vec<u8>> {
    /// A pool of zero-initialized host byte vectors.
    pub fn host(tracker: MemoryTracker, config: PoolConfig) -> Self {
        Self::new(tracker, config, |bytes| Ok(vec![0u8; bytes as usize]))
    }
}

impl<B: PoolBlock> std::fmt::Debug for BufferPool<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("tracker", &self.shared.tracker)
            .field("idle_count", &self.idle_count())
            .field("idle_bytes", &self.idle_bytes())
            .finish()
    }
}
