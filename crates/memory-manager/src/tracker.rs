// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Per-resource budget tracking.
//!
//! A [`MemoryTracker`] is the single source of truth for how much of one
//! resource the engine has committed. Committed memory comes in two kinds:
//!
//! - **reserved**: held by live [`Reservation`]s, i.e. buffers in use;
//! - **pooled**: idle blocks retained by a [`BufferPool`](crate::BufferPool)
//!   for reuse, which reclamation can free at any time.
//!
//! Every binding reservation is checked against `limit = capacity × safety`
//! under one mutex, so `reserved + pooled ≤ limit` holds at all times.

use crate::{AllocationStats, MemoryError, Reservation, ResourceBudget};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// A tracked memory resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    /// Device memory of the GPU lane.
    Gpu,
    /// Host RAM used by the CPU lane and by engine-visible buffers.
    Host,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Gpu => f.write_str("gpu"),
            Resource::Host => f.write_str("host"),
        }
    }
}

/// A point-in-time view of a tracker's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct UsageSnapshot {
    pub resource: Resource,
    pub limit_bytes: u64,
    pub reserved_bytes: u64,
    pub pooled_bytes: u64,
}

impl UsageSnapshot {
    /// Bytes held by live reservations and idle pool entries.
    pub fn committed_bytes(&self) -> u64 {
        self.reserved_bytes + self.pooled_bytes
    }

    /// Bytes that can be reserved right now without reclaiming anything.
    pub fn available_bytes(&self) -> u64 {
        self.limit_bytes.saturating_sub(self.committed_bytes())
    }

    /// Bytes that could be reserved after reclaiming every idle entry.
    pub fn headroom_bytes(&self) -> u64 {
        self.limit_bytes.saturating_sub(self.reserved_bytes)
    }

    /// `committed / limit`; `1.0` for a zero limit.
    pub fn pressure(&self) -> f64 {
        if self.limit_bytes == 0 {
            return 1.0;
        }
        self.committed_bytes() as f64 / self.limit_bytes as f64
    }
}

struct TrackerState {
    reserved: u64,
    pooled: u64,
    stats: AllocationStats,
}

pub(crate) struct TrackerInner {
    resource: Resource,
    budget: ResourceBudget,
    limit: u64,
    state: Mutex<TrackerState>,
}

impl TrackerInner {
    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        // Counters stay consistent even if a holder panicked mid-update,
        // since every update is a single arithmetic step.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn resource(&self) -> Resource {
        self.resource
    }

    /// Returns `bytes` of a dropped reservation.
    pub(crate) fn release(&self, bytes: u64) {
        let mut state = self.lock();
        state.reserved = state.reserved.saturating_sub(bytes);
        state.stats.record_release();
    }

    /// Moves `bytes` from reserved to pooled when a block goes idle.
    pub(crate) fn park(&self, bytes: u64) {
        let mut state = self.lock();
        state.reserved = state.reserved.saturating_sub(bytes);
        state.pooled += bytes;
    }

    /// Moves `bytes` from pooled back to reserved when an idle block is reused.
    pub(crate) fn unpark(self: &Arc<Self>, bytes: u64) -> Reservation {
        let mut state = self.lock();
        state.pooled = state.pooled.saturating_sub(bytes);
        state.reserved += bytes;
        state.stats.record_hit();
        drop(state);
        Reservation::new(Arc::clone(self), bytes)
    }

    /// Forgets `bytes` of idle pool retention that has been freed.
    pub(crate) fn unpool(&self, bytes: u64, reclaimed: bool) {
        let mut state = self.lock();
        state.pooled = state.pooled.saturating_sub(bytes);
        if reclaimed {
            state.stats.record_reclaim(bytes);
        }
    }

    pub(crate) fn record_miss(&self) {
        self.lock().stats.record_miss();
    }

    fn try_reserve(self: &Arc<Self>, bytes: u64) -> Result<Reservation, MemoryError> {
        if bytes == 0 {
            return Err(MemoryError::ZeroSizedAllocation);
        }
        let mut state = self.lock();
        let committed = state.reserved + state.pooled;
        if committed.saturating_add(bytes) > self.limit {
            state.stats.record_rejection();
            return Err(MemoryError::Rejected {
                resource: self.resource,
                requested_bytes: bytes,
                available_bytes: self.limit.saturating_sub(committed),
                limit_bytes: self.limit,
            });
        }
        state.reserved += bytes;
        let committed = state.reserved + state.pooled;
        state.stats.update_peak(committed);
        drop(state);
        Ok(Reservation::new(Arc::clone(self), bytes))
    }
}

/// Budget tracker for one resource. Cheap to clone; clones share counters.
///
/// # Example
/// ```
/// use memory_manager::{MemoryBudget, MemoryTracker, Resource, ResourceBudget};
///
/// let budget = ResourceBudget::new(MemoryBudget::from_bytes(1000), 0.5).unwrap();
/// let tracker = MemoryTracker::new(Resource::Gpu, budget);
///
/// let r = tracker.try_reserve(400).unwrap();
/// assert!(tracker.try_reserve(200).is_err());
/// drop(r);
/// assert_eq!(tracker.usage().reserved_bytes, 0);
/// ```
#[derive(Clone)]
pub struct MemoryTracker {
    inner: Arc<TrackerInner>,
}

impl MemoryTracker {
    pub fn new(resource: Resource, budget: ResourceBudget) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                resource,
                budget,
                limit: budget.limit_bytes(),
                state: Mutex::new(TrackerState {
                    reserved: 0,
                    pooled: 0,
                    stats: AllocationStats::default(),
                }),
            }),
        }
    }

    pub fn resource(&self) -> Resource {
        self.inner.resource
    }

    pub fn budget(&self) -> ResourceBudget {
        self.inner.budget
    }

    /// Enforced ceiling in bytes.
    pub fn limit_bytes(&self) -> u64 {
        self.inner.limit
    }

    /// Takes a binding reservation of `bytes`.
    ///
    /// Rejected if `reserved + pooled + bytes` would exceed the limit. The
    /// request is never truncated. The reservation is released on drop.
    pub fn try_reserve(&self, bytes: u64) -> Result<Reservation, MemoryError> {
        let result = self.inner.try_reserve(bytes);
        if let Err(MemoryError::Rejected { available_bytes, .. }) = &result {
            tracing::debug!(
                resource = %self.inner.resource,
                requested = bytes,
                available = available_bytes,
                "Reservation rejected"
            );
        }
        result
    }

    /// Non-binding check: would `bytes` fit once idle pool entries are freed?
    pub fn check_estimate(&self, bytes: u64) -> bool {
        bytes <= self.usage().headroom_bytes()
    }

    /// Current counters.
    pub fn usage(&self) -> UsageSnapshot {
        let state = self.inner.lock();
        UsageSnapshot {
            resource: self.inner.resource,
            limit_bytes: self.inner.limit,
            reserved_bytes: state.reserved,
            pooled_bytes: state.pooled,
        }
    }

    /// `(reserved + pooled) / limit`.
    pub fn pressure(&self) -> f64 {
        self.usage().pressure()
    }

    /// Returns a snapshot of the resource's statistics.
    pub fn stats(&self) -> AllocationStats {
        self.inner.lock().stats.clone()
    }

    pub(crate) fn inner(&self) -> &Arc<TrackerInner> {
        &self.inner
    }
}

impl fmt::Debug for MemoryTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let usage = self.usage();
        f.debug_struct("MemoryTracker")
            .field("resource", &usage.resource)
            .field("limit_bytes", &usage.limit_bytes)
            .field("reserved_bytes", &usage.reserved_bytes)
            .field("pooled_bytes", &usage.pooled_bytes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryBudget;

    fn tracker(limit: u64) -> MemoryTracker {
        let budget = ResourceBudget::new(MemoryBudget::from_bytes(limit), 1.0).unwrap();
        MemoryTracker::new(Resource::Host, budget)
    }

    #[test]
    fn test_reserve_and_release() {
        let t = tracker(1000);
        let r = t.try_reserve(600).unwrap();
        assert_eq!(r.bytes(), 600);
        assert_eq!(t.usage().reserved_bytes, 600);
        drop(r);
        assert_eq!(t.usage().reserved_bytes, 0);
        assert_eq!(t.stats().releases, 1);
    }

    #[test]
    fn test_rejection_is_not_truncated() {
        let t = tracker(1000);
        let _a = t.try_reserve(700).unwrap();
        match t.try_reserve(400) {
            Err(MemoryError::Rejected {
                requested_bytes,
                available_bytes,
                limit_bytes,
                ..
            }) => {
                assert_eq!(requested_bytes, 400);
                assert_eq!(available_bytes, 300);
                assert_eq!(limit_bytes, 1000);
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        assert_eq!(t.usage().reserved_bytes, 700);
        assert_eq!(t.stats().rejections, 1);
    }

    #[test]
    fn test_exact_fit() {
        let t = tracker(1000);
        let _a = t.try_reserve(1000).unwrap();
        assert!(t.try_reserve(1).is_err());
        assert!((t.pressure() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_reservation() {
        let t = tracker(1000);
        assert!(matches!(t.try_reserve(0), Err(MemoryError::ZeroSizedAllocation)));
    }

    #[test]
    fn test_safety_fraction_limit() {
        let budget = ResourceBudget::new(MemoryBudget::from_bytes(1000), 0.7).unwrap();
        let t = MemoryTracker::new(Resource::Gpu, budget);
        assert_eq!(t.limit_bytes(), 700);
        assert!(t.try_reserve(701).is_err());
        assert!(t.try_reserve(700).is_ok());
    }

    #[test]
    fn test_park_and_unpark() {
        let t = tracker(1000);
        let r = t.try_reserve(400).unwrap();
        r.park();
        let u = t.usage();
        assert_eq!((u.reserved_bytes, u.pooled_bytes), (0, 400));
        assert_eq!(u.available_bytes(), 600);
        assert_eq!(u.headroom_bytes(), 1000);
        assert!(t.check_estimate(1000));
        assert!(t.try_reserve(700).is_err());

        let r = t.inner().unpark(400);
        let u = t.usage();
        assert_eq!((u.reserved_bytes, u.pooled_bytes), (400, 0));
        drop(r);
        assert_eq!(t.usage().committed_bytes(), 0);
    }

    #[test]
    fn test_peak_committed() {
        let t = tracker(1000);
        let a = t.try_reserve(300).unwrap();
        let b = t.try_reserve(500).unwrap();
        drop(a);
        drop(b);
        assert_eq!(t.stats().peak_committed_bytes, 800);
    }

    #[test]
    fn test_clones_share_state() {
        let t = tracker(1000);
        let t2 = t.clone();
        let _r = t.try_reserve(100).unwrap();
        assert_eq!(t2.usage().reserved_bytes, 100);
    }

    #[test]
    fn test_concurrent_reservations_respect_limit() {
        let t = tracker(10_000);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let t = t.clone();
                std::thread::spawn(move || {
                    let mut held = Vec::new();
                    for _ in 0..100 {
                        if let Ok(r) = t.try_reserve(97) {
                            held.push(r);
                        }
                        assert!(t.usage().committed_bytes() <= 10_000);
                    }
                    held
                })
            })
            .collect();
        let held: Vec<Reservation> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        assert_eq!(held.len(), 10_000 / 97);
        drop(held);
        assert_eq!(t.usage().reserved_bytes, 0);
        assert!(t.stats().peak_committed_bytes <= 10_000);
    }
}
