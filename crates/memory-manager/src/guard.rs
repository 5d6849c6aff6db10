// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! RAII guards for reservations and pooled blocks.
//!
//! [`Reservation`] and [`PooledBuffer`] are the only way memory is committed
//! against a tracker. Dropping either returns the bytes, so a reservation can
//! never outlive the scope that took it, including on error and cancellation
//! paths.

use crate::pool::{PoolBlock, PoolShared};
use crate::tracker::TrackerInner;
use crate::Resource;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// A binding reservation against a [`MemoryTracker`](crate::MemoryTracker).
///
/// The bytes are returned to the tracker when the reservation is dropped.
#[must_use = "dropping a reservation releases it immediately"]
pub struct Reservation {
    tracker: Arc<TrackerInner>,
    bytes: u64,
}

impl Reservation {
    pub(crate) fn new(tracker: Arc<TrackerInner>, bytes: u64) -> Self {
        Self { tracker, bytes }
    }

    /// Reserved byte count.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn resource(&self) -> Resource {
        self.tracker.resource()
    }

    /// Converts the reservation into idle pool retention.
    pub(crate) fn park(mut self) {
        self.tracker.park(self.bytes);
        self.bytes = 0;
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if self.bytes > 0 {
            self.tracker.release(self.bytes);
        }
    }
}

impl std::fmt::Debug for Reservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reservation")
            .field("resource", &self.tracker.resource())
            .field("bytes", &self.bytes)
            .finish()
    }
}

/// A block checked out of a [`BufferPool`](crate::BufferPool).
///
/// Holds the block together with the reservation that pays for it. On drop
/// the block goes back to the pool's free list (or is freed if the pool is
/// at its retention cap).
///
/// # Example
/// ```ignore
/// let buf = pool.acquire(1024)?;
/// buf.as_slice();            // use the block
/// drop(buf);                 // block returned to pool, bytes now "pooled"
/// ```
pub struct PooledBuffer<B: PoolBlock> {
    block: Option<B>,
    reservation: Option<Reservation>,
    len: u64,
    pool: Arc<PoolShared<B>>,
}

impl<B: PoolBlock> PooledBuffer<B> {
    pub(crate) fn new(block: B, reservation: Reservation, len: u64, pool: Arc<PoolShared<B>>) -> Self {
        Self {
            block: Some(block),
            reservation: Some(reservation),
            len,
            pool,
        }
    }

    /// Requested length in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes charged to the tracker; at least [`len`](Self::len).
    pub fn capacity_bytes(&self) -> u64 {
        self.reservation.as_ref().map_or(0, Reservation::bytes)
    }

    pub fn resource(&self) -> Resource {
        self.pool.resource()
    }

    /// Takes the block out of the pool's accounting.
    ///
    /// The reservation is released and the block is never returned to the
    /// pool. Used when a buffer leaves the engine.
    pub fn detach(mut self) -> B {
        self.reservation.take();
        match self.block.take() {
            Some(block) => block,
            None => unreachable!("block is present until drop or detach"),
        }
    }
}

impl<B: PoolBlock> Deref for PooledBuffer<B> {
    type Target = B;

    fn deref(&self) -> &B {
        match &self.block {
            Some(block) => block,
            None => unreachable!("block is present until drop or detach"),
        }
    }
}

impl<B: PoolBlock> DerefMut for PooledBuffer<B> {
    fn deref_mut(&mut self) -> &mut B {
        match &mut self.block {
            Some(block) => block,
            None => unreachable!("block is present until drop or detach"),
        }
    }
}

impl<B: PoolBlock> Drop for PooledBuffer<B> {
    fn drop(&mut self) {
        if let (Some(block), Some(reservation)) = (self.block.take(), self.reservation.take()) {
            self.pool.give_back(block, reservation);
        }
    }
}

impl<B: PoolBlock> std::fmt::Debug for PooledBuffer<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("resource", &self.resource())
            .field("len", &self.len)
            .field("capacity_bytes", &self.capacity_bytes())
            .finish()
    }
}
