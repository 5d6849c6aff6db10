// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Allocation statistics for profiling and diagnostics.
//!
//! [`AllocationStats`] tracks cumulative metrics about how one resource is
//! being used: pool hit rates, rejected reservations, the committed-bytes
//! high-water mark and how much idle memory reclamation has freed.

/// Cumulative statistics for one tracked resource.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct AllocationStats {
    /// Total number of pool acquire requests.
    pub total_acquires: u64,
    /// Acquires served from an idle pool entry.
    pub cache_hits: u64,
    /// Acquires that required a fresh block.
    pub cache_misses: u64,
    /// Binding reservations rejected by the budget.
    pub rejections: u64,
    /// Highest `reserved + pooled` ever observed, in bytes.
    pub peak_committed_bytes: u64,
    /// Total idle bytes freed by reclamation.
    pub reclaimed_bytes: u64,
    /// Total reservations released (dropped).
    pub releases: u64,
}

impl AllocationStats {
    /// Returns the pool hit ratio as a fraction in `[0.0, 1.0]`.
    ///
    /// Returns `0.0` if no acquires have been made.
    pub fn cache_hit_ratio(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            return 0.0;
        }
        self.cache_hits as f64 / total as f64
    }

    pub(crate) fn record_hit(&mut self) {
        self.total_acquires += 1;
        self.cache_hits += 1;
    }

    pub(crate) fn record_miss(&mut self) {
        self.total_acquires += 1;
        self.cache_misses += 1;
    }

    pub(crate) fn record_rejection(&mut self) {
        self.rejections += 1;
    }

    pub(crate) fn record_release(&mut self) {
        self.releases += 1;
    }

    pub(crate) fn record_reclaim(&mut self, bytes: u64) {
        self.reclaimed_bytes += bytes;
    }

    /// Updates the committed high-water mark if needed.
    pub(crate) fn update_peak(&mut self, committed: u64) {
        if committed > self.peak_committed_bytes {
            self.peak_committed_bytes = committed;
        }
    }

    /// Returns a human-readable summary.
    pub fn summary(&self) -> String {
        let peak_mb = self.peak_committed_bytes as f64 / (1024.0 * 1024.0);
        let reclaimed_mb = self.reclaimed_bytes as f64 / (1024.0 * 1024.0);
        format!(
            "Acquires: {} total ({} hits, {} misses, {:.0}% hit rate), \
             {} rejections, peak {:.2} MB, reclaimed {:.2} MB",
            self.total_acquires,
            self.cache_hits,
            self.cache_misses,
            self.cache_hit_ratio() * 100.0,
            self.rejections,
            peak_mb,
            reclaimed_mb,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default() {
        let s = AllocationStats::default();
        assert_eq!(s.total_acquires, 0);
        assert_eq!(s.cache_hit_ratio(), 0.0);
    }

    #[test]
    fn test_cache_hit_ratio() {
        let mut s = AllocationStats::default();
        s.record_hit();
        s.record_hit();
        s.record_miss();
        assert!((s.cache_hit_ratio() - 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(s.total_acquires, 3);
    }

    #[test]
    fn test_peak_tracking() {
        let mut s = AllocationStats::default();
        s.update_peak(100);
        s.update_peak(50);
        assert_eq!(s.peak_committed_bytes, 100); // Doesn't decrease.
        s.update_peak(200);
        assert_eq!(s.peak_committed_bytes, 200);
    }

    #[test]
    fn test_summary() {
        let mut s = AllocationStats::default();
        s.record_miss();
        s.record_hit();
        s.record_rejection();
        s.update_peak(1024 * 1024);
        let summary = s.summary();
        assert!(summary.contains("2 total"));
        assert!(summary.contains("1 rejections"));
        assert!(summary.contains("peak 1.00 MB"));
    }
}
