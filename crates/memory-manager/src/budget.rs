// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Memory budget configuration and parsing.
//!
//! A [`MemoryBudget`] is a raw capacity figure with human-readable parsing
//! for CLI ergonomics. A [`ResourceBudget`] pairs a capacity with the safety
//! fraction that turns it into an enforceable limit.

use crate::MemoryError;
use std::fmt;

const KB: u64 = 1024;
const MB: u64 = 1024 * KB;
const GB: u64 = 1024 * MB;

/// A memory capacity in bytes.
///
/// # Parsing
/// Supports human-readable strings with binary suffixes:
/// - `"512M"` or `"512MB"` → 512 × 1024² bytes
/// - `"3G"` or `"3GB"` → 3 × 1024³ bytes
/// - `"2048K"` or `"2048KB"` → 2048 × 1024 bytes
/// - `"1073741824"` → raw byte count
///
/// # Examples
/// ```
/// use memory_manager::MemoryBudget;
///
/// let b = MemoryBudget::from_mb(512);
/// assert_eq!(b.as_mb(), 512);
///
/// let b = MemoryBudget::parse("3G").unwrap();
/// assert_eq!(b.as_mb(), 3072);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct MemoryBudget {
    /// Capacity in bytes.
    bytes: u64,
}

impl MemoryBudget {
    /// Creates a budget from a byte count.
    pub fn from_bytes(bytes: u64) -> Self {
        Self { bytes }
    }

    /// Creates a budget from megabytes.
    pub fn from_mb(mb: u64) -> Self {
        Self { bytes: mb * MB }
    }

    /// Creates a budget from gigabytes.
    pub fn from_gb(gb: u64) -> Self {
        Self { bytes: gb * GB }
    }

    /// Returns the budget in bytes.
    pub fn as_bytes(&self) -> u64 {
        self.bytes
    }

    /// Returns the budget in megabytes (truncated).
    pub fn as_mb(&self) -> u64 {
        self.bytes / MB
    }

    /// Parses a human-readable budget string.
    ///
    /// Accepted formats: `"512M"`, `"512MB"`, `"3G"`, `"3GB"`, `"2048K"`,
    /// `"2048KB"`, or a plain byte count like `"1073741824"`.
    /// Case-insensitive.
    pub fn parse(s: &str) -> Result<Self, MemoryError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(MemoryError::InvalidBudget("empty string".into()));
        }

        let upper = s.to_uppercase();
        let (num_str, multiplier) = [
            ("GB", GB),
            ("G", GB),
            ("MB", MB),
            ("M", MB),
            ("KB", KB),
            ("K", KB),
            ("B", 1),
        ]
        .iter()
        .find(|(suffix, _)| upper.ends_with(suffix))
        .map(|(suffix, mult)| (&s[..s.len() - suffix.len()], *mult))
        .unwrap_or((s, 1));

        let value: u64 = num_str.trim().parse().map_err(|_| {
            MemoryError::InvalidBudget(format!(
                "'{s}': expected a number followed by an optional suffix (K, M, G)"
            ))
        })?;

        let bytes = value
            .checked_mul(multiplier)
            .ok_or_else(|| MemoryError::InvalidBudget(format!("'{s}' overflows u64")))?;

        if bytes == 0 {
            return Err(MemoryError::ZeroSizedAllocation);
        }

        Ok(Self { bytes })
    }
}

impl fmt::Display for MemoryBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.bytes >= GB && self.bytes % GB == 0 {
            write!(f, "{} GB", self.bytes / GB)
        } else if self.bytes >= MB && self.bytes % MB == 0 {
            write!(f, "{} MB", self.bytes / MB)
        } else if self.bytes >= KB && self.bytes % KB == 0 {
            write!(f, "{} KB", self.bytes / KB)
        } else {
            write!(f, "{} B", self.bytes)
        }
    }
}

/// Capacity of one resource plus the fraction of it the engine may commit.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ResourceBudget {
    pub capacity: MemoryBudget,
    pub safety_fraction: f64,
}

impl ResourceBudget {
    /// Creates a budget, rejecting safety fractions outside `(0, 1]`.
    pub fn new(capacity: MemoryBudget, safety_fraction: f64) -> Result<Self, MemoryError> {
        if !(safety_fraction > 0.0 && safety_fraction <= 1.0) {
            return Err(MemoryError::InvalidBudget(format!(
                "safety fraction {safety_fraction} must be in (0, 1]"
            )));
        }
        Ok(Self { capacity, safety_fraction })
    }

    /// Enforced ceiling: `capacity × safety_fraction`, rounded down.
    pub fn limit_bytes(&self) -> u64 {
        (self.capacity.as_bytes() as f64 * self.safety_fraction).floor() as u64
    }
}
