//! Closed block ranges and their merge algebra.
//!
//! Coverage intervals are inclusive `[start, end]` block ranges. After
//! every insert the stored set for a filter must be the minimal disjoint
//! representation of the union: no two ranges overlap or abut.

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DomainError;

// ═══════════════════════════════════════════════════════════════════════════════
// BLOCK RANGE
// ═══════════════════════════════════════════════════════════════════════════════

/// An inclusive range of block numbers that has been indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockRange {
    start: U256,
    end: U256,
}

impl BlockRange {
    /// Create a range, validating `start <= end`.
    ///
    /// # Errors
    /// Returns [`DomainError::InvalidBlockRange`] when the range is empty.
    pub fn new(start: U256, end: U256) -> Result<Self, DomainError> {
        if start > end {
            return Err(DomainError::InvalidBlockRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self { start, end })
    }

    /// A range covering a single block.
    #[must_use]
    pub const fn singleton(block: U256) -> Self {
        Self {
            start: block,
            end: block,
        }
    }

    /// First covered block.
    #[must_use]
    pub const fn start(&self) -> U256 {
        self.start
    }

    /// Last covered block.
    #[must_use]
    pub const fn end(&self) -> U256 {
        self.end
    }

    /// Whether `other` overlaps or directly abuts this range, i.e. the two
    /// collapse into one when merged.
    #[must_use]
    pub fn touches(&self, other: &Self) -> bool {
        let (lo, hi) = if self.start <= other.start {
            (self, other)
        } else {
            (other, self)
        };
        hi.start <= lo.end.saturating_add(U256::from(1))
    }
}

impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// Convenience for tests and literals.
impl From<(u64, u64)> for BlockRange {
    fn from((start, end): (u64, u64)) -> Self {
        Self {
            start: U256::from(start.min(end)),
            end: U256::from(start.max(end)),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MERGE
// ═══════════════════════════════════════════════════════════════════════════════

/// Fold a set of ranges into its minimal disjoint representation.
///
/// Sorts by start block, then collapses any pair where
/// `next.start <= current.end + 1` into `[current.start, max(ends)]`.
/// The result is strictly ordered, disjoint, and non-adjacent, and is
/// independent of input order.
#[must_use]
pub fn merge_ranges(mut ranges: Vec<BlockRange>) -> Vec<BlockRange> {
    if ranges.len() <= 1 {
        return ranges;
    }
    ranges.sort_unstable();

    let mut merged: Vec<BlockRange> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match merged.last_mut() {
            Some(current) if range.start <= current.end.saturating_add(U256::from(1)) => {
                current.end = current.end.max(range.end);
            }
            _ => merged.push(range),
        }
    }
    merged
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
