//! In-memory read-through layer for contract reads using moka.
//!
//! Wraps any [`ContractReadStore`] and absorbs repeat reads within a run
//! without a database round-trip. The database stays the source of
//! truth; entries expire by TTL and LRU capacity.
//!
//! Keys pin the block number, so identical call data at different blocks
//! stays distinct and historical correctness is preserved.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy::primitives::Bytes;
use async_trait::async_trait;
use moka::sync::Cache as MokaCache;
use tracing::debug;

use crate::error::Result;
use crate::ports::ContractReadStore;
use crate::types::entities::{ContractReadKey, ContractReadResult};

// ═══════════════════════════════════════════════════════════════════════════════
// CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Contract read cache TTL (5 minutes).
const READ_TTL: Duration = Duration::from_secs(300);
/// Contract read cache max capacity.
const READ_MAX_CAPACITY: u64 = 10_000;

// ═══════════════════════════════════════════════════════════════════════════════
// READ-THROUGH CACHE
// ═══════════════════════════════════════════════════════════════════════════════

/// Hit/miss statistics for monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadCacheStats {
    /// In-memory hits.
    pub hits: u64,
    /// Misses that fell through to the inner store.
    pub misses: u64,
    /// Entries currently cached.
    pub entry_count: u64,
}

/// Read-through decorator over a [`ContractReadStore`].
///
/// Thread-safe; share across tasks via `Arc` or clone the inner store.
#[derive(Debug)]
pub struct ReadThroughCache<S> {
    inner: S,
    results: MokaCache<ContractReadKey, Bytes>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<S> ReadThroughCache<S> {
    /// Wrap a store with the default TTL and capacity.
    #[must_use]
    pub fn new(inner: S) -> Self {
        Self::with_config(inner, READ_TTL, READ_MAX_CAPACITY)
    }

    /// Wrap a store with explicit TTL and capacity bounds.
    #[must_use]
    pub fn with_config(inner: S, ttl: Duration, max_capacity: u64) -> Self {
        Self {
            inner,
            results: MokaCache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// The wrapped store.
    pub const fn inner(&self) -> &S {
        &self.inner
    }

    /// Hit/miss statistics.
    pub fn stats(&self) -> ReadCacheStats {
        ReadCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: self.results.entry_count(),
        }
    }

    /// Run pending cache maintenance tasks.
    ///
    /// Moka performs maintenance lazily; this forces it to run
    /// immediately. Useful for tests.
    pub fn run_pending_tasks(&self) {
        self.results.run_pending_tasks();
    }
}

#[async_trait]
impl<S: ContractReadStore> ContractReadStore for ReadThroughCache<S> {
    async fn insert_contract_read_result(&self, read: &ContractReadResult) -> Result<()> {
        self.inner.insert_contract_read_result(read).await?;
        self.results.insert(read.key(), read.result.clone());
        Ok(())
    }

    async fn get_contract_read_result(
        &self,
        key: &ContractReadKey,
    ) -> Result<Option<ContractReadResult>> {
        if let Some(result) = self.results.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("chainstore_contract_read_cache_hits_total").increment(1);
            return Ok(Some(ContractReadResult {
                chain_id: key.chain_id,
                address: key.address,
                block_number: key.block_number,
                data: key.data.clone(),
                result,
            }));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("chainstore_contract_read_cache_misses_total").increment(1);
        let fetched = self.inner.get_contract_read_result(key).await?;
        if let Some(read) = &fetched {
            self.results.insert(read.key(), read.result.clone());
            debug!("contract read cached");
        }
        Ok(fetched)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
