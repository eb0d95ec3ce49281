//! Storage port traits for the event store core.
//!
//! These traits define the contract for persisting and replaying chain
//! events. Infrastructure adapters implement them using concrete storage
//! backends; the primary adapter is the Postgres facade in
//! [`crate::store`].
//!
//! Every operation is a suspension point: callers get serializability at
//! the transaction boundary, not a specific runtime. Lazy streams honor
//! early termination: dropping one releases the underlying query and no
//! background work continues.

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;
use crate::types::entities::{
    Block, ContractReadKey, ContractReadResult, Log, LogEventPage, Transaction,
};
use crate::types::filter::{Factory, FactorySource, LogFilterCriteria, LogFilterSource};
use crate::types::interval::BlockRange;

/// Default page size of the factory child-address stream.
pub const DEFAULT_CHILD_ADDRESS_PAGE_SIZE: usize = 500;

/// Default page size of the event replay stream.
pub const DEFAULT_EVENT_PAGE_SIZE: usize = 1_000;

// ═══════════════════════════════════════════════════════════════════════════════
// INTERVAL STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// Port for coverage interval tracking.
///
/// Intervals record which block ranges have been indexed for a filter so
/// a backfill never re-fetches covered ranges. Within a filter the stored
/// set is always the minimal disjoint representation of the union.
///
/// # Implementation Notes
///
/// Implementations must:
/// - Run each insert (artifacts + interval + merge) in one serializable
///   transaction.
/// - Answer retrieval with subset semantics: intervals stored under any
///   broader filter count as coverage for a narrower one.
#[async_trait]
pub trait IntervalStore: Send + Sync {
    /// Record that `interval` has been indexed for a log filter, storing
    /// the fetched artifacts alongside.
    ///
    /// Upserts the block, transactions, and logs, ensures the filter row
    /// exists under its canonical id, inserts the interval, and merges
    /// overlapping or adjacent intervals, all in one transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the criteria are malformed or the database
    /// operation fails. Serialization conflicts are retried internally.
    async fn insert_log_filter_interval(
        &self,
        chain_id: u64,
        criteria: &LogFilterCriteria,
        block: &Block,
        transactions: &[Transaction],
        logs: &[Log],
        interval: BlockRange,
    ) -> Result<()>;

    /// The merged coverage for a filter, honoring subsumption: every
    /// stored filter the requested criteria is a subset of contributes
    /// its intervals.
    ///
    /// # Errors
    ///
    /// Returns an error if the criteria are malformed or the query fails.
    async fn get_log_filter_intervals(
        &self,
        chain_id: u64,
        criteria: &LogFilterCriteria,
    ) -> Result<Vec<BlockRange>>;

    /// Record that `interval` of the *child contracts'* logs has been
    /// indexed under a factory.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails. Serialization
    /// conflicts are retried internally.
    async fn insert_factory_log_filter_interval(
        &self,
        chain_id: u64,
        factory: &Factory,
        block: &Block,
        transactions: &[Transaction],
        logs: &[Log],
        interval: BlockRange,
    ) -> Result<()>;

    /// The merged child-log coverage for a factory.
    ///
    /// Factories are matched solely by parent address, event selector,
    /// and child-address location; topics on the query never narrow the
    /// answer.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    async fn get_factory_log_filter_intervals(
        &self,
        chain_id: u64,
        factory: &Factory,
    ) -> Result<Vec<BlockRange>>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// FACTORY STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// Port for factory child-address discovery.
#[async_trait]
pub trait FactoryStore: Send + Sync {
    /// Write raw parent-emission logs so children can be discovered
    /// later. No side effect on intervals.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn insert_factory_child_address_logs(&self, chain_id: u64, logs: &[Log]) -> Result<()>;

    /// A lazy, finite, single-pass sequence of child-address pages,
    /// ordered by `(block_number, log_index)` of the discovering
    /// emission, bounded at `up_to_block`.
    ///
    /// Pages are never empty; the sequence terminates when the
    /// underlying query runs dry. Dropping the stream cancels it.
    fn get_factory_child_addresses(
        &self,
        chain_id: u64,
        factory: Factory,
        up_to_block: U256,
        page_size: usize,
    ) -> BoxStream<'static, Result<Vec<Address>>>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// REPLAY STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// Parameters of an event replay.
#[derive(Debug, Clone)]
pub struct LogEventRequest {
    /// Inclusive lower bound on block timestamps.
    pub from_timestamp: u64,
    /// Inclusive upper bound on block timestamps.
    pub to_timestamp: u64,
    /// Direct log filter sources.
    pub log_filters: Vec<LogFilterSource>,
    /// Factory-child sources.
    pub factories: Vec<FactorySource>,
    /// Rows fetched per page; defaults to
    /// [`DEFAULT_EVENT_PAGE_SIZE`] when unset.
    pub page_size: Option<usize>,
}

impl Default for LogEventRequest {
    fn default() -> Self {
        Self {
            from_timestamp: 0,
            to_timestamp: u64::MAX,
            log_filters: Vec::new(),
            factories: Vec::new(),
            page_size: None,
        }
    }
}

/// Port for the ordered event replay.
pub trait ReplayStore: Send + Sync {
    /// A paginated stream of enriched events (log + transaction + block)
    /// matching the request's sources within its time window.
    ///
    /// Events are globally ordered by `(timestamp, chain_id,
    /// block_number, log_index)`. A log matching several sources is
    /// emitted once per source, tagged with that source's name, in
    /// source input order. Dropping the stream cancels it.
    fn get_log_events(&self, request: LogEventRequest) -> BoxStream<'static, Result<LogEventPage>>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// REALTIME STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// Port for realtime ingestion and reorg rollback.
#[async_trait]
pub trait RealtimeStore: Send + Sync {
    /// Upsert a realtime-ingested block with its transactions and logs.
    /// No interval is written.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn insert_realtime_block(
        &self,
        chain_id: u64,
        block: &Block,
        transactions: &[Transaction],
        logs: &[Log],
    ) -> Result<()>;

    /// Record realtime coverage for a set of sources in one transaction.
    ///
    /// Each log filter gets an interval insert-and-merge. Each factory
    /// additionally gets a log filter interval under its synthetic
    /// parent-emission filter, so raw emission coverage stays queryable
    /// through the normal log path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails. Serialization
    /// conflicts are retried internally.
    async fn insert_realtime_interval(
        &self,
        chain_id: u64,
        log_filters: &[LogFilterCriteria],
        factories: &[Factory],
        interval: BlockRange,
    ) -> Result<()>;

    /// Roll back a reorg: atomically delete every artifact with
    /// `block_number >= from_block` on the chain and truncate straddling
    /// intervals to end at `from_block - 1` (or drop them entirely).
    ///
    /// The delete runs unconditionally; guarding against rollback past a
    /// finalized checkpoint is the caller's policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn delete_realtime_data(&self, chain_id: u64, from_block: U256) -> Result<()>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONTRACT READ STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// Port for the contract-call read cache.
///
/// Deduplicates identical contract reads across runs. The consumer
/// performs the real RPC call on a miss and inserts the result before
/// returning.
#[async_trait]
pub trait ContractReadStore: Send + Sync {
    /// Store a read result; on key conflict the result is replaced.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn insert_contract_read_result(&self, read: &ContractReadResult) -> Result<()>;

    /// Look up a cached read. A miss is `Ok(None)`, never an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    async fn get_contract_read_result(
        &self,
        key: &ContractReadKey,
    ) -> Result<Option<ContractReadResult>>;
}
