//! PostgreSQL implementation of the event store ports using SQLx.
//!
//! One `PostgresEventStore` owns the connection pool and implements every
//! storage port. All multi-statement writes run inside a single
//! SERIALIZABLE transaction; serialization conflicts are retried with
//! jittered backoff before being surfaced.
//!
//! # Type Conversions
//!
//! PostgreSQL uses signed integers for BIGINT columns while the domain
//! uses unsigned types. These casts are safe because:
//! - Chain ids and log/transaction indexes won't exceed i64::MAX
//! - 256-bit values travel through NUMERIC(78, 0) as BigDecimal
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless // Using `as i64` for u64 is clear in DB binding context
)]

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use sqlx::postgres::PgPool;
use sqlx::{PgConnection, Postgres, Transaction as SqlxTransaction};
use tracing::{debug, instrument, warn};

use crate::error::{
    InfraError, Result, StoreError, is_serialization_conflict, map_database_error,
};
use crate::ports::{ContractReadStore, IntervalStore, RealtimeStore};
use crate::store::rows::{ContractReadRow, IntervalRow, LogFilterRow};
use crate::types::entities::{
    Block, ContractReadKey, ContractReadResult, Log, Transaction, TransactionEnvelope,
};
use crate::types::filter::{CanonicalCriteria, Factory, LogFilterCriteria};
use crate::types::interval::{BlockRange, merge_ranges};
use crate::types::primitives::{
    hex_address, hex_b64, hex_b256, hex_bytes, u64_to_numeric, u256_to_numeric,
};

// ═══════════════════════════════════════════════════════════════════════════════
// CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// How often a serialization conflict is retried before surfacing.
const MAX_SERIALIZATION_RETRIES: u32 = 5;

/// Base backoff between retries; each attempt adds this much plus jitter.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(10);

/// Upper bound of the random jitter added to each backoff, in ms.
const RETRY_JITTER_MS: u64 = 10;

// ═══════════════════════════════════════════════════════════════════════════════
// POSTGRES EVENT STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// PostgreSQL-backed event store facade.
///
/// Implements all storage ports over one connection pool. Construct a
/// fresh instance per database; clones share the pool.
#[derive(Debug, Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    /// Create a new event store with the given connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying connection pool.
    ///
    /// Intended for tests; production consumers use the typed port
    /// operations.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run pending schema migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if migrations fail.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| InfraError::Internal(format!("migration error: {e}")))?;
        Ok(())
    }

    /// Begin a SERIALIZABLE transaction.
    pub(crate) async fn begin_serializable(
        &self,
    ) -> Result<SqlxTransaction<'static, Postgres>> {
        let mut tx = self.pool.begin().await.map_err(map_database_error)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(map_database_error)?;
        Ok(tx)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SERIALIZATION RETRY
// ═══════════════════════════════════════════════════════════════════════════════

/// Run an operation, retrying serialization conflicts with jittered
/// backoff up to [`MAX_SERIALIZATION_RETRIES`] times.
pub(crate) async fn with_serialization_retry<T, F, Fut>(
    operation: &'static str,
    mut attempt_fn: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        match attempt_fn().await {
            Err(err) if is_serialization_conflict(&err) => {
                attempt += 1;
                if attempt > MAX_SERIALIZATION_RETRIES {
                    metrics::counter!("chainstore_serialization_retries_exhausted_total")
                        .increment(1);
                    return Err(InfraError::SerializationConflict { attempts: attempt }.into());
                }
                let jitter = rand::thread_rng().gen_range(0..RETRY_JITTER_MS);
                let backoff = RETRY_BASE_DELAY * attempt + Duration::from_millis(jitter);
                warn!(operation, attempt, "serialization conflict, retrying");
                tokio::time::sleep(backoff).await;
            }
            other => return other,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ARTIFACT UPSERTS (C1)
// ═══════════════════════════════════════════════════════════════════════════════

/// Upsert a block; re-inserting the same block is a no-op.
async fn upsert_block(conn: &mut PgConnection, block: &Block) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO blocks (
            chain_id, hash, number, timestamp, parent_hash, base_fee_per_gas,
            difficulty, extra_data, gas_limit, gas_used, logs_bloom, miner,
            mix_hash, nonce, receipts_root, sha3_uncles, size, state_root,
            total_difficulty, transactions_root
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                $15, $16, $17, $18, $19, $20)
        ON CONFLICT (chain_id, hash) DO NOTHING
        "#,
    )
    .bind(block.chain_id as i64)
    .bind(hex_b256(&block.hash))
    .bind(u256_to_numeric(block.number))
    .bind(u64_to_numeric(block.timestamp))
    .bind(hex_b256(&block.parent_hash))
    .bind(block.base_fee_per_gas.map(u256_to_numeric))
    .bind(u256_to_numeric(block.difficulty))
    .bind(hex_bytes(&block.extra_data))
    .bind(u256_to_numeric(block.gas_limit))
    .bind(u256_to_numeric(block.gas_used))
    .bind(hex_bytes(&block.logs_bloom))
    .bind(hex_address(&block.miner))
    .bind(hex_b256(&block.mix_hash))
    .bind(hex_b64(&block.nonce))
    .bind(hex_b256(&block.receipts_root))
    .bind(hex_b256(&block.sha3_uncles))
    .bind(u256_to_numeric(block.size))
    .bind(hex_b256(&block.state_root))
    .bind(block.total_difficulty.map(u256_to_numeric))
    .bind(hex_b256(&block.transactions_root))
    .execute(&mut *conn)
    .await
    .map_err(map_database_error)?;
    Ok(())
}

/// Upsert a transaction; re-inserting the same transaction is a no-op.
async fn upsert_transaction(conn: &mut PgConnection, transaction: &Transaction) -> Result<()> {
    let (gas_price, max_fee, max_priority_fee, max_blob_fee, access_list, blob_hashes) =
        match &transaction.envelope {
            TransactionEnvelope::Legacy { gas_price } => {
                (Some(*gas_price), None, None, None, None, None)
            }
            TransactionEnvelope::Eip2930 {
                gas_price,
                access_list,
            } => (
                Some(*gas_price),
                None,
                None,
                None,
                Some(serde_json::to_string(access_list).map_err(InfraError::Serialization)?),
                None,
            ),
            TransactionEnvelope::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
                access_list,
            } => (
                None,
                Some(*max_fee_per_gas),
                Some(*max_priority_fee_per_gas),
                None,
                Some(serde_json::to_string(access_list).map_err(InfraError::Serialization)?),
                None,
            ),
            TransactionEnvelope::Eip4844 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
                max_fee_per_blob_gas,
                access_list,
                blob_versioned_hashes,
            } => (
                None,
                Some(*max_fee_per_gas),
                Some(*max_priority_fee_per_gas),
                Some(*max_fee_per_blob_gas),
                Some(serde_json::to_string(access_list).map_err(InfraError::Serialization)?),
                Some(
                    serde_json::to_string(
                        &blob_versioned_hashes.iter().map(hex_b256).collect::<Vec<_>>(),
                    )
                    .map_err(InfraError::Serialization)?,
                ),
            ),
        };

    sqlx::query(
        r#"
        INSERT INTO transactions (
            chain_id, hash, block_hash, block_number, transaction_index,
            from_address, to_address, input, value, nonce, gas, tx_type,
            gas_price, max_fee_per_gas, max_priority_fee_per_gas,
            max_fee_per_blob_gas, access_list, blob_versioned_hashes, v, r, s
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                $15, $16, $17, $18, $19, $20, $21)
        ON CONFLICT (chain_id, hash) DO NOTHING
        "#,
    )
    .bind(transaction.chain_id as i64)
    .bind(hex_b256(&transaction.hash))
    .bind(hex_b256(&transaction.block_hash))
    .bind(u256_to_numeric(transaction.block_number))
    .bind(transaction.transaction_index as i64)
    .bind(hex_address(&transaction.from))
    .bind(transaction.to.as_ref().map(hex_address))
    .bind(hex_bytes(&transaction.input))
    .bind(u256_to_numeric(transaction.value))
    .bind(transaction.nonce as i64)
    .bind(u256_to_numeric(transaction.gas))
    .bind(i16::from(transaction.envelope.type_id()))
    .bind(gas_price.map(u256_to_numeric))
    .bind(max_fee.map(u256_to_numeric))
    .bind(max_priority_fee.map(u256_to_numeric))
    .bind(max_blob_fee.map(u256_to_numeric))
    .bind(access_list)
    .bind(blob_hashes)
    .bind(u256_to_numeric(transaction.v))
    .bind(hex_b256(&transaction.r.into()))
    .bind(hex_b256(&transaction.s.into()))
    .execute(&mut *conn)
    .await
    .map_err(map_database_error)?;
    Ok(())
}

/// Upsert a log; re-inserting the same log is a no-op.
pub(crate) async fn upsert_log(conn: &mut PgConnection, log: &Log) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO logs (
            chain_id, block_hash, block_number, log_index, transaction_hash,
            transaction_index, address, topic0, topic1, topic2, topic3,
            data, removed
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        ON CONFLICT (chain_id, block_hash, log_index) DO NOTHING
        "#,
    )
    .bind(log.chain_id as i64)
    .bind(hex_b256(&log.block_hash))
    .bind(u256_to_numeric(log.block_number))
    .bind(log.log_index as i64)
    .bind(hex_b256(&log.transaction_hash))
    .bind(log.transaction_index as i64)
    .bind(hex_address(&log.address))
    .bind(log.topic(0).map(hex_b256))
    .bind(log.topic(1).map(hex_b256))
    .bind(log.topic(2).map(hex_b256))
    .bind(log.topic(3).map(hex_b256))
    .bind(hex_bytes(&log.data))
    .bind(log.removed)
    .execute(&mut *conn)
    .await
    .map_err(map_database_error)?;
    Ok(())
}

async fn upsert_artifacts(
    conn: &mut PgConnection,
    block: &Block,
    transactions: &[Transaction],
    logs: &[Log],
) -> Result<()> {
    upsert_block(conn, block).await?;
    for transaction in transactions {
        upsert_transaction(conn, transaction).await?;
    }
    for log in logs {
        upsert_log(conn, log).await?;
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// INTERVAL LEDGER (C2)
// ═══════════════════════════════════════════════════════════════════════════════

/// Which ledger table an interval operation targets.
#[derive(Debug, Clone, Copy)]
enum LedgerTable {
    LogFilter,
    Factory,
}

impl LedgerTable {
    const fn table(self) -> &'static str {
        match self {
            Self::LogFilter => "log_filter_intervals",
            Self::Factory => "factory_log_filter_intervals",
        }
    }

    const fn key_column(self) -> &'static str {
        match self {
            Self::LogFilter => "log_filter_id",
            Self::Factory => "factory_id",
        }
    }
}

async fn upsert_log_filter_row(
    conn: &mut PgConnection,
    filter_id: &str,
    chain_id: u64,
    canonical: &CanonicalCriteria,
) -> Result<()> {
    let [address, topic0, topic1, topic2, topic3] = canonical.slot_columns();
    sqlx::query(
        r#"
        INSERT INTO log_filters (id, chain_id, address, topic0, topic1, topic2, topic3)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(filter_id)
    .bind(chain_id as i64)
    .bind(address)
    .bind(topic0)
    .bind(topic1)
    .bind(topic2)
    .bind(topic3)
    .execute(&mut *conn)
    .await
    .map_err(map_database_error)?;
    Ok(())
}

async fn upsert_factory_row(
    conn: &mut PgConnection,
    factory_id: &str,
    chain_id: u64,
    factory: &Factory,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO factories (id, chain_id, address, event_selector, child_address_location)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(factory_id)
    .bind(chain_id as i64)
    .bind(hex_address(&factory.address))
    .bind(hex_b256(&factory.event_selector))
    .bind(factory.child_address_location.to_string())
    .execute(&mut *conn)
    .await
    .map_err(map_database_error)?;
    Ok(())
}

/// Insert an interval observation and fold the key's rows back into
/// their minimal disjoint representation.
///
/// Runs inside the caller's transaction so concurrent merges are ordered
/// by the SERIALIZABLE isolation level.
async fn insert_and_merge_interval(
    conn: &mut PgConnection,
    ledger: LedgerTable,
    key: &str,
    interval: BlockRange,
) -> Result<()> {
    let table = ledger.table();
    let key_column = ledger.key_column();

    sqlx::query(&format!(
        "INSERT INTO {table} ({key_column}, start_block, end_block) VALUES ($1, $2, $3)"
    ))
    .bind(key)
    .bind(u256_to_numeric(interval.start()))
    .bind(u256_to_numeric(interval.end()))
    .execute(&mut *conn)
    .await
    .map_err(map_database_error)?;

    let rows: Vec<IntervalRow> = sqlx::query_as(&format!(
        "SELECT start_block, end_block FROM {table} WHERE {key_column} = $1"
    ))
    .bind(key)
    .fetch_all(&mut *conn)
    .await
    .map_err(map_database_error)?;

    let stored = rows.len();
    let ranges = rows
        .into_iter()
        .map(BlockRange::try_from)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let merged = merge_ranges(ranges);

    // Merging only ever shrinks the set; an unchanged count means the
    // stored rows are already minimal.
    if merged.len() != stored {
        sqlx::query(&format!("DELETE FROM {table} WHERE {key_column} = $1"))
            .bind(key)
            .execute(&mut *conn)
            .await
            .map_err(map_database_error)?;
        for range in &merged {
            sqlx::query(&format!(
                "INSERT INTO {table} ({key_column}, start_block, end_block) VALUES ($1, $2, $3)"
            ))
            .bind(key)
            .bind(u256_to_numeric(range.start()))
            .bind(u256_to_numeric(range.end()))
            .execute(&mut *conn)
            .await
            .map_err(map_database_error)?;
        }
        metrics::counter!("chainstore_intervals_merged_total")
            .increment((stored - merged.len()) as u64);
    }
    Ok(())
}

impl PostgresEventStore {
    async fn insert_log_filter_interval_once(
        &self,
        chain_id: u64,
        canonical: &CanonicalCriteria,
        filter_id: &str,
        block: &Block,
        transactions: &[Transaction],
        logs: &[Log],
        interval: BlockRange,
    ) -> Result<()> {
        let mut tx = self.begin_serializable().await?;
        upsert_artifacts(&mut tx, block, transactions, logs).await?;
        upsert_log_filter_row(&mut tx, filter_id, chain_id, canonical).await?;
        insert_and_merge_interval(&mut tx, LedgerTable::LogFilter, filter_id, interval).await?;
        tx.commit().await.map_err(map_database_error)?;
        Ok(())
    }

    async fn insert_factory_interval_once(
        &self,
        chain_id: u64,
        factory: &Factory,
        factory_id: &str,
        block: &Block,
        transactions: &[Transaction],
        logs: &[Log],
        interval: BlockRange,
    ) -> Result<()> {
        let mut tx = self.begin_serializable().await?;
        upsert_artifacts(&mut tx, block, transactions, logs).await?;
        upsert_factory_row(&mut tx, factory_id, chain_id, factory).await?;
        insert_and_merge_interval(&mut tx, LedgerTable::Factory, factory_id, interval).await?;
        tx.commit().await.map_err(map_database_error)?;
        Ok(())
    }

    /// Ids of every stored filter on the chain that the query filter is
    /// a subset of.
    async fn covering_filter_ids(
        &self,
        chain_id: u64,
        query: &CanonicalCriteria,
    ) -> Result<Vec<String>> {
        let rows: Vec<LogFilterRow> = sqlx::query_as(
            r#"
            SELECT id, address, topic0, topic1, topic2, topic3
            FROM log_filters
            WHERE chain_id = $1
            "#,
        )
        .bind(chain_id as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_database_error)?;

        let mut ids = Vec::new();
        for row in rows {
            let stored = CanonicalCriteria::from_slot_columns([
                row.address.as_deref(),
                row.topic0.as_deref(),
                row.topic1.as_deref(),
                row.topic2.as_deref(),
                row.topic3.as_deref(),
            ])?;
            if query.is_subset_of(&stored) {
                ids.push(row.id);
            }
        }
        Ok(ids)
    }
}

#[async_trait]
impl IntervalStore for PostgresEventStore {
    #[instrument(skip_all, fields(chain_id = chain_id, interval = %interval))]
    async fn insert_log_filter_interval(
        &self,
        chain_id: u64,
        criteria: &LogFilterCriteria,
        block: &Block,
        transactions: &[Transaction],
        logs: &[Log],
        interval: BlockRange,
    ) -> Result<()> {
        let canonical = criteria.canonicalize()?;
        let filter_id = canonical.filter_id(chain_id);
        with_serialization_retry("insert_log_filter_interval", || {
            self.insert_log_filter_interval_once(
                chain_id,
                &canonical,
                &filter_id,
                block,
                transactions,
                logs,
                interval,
            )
        })
        .await?;
        debug!(filter_id, "log filter interval recorded");
        Ok(())
    }

    #[instrument(skip_all, fields(chain_id = chain_id))]
    async fn get_log_filter_intervals(
        &self,
        chain_id: u64,
        criteria: &LogFilterCriteria,
    ) -> Result<Vec<BlockRange>> {
        let canonical = criteria.canonicalize()?;
        let ids = self.covering_filter_ids(chain_id, &canonical).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<IntervalRow> = sqlx::query_as(
            "SELECT start_block, end_block FROM log_filter_intervals WHERE log_filter_id = ANY($1)",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(map_database_error)?;

        let ranges = rows
            .into_iter()
            .map(BlockRange::try_from)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(merge_ranges(ranges))
    }

    #[instrument(skip_all, fields(chain_id = chain_id, interval = %interval))]
    async fn insert_factory_log_filter_interval(
        &self,
        chain_id: u64,
        factory: &Factory,
        block: &Block,
        transactions: &[Transaction],
        logs: &[Log],
        interval: BlockRange,
    ) -> Result<()> {
        let factory_id = factory.factory_id(chain_id);
        with_serialization_retry("insert_factory_log_filter_interval", || {
            self.insert_factory_interval_once(
                chain_id,
                factory,
                &factory_id,
                block,
                transactions,
                logs,
                interval,
            )
        })
        .await?;
        debug!(factory_id, "factory log filter interval recorded");
        Ok(())
    }

    #[instrument(skip_all, fields(chain_id = chain_id))]
    async fn get_factory_log_filter_intervals(
        &self,
        chain_id: u64,
        factory: &Factory,
    ) -> Result<Vec<BlockRange>> {
        let factory_id = factory.factory_id(chain_id);
        let rows: Vec<IntervalRow> = sqlx::query_as(
            "SELECT start_block, end_block FROM factory_log_filter_intervals WHERE factory_id = $1",
        )
        .bind(&factory_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_database_error)?;

        let ranges = rows
            .into_iter()
            .map(BlockRange::try_from)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(merge_ranges(ranges))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// REALTIME REORG MANAGER (C5)
// ═══════════════════════════════════════════════════════════════════════════════

impl PostgresEventStore {
    async fn insert_realtime_block_once(
        &self,
        block: &Block,
        transactions: &[Transaction],
        logs: &[Log],
    ) -> Result<()> {
        let mut tx = self.begin_serializable().await?;
        upsert_artifacts(&mut tx, block, transactions, logs).await?;
        tx.commit().await.map_err(map_database_error)?;
        Ok(())
    }

    async fn insert_realtime_interval_once(
        &self,
        chain_id: u64,
        log_filters: &[LogFilterCriteria],
        factories: &[Factory],
        interval: BlockRange,
    ) -> Result<()> {
        let mut tx = self.begin_serializable().await?;

        for criteria in log_filters {
            let canonical = criteria.canonicalize()?;
            let filter_id = canonical.filter_id(chain_id);
            upsert_log_filter_row(&mut tx, &filter_id, chain_id, &canonical).await?;
            insert_and_merge_interval(&mut tx, LedgerTable::LogFilter, &filter_id, interval)
                .await?;
        }

        for factory in factories {
            // Raw parent-emission coverage stays queryable via the
            // normal log filter path.
            let parent = factory.parent_emission_criteria().canonicalize()?;
            let parent_id = parent.filter_id(chain_id);
            upsert_log_filter_row(&mut tx, &parent_id, chain_id, &parent).await?;
            insert_and_merge_interval(&mut tx, LedgerTable::LogFilter, &parent_id, interval)
                .await?;

            let factory_id = factory.factory_id(chain_id);
            upsert_factory_row(&mut tx, &factory_id, chain_id, factory).await?;
            insert_and_merge_interval(&mut tx, LedgerTable::Factory, &factory_id, interval)
                .await?;
        }

        tx.commit().await.map_err(map_database_error)?;
        Ok(())
    }

    async fn delete_realtime_data_once(
        &self,
        chain_id: u64,
        from_block: alloy::primitives::U256,
    ) -> Result<()> {
        let from = u256_to_numeric(from_block);
        let mut tx = self.begin_serializable().await?;

        sqlx::query("DELETE FROM logs WHERE chain_id = $1 AND block_number >= $2")
            .bind(chain_id as i64)
            .bind(&from)
            .execute(&mut *tx)
            .await
            .map_err(map_database_error)?;
        sqlx::query("DELETE FROM transactions WHERE chain_id = $1 AND block_number >= $2")
            .bind(chain_id as i64)
            .bind(&from)
            .execute(&mut *tx)
            .await
            .map_err(map_database_error)?;
        sqlx::query("DELETE FROM blocks WHERE chain_id = $1 AND number >= $2")
            .bind(chain_id as i64)
            .bind(&from)
            .execute(&mut *tx)
            .await
            .map_err(map_database_error)?;

        // Intervals starting at or past the reorg point vanish; intervals
        // straddling it are truncated to end right before it.
        sqlx::query(
            r#"
            DELETE FROM log_filter_intervals i
            USING log_filters f
            WHERE i.log_filter_id = f.id AND f.chain_id = $1 AND i.start_block >= $2
            "#,
        )
        .bind(chain_id as i64)
        .bind(&from)
        .execute(&mut *tx)
        .await
        .map_err(map_database_error)?;
        sqlx::query(
            r#"
            UPDATE log_filter_intervals i
            SET end_block = $2 - 1
            FROM log_filters f
            WHERE i.log_filter_id = f.id AND f.chain_id = $1
              AND i.end_block >= $2 AND i.start_block < $2
            "#,
        )
        .bind(chain_id as i64)
        .bind(&from)
        .execute(&mut *tx)
        .await
        .map_err(map_database_error)?;

        sqlx::query(
            r#"
            DELETE FROM factory_log_filter_intervals i
            USING factories f
            WHERE i.factory_id = f.id AND f.chain_id = $1 AND i.start_block >= $2
            "#,
        )
        .bind(chain_id as i64)
        .bind(&from)
        .execute(&mut *tx)
        .await
        .map_err(map_database_error)?;
        sqlx::query(
            r#"
            UPDATE factory_log_filter_intervals i
            SET end_block = $2 - 1
            FROM factories f
            WHERE i.factory_id = f.id AND f.chain_id = $1
              AND i.end_block >= $2 AND i.start_block < $2
            "#,
        )
        .bind(chain_id as i64)
        .bind(&from)
        .execute(&mut *tx)
        .await
        .map_err(map_database_error)?;

        tx.commit().await.map_err(map_database_error)?;
        Ok(())
    }
}

#[async_trait]
impl RealtimeStore for PostgresEventStore {
    #[instrument(skip_all, fields(chain_id = chain_id, block_number = %block.number))]
    async fn insert_realtime_block(
        &self,
        chain_id: u64,
        block: &Block,
        transactions: &[Transaction],
        logs: &[Log],
    ) -> Result<()> {
        debug_assert_eq!(chain_id, block.chain_id);
        with_serialization_retry("insert_realtime_block", || {
            self.insert_realtime_block_once(block, transactions, logs)
        })
        .await
    }

    #[instrument(skip_all, fields(chain_id = chain_id, interval = %interval))]
    async fn insert_realtime_interval(
        &self,
        chain_id: u64,
        log_filters: &[LogFilterCriteria],
        factories: &[Factory],
        interval: BlockRange,
    ) -> Result<()> {
        with_serialization_retry("insert_realtime_interval", || {
            self.insert_realtime_interval_once(chain_id, log_filters, factories, interval)
        })
        .await
    }

    #[instrument(skip(self), fields(chain_id = chain_id, from_block = %from_block))]
    async fn delete_realtime_data(
        &self,
        chain_id: u64,
        from_block: alloy::primitives::U256,
    ) -> Result<()> {
        with_serialization_retry("delete_realtime_data", || {
            self.delete_realtime_data_once(chain_id, from_block)
        })
        .await?;
        metrics::counter!("chainstore_reorg_rollbacks_total").increment(1);
        debug!("realtime data rolled back");
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONTRACT READ CACHE (C6)
// ═══════════════════════════════════════════════════════════════════════════════

#[async_trait]
impl ContractReadStore for PostgresEventStore {
    #[instrument(skip_all, fields(chain_id = read.chain_id, block_number = %read.block_number))]
    async fn insert_contract_read_result(&self, read: &ContractReadResult) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO contract_read_results (chain_id, address, block_number, call_data, result)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (chain_id, address, block_number, call_data)
            DO UPDATE SET result = EXCLUDED.result
            "#,
        )
        .bind(read.chain_id as i64)
        .bind(hex_address(&read.address))
        .bind(u256_to_numeric(read.block_number))
        .bind(hex_bytes(&read.data))
        .bind(hex_bytes(&read.result))
        .execute(&self.pool)
        .await
        .map_err(map_database_error)?;
        Ok(())
    }

    #[instrument(skip_all, fields(chain_id = key.chain_id, block_number = %key.block_number))]
    async fn get_contract_read_result(
        &self,
        key: &ContractReadKey,
    ) -> Result<Option<ContractReadResult>> {
        let row: Option<ContractReadRow> = sqlx::query_as(
            r#"
            SELECT chain_id, address, block_number, call_data, result
            FROM contract_read_results
            WHERE chain_id = $1 AND address = $2 AND block_number = $3 AND call_data = $4
            "#,
        )
        .bind(key.chain_id as i64)
        .bind(hex_address(&key.address))
        .bind(u256_to_numeric(key.block_number))
        .bind(hex_bytes(&key.data))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_database_error)?;

        match row {
            Some(row) => Ok(Some(row.try_into().map_err(StoreError::Infra)?)),
            None => Ok(None),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
