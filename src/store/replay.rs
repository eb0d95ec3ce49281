//! Time-ordered event replay across event sources.
//!
//! The replay iterator pages through enriched logs (log + transaction +
//! containing block) matching a set of event source descriptors within a
//! timestamp window. Matching has two halves:
//!
//! - a coarse SQL prefilter OR-ing every source's predicate, paged by a
//!   `(timestamp, chain_id, block_number, log_index)` keyset cursor;
//! - host-side per-source tagging, which re-checks each source exactly
//!   and attaches its name. A log matching several sources is emitted
//!   once per source, in source input order.
//!
//! Factory sources match logs emitted by child contracts discovered at a
//! block at or before the log's own block. Each factory's discovery list
//! is loaded once when the stream starts.

#![allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]

use std::collections::HashMap;

use alloy::primitives::{Address, U256};
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use sqlx::postgres::PgPool;
use sqlx::{FromRow, Postgres, QueryBuilder};
use tracing::debug;

use crate::error::{Result, map_database_error};
use crate::ports::{DEFAULT_EVENT_PAGE_SIZE, LogEventRequest, ReplayStore};
use crate::store::children::ChildLogRow;
use crate::store::postgres::PostgresEventStore;
use crate::store::rows::{BlockRow, LogRow, TransactionRow};
use crate::types::entities::{Block, EventCursor, Log, LogEvent, LogEventPage, Transaction};
use crate::types::filter::{CanonicalCriteria, Factory};
use crate::types::primitives::{hex_address, hex_b256, u64_to_numeric, u256_to_numeric};

// ═══════════════════════════════════════════════════════════════════════════════
// PREPARED SOURCES
// ═══════════════════════════════════════════════════════════════════════════════

/// A replay source resolved for matching.
#[derive(Debug)]
struct PreparedSource {
    name: String,
    chain_id: u64,
    kind: PreparedKind,
}

#[derive(Debug)]
enum PreparedKind {
    /// Direct filter with the event-selector override already folded into
    /// topic position 0.
    LogFilter {
        criteria: CanonicalCriteria,
        from_block: Option<U256>,
    },
    /// Factory source with its child discovery list: address to the block
    /// it was first emitted at.
    Factory { children: HashMap<Address, U256> },
}

impl PreparedSource {
    fn matches(&self, log: &Log) -> bool {
        if log.chain_id != self.chain_id {
            return false;
        }
        match &self.kind {
            PreparedKind::LogFilter {
                criteria,
                from_block,
            } => {
                criteria.matches(&log.address, &log.topics)
                    && from_block.is_none_or(|from| log.block_number >= from)
            }
            PreparedKind::Factory { children } => children
                .get(&log.address)
                .is_some_and(|first_seen| *first_seen <= log.block_number),
        }
    }
}

/// The fully-resolved replay request.
#[derive(Debug)]
struct ReplayPlan {
    from_timestamp: u64,
    to_timestamp: u64,
    page_size: usize,
    sources: Vec<PreparedSource>,
}

/// Load a factory's child discovery list: every child address with the
/// block of its first discovering emission.
async fn load_child_discovery(
    pool: &PgPool,
    chain_id: u64,
    factory: &Factory,
) -> Result<HashMap<Address, U256>> {
    let rows: Vec<ChildLogRow> = sqlx::query_as(
        r#"
        SELECT block_number, log_index, topic1, topic2, topic3, data
        FROM logs
        WHERE chain_id = $1 AND address = $2 AND topic0 = $3
        ORDER BY block_number ASC, log_index ASC
        "#,
    )
    .bind(chain_id as i64)
    .bind(hex_address(&factory.address))
    .bind(hex_b256(&factory.event_selector))
    .fetch_all(pool)
    .await
    .map_err(map_database_error)?;

    let mut children = HashMap::new();
    for row in &rows {
        if let Some(child) = row.extract_child(factory)? {
            let first_seen = crate::types::primitives::numeric_to_u256(&row.block_number)?;
            children.entry(child).or_insert(first_seen);
        }
    }
    Ok(children)
}

/// Resolve a request into a plan. `None` means no source can ever match
/// and the stream is empty.
async fn prepare(pool: &PgPool, request: &LogEventRequest) -> Result<Option<ReplayPlan>> {
    let mut sources = Vec::with_capacity(request.log_filters.len() + request.factories.len());

    for source in &request.log_filters {
        // A source whose selector override empties topic 0 matches nothing.
        let Some(criteria) = source.effective_criteria()? else {
            continue;
        };
        sources.push(PreparedSource {
            name: source.name.clone(),
            chain_id: source.chain_id,
            kind: PreparedKind::LogFilter {
                criteria,
                from_block: source.from_block,
            },
        });
    }

    for source in &request.factories {
        let children = load_child_discovery(pool, source.chain_id, &source.criteria).await?;
        sources.push(PreparedSource {
            name: source.name.clone(),
            chain_id: source.chain_id,
            kind: PreparedKind::Factory { children },
        });
    }

    if sources.is_empty() {
        return Ok(None);
    }
    Ok(Some(ReplayPlan {
        from_timestamp: request.from_timestamp,
        to_timestamp: request.to_timestamp,
        page_size: request.page_size.unwrap_or(DEFAULT_EVENT_PAGE_SIZE).max(1),
        sources,
    }))
}

// ═══════════════════════════════════════════════════════════════════════════════
// PAGE QUERY
// ═══════════════════════════════════════════════════════════════════════════════

/// Flattened enriched row: log columns plus aliased block and
/// transaction columns. Shared key columns (block hash, transaction
/// hash, block number) are selected once from the log side.
#[derive(Debug, FromRow)]
struct EnrichedEventRow {
    chain_id: i64,
    block_hash: String,
    block_number: bigdecimal::BigDecimal,
    log_index: i64,
    transaction_hash: String,
    transaction_index: i64,
    address: String,
    topic0: Option<String>,
    topic1: Option<String>,
    topic2: Option<String>,
    topic3: Option<String>,
    data: String,
    removed: bool,

    b_number: bigdecimal::BigDecimal,
    b_timestamp: bigdecimal::BigDecimal,
    b_parent_hash: String,
    b_base_fee_per_gas: Option<bigdecimal::BigDecimal>,
    b_difficulty: bigdecimal::BigDecimal,
    b_extra_data: String,
    b_gas_limit: bigdecimal::BigDecimal,
    b_gas_used: bigdecimal::BigDecimal,
    b_logs_bloom: String,
    b_miner: String,
    b_mix_hash: String,
    b_nonce: String,
    b_receipts_root: String,
    b_sha3_uncles: String,
    b_size: bigdecimal::BigDecimal,
    b_state_root: String,
    b_total_difficulty: Option<bigdecimal::BigDecimal>,
    b_transactions_root: String,

    t_from_address: String,
    t_to_address: Option<String>,
    t_input: String,
    t_value: bigdecimal::BigDecimal,
    t_nonce: i64,
    t_gas: bigdecimal::BigDecimal,
    t_tx_type: i16,
    t_gas_price: Option<bigdecimal::BigDecimal>,
    t_max_fee_per_gas: Option<bigdecimal::BigDecimal>,
    t_max_priority_fee_per_gas: Option<bigdecimal::BigDecimal>,
    t_max_fee_per_blob_gas: Option<bigdecimal::BigDecimal>,
    t_access_list: Option<String>,
    t_blob_versioned_hashes: Option<String>,
    t_v: bigdecimal::BigDecimal,
    t_r: String,
    t_s: String,
}

impl EnrichedEventRow {
    /// Split into the three domain artifacts, funneling through the
    /// standard row conversions.
    fn into_artifacts(self) -> Result<(Log, Block, Transaction)> {
        let block = BlockRow {
            chain_id: self.chain_id,
            hash: self.block_hash.clone(),
            number: self.b_number,
            timestamp: self.b_timestamp,
            parent_hash: self.b_parent_hash,
            base_fee_per_gas: self.b_base_fee_per_gas,
            difficulty: self.b_difficulty,
            extra_data: self.b_extra_data,
            gas_limit: self.b_gas_limit,
            gas_used: self.b_gas_used,
            logs_bloom: self.b_logs_bloom,
            miner: self.b_miner,
            mix_hash: self.b_mix_hash,
            nonce: self.b_nonce,
            receipts_root: self.b_receipts_root,
            sha3_uncles: self.b_sha3_uncles,
            size: self.b_size,
            state_root: self.b_state_root,
            total_difficulty: self.b_total_difficulty,
            transactions_root: self.b_transactions_root,
        };
        let transaction = TransactionRow {
            chain_id: self.chain_id,
            hash: self.transaction_hash.clone(),
            block_hash: self.block_hash.clone(),
            block_number: self.block_number.clone(),
            transaction_index: self.transaction_index,
            from_address: self.t_from_address,
            to_address: self.t_to_address,
            input: self.t_input,
            value: self.t_value,
            nonce: self.t_nonce,
            gas: self.t_gas,
            tx_type: self.t_tx_type,
            gas_price: self.t_gas_price,
            max_fee_per_gas: self.t_max_fee_per_gas,
            max_priority_fee_per_gas: self.t_max_priority_fee_per_gas,
            max_fee_per_blob_gas: self.t_max_fee_per_blob_gas,
            access_list: self.t_access_list,
            blob_versioned_hashes: self.t_blob_versioned_hashes,
            v: self.t_v,
            r: self.t_r,
            s: self.t_s,
        };
        let log = LogRow {
            chain_id: self.chain_id,
            block_hash: self.block_hash,
            block_number: self.block_number,
            log_index: self.log_index,
            transaction_hash: self.transaction_hash,
            transaction_index: self.transaction_index,
            address: self.address,
            topic0: self.topic0,
            topic1: self.topic1,
            topic2: self.topic2,
            topic3: self.topic3,
            data: self.data,
            removed: self.removed,
        };
        Ok((log.try_into()?, block.try_into()?, transaction.try_into()?))
    }
}

const ENRICHED_SELECT: &str = r#"
SELECT
    l.chain_id, l.block_hash, l.block_number, l.log_index,
    l.transaction_hash, l.transaction_index, l.address,
    l.topic0, l.topic1, l.topic2, l.topic3, l.data, l.removed,
    b.number AS b_number, b.timestamp AS b_timestamp,
    b.parent_hash AS b_parent_hash, b.base_fee_per_gas AS b_base_fee_per_gas,
    b.difficulty AS b_difficulty, b.extra_data AS b_extra_data,
    b.gas_limit AS b_gas_limit, b.gas_used AS b_gas_used,
    b.logs_bloom AS b_logs_bloom, b.miner AS b_miner,
    b.mix_hash AS b_mix_hash, b.nonce AS b_nonce,
    b.receipts_root AS b_receipts_root, b.sha3_uncles AS b_sha3_uncles,
    b.size AS b_size, b.state_root AS b_state_root,
    b.total_difficulty AS b_total_difficulty,
    b.transactions_root AS b_transactions_root,
    t.from_address AS t_from_address, t.to_address AS t_to_address,
    t.input AS t_input, t.value AS t_value, t.nonce AS t_nonce,
    t.gas AS t_gas, t.tx_type AS t_tx_type, t.gas_price AS t_gas_price,
    t.max_fee_per_gas AS t_max_fee_per_gas,
    t.max_priority_fee_per_gas AS t_max_priority_fee_per_gas,
    t.max_fee_per_blob_gas AS t_max_fee_per_blob_gas,
    t.access_list AS t_access_list,
    t.blob_versioned_hashes AS t_blob_versioned_hashes,
    t.v AS t_v, t.r AS t_r, t.s AS t_s
FROM logs l
JOIN blocks b ON b.chain_id = l.chain_id AND b.hash = l.block_hash
JOIN transactions t ON t.chain_id = l.chain_id AND t.hash = l.transaction_hash
"#;

/// Assemble the page query: time window, OR of coarse source predicates,
/// keyset cursor, global replay order, page limit.
fn build_page_query<'args>(
    plan: &'args ReplayPlan,
    cursor: Option<&EventCursor>,
) -> QueryBuilder<'args, Postgres> {
    let mut query: QueryBuilder<'args, Postgres> = QueryBuilder::new(ENRICHED_SELECT);

    query.push("WHERE b.timestamp >= ");
    query.push_bind(u64_to_numeric(plan.from_timestamp));
    query.push(" AND b.timestamp <= ");
    query.push_bind(u64_to_numeric(plan.to_timestamp));

    query.push(" AND (");
    for (index, source) in plan.sources.iter().enumerate() {
        if index > 0 {
            query.push(" OR ");
        }
        query.push("(");
        push_source_predicate(&mut query, source);
        query.push(")");
    }
    query.push(")");

    if let Some(cursor) = cursor {
        query.push(" AND (b.timestamp, l.chain_id, b.number, l.log_index) > (");
        query.push_bind(u64_to_numeric(cursor.timestamp));
        query.push(", ");
        query.push_bind(cursor.chain_id as i64);
        query.push(", ");
        query.push_bind(u256_to_numeric(cursor.block_number));
        query.push(", ");
        query.push_bind(cursor.log_index as i64);
        query.push(")");
    }

    query.push(" ORDER BY b.timestamp ASC, l.chain_id ASC, b.number ASC, l.log_index ASC LIMIT ");
    query.push_bind(plan.page_size as i64);
    query
}

/// The coarse SQL half of one source's predicate. Must never reject a
/// log the host-side check would accept.
fn push_source_predicate<'args>(
    query: &mut QueryBuilder<'args, Postgres>,
    source: &'args PreparedSource,
) {
    match &source.kind {
        PreparedKind::LogFilter {
            criteria,
            from_block,
        } => {
            query.push("l.chain_id = ");
            query.push_bind(source.chain_id as i64);
            if let Some(addresses) = &criteria.address {
                query.push(" AND l.address = ANY(");
                query.push_bind(addresses.iter().map(hex_address).collect::<Vec<_>>());
                query.push(")");
            }
            for (position, slot) in criteria.topics.iter().enumerate() {
                if let Some(topics) = slot {
                    query.push(format!(" AND l.topic{position} = ANY("));
                    query.push_bind(topics.iter().map(hex_b256).collect::<Vec<_>>());
                    query.push(")");
                }
            }
            if let Some(from_block) = from_block {
                query.push(" AND b.number >= ");
                query.push_bind(u256_to_numeric(*from_block));
            }
        }
        PreparedKind::Factory { children } => {
            if children.is_empty() {
                // No children discovered yet; the source matches nothing.
                query.push("FALSE");
                return;
            }
            query.push("l.chain_id = ");
            query.push_bind(source.chain_id as i64);
            query.push(" AND l.address = ANY(");
            query.push_bind(children.keys().map(hex_address).collect::<Vec<_>>());
            query.push(")");
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PAGE DRIVER
// ═══════════════════════════════════════════════════════════════════════════════

struct ReplayDriver {
    pool: PgPool,
    request: LogEventRequest,
    plan: Option<ReplayPlan>,
    cursor: Option<EventCursor>,
    done: bool,
}

async fn next_event_page(driver: &mut ReplayDriver) -> Result<Option<LogEventPage>> {
    if driver.done {
        return Ok(None);
    }
    if driver.plan.is_none() {
        match prepare(&driver.pool, &driver.request).await? {
            Some(plan) => driver.plan = Some(plan),
            None => {
                driver.done = true;
                return Ok(None);
            }
        }
    }
    let Some(plan) = driver.plan.as_ref() else {
        return Ok(None);
    };

    loop {
        let rows: Vec<EnrichedEventRow> = build_page_query(plan, driver.cursor.as_ref())
            .build_query_as()
            .fetch_all(&driver.pool)
            .await
            .map_err(map_database_error)?;

        if rows.is_empty() {
            driver.done = true;
            return Ok(None);
        }
        let short_page = rows.len() < plan.page_size;

        let mut events = Vec::new();
        let mut cursor = None;
        for row in rows {
            let (log, block, transaction) = row.into_artifacts()?;
            cursor = Some(EventCursor {
                timestamp: block.timestamp,
                chain_id: log.chain_id,
                block_number: block.number,
                log_index: log.log_index,
            });
            for source in &plan.sources {
                if source.matches(&log) {
                    events.push(LogEvent {
                        event_source_name: source.name.clone(),
                        chain_id: log.chain_id,
                        log: log.clone(),
                        block: block.clone(),
                        transaction: transaction.clone(),
                    });
                }
            }
        }
        // Rows were non-empty, so a cursor was recorded.
        let Some(cursor) = cursor else {
            driver.done = true;
            return Ok(None);
        };
        driver.cursor = Some(cursor);
        driver.done = short_page;

        if events.is_empty() {
            if driver.done {
                return Ok(None);
            }
            // Nothing in this batch survived exact matching; fetch the
            // next one instead of yielding an empty page.
            continue;
        }

        metrics::counter!("chainstore_replay_pages_total").increment(1);
        debug!(events = events.len(), "replay page served");
        return Ok(Some(LogEventPage { events, cursor }));
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// REPLAY STORE IMPLEMENTATION
// ═══════════════════════════════════════════════════════════════════════════════

impl ReplayStore for PostgresEventStore {
    fn get_log_events(&self, request: LogEventRequest) -> BoxStream<'static, Result<LogEventPage>> {
        let driver = ReplayDriver {
            pool: self.pool().clone(),
            request,
            plan: None,
            cursor: None,
            done: false,
        };

        stream::try_unfold(driver, |mut driver| async move {
            let page = next_event_page(&mut driver).await?;
            Ok(page.map(|page| (page, driver)))
        })
        .boxed()
    }
}
