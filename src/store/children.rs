//! Factory child-address discovery over stored parent emissions.
//!
//! Child contracts are discovered from the factory's deployment
//! emissions: logs with the factory's address and event selector. The
//! iterator pages through them by keyset cursor and extracts one child
//! address per emission according to the factory's child-address
//! location.

#![allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use sqlx::FromRow;
use sqlx::postgres::PgPool;
use tracing::instrument;

use crate::error::{InfraError, Result, map_database_error};
use crate::ports::FactoryStore;
use crate::store::postgres::{PostgresEventStore, upsert_log, with_serialization_retry};
use crate::types::entities::Log;
use crate::types::filter::Factory;
use crate::types::primitives::{hex_address, hex_b256, parse_b256, parse_bytes, u256_to_numeric};

// ═══════════════════════════════════════════════════════════════════════════════
// PAGE QUERY
// ═══════════════════════════════════════════════════════════════════════════════

/// One page of parent emissions past the cursor, oldest first.
const CHILD_PAGE_QUERY: &str = r#"
SELECT block_number, log_index, topic1, topic2, topic3, data
FROM logs
WHERE chain_id = $1 AND address = $2 AND topic0 = $3
  AND block_number <= $4
  AND (block_number, log_index) > ($5, $6)
ORDER BY block_number ASC, log_index ASC
LIMIT $7
"#;

/// Database row for a parent emission, trimmed to what extraction needs.
#[derive(Debug, FromRow)]
pub(crate) struct ChildLogRow {
    pub(crate) block_number: BigDecimal,
    pub(crate) log_index: i64,
    pub(crate) topic1: Option<String>,
    pub(crate) topic2: Option<String>,
    pub(crate) topic3: Option<String>,
    pub(crate) data: String,
}

impl ChildLogRow {
    /// Extract the child address, if the emission carries the expected
    /// position. Corrupt rows error; short emissions are skipped.
    pub(crate) fn extract_child(&self, factory: &Factory) -> Result<Option<Address>> {
        let corrupt =
            |what: &str| InfraError::Internal(format!("corrupt {what} in factory emission"));

        let mut topics: Vec<B256> = vec![factory.event_selector];
        for slot in [&self.topic1, &self.topic2, &self.topic3] {
            let Some(raw) = slot else { break };
            topics.push(parse_b256(raw).map_err(|_| corrupt("topic"))?);
        }
        let data = parse_bytes(&self.data).map_err(|_| corrupt("data"))?;

        Ok(factory.child_address_location.extract(&topics, &data))
    }
}

/// Pagination state threaded through the lazy stream.
struct ChildPageState {
    pool: PgPool,
    chain_id: u64,
    factory: Factory,
    up_to: BigDecimal,
    cursor: (BigDecimal, i64),
    page_size: usize,
    done: bool,
}

async fn next_child_page(
    state: &mut ChildPageState,
) -> Result<Option<Vec<Address>>> {
    loop {
        if state.done {
            return Ok(None);
        }

        let rows: Vec<ChildLogRow> = sqlx::query_as(CHILD_PAGE_QUERY)
            .bind(state.chain_id as i64)
            .bind(hex_address(&state.factory.address))
            .bind(hex_b256(&state.factory.event_selector))
            .bind(&state.up_to)
            .bind(&state.cursor.0)
            .bind(state.cursor.1)
            .bind(state.page_size as i64)
            .fetch_all(&state.pool)
            .await
            .map_err(map_database_error)?;

        let Some(last) = rows.last() else {
            return Ok(None);
        };
        state.cursor = (last.block_number.clone(), last.log_index);
        if rows.len() < state.page_size {
            state.done = true;
        }

        let mut page = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(child) = row.extract_child(&state.factory)? {
                page.push(child);
            }
        }

        // Pages are never empty; keep scanning if every emission in this
        // batch lacked the expected position.
        if !page.is_empty() {
            return Ok(Some(page));
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FACTORY STORE IMPLEMENTATION
// ═══════════════════════════════════════════════════════════════════════════════

impl PostgresEventStore {
    async fn insert_child_logs_once(&self, logs: &[Log]) -> Result<()> {
        let mut tx = self.begin_serializable().await?;
        for log in logs {
            upsert_log(&mut tx, log).await?;
        }
        tx.commit().await.map_err(map_database_error)?;
        Ok(())
    }
}

#[async_trait]
impl FactoryStore for PostgresEventStore {
    #[instrument(skip_all, fields(chain_id = chain_id, count = logs.len()))]
    async fn insert_factory_child_address_logs(&self, chain_id: u64, logs: &[Log]) -> Result<()> {
        debug_assert!(logs.iter().all(|log| log.chain_id == chain_id));
        with_serialization_retry("insert_factory_child_address_logs", || {
            self.insert_child_logs_once(logs)
        })
        .await
    }

    fn get_factory_child_addresses(
        &self,
        chain_id: u64,
        factory: Factory,
        up_to_block: U256,
        page_size: usize,
    ) -> BoxStream<'static, Result<Vec<Address>>> {
        let state = ChildPageState {
            pool: self.pool().clone(),
            chain_id,
            factory,
            up_to: u256_to_numeric(up_to_block),
            // Sentinel cursor ordered before every real row.
            cursor: (BigDecimal::from(-1), -1),
            page_size: page_size.max(1),
            done: false,
        };

        stream::try_unfold(state, |mut state| async move {
            let page = next_child_page(&mut state).await?;
            Ok(page.map(|page| (page, state)))
        })
        .boxed()
    }
}
