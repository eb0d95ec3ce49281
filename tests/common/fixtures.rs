//! Test fixtures for integration tests.
//!
//! `TestDb` spins up a fresh PostgreSQL container per test case and runs
//! the migrations, so every test sees an empty schema. Artifact builders
//! produce deterministic blocks, transactions, and logs keyed by chain
//! id and block number.

use alloy::primitives::{Address, B64, B256, Bytes, U256, keccak256};
use sqlx::PgPool;
use testcontainers::ContainerAsync;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::postgres::Postgres;

use chainstore::store::PostgresEventStore;
use chainstore::types::entities::{Block, Log, Transaction, TransactionEnvelope};

/// A test database instance with pool and container.
///
/// The container is kept alive as long as this struct exists.
/// When dropped, the container is automatically stopped.
pub struct TestDb {
    /// The connection pool to the test database.
    pub pool: PgPool,
    /// The event store wrapping the pool.
    pub store: PostgresEventStore,
    /// The container (kept alive for the duration of the test).
    _container: ContainerAsync<Postgres>,
}

impl TestDb {
    /// Create a new test database with a fresh PostgreSQL container.
    ///
    /// This will:
    /// 1. Start a PostgreSQL container
    /// 2. Connect to it
    /// 3. Run all migrations
    ///
    /// # Panics
    ///
    /// Panics if container startup, connection, or migrations fail.
    pub async fn new() -> Self {
        init_tracing();

        let container = Postgres::default()
            .start()
            .await
            .expect("Failed to start PostgreSQL container");

        let host = container.get_host().await.expect("Failed to get host");
        let port = container
            .get_host_port_ipv4(5432)
            .await
            .expect("Failed to get port");

        let connection_string =
            format!("postgres://postgres:postgres@{host}:{port}/postgres");

        let pool = connect_with_retries(&connection_string, 30)
            .await
            .expect("Failed to connect to database");

        let store = PostgresEventStore::new(pool.clone());
        store
            .run_migrations()
            .await
            .expect("Failed to run migrations");

        Self {
            pool,
            store,
            _container: container,
        }
    }
}

/// Install a test subscriber once; later calls are no-ops.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Connect to the database with retries.
///
/// The container can take a moment to be fully ready even after the
/// "ready to accept connections" message appears.
async fn connect_with_retries(url: &str, max_attempts: u32) -> Result<PgPool, sqlx::Error> {
    let mut attempts = 0;
    loop {
        attempts += 1;
        match PgPool::connect(url).await {
            Ok(pool) => match sqlx::query("SELECT 1").execute(&pool).await {
                Ok(_) => return Ok(pool),
                Err(e) if attempts < max_attempts => {
                    tracing::debug!("Connection verify failed (attempt {attempts}): {e}");
                    tokio::time::sleep(std::time::Duration::from_millis(500)).await;
                }
                Err(e) => return Err(e),
            },
            Err(e) if attempts < max_attempts => {
                tracing::debug!("Connection failed (attempt {attempts}): {e}");
                tokio::time::sleep(std::time::Duration::from_millis(500)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ARTIFACT FIXTURES
// ═══════════════════════════════════════════════════════════════════════════════

/// A test address filled with one byte.
pub fn address(byte: u8) -> Address {
    Address::repeat_byte(byte)
}

/// A test topic filled with one byte.
pub fn topic(byte: u8) -> B256 {
    B256::repeat_byte(byte)
}

/// An address left-padded into a 32-byte topic, the way indexed address
/// parameters are emitted.
pub fn pad_address_topic(address: Address) -> B256 {
    let mut padded = B256::ZERO;
    padded[12..].copy_from_slice(address.as_slice());
    padded
}

/// Deterministic hash for test artifacts.
fn artifact_hash(tag: &str, chain_id: u64, number: u64, index: u64) -> B256 {
    let mut preimage = tag.as_bytes().to_vec();
    preimage.extend_from_slice(&chain_id.to_be_bytes());
    preimage.extend_from_slice(&number.to_be_bytes());
    preimage.extend_from_slice(&index.to_be_bytes());
    keccak256(&preimage)
}

/// Build a block with a deterministic hash for `(chain_id, number)`.
pub fn test_block(chain_id: u64, number: u64, timestamp: u64) -> Block {
    Block {
        chain_id,
        hash: artifact_hash("block", chain_id, number, 0),
        number: U256::from(number),
        timestamp,
        parent_hash: artifact_hash("block", chain_id, number.saturating_sub(1), 0),
        base_fee_per_gas: Some(U256::from(12_000_000_000u64)),
        difficulty: U256::ZERO,
        extra_data: Bytes::from_static(b"\xde\xad\xbe\xef"),
        gas_limit: U256::from(30_000_000u64),
        gas_used: U256::from(14_500_000u64),
        logs_bloom: Bytes::from(vec![0u8; 256]),
        miner: address(0x99),
        mix_hash: artifact_hash("mix", chain_id, number, 0),
        nonce: B64::ZERO,
        receipts_root: artifact_hash("receipts", chain_id, number, 0),
        sha3_uncles: artifact_hash("uncles", chain_id, number, 0),
        size: U256::from(52_133u64),
        state_root: artifact_hash("state", chain_id, number, 0),
        total_difficulty: Some(U256::from(58_750_003_716_598_352_816_469u128)),
        transactions_root: artifact_hash("transactions", chain_id, number, 0),
    }
}

/// Build a transaction inside `block` with a deterministic hash.
pub fn test_transaction(block: &Block, index: u64) -> Transaction {
    Transaction {
        chain_id: block.chain_id,
        hash: artifact_hash("tx", block.chain_id, block.number.to::<u64>(), index),
        block_hash: block.hash,
        block_number: block.number,
        transaction_index: index,
        from: address(0x11),
        to: Some(address(0x22)),
        input: Bytes::from_static(b"\xa9\x05\x9c\xbb"),
        value: U256::from(1_000_000_000_000_000_000u128),
        nonce: index,
        gas: U256::from(21_000u64),
        v: U256::from(1u64),
        r: U256::from(7u64),
        s: U256::from(9u64),
        envelope: TransactionEnvelope::Eip1559 {
            max_fee_per_gas: U256::from(30_000_000_000u64),
            max_priority_fee_per_gas: U256::from(1_000_000_000u64),
            access_list: alloy::rpc::types::AccessList::default(),
        },
    }
}

/// Build a log emitted by `transaction` at the given index.
pub fn test_log(
    block: &Block,
    transaction: &Transaction,
    log_index: u64,
    emitter: Address,
    topics: Vec<B256>,
    data: Bytes,
) -> Log {
    Log {
        chain_id: block.chain_id,
        block_hash: block.hash,
        block_number: block.number,
        log_index,
        transaction_hash: transaction.hash,
        transaction_index: transaction.transaction_index,
        address: emitter,
        topics,
        data,
        removed: false,
    }
}

/// A bare log used for factory parent emissions: discovery reads only
/// the logs table, so no containing block is required.
pub fn parent_emission_log(
    chain_id: u64,
    block_number: u64,
    log_index: u64,
    factory_address: Address,
    topics: Vec<B256>,
    data: Bytes,
) -> Log {
    Log {
        chain_id,
        block_hash: artifact_hash("parent-block", chain_id, block_number, 0),
        block_number: U256::from(block_number),
        log_index,
        transaction_hash: artifact_hash("parent-tx", chain_id, block_number, log_index),
        transaction_index: 0,
        address: factory_address,
        topics,
        data,
        removed: false,
    }
}
