//! Database row types and their decoding into domain types.
//!
//! Rows mirror the persisted encodings (hex TEXT, NUMERIC via
//! `BigDecimal`); `TryFrom` conversions surface corrupt rows as
//! [`InfraError::Internal`] rather than panicking.

use alloy::rpc::types::AccessList;
use bigdecimal::BigDecimal;
use sqlx::FromRow;

use crate::error::InfraError;
use crate::types::entities::{
    Block, ContractReadResult, Log, Transaction, TransactionEnvelope,
};
use crate::types::interval::BlockRange;
use crate::types::primitives::{
    numeric_to_u64, numeric_to_u256, parse_address, parse_b64, parse_b256, parse_bytes,
};

fn corrupt<T, E: std::fmt::Display>(
    result: Result<T, E>,
    what: &'static str,
) -> Result<T, InfraError> {
    result.map_err(|err| InfraError::Internal(format!("corrupt {what} in DB: {err}")))
}

// ═══════════════════════════════════════════════════════════════════════════════
// BLOCKS
// ═══════════════════════════════════════════════════════════════════════════════

/// Database row for blocks.
#[derive(Debug, FromRow)]
pub(crate) struct BlockRow {
    pub chain_id: i64,
    pub hash: String,
    pub number: BigDecimal,
    pub timestamp: BigDecimal,
    pub parent_hash: String,
    pub base_fee_per_gas: Option<BigDecimal>,
    pub difficulty: BigDecimal,
    pub extra_data: String,
    pub gas_limit: BigDecimal,
    pub gas_used: BigDecimal,
    pub logs_bloom: String,
    pub miner: String,
    pub mix_hash: String,
    pub nonce: String,
    pub receipts_root: String,
    pub sha3_uncles: String,
    pub size: BigDecimal,
    pub state_root: String,
    pub total_difficulty: Option<BigDecimal>,
    pub transactions_root: String,
}

impl TryFrom<BlockRow> for Block {
    type Error = InfraError;

    fn try_from(row: BlockRow) -> Result<Self, Self::Error> {
        Ok(Block {
            chain_id: row.chain_id as u64,
            hash: corrupt(parse_b256(&row.hash), "block hash")?,
            number: numeric_to_u256(&row.number)?,
            timestamp: numeric_to_u64(&row.timestamp)?,
            parent_hash: corrupt(parse_b256(&row.parent_hash), "parent hash")?,
            base_fee_per_gas: row
                .base_fee_per_gas
                .as_ref()
                .map(numeric_to_u256)
                .transpose()?,
            difficulty: numeric_to_u256(&row.difficulty)?,
            extra_data: corrupt(parse_bytes(&row.extra_data), "extra data")?,
            gas_limit: numeric_to_u256(&row.gas_limit)?,
            gas_used: numeric_to_u256(&row.gas_used)?,
            logs_bloom: corrupt(parse_bytes(&row.logs_bloom), "logs bloom")?,
            miner: corrupt(parse_address(&row.miner), "miner")?,
            mix_hash: corrupt(parse_b256(&row.mix_hash), "mix hash")?,
            nonce: corrupt(parse_b64(&row.nonce), "block nonce")?,
            receipts_root: corrupt(parse_b256(&row.receipts_root), "receipts root")?,
            sha3_uncles: corrupt(parse_b256(&row.sha3_uncles), "sha3 uncles")?,
            size: numeric_to_u256(&row.size)?,
            state_root: corrupt(parse_b256(&row.state_root), "state root")?,
            total_difficulty: row
                .total_difficulty
                .as_ref()
                .map(numeric_to_u256)
                .transpose()?,
            transactions_root: corrupt(parse_b256(&row.transactions_root), "transactions root")?,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TRANSACTIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Database row for transactions.
#[derive(Debug, FromRow)]
pub(crate) struct TransactionRow {
    pub chain_id: i64,
    pub hash: String,
    pub block_hash: String,
    pub block_number: BigDecimal,
    pub transaction_index: i64,
    pub from_address: String,
    pub to_address: Option<String>,
    pub input: String,
    pub value: BigDecimal,
    pub nonce: i64,
    pub gas: BigDecimal,
    pub tx_type: i16,
    pub gas_price: Option<BigDecimal>,
    pub max_fee_per_gas: Option<BigDecimal>,
    pub max_priority_fee_per_gas: Option<BigDecimal>,
    pub max_fee_per_blob_gas: Option<BigDecimal>,
    pub access_list: Option<String>,
    pub blob_versioned_hashes: Option<String>,
    pub v: BigDecimal,
    pub r: String,
    pub s: String,
}

fn required_numeric(
    value: Option<&BigDecimal>,
    what: &'static str,
) -> Result<alloy::primitives::U256, InfraError> {
    let value =
        value.ok_or_else(|| InfraError::Internal(format!("missing {what} in transaction row")))?;
    numeric_to_u256(value)
}

fn decode_access_list(raw: Option<&str>) -> Result<AccessList, InfraError> {
    raw.map_or_else(
        || Ok(AccessList::default()),
        |json| corrupt(serde_json::from_str(json), "access list"),
    )
}

impl TransactionRow {
    fn decode_envelope(&self) -> Result<TransactionEnvelope, InfraError> {
        match self.tx_type {
            0 => Ok(TransactionEnvelope::Legacy {
                gas_price: required_numeric(self.gas_price.as_ref(), "gas price")?,
            }),
            1 => Ok(TransactionEnvelope::Eip2930 {
                gas_price: required_numeric(self.gas_price.as_ref(), "gas price")?,
                access_list: decode_access_list(self.access_list.as_deref())?,
            }),
            2 => Ok(TransactionEnvelope::Eip1559 {
                max_fee_per_gas: required_numeric(self.max_fee_per_gas.as_ref(), "max fee")?,
                max_priority_fee_per_gas: required_numeric(
                    self.max_priority_fee_per_gas.as_ref(),
                    "max priority fee",
                )?,
                access_list: decode_access_list(self.access_list.as_deref())?,
            }),
            3 => {
                let hashes: Vec<String> = self.blob_versioned_hashes.as_deref().map_or_else(
                    || Ok(Vec::new()),
                    |json| corrupt(serde_json::from_str(json), "blob versioned hashes"),
                )?;
                Ok(TransactionEnvelope::Eip4844 {
                    max_fee_per_gas: required_numeric(self.max_fee_per_gas.as_ref(), "max fee")?,
                    max_priority_fee_per_gas: required_numeric(
                        self.max_priority_fee_per_gas.as_ref(),
                        "max priority fee",
                    )?,
                    max_fee_per_blob_gas: required_numeric(
                        self.max_fee_per_blob_gas.as_ref(),
                        "max blob fee",
                    )?,
                    access_list: decode_access_list(self.access_list.as_deref())?,
                    blob_versioned_hashes: hashes
                        .iter()
                        .map(|hash| corrupt(parse_b256(hash), "blob versioned hash"))
                        .collect::<Result<_, _>>()?,
                })
            }
            other => Err(InfraError::Internal(format!(
                "unknown transaction type in DB: {other}"
            ))),
        }
    }
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = InfraError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let envelope = row.decode_envelope()?;
        Ok(Transaction {
            chain_id: row.chain_id as u64,
            hash: corrupt(parse_b256(&row.hash), "transaction hash")?,
            block_hash: corrupt(parse_b256(&row.block_hash), "block hash")?,
            block_number: numeric_to_u256(&row.block_number)?,
            transaction_index: row.transaction_index as u64,
            from: corrupt(parse_address(&row.from_address), "from address")?,
            to: row
                .to_address
                .as_deref()
                .map(|to| corrupt(parse_address(to), "to address"))
                .transpose()?,
            input: corrupt(parse_bytes(&row.input), "input")?,
            value: numeric_to_u256(&row.value)?,
            nonce: row.nonce as u64,
            gas: numeric_to_u256(&row.gas)?,
            v: numeric_to_u256(&row.v)?,
            r: corrupt(parse_b256(&row.r), "signature r").map(Into::into)?,
            s: corrupt(parse_b256(&row.s), "signature s").map(Into::into)?,
            envelope,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LOGS
// ═══════════════════════════════════════════════════════════════════════════════

/// Database row for logs.
#[derive(Debug, FromRow)]
pub(crate) struct LogRow {
    pub chain_id: i64,
    pub block_hash: String,
    pub block_number: BigDecimal,
    pub log_index: i64,
    pub transaction_hash: String,
    pub transaction_index: i64,
    pub address: String,
    pub topic0: Option<String>,
    pub topic1: Option<String>,
    pub topic2: Option<String>,
    pub topic3: Option<String>,
    pub data: String,
    pub removed: bool,
}

pub(crate) fn decode_topics(
    slots: [Option<&str>; 4],
) -> Result<Vec<alloy::primitives::B256>, InfraError> {
    let mut topics = Vec::new();
    for slot in slots {
        // Topic positions are contiguous; the first NULL ends the list.
        let Some(slot) = slot else { break };
        topics.push(corrupt(parse_b256(slot), "topic")?);
    }
    Ok(topics)
}

impl TryFrom<LogRow> for Log {
    type Error = InfraError;

    fn try_from(row: LogRow) -> Result<Self, Self::Error> {
        Ok(Log {
            chain_id: row.chain_id as u64,
            block_hash: corrupt(parse_b256(&row.block_hash), "block hash")?,
            block_number: numeric_to_u256(&row.block_number)?,
            log_index: row.log_index as u64,
            transaction_hash: corrupt(parse_b256(&row.transaction_hash), "transaction hash")?,
            transaction_index: row.transaction_index as u64,
            address: corrupt(parse_address(&row.address), "log address")?,
            topics: decode_topics([
                row.topic0.as_deref(),
                row.topic1.as_deref(),
                row.topic2.as_deref(),
                row.topic3.as_deref(),
            ])?,
            data: corrupt(parse_bytes(&row.data), "log data")?,
            removed: row.removed,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// INTERVALS & FILTERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Database row for coverage intervals (both ledger tables).
#[derive(Debug, FromRow)]
pub(crate) struct IntervalRow {
    pub start_block: BigDecimal,
    pub end_block: BigDecimal,
}

impl TryFrom<IntervalRow> for BlockRange {
    type Error = InfraError;

    fn try_from(row: IntervalRow) -> Result<Self, Self::Error> {
        let start = numeric_to_u256(&row.start_block)?;
        let end = numeric_to_u256(&row.end_block)?;
        corrupt(BlockRange::new(start, end), "interval")
    }
}

/// Database row for stored log filters (canonical slot columns).
#[derive(Debug, FromRow)]
pub(crate) struct LogFilterRow {
    pub id: String,
    pub address: Option<String>,
    pub topic0: Option<String>,
    pub topic1: Option<String>,
    pub topic2: Option<String>,
    pub topic3: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONTRACT READS
// ═══════════════════════════════════════════════════════════════════════════════

/// Database row for contract read results.
#[derive(Debug, FromRow)]
pub(crate) struct ContractReadRow {
    pub chain_id: i64,
    pub address: String,
    pub block_number: BigDecimal,
    pub call_data: String,
    pub result: String,
}

impl TryFrom<ContractReadRow> for ContractReadResult {
    type Error = InfraError;

    fn try_from(row: ContractReadRow) -> Result<Self, Self::Error> {
        Ok(ContractReadResult {
            chain_id: row.chain_id as u64,
            address: corrupt(parse_address(&row.address), "contract address")?,
            block_number: numeric_to_u256(&row.block_number)?,
            data: corrupt(parse_bytes(&row.call_data), "call data")?,
            result: corrupt(parse_bytes(&row.result), "read result")?,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
