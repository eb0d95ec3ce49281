//! Chain artifacts and replay surface types.
//!
//! Artifacts (blocks, transactions, logs) are stored once under their
//! chain-native identifiers and exposed through event source lenses.
//! They are immutable once inserted; only a reorg deletes them.

use alloy::primitives::{Address, B64, B256, Bytes, U256};
use alloy::rpc::types::AccessList;
use serde::{Deserialize, Serialize};

use crate::types::primitives::log_event_id;

// ═══════════════════════════════════════════════════════════════════════════════
// BLOCK
// ═══════════════════════════════════════════════════════════════════════════════

/// A block header, identified by `(chain_id, hash)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Chain the block belongs to.
    pub chain_id: u64,
    /// Block hash.
    pub hash: B256,
    /// Block number.
    pub number: U256,
    /// Block timestamp (seconds).
    pub timestamp: u64,
    /// Parent block hash.
    pub parent_hash: B256,
    /// EIP-1559 base fee, absent pre-London.
    pub base_fee_per_gas: Option<U256>,
    /// Proof-of-work difficulty (zero post-merge).
    pub difficulty: U256,
    /// Arbitrary extra data.
    pub extra_data: Bytes,
    /// Gas limit.
    pub gas_limit: U256,
    /// Gas used.
    pub gas_used: U256,
    /// Bloom filter over the block's logs.
    pub logs_bloom: Bytes,
    /// Beneficiary address.
    pub miner: Address,
    /// Mix hash.
    pub mix_hash: B256,
    /// Proof-of-work nonce.
    pub nonce: B64,
    /// Receipts trie root.
    pub receipts_root: B256,
    /// Uncles hash.
    pub sha3_uncles: B256,
    /// Block size in bytes.
    pub size: U256,
    /// State trie root.
    pub state_root: B256,
    /// Cumulative difficulty, absent on some providers.
    pub total_difficulty: Option<U256>,
    /// Transactions trie root.
    pub transactions_root: B256,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TRANSACTION
// ═══════════════════════════════════════════════════════════════════════════════

/// A transaction, identified by `(chain_id, hash)`, referencing its
/// containing block.
///
/// Shared fields live here; type-specific fields live on the
/// [`TransactionEnvelope`] arm keyed by the wire `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Chain the transaction belongs to.
    pub chain_id: u64,
    /// Transaction hash.
    pub hash: B256,
    /// Hash of the containing block.
    pub block_hash: B256,
    /// Number of the containing block.
    pub block_number: U256,
    /// Position within the block.
    pub transaction_index: u64,
    /// Sender.
    pub from: Address,
    /// Recipient; absent for contract creation.
    pub to: Option<Address>,
    /// Call data.
    pub input: Bytes,
    /// Transferred value in wei.
    pub value: U256,
    /// Sender nonce.
    pub nonce: u64,
    /// Gas limit.
    pub gas: U256,
    /// Signature v.
    pub v: U256,
    /// Signature r.
    pub r: U256,
    /// Signature s.
    pub s: U256,
    /// Type-specific fields.
    pub envelope: TransactionEnvelope,
}

/// Type-specific transaction fields, tagged on the wire `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionEnvelope {
    /// Pre-EIP-2718 transaction (type 0).
    Legacy {
        /// Gas price in wei.
        gas_price: U256,
    },
    /// EIP-2930 transaction (type 1).
    Eip2930 {
        /// Gas price in wei.
        gas_price: U256,
        /// Declared state access list.
        access_list: AccessList,
    },
    /// EIP-1559 transaction (type 2).
    Eip1559 {
        /// Fee cap.
        max_fee_per_gas: U256,
        /// Priority fee cap.
        max_priority_fee_per_gas: U256,
        /// Declared state access list.
        access_list: AccessList,
    },
    /// EIP-4844 blob transaction (type 3).
    Eip4844 {
        /// Fee cap.
        max_fee_per_gas: U256,
        /// Priority fee cap.
        max_priority_fee_per_gas: U256,
        /// Blob fee cap.
        max_fee_per_blob_gas: U256,
        /// Declared state access list.
        access_list: AccessList,
        /// Versioned hashes of the carried blobs.
        blob_versioned_hashes: Vec<B256>,
    },
}

impl TransactionEnvelope {
    /// The wire `type` value of this variant.
    #[must_use]
    pub const fn type_id(&self) -> u8 {
        match self {
            Self::Legacy { .. } => 0,
            Self::Eip2930 { .. } => 1,
            Self::Eip1559 { .. } => 2,
            Self::Eip4844 { .. } => 3,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LOG
// ═══════════════════════════════════════════════════════════════════════════════

/// A log, identified by `(chain_id, block_hash, log_index)`, referencing
/// its containing transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    /// Chain the log belongs to.
    pub chain_id: u64,
    /// Hash of the containing block.
    pub block_hash: B256,
    /// Number of the containing block.
    pub block_number: U256,
    /// Position within the block.
    pub log_index: u64,
    /// Hash of the emitting transaction.
    pub transaction_hash: B256,
    /// Position of the emitting transaction within the block.
    pub transaction_index: u64,
    /// Emitting contract.
    pub address: Address,
    /// Ordered indexed topics (0 to 4 entries).
    pub topics: Vec<B256>,
    /// Unindexed payload.
    pub data: Bytes,
    /// Whether the log was removed by a reorg on the provider side.
    pub removed: bool,
}

impl Log {
    /// The stable event identifier handed to downstream consumers:
    /// `{blockHash}-{hex(logIndex)}`.
    #[must_use]
    pub fn event_id(&self) -> String {
        log_event_id(&self.block_hash, self.log_index)
    }

    /// The topic at a position, if present.
    #[must_use]
    pub fn topic(&self, position: usize) -> Option<&B256> {
        self.topics.get(position)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONTRACT READS
// ═══════════════════════════════════════════════════════════════════════════════

/// Cache key of a contract read: the block number is pinned by the
/// caller, so identical calls at different blocks are distinct entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContractReadKey {
    /// Chain the read targets.
    pub chain_id: u64,
    /// Contract address.
    pub address: Address,
    /// Block the read is pinned to.
    pub block_number: U256,
    /// Raw call data.
    pub data: Bytes,
}

/// A cached contract read result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractReadResult {
    /// Chain the read targets.
    pub chain_id: u64,
    /// Contract address.
    pub address: Address,
    /// Block the read is pinned to.
    pub block_number: U256,
    /// Raw call data.
    pub data: Bytes,
    /// Raw return bytes.
    pub result: Bytes,
}

impl ContractReadResult {
    /// The cache key of this result.
    #[must_use]
    pub fn key(&self) -> ContractReadKey {
        ContractReadKey {
            chain_id: self.chain_id,
            address: self.address,
            block_number: self.block_number,
            data: self.data.clone(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// REPLAY SURFACE
// ═══════════════════════════════════════════════════════════════════════════════

/// One enriched event emitted by the replay iterator: the log plus its
/// transaction and containing block, tagged with the matching source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    /// Name of the event source the log matched.
    pub event_source_name: String,
    /// Chain the event belongs to.
    pub chain_id: u64,
    /// The log itself ([`Log::event_id`] is the downstream identifier).
    pub log: Log,
    /// The containing block.
    pub block: Block,
    /// The emitting transaction.
    pub transaction: Transaction,
}

/// Position of the last emitted event; the next query resumes strictly
/// past it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCursor {
    /// Block timestamp of the last event.
    pub timestamp: u64,
    /// Chain id of the last event.
    pub chain_id: u64,
    /// Block number of the last event.
    pub block_number: U256,
    /// Log index of the last event.
    pub log_index: u64,
}

/// One page of the replay iterator.
#[derive(Debug, Clone)]
pub struct LogEventPage {
    /// Matched events in replay order.
    pub events: Vec<LogEvent>,
    /// Cursor past the last row this page consumed.
    pub cursor: EventCursor,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
