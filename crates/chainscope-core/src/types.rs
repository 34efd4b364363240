//! Chain data model shared across the pipeline.
//!
//! Addresses, hashes and byte payloads are `alloy-primitives` types: hex
//! parsing is case-insensitive and rendering is canonical lowercase, which is
//! exactly the normalization contract at every boundary (RPC in, node client
//! out, persistence).

use std::collections::BTreeMap;

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

/// A block as persisted by the raw chain store. Immutable once stored,
/// keyed by `number`; `hash` must be unique across the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub number: u64,
    pub hash: B256,
    pub parent_hash: B256,
    pub timestamp: u64,
    pub tx_root: B256,
    pub receipt_root: B256,
    pub state_root: B256,
    pub gas_limit: u64,
    pub gas_used: u64,
    /// Hashes of the block's transactions, in execution order. Every entry
    /// must resolve in the transaction store.
    pub transactions: Vec<B256>,
}

impl Block {
    /// Returns `true` if `parent` is the direct parent of `self`.
    pub fn extends(&self, parent: &Block) -> bool {
        self.number == parent.number + 1 && self.parent_hash == parent.hash
    }
}

/// A transaction with its receipt-derived fields, emitted events and traced
/// internal calls folded in. Immutable, keyed by `hash`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub hash: B256,
    pub block_number: u64,
    /// Position within the block.
    pub index: u64,
    pub from: Address,
    /// `None` for contract creation.
    pub to: Option<Address>,
    pub value: U256,
    pub gas: u64,
    pub gas_used: u64,
    pub data: Bytes,
    /// Private payload for ledgers that carry one; empty otherwise.
    pub private_data: Bytes,
    /// `Some` only when this transaction created a contract.
    pub created_contract: Option<Address>,
    pub events: Vec<Event>,
    pub internal_calls: Vec<InternalCall>,
    pub status: bool,
}

impl Transaction {
    /// Returns `true` if this transaction deployed a contract.
    pub fn is_contract_creation(&self) -> bool {
        self.created_contract.is_some()
    }

    /// The calldata to decode: the private payload wins when present.
    pub fn payload(&self) -> &Bytes {
        if self.private_data.is_empty() {
            &self.data
        } else {
            &self.private_data
        }
    }
}

/// A log emitted during transaction execution. Owned by the enclosing
/// transaction; `address` need not equal the transaction's `to`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: u64,
    pub tx_hash: B256,
    pub log_index: u64,
}

/// A sub-call made during transaction execution, as reported by the node's
/// call tracer. `call_type` is an open set (CALL, STATICCALL, DELEGATECALL,
/// CREATE, CREATE2, ...) — tracer vocabularies differ across clients.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalCall {
    #[serde(rename = "type")]
    pub call_type: String,
    pub from: Address,
    pub to: Option<Address>,
    pub gas: u64,
    pub gas_used: u64,
    pub value: U256,
    pub input: Bytes,
    pub output: Bytes,
}

/// A snapshot of one contract's storage at one block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountState {
    /// Storage root; the zero hash when no snapshot exists.
    pub root: B256,
    pub storage: BTreeMap<B256, String>,
}

/// A named ABI + storage-layout pair assignable to registered addresses.
/// Names are globally unique; insertion upserts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub name: String,
    pub abi: String,
    pub storage_layout: String,
}

/// Compressed descriptor of storage activity in a block window: the
/// contract has `result_count` recorded snapshots in `[start, end]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeResult {
    pub start: u64,
    pub end: u64,
    pub result_count: u64,
}

/// A block with its transactions fully resolved — the shape the filter hands
/// to [`crate::IndexStore::index_blocks`]. The index store extracts
/// `(address, block number, tx index, log index)` tuples from it; it never
/// duplicates transaction storage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockWithTransactions {
    pub number: u64,
    pub hash: B256,
    pub parent_hash: B256,
    pub timestamp: u64,
    pub transactions: Vec<Transaction>,
}

impl BlockWithTransactions {
    /// Pair a stored block with its resolved transactions.
    pub fn new(block: &Block, transactions: Vec<Transaction>) -> Self {
        Self {
            number: block.number,
            hash: block.hash,
            parent_hash: block.parent_hash,
            timestamp: block.timestamp,
            transactions,
        }
    }
}
