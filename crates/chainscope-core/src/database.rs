//! The storage contract: five capability traits composed into one façade.
//!
//! Every backend (in-memory, document store, ...) implements these against
//! its own transaction model. The portable guarantees:
//!
//! - batch calls (`write_blocks`, `write_transactions`, `index_blocks`) are
//!   atomic — every element lands or none;
//! - blocks and transactions are append-only (idempotent rewrites allowed);
//! - `index_blocks` advances the watermark of **every** address it is given,
//!   touched or not, so the watermark keeps up on quiet chains;
//! - deleting an address cascades through its indices, snapshots and
//!   watermark but never touches shared raw blocks/transactions.

use std::collections::HashMap;

use alloy_primitives::{Address, B256};
use async_trait::async_trait;

use crate::error::StoreError;
use crate::options::{PageOptions, QueryOptions};
use crate::types::{
    AccountState, Block, BlockWithTransactions, Event, RangeResult, Template, Transaction,
};

/// Registered contract addresses and their filter watermarks.
#[async_trait]
pub trait AddressStore: Send + Sync {
    /// Register addresses with a zero watermark. Registering an address that
    /// already exists is a no-op and must not reset its watermark.
    async fn add_addresses(&self, addresses: Vec<Address>) -> Result<(), StoreError>;

    /// Register one address so that filtering resumes at block `from`
    /// (the stored watermark becomes `from - 1`).
    async fn add_address_from(&self, address: Address, from: u64) -> Result<(), StoreError>;

    /// Unregister an address, cascading through its index entries, storage
    /// snapshots and watermark. Raw blocks/transactions are untouched.
    async fn delete_address(&self, address: Address) -> Result<(), StoreError>;

    async fn get_addresses(&self) -> Result<Vec<Address>, StoreError>;

    /// The template name assigned to a registered address; empty if none.
    async fn get_contract_template(&self, address: Address) -> Result<String, StoreError>;
}

/// Named ABI + storage-layout templates.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// Upsert a template. The ABI must be syntactically valid JSON; whether
    /// it parses into a usable decoder is checked lazily at decode time.
    async fn add_template(
        &self,
        name: &str,
        abi: &str,
        storage_layout: &str,
    ) -> Result<(), StoreError>;

    /// Assign a template to a registered address. Fails with a conflict for
    /// an unregistered address and not-found for a missing template.
    async fn assign_template(&self, address: Address, name: &str) -> Result<(), StoreError>;

    async fn get_templates(&self) -> Result<Vec<String>, StoreError>;

    async fn get_template_details(&self, name: &str) -> Result<Template, StoreError>;

    /// The ABI of the template assigned to `address`; empty if none.
    async fn get_contract_abi(&self, address: Address) -> Result<String, StoreError>;

    /// The storage layout of the template assigned to `address`; empty if none.
    async fn get_storage_layout(&self, address: Address) -> Result<String, StoreError>;

    /// Deprecated: synthesizes a template named after the address's
    /// canonical hex form. Prefer `add_template` + `assign_template`.
    async fn add_contract_abi(&self, address: Address, abi: &str) -> Result<(), StoreError>;

    /// Deprecated counterpart of [`TemplateStore::add_contract_abi`] for
    /// storage layouts.
    async fn add_storage_layout(&self, address: Address, layout: &str) -> Result<(), StoreError>;
}

/// Append-only block storage, independent of the registry: it records
/// everything the monitor fetches.
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Batch-atomic write. Rewriting an existing number is idempotent.
    async fn write_blocks(&self, blocks: Vec<Block>) -> Result<(), StoreError>;

    /// Deprecated: prefer [`BlockStore::write_blocks`].
    async fn write_block(&self, block: Block) -> Result<(), StoreError> {
        self.write_blocks(vec![block]).await
    }

    async fn read_block(&self, number: u64) -> Result<Block, StoreError>;

    /// The highest block number ever written. Gaps below it are allowed.
    async fn get_last_persisted_block_number(&self) -> Result<u64, StoreError>;
}

/// Append-only transaction storage.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Batch-atomic write. Rewriting an existing hash is idempotent.
    async fn write_transactions(&self, transactions: Vec<Transaction>) -> Result<(), StoreError>;

    /// Deprecated: prefer [`TransactionStore::write_transactions`].
    async fn write_transaction(&self, transaction: Transaction) -> Result<(), StoreError> {
        self.write_transactions(vec![transaction]).await
    }

    async fn read_transaction(&self, hash: B256) -> Result<Transaction, StoreError>;
}

/// Per-address inverted indices, storage snapshots and filter watermarks.
///
/// The three sequences are ordered `(block number DESC, tx index DESC)`,
/// events additionally by log index.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Index a batch of blocks for the given addresses in one atomic step.
    /// The intersection happens here: untouched addresses gain no entries
    /// but still have their watermark advanced to the highest block number
    /// in the batch.
    async fn index_blocks(
        &self,
        addresses: &[Address],
        blocks: &[BlockWithTransactions],
    ) -> Result<(), StoreError>;

    /// Record per-address storage snapshots taken at `block_number`.
    async fn index_storage(
        &self,
        storage: &HashMap<Address, AccountState>,
        block_number: u64,
    ) -> Result<(), StoreError>;

    /// Record which transaction created which contracts.
    async fn set_contract_creation_transaction(
        &self,
        creations: HashMap<B256, Vec<Address>>,
    ) -> Result<(), StoreError>;

    /// The transaction that created a registered contract.
    async fn get_contract_creation_transaction(
        &self,
        address: Address,
    ) -> Result<B256, StoreError>;

    async fn get_all_transactions_to_address(
        &self,
        address: Address,
        options: &QueryOptions,
    ) -> Result<Vec<B256>, StoreError>;

    async fn get_transactions_to_address_total(
        &self,
        address: Address,
        options: &QueryOptions,
    ) -> Result<u64, StoreError>;

    async fn get_all_transactions_internal_to_address(
        &self,
        address: Address,
        options: &QueryOptions,
    ) -> Result<Vec<B256>, StoreError>;

    async fn get_transactions_internal_to_address_total(
        &self,
        address: Address,
        options: &QueryOptions,
    ) -> Result<u64, StoreError>;

    async fn get_all_events_from_address(
        &self,
        address: Address,
        options: &QueryOptions,
    ) -> Result<Vec<Event>, StoreError>;

    async fn get_events_from_address_total(
        &self,
        address: Address,
        options: &QueryOptions,
    ) -> Result<u64, StoreError>;

    /// The snapshot recorded at exactly `block_number`, or an empty snapshot
    /// with a zero root if none was recorded there.
    async fn get_storage(
        &self,
        address: Address,
        block_number: u64,
    ) -> Result<AccountState, StoreError>;

    /// Compressed view of snapshot density in a block window: contiguous
    /// ranges of at most 1,000 recorded snapshots each, tiling the window
    /// in descending block order.
    async fn get_storage_ranges(
        &self,
        address: Address,
        options: &PageOptions,
    ) -> Result<Vec<RangeResult>, StoreError>;

    /// The highest block whose effects on `address` have been committed to
    /// the indices. Zero for unknown addresses.
    async fn get_last_filtered(&self, address: Address) -> Result<u64, StoreError>;

    /// Reorg support: drop every index entry, creation record, storage
    /// snapshot, block and transaction above `block_number`, and clamp each
    /// registered address's watermark to it.
    async fn rollback_to(&self, block_number: u64) -> Result<(), StoreError>;
}

/// The composed storage façade consumed by the monitor, filter and read API.
pub trait Database:
    AddressStore + TemplateStore + BlockStore + TransactionStore + IndexStore
{
}

impl<T> Database for T where
    T: AddressStore + TemplateStore + BlockStore + TransactionStore + IndexStore
{
}
