//! In-memory database backend.
//!
//! All capabilities share one coarse mutex, which makes every batch call a
//! single critical section — batch atomicity comes for free. Data is lost
//! when the process exits; this backend exists for development, tests and
//! short-lived indexers.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

use alloy_primitives::{Address, B256};
use async_trait::async_trait;

use chainscope_core::database::{
    AddressStore, BlockStore, IndexStore, TemplateStore, TransactionStore,
};
use chainscope_core::error::StoreError;
use chainscope_core::options::{PageOptions, QueryOptions};
use chainscope_core::types::{
    AccountState, Block, BlockWithTransactions, Event, RangeResult, Template, Transaction,
};

use crate::ranges;

/// One registered address: its assigned template and filter watermark.
#[derive(Debug, Clone, Default)]
struct AddressRecord {
    template: Option<String>,
    last_filtered: u64,
}

/// Index entry for the txs-to / internal-txs-to sequences. The index owns
/// location tuples, never transaction payloads; ordering ascending by
/// `(block_number, tx_index)` so queries iterate in reverse for the
/// descending contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct TxEntry {
    block_number: u64,
    tx_index: u64,
    timestamp: u64,
    hash: B256,
}

/// Index entry for the events-from sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct EventEntry {
    block_number: u64,
    tx_index: u64,
    log_index: u64,
    timestamp: u64,
    tx_hash: B256,
}

#[derive(Default)]
struct State {
    addresses: HashMap<Address, AddressRecord>,
    templates: HashMap<String, Template>,
    blocks: BTreeMap<u64, Block>,
    last_persisted: u64,
    transactions: HashMap<B256, Transaction>,
    txs_to: HashMap<Address, BTreeSet<TxEntry>>,
    internal_to: HashMap<Address, BTreeSet<TxEntry>>,
    events_from: HashMap<Address, BTreeSet<EventEntry>>,
    storage: HashMap<Address, BTreeMap<u64, AccountState>>,
    creations: HashMap<Address, B256>,
}

/// In-memory implementation of the full storage façade.
#[derive(Default)]
pub struct MemoryDatabase {
    state: Mutex<State>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Canonical lowercase hex form of an address, used to name the templates
/// synthesized by the deprecated ABI/layout operations.
fn address_template_name(address: Address) -> String {
    format!("{address:#x}")
}

fn validate_abi_json(abi: &str) -> Result<(), StoreError> {
    if abi.is_empty() {
        return Ok(());
    }
    serde_json::from_str::<serde_json::Value>(abi)
        .map(|_| ())
        .map_err(|e| StoreError::validation(e.to_string()))
}

impl State {
    fn registered(&self, address: Address) -> Result<&AddressRecord, StoreError> {
        self.addresses
            .get(&address)
            .ok_or_else(|| StoreError::not_found("address is not registered"))
    }

    /// Resolve the template assigned to an address, if any.
    fn assigned_template(&self, address: Address) -> Result<Option<&Template>, StoreError> {
        let record = self.registered(address)?;
        match &record.template {
            None => Ok(None),
            Some(name) => Ok(self.templates.get(name)),
        }
    }

    fn index_block_for(&mut self, address: Address, block: &BlockWithTransactions) {
        for tx in &block.transactions {
            let entry = TxEntry {
                block_number: block.number,
                tx_index: tx.index,
                timestamp: block.timestamp,
                hash: tx.hash,
            };
            let direct =
                tx.to == Some(address) || tx.created_contract == Some(address);
            if direct {
                self.txs_to.entry(address).or_default().insert(entry);
            } else if tx
                .internal_calls
                .iter()
                .any(|call| call.to == Some(address))
            {
                self.internal_to.entry(address).or_default().insert(entry);
            }

            for event in &tx.events {
                if event.address == address {
                    self.events_from.entry(address).or_default().insert(EventEntry {
                        block_number: block.number,
                        tx_index: tx.index,
                        log_index: event.log_index,
                        timestamp: block.timestamp,
                        tx_hash: tx.hash,
                    });
                }
            }
        }
    }

    /// Select the entries matching `options`, newest first, one page worth.
    fn page_tx_entries(
        &self,
        set: Option<&BTreeSet<TxEntry>>,
        options: &QueryOptions,
    ) -> Vec<B256> {
        let (begin, end) = options.block_window(self.last_persisted);
        let (ts_begin, ts_end) = options.timestamp_window();
        let (offset, limit) = options.page_bounds();
        set.into_iter()
            .flatten()
            .rev()
            .filter(|e| (begin..=end).contains(&e.block_number))
            .filter(|e| (ts_begin..=ts_end).contains(&e.timestamp))
            .skip(offset)
            .take(limit)
            .map(|e| e.hash)
            .collect()
    }

    fn count_tx_entries(&self, set: Option<&BTreeSet<TxEntry>>, options: &QueryOptions) -> u64 {
        let (begin, end) = options.block_window(self.last_persisted);
        let (ts_begin, ts_end) = options.timestamp_window();
        set.into_iter()
            .flatten()
            .filter(|e| (begin..=end).contains(&e.block_number))
            .filter(|e| (ts_begin..=ts_end).contains(&e.timestamp))
            .count() as u64
    }
}

#[async_trait]
impl AddressStore for MemoryDatabase {
    async fn add_addresses(&self, addresses: Vec<Address>) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        for address in addresses {
            state.addresses.entry(address).or_default();
        }
        Ok(())
    }

    async fn add_address_from(&self, address: Address, from: u64) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.addresses.entry(address).or_insert(AddressRecord {
            template: None,
            last_filtered: from.saturating_sub(1),
        });
        Ok(())
    }

    async fn delete_address(&self, address: Address) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.addresses.remove(&address);
        state.txs_to.remove(&address);
        state.internal_to.remove(&address);
        state.events_from.remove(&address);
        state.storage.remove(&address);
        state.creations.remove(&address);
        Ok(())
    }

    async fn get_addresses(&self) -> Result<Vec<Address>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state.addresses.keys().copied().collect())
    }

    async fn get_contract_template(&self, address: Address) -> Result<String, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state.registered(address)?.template.clone().unwrap_or_default())
    }
}

#[async_trait]
impl TemplateStore for MemoryDatabase {
    async fn add_template(
        &self,
        name: &str,
        abi: &str,
        storage_layout: &str,
    ) -> Result<(), StoreError> {
        validate_abi_json(abi)?;
        let mut state = self.state.lock().unwrap();
        state.templates.insert(
            name.to_string(),
            Template {
                name: name.to_string(),
                abi: abi.to_string(),
                storage_layout: storage_layout.to_string(),
            },
        );
        Ok(())
    }

    async fn assign_template(&self, address: Address, name: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        if !state.templates.contains_key(name) {
            return Err(StoreError::not_found("template not found"));
        }
        let record = state
            .addresses
            .get_mut(&address)
            .ok_or_else(|| StoreError::conflict("address is not registered"))?;
        record.template = Some(name.to_string());
        Ok(())
    }

    async fn get_templates(&self) -> Result<Vec<String>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state.templates.keys().cloned().collect())
    }

    async fn get_template_details(&self, name: &str) -> Result<Template, StoreError> {
        let state = self.state.lock().unwrap();
        state
            .templates
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::not_found("template not found"))
    }

    async fn get_contract_abi(&self, address: Address) -> Result<String, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .assigned_template(address)?
            .map(|t| t.abi.clone())
            .unwrap_or_default())
    }

    async fn get_storage_layout(&self, address: Address) -> Result<String, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .assigned_template(address)?
            .map(|t| t.storage_layout.clone())
            .unwrap_or_default())
    }

    async fn add_contract_abi(&self, address: Address, abi: &str) -> Result<(), StoreError> {
        validate_abi_json(abi)?;
        let mut state = self.state.lock().unwrap();
        state.registered(address)?;
        let name = address_template_name(address);
        let storage_layout = state
            .templates
            .get(&name)
            .map(|t| t.storage_layout.clone())
            .unwrap_or_default();
        state.templates.insert(
            name.clone(),
            Template {
                name: name.clone(),
                abi: abi.to_string(),
                storage_layout,
            },
        );
        if let Some(record) = state.addresses.get_mut(&address) {
            record.template = Some(name);
        }
        Ok(())
    }

    async fn add_storage_layout(&self, address: Address, layout: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.registered(address)?;
        let name = address_template_name(address);
        let abi = state
            .templates
            .get(&name)
            .map(|t| t.abi.clone())
            .unwrap_or_default();
        state.templates.insert(
            name.clone(),
            Template {
                name: name.clone(),
                abi,
                storage_layout: layout.to_string(),
            },
        );
        if let Some(record) = state.addresses.get_mut(&address) {
            record.template = Some(name);
        }
        Ok(())
    }
}

#[async_trait]
impl BlockStore for MemoryDatabase {
    async fn write_blocks(&self, blocks: Vec<Block>) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        for block in blocks {
            let number = block.number;
            state.blocks.insert(number, block);
            if number > state.last_persisted {
                state.last_persisted = number;
            }
        }
        Ok(())
    }

    async fn read_block(&self, number: u64) -> Result<Block, StoreError> {
        let state = self.state.lock().unwrap();
        state
            .blocks
            .get(&number)
            .cloned()
            .ok_or_else(|| StoreError::not_found("block not found"))
    }

    async fn get_last_persisted_block_number(&self) -> Result<u64, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state.last_persisted)
    }
}

#[async_trait]
impl TransactionStore for MemoryDatabase {
    async fn write_transactions(&self, transactions: Vec<Transaction>) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        for tx in transactions {
            state.transactions.insert(tx.hash, tx);
        }
        Ok(())
    }

    async fn read_transaction(&self, hash: B256) -> Result<Transaction, StoreError> {
        let state = self.state.lock().unwrap();
        state
            .transactions
            .get(&hash)
            .cloned()
            .ok_or_else(|| StoreError::not_found("transaction not found"))
    }
}

#[async_trait]
impl IndexStore for MemoryDatabase {
    async fn index_blocks(
        &self,
        addresses: &[Address],
        blocks: &[BlockWithTransactions],
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        let mut top = 0u64;
        for block in blocks {
            top = top.max(block.number);
            for &address in addresses {
                if state.addresses.contains_key(&address) {
                    state.index_block_for(address, block);
                }
            }
        }
        // The watermark advances for every address given, touched or not,
        // so it keeps up on blocks that touch nothing registered.
        for address in addresses {
            if let Some(record) = state.addresses.get_mut(address) {
                record.last_filtered = record.last_filtered.max(top);
            }
        }
        Ok(())
    }

    async fn index_storage(
        &self,
        storage: &HashMap<Address, AccountState>,
        block_number: u64,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        for (address, account) in storage {
            state
                .storage
                .entry(*address)
                .or_default()
                .insert(block_number, account.clone());
        }
        Ok(())
    }

    async fn set_contract_creation_transaction(
        &self,
        creations: HashMap<B256, Vec<Address>>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        for (tx_hash, created) in creations {
            for address in created {
                state.creations.insert(address, tx_hash);
            }
        }
        Ok(())
    }

    async fn get_contract_creation_transaction(
        &self,
        address: Address,
    ) -> Result<B256, StoreError> {
        let state = self.state.lock().unwrap();
        state.registered(address)?;
        state
            .creations
            .get(&address)
            .copied()
            .ok_or_else(|| StoreError::not_found("contract creation transaction not found"))
    }

    async fn get_all_transactions_to_address(
        &self,
        address: Address,
        options: &QueryOptions,
    ) -> Result<Vec<B256>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state.page_tx_entries(state.txs_to.get(&address), options))
    }

    async fn get_transactions_to_address_total(
        &self,
        address: Address,
        options: &QueryOptions,
    ) -> Result<u64, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state.count_tx_entries(state.txs_to.get(&address), options))
    }

    async fn get_all_transactions_internal_to_address(
        &self,
        address: Address,
        options: &QueryOptions,
    ) -> Result<Vec<B256>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state.page_tx_entries(state.internal_to.get(&address), options))
    }

    async fn get_transactions_internal_to_address_total(
        &self,
        address: Address,
        options: &QueryOptions,
    ) -> Result<u64, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state.count_tx_entries(state.internal_to.get(&address), options))
    }

    async fn get_all_events_from_address(
        &self,
        address: Address,
        options: &QueryOptions,
    ) -> Result<Vec<Event>, StoreError> {
        let state = self.state.lock().unwrap();
        let (begin, end) = options.block_window(state.last_persisted);
        let (ts_begin, ts_end) = options.timestamp_window();
        let (offset, limit) = options.page_bounds();

        let mut events = Vec::new();
        for entry in state
            .events_from
            .get(&address)
            .into_iter()
            .flatten()
            .rev()
            .filter(|e| (begin..=end).contains(&e.block_number))
            .filter(|e| (ts_begin..=ts_end).contains(&e.timestamp))
            .skip(offset)
            .take(limit)
        {
            // The index owns location tuples; the payload lives with the
            // transaction.
            let tx = state
                .transactions
                .get(&entry.tx_hash)
                .ok_or_else(|| StoreError::not_found("transaction not found"))?;
            let event = tx
                .events
                .iter()
                .find(|e| e.log_index == entry.log_index && e.address == address)
                .ok_or_else(|| StoreError::not_found("event not found"))?;
            events.push(event.clone());
        }
        Ok(events)
    }

    async fn get_events_from_address_total(
        &self,
        address: Address,
        options: &QueryOptions,
    ) -> Result<u64, StoreError> {
        let state = self.state.lock().unwrap();
        let (begin, end) = options.block_window(state.last_persisted);
        let (ts_begin, ts_end) = options.timestamp_window();
        Ok(state
            .events_from
            .get(&address)
            .into_iter()
            .flatten()
            .filter(|e| (begin..=end).contains(&e.block_number))
            .filter(|e| (ts_begin..=ts_end).contains(&e.timestamp))
            .count() as u64)
    }

    async fn get_storage(
        &self,
        address: Address,
        block_number: u64,
    ) -> Result<AccountState, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .storage
            .get(&address)
            .and_then(|history| history.get(&block_number))
            .cloned()
            .unwrap_or_default())
    }

    async fn get_storage_ranges(
        &self,
        address: Address,
        options: &PageOptions,
    ) -> Result<Vec<RangeResult>, StoreError> {
        let state = self.state.lock().unwrap();
        let (begin, end) = options.block_window(state.last_persisted);
        let snapshots = state
            .storage
            .get(&address)
            .map(ranges::snapshot_blocks)
            .unwrap_or_default();
        Ok(ranges::compress_ranges(&snapshots, begin, end))
    }

    async fn get_last_filtered(&self, address: Address) -> Result<u64, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .addresses
            .get(&address)
            .map(|r| r.last_filtered)
            .unwrap_or(0))
    }

    async fn rollback_to(&self, block_number: u64) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.blocks.retain(|number, _| *number <= block_number);
        let highest_remaining = state.blocks.keys().next_back().copied().unwrap_or(0);
        state.last_persisted = highest_remaining;
        state
            .transactions
            .retain(|_, tx| tx.block_number <= block_number);
        for set in state.txs_to.values_mut() {
            set.retain(|e| e.block_number <= block_number);
        }
        for set in state.internal_to.values_mut() {
            set.retain(|e| e.block_number <= block_number);
        }
        for set in state.events_from.values_mut() {
            set.retain(|e| e.block_number <= block_number);
        }
        for history in state.storage.values_mut() {
            history.retain(|number, _| *number <= block_number);
        }
        let live_txs: std::collections::HashSet<B256> =
            state.transactions.keys().copied().collect();
        state.creations.retain(|_, tx_hash| live_txs.contains(tx_hash));
        for record in state.addresses.values_mut() {
            record.last_filtered = record.last_filtered.min(block_number);
        }
        Ok(())
    }
}
