//! The filter engine — intersects each block with the registered address
//! set and writes the per-address index deltas.
//!
//! The registered set is passed whole to `index_blocks`; the store performs
//! the intersection and advances every watermark, so quiet blocks still
//! move `last_filtered` forward.
//!
//! Addresses registered after blocks were persisted are caught up by
//! one-shot backfill jobs: persisted blocks are replayed from the store in
//! ascending order with the single-address set, committing per block so
//! progress survives a crash.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use alloy_primitives::{Address, B256};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use chainscope_core::database::Database;
use chainscope_core::error::StoreError;
use chainscope_core::types::{AccountState, BlockWithTransactions};

/// A request to replay persisted blocks `[from, last persisted]` for one
/// freshly registered address.
#[derive(Debug, Clone, Copy)]
pub struct BackfillRequest {
    pub address: Address,
    pub from: u64,
}

/// Consumes ordered blocks from the monitor and maintains the indices.
pub struct FilterEngine<DB> {
    db: Arc<DB>,
}

impl<DB> Clone for FilterEngine<DB> {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
        }
    }
}

impl<DB> FilterEngine<DB>
where
    DB: Database + 'static,
{
    pub fn new(db: Arc<DB>) -> Self {
        Self { db }
    }

    /// Process one block: record storage snapshots and contract creations,
    /// then index it against the full registered set in one atomic batch.
    pub async fn process_block(
        &self,
        block: &BlockWithTransactions,
        storage: &HashMap<Address, AccountState>,
    ) -> Result<(), StoreError> {
        let registered = self.db.get_addresses().await?;

        if !storage.is_empty() {
            self.db.index_storage(storage, block.number).await?;
        }

        let mut creations: HashMap<B256, Vec<Address>> = HashMap::new();
        for tx in &block.transactions {
            if let Some(created) = tx.created_contract {
                creations.entry(tx.hash).or_default().push(created);
            }
        }
        if !creations.is_empty() {
            self.db.set_contract_creation_transaction(creations).await?;
        }

        let touched = touch_set(block);
        let touched_registered = registered
            .iter()
            .filter(|address| touched.contains(*address))
            .count();
        tracing::debug!(
            block = block.number,
            registered = registered.len(),
            touched = touched_registered,
            "filtering block"
        );

        self.db
            .index_blocks(&registered, std::slice::from_ref(block))
            .await
    }

    /// Spawn the worker draining one-shot backfill requests.
    pub fn spawn_backfill_worker(
        &self,
        mut requests: mpsc::Receiver<BackfillRequest>,
    ) -> JoinHandle<()> {
        let db = Arc::clone(&self.db);
        tokio::spawn(async move {
            while let Some(request) = requests.recv().await {
                if let Err(e) = run_backfill(&*db, request).await {
                    tracing::error!(
                        address = %request.address,
                        from = request.from,
                        error = %e,
                        "backfill failed"
                    );
                }
            }
        })
    }
}

/// Every address a block touches: recipients, created contracts,
/// internal-call targets and event emitters.
pub fn touch_set(block: &BlockWithTransactions) -> HashSet<Address> {
    let mut touched = HashSet::new();
    for tx in &block.transactions {
        if let Some(to) = tx.to {
            touched.insert(to);
        }
        if let Some(created) = tx.created_contract {
            touched.insert(created);
        }
        for call in &tx.internal_calls {
            if let Some(to) = call.to {
                touched.insert(to);
            }
        }
        for event in &tx.events {
            touched.insert(event.address);
        }
    }
    touched
}

/// Replay persisted blocks through the filter for a single address,
/// resuming from its watermark so a crashed job repeats no work.
pub async fn run_backfill<DB>(db: &DB, request: BackfillRequest) -> Result<(), StoreError>
where
    DB: Database + ?Sized,
{
    let last_persisted = db.get_last_persisted_block_number().await?;
    let watermark = db.get_last_filtered(request.address).await?;
    let start = watermark.max(request.from.saturating_sub(1)) + 1;
    if start > last_persisted {
        return Ok(());
    }
    tracing::info!(
        address = %request.address,
        start,
        end = last_persisted,
        "backfilling address"
    );

    for number in start..=last_persisted {
        let block = match db.read_block(number).await {
            Ok(block) => block,
            // Gaps below the persisted head are legal; the monitor will fill
            // them and the live filter will index them then.
            Err(e) if e.is_not_found() => continue,
            Err(e) => return Err(e),
        };
        let mut transactions = Vec::with_capacity(block.transactions.len());
        for hash in &block.transactions {
            transactions.push(db.read_transaction(*hash).await?);
        }
        let with_txs = BlockWithTransactions::new(&block, transactions);
        db.index_blocks(&[request.address], std::slice::from_ref(&with_txs))
            .await?;
    }
    tracing::info!(address = %request.address, to = last_persisted, "backfill complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainscope_core::types::{Event, InternalCall, Transaction};

    fn addr(byte: u8) -> Address {
        Address::with_last_byte(byte)
    }

    #[test]
    fn touch_set_covers_all_edges() {
        let block = BlockWithTransactions {
            number: 1,
            transactions: vec![Transaction {
                to: Some(addr(1)),
                created_contract: Some(addr(2)),
                internal_calls: vec![InternalCall {
                    to: Some(addr(3)),
                    ..Default::default()
                }],
                events: vec![Event {
                    address: addr(4),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        };
        let touched = touch_set(&block);
        assert_eq!(touched.len(), 4);
        for byte in 1..=4 {
            assert!(touched.contains(&addr(byte)));
        }
    }

    #[test]
    fn touch_set_skips_plain_transfers_to_nowhere() {
        let block = BlockWithTransactions {
            number: 1,
            transactions: vec![Transaction::default()],
            ..Default::default()
        };
        assert!(touch_set(&block).is_empty());
    }
}
