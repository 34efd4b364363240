//! The block monitor — pulls the chain head and historical blocks, and
//! commits them to the store strictly in ascending order.
//!
//! # Flow
//!
//! A head tracker (the client's new-heads stream) and a bounded batch
//! fetcher feed a [`ReorderBuffer`]; the consumer drains it contiguously.
//! Per-block ingestion is block → transactions (batched) → receipts →
//! block trace → account dumps; all must succeed before the block is
//! emitted, with bounded backoff per block.
//!
//! Before committing block `N`, its parent hash is compared against the
//! stored block `N − 1`; a mismatch walks back to the common ancestor,
//! rolls back every derived index above it and resumes fetching forward.
//!
//! Delivery to the filter is synchronous: the monitor does not advance
//! until the filter reports commit.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, B256, Bytes};
use futures::future::try_join_all;
use tokio::sync::{watch, Semaphore};

use chainscope_core::database::Database;
use chainscope_core::types::{AccountState, Block, BlockWithTransactions, Event, InternalCall, Transaction};

use crate::client::{ClientError, NodeClient};
use crate::error::MonitorError;
use crate::filter::FilterEngine;
use crate::reorder::ReorderBuffer;
use crate::retry::{RetryConfig, RetryPolicy};

/// Lifecycle of a monitor instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    /// Not yet started.
    Idle,
    /// Catching up to the chain head.
    Syncing,
    /// Waiting for new heads.
    AtHead,
    /// Shut down; in-flight work drained.
    Stopped,
}

impl std::fmt::Display for MonitorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Syncing => write!(f, "syncing"),
            Self::AtHead => write!(f, "at-head"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Monitor configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Maximum concurrent block fetches.
    pub max_in_flight: usize,
    /// Per-block retry policy.
    pub retry: RetryConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 8,
            retry: RetryConfig::default(),
        }
    }
}

/// A fully ingested block, ready for ordered commit.
pub struct FetchedBlock {
    pub block: Block,
    pub transactions: Vec<Transaction>,
    pub storage: HashMap<Address, AccountState>,
}

/// Pulls blocks from the node and drives the filter engine.
pub struct BlockMonitor<DB, C> {
    db: Arc<DB>,
    client: Arc<C>,
    filter: FilterEngine<DB>,
    config: MonitorConfig,
    state: MonitorState,
    shutdown: watch::Receiver<bool>,
}

impl<DB, C> BlockMonitor<DB, C>
where
    DB: Database + 'static,
    C: NodeClient + 'static,
{
    pub fn new(
        db: Arc<DB>,
        client: Arc<C>,
        config: MonitorConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let filter = FilterEngine::new(Arc::clone(&db));
        Self {
            db,
            client,
            filter,
            config,
            state: MonitorState::Idle,
            shutdown,
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    /// Run until shutdown. Resumes from the last persisted block.
    pub async fn run(&mut self) -> Result<(), MonitorError> {
        self.state = MonitorState::Syncing;
        let mut heads = self.client.subscribe_new_heads().await?;
        let mut head = self.client.block_number().await?;
        let mut next = self.db.get_last_persisted_block_number().await? + 1;
        tracing::info!(next, head, "block monitor starting");

        loop {
            if *self.shutdown.borrow() {
                self.state = MonitorState::Stopped;
                tracing::info!("block monitor stopped");
                return Ok(());
            }
            while let Ok(h) = heads.try_recv() {
                head = head.max(h);
            }

            if next > head {
                self.state = MonitorState::AtHead;
                let mut shutdown = self.shutdown.clone();
                tokio::select! {
                    maybe_head = heads.recv() => match maybe_head {
                        Some(h) => head = head.max(h),
                        None => {
                            // Subscription gone; fall back to direct polling.
                            tokio::time::sleep(Duration::from_secs(1)).await;
                            head = head.max(self.client.block_number().await?);
                        }
                    },
                    _ = shutdown.changed() => {}
                }
                continue;
            }

            self.state = MonitorState::Syncing;
            let batch_end = head.min(next + self.config.max_in_flight as u64 - 1);
            next = self.ingest_range(next, batch_end).await?;
        }
    }

    /// Fetch `[from, to]` concurrently, commit in order. Returns the next
    /// block number to fetch — after a reorg that is `ancestor + 1`.
    async fn ingest_range(&mut self, from: u64, to: u64) -> Result<u64, MonitorError> {
        let registered = self.db.get_addresses().await?;
        let buffer = Arc::new(ReorderBuffer::new());
        let semaphore = Arc::new(Semaphore::new(self.config.max_in_flight));
        let policy = RetryPolicy::new(self.config.retry.clone());

        for number in from..=to {
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .expect("fetch semaphore closed");
            let client = Arc::clone(&self.client);
            let addresses = registered.clone();
            let slots = Arc::clone(&buffer);
            let policy = policy.clone();
            tokio::spawn(async move {
                let result = fetch_with_retry(&*client, &addresses, number, &policy).await;
                slots.insert(number, result);
                drop(permit);
            });
        }

        let mut next = from;
        while next <= to {
            match buffer.take(next).await {
                Err(e) => {
                    if e.is_fatal() {
                        return Err(e);
                    }
                    tracing::error!(block = next, error = %e, "skipping block");
                    next += 1;
                }
                Ok(fetched) => {
                    if let Some(ancestor) = self.detect_reorg(&fetched).await? {
                        tracing::warn!(
                            at = fetched.block.number,
                            ancestor,
                            "chain reorganization, rolling back"
                        );
                        self.db.rollback_to(ancestor).await?;
                        buffer.clear();
                        return Ok(ancestor + 1);
                    }
                    self.commit(fetched).await?;
                    next += 1;
                }
            }
            if *self.shutdown.borrow() {
                // The in-flight commit has finished; stop issuing new work.
                return Ok(next);
            }
        }
        Ok(to + 1)
    }

    /// Compare the incoming block's parent hash against the stored
    /// predecessor. Returns the common ancestor if the chains disagree.
    async fn detect_reorg(&self, fetched: &FetchedBlock) -> Result<Option<u64>, MonitorError> {
        if fetched.block.number <= 1 {
            return Ok(None);
        }
        let prev = match self.db.read_block(fetched.block.number - 1).await {
            Ok(block) => block,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if prev.hash == fetched.block.parent_hash {
            return Ok(None);
        }
        let ancestor = self.find_common_ancestor(fetched.block.number - 1).await?;
        Ok(Some(ancestor))
    }

    /// Walk backwards until the stored chain and the node agree.
    async fn find_common_ancestor(&self, start: u64) -> Result<u64, MonitorError> {
        let mut number = start;
        while number > 0 {
            let stored = match self.db.read_block(number).await {
                Ok(block) => block,
                Err(e) if e.is_not_found() => {
                    number -= 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let remote = self.client.block_by_number(number).await?;
            if stored.hash == remote.hash {
                return Ok(number);
            }
            number -= 1;
        }
        Ok(0)
    }

    async fn commit(&self, fetched: FetchedBlock) -> Result<(), MonitorError> {
        let FetchedBlock {
            block,
            transactions,
            storage,
        } = fetched;
        self.db.write_transactions(transactions.clone()).await?;
        self.db.write_blocks(vec![block.clone()]).await?;
        let with_txs = BlockWithTransactions::new(&block, transactions);
        self.filter.process_block(&with_txs, &storage).await?;
        tracing::debug!(
            block = block.number,
            txs = with_txs.transactions.len(),
            "block committed"
        );
        Ok(())
    }
}

async fn fetch_with_retry<C: NodeClient + ?Sized>(
    client: &C,
    addresses: &[Address],
    number: u64,
    policy: &RetryPolicy,
) -> Result<FetchedBlock, MonitorError> {
    let mut attempt = 0u32;
    loop {
        match fetch_block(client, addresses, number).await {
            Ok(fetched) => return Ok(fetched),
            Err(e) => {
                attempt += 1;
                match policy.next_delay(attempt) {
                    Some(delay) => {
                        tracing::warn!(
                            block = number,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "block fetch failed, backing off"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        return Err(MonitorError::BlockAbandoned {
                            number,
                            attempts: attempt,
                            reason: e.to_string(),
                        })
                    }
                }
            }
        }
    }
}

/// One block's full ingestion: header, transactions, receipts, traces and
/// account dumps for the registered addresses.
async fn fetch_block<C: NodeClient + ?Sized>(
    client: &C,
    addresses: &[Address],
    number: u64,
) -> Result<FetchedBlock, ClientError> {
    let raw = client.block_by_number(number).await?;

    let raw_txs = try_join_all(
        raw.transactions
            .iter()
            .map(|hash| client.transaction_by_hash(*hash)),
    )
    .await?;
    let receipts = try_join_all(
        raw.transactions
            .iter()
            .map(|hash| client.transaction_receipt(*hash)),
    )
    .await?;

    let mut traced: HashMap<B256, Vec<InternalCall>> = HashMap::new();
    for trace in client.trace_block(number).await? {
        if let (Some(hash), Some(frame)) = (trace.tx_hash, trace.result) {
            traced.insert(hash, frame.internal_calls());
        }
    }

    let mut transactions = Vec::with_capacity(raw_txs.len());
    for (tx, receipt) in raw_txs.into_iter().zip(receipts) {
        let events: Vec<Event> = receipt
            .logs
            .iter()
            .map(|log| Event {
                address: log.address,
                topics: log.topics.clone(),
                data: log.data.clone(),
                block_number: number,
                tx_hash: tx.hash,
                log_index: log.log_index,
            })
            .collect();
        transactions.push(Transaction {
            hash: tx.hash,
            block_number: number,
            index: tx.index,
            from: tx.from,
            to: tx.to,
            value: tx.value,
            gas: tx.gas,
            gas_used: receipt.gas_used,
            data: tx.input,
            private_data: Bytes::new(),
            created_contract: receipt.contract_address,
            events,
            internal_calls: traced.remove(&tx.hash).unwrap_or_default(),
            status: receipt.status == 1,
        });
    }

    let mut storage = HashMap::new();
    for address in addresses {
        match client.dump_account(*address, number).await {
            Ok(state) => {
                storage.insert(*address, state);
            }
            Err(e) => {
                // Not yet deployed at this block, or the node cannot dump it.
                tracing::debug!(address = %address, block = number, error = %e, "account dump unavailable");
            }
        }
    }

    Ok(FetchedBlock {
        block: raw.into_block(),
        transactions,
        storage,
    })
}
