//! Reordering buffer between the concurrent fetchers and the ordered
//! consumer.
//!
//! Fetches complete out of order; the consumer must see blocks in strictly
//! ascending number order with no gaps. The buffer is a block-number-keyed
//! map plus a wakeup; the consumer waits for the contiguous next number.
//! Capacity is bounded externally by the fetch semaphore.

use std::collections::BTreeMap;
use std::sync::Mutex;

use tokio::sync::Notify;

/// Block-number-keyed hand-off buffer.
#[derive(Default)]
pub struct ReorderBuffer<T> {
    slots: Mutex<BTreeMap<u64, T>>,
    notify: Notify,
}

impl<T> ReorderBuffer<T> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(BTreeMap::new()),
            notify: Notify::new(),
        }
    }

    /// Deposit an item under its block number and wake the consumer.
    pub fn insert(&self, number: u64, item: T) {
        self.slots.lock().unwrap().insert(number, item);
        self.notify.notify_waiters();
    }

    /// Wait until the item for `number` arrives, then remove and return it.
    pub async fn take(&self, number: u64) -> T {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register for the wakeup before checking, so an insert between
            // the check and the await cannot be missed.
            notified.as_mut().enable();
            if let Some(item) = self.slots.lock().unwrap().remove(&number) {
                return item;
            }
            notified.await;
        }
    }

    /// Drop all buffered items (reorg: in-flight fetches are stale).
    pub fn clear(&self) {
        self.slots.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.slots.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
