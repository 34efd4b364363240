//! chainscope-core — data model and storage contract for the chainscope indexer.
//!
//! # Architecture
//!
//! ```text
//! BlockMonitor → BlockStore/TransactionStore   (raw chain data, append-only)
//!             → FilterEngine → IndexStore      (per-address indices + watermarks)
//! RpcApis     → Database façade + decoder      (read path)
//! ```
//!
//! This crate defines the types that cross every seam and the capability
//! traits (`AddressStore`, `TemplateStore`, `BlockStore`, `TransactionStore`,
//! `IndexStore`) every backend must satisfy. Backends choose their own
//! transaction model; the contract here is batch-atomicity per call.

pub mod database;
pub mod error;
pub mod options;
pub mod types;

pub use database::{
    AddressStore, BlockStore, Database, IndexStore, TemplateStore, TransactionStore,
};
pub use error::StoreError;
pub use options::{PageOptions, QueryOptions};
pub use types::{
    AccountState, Block, BlockWithTransactions, Event, InternalCall, RangeResult, Template,
    Transaction,
};
