//! chainscope-monitor — the ingestion half of the chainscope indexer.
//!
//! # Architecture
//!
//! ```text
//! NodeClient ──> BlockMonitor ──> ReorderBuffer ──> ordered commit
//!                    │                                   │
//!                    │ (head tracking, bounded fetches,  │ raw writes +
//!                    │  reorg walk-back)                 ▼
//!                    └──────────────────────────> FilterEngine ──> IndexStore
//! ```
//!
//! The monitor pulls blocks from the node — concurrently, bounded by
//! `max_in_flight` — and commits them strictly in ascending order with no
//! gaps. The filter engine intersects each block with the registered address
//! set and advances every address's watermark, touched or not.

pub mod client;
pub mod error;
pub mod filter;
pub mod monitor;
pub mod reorder;
pub mod retry;

pub use client::{ClientError, HttpNodeClient, NodeClient};
pub use error::MonitorError;
pub use filter::{BackfillRequest, FilterEngine};
pub use monitor::{BlockMonitor, MonitorConfig, MonitorState};
pub use reorder::ReorderBuffer;
pub use retry::{RetryConfig, RetryPolicy};
