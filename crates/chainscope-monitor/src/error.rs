//! Error types for the ingestion pipeline.

use thiserror::Error;

use chainscope_core::StoreError;

use crate::client::ClientError;

/// Errors that can occur while monitoring and filtering blocks.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("node client error: {0}")]
    Client(#[from] ClientError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// A block could not be fetched within the retry budget. The monitor
    /// logs it and moves on; the gap stays visible in the raw store.
    #[error("block {number} abandoned after {attempts} attempts: {reason}")]
    BlockAbandoned {
        number: u64,
        attempts: u32,
        reason: String,
    },
}

impl MonitorError {
    /// Returns `true` if the pipeline should stop rather than continue.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Store(StoreError::Fatal(_)))
    }
}
