//! Error taxonomy for the storage contract and the read API.

use thiserror::Error;

/// Errors surfaced by storage backends and the read path.
///
/// The kinds matter more than the messages: validation and not-found are
/// returned to callers verbatim, transient failures are retried by the
/// monitor, fatal failures stop ingestion but leave reads online.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Bad input from a caller (invalid address, malformed ABI JSON, bad
    /// paging options). The message is returned to the caller as-is.
    #[error("{0}")]
    Validation(String),

    /// Unknown hash, block number, address or template name.
    #[error("{0}")]
    NotFound(String),

    /// The operation contradicts registered state, e.g. assigning a
    /// template to an unregistered address.
    #[error("{0}")]
    Conflict(String),

    /// The backend failed in a way worth retrying with the same batch.
    #[error("transient backend failure: {0}")]
    Transient(String),

    /// The backend is unusable; ingestion must stop.
    #[error("backend failure: {0}")]
    Fatal(String),
}

impl StoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Returns `true` if retrying the same batch may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Returns `true` for the not-found kind, so clients can disambiguate
    /// "no such entity" from an invalid request.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
