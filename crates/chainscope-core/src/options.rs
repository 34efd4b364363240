//! Query pagination and windowing options.

use serde::{Deserialize, Serialize};

/// Hard cap applied when a caller asks for an unbounded page.
pub const MAX_PAGE_SIZE: u64 = 10_000;

/// Options accepted by the paginated index queries.
///
/// Missing block bounds default to `(0, last persisted)`; missing timestamp
/// bounds default to the full range. Pages are zero-indexed and a
/// `page_size` of 0 means "unbounded", capped at [`MAX_PAGE_SIZE`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryOptions {
    pub begin_block_number: Option<u64>,
    pub end_block_number: Option<u64>,
    pub begin_timestamp: Option<u64>,
    pub end_timestamp: Option<u64>,
    pub page_size: u64,
    pub page_number: u64,
}

impl QueryOptions {
    /// The effective block window, with missing bounds filled in.
    pub fn block_window(&self, last_persisted: u64) -> (u64, u64) {
        (
            self.begin_block_number.unwrap_or(0),
            self.end_block_number.unwrap_or(last_persisted),
        )
    }

    /// The effective timestamp window.
    pub fn timestamp_window(&self) -> (u64, u64) {
        (
            self.begin_timestamp.unwrap_or(0),
            self.end_timestamp.unwrap_or(u64::MAX),
        )
    }

    /// The entry range `[offset, offset + limit)` selected by this page.
    pub fn page_bounds(&self) -> (usize, usize) {
        let size = if self.page_size == 0 {
            MAX_PAGE_SIZE
        } else {
            self.page_size.min(MAX_PAGE_SIZE)
        };
        let offset = self.page_number.saturating_mul(size);
        (offset as usize, size as usize)
    }
}

/// Block window for storage-range queries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageOptions {
    pub begin_block_number: Option<u64>,
    pub end_block_number: Option<u64>,
}

impl PageOptions {
    /// The effective block window, with missing bounds filled in.
    pub fn block_window(&self, last_persisted: u64) -> (u64, u64) {
        (
            self.begin_block_number.unwrap_or(0),
            self.end_block_number.unwrap_or(last_persisted),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_window_spans_persisted_chain() {
        let opts = QueryOptions::default();
        assert_eq!(opts.block_window(500), (0, 500));
        assert_eq!(opts.timestamp_window(), (0, u64::MAX));
    }

    #[test]
    fn explicit_bounds_win() {
        let opts = QueryOptions {
            begin_block_number: Some(10),
            end_block_number: Some(20),
            ..Default::default()
        };
        assert_eq!(opts.block_window(500), (10, 20));
    }

    #[test]
    fn zero_page_size_is_capped() {
        let opts = QueryOptions::default();
        assert_eq!(opts.page_bounds(), (0, MAX_PAGE_SIZE as usize));
    }

    #[test]
    fn pages_are_zero_indexed() {
        let opts = QueryOptions {
            page_size: 10,
            page_number: 3,
            ..Default::default()
        };
        assert_eq!(opts.page_bounds(), (30, 10));
    }
}
