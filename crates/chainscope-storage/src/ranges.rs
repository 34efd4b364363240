//! Storage-range compression.
//!
//! Callers gauge snapshot density across a block window without receiving
//! every block: the window is partitioned into contiguous descending
//! ranges, each counting at most [`MAX_RANGE_RESULTS`] recorded snapshots.
//! Every recorded snapshot counts, whether or not its root repeats the
//! previous one.

use std::collections::BTreeMap;

use chainscope_core::types::{AccountState, RangeResult};

/// Maximum number of snapshot blocks summarised by a single range.
pub const MAX_RANGE_RESULTS: u64 = 1_000;

/// The ascending list of block numbers with a recorded snapshot.
pub fn snapshot_blocks(snapshots: &BTreeMap<u64, AccountState>) -> Vec<u64> {
    snapshots.keys().copied().collect()
}

/// Partition `[begin, end]` into descending contiguous ranges of at most
/// [`MAX_RANGE_RESULTS`] recorded snapshots each.
///
/// The ranges tile the whole window: the first ends at `end`, the last
/// starts at `begin`, and each internal boundary sits just below the lowest
/// counted block of the range above it. A window with no snapshots yields a
/// single zero-count range spanning it.
pub fn compress_ranges(snapshots: &[u64], begin: u64, end: u64) -> Vec<RangeResult> {
    let windowed: Vec<u64> = snapshots
        .iter()
        .copied()
        .filter(|n| (begin..=end).contains(n))
        .collect();

    if windowed.is_empty() {
        return vec![RangeResult {
            start: begin,
            end,
            result_count: 0,
        }];
    }

    let mut ranges = Vec::new();
    let mut upper = end;
    for chunk in windowed.rchunks(MAX_RANGE_RESULTS as usize) {
        // rchunks walks from the back; each chunk is still ascending inside.
        ranges.push(RangeResult {
            start: chunk[0],
            end: upper,
            result_count: chunk.len() as u64,
        });
        upper = chunk[0].saturating_sub(1);
    }
    if let Some(last) = ranges.last_mut() {
        last.start = begin;
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::B256;

    fn snapshot(root_byte: u8) -> AccountState {
        AccountState {
            root: B256::with_last_byte(root_byte),
            storage: Default::default(),
        }
    }

    #[test]
    fn repeated_roots_all_count() {
        let mut history = BTreeMap::new();
        history.insert(1, snapshot(0xaa));
        history.insert(3, snapshot(0xaa));
        history.insert(5, snapshot(0xbb));
        // Every recorded snapshot is a block, root equality is irrelevant.
        assert_eq!(snapshot_blocks(&history), vec![1, 3, 5]);
    }

    #[test]
    fn empty_window_is_one_zero_range() {
        let ranges = compress_ranges(&[], 0, 0);
        assert_eq!(
            ranges,
            vec![RangeResult {
                start: 0,
                end: 0,
                result_count: 0
            }]
        );
    }

    #[test]
    fn single_chunk_spans_whole_window() {
        // Snapshots at every odd block: 400 in [0, 800], 750 in [0, 1500].
        let snapshots: Vec<u64> = (1..4500).step_by(2).collect();
        assert_eq!(
            compress_ranges(&snapshots, 0, 800),
            vec![RangeResult {
                start: 0,
                end: 800,
                result_count: 400
            }]
        );
        assert_eq!(
            compress_ranges(&snapshots, 0, 1500),
            vec![RangeResult {
                start: 0,
                end: 1500,
                result_count: 750
            }]
        );
    }

    #[test]
    fn chunks_partition_the_window() {
        // 2,250 snapshots at odd numbers 1, 3, ..., 4499.
        let snapshots: Vec<u64> = (1..4500).step_by(2).collect();
        let ranges = compress_ranges(&snapshots, 0, 4499);

        assert_eq!(
            ranges,
            vec![
                RangeResult {
                    start: 2501,
                    end: 4499,
                    result_count: 1_000
                },
                RangeResult {
                    start: 501,
                    end: 2500,
                    result_count: 1_000
                },
                RangeResult {
                    start: 0,
                    end: 500,
                    result_count: 250
                },
            ]
        );
        assert_eq!(ranges.iter().map(|r| r.result_count).sum::<u64>(), 2_250);
        // Contiguous partition, descending.
        for pair in ranges.windows(2) {
            assert_eq!(pair[1].end, pair[0].start - 1);
        }
    }

    #[test]
    fn window_bounds_clamp_the_partition() {
        let snapshots: Vec<u64> = (1..4500).step_by(2).collect();
        let ranges = compress_ranges(&snapshots, 1300, 3500);

        assert_eq!(
            ranges,
            vec![
                RangeResult {
                    start: 1501,
                    end: 3500,
                    result_count: 1_000
                },
                RangeResult {
                    start: 1300,
                    end: 1500,
                    result_count: 100
                },
            ]
        );
        assert!(ranges.iter().all(|r| r.result_count <= MAX_RANGE_RESULTS));
    }
}
