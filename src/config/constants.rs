//! # Engine Configuration Constants
//!
//! This module centralizes the constants that shape the tree, the leaf cache,
//! the samplers, and the statistical validation layer. Constants that depend
//! on each other are co-located so a change to one is visible next to the
//! values it constrains.
//!
//! ## Dependency Graph
//!
//! ```text
//! MAX_KEYS (255)
//!       │
//!       └─> leaf/internal split point = MAX_KEYS / 2
//!           A node splits when it reaches MAX_KEYS entries, so post-split
//!           occupancy is MAX_KEYS / 2 on the left and the remainder on the
//!           right.
//!
//! RECORD_SIZE (32 bytes, fixed by the Record layout)
//!       │
//!       ├─> DEFAULT_PAGE_BYTES / RECORD_SIZE = records per page block
//!       │
//!       └─> checkpoint payload stride (one blob per record)
//!
//! CACHE_REBUILD_INTERVAL (1000 insertions)
//!       │
//!       └─> leaf cache is rebuilt eagerly at this cadence; in between it is
//!           invalid and the next sample rebuilds it lazily
//!
//! CLT_MIN_SAMPLES (30)
//!       │
//!       └─> convergence checks never fire below this count; the normal
//!           approximation is not trustworthy for smaller samples
//! ```
//!
//! ## Critical Invariants
//!
//! 1. `MAX_KEYS / 2 >= 1` so both split halves are non-empty.
//! 2. `RECORD_SIZE` matches `size_of::<Record>()` (asserted in `record.rs`).
//! 3. A page block holds at least one whole record.

use crate::record::RECORD_SIZE;

/// Maximum keys per B+ tree node. A node holding this many entries splits.
pub const MAX_KEYS: usize = 255;

/// Midpoint used by leaf and internal splits.
pub const SPLIT_POINT: usize = MAX_KEYS / 2;

/// Insertions between eager rebuilds of the flat leaf cache. Between
/// rebuilds the cache is invalid and the next sampler call repopulates it.
pub const CACHE_REBUILD_INTERVAL: u64 = 1000;

/// Default block size (in records) for block sampling.
pub const DEFAULT_BLOCK_SIZE: usize = 1000;

/// Default page size in bytes for page sampling; converted to records via
/// `RECORD_SIZE`.
pub const DEFAULT_PAGE_BYTES: usize = 4096;

/// Default stratum count for stratified block sampling.
pub const DEFAULT_STRATA: usize = 4;

/// Adaptive block sampling bounds (records per block).
pub const DEFAULT_MIN_BLOCK: usize = 500;
pub const DEFAULT_MAX_BLOCK: usize = 2000;

/// Number of fixed variance zones the adaptive block sampler partitions the
/// population into.
pub const ADAPTIVE_VARIANCE_ZONES: usize = 10;

/// Fast-pointer stride multiplier applied on top of the systematic stride.
pub const DEFAULT_FAST_STEP_FACTOR: usize = 2;

/// Dual-pointer fast stream stride multiplier.
pub const DUAL_FAST_MULTIPLIER: usize = 3;

/// Default phase length for random-start nth sampling.
pub const DEFAULT_NTH: usize = 10;

/// Default seed for samplers that accept one but were not given one.
pub const DEFAULT_SEED: u64 = 42;

/// Minimum sample count before any CLT convergence check may fire.
pub const CLT_MIN_SAMPLES: usize = 30;

/// Default cadence (in samples) between CLT convergence checks.
pub const DEFAULT_CHECK_INTERVAL: usize = 10;

/// Default CLT early-exit threshold on the relative half-width, in percent.
pub const DEFAULT_MAX_ERROR_PERCENT: f64 = 2.0;

/// Default stability tolerance for the fast/slow estimate comparison.
pub const DEFAULT_ERROR_THRESHOLD: f64 = 0.05;

/// Default target confidence level.
pub const DEFAULT_CONFIDENCE_LEVEL: f64 = 0.95;

/// Default sample fraction and worker count for approximate queries.
pub const DEFAULT_SAMPLE_PERCENT: f64 = 10.0;
pub const DEFAULT_NUM_THREADS: usize = 4;

/// Stride of one slow validation pass: every 50th record is a 2% pass.
pub const SLOW_VALIDATION_STRIDE: usize = 50;

/// Number of phase-shifted slow validation passes behind a fast estimate.
pub const SLOW_VALIDATION_PASSES: usize = 5;

/// Upper bound substituted for an open-ended `amount > lo` predicate.
pub const AMOUNT_UPPER_DEFAULT: f64 = 99999.99;

const _: () = assert!(SPLIT_POINT >= 1, "split must leave both halves non-empty");
const _: () = assert!(
    SPLIT_POINT < MAX_KEYS,
    "split point must leave room for further insertions"
);
const _: () = assert!(
    DEFAULT_PAGE_BYTES >= RECORD_SIZE,
    "a page must hold at least one record"
);
const _: () = assert!(DEFAULT_MIN_BLOCK <= DEFAULT_MAX_BLOCK);

/// z-score for a given confidence level. The engine supports the three
/// standard levels; anything below 0.95 falls back to the 90% score.
pub fn z_score(confidence_level: f64) -> f64 {
    if confidence_level >= 0.99 {
        2.576
    } else if confidence_level >= 0.95 {
        1.96
    } else {
        1.645
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn z_score_matches_standard_table() {
        assert_eq!(z_score(0.99), 2.576);
        assert_eq!(z_score(0.95), 1.96);
        assert_eq!(z_score(0.90), 1.645);
        assert_eq!(z_score(0.50), 1.645);
    }

    #[test]
    fn page_holds_whole_records() {
        assert!(DEFAULT_PAGE_BYTES / RECORD_SIZE >= 1);
    }
}
