//! # Sampler Family
//!
//! Strategies that turn `(sample_percent, parameters)` into a bag of
//! records. Every strategy reads the flat leaf cache by index (the tree
//! descent variant is the one exception and is dispatched at the database
//! level); they differ only in *which* indices are visited.
//!
//! ## Common Contract
//!
//! For a population of `N` records and percent `p ∈ (0, 100]`:
//!
//! ```text
//! T      = floor(N * p / 100)          target bag size
//! stride = max(1, N / T)               systematic step
//! ```
//!
//! - `p >= 100` returns every record; an empty population returns an empty
//!   bag; `T == 0` returns an empty bag.
//! - The bag is unordered: no positional meaning attaches to it.
//! - Seeded strategies are deterministic for equal seeds; the engine never
//!   draws OS entropy.
//! - Output size is clamped to `[floor(0.5 T), ceil(1.5 T)]`: block-family
//!   over-fill truncates to `T` in emission order, and an early-terminated
//!   bag refills from a systematic pass over records not yet emitted until
//!   `T` is met or the pass is exhausted. Deterministic systematic sampling
//!   yields exactly `T` whenever `stride` divides `N`.
//!
//! ## Choosing a Strategy
//!
//! | Strategy | Property |
//! |---|---|
//! | `Systematic` | uniform coverage, minimal randomness |
//! | `FastPointer` | fewer samples, more ground per step |
//! | `DualPointer` | two interleaved passes, local drift shows up |
//! | `Random` | unbiased point estimate |
//! | `RandomStartNth` | systematic with randomized phase |
//! | `MemoryStride` | cache-line friendly fixed stride |
//! | `Block` / `Page` | whole contiguous runs, preserves local correlation |
//! | `StratifiedBlock` | variance reduction on skewed amounts |
//! | `AdaptiveBlock` | smaller blocks where variance is high |
//! | `TreeWalk` | count-proportional descent, no cache needed |
//! | `CltDualPointer` | concurrent fast/slow streams with early exit |

mod block;
mod clt;
mod random;
mod stride;
mod tree_walk;

pub use clt::CltParams;
pub(crate) use tree_walk::sample_tree;

use hashbrown::HashMap;

use crate::config::{
    DEFAULT_BLOCK_SIZE, DEFAULT_FAST_STEP_FACTOR, DEFAULT_MAX_BLOCK, DEFAULT_MIN_BLOCK,
    DEFAULT_NTH, DEFAULT_PAGE_BYTES, DEFAULT_SEED, DEFAULT_STRATA,
};
use crate::exec::CancelToken;
use crate::record::Record;

/// The closed set of sampling strategies, each carrying its parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Sampler {
    /// Slow-pointer systematic pass: indices `0, stride, 2*stride, ...`.
    Systematic,
    /// Systematic pass with the stride multiplied by `step_factor`.
    FastPointer { step_factor: usize },
    /// Interleaved fast and slow systematic streams.
    DualPointer,
    /// `T` distinct uniform indices from a seeded PRNG.
    Random { seed: u64 },
    /// Random phase, then every `nth` record with wrap-around.
    RandomStartNth { nth: usize, seed: u64 },
    /// Fixed stride from a random offset inside the first stride window.
    /// `stride_bytes == 0` derives the stride from the target count.
    MemoryStride { stride_bytes: usize, seed: u64 },
    /// Every k-th block of `block_size` records, whole blocks.
    Block { block_size: usize },
    /// Block variant sized by `page_bytes / RECORD_SIZE`.
    Page { page_bytes: usize },
    /// Sort by amount, split into strata, block-sample inside each.
    StratifiedBlock { block_size: usize, strata: usize },
    /// Variance-zoned blocks, sized inversely to zone variance.
    AdaptiveBlock { min_block: usize, max_block: usize },
    /// Count-proportional descent over the tree; no cache required.
    TreeWalk,
    /// Concurrent fast/slow streams with CLT-based early exit.
    CltDualPointer(CltParams),
}

impl Default for Sampler {
    fn default() -> Self {
        Sampler::Systematic
    }
}

impl Sampler {
    pub fn fast_pointer() -> Self {
        Sampler::FastPointer {
            step_factor: DEFAULT_FAST_STEP_FACTOR,
        }
    }

    pub fn random() -> Self {
        Sampler::Random { seed: DEFAULT_SEED }
    }

    pub fn random_start_nth() -> Self {
        Sampler::RandomStartNth {
            nth: DEFAULT_NTH,
            seed: DEFAULT_SEED,
        }
    }

    pub fn memory_stride() -> Self {
        Sampler::MemoryStride {
            stride_bytes: 0,
            seed: DEFAULT_SEED,
        }
    }

    pub fn block() -> Self {
        Sampler::Block {
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }

    pub fn page() -> Self {
        Sampler::Page {
            page_bytes: DEFAULT_PAGE_BYTES,
        }
    }

    pub fn stratified_block() -> Self {
        Sampler::StratifiedBlock {
            block_size: DEFAULT_BLOCK_SIZE,
            strata: DEFAULT_STRATA,
        }
    }

    pub fn adaptive_block() -> Self {
        Sampler::AdaptiveBlock {
            min_block: DEFAULT_MIN_BLOCK,
            max_block: DEFAULT_MAX_BLOCK,
        }
    }

    /// Samples from a flat record slice. `TreeWalk` degenerates to a
    /// systematic pass here because the slice is already in leaf order; the
    /// database dispatches it against the tree instead.
    pub fn sample_slice(
        &self,
        records: &[Record],
        sample_percent: f64,
        cancel: &CancelToken,
    ) -> Vec<Record> {
        let total = records.len();
        if total == 0 || sample_percent <= 0.0 {
            return Vec::new();
        }
        if sample_percent >= 100.0 {
            return records.to_vec();
        }
        let target = target_count(total, sample_percent);
        if target == 0 {
            return Vec::new();
        }

        let bag = match self {
            Sampler::Systematic | Sampler::TreeWalk => stride::systematic(records, target),
            Sampler::FastPointer { step_factor } => {
                stride::fast_pointer(records, target, *step_factor)
            }
            Sampler::DualPointer => stride::dual_pointer(records, target),
            Sampler::Random { seed } => random::uniform(records, target, *seed),
            Sampler::RandomStartNth { nth, seed } => {
                stride::random_start_nth(records, target, *nth, *seed)
            }
            Sampler::MemoryStride { stride_bytes, seed } => {
                stride::memory_stride(records, target, *stride_bytes, *seed)
            }
            Sampler::Block { block_size } => {
                block::block(records, target, sample_percent, *block_size)
            }
            Sampler::Page { page_bytes } => {
                block::page(records, target, sample_percent, *page_bytes)
            }
            Sampler::StratifiedBlock { block_size, strata } => {
                block::stratified(records, target, sample_percent, *block_size, *strata)
            }
            Sampler::AdaptiveBlock {
                min_block,
                max_block,
            } => block::adaptive(records, target, sample_percent, *min_block, *max_block),
            Sampler::CltDualPointer(params) => clt::sample(records, target, params, cancel),
        };

        clamp_to_band(bag, records, target)
    }
}

/// `floor(N * p / 100)`.
pub(crate) fn target_count(total: usize, sample_percent: f64) -> usize {
    (total as f64 * sample_percent / 100.0) as usize
}

/// `max(1, N / T)`.
pub(crate) fn stride_for(total: usize, target: usize) -> usize {
    (total / target.max(1)).max(1)
}

/// Enforces the size contract: truncate an over-full bag to `T`, refill an
/// under-full one from a systematic pass until `T` or the pass is
/// exhausted. The refill visits only records the sampler has not already
/// emitted (tracked as an id multiset, so legitimate duplicate ids in the
/// population are refilled once per remaining copy), keeping the fold from
/// double-counting anything.
pub(crate) fn clamp_to_band(
    mut bag: Vec<Record>,
    records: &[Record],
    target: usize,
) -> Vec<Record> {
    let upper = (target as f64 * 1.5).ceil() as usize;
    if bag.len() > upper {
        bag.truncate(target);
        return bag;
    }

    let lower = target / 2;
    if bag.len() < lower {
        let mut emitted: HashMap<i64, usize> = HashMap::with_capacity(bag.len());
        for record in &bag {
            *emitted.entry(record.id).or_insert(0) += 1;
        }

        let stride = stride_for(records.len(), target);
        let mut i = 0;
        while bag.len() < target && i < records.len() {
            let record = &records[i];
            match emitted.get_mut(&record.id) {
                Some(count) if *count > 0 => *count -= 1,
                _ => bag.push(*record),
            }
            i += stride;
        }
    }
    bag
}
