//! # Parallel Aggregation Kernel
//!
//! Data-parallel folding of sampled records into [`Reduction`]s. Two entry
//! points:
//!
//! - [`fold_records`]: fold an already-materialized sample. The sample is
//!   split into contiguous ranges, one scoped thread per range, and the
//!   coordinator merges the per-worker partials. Workers share nothing
//!   during the fold.
//! - [`fold_region_stride`]: the fused sample-and-fold path. Each worker
//!   owns a region of the flat leaf cache, picks a start offset uniformly
//!   within the first stride of its region, strides within the region, and
//!   folds records directly without materializing a sample vector. The
//!   coordinator merges the raw per-region reductions; scaling to the
//!   population happens exactly once, downstream in the scaler.
//!
//! ## Region Partition
//!
//! For cache length `N` and worker count `W`, worker `t` owns
//! `[t * (N / W), (t + 1) * (N / W))`; the last worker inherits the
//! remainder. Per-region sample targets are `T / W` with the remainder on
//! the last worker.
//!
//! ## Why coordinator merge
//!
//! Reductions are tiny and commutative, so collecting per-worker values and
//! summing on the coordinator is both simpler and cheaper than CAS loops on
//! floating-point bit patterns.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::reduction::Reduction;
use crate::record::Record;

/// Inclusive range predicate on `amount`, the only filter dimension the
/// kernel evaluates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmountFilter {
    pub min: f64,
    pub max: f64,
}

impl AmountFilter {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn matches(&self, record: &Record) -> bool {
        record.amount >= self.min && record.amount <= self.max
    }
}

#[inline]
fn fold_range(records: &[Record], filter: Option<AmountFilter>) -> Reduction {
    let mut partial = Reduction::default();
    match filter {
        None => {
            for record in records {
                partial.accumulate(record.amount);
            }
        }
        Some(f) => {
            for record in records {
                if f.matches(record) {
                    partial.accumulate(record.amount);
                }
            }
        }
    }
    partial
}

/// Folds a sample across `num_threads` workers and merges the partials.
pub fn fold_records(
    records: &[Record],
    filter: Option<AmountFilter>,
    num_threads: usize,
) -> Reduction {
    let total = records.len();
    if total == 0 {
        return Reduction::default();
    }

    let workers = num_threads.max(1).min(total);
    if workers == 1 {
        return fold_range(records, filter);
    }

    let chunk = total / workers;
    std::thread::scope(|scope| {
        let mut handles = Vec::with_capacity(workers);
        for t in 0..workers {
            let start = t * chunk;
            let end = if t == workers - 1 { total } else { start + chunk };
            let range = &records[start..end];
            handles.push(scope.spawn(move || fold_range(range, filter)));
        }

        let mut merged = Reduction::default();
        for handle in handles {
            merged = merged.merge(handle.join().expect("aggregation worker panicked"));
        }
        merged
    })
}

/// Samples and folds in one pass over the flat cache: region-partitioned
/// workers stride within their region from a seeded random offset. Returns
/// the raw (unscaled) merged reduction.
pub fn fold_region_stride(
    records: &[Record],
    sample_percent: f64,
    num_threads: usize,
    filter: Option<AmountFilter>,
    seed: u64,
) -> Reduction {
    let total = records.len();
    if total == 0 || sample_percent <= 0.0 {
        return Reduction::default();
    }
    if sample_percent >= 100.0 {
        return fold_records(records, filter, num_threads);
    }

    let target = (total as f64 * sample_percent / 100.0) as usize;
    if target == 0 {
        return Reduction::default();
    }

    let workers = num_threads.max(1).min(target.max(1));
    let region_len = total / workers;
    let per_worker = target / workers;

    std::thread::scope(|scope| {
        let mut handles = Vec::with_capacity(workers);
        for t in 0..workers {
            let region_start = t * region_len;
            let region_end = if t == workers - 1 {
                total
            } else {
                region_start + region_len
            };
            let local_target = if t == workers - 1 {
                target - per_worker * (workers - 1)
            } else {
                per_worker
            };
            let region = &records[region_start..region_end];

            handles.push(scope.spawn(move || {
                if local_target == 0 || region.is_empty() {
                    return Reduction::default();
                }
                let stride = (region.len() / local_target).max(1);
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(t as u64));
                let offset = rng.gen_range(0..stride);

                let mut partial = Reduction::default();
                let mut taken = 0usize;
                let mut i = offset;
                while i < region.len() && taken < local_target {
                    let record = &region[i];
                    match filter {
                        Some(f) if !f.matches(record) => {}
                        _ => partial.accumulate(record.amount),
                    }
                    taken += 1;
                    i += stride;
                }
                partial
            }));
        }

        let mut merged = Reduction::default();
        for handle in handles {
            merged = merged.merge(handle.join().expect("region fold worker panicked"));
        }
        merged
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(count: i64) -> Vec<Record> {
        (0..count)
            .map(|id| Record::new(id, id as f64, 0, 0, 0))
            .collect()
    }

    #[test]
    fn fold_empty_sample_is_zero() {
        let folded = fold_records(&[], None, 4);
        assert!(folded.is_empty());
    }

    #[test]
    fn fold_matches_sequential_sum() {
        let data = records(10_000);
        let expected: f64 = data.iter().map(|r| r.amount).sum();

        for threads in [1, 2, 4, 7] {
            let folded = fold_records(&data, None, threads);
            assert_eq!(folded.count, 10_000);
            assert!((folded.sum - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn filter_is_applied_before_accumulation() {
        let data = records(100);
        let folded = fold_records(&data, Some(AmountFilter::new(10.0, 19.0)), 4);
        assert_eq!(folded.count, 10);
        let expected: f64 = (10..20).map(|v| v as f64).sum();
        assert!((folded.sum - expected).abs() < 1e-9);
    }

    #[test]
    fn more_workers_than_records_degrades_gracefully() {
        let data = records(3);
        let folded = fold_records(&data, None, 16);
        assert_eq!(folded.count, 3);
        assert_eq!(folded.sum, 3.0);
    }

    #[test]
    fn region_stride_fold_hits_the_target_count() {
        let data = records(10_000);
        let folded = fold_region_stride(&data, 10.0, 4, None, 42);
        // 1000 requested; region exhaustion can shave a few per worker.
        assert!(folded.count >= 900 && folded.count <= 1000, "{}", folded.count);
    }

    #[test]
    fn region_stride_fold_is_deterministic_for_a_seed() {
        let data = records(5_000);
        let a = fold_region_stride(&data, 7.0, 3, None, 99);
        let b = fold_region_stride(&data, 7.0, 3, None, 99);
        assert_eq!(a, b);
    }

    #[test]
    fn region_stride_full_percent_folds_everything() {
        let data = records(500);
        let folded = fold_region_stride(&data, 100.0, 4, None, 1);
        assert_eq!(folded.count, 500);
    }
}
