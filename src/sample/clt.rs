//! # CLT-Validated Dual-Pointer Sampler
//!
//! Concurrent fast and slow systematic streams over region partitions of
//! the cache, each maintaining running `(n, Σx, Σx²)` statistics. Fast
//! workers test their own convergence: once the relative CI half-width
//! `z * sqrt(s²/n) / |x̄|` drops under the error budget they raise the
//! shared stop flag and everyone returns partials. Slow workers cross-check
//! their running mean against the fast stream's published mean and can stop
//! the query early when the two agree and enough samples were published.
//!
//! The caller's cancellation token is polled at the same cadence, so a
//! timed-out query also surfaces partials rather than blocking.
//!
//! The union of the streams targets the usual `T`; an early exit below the
//! tolerance band is refilled by the dispatch layer's systematic pass.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::config::{
    z_score, CLT_MIN_SAMPLES, DEFAULT_CHECK_INTERVAL, DEFAULT_CONFIDENCE_LEVEL,
    DEFAULT_MAX_ERROR_PERCENT, DEFAULT_NUM_THREADS, DUAL_FAST_MULTIPLIER,
};
use crate::exec::CancelToken;
use crate::record::Record;

/// Tuning for the CLT-validated sampler.
#[derive(Debug, Clone, PartialEq)]
pub struct CltParams {
    /// Target confidence level; selects the z-score.
    pub confidence_level: f64,
    /// Samples between convergence checks on the fast stream; the slow
    /// stream checks twice as often.
    pub check_interval: usize,
    /// Total worker count, split between fast and slow streams.
    pub num_threads: usize,
    /// Early-exit threshold on the relative CI half-width, in percent.
    pub max_error_percent: f64,
}

impl Default for CltParams {
    fn default() -> Self {
        Self {
            confidence_level: DEFAULT_CONFIDENCE_LEVEL,
            check_interval: DEFAULT_CHECK_INTERVAL,
            num_threads: DEFAULT_NUM_THREADS,
            max_error_percent: DEFAULT_MAX_ERROR_PERCENT,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct FastProgress {
    mean: f64,
    samples: usize,
}

#[derive(Debug, Default)]
struct RunningStats {
    n: usize,
    sum: f64,
    sum_sq: f64,
}

impl RunningStats {
    #[inline]
    fn push(&mut self, value: f64) {
        self.n += 1;
        self.sum += value;
        self.sum_sq += value * value;
    }

    fn mean(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.sum / self.n as f64
        }
    }

    fn variance(&self) -> f64 {
        if self.n < 2 {
            return 0.0;
        }
        let n = self.n as f64;
        ((self.sum_sq - self.sum * self.sum / n) / (n - 1.0)).max(0.0)
    }
}

pub(super) fn sample(
    records: &[Record],
    target: usize,
    params: &CltParams,
    cancel: &CancelToken,
) -> Vec<Record> {
    let total = records.len();
    let fast_threads = (params.num_threads / 2).max(1);
    let slow_threads = params.num_threads.saturating_sub(fast_threads).max(1);

    // The fast stream takes a third of the target, the slow stream the rest.
    let fast_share = (target / 3).max(1);
    let slow_share = (target - target / 3).max(1);

    let z = z_score(params.confidence_level);
    let check_every = params.check_interval.max(1);
    let stop = AtomicBool::new(false);
    let progress = Mutex::new(FastProgress::default());

    let mut bag: Vec<Record> = std::thread::scope(|scope| {
        let mut handles = Vec::with_capacity(fast_threads + slow_threads);

        for t in 0..fast_threads {
            let region = region_bounds(total, fast_threads, t);
            let local_target = share_of(fast_share, fast_threads, t);
            let stop = &stop;
            let progress = &progress;
            handles.push(scope.spawn(move || {
                fast_worker(
                    records,
                    region,
                    local_target,
                    z,
                    check_every,
                    params.max_error_percent,
                    stop,
                    progress,
                    cancel,
                )
            }));
        }

        // The slow stream's phase offset is half the fast stream's stride,
        // derived from the fast partition (not the slow worker's own).
        let fast_stride = fast_stride_for(total / fast_threads, fast_share / fast_threads);

        for t in 0..slow_threads {
            let region = region_bounds(total, slow_threads, t);
            let local_target = share_of(slow_share, slow_threads, t);
            let stop = &stop;
            let progress = &progress;
            handles.push(scope.spawn(move || {
                slow_worker(
                    records,
                    region,
                    local_target,
                    target,
                    fast_stride,
                    check_every,
                    params.max_error_percent,
                    stop,
                    progress,
                    cancel,
                )
            }));
        }

        let mut merged = Vec::with_capacity(target);
        for handle in handles {
            merged.extend(handle.join().expect("sampling worker panicked"));
        }
        merged
    });

    bag.truncate(target);
    bag
}

/// Stride of one fast worker over its region: the systematic stride for its
/// share, multiplied up so the stream covers more ground per step.
fn fast_stride_for(region_len: usize, local_target: usize) -> usize {
    (region_len / local_target.max(1)).max(1) * DUAL_FAST_MULTIPLIER
}

fn region_bounds(total: usize, workers: usize, index: usize) -> (usize, usize) {
    let region_len = total / workers;
    let start = index * region_len;
    let end = if index == workers - 1 {
        total
    } else {
        start + region_len
    };
    (start, end)
}

fn share_of(share: usize, workers: usize, index: usize) -> usize {
    let per_worker = share / workers;
    if index == workers - 1 {
        share - per_worker * (workers - 1)
    } else {
        per_worker
    }
}

#[allow(clippy::too_many_arguments)]
fn fast_worker(
    records: &[Record],
    (start, end): (usize, usize),
    local_target: usize,
    z: f64,
    check_every: usize,
    max_error_percent: f64,
    stop: &AtomicBool,
    progress: &Mutex<FastProgress>,
    cancel: &CancelToken,
) -> Vec<Record> {
    let region_len = end - start;
    if region_len == 0 || local_target == 0 {
        return Vec::new();
    }
    let stride = fast_stride_for(region_len, local_target);

    let mut local = Vec::with_capacity(local_target);
    let mut stats = RunningStats::default();
    let mut i = start;
    while i < end && local.len() < local_target {
        if stop.load(Ordering::Acquire) {
            break;
        }
        local.push(records[i]);
        stats.push(records[i].amount);

        if stats.n % check_every == 0 {
            if cancel.is_cancelled() {
                break;
            }
            if stats.n >= CLT_MIN_SAMPLES {
                let mean = stats.mean();
                {
                    let mut shared = progress.lock();
                    shared.mean = mean;
                    shared.samples = stats.n;
                }
                if mean != 0.0 {
                    let standard_error = (stats.variance() / stats.n as f64).sqrt();
                    let error_percent = z * standard_error / mean.abs() * 100.0;
                    if error_percent <= max_error_percent {
                        stop.store(true, Ordering::Release);
                        break;
                    }
                }
            }
        }
        i += stride;
    }
    local
}

#[allow(clippy::too_many_arguments)]
fn slow_worker(
    records: &[Record],
    (start, end): (usize, usize),
    local_target: usize,
    overall_target: usize,
    fast_stride: usize,
    check_every: usize,
    max_error_percent: f64,
    stop: &AtomicBool,
    progress: &Mutex<FastProgress>,
    cancel: &CancelToken,
) -> Vec<Record> {
    let region_len = end - start;
    if region_len == 0 || local_target == 0 {
        return Vec::new();
    }
    let stride = (region_len / local_target).max(1);
    // Offset by half the fast stream's stride so the streams interleave.
    let offset = fast_stride / 2;
    let check_every = (check_every / 2).max(1);

    let mut local = Vec::with_capacity(local_target);
    let mut stats = RunningStats::default();
    let mut i = start + offset.min(region_len.saturating_sub(1));
    while i < end && local.len() < local_target {
        if stop.load(Ordering::Acquire) {
            break;
        }
        local.push(records[i]);
        stats.push(records[i].amount);

        if stats.n % check_every == 0 {
            if cancel.is_cancelled() {
                break;
            }
            let shared = *progress.lock();
            if shared.samples > 0 && shared.mean != 0.0 {
                let difference = (stats.mean() - shared.mean).abs() / shared.mean.abs();
                if difference <= max_error_percent / 100.0 && shared.samples >= overall_target / 2
                {
                    stop.store(true, Ordering::Release);
                    break;
                }
            }
        }
        i += stride;
    }
    local
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(count: i64) -> Vec<Record> {
        (0..count)
            .map(|id| Record::new(id, ((id * 13) % 301) as f64, 0, 0, 0))
            .collect()
    }

    #[test]
    fn collects_from_both_streams() {
        let data = records(10_000);
        let cancel = CancelToken::new();
        let bag = sample(&data, 1000, &CltParams::default(), &cancel);
        assert!(!bag.is_empty());
        assert!(bag.len() <= 1000);
    }

    #[test]
    fn constant_amounts_converge_immediately() {
        // Zero variance: the first convergence check must stop the query.
        let flat: Vec<Record> = (0..100_000)
            .map(|id| Record::new(id, 7.0, 0, 0, 0))
            .collect();
        let cancel = CancelToken::new();
        let bag = sample(&flat, 10_000, &CltParams::default(), &cancel);
        assert!(
            bag.len() < 10_000,
            "early exit expected, got {}",
            bag.len()
        );
    }

    #[test]
    fn cancelled_token_returns_partials() {
        let data = records(50_000);
        let cancel = CancelToken::new();
        cancel.cancel();
        let bag = sample(&data, 5000, &CltParams::default(), &cancel);
        // Workers notice the flag at their first check; whatever was
        // gathered before that is returned.
        assert!(bag.len() <= 5000);
    }

    #[test]
    fn slow_stream_starts_half_a_fast_stride_in() {
        // One fast worker, one slow worker, no early exit (the amounts are
        // far too spread for the convergence check to fire). The fast
        // stream strides 90 from index 0, so the slow stream must begin at
        // index 45, not at half its own stride.
        let data: Vec<Record> = (0..1000)
            .map(|id| Record::new(id, id as f64, 0, 0, 0))
            .collect();
        let cancel = CancelToken::new();
        let params = CltParams {
            num_threads: 2,
            ..CltParams::default()
        };

        let bag = sample(&data, 100, &params, &cancel);
        assert!(bag.iter().any(|r| r.id == 45), "slow phase offset wrong");
    }

    #[test]
    fn single_thread_still_runs_both_streams() {
        let data = records(2_000);
        let cancel = CancelToken::new();
        let params = CltParams {
            num_threads: 1,
            ..CltParams::default()
        };
        let bag = sample(&data, 200, &params, &cancel);
        assert!(!bag.is_empty());
    }
}
