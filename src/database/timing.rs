//! # Timing Statistics
//!
//! Global timing counters for the engine's hot paths. Each counter is an
//! `AtomicU64` of cumulative nanoseconds updated with relaxed ordering:
//! lock-free, a couple of nanoseconds per update, and accurate enough for
//! profiling sampling against folding.
//!
//! ```text
//! PARSE_TIME_NS    query text -> parsed aggregate
//! INSERT_TIME_NS   single-record insert path
//! SAMPLE_TIME_NS   sampler execution (cache or tree)
//! FOLD_TIME_NS     parallel aggregation kernel
//! ```
//!
//! Typical benchmarking loop:
//!
//! ```ignore
//! use sampledb::database::timing;
//!
//! timing::reset_timing_stats();
//! for _ in 0..1000 {
//!     scheduler.execute_sum_query("SELECT SUM(amount)", &options);
//! }
//! let (sample_ns, fold_ns) = timing::get_query_timing_stats();
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

static PARSE_TIME_NS: AtomicU64 = AtomicU64::new(0);
static INSERT_TIME_NS: AtomicU64 = AtomicU64::new(0);
static SAMPLE_TIME_NS: AtomicU64 = AtomicU64::new(0);
static FOLD_TIME_NS: AtomicU64 = AtomicU64::new(0);

pub fn reset_timing_stats() {
    PARSE_TIME_NS.store(0, Ordering::Relaxed);
    INSERT_TIME_NS.store(0, Ordering::Relaxed);
    SAMPLE_TIME_NS.store(0, Ordering::Relaxed);
    FOLD_TIME_NS.store(0, Ordering::Relaxed);
}

/// `(parse_ns, insert_ns)`.
pub fn get_timing_stats() -> (u64, u64) {
    (
        PARSE_TIME_NS.load(Ordering::Relaxed),
        INSERT_TIME_NS.load(Ordering::Relaxed),
    )
}

/// `(sample_ns, fold_ns)`.
pub fn get_query_timing_stats() -> (u64, u64) {
    (
        SAMPLE_TIME_NS.load(Ordering::Relaxed),
        FOLD_TIME_NS.load(Ordering::Relaxed),
    )
}

pub(crate) fn record_parse(start: Instant) {
    PARSE_TIME_NS.fetch_add(start.elapsed().as_nanos() as u64, Ordering::Relaxed);
}

pub(crate) fn record_insert(start: Instant) {
    INSERT_TIME_NS.fetch_add(start.elapsed().as_nanos() as u64, Ordering::Relaxed);
}

pub(crate) fn record_sample(start: Instant) {
    SAMPLE_TIME_NS.fetch_add(start.elapsed().as_nanos() as u64, Ordering::Relaxed);
}

pub(crate) fn record_fold(start: Instant) {
    FOLD_TIME_NS.fetch_add(start.elapsed().as_nanos() as u64, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        // Counters are global and other tests add to them concurrently, so
        // only monotone-safe assertions are possible here.
        let start = Instant::now();
        std::thread::sleep(std::time::Duration::from_millis(1));
        record_insert(start);

        let (_, insert_ns) = get_timing_stats();
        assert!(insert_ns >= 1_000_000);
    }
}
