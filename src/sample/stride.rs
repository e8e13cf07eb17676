//! # Pointer / Stride Samplers
//!
//! The systematic family: a slow pointer walking the cache at the base
//! stride, a fast pointer at a multiplied stride, the dual-pointer
//! combination of both, and the phase-randomized variants. All of them are
//! plain index arithmetic over the flat cache.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::stride_for;
use crate::config::DUAL_FAST_MULTIPLIER;
use crate::record::{Record, RECORD_SIZE};

/// Slow pointer: indices `0, stride, 2*stride, ...` until the target.
pub(super) fn systematic(records: &[Record], target: usize) -> Vec<Record> {
    let stride = stride_for(records.len(), target);
    let mut bag = Vec::with_capacity(target);
    let mut i = 0;
    while i < records.len() && bag.len() < target {
        bag.push(records[i]);
        i += stride;
    }
    bag
}

/// Fast pointer: the systematic stride multiplied by `step_factor`, trading
/// sample count for coverage per step.
pub(super) fn fast_pointer(records: &[Record], target: usize, step_factor: usize) -> Vec<Record> {
    let stride = stride_for(records.len(), target) * step_factor.max(1);
    let mut bag = Vec::with_capacity(target / step_factor.max(1) + 1);
    let mut i = 0;
    while i < records.len() && bag.len() < target {
        bag.push(records[i]);
        i += stride;
    }
    bag
}

/// Two interleaved systematic passes: a fast stream takes a third of the
/// target at triple stride, a slow stream starts half a fast stride in and
/// fills the rest. Local drift shows up as disagreement between the two.
pub(super) fn dual_pointer(records: &[Record], target: usize) -> Vec<Record> {
    let total = records.len();
    let fast_target = target / 3;
    let slow_target = target - fast_target;

    let mut bag = Vec::with_capacity(target);

    let fast_stride = stride_for(total, fast_target) * DUAL_FAST_MULTIPLIER;
    let mut i = 0;
    while i < total && bag.len() < fast_target {
        bag.push(records[i]);
        i += fast_stride;
    }

    let slow_stride = stride_for(total, slow_target);
    let mut i = fast_stride / 2;
    while i < total && bag.len() < target {
        bag.push(records[i]);
        i += slow_stride;
    }

    bag
}

/// Uniform random phase, then every `nth` record, wrapping once to the
/// indices below the start until the target is met.
pub(super) fn random_start_nth(
    records: &[Record],
    target: usize,
    nth: usize,
    seed: u64,
) -> Vec<Record> {
    let total = records.len();
    let step = nth.max(1);
    let mut rng = StdRng::seed_from_u64(seed);
    let start = rng.gen_range(0..total);

    let mut bag = Vec::with_capacity(target);
    let mut i = start;
    while i < total && bag.len() < target {
        bag.push(records[i]);
        i += step;
    }
    let mut i = 0;
    while i < start && bag.len() < target {
        bag.push(records[i]);
        i += step;
    }
    bag
}

/// Fixed stride from a random offset within the first stride window. With
/// `stride_bytes == 0` the stride is derived from the target; otherwise it
/// is `stride_bytes` converted to whole records.
pub(super) fn memory_stride(
    records: &[Record],
    target: usize,
    stride_bytes: usize,
    seed: u64,
) -> Vec<Record> {
    let total = records.len();
    let stride = if stride_bytes == 0 {
        stride_for(total, target)
    } else {
        (stride_bytes / RECORD_SIZE).max(1)
    };

    let mut rng = StdRng::seed_from_u64(seed);
    let offset = rng.gen_range(0..stride);

    let mut bag = Vec::with_capacity(target);
    let mut i = offset;
    while i < total && bag.len() < target {
        bag.push(records[i]);
        i += stride;
    }
    bag
}
