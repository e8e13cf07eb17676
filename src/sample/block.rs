//! # Block-Family Samplers
//!
//! Strategies that pick whole contiguous runs instead of individual rows:
//! plain blocks, page-sized blocks, stratified blocks over the amount
//! distribution, and variance-adaptive blocks. Contiguous runs preserve
//! local correlation and read the cache sequentially.

use crate::config::ADAPTIVE_VARIANCE_ZONES;
use crate::record::{Record, RECORD_SIZE};

/// Visits every k-th block of `block_size` records and takes the whole
/// block, truncating at the target.
pub(super) fn block(
    records: &[Record],
    target: usize,
    sample_percent: f64,
    block_size: usize,
) -> Vec<Record> {
    let total = records.len();
    let block_size = block_size.max(1);
    let total_blocks = total.div_ceil(block_size);
    let blocks_to_sample = ((total_blocks as f64 * sample_percent / 100.0) as usize).max(1);
    let interval = (total_blocks / blocks_to_sample).max(1);

    let mut bag = Vec::with_capacity(target);
    let mut block_idx = 0;
    while block_idx < total_blocks && bag.len() < target {
        let start = block_idx * block_size;
        let end = (start + block_size).min(total);
        for record in &records[start..end] {
            if bag.len() >= target {
                break;
            }
            bag.push(*record);
        }
        block_idx += interval;
    }
    bag
}

/// Block variant whose block size is one I/O page worth of records.
pub(super) fn page(
    records: &[Record],
    target: usize,
    sample_percent: f64,
    page_bytes: usize,
) -> Vec<Record> {
    let records_per_page = (page_bytes / RECORD_SIZE).max(1);
    block(records, target, sample_percent, records_per_page)
}

/// Sorts a copy by amount, splits it into equal strata (the last takes the
/// remainder), and block-samples inside each stratum. Sampling every value
/// range separately shrinks the variance of the estimate on skewed amounts.
pub(super) fn stratified(
    records: &[Record],
    target: usize,
    sample_percent: f64,
    block_size: usize,
    strata: usize,
) -> Vec<Record> {
    let total = records.len();
    let strata = strata.max(1);
    let block_size = block_size.max(1);

    let mut sorted: Vec<Record> = records.to_vec();
    sorted.sort_by(|a, b| a.amount.total_cmp(&b.amount));

    let stratum_size = (total / strata).max(1);
    let per_stratum = (target / strata).max(1);

    let mut bag = Vec::with_capacity(target);
    for stratum in 0..strata {
        if bag.len() >= target {
            break;
        }
        let start = stratum * stratum_size;
        if start >= total {
            break;
        }
        let end = if stratum == strata - 1 {
            total
        } else {
            (start + stratum_size).min(total)
        };

        let stratum_records = end - start;
        let stratum_blocks = stratum_records.div_ceil(block_size);
        let blocks_to_sample =
            ((stratum_blocks as f64 * sample_percent / 100.0) as usize).max(1);
        let interval = (stratum_blocks / blocks_to_sample).max(1);

        let mut taken = 0;
        let mut block_idx = 0;
        while block_idx < stratum_blocks && taken < per_stratum && bag.len() < target {
            let block_start = start + block_idx * block_size;
            let block_end = (block_start + block_size).min(end);
            for record in &sorted[block_start..block_end] {
                if taken >= per_stratum || bag.len() >= target {
                    break;
                }
                bag.push(*record);
                taken += 1;
            }
            block_idx += interval;
        }
    }
    bag
}

/// Partitions the population into fixed variance zones and sizes blocks
/// inversely to zone variance: volatile regions get small blocks (more of
/// them get visited), flat regions get large ones.
pub(super) fn adaptive(
    records: &[Record],
    target: usize,
    sample_percent: f64,
    min_block: usize,
    max_block: usize,
) -> Vec<Record> {
    let total = records.len();
    let min_block = min_block.max(1);
    let max_block = max_block.max(min_block);
    let zone_size = (total / ADAPTIVE_VARIANCE_ZONES).max(1);

    let mut zone_variances = Vec::with_capacity(ADAPTIVE_VARIANCE_ZONES);
    let mut zone_bounds = Vec::with_capacity(ADAPTIVE_VARIANCE_ZONES);
    let mut start = 0;
    while start < total {
        let end = (start + zone_size).min(total);
        let count = (end - start) as f64;
        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        for record in &records[start..end] {
            sum += record.amount;
            sum_sq += record.amount * record.amount;
        }
        let mean = sum / count;
        zone_variances.push((sum_sq / count - mean * mean).max(0.0));
        zone_bounds.push((start, end));
        start = end;
    }

    let max_variance = zone_variances.iter().copied().fold(0.0f64, f64::max);

    let mut bag = Vec::with_capacity(target);
    for (zone, &(start, end)) in zone_bounds.iter().enumerate() {
        if bag.len() >= target {
            break;
        }
        let ratio = if max_variance > 0.0 {
            zone_variances[zone] / max_variance
        } else {
            0.0
        };
        // High variance shrinks the block toward min_block.
        let zone_block = min_block + ((max_block - min_block) as f64 * (1.0 - ratio)) as usize;

        let mut i = start;
        while i < end && bag.len() < target {
            let run_end = (i + zone_block).min(end);
            let run = run_end - i;
            let take = ((run as f64 * sample_percent / 100.0).ceil() as usize).max(1);
            for record in &records[i..(i + take.min(run))] {
                if bag.len() >= target {
                    break;
                }
                bag.push(*record);
            }
            i = run_end;
        }
    }
    bag
}
