//! # Uniform Random Sampler
//!
//! Draws `T` distinct indices from a seeded PRNG. The only strategy with no
//! systematic structure at all, which makes it the unbiased baseline the
//! others are benchmarked against. Emission is in ascending index order so
//! the cache is walked forward.

use hashbrown::HashSet;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::record::Record;

pub(super) fn uniform(records: &[Record], target: usize, seed: u64) -> Vec<Record> {
    let total = records.len();
    let mut rng = StdRng::seed_from_u64(seed);

    let mut picked: HashSet<usize> = HashSet::with_capacity(target);
    while picked.len() < target && picked.len() < total {
        picked.insert(rng.gen_range(0..total));
    }

    let mut indices: Vec<usize> = picked.into_iter().collect();
    indices.sort_unstable();
    indices.into_iter().map(|i| records[i]).collect()
}
