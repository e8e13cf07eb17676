//! # Flat Leaf Cache
//!
//! A contiguous snapshot of every record in leaf-chain order. The cache is
//! the engine's O(1) random-access substrate: with a fixed 32-byte record
//! layout, sample index `i` is the slice element `records[i]`, which is the
//! address `base + i * RECORD_SIZE`. Every index-based sampler reads from
//! it.
//!
//! ## Validity Protocol
//!
//! The cache carries a `valid` flag owned by the database:
//!
//! - any tree mutation invalidates it,
//! - every `CACHE_REBUILD_INTERVAL` insertions it is rebuilt eagerly,
//! - an invalid cache is rebuilt lazily by the next sampler call,
//! - `Database::refresh_cache` rebuilds it on demand.
//!
//! Rebuilds happen with the tree lock held shared and the cache lock held
//! exclusively, so readers observe either the previous snapshot or the new
//! one, never a half-built one.

use crate::record::Record;

#[derive(Debug, Default)]
pub struct LeafCache {
    records: Vec<Record>,
    valid: bool,
}

impl LeafCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    /// Installs a fresh snapshot, replacing whatever was there.
    pub fn install(&mut self, records: Vec<Record>) {
        self.records = records;
        self.valid = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_cache_is_invalid_and_empty() {
        let cache = LeafCache::new();
        assert!(!cache.is_valid());
        assert!(cache.is_empty());
    }

    #[test]
    fn install_validates_and_invalidate_clears_flag_only() {
        let mut cache = LeafCache::new();
        cache.install(vec![Record::new(1, 1.0, 0, 0, 0)]);
        assert!(cache.is_valid());
        assert_eq!(cache.len(), 1);

        cache.invalidate();
        assert!(!cache.is_valid());
        // Stale records remain readable until the next install.
        assert_eq!(cache.len(), 1);
    }
}
