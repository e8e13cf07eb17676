//! # Database Implementation
//!
//! The `Database` owns the tree, the flat leaf cache, and the backing path,
//! and is the single synchronization boundary of the engine:
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ Database                                     │
//! │   RwLock<BPlusTree>   RwLock<LeafCache>      │
//! │        │                    │                │
//! │  shared: sampling,    shared: index reads    │
//! │          scans        exclusive: rebuild     │
//! │  exclusive: insert,                          │
//! │             load                             │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Sampling and aggregation take the tree lock in shared mode; insertion
//! and load take it exclusively. The cache is rebuilt either eagerly every
//! `CACHE_REBUILD_INTERVAL` insertions or lazily by the next sampler call,
//! always under its write lock, so readers see the previous snapshot or the
//! new one and never a half-built one.
//!
//! ## Lifecycle
//!
//! `create` starts an empty database bound to a path; `open` loads a
//! checkpoint and rebuilds the tree by sorted bulk insertion; `close`
//! writes a checkpoint and marks the handle closed. Dropping an open
//! database performs a best-effort checkpoint. `in_memory` skips the
//! backing file entirely (nothing is written on close).

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use eyre::{bail, Result, WrapErr};
use parking_lot::{RwLock, RwLockWriteGuard};

use super::timing;
use crate::btree::BPlusTree;
use crate::config::CACHE_REBUILD_INTERVAL;
use crate::exec::{fold_records, fold_region_stride, AmountFilter, CancelToken, Reduction};
use crate::record::{Record, RECORD_SIZE};
use crate::sample::{sample_tree, Sampler};
use crate::storage::{self, LeafCache};

#[derive(Debug)]
pub struct Database {
    path: Option<PathBuf>,
    tree: RwLock<BPlusTree>,
    cache: RwLock<LeafCache>,
    closed: AtomicBool,
}

impl Database {
    /// Creates an empty database bound to `path`. The checkpoint file is
    /// written on close, not here.
    pub fn create(path: impl AsRef<Path>) -> Self {
        Self {
            path: Some(path.as_ref().to_path_buf()),
            tree: RwLock::new(BPlusTree::new()),
            cache: RwLock::new(LeafCache::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Creates an empty database with no backing file.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            tree: RwLock::new(BPlusTree::new()),
            cache: RwLock::new(LeafCache::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Opens a checkpoint and rebuilds the tree from it. The leaf cache
    /// starts invalid and is materialized by the first sample.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let loaded = storage::load(path)
            .wrap_err_with(|| format!("cannot open database at {}", path.display()))?;

        let mut tree = BPlusTree::new();
        tree.insert_batch(loaded.records);

        Ok(Self {
            path: Some(path.to_path_buf()),
            tree: RwLock::new(tree),
            cache: RwLock::new(LeafCache::new()),
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            bail!("database is closed");
        }
        Ok(())
    }

    /// Writes a checkpoint and marks the handle closed. Further calls fail
    /// with a state error; closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if self.path.is_some() {
            self.write_checkpoint()
        } else {
            Ok(())
        }
    }

    /// Flushes the current contents to the backing file.
    pub fn checkpoint(&self) -> Result<()> {
        self.ensure_open()?;
        self.write_checkpoint()
    }

    fn write_checkpoint(&self) -> Result<()> {
        let Some(path) = &self.path else {
            bail!("database has no backing file");
        };
        let tree = self.tree.read();
        let records = tree.collect_leaf_records();
        storage::save(path, &records, tree.height())
    }

    // ------------------------------------------------------------------
    // Ingest
    // ------------------------------------------------------------------

    pub fn insert(&self, record: Record) -> Result<()> {
        self.ensure_open()?;
        let start = Instant::now();

        let mut tree = self.tree.write();
        tree.insert(record);
        if tree.len() % CACHE_REBUILD_INTERVAL == 0 {
            let records = tree.collect_leaf_records();
            drop(tree);
            self.cache.write().install(records);
        } else {
            drop(tree);
            self.cache.write().invalidate();
        }

        timing::record_insert(start);
        Ok(())
    }

    /// Sorted bulk insertion; rebuilds the cache once at the end instead of
    /// at the periodic cadence.
    pub fn insert_batch(&self, records: Vec<Record>) -> Result<()> {
        self.ensure_open()?;
        let start = Instant::now();

        let mut tree = self.tree.write();
        tree.insert_batch(records);
        let snapshot = tree.collect_leaf_records();
        drop(tree);
        self.cache.write().install(snapshot);

        timing::record_insert(start);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Leaf cache
    // ------------------------------------------------------------------

    /// Runs `f` over a valid cache snapshot, rebuilding it first if a
    /// mutation invalidated it.
    fn with_cache<R>(&self, f: impl FnOnce(&[Record]) -> R) -> Result<R> {
        self.ensure_open()?;
        {
            let cache = self.cache.read();
            if cache.is_valid() {
                return Ok(f(cache.records()));
            }
        }

        let records = self.tree.read().collect_leaf_records();
        let mut cache = self.cache.write();
        cache.install(records);
        let cache = RwLockWriteGuard::downgrade(cache);
        Ok(f(cache.records()))
    }

    /// Exact fold over the whole population, used by the scheduler's exact
    /// path and for group discovery.
    pub(crate) fn exact_reduction(&self, filter: Option<AmountFilter>) -> Result<Reduction> {
        self.with_cache(|records| fold_records(records, filter, 1))
    }

    /// Snapshot of every record in leaf order.
    pub(crate) fn all_records(&self) -> Result<Vec<Record>> {
        self.with_cache(|records| records.to_vec())
    }

    /// Forces a cache rebuild now.
    pub fn refresh_cache(&self) -> Result<()> {
        self.ensure_open()?;
        let records = self.tree.read().collect_leaf_records();
        self.cache.write().install(records);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Exact aggregates
    // ------------------------------------------------------------------

    pub fn sum(&self) -> Result<f64> {
        self.with_cache(|records| fold_records(records, None, 1).sum)
    }

    pub fn count(&self) -> Result<u64> {
        self.ensure_open()?;
        Ok(self.tree.read().len())
    }

    pub fn avg(&self) -> Result<f64> {
        let count = self.count()?;
        if count == 0 {
            return Ok(0.0);
        }
        Ok(self.sum()? / count as f64)
    }

    pub fn sum_where(&self, min_amount: f64, max_amount: f64) -> Result<f64> {
        let filter = AmountFilter::new(min_amount, max_amount);
        self.with_cache(|records| fold_records(records, Some(filter), 1).sum)
    }

    // ------------------------------------------------------------------
    // Approximate aggregates
    // ------------------------------------------------------------------

    pub fn approx_sum(&self, sample_percent: f64, num_threads: usize) -> Result<f64> {
        if sample_percent <= 0.0 || sample_percent >= 100.0 {
            return self.sum();
        }
        let reduction = self.sampled_reduction(sample_percent, num_threads, None)?;
        Ok(reduction.sum * 100.0 / sample_percent)
    }

    pub fn approx_count(&self, sample_percent: f64, num_threads: usize) -> Result<u64> {
        if sample_percent <= 0.0 || sample_percent >= 100.0 {
            return self.count();
        }
        let reduction = self.sampled_reduction(sample_percent, num_threads, None)?;
        Ok((reduction.count as f64 * 100.0 / sample_percent) as u64)
    }

    pub fn approx_avg(&self, sample_percent: f64, num_threads: usize) -> Result<f64> {
        if sample_percent <= 0.0 || sample_percent >= 100.0 {
            return self.avg();
        }
        let reduction = self.sampled_reduction(sample_percent, num_threads, None)?;
        Ok(reduction.mean().unwrap_or(0.0))
    }

    pub fn approx_sum_where(
        &self,
        min_amount: f64,
        max_amount: f64,
        sample_percent: f64,
        num_threads: usize,
    ) -> Result<f64> {
        if sample_percent <= 0.0 || sample_percent >= 100.0 {
            return self.sum_where(min_amount, max_amount);
        }
        let filter = AmountFilter::new(min_amount, max_amount);
        let reduction = self.sampled_reduction(sample_percent, num_threads, Some(filter))?;
        Ok(reduction.sum * 100.0 / sample_percent)
    }

    fn sampled_reduction(
        &self,
        sample_percent: f64,
        num_threads: usize,
        filter: Option<AmountFilter>,
    ) -> Result<Reduction> {
        let sample = self.sample(&Sampler::default(), sample_percent)?;
        let start = Instant::now();
        let reduction = fold_records(&sample, filter, num_threads);
        timing::record_fold(start);
        Ok(reduction)
    }

    // ------------------------------------------------------------------
    // Sampler primitives
    // ------------------------------------------------------------------

    /// Draws a sample with the given strategy. Index-based strategies read
    /// the flat cache (rebuilding it if stale); the tree-walk strategy
    /// refreshes the subtree rollups and descends the tree instead.
    pub fn sample(&self, sampler: &Sampler, sample_percent: f64) -> Result<Vec<Record>> {
        self.sample_cancellable(sampler, sample_percent, &CancelToken::new())
    }

    pub fn sample_cancellable(
        &self,
        sampler: &Sampler,
        sample_percent: f64,
        cancel: &CancelToken,
    ) -> Result<Vec<Record>> {
        self.ensure_open()?;
        let start = Instant::now();

        let bag = match sampler {
            Sampler::TreeWalk => {
                let mut tree = self.tree.write();
                tree.update_subtree_counts();
                let tree = RwLockWriteGuard::downgrade(tree);
                sample_tree(&tree, sample_percent)
            }
            _ => self.with_cache(|records| {
                sampler.sample_slice(records, sample_percent, cancel)
            })?,
        };

        timing::record_sample(start);
        Ok(bag)
    }

    /// The fused sample-and-fold path: region-partitioned workers stride
    /// over the cache and fold directly, skipping the intermediate sample
    /// vector. Returns the raw reduction; callers scale it exactly once.
    pub fn fold_region_stride(
        &self,
        sample_percent: f64,
        num_threads: usize,
        filter: Option<AmountFilter>,
        seed: u64,
    ) -> Result<Reduction> {
        let start = Instant::now();
        let reduction = self.with_cache(|records| {
            fold_region_stride(records, sample_percent, num_threads, filter, seed)
        })?;
        timing::record_fold(start);
        Ok(reduction)
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    pub fn total_records(&self) -> u64 {
        self.tree.read().len()
    }

    pub fn tree_height(&self) -> u32 {
        self.tree.read().height()
    }

    pub fn node_count(&self) -> usize {
        self.tree.read().node_count()
    }

    pub fn estimated_size_mb(&self) -> f64 {
        (self.total_records() as usize * RECORD_SIZE) as f64 / (1024.0 * 1024.0)
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::Acquire) && self.path.is_some() {
            let _ = self.write_checkpoint();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(id: i64) -> Record {
        Record::new(id, id as f64, (id % 4) as i32, (id % 3) as i32, id)
    }

    #[test]
    fn exact_aggregates_on_small_dataset() {
        let db = Database::in_memory();
        for id in [1, 2, 3, 4] {
            db.insert(Record::new(id, id as f64 * 10.0, 0, 0, 0)).unwrap();
        }

        assert_eq!(db.sum().unwrap(), 100.0);
        assert_eq!(db.count().unwrap(), 4);
        assert_eq!(db.avg().unwrap(), 25.0);
        assert_eq!(db.sum_where(15.0, 35.0).unwrap(), 50.0);
    }

    #[test]
    fn empty_database_aggregates_are_zero() {
        let db = Database::in_memory();
        assert_eq!(db.sum().unwrap(), 0.0);
        assert_eq!(db.count().unwrap(), 0);
        assert_eq!(db.avg().unwrap(), 0.0);
        assert_eq!(db.approx_sum(10.0, 4).unwrap(), 0.0);
    }

    #[test]
    fn approx_sum_scales_the_sample() {
        let db = Database::in_memory();
        db.insert_batch((1..=10_000).map(record).collect()).unwrap();

        let exact = db.sum().unwrap();
        let approx = db.approx_sum(10.0, 4).unwrap();
        let error = (approx - exact).abs() / exact;
        assert!(error < 0.05, "error {error} too large");
    }

    #[test]
    fn approx_count_scales_the_sample() {
        let db = Database::in_memory();
        db.insert_batch((1..=5_000).map(record).collect()).unwrap();

        let approx = db.approx_count(10.0, 4).unwrap();
        assert!((4500..=5500).contains(&approx), "{approx}");
    }

    #[test]
    fn approx_with_full_percent_is_exact() {
        let db = Database::in_memory();
        db.insert_batch((1..=500).map(record).collect()).unwrap();

        assert_eq!(db.approx_count(100.0, 4).unwrap(), db.count().unwrap());
        assert_eq!(db.approx_sum(100.0, 4).unwrap(), db.sum().unwrap());
    }

    #[test]
    fn closed_database_rejects_operations() {
        let db = Database::in_memory();
        db.insert(record(1)).unwrap();
        db.close().unwrap();

        assert!(db.insert(record(2)).is_err());
        assert!(db.sum().is_err());
        assert!(db.sample(&Sampler::default(), 10.0).is_err());
        // Closing twice is fine.
        db.close().unwrap();
    }

    #[test]
    fn checkpoint_round_trip_preserves_aggregates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db.chk");

        let db = Database::create(&path);
        db.insert_batch((1..=2_000).map(record).collect()).unwrap();
        let exact_sum = db.sum().unwrap();
        let exact_count = db.count().unwrap();
        db.close().unwrap();

        let reopened = Database::open(&path).unwrap();
        assert_eq!(reopened.sum().unwrap(), exact_sum);
        assert_eq!(reopened.count().unwrap(), exact_count);
    }

    #[test]
    fn open_missing_path_is_an_io_error() {
        let dir = tempdir().unwrap();
        assert!(Database::open(dir.path().join("missing.chk")).is_err());
    }

    #[test]
    fn sampler_primitives_work_through_the_database() {
        let db = Database::in_memory();
        db.insert_batch((1..=10_000).map(record).collect()).unwrap();

        for sampler in [
            Sampler::Systematic,
            Sampler::random(),
            Sampler::TreeWalk,
            Sampler::block(),
        ] {
            let bag = db.sample(&sampler, 10.0).unwrap();
            assert!(
                bag.len() >= 500 && bag.len() <= 1500,
                "{sampler:?}: {}",
                bag.len()
            );
        }
    }

    #[test]
    fn region_stride_fold_matches_expected_scale() {
        let db = Database::in_memory();
        db.insert_batch((1..=10_000).map(record).collect()).unwrap();

        let reduction = db.fold_region_stride(10.0, 4, None, 42).unwrap();
        let estimate = reduction.sum * 10.0;
        let exact = db.sum().unwrap();
        assert!((estimate - exact).abs() / exact < 0.1);
    }

    #[test]
    fn introspection_reports_tree_shape() {
        let db = Database::in_memory();
        db.insert_batch((1..=1_000).map(record).collect()).unwrap();

        assert_eq!(db.total_records(), 1000);
        assert!(db.tree_height() >= 2);
        assert!(db.node_count() > 1);
        let expected_mb = (1000 * RECORD_SIZE) as f64 / (1024.0 * 1024.0);
        assert!((db.estimated_size_mb() - expected_mb).abs() < 1e-9);
    }

    #[test]
    fn concurrent_sampling_under_shared_lock() {
        let db = std::sync::Arc::new(Database::in_memory());
        db.insert_batch((1..=10_000).map(record).collect()).unwrap();

        std::thread::scope(|scope| {
            for _ in 0..4 {
                let db = std::sync::Arc::clone(&db);
                scope.spawn(move || {
                    let bag = db.sample(&Sampler::Systematic, 10.0).unwrap();
                    assert_eq!(bag.len(), 1000);
                });
            }
        });
    }
}
