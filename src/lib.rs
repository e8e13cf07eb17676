//! # sampledb - Approximate Query Engine
//!
//! An in-memory sampling storage engine for single-table analytical
//! aggregations. Queries trade exactness for latency: the engine evaluates
//! `SUM`, `COUNT`, or `AVG` over a statistically chosen subset of rows,
//! scales the result to the population, and returns both a point estimate
//! and a 95% confidence interval.
//!
//! ## Quick Start
//!
//! ```ignore
//! use sampledb::{Database, QueryOptions, Scheduler};
//!
//! let scheduler = Scheduler::create("./sales.chk");
//! scheduler.insert_record(1, 125.0, 2, 17, 1_700_000_000)?;
//!
//! let options = QueryOptions::default()
//!     .with_sample_percent(10.0)
//!     .with_threads(4);
//! let result = scheduler.execute_sum_query("SELECT SUM(amount)", &options);
//! println!("{} ± {}", result.value, result.error_margin);
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │        Scheduler (query façade)           │
//! ├───────────────────────────────────────────┤
//! │   Query Text Layer (lexer / parser)       │
//! ├───────────────────────────────────────────┤
//! │ Sampler Family │ Parallel Aggregation     │
//! │                │ Kernel + Scaler          │
//! ├───────────────────────────────────────────┤
//! │   Leaf Cache (flat record snapshot)       │
//! ├───────────────────────────────────────────┤
//! │   B+Tree Index (arena nodes, leaf chain)  │
//! ├───────────────────────────────────────────┤
//! │   Checkpoint (save / mmap load)           │
//! └───────────────────────────────────────────┘
//! ```
//!
//! Data flows top-down: the scheduler extracts the aggregate and predicate
//! from the query text, asks the database for a sample (through the leaf
//! cache when warm), folds it in parallel into `(count, sum, sum_sq)`, and
//! scales the fold to a population estimate with a CLT confidence interval.
//!
//! ## Module Overview
//!
//! - [`btree`]: B+tree keyed by record id, forward-linked leaf chain
//! - [`storage`]: flat leaf cache and the checkpoint format
//! - [`sample`]: the closed family of sampling strategies
//! - [`exec`]: parallel fold kernel, cancellation, statistical scaler
//! - [`sql`]: the aggregate query dialect
//! - [`database`]: lifecycle, ingest, exact/approximate aggregates
//! - [`scheduler`]: public query entry points returning `ValidationResult`

pub mod btree;
pub mod config;
pub mod database;
pub mod exec;
pub mod record;
pub mod sample;
pub mod scheduler;
pub mod sql;
pub mod storage;

pub use database::Database;
pub use exec::{Aggregate, AmountFilter, CancelToken, Reduction, Status};
pub use record::{Record, RECORD_SIZE};
pub use sample::{CltParams, Sampler};
pub use scheduler::{BenchmarkResults, GroupedResults, QueryOptions, Scheduler, ValidationResult};
