//! # Database Module
//!
//! The high-level `Database` API: lifecycle (create/open/close with a
//! checkpoint), ingest, exact and approximate aggregates, the sampler
//! primitives exposed for benchmarking, and introspection. The database is
//! the only synchronization boundary of the engine, with one reader-writer lock
//! over the tree, one over the leaf cache.
//!
//! [`timing`] carries the global atomic timing counters used to profile the
//! sampling and folding hot paths.

#[allow(clippy::module_inception)]
mod database;
pub mod timing;

pub use database::Database;
