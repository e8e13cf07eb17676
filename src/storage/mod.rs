//! # Storage Layer
//!
//! Two concerns live here:
//!
//! - [`leaf_cache`]: the flat in-memory snapshot of the leaf chain that
//!   gives index-based samplers O(1) record access;
//! - [`checkpoint`]: the opaque save/restore format written on close and
//!   read (via mmap) on open.

pub mod checkpoint;
pub mod leaf_cache;

pub use checkpoint::{load, save, LoadedCheckpoint};
pub use leaf_cache::LeafCache;
