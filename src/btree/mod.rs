//! # B+Tree Index
//!
//! An in-memory B+ tree keyed by the 64-bit record id. All records live in
//! leaf nodes; internal nodes hold separator keys only; leaves are linked in
//! a forward chain so a full scan never re-descends the tree.
//!
//! ## Node Storage
//!
//! Nodes are arena-allocated in a `Vec` and addressed by index ([`NodeId`]).
//! Parents own their children structurally; the leaf chain link is a
//! non-owning sibling index. There are no reference cycles and no shared
//! ownership.
//!
//! ```text
//!                    [Internal]
//!                    /    |    \
//!            [Leaf]   [Leaf]   [Leaf]
//!               |------->|------->|-----> None   (forward chain)
//! ```
//!
//! ## Subtree Count Rollups
//!
//! Each node caches the number of records beneath it. The rollup is
//! refreshed by an explicit post-order pass (`update_subtree_counts`) before
//! count-proportional tree sampling; between passes it is an upper bound.
//!
//! ## Concurrency
//!
//! The tree itself is single-writer and relies on the database-level
//! reader-writer lock: sampling holds it shared, structural mutation holds
//! it exclusively.

mod node;
mod tree;

pub use node::{Node, NodeId};
pub use tree::BPlusTree;
