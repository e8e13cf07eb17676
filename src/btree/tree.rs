//! # B+Tree Implementation
//!
//! Ordered insertion over arena-allocated nodes with a forward-linked leaf
//! chain. All records live in leaves; internal nodes carry separator keys
//! only. The tree grows by splitting and never shrinks (the engine has no
//! deletes; a reload rebuilds from scratch).
//!
//! ## Insert Algorithm
//!
//! ```text
//! 1. Descend from the root, recording (parent, child index) on a path stack
//! 2. Insert into the leaf at the key's lower bound (duplicates allowed)
//! 3. If the leaf reached MAX_KEYS: split at the midpoint, link the new leaf
//!    into the chain, promote a copy of its first key
//! 4. Walk the path stack upward inserting separators; split internal nodes
//!    that reach MAX_KEYS (the middle key moves up)
//! 5. If the root split, allocate a new internal root and grow the height
//! ```
//!
//! ## Ordering Invariants
//!
//! - Keys within a node are non-decreasing.
//! - For an internal node with keys `k0..kn-1` and children `c0..cn`, every
//!   key in `ci` is `< ki` and every key in `ci+1` is `>= ki`.
//! - Leaves form a singly-linked chain in ascending key order ending at
//!   `None`.
//!
//! ## Thread Safety
//!
//! The tree is not internally synchronized. The owning database wraps it in
//! a reader-writer lock: sampling and scans hold it shared, insertion and
//! load hold it exclusively.

use smallvec::SmallVec;

use super::node::{Node, NodeId};
use crate::config::{MAX_KEYS, SPLIT_POINT};
use crate::record::Record;

#[derive(Debug)]
pub struct BPlusTree {
    nodes: Vec<Node>,
    root: NodeId,
    total_records: u64,
    height: u32,
}

impl Default for BPlusTree {
    fn default() -> Self {
        Self::new()
    }
}

impl BPlusTree {
    /// Creates an empty tree with a single leaf root.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new_leaf()],
            root: NodeId(0),
            total_records: 0,
            height: 1,
        }
    }

    pub fn len(&self) -> u64 {
        self.total_records
    }

    pub fn is_empty(&self) -> bool {
        self.total_records == 0
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    /// Inserts a record at the lower bound of its key. Duplicate ids are
    /// allowed and land before existing equal keys.
    pub fn insert(&mut self, record: Record) {
        let mut path: SmallVec<[(NodeId, usize); 8]> = SmallVec::new();
        let mut current = self.root;

        loop {
            let node = &self.nodes[current.index()];
            if node.is_leaf {
                break;
            }
            let child_idx = node.keys.partition_point(|&k| k <= record.id);
            path.push((current, child_idx));
            current = node.children[child_idx];
        }

        let leaf = &mut self.nodes[current.index()];
        let pos = leaf.keys.partition_point(|&k| k < record.id);
        leaf.keys.insert(pos, record.id);
        leaf.records.insert(pos, record);
        self.total_records += 1;

        if self.nodes[current.index()].keys.len() < MAX_KEYS {
            return;
        }

        let mut left = current;
        let mut pending = Some(self.split_leaf(current));

        while let Some((separator, right)) = pending.take() {
            match path.pop() {
                Some((parent, child_idx)) => {
                    let node = &mut self.nodes[parent.index()];
                    node.keys.insert(child_idx, separator);
                    node.children.insert(child_idx + 1, right);
                    if node.keys.len() >= MAX_KEYS {
                        pending = Some(self.split_internal(parent));
                        left = parent;
                    }
                }
                None => {
                    let mut new_root = Node::new_internal();
                    new_root.keys.push(separator);
                    new_root.children.push(left);
                    new_root.children.push(right);
                    self.root = self.alloc(new_root);
                    self.height += 1;
                }
            }
        }
    }

    /// Sorts by id, then single-inserts. Sorted insertion keeps splits
    /// right-leaning and leaf occupancy predictable; correctness does not
    /// depend on it.
    pub fn insert_batch(&mut self, mut records: Vec<Record>) {
        records.sort_by_key(|r| r.id);
        for record in records {
            self.insert(record);
        }
    }

    /// Splits a full leaf at the midpoint. The second half moves to a new
    /// right sibling which is linked into the chain; a copy of its first
    /// key is returned for promotion.
    fn split_leaf(&mut self, leaf: NodeId) -> (i64, NodeId) {
        let new_id = NodeId(self.nodes.len() as u32);

        let node = &mut self.nodes[leaf.index()];
        let right_keys = node.keys.split_off(SPLIT_POINT);
        let right_records = node.records.split_off(SPLIT_POINT);
        let old_next = node.next_leaf.replace(new_id);

        let mut right = Node::new_leaf();
        let separator = right_keys[0];
        right.keys = right_keys;
        right.records = right_records;
        right.next_leaf = old_next;
        self.nodes.push(right);

        (separator, new_id)
    }

    /// Splits a full internal node at the midpoint. The middle key moves up
    /// and is retained by neither half.
    fn split_internal(&mut self, internal: NodeId) -> (i64, NodeId) {
        let new_id = NodeId(self.nodes.len() as u32);

        let node = &mut self.nodes[internal.index()];
        let right_keys = node.keys.split_off(SPLIT_POINT + 1);
        let separator = node.keys.pop().expect("internal node splits non-empty");
        let right_children = node.children.split_off(SPLIT_POINT + 1);

        let mut right = Node::new_internal();
        right.keys = right_keys;
        right.children = right_children;
        self.nodes.push(right);

        (separator, new_id)
    }

    /// Leftmost leaf of the chain.
    pub fn first_leaf(&self) -> NodeId {
        let mut current = self.root;
        while !self.nodes[current.index()].is_leaf {
            current = self.nodes[current.index()].children[0];
        }
        current
    }

    /// Walks the leaf chain from the leftmost leaf, producing every record
    /// in ascending id order.
    pub fn collect_leaf_records(&self) -> Vec<Record> {
        let mut records = Vec::with_capacity(self.total_records as usize);
        let mut current = Some(self.first_leaf());
        while let Some(id) = current {
            let node = &self.nodes[id.index()];
            records.extend_from_slice(&node.records);
            current = node.next_leaf;
        }
        records
    }

    /// Recursive enumeration of one subtree, used only for small subtrees.
    pub fn subtree_records(&self, id: NodeId) -> Vec<Record> {
        let node = &self.nodes[id.index()];
        if node.is_leaf {
            return node.records.clone();
        }
        let mut records = Vec::new();
        for &child in &node.children {
            records.extend(self.subtree_records(child));
        }
        records
    }

    /// Post-order rollup setting `subtree_record_count` on every node.
    /// Idempotent: a second pass over an unchanged tree is a no-op.
    pub fn update_subtree_counts(&mut self) {
        self.update_counts(self.root);
    }

    fn update_counts(&mut self, id: NodeId) -> u64 {
        if self.nodes[id.index()].is_leaf {
            let count = self.nodes[id.index()].keys.len() as u64;
            self.nodes[id.index()].subtree_record_count = count;
            return count;
        }
        let children = self.nodes[id.index()].children.clone();
        let mut total = 0u64;
        for child in children {
            total += self.update_counts(child);
        }
        self.nodes[id.index()].subtree_record_count = total;
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: i64) -> Record {
        Record::new(id, id as f64, (id % 4) as i32, (id % 7) as i32, id * 10)
    }

    #[test]
    fn empty_tree_has_single_leaf_root() {
        let tree = BPlusTree::new();
        assert_eq!(tree.len(), 0);
        assert_eq!(tree.height(), 1);
        assert_eq!(tree.node_count(), 1);
        assert!(tree.node(tree.root()).is_leaf());
        assert!(tree.collect_leaf_records().is_empty());
    }

    #[test]
    fn insert_and_walk_single_record() {
        let mut tree = BPlusTree::new();
        tree.insert(record(5));

        let records = tree.collect_leaf_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, 5);
    }

    #[test]
    fn leaf_walk_reproduces_ids_in_order() {
        let mut tree = BPlusTree::new();
        for id in [42, 7, 19, 3, 25, 7, 100, 1] {
            tree.insert(record(id));
        }

        let ids: Vec<i64> = tree.collect_leaf_records().iter().map(|r| r.id).collect();
        let mut expected = vec![42, 7, 19, 3, 25, 7, 100, 1];
        expected.sort_unstable();
        assert_eq!(ids, expected);
        assert_eq!(tree.len(), 8);
    }

    #[test]
    fn duplicate_ids_are_kept() {
        let mut tree = BPlusTree::new();
        for _ in 0..5 {
            tree.insert(record(9));
        }
        assert_eq!(tree.len(), 5);
        assert_eq!(tree.collect_leaf_records().len(), 5);
    }

    #[test]
    fn split_at_max_keys_boundary() {
        let mut tree = BPlusTree::new();
        for id in 0..=(MAX_KEYS as i64) {
            tree.insert(record(id));
        }

        assert_eq!(tree.height(), 2);
        assert_eq!(tree.len(), MAX_KEYS as u64 + 1);

        // The promoted separator must equal the new leaf's first key.
        let root = tree.node(tree.root());
        assert!(!root.is_leaf());
        assert_eq!(root.key_count(), 1);
        let right_leaf = tree.node(root.children()[1]);
        assert_eq!(root.keys[0], right_leaf.keys[0]);

        // Chain integrity: the walk still sees every id in order.
        let ids: Vec<i64> = tree.collect_leaf_records().iter().map(|r| r.id).collect();
        let expected: Vec<i64> = (0..=(MAX_KEYS as i64)).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn reverse_insertion_stays_sorted_across_splits() {
        let mut tree = BPlusTree::new();
        for id in (0..2000).rev() {
            tree.insert(record(id));
        }

        let ids: Vec<i64> = tree.collect_leaf_records().iter().map(|r| r.id).collect();
        let expected: Vec<i64> = (0..2000).collect();
        assert_eq!(ids, expected);
        assert!(tree.height() >= 2);
    }

    #[test]
    fn batch_insert_matches_single_inserts() {
        let mut batched = BPlusTree::new();
        batched.insert_batch((0..1000).rev().map(record).collect());

        let mut single = BPlusTree::new();
        for id in 0..1000 {
            single.insert(record(id));
        }

        assert_eq!(
            batched.collect_leaf_records(),
            single.collect_leaf_records()
        );
    }

    #[test]
    fn total_records_equals_leaf_walk_length() {
        let mut tree = BPlusTree::new();
        for id in 0..5000 {
            tree.insert(record(id * 3 % 971));
        }
        assert_eq!(tree.len() as usize, tree.collect_leaf_records().len());
    }

    #[test]
    fn subtree_counts_roll_up_exactly() {
        let mut tree = BPlusTree::new();
        for id in 0..3000 {
            tree.insert(record(id));
        }
        tree.update_subtree_counts();

        assert_eq!(tree.node(tree.root()).subtree_record_count(), 3000);
        verify_counts(&tree, tree.root());
    }

    fn verify_counts(tree: &BPlusTree, id: NodeId) {
        let node = tree.node(id);
        if node.is_leaf() {
            assert_eq!(node.subtree_record_count(), node.key_count() as u64);
            return;
        }
        let sum: u64 = node
            .children()
            .iter()
            .map(|&c| tree.node(c).subtree_record_count())
            .sum();
        assert_eq!(node.subtree_record_count(), sum);
        for &child in node.children() {
            verify_counts(tree, child);
        }
    }

    #[test]
    fn update_subtree_counts_is_idempotent() {
        let mut tree = BPlusTree::new();
        for id in 0..1500 {
            tree.insert(record(id));
        }
        tree.update_subtree_counts();
        let first: Vec<u64> = (0..tree.node_count())
            .map(|i| tree.node(NodeId(i as u32)).subtree_record_count())
            .collect();

        tree.update_subtree_counts();
        let second: Vec<u64> = (0..tree.node_count())
            .map(|i| tree.node(NodeId(i as u32)).subtree_record_count())
            .collect();

        assert_eq!(first, second);
    }

    #[test]
    fn internal_split_preserves_order() {
        // Enough records to split internal nodes (> MAX_KEYS^2 / 2 entries).
        let mut tree = BPlusTree::new();
        let count = (MAX_KEYS * MAX_KEYS / 2 + MAX_KEYS * 4) as i64;
        for id in 0..count {
            tree.insert(record(id));
        }

        assert!(tree.height() >= 3);
        let ids: Vec<i64> = tree.collect_leaf_records().iter().map(|r| r.id).collect();
        let expected: Vec<i64> = (0..count).collect();
        assert_eq!(ids, expected);
    }
}
