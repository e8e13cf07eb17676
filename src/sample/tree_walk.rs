//! # Count-Proportional Tree Descent Sampler
//!
//! The one strategy that never touches the flat cache: it descends internal
//! nodes distributing the sample target proportionally to each child's
//! `subtree_record_count`, then takes evenly spaced records inside each
//! visited leaf. Useful when the cache is cold and materializing it would
//! cost more than the sample itself.
//!
//! The caller must refresh the rollup counts first; the database does this
//! under its write lock before downgrading to shared mode for the walk.

use crate::btree::{BPlusTree, NodeId};
use crate::record::Record;

use super::target_count;

pub(crate) fn sample_tree(tree: &BPlusTree, sample_percent: f64) -> Vec<Record> {
    if tree.is_empty() || sample_percent <= 0.0 {
        return Vec::new();
    }
    if sample_percent >= 100.0 {
        return tree.collect_leaf_records();
    }

    let total = tree.len() as usize;
    let target = target_count(total, sample_percent);
    if target == 0 {
        return Vec::new();
    }

    let mut bag = Vec::with_capacity(target);
    descend(tree, tree.root(), target, target, &mut bag);
    bag.truncate(target);
    bag
}

fn descend(tree: &BPlusTree, id: NodeId, share: usize, target: usize, bag: &mut Vec<Record>) {
    if share == 0 || bag.len() >= target {
        return;
    }
    let node = tree.node(id);

    if node.is_leaf() {
        let len = node.records().len();
        if len == 0 {
            return;
        }
        let take = share.min(len);
        let step = len as f64 / take as f64;
        for i in 0..take {
            if bag.len() >= target {
                return;
            }
            let index = ((i as f64 * step) as usize).min(len - 1);
            bag.push(node.records()[index]);
        }
        return;
    }

    let subtree_total = node.subtree_record_count();
    if subtree_total == 0 {
        return;
    }
    for &child in node.children() {
        if bag.len() >= target {
            return;
        }
        let child_count = tree.node(child).subtree_record_count();
        if child_count == 0 {
            continue;
        }
        // Ceiling division keeps rounding from starving small subtrees; the
        // global target caps any overshoot.
        let child_share =
            ((share as u64 * child_count + subtree_total - 1) / subtree_total) as usize;
        descend(tree, child, child_share, target, bag);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_of(count: i64) -> BPlusTree {
        let mut tree = BPlusTree::new();
        for id in 0..count {
            tree.insert(Record::new(id, id as f64, 0, 0, 0));
        }
        tree.update_subtree_counts();
        tree
    }

    #[test]
    fn empty_tree_yields_empty_bag() {
        let mut tree = BPlusTree::new();
        tree.update_subtree_counts();
        assert!(sample_tree(&tree, 10.0).is_empty());
    }

    #[test]
    fn full_percent_returns_every_record() {
        let tree = tree_of(1000);
        assert_eq!(sample_tree(&tree, 100.0).len(), 1000);
    }

    #[test]
    fn descent_hits_the_target_within_tolerance() {
        let tree = tree_of(10_000);
        for percent in [1.0, 10.0, 25.0] {
            let target = (10_000.0 * percent / 100.0) as usize;
            let bag = sample_tree(&tree, percent);
            assert!(
                bag.len() >= target / 2 && bag.len() <= target * 3 / 2 + 1,
                "{} outside tolerance around {}",
                bag.len(),
                target
            );
        }
    }

    #[test]
    fn samples_spread_across_the_key_space() {
        let tree = tree_of(10_000);
        let bag = sample_tree(&tree, 5.0);
        assert!(bag.iter().any(|r| r.id < 1000));
        assert!(bag.iter().any(|r| r.id > 9000));
    }

    #[test]
    fn single_leaf_tree_takes_evenly_spaced_records() {
        let tree = tree_of(100);
        let bag = sample_tree(&tree, 10.0);
        assert_eq!(bag.len(), 10);
        let ids: Vec<i64> = bag.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![0, 10, 20, 30, 40, 50, 60, 70, 80, 90]);
    }
}
