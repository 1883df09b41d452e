//! The B+Tree engine: ordered multimap over a paged record file.

use std::path::Path;

use grove_cache::NodeCache;
use grove_common::{FixedCodec, GroveError, Result, TreeConfig};
use grove_store::RecordFile;
use tracing::{debug, trace};

use crate::node::{Entry, Node};
use crate::order::NodeOrder;

/// Header slots reserved at the front of the tree file.
const HEADER_SLOTS: usize = 4;

/// Header slot holding the root node's record ordinal.
const ROOT_SLOT: usize = 2;

/// What an insertion into a subtree produced.
enum InsertOutcome<K, V> {
    /// The exact pair was already present; nothing changed.
    Duplicate,
    /// Inserted without overflowing this subtree's root.
    Done,
    /// The subtree's root split. `separator` is the first pair of the new
    /// right sibling's subtree and `right` its record ordinal; the caller
    /// must thread both into itself.
    Split { separator: Entry<K, V>, right: u32 },
}

/// Structural summary produced by [`BPlusTree::verify_invariants`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeStats {
    /// Total (key, value) pairs stored.
    pub entries: u64,
    /// Number of levels from root to leaf; 1 for a lone root leaf.
    pub depth: usize,
    /// Number of leaf nodes.
    pub leaves: usize,
    /// Total nodes reachable from the root.
    pub nodes: usize,
}

/// A disk-resident ordered multimap.
///
/// Pairs order by key, then by value; equal keys coexist, and inserting an
/// exact (key, value) pair that is already present is a no-op. All node
/// reads and writes go through a fixed-capacity write-through [`NodeCache`],
/// so the file is always current and the tree survives reopen.
///
/// Freed node records are never reclaimed; [`BPlusTree::clear`] truncates
/// the file and is the only way space is returned.
pub struct BPlusTree<K, V> {
    cache: NodeCache<Node<K, V>>,
    /// Root record ordinal; a root node always exists, starting life as an
    /// empty leaf.
    root: u32,
    order: NodeOrder,
}

impl<K, V> BPlusTree<K, V>
where
    K: FixedCodec + Ord + Clone,
    V: FixedCodec + Ord + Clone,
{
    /// Opens (or creates) the tree file at `path`.
    ///
    /// The node capacity is derived from `config.page_budget` and the
    /// serialized sizes of `K` and `V`; reopening an existing file with a
    /// different budget or different types is undefined and will surface as
    /// corruption.
    pub fn open(path: impl AsRef<Path>, config: &TreeConfig) -> Result<Self> {
        let order = NodeOrder::for_page_budget(config.page_budget, K::SIZE, V::SIZE)?;
        let store = RecordFile::open(
            path.as_ref(),
            HEADER_SLOTS,
            order.record_size(),
            config.fsync_enabled,
        )?;

        let mut cache = NodeCache::new(store, config.cache_slots);
        let root = if cache.store().record_count() == 0 {
            // Fresh file: the tree starts as one empty root leaf.
            let pos = cache.append(&Node::new_leaf())?;
            cache.store().set_header_slot(ROOT_SLOT, pos)?;
            pos
        } else {
            cache.store().header_slot(ROOT_SLOT)?
        };

        debug!(
            path = %path.as_ref().display(),
            order = order.order,
            record_size = order.record_size(),
            root,
            "opened tree"
        );

        Ok(Self { cache, root, order })
    }

    /// Inserts the pair, returning `false` if it was already present.
    pub fn insert(&mut self, key: K, value: V) -> Result<bool> {
        let entry = Entry { key, value };
        let root = self.root;

        match self.insert_rec(root, &entry)? {
            InsertOutcome::Duplicate => Ok(false),
            InsertOutcome::Done => Ok(true),
            InsertOutcome::Split { separator, right } => {
                let mut new_root = Node::new_internal();
                new_root.entries.push(separator);
                new_root.children.push(root);
                new_root.children.push(right);
                let pos = self.cache.append(&new_root)?;
                self.set_root(pos)?;
                trace!(root = pos, "grew tree by one level");
                Ok(true)
            }
        }
    }

    fn insert_rec(&mut self, pos: u32, entry: &Entry<K, V>) -> Result<InsertOutcome<K, V>> {
        let mut node = self.cache.get(pos)?;

        if node.is_leaf {
            let idx = node.entries.partition_point(|e| e < entry);
            if node.entries.get(idx) == Some(entry) {
                return Ok(InsertOutcome::Duplicate);
            }
            node.entries.insert(idx, entry.clone());

            if node.entries.len() <= self.order.max_entries {
                self.cache.put(pos, &node)?;
                return Ok(InsertOutcome::Done);
            }

            // Overflow: the right half moves to a fresh leaf threaded after
            // this one; the separator is its first pair.
            let mid = node.entries.len() / 2;
            let mut right = Node::new_leaf();
            right.entries = node.entries.split_off(mid);
            right.next = node.next;
            let separator = right.entries[0].clone();

            let right_pos = self.cache.append(&right)?;
            node.next = Some(right_pos);
            self.cache.put(pos, &node)?;

            trace!(left = pos, right = right_pos, "split leaf");
            return Ok(InsertOutcome::Split {
                separator,
                right: right_pos,
            });
        }

        // A pair equal to a separator lives in the right child's subtree.
        let child_idx = node.entries.partition_point(|sep| sep <= entry);
        let child_pos = node.children[child_idx];

        match self.insert_rec(child_pos, entry)? {
            InsertOutcome::Duplicate => Ok(InsertOutcome::Duplicate),
            InsertOutcome::Done => Ok(InsertOutcome::Done),
            InsertOutcome::Split { separator, right } => {
                node.entries.insert(child_idx, separator);
                node.children.insert(child_idx + 1, right);

                if node.entries.len() <= self.order.max_entries {
                    self.cache.put(pos, &node)?;
                    return Ok(InsertOutcome::Done);
                }

                // The middle entry moves up; halves keep min_entries each.
                let mid = node.entries.len() / 2;
                let mut right_node = Node::new_internal();
                right_node.entries = node.entries.split_off(mid + 1);
                right_node.children = node.children.split_off(mid + 1);
                let separator = node
                    .entries
                    .pop()
                    .ok_or_else(|| GroveError::Corrupted("internal split of empty node".into()))?;

                let right_pos = self.cache.append(&right_node)?;
                self.cache.put(pos, &node)?;

                trace!(left = pos, right = right_pos, "split internal node");
                Ok(InsertOutcome::Split {
                    separator,
                    right: right_pos,
                })
            }
        }
    }

    /// Removes the pair, returning `false` if it was not present.
    pub fn remove(&mut self, key: K, value: V) -> Result<bool> {
        let entry = Entry { key, value };

        // Descend to the leaf, recording (parent ordinal, child index) so
        // rebalancing can walk back up without re-searching.
        let mut stack: Vec<(u32, usize)> = Vec::new();
        let mut pos = self.root;
        let mut node = self.cache.get(pos)?;
        while !node.is_leaf {
            let child_idx = node.entries.partition_point(|sep| *sep <= entry);
            stack.push((pos, child_idx));
            pos = node.children[child_idx];
            node = self.cache.get(pos)?;
        }

        let idx = node.entries.partition_point(|e| *e < entry);
        if node.entries.get(idx) != Some(&entry) {
            return Ok(false);
        }
        node.entries.remove(idx);
        self.cache.put(pos, &node)?;

        if node.entries.len() >= self.order.min_entries || stack.is_empty() {
            return Ok(true);
        }

        self.rebalance(pos, node, stack)?;
        Ok(true)
    }

    /// Restores occupancy from the underfull node at `pos` upward.
    ///
    /// At each level: borrow an entry from the left sibling if it has slack,
    /// else from the right, else merge with a sibling (into the left one
    /// when it exists). A merge shrinks the parent, which may cascade.
    fn rebalance(
        &mut self,
        mut pos: u32,
        mut node: Node<K, V>,
        mut stack: Vec<(u32, usize)>,
    ) -> Result<()> {
        while let Some((parent_pos, child_idx)) = stack.pop() {
            let mut parent = self.cache.get(parent_pos)?;

            // Borrow from the left sibling.
            if child_idx > 0 {
                let left_pos = parent.children[child_idx - 1];
                let mut left = self.cache.get(left_pos)?;
                if left.entries.len() > self.order.min_entries {
                    let moved = left
                        .entries
                        .pop()
                        .ok_or_else(|| GroveError::Corrupted("borrow from empty sibling".into()))?;
                    if node.is_leaf {
                        node.entries.insert(0, moved.clone());
                        parent.entries[child_idx - 1] = moved;
                    } else {
                        let sep =
                            std::mem::replace(&mut parent.entries[child_idx - 1], moved);
                        node.entries.insert(0, sep);
                        let child = left.children.pop().ok_or_else(|| {
                            GroveError::Corrupted("internal sibling without children".into())
                        })?;
                        node.children.insert(0, child);
                    }
                    self.cache.put(left_pos, &left)?;
                    self.cache.put(pos, &node)?;
                    self.cache.put(parent_pos, &parent)?;
                    trace!(from = left_pos, to = pos, "borrowed from left sibling");
                    return Ok(());
                }
            }

            // Borrow from the right sibling.
            if child_idx + 1 < parent.children.len() {
                let right_pos = parent.children[child_idx + 1];
                let mut right = self.cache.get(right_pos)?;
                if right.entries.len() > self.order.min_entries {
                    let moved = right.entries.remove(0);
                    if node.is_leaf {
                        node.entries.push(moved);
                        parent.entries[child_idx] = right.entries[0].clone();
                    } else {
                        let sep = std::mem::replace(&mut parent.entries[child_idx], moved);
                        node.entries.push(sep);
                        node.children.push(right.children.remove(0));
                    }
                    self.cache.put(right_pos, &right)?;
                    self.cache.put(pos, &node)?;
                    self.cache.put(parent_pos, &parent)?;
                    trace!(from = right_pos, to = pos, "borrowed from right sibling");
                    return Ok(());
                }
            }

            // Merge: absorb into the left sibling when there is one,
            // otherwise absorb the right sibling. The emptied record is
            // abandoned in place.
            if child_idx > 0 {
                let left_pos = parent.children[child_idx - 1];
                let mut left = self.cache.get(left_pos)?;
                if left.is_leaf {
                    left.entries.append(&mut node.entries);
                    left.next = node.next;
                } else {
                    left.entries.push(parent.entries[child_idx - 1].clone());
                    left.entries.append(&mut node.entries);
                    left.children.append(&mut node.children);
                }
                parent.entries.remove(child_idx - 1);
                parent.children.remove(child_idx);
                self.cache.put(left_pos, &left)?;
                trace!(survivor = left_pos, absorbed = pos, "merged into left sibling");
            } else {
                let right_pos = parent.children[child_idx + 1];
                let mut right = self.cache.get(right_pos)?;
                if node.is_leaf {
                    node.entries.append(&mut right.entries);
                    node.next = right.next;
                } else {
                    node.entries.push(parent.entries[child_idx].clone());
                    node.entries.append(&mut right.entries);
                    node.children.append(&mut right.children);
                }
                parent.entries.remove(child_idx);
                parent.children.remove(child_idx + 1);
                self.cache.put(pos, &node)?;
                trace!(survivor = pos, absorbed = right_pos, "merged right sibling");
            }

            if stack.is_empty() && parent.entries.is_empty() {
                // The root ran out of separators; its sole child becomes
                // the new root.
                let new_root = parent.children[0];
                self.cache.put(parent_pos, &parent)?;
                self.set_root(new_root)?;
                trace!(root = new_root, "shrank tree by one level");
                return Ok(());
            }

            self.cache.put(parent_pos, &parent)?;

            if parent.entries.len() >= self.order.min_entries || stack.is_empty() {
                return Ok(());
            }

            pos = parent_pos;
            node = parent;
        }

        Ok(())
    }

    /// Returns every value stored under `key`, in ascending value order.
    pub fn find(&mut self, key: &K) -> Result<Vec<V>> {
        // Equal keys may straddle a separator, so descend toward the
        // leftmost leaf that can hold the key.
        let mut pos = self.root;
        let mut node = self.cache.get(pos)?;
        while !node.is_leaf {
            let child_idx = node.entries.partition_point(|sep| sep.key < *key);
            pos = node.children[child_idx];
            node = self.cache.get(pos)?;
        }

        let mut values = Vec::new();
        let mut idx = node.entries.partition_point(|e| e.key < *key);
        loop {
            while idx < node.entries.len() {
                let entry = &node.entries[idx];
                if entry.key != *key {
                    return Ok(values);
                }
                values.push(entry.value.clone());
                idx += 1;
            }
            let Some(next) = node.next else {
                return Ok(values);
            };
            node = self.cache.get(next)?;
            idx = 0;
        }
    }

    /// Returns every stored pair in ascending (key, value) order.
    pub fn all_entries(&mut self) -> Result<Vec<(K, V)>> {
        let mut pos = self.root;
        let mut node = self.cache.get(pos)?;
        while !node.is_leaf {
            pos = node.children[0];
            node = self.cache.get(pos)?;
        }

        let mut pairs = Vec::new();
        loop {
            for entry in &node.entries {
                pairs.push((entry.key.clone(), entry.value.clone()));
            }
            let Some(next) = node.next else {
                return Ok(pairs);
            };
            node = self.cache.get(next)?;
        }
    }

    /// Returns every stored value in ascending (key, value) order.
    pub fn all_values(&mut self) -> Result<Vec<V>> {
        Ok(self.all_entries()?.into_iter().map(|(_, v)| v).collect())
    }

    /// Returns true if the tree holds no pairs.
    pub fn is_empty(&mut self) -> Result<bool> {
        let node = self.cache.get(self.root)?;
        Ok(node.is_leaf && node.entries.is_empty())
    }

    /// Discards every pair, truncating the file back to one empty root leaf.
    pub fn clear(&mut self) -> Result<()> {
        self.cache.clear()?;
        let root = self.cache.append(&Node::new_leaf())?;
        self.set_root(root)?;
        debug!("cleared tree");
        Ok(())
    }

    fn set_root(&mut self, pos: u32) -> Result<()> {
        self.root = pos;
        self.cache.store().set_header_slot(ROOT_SLOT, pos)
    }

    /// Walks the whole tree and checks its structure, returning counts.
    ///
    /// Verifies uniform leaf depth, per-node occupancy and ordering, child
    /// counts, that each separator bounds its subtrees (left strictly below
    /// it, right at or above it), and that the leaf chain visits exactly the
    /// leaves in key order with globally ascending pairs.
    pub fn verify_invariants(&mut self) -> Result<TreeStats> {
        let mut stats = TreeStats {
            entries: 0,
            depth: 0,
            leaves: 0,
            nodes: 0,
        };

        let mut leaves = Vec::new();
        self.verify_subtree(self.root, true, 1, &mut stats, &mut leaves)?;

        // The chain must thread the leaves exactly as the tree orders them.
        let mut pos = leaves[0];
        for (i, &expected) in leaves.iter().enumerate() {
            if pos != expected {
                return Err(GroveError::Corrupted(format!(
                    "leaf chain reached {pos}, tree order expects {expected}"
                )));
            }
            let node = self.cache.get(pos)?;
            match (node.next, i + 1 == leaves.len()) {
                (Some(next), false) => pos = next,
                (None, true) => {}
                (Some(_), true) => {
                    return Err(GroveError::Corrupted(
                        "last leaf still threads to a successor".into(),
                    ));
                }
                (None, false) => {
                    return Err(GroveError::Corrupted(format!(
                        "leaf chain ends at {pos} before the last leaf"
                    )));
                }
            }
        }

        Ok(stats)
    }

    /// Checks the subtree at `pos`, appending its leaves in key order.
    /// Returns the subtree's first and last pair, or `None` for an empty
    /// root leaf.
    #[allow(clippy::type_complexity)]
    fn verify_subtree(
        &mut self,
        pos: u32,
        is_root: bool,
        depth: usize,
        stats: &mut TreeStats,
        leaves: &mut Vec<u32>,
    ) -> Result<Option<(Entry<K, V>, Entry<K, V>)>> {
        let node = self.cache.get(pos)?;
        stats.nodes += 1;

        if !node.entries.windows(2).all(|w| w[0] < w[1]) {
            return Err(GroveError::Corrupted(format!(
                "node {pos} entries not strictly ascending"
            )));
        }
        if !is_root && node.entries.len() < self.order.min_entries {
            return Err(GroveError::Corrupted(format!(
                "node {pos} underfull: {} < {}",
                node.entries.len(),
                self.order.min_entries
            )));
        }
        if node.entries.len() > self.order.max_entries {
            return Err(GroveError::Corrupted(format!(
                "node {pos} overfull: {} > {}",
                node.entries.len(),
                self.order.max_entries
            )));
        }

        if node.is_leaf {
            stats.leaves += 1;
            stats.entries += node.entries.len() as u64;
            leaves.push(pos);
            match stats.depth {
                0 => stats.depth = depth,
                d if d != depth => {
                    return Err(GroveError::Corrupted(format!(
                        "leaf {pos} at depth {depth}, expected {d}"
                    )));
                }
                _ => {}
            }
            if node.entries.is_empty() {
                if is_root {
                    return Ok(None);
                }
                return Err(GroveError::Corrupted(format!("leaf {pos} is empty")));
            }
            let first = node.entries[0].clone();
            let last = node.entries[node.entries.len() - 1].clone();
            return Ok(Some((first, last)));
        }

        if node.children.len() != node.entries.len() + 1 {
            return Err(GroveError::Corrupted(format!(
                "node {pos}: {} entries but {} children",
                node.entries.len(),
                node.children.len()
            )));
        }
        if node.entries.is_empty() {
            return Err(GroveError::Corrupted(format!(
                "internal node {pos} has no separators"
            )));
        }

        let mut span: Option<(Entry<K, V>, Entry<K, V>)> = None;
        for (i, &child) in node.children.iter().enumerate() {
            let child_span = self
                .verify_subtree(child, false, depth + 1, stats, leaves)?
                .ok_or_else(|| GroveError::Corrupted(format!("empty subtree under {pos}")))?;

            if i > 0 && child_span.0 < node.entries[i - 1] {
                return Err(GroveError::Corrupted(format!(
                    "node {pos}: child {i} starts below separator {}",
                    i - 1
                )));
            }
            if i < node.entries.len() && child_span.1 >= node.entries[i] {
                return Err(GroveError::Corrupted(format!(
                    "node {pos}: child {i} reaches past separator {i}"
                )));
            }

            span = match span {
                None => Some(child_span),
                Some((first, _)) => Some((first, child_span.1)),
            };
        }

        Ok(span)
    }
}

impl<K, V> BPlusTree<K, V> {
    /// Node capacity limits in force for this tree.
    pub fn node_order(&self) -> NodeOrder {
        self.order
    }

    /// Persists the record count and, if enabled, syncs the file.
    pub fn flush(&self) -> Result<()> {
        self.cache.store().flush()
    }
}

impl<K, V> Drop for BPlusTree<K, V> {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    /// Budget 48 with u32 keys and values forces order 3: two entries per
    /// node, so every structural path triggers within a handful of pairs.
    fn tiny_config() -> TreeConfig {
        TreeConfig {
            page_budget: 48,
            cache_slots: 8,
            fsync_enabled: false,
        }
    }

    fn create_tree(dir: &tempfile::TempDir, config: &TreeConfig) -> BPlusTree<u32, u32> {
        BPlusTree::open(dir.path().join("tree.grove"), config).unwrap()
    }

    #[test]
    fn test_empty_tree() {
        let dir = tempdir().unwrap();
        let mut tree = create_tree(&dir, &tiny_config());

        assert!(tree.is_empty().unwrap());
        assert!(tree.find(&1).unwrap().is_empty());
        assert!(tree.all_entries().unwrap().is_empty());
        assert!(!tree.remove(1, 1).unwrap());

        let stats = tree.verify_invariants().unwrap();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.depth, 1);
        assert_eq!(stats.leaves, 1);
    }

    #[test]
    fn test_insert_and_find() {
        let dir = tempdir().unwrap();
        let mut tree = create_tree(&dir, &tiny_config());

        assert!(tree.insert(5, 50).unwrap());
        assert!(tree.insert(3, 30).unwrap());
        assert!(tree.insert(8, 80).unwrap());

        assert_eq!(tree.find(&3).unwrap(), vec![30]);
        assert_eq!(tree.find(&5).unwrap(), vec![50]);
        assert_eq!(tree.find(&8).unwrap(), vec![80]);
        assert!(tree.find(&4).unwrap().is_empty());
    }

    #[test]
    fn test_insert_is_idempotent() {
        let dir = tempdir().unwrap();
        let mut tree = create_tree(&dir, &tiny_config());

        assert!(tree.insert(1, 10).unwrap());
        assert!(!tree.insert(1, 10).unwrap());

        // Repeat after splits have pushed the pair next to a separator.
        for i in 2..20 {
            tree.insert(i, i * 10).unwrap();
        }
        for i in 1..20 {
            assert!(!tree.insert(i, i * 10).unwrap(), "pair {i} re-inserted");
            tree.verify_invariants().unwrap();
        }
    }

    #[test]
    fn test_duplicate_keys() {
        let dir = tempdir().unwrap();
        let mut tree = create_tree(&dir, &tiny_config());

        for v in [30, 10, 20] {
            assert!(tree.insert(7, v).unwrap());
        }

        assert_eq!(tree.find(&7).unwrap(), vec![10, 20, 30]);

        assert!(tree.remove(7, 20).unwrap());
        assert_eq!(tree.find(&7).unwrap(), vec![10, 30]);
    }

    #[test]
    fn test_grow_then_shrink() {
        let dir = tempdir().unwrap();
        let mut tree = create_tree(&dir, &tiny_config());
        assert_eq!(tree.node_order().max_entries, 2);

        for i in 1..=7u32 {
            assert!(tree.insert(i, i).unwrap());
            let stats = tree.verify_invariants().unwrap();
            assert_eq!(stats.entries, u64::from(i));
        }

        for i in (1..=7u32).rev() {
            assert!(tree.remove(i, i).unwrap());
            let stats = tree.verify_invariants().unwrap();
            assert_eq!(stats.entries, u64::from(i) - 1);
        }
        assert!(tree.is_empty().unwrap());
    }

    #[test]
    fn test_remove_missing_pair() {
        let dir = tempdir().unwrap();
        let mut tree = create_tree(&dir, &tiny_config());

        tree.insert(1, 10).unwrap();
        assert!(!tree.remove(1, 99).unwrap()); // key present, value not
        assert!(!tree.remove(2, 10).unwrap()); // key absent
        assert_eq!(tree.find(&1).unwrap(), vec![10]);
    }

    #[test]
    fn test_all_entries_ordered() {
        let dir = tempdir().unwrap();
        let mut tree = create_tree(&dir, &tiny_config());

        tree.insert(2, 9).unwrap();
        tree.insert(1, 5).unwrap();
        tree.insert(2, 3).unwrap();
        tree.insert(1, 1).unwrap();

        assert_eq!(
            tree.all_entries().unwrap(),
            vec![(1, 1), (1, 5), (2, 3), (2, 9)]
        );
        assert_eq!(tree.all_values().unwrap(), vec![1, 5, 3, 9]);
    }

    #[test]
    fn test_clear() {
        let dir = tempdir().unwrap();
        let mut tree = create_tree(&dir, &tiny_config());

        for i in 0..10 {
            tree.insert(i, i).unwrap();
        }
        tree.clear().unwrap();

        assert!(tree.is_empty().unwrap());
        assert!(tree.find(&3).unwrap().is_empty());

        // The tree is usable again after clearing.
        tree.insert(42, 1).unwrap();
        assert_eq!(tree.find(&42).unwrap(), vec![1]);
    }

    #[test]
    fn test_find_spans_leaves() {
        let dir = tempdir().unwrap();
        let mut tree = create_tree(&dir, &tiny_config());

        // Many values for one key spread across several leaves.
        for v in 0..12u32 {
            tree.insert(5, v).unwrap();
        }
        tree.insert(4, 0).unwrap();
        tree.insert(6, 0).unwrap();

        assert_eq!(tree.find(&5).unwrap(), (0..12).collect::<Vec<_>>());
        tree.verify_invariants().unwrap();
    }

    #[test]
    fn test_budget_too_small_rejected() {
        let dir = tempdir().unwrap();
        let config = TreeConfig {
            page_budget: 10,
            cache_slots: 8,
            fsync_enabled: false,
        };
        let result: Result<BPlusTree<u32, u32>> =
            BPlusTree::open(dir.path().join("tree.grove"), &config);
        assert!(matches!(result, Err(GroveError::ConfigError(_))));
    }
}
