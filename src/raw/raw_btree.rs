use alloc::format;
use alloc::vec::Vec;

use smallvec::SmallVec;

use super::arena::Arena;
use super::handle::NodeId;
use super::node::Node;
use crate::error::{Error, Result};
use crate::event::{Event, EventSink, Phase, Side};
use crate::order::Order;

/// Scratch stack for depth-first walks. Trees deeper than this spill to the heap.
type WalkStack = SmallVec<[(NodeId, usize); 32]>;

/// The core B-Tree implementation backing `BTree`.
///
/// All restructuring lives here. Every mutating method takes the sink explicitly so the
/// facade can own it next to the tree without the two borrowing each other.
pub(crate) struct RawBTree<T> {
    /// Arena storing all tree nodes.
    nodes: Arena<Node<T>>,
    /// Handle to the root node. There is always one, possibly an empty leaf.
    root: NodeId,
    order: Order,
    /// Total number of keys, duplicates included.
    len: usize,
}

impl<T> RawBTree<T> {
    /// Creates a tree holding a single empty leaf root.
    pub(crate) fn new<S: EventSink<T>>(order: Order, sink: &mut S) -> Self {
        let mut nodes = Arena::new();
        let root = nodes.alloc(Node::new_leaf(order.max_keys()));
        sink.on_event(Event::NodeCreated { node: root, leaf: true });
        sink.on_event(Event::RootChanged {
            phase: Phase::Before,
            old: None,
            new: root,
        });
        sink.on_event(Event::RootChanged {
            phase: Phase::After,
            old: None,
            new: root,
        });
        Self {
            nodes,
            root,
            order,
            len: 0,
        }
    }

    pub(crate) const fn order(&self) -> Order {
        self.order
    }

    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    pub(crate) const fn root(&self) -> NodeId {
        self.root
    }

    pub(crate) fn try_node(&self, id: NodeId) -> Option<&Node<T>> {
        self.nodes.try_get(id)
    }

    pub(crate) const fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of levels; a lone leaf root has height 1.
    pub(crate) fn height(&self) -> usize {
        let mut height = 1;
        let mut current = self.nodes.get(self.root);
        while let Some(child) = current.first_child() {
            current = self.nodes.get(child);
            height += 1;
        }
        height
    }

    /// Drops every node and starts over from a single empty leaf root.
    pub(crate) fn clear<S: EventSink<T>>(&mut self, sink: &mut S) {
        let mut stack: SmallVec<[NodeId; 32]> = SmallVec::new();
        stack.push(self.root);
        while let Some(id) = stack.pop() {
            let node = self.nodes.take(id);
            stack.extend(node.children().iter().copied());
            sink.on_event(Event::NodeDestroyed { node: id });
        }
        self.nodes.clear();

        let root = self.alloc(Node::new_leaf(self.order.max_keys()), sink);
        sink.on_event(Event::RootChanged {
            phase: Phase::Before,
            old: None,
            new: root,
        });
        self.root = root;
        self.len = 0;
        sink.on_event(Event::RootChanged {
            phase: Phase::After,
            old: None,
            new: root,
        });
    }

    /// Visits every node depth-first, left to right, with its depth (root = 0).
    pub(crate) fn for_each_node(&self, mut f: impl FnMut(NodeId, &Node<T>, usize)) {
        let mut stack: WalkStack = SmallVec::new();
        stack.push((self.root, 0));
        while let Some((id, depth)) = stack.pop() {
            let node = self.nodes.get(id);
            f(id, node, depth);
            for &child in node.children().iter().rev() {
                stack.push((child, depth + 1));
            }
        }
    }

    /// Collects every key in order.
    pub(crate) fn in_order(&self) -> Vec<&T> {
        fn walk<'a, T>(nodes: &'a Arena<Node<T>>, id: NodeId, out: &mut Vec<&'a T>) {
            let node = nodes.get(id);
            if node.is_leaf() {
                out.extend(node.keys());
                return;
            }
            for (i, key) in node.keys().iter().enumerate() {
                walk(nodes, node.child(i), out);
                out.push(key);
            }
            if let Some(last) = node.last_child() {
                walk(nodes, last, out);
            }
        }

        let mut out = Vec::with_capacity(self.len);
        walk(&self.nodes, self.root, &mut out);
        out
    }

    fn alloc<S: EventSink<T>>(&mut self, node: Node<T>, sink: &mut S) -> NodeId {
        let leaf = node.is_leaf();
        let id = self.nodes.alloc(node);
        sink.on_event(Event::NodeCreated { node: id, leaf });
        id
    }

    fn replace_root<S: EventSink<T>>(&mut self, new: NodeId, sink: &mut S) {
        let old = Some(self.root);
        sink.on_event(Event::RootChanged {
            phase: Phase::Before,
            old,
            new,
        });
        self.root = new;
        sink.on_event(Event::RootChanged {
            phase: Phase::After,
            old,
            new,
        });
    }

    /// Splits the full node `id` around its median and allocates the right half.
    /// Returns (`median`, `sibling`); the caller decides where the median goes.
    fn split_sibling<S: EventSink<T>>(&mut self, id: NodeId, sink: &mut S) -> Result<(T, NodeId)> {
        let max_keys = self.order.max_keys();
        let count = self.nodes.get(id).key_count();
        if count != max_keys {
            return Err(Error::invariant(format!(
                "split of node {id} holding {count} keys, expected exactly {max_keys}"
            )));
        }

        sink.on_event(Event::Split {
            phase: Phase::Before,
            node: id,
            sibling: None,
            median: None,
        });
        let (median, sibling) = self.nodes.get_mut(id).split_off(self.order.split_index());
        let sibling = self.alloc(sibling, sink);
        sink.on_event(Event::Split {
            phase: Phase::After,
            node: id,
            sibling: Some(sibling),
            median: Some(&median),
        });

        Ok((median, sibling))
    }

    /// Splits `children[index]` of `id`, promoting the median into `id`.
    fn split_child<S: EventSink<T>>(&mut self, id: NodeId, index: usize, sink: &mut S) -> Result<()> {
        let child = self.nodes.get(id).child(index);
        let (median, sibling) = self.split_sibling(child, sink)?;
        let parent = self.nodes.get_mut(id);
        parent.insert_key(index, median);
        parent.insert_child(index + 1, sibling);
        Ok(())
    }

    /// Folds `children[index + 1]` and `keys[index]` of `id` into `children[index]`.
    /// The right child is moved out of the arena before its contents are absorbed.
    fn merge_children<S: EventSink<T>>(&mut self, id: NodeId, index: usize, sink: &mut S) {
        let parent = self.nodes.get(id);
        let left = parent.child(index);
        let right = parent.child(index + 1);
        sink.on_event(Event::Merge {
            phase: Phase::Before,
            parent: id,
            left,
            right,
            separator: parent.key(index),
        });

        let parent = self.nodes.get_mut(id);
        let separator = parent.remove_key(index);
        parent.remove_child(index + 1);

        let right_node = self.nodes.take(right);
        let left_node = self.nodes.get_mut(left);
        let separator_index = left_node.key_count();
        left_node.absorb(separator, right_node);
        sink.on_event(Event::NodeDestroyed { node: right });

        sink.on_event(Event::Merge {
            phase: Phase::After,
            parent: id,
            left,
            right,
            separator: self.nodes.get(left).key(separator_index),
        });
    }

    /// Rotates the last key (and child) of `children[index - 1]` through the parent
    /// separator into the front of `children[index]`.
    fn borrow_from_left<S: EventSink<T>>(&mut self, id: NodeId, index: usize, sink: &mut S) {
        let parent = self.nodes.get(id);
        let donor = parent.child(index - 1);
        let recipient = parent.child(index);
        if let Some(key) = self.nodes.get(donor).last_key() {
            sink.on_event(Event::Borrow {
                phase: Phase::Before,
                side: Side::Left,
                parent: id,
                donor,
                recipient,
                key,
            });
        }

        let (key, child) = self.nodes.get_mut(donor).pop_back();
        let separator = self.nodes.get_mut(id).replace_key(index - 1, key);
        self.nodes.get_mut(recipient).push_front(separator, child);

        sink.on_event(Event::Borrow {
            phase: Phase::After,
            side: Side::Left,
            parent: id,
            donor,
            recipient,
            key: self.nodes.get(id).key(index - 1),
        });
    }

    /// Mirror of [`Self::borrow_from_left`] using the first key (and child) of
    /// `children[index + 1]`.
    fn borrow_from_right<S: EventSink<T>>(&mut self, id: NodeId, index: usize, sink: &mut S) {
        let parent = self.nodes.get(id);
        let recipient = parent.child(index);
        let donor = parent.child(index + 1);
        if let Some(key) = self.nodes.get(donor).first_key() {
            sink.on_event(Event::Borrow {
                phase: Phase::Before,
                side: Side::Right,
                parent: id,
                donor,
                recipient,
                key,
            });
        }

        let (key, child) = self.nodes.get_mut(donor).pop_front();
        let separator = self.nodes.get_mut(id).replace_key(index, key);
        self.nodes.get_mut(recipient).push_back(separator, child);

        sink.on_event(Event::Borrow {
            phase: Phase::After,
            side: Side::Right,
            parent: id,
            donor,
            recipient,
            key: self.nodes.get(id).key(index),
        });
    }

    /// Repairs `children[index]` of `id` after a removal below it left it short of
    /// `min_keys`: borrow from the left, else from the right, else merge (right first).
    fn fix_child<S: EventSink<T>>(&mut self, id: NodeId, index: usize, sink: &mut S) {
        let min_keys = self.order.min_keys();
        let parent = self.nodes.get(id);
        if self.nodes.get(parent.child(index)).key_count() >= min_keys {
            return;
        }

        let has_left = index > 0;
        let has_right = index < parent.key_count();

        if has_left && self.nodes.get(parent.child(index - 1)).key_count() > min_keys {
            self.borrow_from_left(id, index, sink);
        } else if has_right && self.nodes.get(parent.child(index + 1)).key_count() > min_keys {
            self.borrow_from_right(id, index, sink);
        } else if has_right {
            self.merge_children(id, index, sink);
        } else if has_left {
            self.merge_children(id, index - 1, sink);
        }
    }

    /// Collapses an internal root without keys into its only child, repeatedly.
    fn collapse_root<S: EventSink<T>>(&mut self, sink: &mut S) {
        loop {
            let root = self.nodes.get(self.root);
            if root.is_leaf() || root.key_count() > 0 {
                return;
            }
            let Some(child) = root.first_child() else {
                return;
            };
            let old = self.root;
            self.replace_root(child, sink);
            drop(self.nodes.take(old));
            sink.on_event(Event::NodeDestroyed { node: old });
        }
    }
}

impl<T: Ord> RawBTree<T> {
    /// Returns true if a key equal to `val` is stored anywhere in the tree.
    pub(crate) fn find(&self, val: &T) -> bool {
        let mut current = self.root;
        loop {
            let node = self.nodes.get(current);
            match node.position(val) {
                Ok(_) => return true,
                Err(_) if node.is_leaf() => return false,
                Err(idx) => current = node.child(idx),
            }
        }
    }

    /// Inserts `val`, splitting a full root first so the descent never meets a full node.
    pub(crate) fn insert<S: EventSink<T>>(&mut self, val: T, sink: &mut S) -> Result<()> {
        if self.nodes.get(self.root).key_count() == self.order.max_keys() {
            let old_root = self.root;
            let (median, sibling) = self.split_sibling(old_root, sink)?;
            let new_root = self.alloc(Node::new_root(self.order.max_keys(), median, old_root, sibling), sink);
            self.replace_root(new_root, sink);
        }

        self.insert_val(self.root, val, sink)?;
        self.len += 1;
        Ok(())
    }

    /// Inserts below `id`, which must not be full.
    fn insert_val<S: EventSink<T>>(&mut self, id: NodeId, val: T, sink: &mut S) -> Result<()> {
        let max_keys = self.order.max_keys();
        let node = self.nodes.get(id);
        let mut idx = node.key_index(&val);

        if node.is_leaf() {
            if node.key_count() >= max_keys {
                return Err(Error::invariant(format!("insert into full leaf {id}")));
            }
            sink.on_event(Event::LeafInsert {
                phase: Phase::Before,
                node: id,
                index: idx,
                key: &val,
            });
            let node = self.nodes.get_mut(id);
            node.insert_key(idx, val);
            sink.on_event(Event::LeafInsert {
                phase: Phase::After,
                node: id,
                index: idx,
                key: node.key(idx),
            });
            return Ok(());
        }

        if self.nodes.get(node.child(idx)).key_count() == max_keys {
            self.split_child(id, idx, sink)?;
            // The promoted median may now sit at or before `idx`.
            idx = self.nodes.get(id).key_index(&val);
        }

        let child = self.nodes.get(id).child(idx);
        self.insert_val(child, val, sink)
    }
}

impl<T: Ord + Clone> RawBTree<T> {
    /// Removes one key equal to `val`. Returns false, touching nothing, when absent.
    pub(crate) fn remove<S: EventSink<T>>(&mut self, val: &T, sink: &mut S) -> bool {
        if !self.find(val) {
            return false;
        }

        self.remove_val(self.root, val, sink);
        self.collapse_root(sink);
        self.len -= 1;
        true
    }

    fn remove_val<S: EventSink<T>>(&mut self, id: NodeId, val: &T, sink: &mut S) {
        let min_keys = self.order.min_keys();
        let node = self.nodes.get(id);

        let idx = match node.position(val) {
            Ok(idx) if node.is_leaf() => {
                self.erase_from_leaf(id, idx, sink);
                return;
            }
            Err(_) if node.is_leaf() => return,
            Err(idx) => {
                let child = node.child(idx);
                self.remove_val(child, val, sink);
                self.fix_child(id, idx, sink);
                return;
            }
            Ok(idx) => idx,
        };

        let left = node.child(idx);
        let right = node.child(idx + 1);

        let victim = if self.nodes.get(left).key_count() > min_keys
            && let Some(pred) = self.find_pred(left).cloned()
        {
            self.substitute(id, idx, pred.clone(), sink);
            self.remove_val(left, &pred, sink);
            idx
        } else if self.nodes.get(right).key_count() > min_keys
            && let Some(suc) = self.find_suc(right).cloned()
        {
            self.substitute(id, idx, suc.clone(), sink);
            self.remove_val(right, &suc, sink);
            idx + 1
        } else {
            self.merge_children(id, idx, sink);
            self.remove_val(left, val, sink);
            idx
        };

        self.fix_child(id, victim, sink);
    }

    fn erase_from_leaf<S: EventSink<T>>(&mut self, id: NodeId, idx: usize, sink: &mut S) {
        sink.on_event(Event::LeafErase {
            phase: Phase::Before,
            node: id,
            index: idx,
            key: self.nodes.get(id).key(idx),
        });
        let removed = self.nodes.get_mut(id).remove_key(idx);
        sink.on_event(Event::LeafErase {
            phase: Phase::After,
            node: id,
            index: idx,
            key: &removed,
        });
    }

    fn substitute<S: EventSink<T>>(&mut self, id: NodeId, idx: usize, key: T, sink: &mut S) {
        let node = self.nodes.get_mut(id);
        let old = node.replace_key(idx, key);
        sink.on_event(Event::KeyReplaced {
            node: id,
            index: idx,
            old: &old,
            new: node.key(idx),
        });
    }

    /// Largest key under `id`, found along the rightmost child chain.
    ///
    /// A chain node may be empty when `min_keys` is zero, in which case the deepest
    /// non-empty node on the chain holds the maximum.
    fn find_pred(&self, id: NodeId) -> Option<&T> {
        let mut node = self.nodes.get(id);
        let mut pred = node.last_key();
        while let Some(child) = node.last_child() {
            node = self.nodes.get(child);
            pred = node.last_key().or(pred);
        }
        pred
    }

    /// Smallest key under `id`, found along the leftmost child chain.
    fn find_suc(&self, id: NodeId) -> Option<&T> {
        let mut node = self.nodes.get(id);
        let mut suc = node.first_key();
        while let Some(child) = node.first_child() {
            node = self.nodes.get(child);
            suc = node.first_key().or(suc);
        }
        suc
    }
}

impl<T: Ord> RawBTree<T> {
    /// Checks every structural invariant, reporting the first violation.
    pub(crate) fn validate(&self) -> Result<()> {
        let mut leaf_depth: Option<usize> = None;
        let mut count = 0usize;
        self.validate_node(self.root, 0, None, None, &mut leaf_depth, &mut count)?;

        if count != self.len {
            return Err(Error::Invariant(format!("len is {} but the tree holds {count} keys", self.len)));
        }

        let root = self.nodes.get(self.root);
        if !root.is_leaf() && root.key_count() == 0 {
            return Err(Error::Invariant(format!("internal root {} has no keys", self.root)));
        }

        if self.nodes.len() != self.reachable_nodes() {
            return Err(Error::Invariant(format!(
                "arena holds {} nodes but only {} are reachable",
                self.nodes.len(),
                self.reachable_nodes()
            )));
        }

        Ok(())
    }

    fn reachable_nodes(&self) -> usize {
        let mut count = 0;
        self.for_each_node(|_, _, _| count += 1);
        count
    }

    fn validate_node(
        &self,
        id: NodeId,
        depth: usize,
        lower: Option<&T>,
        upper: Option<&T>,
        leaf_depth: &mut Option<usize>,
        count: &mut usize,
    ) -> Result<()> {
        let Some(node) = self.nodes.try_get(id) else {
            return Err(Error::Invariant(format!("dangling child {id}")));
        };
        let keys = node.keys();
        let is_root = id == self.root;
        *count += keys.len();

        if keys.len() > self.order.max_keys() {
            return Err(Error::Invariant(format!(
                "node {id} holds {} keys, more than {}",
                keys.len(),
                self.order.max_keys()
            )));
        }
        if !is_root && keys.len() < self.order.min_keys() {
            return Err(Error::Invariant(format!(
                "node {id} holds {} keys, fewer than {}",
                keys.len(),
                self.order.min_keys()
            )));
        }
        if keys.windows(2).any(|w| w[0] > w[1]) {
            return Err(Error::Invariant(format!("keys of node {id} are not sorted")));
        }
        if lower.is_some_and(|lower| keys.iter().any(|k| k < lower))
            || upper.is_some_and(|upper| keys.iter().any(|k| k > upper))
        {
            return Err(Error::Invariant(format!("keys of node {id} escape their separators")));
        }

        if node.is_leaf() {
            if !node.children().is_empty() {
                return Err(Error::Invariant(format!("leaf {id} has children")));
            }
            return match *leaf_depth {
                None => {
                    *leaf_depth = Some(depth);
                    Ok(())
                }
                Some(expected) if expected == depth => Ok(()),
                Some(expected) => Err(Error::Invariant(format!(
                    "leaf {id} at depth {depth}, expected {expected}"
                ))),
            };
        }

        if node.children().len() != keys.len() + 1 {
            return Err(Error::Invariant(format!(
                "internal node {id} has {} keys but {} children",
                keys.len(),
                node.children().len()
            )));
        }

        for (i, &child) in node.children().iter().enumerate() {
            let child_lower = if i == 0 { lower } else { Some(&keys[i - 1]) };
            let child_upper = if i == keys.len() { upper } else { Some(&keys[i]) };
            self.validate_node(child, depth + 1, child_lower, child_upper, leaf_depth, count)?;
        }

        Ok(())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::event::{NoopSink, RecordingSink};
    use alloc::collections::BTreeMap;
    use alloc::vec;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn tree(m: usize) -> RawBTree<i32> {
        RawBTree::new(Order::new(m).unwrap(), &mut NoopSink)
    }

    fn filled(m: usize, keys: &[i32]) -> RawBTree<i32> {
        let mut tree = tree(m);
        for &k in keys {
            tree.insert(k, &mut NoopSink).unwrap();
        }
        tree.validate().unwrap();
        tree
    }

    fn keys(tree: &RawBTree<i32>) -> Vec<i32> {
        tree.in_order().into_iter().copied().collect()
    }

    /// Shape of the tree as (depth, keys) per node, depth-first.
    fn shape(tree: &RawBTree<i32>) -> Vec<(usize, Vec<i32>)> {
        let mut out = Vec::new();
        tree.for_each_node(|_, node, depth| out.push((depth, node.keys().to_vec())));
        out
    }

    #[test]
    fn empty_tree() {
        let tree = tree(4);
        assert_eq!(tree.len(), 0);
        assert_eq!(tree.height(), 1);
        assert_eq!(tree.node_count(), 1);
        assert!(!tree.find(&1));
        tree.validate().unwrap();
    }

    #[test]
    fn root_split_promotes_median() {
        let tree = filled(5, &[10, 20, 30, 40, 50]);
        assert_eq!(shape(&tree), vec![(0, vec![30]), (1, vec![10, 20]), (1, vec![40, 50])]);
        assert_eq!(tree.height(), 2);
    }

    #[test]
    fn child_split_recomputes_index() {
        let tree = filled(4, &[1, 2, 3, 4, 5, 6]);
        assert_eq!(
            shape(&tree),
            vec![(0, vec![2, 4]), (1, vec![1]), (1, vec![3]), (1, vec![5, 6])]
        );
    }

    #[test]
    fn split_of_non_full_node_is_an_invariant_error() {
        let mut tree = filled(5, &[1, 2]);
        let root = tree.root();
        let err = tree.split_sibling(root, &mut NoopSink).unwrap_err();
        assert!(matches!(err, Error::Invariant(_)));
    }

    #[test]
    fn insert_into_full_leaf_is_an_invariant_error() {
        let mut tree = filled(4, &[1, 2, 3]);
        let root = tree.root();
        let err = tree.insert_val(root, 4, &mut NoopSink).unwrap_err();
        assert!(matches!(err, Error::Invariant(_)));
        assert_eq!(keys(&tree), vec![1, 2, 3]);
    }

    #[test]
    fn remove_uses_predecessor_when_left_child_has_spare_keys() {
        // root [30], left [10, 20], right [40]
        let mut tree = filled(5, &[10, 20, 30, 40, 50]);
        assert!(tree.remove(&50, &mut NoopSink));
        let mut sink = RecordingSink::new();
        assert!(tree.remove(&30, &mut sink));
        assert!(sink.events().contains(&Event::KeyReplaced {
            node: tree.root(),
            index: 0,
            old: 30,
            new: 20
        }));
        assert_eq!(shape(&tree), vec![(0, vec![20]), (1, vec![10]), (1, vec![40])]);
        tree.validate().unwrap();
    }

    #[test]
    fn remove_uses_successor_when_only_right_child_has_spare_keys() {
        let mut tree = filled(5, &[10, 20, 30, 40, 50]);
        assert!(tree.remove(&10, &mut NoopSink));
        // root [30], left [20], right [40, 50]
        assert!(tree.remove(&30, &mut NoopSink));
        assert_eq!(shape(&tree), vec![(0, vec![40]), (1, vec![20]), (1, vec![50])]);
        tree.validate().unwrap();
    }

    #[test]
    fn remove_merges_when_both_children_are_minimal() {
        let mut tree = filled(5, &[10, 20, 30, 40, 50]);
        assert!(tree.remove(&10, &mut NoopSink));
        assert!(tree.remove(&50, &mut NoopSink));
        // root [30], left [20], right [40]
        let mut sink = RecordingSink::new();
        assert!(tree.remove(&30, &mut sink));
        assert_eq!(shape(&tree), vec![(0, vec![20, 40])]);
        assert_eq!(tree.node_count(), 1);
        assert!(sink.events().iter().any(|e| matches!(e, Event::Merge { phase: Phase::After, .. })));
        assert!(sink.events().iter().any(|e| matches!(e, Event::RootChanged { phase: Phase::After, .. })));
        tree.validate().unwrap();
    }

    #[test]
    fn fix_child_borrows_from_left_sibling() {
        // root [40], left [10, 20, 30], right [50]
        let mut tree = filled(5, &[40, 50, 10, 20, 30]);
        assert_eq!(shape(&tree), vec![(0, vec![40]), (1, vec![10, 20, 30]), (1, vec![50])]);

        let mut sink = RecordingSink::new();
        assert!(tree.remove(&50, &mut sink));
        assert!(
            sink.events()
                .iter()
                .any(|e| matches!(e, Event::Borrow { side: Side::Left, phase: Phase::After, .. }))
        );
        assert_eq!(shape(&tree), vec![(0, vec![30]), (1, vec![10, 20]), (1, vec![40])]);
        tree.validate().unwrap();
    }

    #[test]
    fn fix_child_borrows_from_right_sibling() {
        let mut tree = filled(5, &[10, 20, 30, 40, 50]);
        // root [30], left [10, 20], right [40, 50]
        assert!(tree.remove(&20, &mut NoopSink));
        let mut sink = RecordingSink::new();
        assert!(tree.remove(&10, &mut sink));
        assert!(
            sink.events()
                .iter()
                .any(|e| matches!(e, Event::Borrow { side: Side::Right, phase: Phase::After, .. }))
        );
        assert_eq!(shape(&tree), vec![(0, vec![40]), (1, vec![30]), (1, vec![50])]);
        tree.validate().unwrap();
    }

    /// root [30, 60], children [10, 20], [40, 50], [70, 80]
    fn three_leaves() -> (RawBTree<i32>, Vec<NodeId>) {
        let tree = filled(5, &[10, 20, 30, 40, 50, 60, 70, 80]);
        assert_eq!(
            shape(&tree),
            vec![(0, vec![30, 60]), (1, vec![10, 20]), (1, vec![40, 50]), (1, vec![70, 80])]
        );
        let children = tree.nodes.get(tree.root()).children().to_vec();
        (tree, children)
    }

    fn merges(sink: &RecordingSink<i32>) -> Vec<(NodeId, NodeId)> {
        sink.events()
            .iter()
            .filter_map(|e| match e {
                Event::Merge {
                    phase: Phase::After,
                    left,
                    right,
                    ..
                } => Some((*left, *right)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn fix_child_prefers_left_donor_when_both_siblings_can_spare() {
        let (mut tree, children) = three_leaves();
        assert!(tree.remove(&40, &mut NoopSink));

        let mut sink = RecordingSink::new();
        assert!(tree.remove(&50, &mut sink));
        let borrows: Vec<_> = sink
            .events()
            .iter()
            .filter_map(|e| match e {
                Event::Borrow {
                    phase: Phase::After,
                    side,
                    donor,
                    recipient,
                    ..
                } => Some((*side, *donor, *recipient)),
                _ => None,
            })
            .collect();
        assert_eq!(borrows, vec![(Side::Left, children[0], children[1])]);
        assert_eq!(
            shape(&tree),
            vec![(0, vec![20, 60]), (1, vec![10]), (1, vec![30]), (1, vec![70, 80])]
        );
        tree.validate().unwrap();
    }

    #[test]
    fn fix_child_merges_with_right_sibling_first() {
        let (mut tree, children) = three_leaves();
        for k in [20, 80, 40] {
            assert!(tree.remove(&k, &mut NoopSink));
        }
        // [10], [50], [70]: no sibling can spare a key.

        let mut sink = RecordingSink::new();
        assert!(tree.remove(&50, &mut sink));
        assert_eq!(merges(&sink), vec![(children[1], children[2])]);
        assert_eq!(sink.events().iter().filter(|e| matches!(e, Event::Borrow { .. })).count(), 0);
        assert_eq!(shape(&tree), vec![(0, vec![30]), (1, vec![10]), (1, vec![60, 70])]);
        tree.validate().unwrap();
    }

    #[test]
    fn fix_child_merges_last_child_into_left_sibling() {
        let (mut tree, children) = three_leaves();
        for k in [20, 80, 50] {
            assert!(tree.remove(&k, &mut NoopSink));
        }
        // [10], [40], [70]: the last child has no right sibling.

        let mut sink = RecordingSink::new();
        assert!(tree.remove(&70, &mut sink));
        assert_eq!(merges(&sink), vec![(children[1], children[2])]);
        assert_eq!(shape(&tree), vec![(0, vec![30]), (1, vec![10]), (1, vec![40, 60])]);
        tree.validate().unwrap();
    }

    #[test]
    fn internal_borrow_moves_a_child_pointer() {
        let mut tree = filled(4, &(1..=20).collect::<Vec<_>>());
        for k in [1, 2, 3, 4, 5, 6] {
            assert!(tree.remove(&k, &mut NoopSink));
            tree.validate().unwrap();
        }
        assert_eq!(keys(&tree), (7..=20).collect::<Vec<_>>());
    }

    #[test]
    fn remove_absent_key_is_a_no_op() {
        let mut tree = filled(4, &[5, 1, 9, 3, 7]);
        let before = shape(&tree);
        let mut sink = RecordingSink::new();
        assert!(!tree.remove(&4, &mut sink));
        assert!(sink.is_empty());
        assert_eq!(shape(&tree), before);
        assert_eq!(tree.len(), 5);
    }

    #[test]
    fn find_pred_and_suc_skip_empty_chain_nodes() {
        // Order 3 splits two keys into one key and an empty sibling.
        let tree = filled(3, &[1, 2, 3]);
        assert_eq!(shape(&tree), vec![(0, vec![2]), (1, vec![1]), (1, vec![3])]);
        let tree = filled(3, &[3, 2, 1, 0]);
        tree.for_each_node(|id, node, _| {
            if node.key_count() > 0 {
                assert_eq!(tree.find_pred(id), tree.in_order_under(id).last().copied());
                assert_eq!(tree.find_suc(id), tree.in_order_under(id).first().copied());
            }
        });
    }

    #[test]
    fn clear_restores_single_leaf() {
        let mut tree = filled(4, &(0..50).collect::<Vec<_>>());
        let mut sink = RecordingSink::new();
        let before = tree.node_count();
        tree.clear(&mut sink);
        let destroyed = sink.events().iter().filter(|e| matches!(e, Event::NodeDestroyed { .. })).count();
        assert_eq!(destroyed, before);
        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.len(), 0);
        tree.validate().unwrap();
        tree.insert(3, &mut NoopSink).unwrap();
        assert!(tree.find(&3));
    }

    impl<T: Ord> RawBTree<T> {
        fn in_order_under(&self, id: NodeId) -> Vec<&T> {
            let node = self.nodes.get(id);
            let mut out = Vec::new();
            for (i, key) in node.keys().iter().enumerate() {
                if !node.is_leaf() {
                    out.extend(self.in_order_under(node.child(i)));
                }
                out.push(key);
            }
            if let Some(last) = node.last_child() {
                out.extend(self.in_order_under(last));
            }
            out
        }
    }

    // Test operations enum for property testing
    #[derive(Clone, Debug)]
    enum Op {
        Insert(i32),
        Remove(i32),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => (0i32..200).prop_map(Op::Insert),
            2 => (0i32..200).prop_map(Op::Remove),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn tree_invariants_maintained_after_operations(
            m in 3usize..10,
            ops in prop::collection::vec(op_strategy(), 0..400),
        ) {
            let mut tree = tree(m);
            let mut model: BTreeMap<i32, usize> = BTreeMap::new();

            for op in ops {
                match op {
                    Op::Insert(key) => {
                        tree.insert(key, &mut NoopSink).unwrap();
                        *model.entry(key).or_default() += 1;
                    }
                    Op::Remove(key) => {
                        let expected = match model.get_mut(&key) {
                            Some(n) if *n > 1 => {
                                *n -= 1;
                                true
                            }
                            Some(_) => {
                                model.remove(&key);
                                true
                            }
                            None => false,
                        };
                        prop_assert_eq!(tree.remove(&key, &mut NoopSink), expected);
                    }
                }
                if let Err(err) = tree.validate() {
                    prop_assert!(false, "order {}: {}", m, err);
                }
            }

            let expected: Vec<i32> = model
                .iter()
                .flat_map(|(&k, &n)| core::iter::repeat_n(k, n))
                .collect();
            prop_assert_eq!(keys(&tree), expected);
            prop_assert_eq!(tree.len(), model.values().sum::<usize>());
        }

        #[test]
        fn node_lifecycle_events_balance(
            m in 3usize..8,
            ops in prop::collection::vec(op_strategy(), 0..200),
        ) {
            let mut sink = RecordingSink::new();
            let mut tree = RawBTree::new(Order::new(m).unwrap(), &mut sink);
            for op in ops {
                match op {
                    Op::Insert(key) => tree.insert(key, &mut sink).unwrap(),
                    Op::Remove(key) => {
                        tree.remove(&key, &mut sink);
                    }
                }
            }

            let created = sink.events().iter().filter(|e| matches!(e, Event::NodeCreated { .. })).count();
            let destroyed = sink.events().iter().filter(|e| matches!(e, Event::NodeDestroyed { .. })).count();
            prop_assert_eq!(created - destroyed, tree.node_count());

            let before = sink.events().iter().filter(|e| e.phase() == Some(Phase::Before)).count();
            let after = sink.events().iter().filter(|e| e.phase() == Some(Phase::After)).count();
            prop_assert_eq!(before, after);
        }
    }
}
