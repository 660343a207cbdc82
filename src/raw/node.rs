use alloc::vec::Vec;

use super::handle::NodeId;

/// A B-Tree node: sorted keys plus, for internal nodes, one more child than keys.
#[derive(Clone, Debug)]
pub(crate) struct Node<T> {
    // Explicit rather than inferred from `children.is_empty()`; an internal node is never
    // childless, but the flag keeps leaf-only paths from touching `children` at all.
    leaf: bool,
    keys: Vec<T>,
    children: Vec<NodeId>,
}

impl<T> Node<T> {
    /// Creates a new empty leaf node.
    pub(crate) fn new_leaf(max_keys: usize) -> Self {
        Self {
            leaf: true,
            keys: Vec::with_capacity(max_keys),
            children: Vec::new(),
        }
    }

    /// Creates the internal node produced by promoting `median` above a split pair.
    pub(crate) fn new_root(max_keys: usize, median: T, left: NodeId, right: NodeId) -> Self {
        let mut keys = Vec::with_capacity(max_keys);
        keys.push(median);
        let mut children = Vec::with_capacity(max_keys + 1);
        children.push(left);
        children.push(right);
        Self {
            leaf: false,
            keys,
            children,
        }
    }

    /// Returns true if this is a leaf node.
    pub(crate) fn is_leaf(&self) -> bool {
        self.leaf
    }

    /// Returns the number of keys in this node.
    pub(crate) fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// Returns the key at the given index.
    #[inline]
    pub(crate) fn key(&self, index: usize) -> &T {
        &self.keys[index]
    }

    pub(crate) fn keys(&self) -> &[T] {
        &self.keys
    }

    pub(crate) fn first_key(&self) -> Option<&T> {
        self.keys.first()
    }

    pub(crate) fn last_key(&self) -> Option<&T> {
        self.keys.last()
    }

    /// Returns the child at the given index.
    #[inline]
    pub(crate) fn child(&self, index: usize) -> NodeId {
        self.children[index]
    }

    pub(crate) fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub(crate) fn first_child(&self) -> Option<NodeId> {
        self.children.first().copied()
    }

    pub(crate) fn last_child(&self) -> Option<NodeId> {
        self.children.last().copied()
    }

    pub(crate) fn insert_key(&mut self, index: usize, key: T) {
        self.keys.insert(index, key);
    }

    pub(crate) fn remove_key(&mut self, index: usize) -> T {
        self.keys.remove(index)
    }

    /// Overwrites the key at `index`, returning the previous one.
    pub(crate) fn replace_key(&mut self, index: usize, key: T) -> T {
        core::mem::replace(&mut self.keys[index], key)
    }

    pub(crate) fn insert_child(&mut self, index: usize, child: NodeId) {
        self.children.insert(index, child);
    }

    pub(crate) fn remove_child(&mut self, index: usize) -> NodeId {
        self.children.remove(index)
    }

    /// Pops the last key and, for internal nodes, the last child.
    pub(crate) fn pop_back(&mut self) -> (T, Option<NodeId>) {
        let key = self.keys.pop().expect("`Node::pop_back()` - node has no keys!");
        let child = if self.leaf { None } else { self.children.pop() };
        (key, child)
    }

    /// Pops the first key and, for internal nodes, the first child.
    pub(crate) fn pop_front(&mut self) -> (T, Option<NodeId>) {
        assert!(!self.keys.is_empty(), "`Node::pop_front()` - node has no keys!");
        let key = self.keys.remove(0);
        let child = if self.leaf { None } else { Some(self.children.remove(0)) };
        (key, child)
    }

    pub(crate) fn push_back(&mut self, key: T, child: Option<NodeId>) {
        self.keys.push(key);
        if let Some(child) = child {
            self.children.push(child);
        }
    }

    pub(crate) fn push_front(&mut self, key: T, child: Option<NodeId>) {
        self.keys.insert(0, key);
        if let Some(child) = child {
            self.children.insert(0, child);
        }
    }

    /// Splits this node around `keys[mid]`. Returns (`median`, `sibling`).
    ///
    /// The sibling receives `keys[mid + 1..]` and, for internal nodes, `children[mid + 1..]`;
    /// this node keeps `keys[..mid]` and `children[..=mid]`.
    pub(crate) fn split_off(&mut self, mid: usize) -> (T, Node<T>) {
        let capacity = self.keys.capacity();
        let mut sibling = Node {
            leaf: self.leaf,
            keys: Vec::with_capacity(capacity),
            children: Vec::new(),
        };

        sibling.keys.extend(self.keys.drain(mid + 1..));
        if !self.leaf {
            sibling.children.reserve(capacity + 1);
            sibling.children.extend(self.children.drain(mid + 1..));
        }

        let median = self.keys.pop().expect("`Node::split_off()` - `mid` is out of range!");

        (median, sibling)
    }

    /// Absorbs `separator` and all of `right`'s keys and children. `right` is consumed.
    pub(crate) fn absorb(&mut self, separator: T, mut right: Node<T>) {
        self.keys.push(separator);
        self.keys.append(&mut right.keys);
        self.children.append(&mut right.children);
    }
}

impl<T: Ord> Node<T> {
    /// Returns the smallest index `i` with `keys[i] >= val`.
    ///
    /// For duplicates this is the first equal key, which is both the leaf insertion point
    /// and the child to descend into when `keys[i] != val`.
    #[inline]
    pub(crate) fn key_index(&self, val: &T) -> usize {
        self.keys.partition_point(|k| k < val)
    }

    /// Returns the index of `val` in this node, if the key at `key_index` equals it.
    #[inline]
    pub(crate) fn position(&self, val: &T) -> Result<usize, usize> {
        let idx = self.key_index(val);
        if self.keys.get(idx).is_some_and(|k| k == val) {
            Ok(idx)
        } else {
            Err(idx)
        }
    }
}
