use alloc::vec::Vec;
use core::fmt;

use crate::error::Result;
use crate::event::{EventSink, NoopSink};
use crate::order::Order;
use crate::raw::{NodeId, RawBTree};

/// An ordered multiset of keys stored in a B-Tree of order `m`.
///
/// Every node but the root holds between [`min_keys`](BTree::min_keys) and `m - 1` keys,
/// every internal node has one more child than it has keys, and all leaves sit at the same
/// depth. Insertion splits full nodes on the way down, so it never has to walk back up.
/// Removal repairs an underfull child right after returning from it, by borrowing from a
/// sibling or merging with one.
///
/// At order 3 a non-root node may be empty, so removal never needs to repair a child and
/// only merges around a removed separator. The height stays logarithmic while keys are
/// added, but draining a large order-3 tree can leave it much taller than `log_3 n`. Use
/// an order of 4 or more when the tree shrinks a lot.
///
/// Equal keys are all kept. [`remove`](BTree::remove) takes out exactly one of them; which
/// one depends on the shape of the tree and is not part of the contract.
///
/// Every structural change is reported to the tree's [`EventSink`], `S`. The default,
/// [`NoopSink`], compiles the reports away.
///
/// It is a logic error for a key to be modified in such a way that its ordering relative to
/// any other key, as determined by the [`Ord`] trait, changes while it is in the tree.
///
/// # Examples
///
/// ```
/// use mtree::BTree;
///
/// let mut tree = BTree::new(5).unwrap();
/// for v in [10, 20, 5, 6, 12, 30, 7, 17, 34, 2, 2, 2, 93, 44] {
///     tree.insert(v).unwrap();
/// }
/// assert!(tree.find(&34));
///
/// tree.remove(&2);
/// assert!(tree.find(&2)); // two copies left
/// assert_eq!(tree.len(), 13);
///
/// println!("{tree}");
/// ```
pub struct BTree<T, S = NoopSink> {
    raw: RawBTree<T>,
    sink: S,
}

impl<T: Ord + Clone> BTree<T> {
    /// Makes a new, empty tree of order `order` that discards its structural events.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidOrder`](crate::Error::InvalidOrder) if `order` is below
    /// [`MIN_ORDER`](crate::MIN_ORDER).
    ///
    /// # Examples
    ///
    /// ```
    /// use mtree::{BTree, Error};
    ///
    /// let tree: BTree<u32> = BTree::new(4).unwrap();
    /// assert!(tree.is_empty());
    ///
    /// assert!(matches!(BTree::<u32>::new(2), Err(Error::InvalidOrder { order: 2 })));
    /// ```
    pub fn new(order: usize) -> Result<Self> {
        Self::with_sink(order, NoopSink)
    }
}

impl<T: Ord + Clone, S: EventSink<T>> BTree<T, S> {
    /// Makes a new, empty tree of order `order` reporting to `sink`.
    ///
    /// The sink immediately sees the creation of the empty root leaf.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidOrder`](crate::Error::InvalidOrder) if `order` is below
    /// [`MIN_ORDER`](crate::MIN_ORDER). The sink is dropped without seeing any event.
    pub fn with_sink(order: usize, mut sink: S) -> Result<Self> {
        let order = Order::new(order)?;
        let raw = RawBTree::new(order, &mut sink);
        Ok(Self { raw, sink })
    }

    /// Adds `value` to the tree. Duplicates are kept.
    ///
    /// # Errors
    ///
    /// [`Error::Invariant`](crate::Error::Invariant) if the tree's own bookkeeping is broken.
    /// That is a bug in this crate, and the tree must not be used afterwards.
    pub fn insert(&mut self, value: T) -> Result<()> {
        self.raw.insert(value, &mut self.sink)
    }

    /// Removes one key equal to `value`.
    ///
    /// Returns whether a key was removed. Removing an absent value is a no-op that leaves the
    /// tree, and the sink, untouched.
    ///
    /// # Examples
    ///
    /// ```
    /// use mtree::BTree;
    ///
    /// let mut tree = BTree::new(3).unwrap();
    /// tree.insert(1).unwrap();
    /// assert!(tree.remove(&1));
    /// assert!(!tree.remove(&1));
    /// ```
    pub fn remove(&mut self, value: &T) -> bool {
        self.raw.remove(value, &mut self.sink)
    }

    /// Removes every key, leaving a single empty leaf root.
    pub fn clear(&mut self) {
        self.raw.clear(&mut self.sink);
    }
}

impl<T: Ord, S> BTree<T, S> {
    /// Returns `true` if the tree holds a key equal to `value`.
    ///
    /// Lookups never restructure the tree and never reach the sink.
    pub fn find(&self, value: &T) -> bool {
        self.raw.find(value)
    }

    /// Same as [`find`](BTree::find), named after the standard collections.
    pub fn contains(&self, value: &T) -> bool {
        self.raw.find(value)
    }

    /// Checks every structural invariant of the tree.
    ///
    /// # Errors
    ///
    /// [`Error::Invariant`](crate::Error::Invariant) describing the first violation found.
    pub fn validate(&self) -> Result<()> {
        self.raw.validate()
    }
}

impl<T, S> BTree<T, S> {
    /// Number of keys in the tree, duplicates included.
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.len() == 0
    }

    pub fn order(&self) -> Order {
        self.raw.order()
    }

    /// Fewest keys a non-root node may hold.
    pub fn min_keys(&self) -> usize {
        self.raw.order().min_keys()
    }

    /// Number of node levels. An empty tree has height 1.
    pub fn height(&self) -> usize {
        self.raw.height()
    }

    /// Number of live nodes.
    pub fn node_count(&self) -> usize {
        self.raw.node_count()
    }

    /// Id of the current root node, as reported in [`Event`](crate::Event)s.
    pub fn root_id(&self) -> NodeId {
        self.raw.root()
    }

    /// Keys of the live node `id`, or `None` if no such node exists.
    pub fn node_keys(&self, id: NodeId) -> Option<&[T]> {
        self.raw.try_node(id).map(|node| node.keys())
    }

    /// Snapshot of every key in ascending order.
    pub fn keys(&self) -> Vec<&T> {
        self.raw.in_order()
    }

    /// Node-by-node rendering of the tree, for debugging.
    ///
    /// Each node is one line, `Keys: [..]`, indented four spaces per level, parents before
    /// children.
    ///
    /// # Examples
    ///
    /// ```
    /// use mtree::BTree;
    ///
    /// let mut tree = BTree::new(3).unwrap();
    /// for v in 1..=3 {
    ///     tree.insert(v).unwrap();
    /// }
    /// assert_eq!(
    ///     tree.dump().to_string(),
    ///     "Keys: [2]\n    Keys: [1]\n    Keys: [3]\n"
    /// );
    /// ```
    pub fn dump(&self) -> Dump<'_, T> {
        Dump { raw: &self.raw }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Consumes the tree, handing back its sink.
    pub fn into_sink(self) -> S {
        self.sink
    }
}

/// Diagnostic rendering of a tree, created by [`BTree::dump`].
pub struct Dump<'a, T> {
    raw: &'a RawBTree<T>,
}

impl<T: fmt::Display> fmt::Display for Dump<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut result = Ok(());
        self.raw.for_each_node(|_, node, depth| {
            if result.is_err() {
                return;
            }
            result = (|| {
                write!(f, "{:indent$}Keys: [", "", indent = depth * 4)?;
                for (i, key) in node.keys().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}")?;
                }
                f.write_str("]\n")
            })();
        });
        result
    }
}

impl<T: fmt::Display, S> fmt::Display for BTree<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.dump(), f)
    }
}

impl<T: fmt::Debug, S> fmt::Debug for BTree<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BTree")
            .field("order", &self.raw.order().get())
            .field("len", &self.raw.len())
            .field("keys", &self.raw.in_order())
            .finish()
    }
}
