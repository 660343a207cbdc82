//! Structural events and the sinks that receive them.
//!
//! A [`BTree`](crate::BTree) owns one [`EventSink`], chosen at construction, and reports
//! every structural mutation to it. Restructuring steps (split, merge, borrow, leaf insert,
//! leaf erase, root change) are reported twice, once with [`Phase::Before`] and once with
//! [`Phase::After`]; node lifecycle and key substitution are reported once.
//!
//! Events borrow keys straight out of the tree, so a sink that keeps them must clone
//! (see [`Event::cloned`] and [`RecordingSink`]). The textual shape of a trace is entirely up
//! to the sink; [`TracingSink`] forwards events to `tracing` as structured fields.
//!
//! # Examples
//!
//! ```
//! use mtree::{BTree, Event, Phase, RecordingSink};
//!
//! let mut tree = BTree::with_sink(3, RecordingSink::new()).unwrap();
//! tree.insert(1).unwrap();
//! tree.insert(2).unwrap();
//! tree.insert(3).unwrap(); // the root is full: split, then promote
//!
//! let splits = tree
//!     .sink()
//!     .events()
//!     .iter()
//!     .filter(|e| matches!(e, Event::Split { phase: Phase::After, .. }))
//!     .count();
//! assert_eq!(splits, 1);
//! ```

use alloc::vec::Vec;

use crate::raw::NodeId;

/// Whether an event was emitted before or after the step it describes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Phase {
    Before,
    After,
}

/// Which sibling a borrow takes from.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Side {
    Left,
    Right,
}

/// One structural mutation of a tree.
///
/// `K` is `&T` while the event is being delivered and `T` once a sink has cloned it.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Event<K> {
    /// A node was allocated.
    NodeCreated { node: NodeId, leaf: bool },

    /// A node was freed; its id may be reused by a later `NodeCreated`.
    NodeDestroyed { node: NodeId },

    /// The tree's root pointer moves from `old` to `new`. `old` is `None` only for the
    /// root created by the constructor or by `clear`.
    RootChanged {
        phase: Phase,
        old: Option<NodeId>,
        new: NodeId,
    },

    /// A full node is split. `sibling` and `median` are known only after the split.
    Split {
        phase: Phase,
        node: NodeId,
        sibling: Option<NodeId>,
        median: Option<K>,
    },

    /// `right` and the `parent` key `separator` are folded into `left`. `right` is destroyed
    /// between the two phases.
    Merge {
        phase: Phase,
        parent: NodeId,
        left: NodeId,
        right: NodeId,
        separator: K,
    },

    /// `key` rotates from `donor` up into `parent`, and the parent separator rotates down into
    /// `recipient`. For internal nodes the donor's outermost child moves with it.
    Borrow {
        phase: Phase,
        side: Side,
        parent: NodeId,
        donor: NodeId,
        recipient: NodeId,
        key: K,
    },

    /// `key` enters leaf `node` at `index`.
    LeafInsert {
        phase: Phase,
        node: NodeId,
        index: usize,
        key: K,
    },

    /// `key` leaves leaf `node` from `index`.
    LeafErase {
        phase: Phase,
        node: NodeId,
        index: usize,
        key: K,
    },

    /// An internal key was overwritten by its predecessor or successor during removal.
    KeyReplaced {
        node: NodeId,
        index: usize,
        old: K,
        new: K,
    },
}

impl<K> Event<K> {
    /// Returns the phase of a two-phase event, or `None` for single-shot events.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            Event::RootChanged { phase, .. }
            | Event::Split { phase, .. }
            | Event::Merge { phase, .. }
            | Event::Borrow { phase, .. }
            | Event::LeafInsert { phase, .. }
            | Event::LeafErase { phase, .. } => Some(*phase),
            Event::NodeCreated { .. } | Event::NodeDestroyed { .. } | Event::KeyReplaced { .. } => None,
        }
    }

    /// A short, stable name for the kind of event.
    pub fn name(&self) -> &'static str {
        match self {
            Event::NodeCreated { .. } => "node_created",
            Event::NodeDestroyed { .. } => "node_destroyed",
            Event::RootChanged { .. } => "root_changed",
            Event::Split { .. } => "split",
            Event::Merge { .. } => "merge",
            Event::Borrow { .. } => "borrow",
            Event::LeafInsert { .. } => "leaf_insert",
            Event::LeafErase { .. } => "leaf_erase",
            Event::KeyReplaced { .. } => "key_replaced",
        }
    }

    /// Converts the key payload with `f`, keeping everything else.
    pub fn map_keys<U>(self, mut f: impl FnMut(K) -> U) -> Event<U> {
        match self {
            Event::NodeCreated { node, leaf } => Event::NodeCreated { node, leaf },
            Event::NodeDestroyed { node } => Event::NodeDestroyed { node },
            Event::RootChanged { phase, old, new } => Event::RootChanged { phase, old, new },
            Event::Split {
                phase,
                node,
                sibling,
                median,
            } => Event::Split {
                phase,
                node,
                sibling,
                median: median.map(f),
            },
            Event::Merge {
                phase,
                parent,
                left,
                right,
                separator,
            } => Event::Merge {
                phase,
                parent,
                left,
                right,
                separator: f(separator),
            },
            Event::Borrow {
                phase,
                side,
                parent,
                donor,
                recipient,
                key,
            } => Event::Borrow {
                phase,
                side,
                parent,
                donor,
                recipient,
                key: f(key),
            },
            Event::LeafInsert { phase, node, index, key } => Event::LeafInsert {
                phase,
                node,
                index,
                key: f(key),
            },
            Event::LeafErase { phase, node, index, key } => Event::LeafErase {
                phase,
                node,
                index,
                key: f(key),
            },
            Event::KeyReplaced { node, index, old, new } => {
                let old = f(old);
                Event::KeyReplaced {
                    node,
                    index,
                    old,
                    new: f(new),
                }
            }
        }
    }
}

impl<T: Clone> Event<&T> {
    /// Clones the borrowed keys so the event can outlive the tree operation.
    pub fn cloned(self) -> Event<T> {
        self.map_keys(T::clone)
    }
}

/// Receives the structural events of one tree.
///
/// Any `FnMut(Event<&T>)` closure is a sink.
pub trait EventSink<T> {
    fn on_event(&mut self, event: Event<&T>);
}

impl<T, F> EventSink<T> for F
where
    F: FnMut(Event<&T>),
{
    fn on_event(&mut self, event: Event<&T>) {
        self(event);
    }
}

/// Discards every event. The default sink.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct NoopSink;

impl<T> EventSink<T> for NoopSink {
    #[inline]
    fn on_event(&mut self, _event: Event<&T>) {}
}

/// Forwards events to `tracing` under the `mtree::event` target.
///
/// Node lifecycle and root changes are logged at `DEBUG`, everything else at `TRACE`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TracingSink;

impl<T: core::fmt::Debug> EventSink<T> for TracingSink {
    fn on_event(&mut self, event: Event<&T>) {
        match event {
            Event::NodeCreated { node, leaf } => {
                tracing::debug!(target: "mtree::event", %node, leaf, "node created");
            }
            Event::NodeDestroyed { node } => {
                tracing::debug!(target: "mtree::event", %node, "node destroyed");
            }
            Event::RootChanged { phase, old, new } => {
                tracing::debug!(target: "mtree::event", ?phase, ?old, %new, "root changed");
            }
            Event::Split {
                phase,
                node,
                sibling,
                median,
            } => {
                tracing::trace!(target: "mtree::event", ?phase, %node, ?sibling, ?median, "split");
            }
            Event::Merge {
                phase,
                parent,
                left,
                right,
                separator,
            } => {
                tracing::trace!(target: "mtree::event", ?phase, %parent, %left, %right, ?separator, "merge");
            }
            Event::Borrow {
                phase,
                side,
                parent,
                donor,
                recipient,
                key,
            } => {
                tracing::trace!(
                    target: "mtree::event",
                    ?phase,
                    ?side,
                    %parent,
                    %donor,
                    %recipient,
                    ?key,
                    "borrow"
                );
            }
            Event::LeafInsert { phase, node, index, key } => {
                tracing::trace!(target: "mtree::event", ?phase, %node, index, ?key, "leaf insert");
            }
            Event::LeafErase { phase, node, index, key } => {
                tracing::trace!(target: "mtree::event", ?phase, %node, index, ?key, "leaf erase");
            }
            Event::KeyReplaced { node, index, old, new } => {
                tracing::trace!(target: "mtree::event", %node, index, ?old, ?new, "key replaced");
            }
        }
    }
}

/// Keeps an owned copy of every event, in order.
///
/// Useful for tests and for tools that rebuild a mirror of the tree from its event stream.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RecordingSink<T> {
    events: Vec<Event<T>>,
}

impl<T> RecordingSink<T> {
    pub const fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// All events received so far.
    pub fn events(&self) -> &[Event<T>] {
        &self.events
    }

    /// Returns the recorded events, leaving the sink empty.
    pub fn take(&mut self) -> Vec<Event<T>> {
        core::mem::take(&mut self.events)
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl<T> Default for RecordingSink<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> EventSink<T> for RecordingSink<T> {
    fn on_event(&mut self, event: Event<&T>) {
        self.events.push(event.cloned());
    }
}
