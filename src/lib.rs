//! A classic B-Tree of configurable order for Rust.
//!
//! This crate provides [`BTree`], an ordered multiset whose occupancy bounds are derived from
//! an order `m` chosen at construction time, and which reports every structural change it
//! makes to an [`EventSink`].
//!
//! # Example
//!
//! ```
//! use mtree::{BTree, Event, Phase, RecordingSink};
//!
//! let mut tree = BTree::with_sink(5, RecordingSink::new()).unwrap();
//! for v in [10, 20, 5, 6, 12, 30, 7, 17] {
//!     tree.insert(v).unwrap();
//! }
//!
//! assert!(tree.find(&12));
//! assert_eq!(tree.keys(), [&5, &6, &7, &10, &12, &17, &20, &30]);
//!
//! // The fifth insert split the full root leaf.
//! let splits = tree
//!     .sink()
//!     .events()
//!     .iter()
//!     .filter(|e| matches!(e, Event::Split { phase: Phase::After, .. }))
//!     .count();
//! assert!(splits >= 1);
//! ```
//!
//! # Features
//!
//! - **`no_std` compatible** - Only requires `alloc`, no standard library dependency
//! - **Any order `m >= 3`** - Node capacity is a runtime parameter, not a type parameter
//! - **Duplicates** - Equal keys are all kept, removal takes out one at a time
//! - **Observable** - Splits, merges, borrows and root changes are reported as [`Event`]s
//!
//! # Implementation
//!
//! Nodes live in an arena and refer to their children by [`NodeId`]. Insertion splits full
//! nodes top-down so a single descent suffices. Removal descends once as well and repairs
//! an underfull child on the way back up, borrowing from a sibling when one can spare a key
//! and merging otherwise.

#![no_std]
// These forbid rules and lint groups are meant to be very restrictive.
#![forbid(unsafe_code)]
#![forbid(keyword_idents)]
#![forbid(non_ascii_idents)]
#![forbid(unreachable_pub)]
#![warn(clippy::all)]
#![warn(clippy::cargo)]
#![warn(clippy::pedantic)]
// Enable coverage attributes for nightly builds.
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

extern crate alloc;

mod btree;
mod error;
mod event;
mod order;
mod raw;

pub use btree::{BTree, Dump};
pub use error::{Error, Result};
pub use event::{Event, EventSink, NoopSink, Phase, RecordingSink, Side, TracingSink};
pub use order::{MIN_ORDER, Order};
pub use raw::NodeId;
