//! Error types for the B-Tree.

use alloc::string::String;

use thiserror::Error;

/// Convenient `Result` alias for fallible tree operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Everything that can go wrong when building or mutating a [`BTree`](crate::BTree).
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum Error {
    /// The requested order is below [`MIN_ORDER`](crate::MIN_ORDER).
    ///
    /// Returned by the constructors before any tree state exists.
    #[error("invalid order {order}: a B-Tree needs an order of at least {min}", min = crate::MIN_ORDER)]
    InvalidOrder {
        /// The rejected order.
        order: usize,
    },

    /// The rebalancing logic broke one of its own invariants.
    ///
    /// This is a bug, never a consequence of caller input. A tree that returned it
    /// must be treated as corrupted.
    #[error("internal invariant violated: {0}")]
    Invariant(String),
}

impl Error {
    /// Builds an [`Error::Invariant`], logging it at error level first.
    pub(crate) fn invariant(context: impl Into<String>) -> Self {
        let context = context.into();
        tracing::error!(%context, "b-tree invariant violated");
        Error::Invariant(context)
    }
}
