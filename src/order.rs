use crate::error::{Error, Result};

/// The smallest order a [`BTree`](crate::BTree) accepts.
pub const MIN_ORDER: usize = 3;

/// A validated B-Tree order `m`: the maximum number of children of an internal node.
///
/// Every occupancy bound of the tree is derived from `m` once, here, and never changes:
///
/// | bound | value |
/// |---|---|
/// | `max_keys` | `m - 1` |
/// | `min_size` | `floor(m / 2)`, minimum children of a non-root internal node |
/// | `min_keys` | `min_size - 1`, minimum keys of a non-root node |
///
/// `min_keys` is what a pre-emptive split of a full node can guarantee to both halves:
/// splitting `m - 1` keys around `(m - 1) / 2` leaves `floor(m / 2) - 1` keys on the
/// smaller side.
///
/// # Examples
///
/// ```
/// use mtree::Order;
///
/// let order = Order::new(5).unwrap();
/// assert_eq!(order.max_keys(), 4);
/// assert_eq!(order.min_keys(), 1);
/// assert!(Order::new(2).is_err());
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Order(usize);

impl Order {
    /// Validates `m`, failing with [`Error::InvalidOrder`] below [`MIN_ORDER`].
    pub fn new(m: usize) -> Result<Self> {
        if m < MIN_ORDER {
            return Err(Error::InvalidOrder { order: m });
        }
        Ok(Self(m))
    }

    /// Returns `m`.
    #[must_use]
    pub const fn get(self) -> usize {
        self.0
    }

    #[must_use]
    pub const fn max_keys(self) -> usize {
        self.0 - 1
    }

    #[must_use]
    pub const fn min_size(self) -> usize {
        self.0 / 2
    }

    #[must_use]
    pub const fn min_keys(self) -> usize {
        self.min_size() - 1
    }

    /// Index of the key promoted when a full node splits.
    #[must_use]
    pub(crate) const fn split_index(self) -> usize {
        self.max_keys() / 2
    }
}

impl TryFrom<usize> for Order {
    type Error = Error;

    fn try_from(m: usize) -> Result<Self> {
        Self::new(m)
    }
}
