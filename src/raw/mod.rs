mod arena;
mod handle;
mod node;
mod raw_btree;

pub use handle::NodeId;
pub(crate) use raw_btree::RawBTree;
