//! Canonical in-memory model representations.
//!
//! Trees are arenas of [`Node`]s addressed by [`NodeId`], root at 0.
//! Forests own an ordered list of trees sharing one feature width.

pub mod forest;
pub mod node;
pub mod tree;

/// Index of a node inside a tree arena.
pub type NodeId = u32;

pub use forest::QuantizedForest;
pub use node::Node;
pub use tree::{validate_nodes, QuantizedTree, TreeStats, TreeValidationError};
