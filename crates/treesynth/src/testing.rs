//! Test helpers: hand-built source trees.
//!
//! [`source_tree!`](crate::source_tree) builds a [`SourceTree`] node by node:
//!
//! ```
//! use treesynth::source::TreeSource;
//!
//! let tree = treesynth::source_tree! {
//!     0 => split(0, 0.5) -> 1, 2,
//!     1 => leaf([3, 0]),
//!     2 => leaf([0, 3]),
//! };
//! assert_eq!(tree.n_nodes(), 3);
//! ```
//!
//! Node ids may be given in any order. Gaps are filled with leaves that have
//! no class distribution, which extraction rejects.

use crate::compat::sklearn::SklearnTree;
use crate::source::{TREE_LEAF, TREE_UNDEFINED};

/// The flat-array tree the macro produces.
pub type SourceTree = SklearnTree;

/// Incremental builder behind [`source_tree!`](crate::source_tree).
#[derive(Debug, Clone, Default)]
pub struct SourceTreeBuilder {
    tree: SklearnTree,
}

impl SourceTreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Split node. Raw indices are taken as-is so malformed trees can be built.
    pub fn split(&mut self, id: usize, feature: i64, threshold: f64, left: i64, right: i64) {
        self.ensure(id);
        let tree = &mut self.tree;
        tree.feature[id] = feature;
        tree.threshold[id] = threshold;
        tree.children_left[id] = left;
        tree.children_right[id] = right;
    }

    pub fn leaf(&mut self, id: usize, class_counts: &[u64]) {
        self.ensure(id);
        let tree = &mut self.tree;
        tree.feature[id] = TREE_UNDEFINED;
        tree.threshold[id] = TREE_UNDEFINED as f64;
        tree.children_left[id] = TREE_LEAF;
        tree.children_right[id] = TREE_LEAF;
        tree.class_counts[id] = class_counts.to_vec();
    }

    pub fn build(self) -> SourceTree {
        self.tree
    }

    fn ensure(&mut self, id: usize) {
        let tree = &mut self.tree;
        if tree.children_left.len() <= id {
            let n = id + 1;
            tree.children_left.resize(n, TREE_LEAF);
            tree.children_right.resize(n, TREE_LEAF);
            tree.feature.resize(n, TREE_UNDEFINED);
            tree.threshold.resize(n, TREE_UNDEFINED as f64);
            tree.class_counts.resize(n, Vec::new());
        }
    }
}

/// Build a [`SourceTree`](crate::testing::SourceTree) from node declarations.
///
/// - `id => split(feature, threshold) -> left, right`
/// - `id => leaf([count, ...])`
#[macro_export]
macro_rules! source_tree {
    (@node $b:ident; ) => {};
    (@node $b:ident; $id:literal => split($feature:expr, $threshold:expr) -> $left:expr, $right:expr $(, $($rest:tt)*)?) => {
        $b.split($id, $feature, $threshold, $left, $right);
        $crate::source_tree!(@node $b; $($($rest)*)?);
    };
    (@node $b:ident; $id:literal => leaf([$($count:expr),* $(,)?]) $(, $($rest:tt)*)?) => {
        $b.leaf($id, &[$($count),*]);
        $crate::source_tree!(@node $b; $($($rest)*)?);
    };
    ($($body:tt)*) => {{
        let mut builder = $crate::testing::SourceTreeBuilder::new();
        $crate::source_tree!(@node builder; $($body)*);
        builder.build()
    }};
}

/// Two-class stump on feature 0: `x <= threshold` is class 0, else class 1.
pub fn stump(threshold: f64) -> SourceTree {
    let mut builder = SourceTreeBuilder::new();
    builder.split(0, 0, threshold, 1, 2);
    builder.leaf(1, &[1, 0]);
    builder.leaf(2, &[0, 1]);
    builder.build()
}
