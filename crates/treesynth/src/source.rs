//! Read-only views of a trained floating-point model.
//!
//! Training toolkits store a tree as parallel per-node arrays. [`TreeSource`]
//! exposes exactly that view, and [`ForestSource`] an ordered list of them.
//! Raw indices stay signed so the toolkit's sentinels survive until
//! extraction validates them.
//!
//! [`ReferenceTree`] and [`ReferenceForest`] predict directly on the float
//! view. They are the "original" side of an equivalence check and follow
//! scikit-learn's prediction rules: samples are narrowed to `f32` before the
//! `<=` test, and a forest averages its members' normalized leaf
//! distributions instead of counting hard votes.

use crate::error::{ensure_shape, Error, Result};
use crate::inference::{argmax_class, argmax_probability, ClassLabel, Classifier};
use crate::utils::Parallelism;

/// Child index marking a leaf.
pub const TREE_LEAF: i64 = -1;

/// Feature index of a leaf.
pub const TREE_UNDEFINED: i64 = -2;

/// Per-node view of one trained tree. Node 0 is the root.
pub trait TreeSource {
    fn n_nodes(&self) -> usize;

    fn is_leaf(&self, node: usize) -> bool;

    /// Raw feature index of a split node.
    fn split_feature(&self, node: usize) -> i64;

    /// Float threshold of a split node.
    fn split_threshold(&self, node: usize) -> f64;

    fn left_child(&self, node: usize) -> i64;

    fn right_child(&self, node: usize) -> i64;

    /// Training class distribution of a leaf, `None` if the model lacks one.
    fn class_counts(&self, node: usize) -> Option<&[u64]>;
}

/// Ordered collection of trained trees.
pub trait ForestSource {
    type Tree: TreeSource;

    fn n_trees(&self) -> usize;

    fn tree(&self, idx: usize) -> &Self::Tree;
}

impl<T: TreeSource> ForestSource for Vec<T> {
    type Tree = T;

    fn n_trees(&self) -> usize {
        self.len()
    }

    fn tree(&self, idx: usize) -> &T {
        &self[idx]
    }
}

impl<T: TreeSource + ?Sized> TreeSource for &T {
    fn n_nodes(&self) -> usize {
        (**self).n_nodes()
    }
    fn is_leaf(&self, node: usize) -> bool {
        (**self).is_leaf(node)
    }
    fn split_feature(&self, node: usize) -> i64 {
        (**self).split_feature(node)
    }
    fn split_threshold(&self, node: usize) -> f64 {
        (**self).split_threshold(node)
    }
    fn left_child(&self, node: usize) -> i64 {
        (**self).left_child(node)
    }
    fn right_child(&self, node: usize) -> i64 {
        (**self).right_child(node)
    }
    fn class_counts(&self, node: usize) -> Option<&[u64]> {
        (**self).class_counts(node)
    }
}

/// Walk `tree` in the float domain and return the leaf reached.
///
/// Sample values are narrowed to `f32` before comparison, as the trained
/// model does; thresholds stay `f64`. Bounded to `n_nodes` steps, so a cyclic
/// source fails instead of hanging.
pub fn float_leaf<S: TreeSource + ?Sized>(tree: &S, sample: &[f64]) -> Result<usize> {
    let n_nodes = tree.n_nodes();
    if n_nodes == 0 {
        return Err(Error::MalformedModel("tree has no nodes".into()));
    }
    let mut node = 0usize;
    for _ in 0..n_nodes {
        if tree.is_leaf(node) {
            return Ok(node);
        }
        let feature = tree.split_feature(node);
        let value = usize::try_from(feature)
            .ok()
            .and_then(|f| sample.get(f))
            .ok_or_else(|| {
                Error::MalformedModel(format!(
                    "node {node}: feature index {feature} is outside [0, {})",
                    sample.len()
                ))
            })?;
        let child = if f64::from(*value as f32) <= tree.split_threshold(node) {
            tree.left_child(node)
        } else {
            tree.right_child(node)
        };
        node = usize::try_from(child)
            .ok()
            .filter(|&c| c < n_nodes)
            .ok_or_else(|| {
                Error::MalformedModel(format!(
                    "node {node}: child {child} is outside the arena of {n_nodes} nodes"
                ))
            })?;
    }
    Err(Error::MalformedModel(format!(
        "traversal did not reach a leaf within {n_nodes} steps"
    )))
}

/// Float-domain class of `sample` under `tree`.
pub fn float_predict<S: TreeSource + ?Sized>(tree: &S, sample: &[f64]) -> Result<ClassLabel> {
    let leaf = float_leaf(tree, sample)?;
    tree.class_counts(leaf)
        .and_then(argmax_class)
        .ok_or_else(|| Error::MalformedModel(format!("leaf {leaf} has no class distribution")))
}

/// Float-domain predictor over one source tree.
#[derive(Debug, Clone, Copy)]
pub struct ReferenceTree<'a, S> {
    source: &'a S,
    n_features: usize,
}

impl<'a, S: TreeSource> ReferenceTree<'a, S> {
    pub fn new(source: &'a S, n_features: usize) -> Self {
        Self { source, n_features }
    }
}

impl<S: TreeSource + Sync> Classifier for ReferenceTree<'_, S> {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict(&self, sample: &[f64]) -> Result<ClassLabel> {
        ensure_shape("sample", self.n_features, sample.len())?;
        float_predict(self.source, sample)
    }
}

/// Normalized class distribution of the leaf `sample` reaches.
pub fn float_proba<S: TreeSource + ?Sized>(tree: &S, sample: &[f64]) -> Result<Vec<f64>> {
    let leaf = float_leaf(tree, sample)?;
    let counts = tree
        .class_counts(leaf)
        .ok_or_else(|| Error::MalformedModel(format!("leaf {leaf} has no class distribution")))?;
    let total: u64 = counts.iter().sum();
    if total == 0 {
        return Err(Error::MalformedModel(format!(
            "leaf {leaf} has an all-zero class distribution"
        )));
    }
    Ok(counts.iter().map(|&c| c as f64 / total as f64).collect())
}

/// Float-domain forest predicting the argmax of the mean member distribution.
///
/// This is soft voting. [`crate::QuantizedForest`] counts hard votes, so the
/// two can disagree on samples where the trees are split, independently of
/// quantization.
#[derive(Debug, Clone, Copy)]
pub struct ReferenceForest<'a, F> {
    source: &'a F,
    n_features: usize,
    parallelism: Parallelism,
}

impl<'a, F: ForestSource> ReferenceForest<'a, F> {
    pub fn new(source: &'a F, n_features: usize) -> Self {
        Self {
            source,
            n_features,
            parallelism: Parallelism::Sequential,
        }
    }

    pub fn with_parallelism(mut self, parallelism: Parallelism) -> Self {
        self.parallelism = parallelism;
        self
    }
}

impl<F> Classifier for ReferenceForest<'_, F>
where
    F: ForestSource + Sync,
    F::Tree: Sync,
{
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict(&self, sample: &[f64]) -> Result<ClassLabel> {
        ensure_shape("sample", self.n_features, sample.len())?;
        let n_trees = self.source.n_trees();
        if n_trees == 0 {
            return Err(Error::EmptyModel);
        }
        let members = self
            .parallelism
            .maybe_par_map(0..n_trees, |idx| float_proba(self.source.tree(idx), sample))
            .into_iter()
            .collect::<Result<Vec<_>>>()?;

        // Summed in tree order so the result never depends on scheduling.
        let width = members.iter().map(Vec::len).max().unwrap_or(0);
        let mut mean = vec![0.0; width];
        for proba in &members {
            for (acc, p) in mean.iter_mut().zip(proba) {
                *acc += p;
            }
        }
        for acc in &mut mean {
            *acc /= n_trees as f64;
        }
        argmax_probability(&mean).ok_or(Error::EmptyModel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source_tree;

    #[test]
    fn float_traversal_goes_left_on_equal() {
        let tree = source_tree! {
            0 => split(0, 0.5) -> 1, 2,
            1 => leaf([3, 0]),
            2 => leaf([0, 3]),
        };
        assert_eq!(float_predict(&tree, &[0.5]).unwrap(), 0);
        assert_eq!(float_predict(&tree, &[0.50001]).unwrap(), 1);
    }

    #[test]
    fn cyclic_source_fails_instead_of_looping() {
        let tree = source_tree! {
            0 => split(0, 0.5) -> 1, 2,
            1 => split(0, 0.5) -> 0, 2,
            2 => leaf([1]),
        };
        let err = float_predict(&tree, &[0.1]).unwrap_err();
        assert!(matches!(err, Error::MalformedModel(_)));
    }

    #[test]
    fn float_traversal_compares_in_single_precision() {
        // 0.3f32 is slightly above 0.3f64.
        let tree = crate::testing::stump(0.3);
        assert_eq!(float_predict(&tree, &[0.3]).unwrap(), 1);
        assert_eq!(float_predict(&tree, &[0.29]).unwrap(), 0);

        let exact = crate::testing::stump(0.5);
        assert_eq!(float_predict(&exact, &[0.5]).unwrap(), 0);
    }

    #[test]
    fn leaf_distribution_is_normalized() {
        let tree = source_tree! {
            0 => split(0, 0.5) -> 1, 2,
            1 => leaf([1, 3]),
            2 => leaf([0, 0]),
        };
        assert_eq!(float_proba(&tree, &[0.1]).unwrap(), vec![0.25, 0.75]);
        assert!(matches!(
            float_proba(&tree, &[0.9]),
            Err(Error::MalformedModel(_))
        ));
    }

    #[test]
    fn reference_forest_averages_distributions() {
        // Two narrow wins for class 0 lose to one confident tree for class 1.
        let forest = vec![
            source_tree! { 0 => split(0, 0.5) -> 1, 2, 1 => leaf([51, 49]), 2 => leaf([0, 1]), },
            source_tree! { 0 => split(0, 0.5) -> 1, 2, 1 => leaf([51, 49]), 2 => leaf([0, 1]), },
            source_tree! { 0 => split(0, 0.5) -> 1, 2, 1 => leaf([0, 100]), 2 => leaf([0, 1]), },
        ];
        let reference = ReferenceForest::new(&forest, 1);
        assert_eq!(reference.predict(&[0.1]).unwrap(), 1);
        assert_eq!(
            reference
                .with_parallelism(Parallelism::Parallel)
                .predict(&[0.1])
                .unwrap(),
            1
        );
    }

    #[test]
    fn reference_forest_ties_go_to_lowest_class() {
        let forest = vec![
            source_tree! { 0 => leaf([2, 0]), },
            source_tree! { 0 => leaf([0, 5]), },
        ];
        assert_eq!(ReferenceForest::new(&forest, 1).predict(&[0.0]).unwrap(), 0);
    }

    #[test]
    fn reference_forest_votes() {
        let forest = vec![
            source_tree! { 0 => split(0, 0.5) -> 1, 2, 1 => leaf([3, 0]), 2 => leaf([0, 3]), },
            source_tree! { 0 => split(0, 0.25) -> 1, 2, 1 => leaf([3, 0]), 2 => leaf([0, 3]), },
            source_tree! { 0 => split(0, 0.75) -> 1, 2, 1 => leaf([0, 3]), 2 => leaf([3, 0]), },
        ];
        let reference = ReferenceForest::new(&forest, 1);
        assert_eq!(reference.predict(&[0.5]).unwrap(), 1);
        assert!(matches!(
            reference.predict(&[0.5, 0.1]),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn empty_reference_forest_is_an_error() {
        let forest: Vec<crate::testing::SourceTree> = Vec::new();
        let reference = ReferenceForest::new(&forest, 1);
        assert!(matches!(reference.predict(&[0.5]), Err(Error::EmptyModel)));
    }
}
