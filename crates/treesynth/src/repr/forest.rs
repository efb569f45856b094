//! Quantized random forest (ordered collection of trees + majority vote).

use std::collections::BTreeSet;

use crate::error::{ensure_shape, Error, Result};
use crate::fixed::quantize_row;
use crate::inference::{majority_vote, vote_counts, ClassLabel, Classifier};
use crate::utils::Parallelism;

use super::tree::{QuantizedTree, TreeStats};

/// Forest of quantized trees.
///
/// Every member shares the forest's `n_features` and `bits_per_feature`, so a
/// sample is quantized once and fed to all trees as integers.
#[derive(Debug, Clone)]
pub struct QuantizedForest {
    name: String,
    n_features: usize,
    bits_per_feature: u32,
    trees: Vec<QuantizedTree>,
    parallelism: Parallelism,
}

impl QuantizedForest {
    /// Create an empty forest.
    pub fn new(name: impl Into<String>, n_features: usize, bits_per_feature: u32) -> Self {
        Self {
            name: name.into(),
            n_features,
            bits_per_feature,
            trees: Vec::new(),
            parallelism: Parallelism::Sequential,
        }
    }

    /// Evaluate member trees in parallel during [`predict`](Self::predict).
    pub fn with_parallelism(mut self, parallelism: Parallelism) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Add a tree to the forest.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] if the tree's feature count or bit width
    /// differs from the forest's.
    pub fn push_tree(&mut self, tree: QuantizedTree) -> Result<()> {
        if tree.n_features() != self.n_features || tree.bits_per_feature() != self.bits_per_feature
        {
            return Err(Error::InvalidArgument(format!(
                "tree `{}` has {} features at {} bits, forest `{}` expects {} at {}",
                tree.name(),
                tree.n_features(),
                tree.bits_per_feature(),
                self.name,
                self.n_features,
                self.bits_per_feature
            )));
        }
        self.trees.push(tree);
        Ok(())
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    #[inline]
    pub fn bits_per_feature(&self) -> u32 {
        self.bits_per_feature
    }

    #[inline]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    #[inline]
    pub fn tree(&self, idx: usize) -> &QuantizedTree {
        &self.trees[idx]
    }

    pub fn trees(&self) -> impl Iterator<Item = &QuantizedTree> {
        self.trees.iter()
    }

    /// Widest class distribution across member trees.
    pub fn n_classes(&self) -> usize {
        self.trees.iter().map(QuantizedTree::n_classes).max().unwrap_or(0)
    }

    /// Union of member leaf-class universes.
    pub fn class_universe(&self) -> BTreeSet<ClassLabel> {
        self.trees.iter().flat_map(|t| t.class_universe()).collect()
    }

    pub fn stats(&self) -> Vec<TreeStats> {
        self.trees.iter().map(QuantizedTree::stats).collect()
    }

    // =========================================================================
    // Prediction
    // =========================================================================

    /// Per-class vote counts for one sample, sized to [`n_classes`](Self::n_classes).
    ///
    /// # Errors
    ///
    /// [`Error::EmptyModel`] for a forest without trees, plus the sample
    /// errors of [`QuantizedTree::predict`].
    pub fn votes(&self, sample: &[f64]) -> Result<Vec<u64>> {
        let labels = self.member_predictions(sample)?;
        let mut votes = vote_counts(&labels);
        votes.resize(votes.len().max(self.n_classes()), 0);
        Ok(votes)
    }

    /// Majority vote of the member trees, lowest class index on ties.
    ///
    /// Hard voting, as the emitted circuit does. scikit-learn's forest
    /// averages leaf distributions instead, see
    /// [`ReferenceForest`](crate::source::ReferenceForest).
    pub fn predict(&self, sample: &[f64]) -> Result<ClassLabel> {
        let labels = self.member_predictions(sample)?;
        majority_vote(&labels).ok_or(Error::EmptyModel)
    }

    /// Class predicted by each member tree, in forest order.
    pub fn member_predictions(&self, sample: &[f64]) -> Result<Vec<ClassLabel>> {
        if self.trees.is_empty() {
            return Err(Error::EmptyModel);
        }
        ensure_shape("sample", self.n_features, sample.len())?;
        let mantissas = quantize_row(sample, self.bits_per_feature)?;
        // Joins before returning; the vote only sees complete results.
        Ok(self
            .parallelism
            .maybe_par_map(self.trees.as_slice(), |tree| tree.classify(&mantissas)))
    }
}

impl Classifier for QuantizedForest {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict(&self, sample: &[f64]) -> Result<ClassLabel> {
        QuantizedForest::predict(self, sample)
    }
}
