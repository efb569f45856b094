//! Class-label inference primitives.
//!
//! [`Classifier`] is the seam the equivalence checker drives: the quantized
//! tree and forest implement it, and so do the float reference predictors in
//! [`crate::source`]. The free functions here fix the two tie-break rules the
//! whole crate shares:
//!
//! - a leaf predicts the class with the largest count, lowest index on ties;
//! - a forest predicts the class with the most votes, lowest index on ties.
//!
//! [`argmax_probability`] applies the same tie-break to averaged class
//! distributions, which is how the float reference forest decides.

use crate::error::Result;

/// Predicted class index.
pub type ClassLabel = u32;

/// Anything that maps a sample to a class label.
///
/// `Sync` so the checker can evaluate samples across worker threads.
pub trait Classifier: Sync {
    /// Number of features a sample must carry.
    fn n_features(&self) -> usize;

    /// Predict the class of one sample.
    fn predict(&self, sample: &[f64]) -> Result<ClassLabel>;
}

impl<C: Classifier + ?Sized> Classifier for &C {
    fn n_features(&self) -> usize {
        (**self).n_features()
    }

    fn predict(&self, sample: &[f64]) -> Result<ClassLabel> {
        (**self).predict(sample)
    }
}

/// Index of the largest count, lowest index on ties. `None` when empty.
#[inline]
pub fn argmax_class(counts: &[u64]) -> Option<ClassLabel> {
    let mut best: Option<(usize, u64)> = None;
    for (idx, &count) in counts.iter().enumerate() {
        match best {
            Some((_, best_count)) if count <= best_count => {}
            _ => best = Some((idx, count)),
        }
    }
    best.map(|(idx, _)| idx as ClassLabel)
}

/// Index of the largest probability, lowest index on ties. `None` when empty.
pub fn argmax_probability(proba: &[f64]) -> Option<ClassLabel> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, &p) in proba.iter().enumerate() {
        match best {
            Some((_, best_p)) if p <= best_p => {}
            _ => best = Some((idx, p)),
        }
    }
    best.map(|(idx, _)| idx as ClassLabel)
}

/// Per-class vote counts, sized to fit the largest label seen.
pub fn vote_counts(labels: &[ClassLabel]) -> Vec<u64> {
    let n_classes = labels.iter().max().map_or(0, |&m| m as usize + 1);
    let mut counts = vec![0u64; n_classes];
    for &label in labels {
        counts[label as usize] += 1;
    }
    counts
}

/// Majority vote with lowest-index tie-break. `None` when `labels` is empty.
#[inline]
pub fn majority_vote(labels: &[ClassLabel]) -> Option<ClassLabel> {
    argmax_class(&vote_counts(labels))
}
