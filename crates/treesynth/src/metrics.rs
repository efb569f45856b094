//! Classification metrics over predicted labels.

use std::fmt;

use ndarray::Array2;

use crate::error::{ensure_shape, Error, Result};
use crate::inference::ClassLabel;

// =============================================================================
// Accuracy
// =============================================================================

/// Proportion of correct predictions. Returns 0.0 for empty input.
pub fn accuracy(targets: &[ClassLabel], predictions: &[ClassLabel]) -> Result<f64> {
    ensure_shape("predictions", targets.len(), predictions.len())?;
    if targets.is_empty() {
        return Ok(0.0);
    }
    let correct = targets
        .iter()
        .zip(predictions)
        .filter(|(t, p)| t == p)
        .count();
    Ok(correct as f64 / targets.len() as f64)
}

// =============================================================================
// Confusion Matrix
// =============================================================================

/// Counts indexed `[target, predicted]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfusionMatrix {
    counts: Array2<u64>,
}

impl ConfusionMatrix {
    /// Build an `n_classes × n_classes` matrix from paired labels.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] for a label at or above `n_classes`.
    pub fn from_labels(
        targets: &[ClassLabel],
        predictions: &[ClassLabel],
        n_classes: usize,
    ) -> Result<Self> {
        ensure_shape("predictions", targets.len(), predictions.len())?;
        if let Some(&label) = targets
            .iter()
            .chain(predictions)
            .find(|&&l| l as usize >= n_classes)
        {
            return Err(Error::InvalidArgument(format!(
                "label {label} is outside {n_classes} classes"
            )));
        }
        let mut counts = Array2::zeros((n_classes, n_classes));
        for (&t, &p) in targets.iter().zip(predictions) {
            counts[[t as usize, p as usize]] += 1;
        }
        Ok(Self { counts })
    }

    pub fn n_classes(&self) -> usize {
        self.counts.nrows()
    }

    pub fn counts(&self) -> &Array2<u64> {
        &self.counts
    }

    pub fn get(&self, target: ClassLabel, predicted: ClassLabel) -> u64 {
        self.counts
            .get([target as usize, predicted as usize])
            .copied()
            .unwrap_or(0)
    }

    pub fn correct(&self) -> u64 {
        self.counts.diag().sum()
    }

    pub fn total(&self) -> u64 {
        self.counts.sum()
    }

    pub fn accuracy(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.correct() as f64 / total as f64,
        }
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .counts
            .iter()
            .map(|c| c.to_string().len())
            .max()
            .unwrap_or(1);
        for row in self.counts.rows() {
            let cells: Vec<String> = row.iter().map(|c| format!("{c:>width$}")).collect();
            writeln!(f, "[{}]", cells.join(" "))?;
        }
        Ok(())
    }
}
