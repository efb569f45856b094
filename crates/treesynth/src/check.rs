//! Equivalence checking between predictors.
//!
//! [`EquivalenceChecker::compare`] runs an original and a quantized predictor
//! over the same samples and counts where they disagree.
//! [`EquivalenceChecker::compare_labels`] does the same against labels the
//! original model recorded itself.
//! [`EquivalenceChecker::compare_to_targets`] scores any number of named
//! predictors against ground-truth labels.
//!
//! Disagreements are data: they are reported, never raised as errors.
//! Samples may be evaluated in parallel; results are reduced in sample order,
//! so a report never depends on scheduling.

use std::borrow::Cow;
use std::fmt;

use ndarray::ArrayView2;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{ensure_shape, Result};
use crate::inference::{ClassLabel, Classifier};
use crate::utils::Parallelism;

/// One sample where two predictors disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Mismatch {
    pub index: usize,
    pub expected: ClassLabel,
    pub produced: ClassLabel,
}

/// Outcome of [`EquivalenceChecker::compare`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub total: usize,
    pub agreements: usize,
    pub disagreements: usize,
    /// Present when details were requested.
    pub mismatches: Option<Vec<Mismatch>>,
}

impl Report {
    pub fn is_equivalent(&self) -> bool {
        self.disagreements == 0
    }

    /// Fraction of agreeing samples; 1.0 for an empty dataset.
    pub fn agreement_rate(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.agreements as f64 / self.total as f64
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{}/{} samples agree, {} disagree",
            self.agreements, self.total, self.disagreements
        )?;
        for m in self.mismatches.iter().flatten() {
            writeln!(
                f,
                "  sample {}: expected {}, produced {}",
                m.index, m.expected, m.produced
            )?;
        }
        Ok(())
    }
}

/// One sample where at least one predictor missed the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetMismatch {
    pub index: usize,
    pub expected: ClassLabel,
    /// One label per predictor, in predictor order.
    pub predicted: Vec<ClassLabel>,
}

/// Outcome of [`EquivalenceChecker::compare_to_targets`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetReport {
    pub total: usize,
    pub names: Vec<String>,
    /// Misclassified samples per predictor, in predictor order.
    pub errors: Vec<usize>,
    pub mismatches: Option<Vec<TargetMismatch>>,
}

impl fmt::Display for TargetReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for m in self.mismatches.iter().flatten() {
            write!(f, "sample {}: expected {}", m.index, m.expected)?;
            for (name, label) in self.names.iter().zip(&m.predicted) {
                write!(f, ", {name} {label}")?;
            }
            writeln!(f)?;
        }
        for (name, errors) in self.names.iter().zip(&self.errors) {
            writeln!(f, "{name}: {errors} errors out of {}", self.total)?;
        }
        Ok(())
    }
}

/// Runs predictors side by side over a dataset.
#[derive(Debug, Clone, Copy, Default)]
pub struct EquivalenceChecker {
    record_details: bool,
    parallelism: Parallelism,
}

impl EquivalenceChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep a per-sample log of every disagreement.
    pub fn with_details(mut self, record_details: bool) -> Self {
        self.record_details = record_details;
        self
    }

    pub fn with_parallelism(mut self, parallelism: Parallelism) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Compare `original` and `quantized` on every row of `samples`.
    ///
    /// # Errors
    ///
    /// [`crate::Error::ShapeMismatch`] if the predictors disagree on the
    /// feature count or the rows have another length. Predictor errors are
    /// propagated, first failing sample first.
    pub fn compare<A, B>(
        &self,
        original: &A,
        quantized: &B,
        samples: ArrayView2<'_, f64>,
    ) -> Result<Report>
    where
        A: Classifier + ?Sized,
        B: Classifier + ?Sized,
    {
        let n_features = original.n_features();
        ensure_shape("predictor features", n_features, quantized.n_features())?;
        ensure_shape("sample", n_features, samples.ncols())?;

        let pairs = self
            .parallelism
            .maybe_par_map(0..samples.nrows(), |i| -> Result<_> {
                let row = row_slice(&samples, i);
                Ok((original.predict(&row)?, quantized.predict(&row)?))
            })
            .into_iter()
            .collect::<Result<Vec<_>>>()?;
        Ok(self.tally(pairs))
    }

    /// Compare `expected` labels, one per row, with `quantized` on `samples`.
    ///
    /// # Errors
    ///
    /// [`crate::Error::ShapeMismatch`] if `expected` and `samples` differ in
    /// length or the rows have another width than `quantized` expects.
    pub fn compare_labels<B>(
        &self,
        expected: &[ClassLabel],
        quantized: &B,
        samples: ArrayView2<'_, f64>,
    ) -> Result<Report>
    where
        B: Classifier + ?Sized,
    {
        ensure_shape("expected labels", samples.nrows(), expected.len())?;
        ensure_shape("sample", quantized.n_features(), samples.ncols())?;

        let pairs = self
            .parallelism
            .maybe_par_map(0..samples.nrows(), |i| -> Result<_> {
                let row = row_slice(&samples, i);
                Ok((expected[i], quantized.predict(&row)?))
            })
            .into_iter()
            .collect::<Result<Vec<_>>>()?;
        Ok(self.tally(pairs))
    }

    fn tally(&self, pairs: Vec<(ClassLabel, ClassLabel)>) -> Report {
        let mut mismatches = Vec::new();
        for (index, (expected, produced)) in pairs.iter().copied().enumerate() {
            if expected != produced {
                mismatches.push(Mismatch {
                    index,
                    expected,
                    produced,
                });
            }
        }

        let total = pairs.len();
        let disagreements = mismatches.len();
        if disagreements > 0 {
            warn!(total, disagreements, "quantized predictor diverges");
        } else {
            debug!(total, "predictors agree on every sample");
        }
        Report {
            total,
            agreements: total - disagreements,
            disagreements,
            mismatches: self.record_details.then_some(mismatches),
        }
    }

    /// Score named predictors against ground-truth `targets`.
    ///
    /// # Errors
    ///
    /// [`crate::Error::ShapeMismatch`] if `targets` and `samples` differ in
    /// length or a predictor expects another feature count.
    pub fn compare_to_targets(
        &self,
        targets: &[ClassLabel],
        predictors: &[(&str, &dyn Classifier)],
        samples: ArrayView2<'_, f64>,
    ) -> Result<TargetReport> {
        ensure_shape("targets", samples.nrows(), targets.len())?;
        for (_, predictor) in predictors {
            ensure_shape("sample", predictor.n_features(), samples.ncols())?;
        }

        let rows = self
            .parallelism
            .maybe_par_map(0..samples.nrows(), |i| {
                let row = row_slice(&samples, i);
                predictors
                    .iter()
                    .map(|(_, predictor)| predictor.predict(&row))
                    .collect::<Result<Vec<_>>>()
            })
            .into_iter()
            .collect::<Result<Vec<_>>>()?;

        let mut errors = vec![0usize; predictors.len()];
        let mut mismatches = Vec::new();
        for (index, (predicted, &expected)) in rows.into_iter().zip(targets).enumerate() {
            let mut wrong = false;
            for (count, &label) in errors.iter_mut().zip(&predicted) {
                if label != expected {
                    *count += 1;
                    wrong = true;
                }
            }
            if wrong {
                mismatches.push(TargetMismatch {
                    index,
                    expected,
                    predicted,
                });
            }
        }

        let names: Vec<String> = predictors.iter().map(|(name, _)| name.to_string()).collect();
        for (name, errors) in names.iter().zip(&errors) {
            debug!(predictor = %name, errors, total = targets.len(), "scored against targets");
        }
        Ok(TargetReport {
            total: targets.len(),
            names,
            errors,
            mismatches: self.record_details.then_some(mismatches),
        })
    }
}

fn row_slice<'a>(samples: &'a ArrayView2<'_, f64>, i: usize) -> Cow<'a, [f64]> {
    let row = samples.row(i);
    match row.to_slice() {
        Some(slice) => Cow::Borrowed(slice),
        None => Cow::Owned(row.to_vec()),
    }
}
