//! scikit-learn style JSON dumps.
//!
//! A dumped tree is the `tree_` attribute's parallel arrays; a dumped forest is
//! the list of its estimators' trees. Leaves carry `-1` in both child arrays
//! and `-2` as feature, matching `sklearn.tree._tree.TREE_LEAF` and
//! `TREE_UNDEFINED`.
//!
//! `class_counts` must hold per-class sample counts. scikit-learn keeps
//! `tree_.value` as `float64`, and releases from 1.4 on store fractions
//! there, so dump `tree_.value * tree_.weighted_n_node_samples[:, None]`.
//! Whole-valued floats such as `3.0` are accepted and anything within `1e-6`
//! of a whole number is rounded; other fractions are rejected on load.
//!
//! ```json
//! {
//!   "name": "hog_forest",
//!   "kind": "forest",
//!   "n_features": 2,
//!   "trees": [{
//!     "children_left":  [1, -1, -1],
//!     "children_right": [2, -1, -1],
//!     "feature":        [0, -2, -2],
//!     "threshold":      [0.5, -2.0, -2.0],
//!     "class_counts":   [[], [3, 0], [0, 3]]
//!   }]
//! }
//! ```

use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::Path;

use ndarray::Array2;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

use crate::error::{ensure_shape, Error, Result};
use crate::fixed::snap_array;
use crate::inference::ClassLabel;
use crate::source::{TreeSource, TREE_LEAF, TREE_UNDEFINED};

// =============================================================================
// Tree
// =============================================================================

/// One tree as parallel per-node arrays.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SklearnTree {
    pub children_left: Vec<i64>,
    pub children_right: Vec<i64>,
    pub feature: Vec<i64>,
    pub threshold: Vec<f64>,
    /// Per-node training class counts. Only leaf entries are read.
    #[serde(deserialize_with = "deserialize_counts")]
    pub class_counts: Vec<Vec<u64>>,
}

const COUNT_TOLERANCE: f64 = 1e-6;

fn deserialize_counts<'de, D>(deserializer: D) -> std::result::Result<Vec<Vec<u64>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<Vec<f64>>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|node| node.into_iter().map(whole_count).collect())
        .collect()
}

fn whole_count<E: de::Error>(value: f64) -> std::result::Result<u64, E> {
    let rounded = value.round();
    if value.is_finite() && rounded >= 0.0 && (value - rounded).abs() <= COUNT_TOLERANCE {
        Ok(rounded as u64)
    } else {
        Err(E::custom(format!(
            "class count {value} is not a whole number of samples; \
             dump tree_.value * tree_.weighted_n_node_samples"
        )))
    }
}

impl SklearnTree {
    /// Check that all per-node arrays have the same length.
    pub fn validate_lengths(&self) -> Result<()> {
        let n = self.children_left.len();
        ensure_shape("children_right", n, self.children_right.len())?;
        ensure_shape("feature", n, self.feature.len())?;
        ensure_shape("threshold", n, self.threshold.len())?;
        ensure_shape("class_counts", n, self.class_counts.len())?;
        Ok(())
    }
}

// Accessors fall back to sentinels so a short array surfaces as a
// malformed model during extraction rather than a panic.
impl TreeSource for SklearnTree {
    fn n_nodes(&self) -> usize {
        self.children_left.len()
    }

    fn is_leaf(&self, node: usize) -> bool {
        self.left_child(node) == TREE_LEAF && self.right_child(node) == TREE_LEAF
    }

    fn split_feature(&self, node: usize) -> i64 {
        self.feature.get(node).copied().unwrap_or(TREE_UNDEFINED)
    }

    fn split_threshold(&self, node: usize) -> f64 {
        self.threshold.get(node).copied().unwrap_or(f64::NAN)
    }

    fn left_child(&self, node: usize) -> i64 {
        self.children_left.get(node).copied().unwrap_or(TREE_LEAF)
    }

    fn right_child(&self, node: usize) -> i64 {
        self.children_right.get(node).copied().unwrap_or(TREE_LEAF)
    }

    fn class_counts(&self, node: usize) -> Option<&[u64]> {
        self.class_counts
            .get(node)
            .map(Vec::as_slice)
            .filter(|counts| !counts.is_empty())
    }
}

// =============================================================================
// Model
// =============================================================================

/// Whether a dump holds a single decision tree or a forest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Tree,
    #[default]
    Forest,
}

/// A dumped decision tree or random forest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SklearnModel {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub kind: ModelKind,
    pub n_features: usize,
    pub trees: Vec<SklearnTree>,
}

impl SklearnModel {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let model: Self = serde_json::from_str(json)?;
        model.validate()?;
        Ok(model)
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let model: Self = serde_json::from_reader(reader)?;
        model.validate()?;
        Ok(model)
    }

    fn validate(&self) -> Result<()> {
        if self.trees.is_empty() {
            return Err(Error::EmptyModel);
        }
        if self.kind == ModelKind::Tree && self.trees.len() != 1 {
            return Err(Error::MalformedModel(format!(
                "a single-tree dump holds {} trees",
                self.trees.len()
            )));
        }
        for tree in &self.trees {
            tree.validate_lengths()?;
        }
        Ok(())
    }
}

// =============================================================================
// Dataset
// =============================================================================

/// Samples with their ground-truth labels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub features: Vec<Vec<f64>>,
    pub targets: Vec<ClassLabel>,
    /// Labels the trained model itself predicted (`clf.predict(X)`), if dumped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predictions: Option<Vec<ClassLabel>>,
}

impl Dataset {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn write_json<W: io::Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_json(&mut writer)?;
        io::Write::flush(&mut writer)?;
        Ok(())
    }

    pub fn n_samples(&self) -> usize {
        self.features.len()
    }

    /// Row-major `(n_samples, n_features)` matrix.
    ///
    /// # Errors
    ///
    /// [`Error::ShapeMismatch`] for ragged rows or a target or recorded
    /// prediction count that differs from the sample count.
    pub fn to_array(&self) -> Result<Array2<f64>> {
        ensure_shape("targets", self.features.len(), self.targets.len())?;
        if let Some(predictions) = &self.predictions {
            ensure_shape("predictions", self.features.len(), predictions.len())?;
        }
        let n_features = self.features.first().map_or(0, Vec::len);
        let mut values = Vec::with_capacity(self.features.len() * n_features);
        for row in &self.features {
            ensure_shape("sample", n_features, row.len())?;
            values.extend_from_slice(row);
        }
        Array2::from_shape_vec((self.features.len(), n_features), values)
            .map_err(|e| Error::InvalidArgument(e.to_string()))
    }

    /// Reject any target or recorded prediction outside `0..n_classes`.
    pub fn validate_labels(&self, n_classes: usize) -> Result<()> {
        check_labels("target", &self.targets, n_classes)?;
        if let Some(predictions) = &self.predictions {
            check_labels("prediction", predictions, n_classes)?;
        }
        Ok(())
    }

    /// Copy with every feature snapped to the grid of `bits`.
    ///
    /// Recorded predictions belong to the unsnapped features and are dropped.
    pub fn snapped(&self, bits: u32) -> Result<Self> {
        let snapped = snap_array(self.to_array()?.view(), bits)?;
        Ok(Self {
            features: snapped.rows().into_iter().map(|row| row.to_vec()).collect(),
            targets: self.targets.clone(),
            predictions: None,
        })
    }
}

fn check_labels(what: &str, labels: &[ClassLabel], n_classes: usize) -> Result<()> {
    match labels.iter().position(|&l| l as usize >= n_classes) {
        Some(index) => Err(Error::InvalidArgument(format!(
            "sample {index}: {what} {} is outside the model's {n_classes} classes",
            labels[index]
        ))),
        None => Ok(()),
    }
}
