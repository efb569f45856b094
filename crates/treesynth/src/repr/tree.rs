//! Quantized decision tree: an immutable node arena.
//!
//! This module provides:
//! - [`QuantizedTree`]: arena storage plus integer-domain prediction
//! - [`TreeValidationError`]: structural validation errors
//! - [`TreeStats`]: summary counts for reporting

use std::collections::BTreeSet;
use std::fmt;

use crate::error::{ensure_shape, Result};
use crate::fixed::{quantize_row, FixedPoint};
use crate::inference::{ClassLabel, Classifier};

use super::node::Node;
use super::NodeId;

// ============================================================================
// TreeValidationError
// ============================================================================

/// Structural validation errors for [`QuantizedTree`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeValidationError {
    #[error("tree has no nodes")]
    EmptyTree,
    #[error("tree has {n_nodes} nodes, more than a 32-bit node id can address")]
    TooManyNodes { n_nodes: usize },
    #[error("node {node}: {side} child {child} is outside the arena of {n_nodes} nodes")]
    ChildOutOfBounds {
        node: NodeId,
        side: &'static str,
        child: i64,
        n_nodes: usize,
    },
    #[error("node {node} references itself as a child")]
    SelfLoop { node: NodeId },
    #[error("node {node} was reached by more than one path")]
    DuplicateVisit { node: NodeId },
    #[error("cycle detected at node {node}")]
    CycleDetected { node: NodeId },
    #[error("node {node} is unreachable from the root")]
    UnreachableNode { node: NodeId },
    #[error("node {node}: feature index {feature} is outside [0, {n_features})")]
    FeatureOutOfRange {
        node: NodeId,
        feature: i64,
        n_features: usize,
    },
    #[error("leaf {node} has no class distribution")]
    MissingDistribution { node: NodeId },
    #[error("node {node}: threshold has {bits} bits, tree uses {expected}")]
    ThresholdWidthMismatch { node: NodeId, bits: u32, expected: u32 },
    #[error("node {node}: invalid threshold ({reason})")]
    InvalidThreshold { node: NodeId, reason: String },
}

/// Validate the arena invariants.
///
/// Checks, in one depth-first pass from the root: child bounds, self loops,
/// cycles, shared nodes, feature range, leaf distributions and threshold
/// widths. Finally every node must have been reached.
pub fn validate_nodes(
    nodes: &[Node],
    n_features: usize,
    bits_per_feature: u32,
) -> Result<(), TreeValidationError> {
    let n_nodes = nodes.len();
    if n_nodes == 0 {
        return Err(TreeValidationError::EmptyTree);
    }
    if u32::try_from(n_nodes).is_err() {
        return Err(TreeValidationError::TooManyNodes { n_nodes });
    }

    // Iterative DFS with color marking.
    // 0 = unvisited, 1 = visiting, 2 = done
    let mut color = vec![0u8; n_nodes];
    let mut stack: Vec<(NodeId, u8)> = vec![(0, 0)];

    while let Some((node, phase)) = stack.pop() {
        let idx = node as usize;
        if phase == 1 {
            color[idx] = 2;
            continue;
        }
        match color[idx] {
            0 => {}
            1 => return Err(TreeValidationError::CycleDetected { node }),
            _ => return Err(TreeValidationError::DuplicateVisit { node }),
        }
        color[idx] = 1;
        stack.push((node, 1));

        match &nodes[idx] {
            Node::Leaf { class_counts } => {
                if class_counts.is_empty() {
                    return Err(TreeValidationError::MissingDistribution { node });
                }
            }
            Node::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if *feature as usize >= n_features {
                    return Err(TreeValidationError::FeatureOutOfRange {
                        node,
                        feature: i64::from(*feature),
                        n_features,
                    });
                }
                if threshold.bits() != bits_per_feature {
                    return Err(TreeValidationError::ThresholdWidthMismatch {
                        node,
                        bits: threshold.bits(),
                        expected: bits_per_feature,
                    });
                }
                if *left == node || *right == node {
                    return Err(TreeValidationError::SelfLoop { node });
                }
                for (side, child) in [("left", *left), ("right", *right)] {
                    if child as usize >= n_nodes {
                        return Err(TreeValidationError::ChildOutOfBounds {
                            node,
                            side,
                            child: i64::from(child),
                            n_nodes,
                        });
                    }
                }
                stack.push((*right, 0));
                stack.push((*left, 0));
            }
        }
    }

    match color.iter().position(|&c| c == 0) {
        Some(i) => Err(TreeValidationError::UnreachableNode { node: i as NodeId }),
        None => Ok(()),
    }
}

// ============================================================================
// QuantizedTree
// ============================================================================

/// A decision tree whose thresholds live in the fixed-point domain.
///
/// Node 0 is the root. Built once (normally by [`crate::extract`]) and
/// immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantizedTree {
    name: String,
    n_features: usize,
    bits_per_feature: u32,
    nodes: Box<[Node]>,
}

impl QuantizedTree {
    /// Create a tree from an arena, validating every structural invariant.
    ///
    /// # Errors
    ///
    /// [`crate::Error::MalformedModel`] if [`validate_nodes`] rejects the arena.
    pub fn new(
        name: impl Into<String>,
        n_features: usize,
        bits_per_feature: u32,
        nodes: Vec<Node>,
    ) -> Result<Self> {
        validate_nodes(&nodes, n_features, bits_per_feature)?;
        Ok(Self {
            name: name.into(),
            n_features,
            bits_per_feature,
            nodes: nodes.into_boxed_slice(),
        })
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
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id as usize]
    }

    #[inline]
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn n_splits(&self) -> usize {
        self.nodes.iter().filter(|n| !n.is_leaf()).count()
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Longest root-to-leaf path in edges (a lone leaf has depth 0).
    pub fn depth(&self) -> usize {
        let mut max_depth = 0;
        let mut stack = vec![(0 as NodeId, 0usize)];
        while let Some((node, depth)) = stack.pop() {
            max_depth = max_depth.max(depth);
            if let Some((left, right)) = self.node(node).children() {
                stack.push((left, depth + 1));
                stack.push((right, depth + 1));
            }
        }
        max_depth
    }

    /// Width of the widest leaf distribution.
    pub fn n_classes(&self) -> usize {
        self.leaves().map(|(_, counts)| counts.len()).max().unwrap_or(0)
    }

    /// Distinct classes any leaf can predict.
    pub fn class_universe(&self) -> BTreeSet<ClassLabel> {
        self.nodes.iter().filter_map(Node::class).collect()
    }

    /// Leaves in arena order with their distributions.
    pub fn leaves(&self) -> impl Iterator<Item = (NodeId, &[u64])> + '_ {
        self.nodes.iter().enumerate().filter_map(|(i, n)| match n {
            Node::Leaf { class_counts } => Some((i as NodeId, &class_counts[..])),
            Node::Split { .. } => None,
        })
    }

    /// Splits in arena order as `(id, feature, threshold)`.
    pub fn splits(&self) -> impl Iterator<Item = (NodeId, u32, FixedPoint)> + '_ {
        self.nodes.iter().enumerate().filter_map(|(i, n)| match *n {
            Node::Split {
                feature, threshold, ..
            } => Some((i as NodeId, feature, threshold)),
            Node::Leaf { .. } => None,
        })
    }

    pub fn stats(&self) -> TreeStats {
        TreeStats {
            name: self.name.clone(),
            n_nodes: self.n_nodes(),
            n_splits: self.n_splits(),
            n_leaves: self.n_leaves(),
            depth: self.depth(),
            n_classes: self.n_classes(),
            n_features: self.n_features,
            bits_per_feature: self.bits_per_feature,
        }
    }

    // =========================================================================
    // Prediction
    // =========================================================================

    /// Quantize `sample` at the tree's width and predict its class.
    ///
    /// Any magnitude is accepted here, but the emitted circuit only sees
    /// features in `[-2, 2)`; outside that range the two can disagree.
    ///
    /// # Errors
    ///
    /// [`crate::Error::ShapeMismatch`] if the sample length differs from
    /// `n_features`; [`crate::Error::InvalidArgument`] for non-finite features.
    pub fn predict(&self, sample: &[f64]) -> Result<ClassLabel> {
        ensure_shape("sample", self.n_features, sample.len())?;
        let mantissas = quantize_row(sample, self.bits_per_feature)?;
        Ok(self.classify(&mantissas))
    }

    /// Predict from mantissas already quantized at `bits_per_feature`.
    pub fn predict_quantized(&self, mantissas: &[i64]) -> Result<ClassLabel> {
        ensure_shape("sample", self.n_features, mantissas.len())?;
        Ok(self.classify(mantissas))
    }

    /// Leaf reached by a quantized sample.
    pub fn leaf_for(&self, mantissas: &[i64]) -> Result<NodeId> {
        ensure_shape("sample", self.n_features, mantissas.len())?;
        Ok(self.traverse(mantissas))
    }

    /// Class of the leaf reached by `mantissas`; the length is the caller's job.
    #[inline]
    pub(crate) fn classify(&self, mantissas: &[i64]) -> ClassLabel {
        let leaf = self.traverse(mantissas);
        // Validation guarantees non-empty leaf distributions.
        self.node(leaf).class().unwrap_or_default()
    }

    #[inline]
    fn traverse(&self, mantissas: &[i64]) -> NodeId {
        let mut node: NodeId = 0;
        while let Node::Split {
            feature,
            threshold,
            left,
            right,
        } = self.node(node)
        {
            node = if mantissas[*feature as usize] <= threshold.mantissa() {
                *left
            } else {
                *right
            };
        }
        node
    }
}

impl Classifier for QuantizedTree {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict(&self, sample: &[f64]) -> Result<ClassLabel> {
        QuantizedTree::predict(self, sample)
    }
}

// ============================================================================
// TreeStats
// ============================================================================

/// Summary of a tree's shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeStats {
    pub name: String,
    pub n_nodes: usize,
    pub n_splits: usize,
    pub n_leaves: usize,
    pub depth: usize,
    pub n_classes: usize,
    pub n_features: usize,
    pub bits_per_feature: u32,
}

impl fmt::Display for TreeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} nodes ({} splits, {} leaves), depth {}, {} classes, {} features at {} bits",
            self.name,
            self.n_nodes,
            self.n_splits,
            self.n_leaves,
            self.depth,
            self.n_classes,
            self.n_features,
            self.bits_per_feature
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::fixed::quantize;

    fn leaf(counts: &[u64]) -> Node {
        Node::Leaf {
            class_counts: counts.into(),
        }
    }

    fn split(feature: u32, threshold: f64, left: NodeId, right: NodeId) -> Node {
        Node::Split {
            feature,
            threshold: quantize(threshold, 4).unwrap(),
            left,
            right,
        }
    }

    fn stump() -> QuantizedTree {
        QuantizedTree::new(
            "stump",
            1,
            4,
            vec![split(0, 0.5, 1, 2), leaf(&[5, 1]), leaf(&[0, 3])],
        )
        .unwrap()
    }

    #[test]
    fn predict_routes_ties_left() {
        let tree = stump();
        assert_eq!(tree.predict(&[0.4]).unwrap(), 0);
        assert_eq!(tree.predict(&[0.5]).unwrap(), 0);
        assert_eq!(tree.predict(&[0.6]).unwrap(), 1);
    }

    #[test]
    fn predict_quantizes_before_comparing() {
        // 0.53 * 16 = 8.48 -> 8, equal to the threshold, so it goes left.
        let tree = stump();
        assert_eq!(tree.predict(&[0.53]).unwrap(), 0);
        // 0.54 * 16 = 8.64 -> 9 goes right.
        assert_eq!(tree.predict(&[0.54]).unwrap(), 1);
    }

    #[test]
    fn predict_quantized_and_leaf_for() {
        let tree = stump();
        assert_eq!(tree.predict_quantized(&[8]).unwrap(), 0);
        assert_eq!(tree.predict_quantized(&[9]).unwrap(), 1);
        assert_eq!(tree.leaf_for(&[-3]).unwrap(), 1);
        assert_eq!(tree.leaf_for(&[100]).unwrap(), 2);
    }

    #[test]
    fn predict_rejects_wrong_length() {
        let tree = stump();
        let err = tree.predict(&[0.1, 0.2]).unwrap_err();
        assert!(matches!(
            err,
            Error::ShapeMismatch {
                expected: 1,
                actual: 2,
                ..
            }
        ));
        assert!(tree.predict_quantized(&[]).is_err());
    }

    #[test]
    fn predict_rejects_nan_feature() {
        assert!(matches!(
            stump().predict(&[f64::NAN]),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn stats_and_universe() {
        let tree = QuantizedTree::new(
            "t",
            2,
            4,
            vec![
                split(0, 0.5, 1, 2),
                split(1, 0.25, 3, 4),
                leaf(&[0, 0, 9]),
                leaf(&[4, 1]),
                leaf(&[4, 4]),
            ],
        )
        .unwrap();
        let stats = tree.stats();
        assert_eq!(stats.n_nodes, 5);
        assert_eq!(stats.n_splits, 2);
        assert_eq!(stats.n_leaves, 3);
        assert_eq!(stats.depth, 2);
        assert_eq!(stats.n_classes, 3);
        assert_eq!(tree.class_universe().into_iter().collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(
            stats.to_string(),
            "t: 5 nodes (2 splits, 3 leaves), depth 2, 3 classes, 2 features at 4 bits"
        );
    }

    #[test]
    fn single_leaf_tree() {
        let tree = QuantizedTree::new("leaf", 3, 4, vec![leaf(&[1, 2])]).unwrap();
        assert_eq!(tree.depth(), 0);
        assert_eq!(tree.predict(&[9.0, -9.0, 0.0]).unwrap(), 1);
    }

    #[test]
    fn validate_empty_tree() {
        assert_eq!(validate_nodes(&[], 1, 4), Err(TreeValidationError::EmptyTree));
    }

    #[test]
    fn validate_rejects_self_loop() {
        let nodes = vec![split(0, 0.5, 0, 1), leaf(&[1])];
        assert_eq!(
            validate_nodes(&nodes, 1, 4),
            Err(TreeValidationError::SelfLoop { node: 0 })
        );
    }

    #[test]
    fn validate_rejects_cycle() {
        let nodes = vec![split(0, 0.5, 1, 2), split(0, 0.5, 0, 2), leaf(&[1])];
        assert_eq!(
            validate_nodes(&nodes, 1, 4),
            Err(TreeValidationError::CycleDetected { node: 0 })
        );
    }

    #[test]
    fn validate_rejects_shared_child() {
        let nodes = vec![split(0, 0.5, 1, 1), leaf(&[1])];
        assert_eq!(
            validate_nodes(&nodes, 1, 4),
            Err(TreeValidationError::DuplicateVisit { node: 1 })
        );
    }

    #[test]
    fn validate_rejects_out_of_bounds_child() {
        let nodes = vec![split(0, 0.5, 1, 7), leaf(&[1])];
        assert!(matches!(
            validate_nodes(&nodes, 1, 4),
            Err(TreeValidationError::ChildOutOfBounds {
                node: 0,
                side: "right",
                child: 7,
                ..
            })
        ));
    }

    #[test]
    fn validate_rejects_unreachable_node() {
        let nodes = vec![split(0, 0.5, 1, 2), leaf(&[1]), leaf(&[2]), leaf(&[3])];
        assert_eq!(
            validate_nodes(&nodes, 1, 4),
            Err(TreeValidationError::UnreachableNode { node: 3 })
        );
    }

    #[test]
    fn validate_rejects_feature_and_width_errors() {
        let nodes = vec![split(3, 0.5, 1, 2), leaf(&[1]), leaf(&[2])];
        assert!(matches!(
            validate_nodes(&nodes, 2, 4),
            Err(TreeValidationError::FeatureOutOfRange { feature: 3, .. })
        ));
        assert_eq!(
            validate_nodes(&[split(0, 0.5, 1, 2), leaf(&[1]), leaf(&[2])], 1, 5),
            Err(TreeValidationError::ThresholdWidthMismatch {
                node: 0,
                bits: 4,
                expected: 5
            })
        );
    }

    #[test]
    fn validate_rejects_empty_distribution() {
        let nodes = vec![split(0, 0.5, 1, 2), leaf(&[1]), leaf(&[])];
        assert_eq!(
            validate_nodes(&nodes, 1, 4),
            Err(TreeValidationError::MissingDistribution { node: 2 })
        );
    }

    #[test]
    fn new_maps_validation_to_malformed_model() {
        let err = QuantizedTree::new("bad", 1, 4, vec![]).unwrap_err();
        assert!(matches!(err, Error::MalformedModel(_)));
    }
}
