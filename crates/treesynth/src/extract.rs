//! Conversion from trained float models to quantized trees and forests.
//!
//! One pass over the source's flat arrays: indices are range-checked,
//! thresholds quantized at the configured width and leaf distributions copied
//! verbatim. Node ids are preserved, so the quantized arena is isomorphic to
//! the source. The graph invariants (no cycles, no sharing, everything
//! reachable) are then enforced by [`QuantizedTree::new`].

use tracing::debug;

use crate::config::SynthConfig;
use crate::error::{Error, Result};
use crate::fixed::quantize;
use crate::repr::{Node, NodeId, QuantizedForest, QuantizedTree, TreeValidationError};
use crate::source::{ForestSource, TreeSource};

/// Extracts quantized models from [`TreeSource`] / [`ForestSource`] views.
#[derive(Debug, Clone)]
pub struct TreeExtractor {
    config: SynthConfig,
}

impl TreeExtractor {
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] if the configuration does not validate.
    pub fn new(config: SynthConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SynthConfig {
        &self.config
    }

    /// Extract a single tree named after the configuration.
    ///
    /// # Errors
    ///
    /// [`Error::MalformedModel`] for any structural defect of the source.
    pub fn extract_tree<S: TreeSource + ?Sized>(&self, source: &S) -> Result<QuantizedTree> {
        self.convert_tree(source, &self.config.name)
    }

    /// Extract every tree of a forest. Member `i` is named `<name>_tree_<i>`.
    ///
    /// # Errors
    ///
    /// [`Error::EmptyModel`] if the source has no trees, otherwise the first
    /// member failure in forest order.
    pub fn extract_forest<F>(&self, source: &F) -> Result<QuantizedForest>
    where
        F: ForestSource + Sync + ?Sized,
        F::Tree: Sync,
    {
        let n_trees = source.n_trees();
        if n_trees == 0 {
            return Err(Error::EmptyModel);
        }

        let parallelism = self.config.parallelism();
        let trees = parallelism
            .maybe_par_map(0..n_trees, |idx| {
                let name = format!("{}_tree_{idx}", self.config.name);
                self.convert_tree(source.tree(idx), &name)
            })
            .into_iter()
            .collect::<Result<Vec<_>>>()?;

        let mut forest = QuantizedForest::new(
            self.config.name.clone(),
            self.config.n_features,
            self.config.bits_per_feature,
        )
        .with_parallelism(parallelism);
        for tree in trees {
            forest.push_tree(tree)?;
        }
        debug!(
            forest = %self.config.name,
            n_trees,
            n_classes = forest.n_classes(),
            "extracted forest"
        );
        Ok(forest)
    }

    fn convert_tree<S: TreeSource + ?Sized>(&self, source: &S, name: &str) -> Result<QuantizedTree> {
        let nodes = self.convert_nodes(source)?;
        let tree = QuantizedTree::new(
            name,
            self.config.n_features,
            self.config.bits_per_feature,
            nodes,
        )?;
        debug!(
            tree = %name,
            n_nodes = tree.n_nodes(),
            n_leaves = tree.n_leaves(),
            depth = tree.depth(),
            "extracted tree"
        );
        Ok(tree)
    }

    fn convert_nodes<S: TreeSource + ?Sized>(
        &self,
        source: &S,
    ) -> Result<Vec<Node>, TreeValidationError> {
        let n_nodes = source.n_nodes();
        if n_nodes == 0 {
            return Err(TreeValidationError::EmptyTree);
        }
        if NodeId::try_from(n_nodes).is_err() {
            return Err(TreeValidationError::TooManyNodes { n_nodes });
        }

        let n_features = self.config.n_features;
        let bits = self.config.bits_per_feature;
        let mut nodes = Vec::with_capacity(n_nodes);

        for idx in 0..n_nodes {
            // n_nodes fits a NodeId, checked above.
            let node = idx as NodeId;
            if source.is_leaf(idx) {
                let class_counts = source
                    .class_counts(idx)
                    .filter(|counts| !counts.is_empty())
                    .ok_or(TreeValidationError::MissingDistribution { node })?;
                nodes.push(Node::Leaf {
                    class_counts: class_counts.into(),
                });
                continue;
            }

            let raw_feature = source.split_feature(idx);
            let feature = u32::try_from(raw_feature)
                .ok()
                .filter(|&f| (f as usize) < n_features)
                .ok_or(TreeValidationError::FeatureOutOfRange {
                    node,
                    feature: raw_feature,
                    n_features,
                })?;

            let threshold = quantize(source.split_threshold(idx), bits).map_err(|e| {
                TreeValidationError::InvalidThreshold {
                    node,
                    reason: e.to_string(),
                }
            })?;

            let left = child_id(node, "left", source.left_child(idx), n_nodes)?;
            let right = child_id(node, "right", source.right_child(idx), n_nodes)?;

            nodes.push(Node::Split {
                feature,
                threshold,
                left,
                right,
            });
        }
        Ok(nodes)
    }
}

fn child_id(
    node: NodeId,
    side: &'static str,
    child: i64,
    n_nodes: usize,
) -> Result<NodeId, TreeValidationError> {
    usize::try_from(child)
        .ok()
        .filter(|&c| c < n_nodes)
        .map(|c| c as NodeId)
        .ok_or(TreeValidationError::ChildOutOfBounds {
            node,
            side,
            child,
            n_nodes,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::float_predict;
    use crate::source_tree;
    use crate::testing::stump;

    fn extractor(n_features: usize, bits: u32) -> TreeExtractor {
        let config = SynthConfig::builder()
            .name("model")
            .n_features(n_features)
            .bits_per_feature(bits)
            .build()
            .unwrap();
        TreeExtractor::new(config).unwrap()
    }

    fn malformed(result: Result<QuantizedTree>) -> String {
        match result {
            Err(Error::MalformedModel(msg)) => msg,
            other => panic!("expected MalformedModel, got {other:?}"),
        }
    }

    #[test]
    fn stump_scenario() {
        let tree = extractor(1, 4).extract_tree(&stump(0.5)).unwrap();
        assert_eq!(tree.name(), "model");
        match tree.node(0) {
            Node::Split { threshold, .. } => assert_eq!(threshold.mantissa(), 8),
            other => panic!("expected split, got {other:?}"),
        }
        assert_eq!(tree.predict(&[0.4]).unwrap(), 0);
        assert_eq!(tree.predict(&[0.5]).unwrap(), 0);
        assert_eq!(tree.predict(&[0.6]).unwrap(), 1);
    }

    #[test]
    fn preserves_topology_and_distributions() {
        let source = source_tree! {
            0 => split(1, 0.25) -> 2, 1,
            1 => leaf([0, 0, 9]),
            2 => split(0, 0.75) -> 3, 4,
            3 => leaf([4, 1, 0]),
            4 => leaf([1, 4, 0]),
        };
        let tree = extractor(2, 8).extract_tree(&source).unwrap();
        assert_eq!(tree.n_nodes(), 5);
        assert_eq!(tree.node(0).children(), Some((2, 1)));
        assert_eq!(tree.node(2).children(), Some((3, 4)));
        assert_eq!(
            tree.node(4),
            &Node::Leaf {
                class_counts: vec![1, 4, 0].into()
            }
        );
        for sample in [[0.5, 0.1], [0.9, 0.1], [0.1, 0.9], [0.75, 0.25]] {
            assert_eq!(
                tree.predict(&sample).unwrap(),
                float_predict(&source, &sample).unwrap()
            );
        }
    }

    #[test]
    fn feature_out_of_range() {
        let source = source_tree! {
            0 => split(3, 0.5) -> 1, 2,
            1 => leaf([1]),
            2 => leaf([1]),
        };
        let msg = malformed(extractor(3, 4).extract_tree(&source));
        assert!(msg.contains("feature index 3"), "{msg}");
    }

    #[test]
    fn negative_child_on_split() {
        let source = source_tree! {
            0 => split(0, 0.5) -> 1, -1,
            1 => leaf([1]),
        };
        let msg = malformed(extractor(1, 4).extract_tree(&source));
        assert!(msg.contains("right child -1"), "{msg}");
    }

    #[test]
    fn cycle_and_self_loop() {
        let cycle = source_tree! {
            0 => split(0, 0.5) -> 1, 2,
            1 => split(0, 0.25) -> 0, 2,
            2 => leaf([1]),
        };
        let msg = malformed(extractor(1, 4).extract_tree(&cycle));
        assert!(msg.contains("cycle") || msg.contains("more than one path"), "{msg}");

        let self_loop = source_tree! {
            0 => split(0, 0.5) -> 0, 1,
            1 => leaf([1]),
        };
        let msg = malformed(extractor(1, 4).extract_tree(&self_loop));
        assert!(msg.contains("itself"), "{msg}");
    }

    #[test]
    fn missing_distribution_and_unreachable_node() {
        let missing = source_tree! {
            0 => split(0, 0.5) -> 1, 2,
            1 => leaf([]),
            2 => leaf([1]),
        };
        let msg = malformed(extractor(1, 4).extract_tree(&missing));
        assert!(msg.contains("leaf 1"), "{msg}");

        let orphan = source_tree! {
            0 => split(0, 0.5) -> 1, 2,
            1 => leaf([1]),
            2 => leaf([1]),
            3 => leaf([1]),
        };
        let msg = malformed(extractor(1, 4).extract_tree(&orphan));
        assert!(msg.contains("unreachable"), "{msg}");
    }

    #[test]
    fn non_finite_threshold() {
        let source = source_tree! {
            0 => split(0, f64::NAN) -> 1, 2,
            1 => leaf([1]),
            2 => leaf([1]),
        };
        let msg = malformed(extractor(1, 4).extract_tree(&source));
        assert!(msg.contains("invalid threshold"), "{msg}");
    }

    #[test]
    fn empty_source() {
        let msg = malformed(extractor(1, 4).extract_tree(&source_tree! {}));
        assert!(msg.contains("no nodes"), "{msg}");
    }

    #[test]
    fn forest_names_members_and_votes() {
        let source = vec![stump(0.5), stump(0.25), stump(0.75)];
        let forest = extractor(1, 4).extract_forest(&source).unwrap();
        assert_eq!(forest.n_trees(), 3);
        assert_eq!(forest.tree(2).name(), "model_tree_2");
        // Trees predict 0, 1, 0 at x = 0.5.
        assert_eq!(forest.predict(&[0.5]).unwrap(), 0);
        assert_eq!(forest.predict(&[0.8]).unwrap(), 1);
    }

    #[test]
    fn empty_forest_source() {
        let source: Vec<crate::testing::SourceTree> = Vec::new();
        let err = extractor(1, 4).extract_forest(&source).unwrap_err();
        assert!(matches!(err, Error::EmptyModel));
    }

    #[test]
    fn forest_fails_on_first_bad_member() {
        let bad = source_tree! {
            0 => split(5, 0.5) -> 1, 2,
            1 => leaf([1]),
            2 => leaf([1]),
        };
        let source = vec![stump(0.5), bad];
        let err = extractor(1, 4).extract_forest(&source).unwrap_err();
        assert!(matches!(err, Error::MalformedModel(_)));
    }
}
