//! Arena node type.

use crate::fixed::FixedPoint;
use crate::inference::{argmax_class, ClassLabel};

use super::NodeId;

/// One node of a quantized tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Go `left` if `feature <= threshold`, else `right`.
    Split {
        feature: u32,
        threshold: FixedPoint,
        left: NodeId,
        right: NodeId,
    },
    /// Terminal node holding the training class distribution.
    Leaf { class_counts: Box<[u64]> },
}

impl Node {
    #[inline]
    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf { .. })
    }

    /// Majority class of a leaf. `None` for splits and empty distributions.
    #[inline]
    pub fn class(&self) -> Option<ClassLabel> {
        match self {
            Node::Leaf { class_counts } => argmax_class(class_counts),
            Node::Split { .. } => None,
        }
    }

    /// Child ids of a split.
    #[inline]
    pub fn children(&self) -> Option<(NodeId, NodeId)> {
        match *self {
            Node::Split { left, right, .. } => Some((left, right)),
            Node::Leaf { .. } => None,
        }
    }
}
