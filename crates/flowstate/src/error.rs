use thiserror::Error;

use crate::feature::FeatureKind;
use crate::NodeId;

/// Errors returned by local tree lookups and mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("node {0} is not part of this tree")]
    UnknownNode(NodeId),
    #[error("node {node} does not support feature {feature}")]
    UnsupportedFeature { node: NodeId, feature: FeatureKind },
    #[error("index {index} out of bounds for list of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },
    #[error("node {child} is not in the {feature} of node {parent}")]
    NotInList {
        parent: NodeId,
        feature: FeatureKind,
        child: NodeId,
    },
    #[error("moving node {child} under node {parent} would create a cycle")]
    WouldCreateCycle { parent: NodeId, child: NodeId },
    #[error("the root node cannot be detached or moved")]
    RootImmovable,
    #[error("node id space exhausted")]
    IdSpaceExhausted,
}

/// Errors that abort a change collection cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectError {
    #[error("state tree invariant violation: {0}")]
    InvariantViolation(String),
}
