use serde::{Deserialize, Serialize};

use flowstate_value::StructuredValue;

use crate::feature::FeatureKind;
use crate::NodeId;

/// One change record of a [`DiffBatch`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Change {
    /// A node the remote side has not seen yet. Its contents follow as
    /// ordinary property and list records.
    Attach {
        node: NodeId,
        parent: NodeId,
        features: Vec<FeatureKind>,
    },
    /// The node is gone; the remote side releases its mirror.
    Detach { node: NodeId },
    PropertySet {
        node: NodeId,
        key: String,
        value: StructuredValue,
    },
    PropertyRemove { node: NodeId, key: String },
    ChildInsert {
        parent: NodeId,
        feature: FeatureKind,
        index: usize,
        child: NodeId,
    },
    ChildRemove {
        parent: NodeId,
        feature: FeatureKind,
        child: NodeId,
    },
    ChildMove {
        parent: NodeId,
        feature: FeatureKind,
        child: NodeId,
        index: usize,
    },
}

impl Change {
    /// The node whose state the record changes.
    pub fn target(&self) -> NodeId {
        match self {
            Change::Attach { node, .. }
            | Change::Detach { node }
            | Change::PropertySet { node, .. }
            | Change::PropertyRemove { node, .. } => *node,
            Change::ChildInsert { parent, .. }
            | Change::ChildRemove { parent, .. }
            | Change::ChildMove { parent, .. } => *parent,
        }
    }

    pub fn is_structural(&self) -> bool {
        !matches!(self, Change::PropertySet { .. } | Change::PropertyRemove { .. })
    }
}

/// The ordered output of one collection cycle.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffBatch {
    pub sync_id: u64,
    pub changes: Vec<Change>,
}

impl DiffBatch {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Change> {
        self.changes.iter()
    }

    /// Ids announced by `Attach` records, in batch order.
    pub fn attached(&self) -> Vec<NodeId> {
        self.changes
            .iter()
            .filter_map(|c| match c {
                Change::Attach { node, .. } => Some(*node),
                _ => None,
            })
            .collect()
    }

    /// Ids released by `Detach` records, in batch order.
    pub fn detached(&self) -> Vec<NodeId> {
        self.changes
            .iter()
            .filter_map(|c| match c {
                Change::Detach { node } => Some(*node),
                _ => None,
            })
            .collect()
    }
}

impl<'a> IntoIterator for &'a DiffBatch {
    type Item = &'a Change;
    type IntoIter = std::slice::Iter<'a, Change>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}
