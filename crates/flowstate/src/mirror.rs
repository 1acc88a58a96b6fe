//! A replica of the tree as the remote side sees it, built only from
//! [`DiffBatch`]es.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;
use thiserror::Error;
use tracing::trace;

use flowstate_value::StructuredValue;

use crate::change::{Change, DiffBatch};
use crate::feature::{FeatureKind, FeatureSet};
use crate::tree::view::{render, ViewSource};
use crate::NodeId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MirrorError {
    #[error("batch {got} arrived out of order, expected {expected}")]
    OutOfOrder { expected: u64, got: u64 },
    #[error("node {0} attached twice")]
    DuplicateAttach(NodeId),
    #[error("record refers to unknown node {0}")]
    UnknownNode(NodeId),
    #[error("node {node} has no {feature}")]
    UnsupportedFeature { node: NodeId, feature: FeatureKind },
    #[error("index {index} out of bounds for {feature} of node {parent} with length {len}")]
    IndexOutOfBounds {
        parent: NodeId,
        feature: FeatureKind,
        index: usize,
        len: usize,
    },
    #[error("node {child} is not in the {feature} of node {parent}")]
    NotInList {
        parent: NodeId,
        feature: FeatureKind,
        child: NodeId,
    },
    #[error("node {child} is still in the {feature} of node {parent}")]
    AlreadyListed {
        parent: NodeId,
        feature: FeatureKind,
        child: NodeId,
    },
}

#[derive(Debug, Clone)]
struct MirrorNode {
    parent: Option<NodeId>,
    /// The list currently holding this node.
    listed_in: Option<(NodeId, FeatureKind)>,
    features: FeatureSet,
    properties: BTreeMap<String, StructuredValue>,
    lists: BTreeMap<FeatureKind, Vec<NodeId>>,
}

impl MirrorNode {
    fn new(parent: Option<NodeId>, features: FeatureSet) -> Self {
        Self {
            parent,
            listed_in: None,
            features,
            properties: BTreeMap::new(),
            lists: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MirrorTree {
    nodes: HashMap<NodeId, MirrorNode>,
    root: NodeId,
    last_sync_id: Option<u64>,
}

impl Default for MirrorTree {
    fn default() -> Self {
        Self::new()
    }
}

impl MirrorTree {
    /// A mirror holding only the root, which accepts every feature.
    pub fn new() -> Self {
        let root = NodeId::new(1);
        let mut nodes = HashMap::new();
        nodes.insert(root, MirrorNode::new(None, FeatureKind::ALL.into_iter().collect()));
        Self {
            nodes,
            root,
            last_sync_id: None,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(&id).and_then(|n| n.parent)
    }

    pub fn property(&self, id: NodeId, key: &str) -> Option<&StructuredValue> {
        self.nodes.get(&id)?.properties.get(key)
    }

    pub fn list_items(&self, id: NodeId, kind: FeatureKind) -> &[NodeId] {
        self.nodes
            .get(&id)
            .and_then(|n| n.lists.get(&kind))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn view(&self, id: NodeId) -> Value {
        render(self, id)
    }

    /// Records a property write the client made itself, ahead of any batch
    /// confirming it.
    pub fn set_local_property(
        &mut self,
        id: NodeId,
        key: &str,
        value: StructuredValue,
    ) -> Result<(), MirrorError> {
        self.properties_mut(id)?.insert(key.to_owned(), value);
        Ok(())
    }

    /// Applies every record of `batch` in order, stopping at the first
    /// invalid one.
    pub fn apply(&mut self, batch: &DiffBatch) -> Result<(), MirrorError> {
        if let Some(last) = self.last_sync_id {
            if batch.sync_id != last + 1 {
                return Err(MirrorError::OutOfOrder {
                    expected: last + 1,
                    got: batch.sync_id,
                });
            }
        }
        for change in batch {
            self.apply_change(change)?;
        }
        self.last_sync_id = Some(batch.sync_id);
        trace!(sync_id = batch.sync_id, nodes = self.nodes.len(), "mirror applied batch");
        Ok(())
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut MirrorNode, MirrorError> {
        self.nodes.get_mut(&id).ok_or(MirrorError::UnknownNode(id))
    }

    fn list_mut(&mut self, parent: NodeId, feature: FeatureKind) -> Result<&mut Vec<NodeId>, MirrorError> {
        let node = self.node_mut(parent)?;
        if !feature.is_list() || !node.features.contains(feature) {
            return Err(MirrorError::UnsupportedFeature {
                node: parent,
                feature,
            });
        }
        Ok(node.lists.entry(feature).or_default())
    }

    fn properties_mut(&mut self, id: NodeId) -> Result<&mut BTreeMap<String, StructuredValue>, MirrorError> {
        let node = self.node_mut(id)?;
        if !node.features.contains(FeatureKind::PropertyMap) {
            return Err(MirrorError::UnsupportedFeature {
                node: id,
                feature: FeatureKind::PropertyMap,
            });
        }
        Ok(&mut node.properties)
    }

    fn require(&self, id: NodeId) -> Result<(), MirrorError> {
        if self.contains(id) {
            Ok(())
        } else {
            Err(MirrorError::UnknownNode(id))
        }
    }

    fn apply_change(&mut self, change: &Change) -> Result<(), MirrorError> {
        match change {
            Change::Attach {
                node,
                parent,
                features,
            } => {
                if self.contains(*node) {
                    return Err(MirrorError::DuplicateAttach(*node));
                }
                self.require(*parent)?;
                let features = features.iter().copied().collect();
                self.nodes.insert(*node, MirrorNode::new(Some(*parent), features));
            }
            Change::Detach { node } => {
                if *node == self.root {
                    return Err(MirrorError::UnknownNode(*node));
                }
                self.nodes
                    .remove(node)
                    .ok_or(MirrorError::UnknownNode(*node))?;
            }
            Change::PropertySet { node, key, value } => {
                self.properties_mut(*node)?.insert(key.clone(), value.clone());
            }
            Change::PropertyRemove { node, key } => {
                self.properties_mut(*node)?.remove(key);
            }
            Change::ChildInsert {
                parent,
                feature,
                index,
                child,
            } => {
                if let Some((holder, held_in)) = self.node_mut(*child)?.listed_in {
                    return Err(MirrorError::AlreadyListed {
                        parent: holder,
                        feature: held_in,
                        child: *child,
                    });
                }
                let list = self.list_mut(*parent, *feature)?;
                if *index > list.len() {
                    return Err(MirrorError::IndexOutOfBounds {
                        parent: *parent,
                        feature: *feature,
                        index: *index,
                        len: list.len(),
                    });
                }
                list.insert(*index, *child);
                let node = self.node_mut(*child)?;
                node.parent = Some(*parent);
                node.listed_in = Some((*parent, *feature));
            }
            Change::ChildRemove {
                parent,
                feature,
                child,
            } => {
                let list = self.list_mut(*parent, *feature)?;
                let pos = list
                    .iter()
                    .position(|c| c == child)
                    .ok_or(MirrorError::NotInList {
                        parent: *parent,
                        feature: *feature,
                        child: *child,
                    })?;
                list.remove(pos);
                if let Some(node) = self.nodes.get_mut(child) {
                    node.listed_in = None;
                }
            }
            Change::ChildMove {
                parent,
                feature,
                child,
                index,
            } => {
                let list = self.list_mut(*parent, *feature)?;
                let pos = list
                    .iter()
                    .position(|c| c == child)
                    .ok_or(MirrorError::NotInList {
                        parent: *parent,
                        feature: *feature,
                        child: *child,
                    })?;
                if *index >= list.len() {
                    return Err(MirrorError::IndexOutOfBounds {
                        parent: *parent,
                        feature: *feature,
                        index: *index,
                        len: list.len(),
                    });
                }
                list.remove(pos);
                list.insert(*index, *child);
            }
        }
        Ok(())
    }
}

impl ViewSource for MirrorTree {
    fn has_node(&self, id: NodeId) -> bool {
        self.contains(id)
    }

    fn view_properties(&self, id: NodeId) -> Vec<(&str, &StructuredValue)> {
        self.nodes
            .get(&id)
            .map(|n| n.properties.iter().map(|(k, v)| (k.as_str(), v)).collect())
            .unwrap_or_default()
    }

    fn view_items(&self, id: NodeId, kind: FeatureKind) -> &[NodeId] {
        self.list_items(id, kind)
    }
}
