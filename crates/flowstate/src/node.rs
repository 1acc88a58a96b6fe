use std::collections::BTreeMap;

use crate::error::TreeError;
use crate::feature::{Feature, FeatureKind, FeatureSet, NodeList, PropertyMap};
use crate::NodeId;

/// A node of the state tree.
///
/// Nodes are owned by the tree's index; `parent` is a plain id resolved
/// through that index. Feature stores are created on first write access and
/// only for kinds the node's [`FeatureSet`] declares.
#[derive(Debug, Clone)]
pub struct StateNode {
    id: NodeId,
    parent: Option<NodeId>,
    declared: FeatureSet,
    features: BTreeMap<FeatureKind, Feature>,
    /// Whether the remote side has been told about this node.
    pub(crate) reported: bool,
}

impl StateNode {
    pub(crate) fn new(id: NodeId, parent: Option<NodeId>, declared: FeatureSet) -> Self {
        Self {
            id,
            parent,
            declared,
            features: BTreeMap::new(),
            reported: false,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub(crate) fn set_parent(&mut self, parent: Option<NodeId>) {
        self.parent = parent;
    }

    pub fn declared_features(&self) -> FeatureSet {
        self.declared
    }

    pub fn supports(&self, kind: FeatureKind) -> bool {
        self.declared.contains(kind)
    }

    fn check(&self, kind: FeatureKind) -> Result<(), TreeError> {
        if self.supports(kind) {
            Ok(())
        } else {
            Err(TreeError::UnsupportedFeature {
                node: self.id,
                feature: kind,
            })
        }
    }

    /// The materialized feature store, if any. Declared but untouched
    /// features read as `Ok(None)`.
    pub fn get_feature(&self, kind: FeatureKind) -> Result<Option<&Feature>, TreeError> {
        self.check(kind)?;
        Ok(self.features.get(&kind))
    }

    pub(crate) fn get_feature_mut(&mut self, kind: FeatureKind) -> Result<&mut Feature, TreeError> {
        self.check(kind)?;
        Ok(self
            .features
            .entry(kind)
            .or_insert_with(|| Feature::new(kind)))
    }

    /// Materialized features in wire-id order.
    pub fn features(&self) -> impl Iterator<Item = &Feature> {
        self.features.values()
    }

    pub(crate) fn features_mut(&mut self) -> impl Iterator<Item = &mut Feature> {
        self.features.values_mut()
    }

    pub fn property_map(&self) -> Option<&PropertyMap> {
        self.features
            .get(&FeatureKind::PropertyMap)
            .and_then(Feature::as_property_map)
    }

    pub fn list(&self, kind: FeatureKind) -> Option<&NodeList> {
        self.features.get(&kind).and_then(Feature::as_list)
    }

    pub(crate) fn property_map_mut(&mut self) -> Result<&mut PropertyMap, TreeError> {
        let id = self.id;
        self.get_feature_mut(FeatureKind::PropertyMap)?
            .as_property_map_mut()
            .ok_or(TreeError::UnsupportedFeature {
                node: id,
                feature: FeatureKind::PropertyMap,
            })
    }

    pub(crate) fn list_mut(&mut self, kind: FeatureKind) -> Result<&mut NodeList, TreeError> {
        let id = self.id;
        self.get_feature_mut(kind)?
            .as_list_mut()
            .ok_or(TreeError::UnsupportedFeature {
                node: id,
                feature: kind,
            })
    }

    /// Ids of every node this node keeps reachable.
    pub fn children(&self) -> Vec<NodeId> {
        self.features
            .values()
            .flat_map(Feature::referenced_nodes)
            .collect()
    }

    pub fn has_pending_changes(&self) -> bool {
        self.features.values().any(Feature::has_pending_changes)
    }
}
