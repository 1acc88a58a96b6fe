use flowstate_value::StructuredValue;

use super::StateTree;
use crate::error::TreeError;
use crate::feature::{ClientUpdateMode, Feature, FeatureKind, FeatureSet};
use crate::NodeId;

/// Mutable access to one live node of a [`StateTree`].
pub struct NodeHandle<'a> {
    tree: &'a mut StateTree,
    id: NodeId,
}

/// The property map of a node.
pub struct PropertyMapHandle<'a> {
    inner: NodeHandle<'a>,
}

/// The ordered child list of a node.
pub struct NodeListHandle<'a> {
    inner: NodeHandle<'a>,
    kind: FeatureKind,
}

/// The model list of a node.
pub struct ModelListHandle<'a> {
    inner: NodeListHandle<'a>,
}

impl<'a> NodeHandle<'a> {
    pub(crate) fn new(tree: &'a mut StateTree, id: NodeId) -> Self {
        Self { tree, id }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.tree.parent(self.id)
    }

    pub fn tree(&self) -> &StateTree {
        &*self.tree
    }

    pub fn mark_dirty(&mut self) {
        self.tree.touch(self.id);
    }

    pub fn get_feature(&self, kind: FeatureKind) -> Result<Option<&Feature>, TreeError> {
        self.tree
            .node(self.id)
            .ok_or(TreeError::UnknownNode(self.id))?
            .get_feature(kind)
    }

    /// The materialized feature store, created on first access.
    pub fn get_feature_mut(&mut self, kind: FeatureKind) -> Result<&mut Feature, TreeError> {
        self.tree.node_entry(self.id)?.get_feature_mut(kind)
    }

    fn require(&self, kind: FeatureKind) -> Result<(), TreeError> {
        self.get_feature(kind).map(|_| ())
    }

    pub fn properties(self) -> Result<PropertyMapHandle<'a>, TreeError> {
        self.require(FeatureKind::PropertyMap)?;
        Ok(PropertyMapHandle { inner: self })
    }

    pub fn children(self) -> Result<NodeListHandle<'a>, TreeError> {
        self.require(FeatureKind::ChildList)?;
        Ok(NodeListHandle {
            inner: self,
            kind: FeatureKind::ChildList,
        })
    }

    pub fn model_list(self) -> Result<ModelListHandle<'a>, TreeError> {
        self.require(FeatureKind::ModelList)?;
        Ok(ModelListHandle {
            inner: NodeListHandle {
                inner: self,
                kind: FeatureKind::ModelList,
            },
        })
    }
}

impl<'a> PropertyMapHandle<'a> {
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    pub fn get(&self, key: &str) -> Option<&StructuredValue> {
        self.inner.tree.property(self.inner.id, key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner
            .tree
            .node(self.inner.id)
            .and_then(|n| n.property_map())
            .map(|m| m.keys().map(str::to_owned).collect())
            .unwrap_or_default()
    }

    /// Returns `true` if the value changed.
    pub fn set(&mut self, key: &str, value: impl Into<StructuredValue>) -> Result<bool, TreeError> {
        self.inner.tree.set_property(self.inner.id, key, value.into())
    }

    pub fn remove(&mut self, key: &str) -> Result<Option<StructuredValue>, TreeError> {
        self.inner.tree.remove_property(self.inner.id, key)
    }

    /// The model list stored under `key`, created on first use.
    pub fn resolve_model_list(&mut self, key: &str) -> Result<ModelListHandle<'_>, TreeError> {
        let id = self.inner.tree.resolve_model(
            self.inner.id,
            key,
            FeatureKind::ModelList,
            FeatureSet::MODEL_LIST,
        )?;
        NodeHandle::new(&mut *self.inner.tree, id).model_list()
    }

    /// The nested property map stored under `key`, created on first use.
    pub fn resolve_model_map(&mut self, key: &str) -> Result<PropertyMapHandle<'_>, TreeError> {
        let id = self.inner.tree.resolve_model(
            self.inner.id,
            key,
            FeatureKind::PropertyMap,
            FeatureSet::MODEL_MAP,
        )?;
        NodeHandle::new(&mut *self.inner.tree, id).properties()
    }

    /// Copies the entries accepted by `predicate` through [`set`](Self::set).
    /// Returns the number of keys that changed.
    pub fn import<I, K, P>(&mut self, source: I, mut predicate: P) -> Result<usize, TreeError>
    where
        I: IntoIterator<Item = (K, StructuredValue)>,
        K: AsRef<str>,
        P: FnMut(&str) -> bool,
    {
        let mut changed = 0;
        for (key, value) in source {
            let key = key.as_ref();
            if predicate(key) && self.set(key, value)? {
                changed += 1;
            }
        }
        Ok(changed)
    }

    pub fn set_update_mode(&mut self, key: &str, mode: ClientUpdateMode) -> Result<(), TreeError> {
        self.inner.tree.set_update_mode(self.inner.id, key, mode)
    }

    pub fn update_mode(&self, key: &str) -> ClientUpdateMode {
        self.inner.tree.update_mode(self.inner.id, key)
    }
}

impl<'a> NodeListHandle<'a> {
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    pub fn kind(&self) -> FeatureKind {
        self.kind
    }

    pub fn items(&self) -> &[NodeId] {
        self.inner.tree.list_items(self.inner.id, self.kind)
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    /// Creates a new node declaring `features` at `index`.
    pub fn attach_child(&mut self, index: usize, features: FeatureSet) -> Result<NodeId, TreeError> {
        self.inner
            .tree
            .insert_new_child(self.inner.id, self.kind, index, features)
    }

    /// Appends a new node declaring `features`.
    pub fn push_child(&mut self, features: FeatureSet) -> Result<NodeId, TreeError> {
        let len = self.len();
        self.attach_child(len, features)
    }

    /// Removes `child`; it and its subtree are retired.
    pub fn detach_child(&mut self, child: NodeId) -> Result<(), TreeError> {
        self.inner
            .tree
            .remove_child(self.inner.id, self.kind, child)
            .map(|_| ())
    }

    pub fn move_child(&mut self, child: NodeId, new_index: usize) -> Result<bool, TreeError> {
        self.inner
            .tree
            .move_child(self.inner.id, self.kind, child, new_index)
    }

    /// Moves an existing node from its current list to `index` of this one.
    pub fn adopt(&mut self, index: usize, child: NodeId) -> Result<(), TreeError> {
        self.inner.tree.adopt(self.inner.id, self.kind, index, child)
    }

    /// Detaches every child, last first.
    pub fn clear(&mut self) -> Result<(), TreeError> {
        while let Some(&last) = self.items().last() {
            self.detach_child(last)?;
        }
        Ok(())
    }

    /// Handle to a child, for nested edits.
    pub fn child(&mut self, child: NodeId) -> Result<NodeHandle<'_>, TreeError> {
        if !self.items().contains(&child) {
            return Err(TreeError::NotInList {
                parent: self.inner.id,
                feature: self.kind,
                child,
            });
        }
        Ok(NodeHandle::new(&mut *self.inner.tree, child))
    }
}

impl<'a> ModelListHandle<'a> {
    pub fn id(&self) -> NodeId {
        self.inner.id()
    }

    pub fn items(&self) -> &[NodeId] {
        self.inner.items()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Inserts a new item node at `index`.
    pub fn add_new(&mut self, index: usize) -> Result<NodeId, TreeError> {
        self.inner.attach_child(index, FeatureSet::MODEL_MAP)
    }

    /// Inserts a new item at `index` holding `properties`.
    pub fn add_with<I, K>(&mut self, index: usize, properties: I) -> Result<NodeId, TreeError>
    where
        I: IntoIterator<Item = (K, StructuredValue)>,
        K: AsRef<str>,
    {
        let item = self.add_new(index)?;
        let mut map = self.inner.child(item)?.properties()?;
        map.import(properties, |_| true)?;
        Ok(item)
    }

    pub fn remove(&mut self, item: NodeId) -> Result<(), TreeError> {
        self.inner.detach_child(item)
    }

    pub fn move_item(&mut self, item: NodeId, new_index: usize) -> Result<bool, TreeError> {
        self.inner.move_child(item, new_index)
    }

    pub fn adopt(&mut self, index: usize, item: NodeId) -> Result<(), TreeError> {
        self.inner.adopt(index, item)
    }

    pub fn clear(&mut self) -> Result<(), TreeError> {
        self.inner.clear()
    }

    /// Property map of an item.
    pub fn item(&mut self, item: NodeId) -> Result<PropertyMapHandle<'_>, TreeError> {
        self.inner.child(item)?.properties()
    }
}

impl StateTree {
    pub fn properties(&mut self, id: NodeId) -> Result<PropertyMapHandle<'_>, TreeError> {
        self.node_mut(id)?.properties()
    }

    pub fn children(&mut self, id: NodeId) -> Result<NodeListHandle<'_>, TreeError> {
        self.node_mut(id)?.children()
    }

    pub fn model_list(&mut self, id: NodeId) -> Result<ModelListHandle<'_>, TreeError> {
        self.node_mut(id)?.model_list()
    }
}
