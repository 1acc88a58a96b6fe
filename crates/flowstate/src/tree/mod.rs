//! The state tree: node index, identity allocation and dirty tracking.
//!
//! All mutations, local or remote, go through the primitives in this module.
//! Each primitive validates its inputs before touching anything, so a failed
//! call leaves the tree as it was.

mod copy;
mod handles;
mod invariants;
mod sweep;
pub(crate) mod view;

use std::collections::{BTreeSet, HashMap};

use flowstate_value::StructuredValue;
use tracing::{debug, trace};

use crate::error::TreeError;
use crate::feature::{ClientUpdateMode, FeatureKind, FeatureSet};
use crate::node::StateNode;
use crate::NodeId;

pub use handles::{ModelListHandle, NodeHandle, NodeListHandle, PropertyMapHandle};

const ROOT_ID: NodeId = NodeId::new(1);

#[derive(Debug, Clone)]
pub struct StateTree {
    pub(crate) nodes: HashMap<NodeId, StateNode>,
    root: NodeId,
    next_id: NodeId,
    pub(crate) dirty: BTreeSet<NodeId>,
    /// Retired nodes the remote side still holds; each gets a `Detach` record.
    pub(crate) pending_detach: BTreeSet<NodeId>,
    /// `(parent, feature, child)` for children adopted out of a list whose
    /// owner has since been retired.
    pub(crate) retired_departures: BTreeSet<(NodeId, FeatureKind, NodeId)>,
    pub(crate) sync_id: u64,
    check_invariants: bool,
}

impl Default for StateTree {
    fn default() -> Self {
        Self::new(FeatureSet::ELEMENT)
    }
}

impl StateTree {
    /// Creates a tree whose root declares `root_features`.
    ///
    /// The root is known to the remote side from the start and is never
    /// announced with an `Attach` record.
    pub fn new(root_features: FeatureSet) -> Self {
        let mut root = StateNode::new(ROOT_ID, None, root_features);
        root.reported = true;
        let mut nodes = HashMap::new();
        nodes.insert(ROOT_ID, root);
        Self {
            nodes,
            root: ROOT_ID,
            next_id: NodeId::new(ROOT_ID.raw() + 1),
            dirty: BTreeSet::new(),
            pending_detach: BTreeSet::new(),
            retired_departures: BTreeSet::new(),
            sync_id: 0,
            check_invariants: false,
        }
    }

    /// Validate invariants before every collection, also in release builds.
    pub fn set_check_invariants(&mut self, enabled: bool) {
        self.check_invariants = enabled;
    }

    pub(crate) fn checks_invariants(&self) -> bool {
        cfg!(debug_assertions) || self.check_invariants
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Number of live nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Ids of all live nodes, ascending.
    pub fn node_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn node(&self, id: NodeId) -> Option<&StateNode> {
        self.nodes.get(&id)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(&id).and_then(StateNode::parent)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Result<NodeHandle<'_>, TreeError> {
        if !self.contains(id) {
            return Err(TreeError::UnknownNode(id));
        }
        Ok(NodeHandle::new(self, id))
    }

    pub fn root_mut(&mut self) -> NodeHandle<'_> {
        let root = self.root;
        NodeHandle::new(self, root)
    }

    pub fn sync_id(&self) -> u64 {
        self.sync_id
    }

    pub fn mark_dirty(&mut self, id: NodeId) -> Result<(), TreeError> {
        if !self.contains(id) {
            return Err(TreeError::UnknownNode(id));
        }
        self.touch(id);
        Ok(())
    }

    pub(crate) fn touch(&mut self, id: NodeId) {
        self.dirty.insert(id);
    }

    pub fn has_dirty_nodes(&self) -> bool {
        !self.dirty.is_empty() || !self.pending_detach.is_empty()
    }

    pub fn dirty_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.dirty.iter().copied()
    }

    pub fn property(&self, id: NodeId, key: &str) -> Option<&StructuredValue> {
        self.nodes.get(&id)?.property_map()?.get(key)
    }

    /// Items of a list feature; a list that was never written reads as empty.
    pub fn list_items(&self, id: NodeId, kind: FeatureKind) -> &[NodeId] {
        self.nodes
            .get(&id)
            .and_then(|n| n.list(kind))
            .map(|l| l.items())
            .unwrap_or(&[])
    }

    /// Whether `id` sits in the model list of its parent.
    pub fn is_model_list_item(&self, id: NodeId) -> bool {
        self.parent(id)
            .map(|p| self.list_items(p, FeatureKind::ModelList).contains(&id))
            .unwrap_or(false)
    }

    /// Whether `ancestor` is `id` or lies on its parent chain.
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut cursor = Some(id);
        while let Some(cur) = cursor {
            if cur == ancestor {
                return true;
            }
            cursor = self.parent(cur);
        }
        false
    }

    /// Forget everything the remote side has seen.
    ///
    /// The next collection announces every live node again with full
    /// property and list contents, and no `Detach` records.
    pub fn prepare_for_resync(&mut self) {
        let root = self.root;
        for node in self.nodes.values_mut() {
            node.reported = node.id() == root;
            for feature in node.features_mut() {
                feature.reset_for_resync();
            }
        }
        self.dirty = self.nodes.keys().copied().collect();
        self.pending_detach.clear();
        self.retired_departures.clear();
        debug!(nodes = self.nodes.len(), "prepared state tree for resync");
    }

    // ── Internal primitives ─────────────────────────────────────────────────

    pub(crate) fn node_entry(&mut self, id: NodeId) -> Result<&mut StateNode, TreeError> {
        self.nodes.get_mut(&id).ok_or(TreeError::UnknownNode(id))
    }

    /// Fails without allocating once the last id has been handed out.
    fn alloc(&mut self, parent: NodeId, features: FeatureSet) -> Result<NodeId, TreeError> {
        let id = self.next_id;
        self.next_id = id.next().ok_or(TreeError::IdSpaceExhausted)?;
        self.nodes
            .insert(id, StateNode::new(id, Some(parent), features));
        trace!(node = %id, parent = %parent, "node created");
        Ok(id)
    }

    fn require_list(&self, owner: NodeId, kind: FeatureKind) -> Result<usize, TreeError> {
        let node = self.nodes.get(&owner).ok_or(TreeError::UnknownNode(owner))?;
        if !kind.is_list() || !node.supports(kind) {
            return Err(TreeError::UnsupportedFeature {
                node: owner,
                feature: kind,
            });
        }
        Ok(node.list(kind).map_or(0, |l| l.len()))
    }

    fn require_property_map(&self, owner: NodeId) -> Result<(), TreeError> {
        let node = self.nodes.get(&owner).ok_or(TreeError::UnknownNode(owner))?;
        if !node.supports(FeatureKind::PropertyMap) {
            return Err(TreeError::UnsupportedFeature {
                node: owner,
                feature: FeatureKind::PropertyMap,
            });
        }
        Ok(())
    }

    /// Creates a node declaring `features` and inserts it at `index`.
    pub(crate) fn insert_new_child(
        &mut self,
        parent: NodeId,
        kind: FeatureKind,
        index: usize,
        features: FeatureSet,
    ) -> Result<NodeId, TreeError> {
        let len = self.require_list(parent, kind)?;
        if index > len {
            return Err(TreeError::IndexOutOfBounds { index, len });
        }
        let child = self.alloc(parent, features)?;
        self.node_entry(parent)?.list_mut(kind)?.insert(index, child)?;
        self.touch(parent);
        self.sweep();
        Ok(child)
    }

    /// Removes `child` from the list; the child and its subtree are retired.
    pub(crate) fn remove_child(
        &mut self,
        parent: NodeId,
        kind: FeatureKind,
        child: NodeId,
    ) -> Result<usize, TreeError> {
        if child == self.root {
            return Err(TreeError::RootImmovable);
        }
        self.require_list(parent, kind)?;
        let pos = self
            .node_entry(parent)?
            .list_mut(kind)?
            .remove(child)
            .ok_or(TreeError::NotInList {
                parent,
                feature: kind,
                child,
            })?;
        self.touch(parent);
        self.sweep();
        Ok(pos)
    }

    /// Moves `child` within its list. Returns `false` if it already sits at
    /// `index`, in which case nothing is recorded.
    pub(crate) fn move_child(
        &mut self,
        parent: NodeId,
        kind: FeatureKind,
        child: NodeId,
        index: usize,
    ) -> Result<bool, TreeError> {
        self.require_list(parent, kind)?;
        let moved = self
            .node_entry(parent)?
            .list_mut(kind)?
            .move_to(child, index)?
            .ok_or(TreeError::NotInList {
                parent,
                feature: kind,
                child,
            })?;
        if moved {
            self.touch(parent);
            self.sweep();
        }
        Ok(moved)
    }

    /// Moves an existing node, keeping its id and subtree, from whatever list
    /// holds it into position `index` of the given list.
    pub(crate) fn adopt(
        &mut self,
        parent: NodeId,
        kind: FeatureKind,
        index: usize,
        child: NodeId,
    ) -> Result<(), TreeError> {
        if child == self.root {
            return Err(TreeError::RootImmovable);
        }
        let len = self.require_list(parent, kind)?;
        let old_parent = self
            .nodes
            .get(&child)
            .ok_or(TreeError::UnknownNode(child))?
            .parent()
            .ok_or(TreeError::RootImmovable)?;
        if self.is_ancestor_or_self(child, parent) {
            return Err(TreeError::WouldCreateCycle { parent, child });
        }
        if old_parent == parent && self.list_items(parent, kind).contains(&child) {
            return self.move_child(parent, kind, child, index).map(|_| ());
        }
        let old_kind = [FeatureKind::ChildList, FeatureKind::ModelList]
            .into_iter()
            .find(|k| self.list_items(old_parent, *k).contains(&child))
            .ok_or(TreeError::NotInList {
                parent: old_parent,
                feature: kind,
                child,
            })?;
        if index > len {
            return Err(TreeError::IndexOutOfBounds { index, len });
        }

        self.node_entry(old_parent)?.list_mut(old_kind)?.remove(child);
        self.node_entry(parent)?.list_mut(kind)?.insert(index, child)?;
        self.node_entry(child)?.set_parent(Some(parent));
        self.touch(old_parent);
        self.touch(parent);
        debug!(node = %child, from = %old_parent, to = %parent, "node adopted");
        self.sweep();
        Ok(())
    }

    /// Stores `value` under `key`; node references in it are replaced by
    /// references to fresh copies owned by `node`.
    ///
    /// Returns `false` if the value was equal to the current one.
    pub(crate) fn set_property(
        &mut self,
        node: NodeId,
        key: &str,
        value: StructuredValue,
    ) -> Result<bool, TreeError> {
        self.require_property_map(node)?;
        if let Some(missing) = value.node_refs().into_iter().find(|r| !self.contains(*r)) {
            return Err(TreeError::UnknownNode(missing));
        }
        let unchanged = self
            .nodes
            .get(&node)
            .and_then(StateNode::property_map)
            .is_some_and(|m| !m.differs(key, &value));
        if unchanged {
            return Ok(false);
        }
        let value = if value.contains_node_ref() {
            match value.try_map_node_refs(&mut |r| self.copy_subtree(r, node).map(StructuredValue::NodeRef)) {
                Ok(value) => value,
                Err(err) => {
                    // Copies made before the failure are unreachable and were never reported.
                    self.sweep();
                    return Err(err);
                }
            }
        } else {
            value
        };
        let adds_nodes = value.contains_node_ref();
        let old = self
            .node_entry(node)?
            .property_map_mut()?
            .put(key.to_owned(), value);
        self.touch(node);
        if adds_nodes || old.is_some_and(|v| v.contains_node_ref()) {
            self.sweep();
        }
        Ok(true)
    }

    pub(crate) fn remove_property(
        &mut self,
        node: NodeId,
        key: &str,
    ) -> Result<Option<StructuredValue>, TreeError> {
        self.require_property_map(node)?;
        let old = self.node_entry(node)?.property_map_mut()?.take(key);
        if let Some(old) = &old {
            self.touch(node);
            if old.contains_node_ref() {
                self.sweep();
            }
        }
        Ok(old)
    }

    /// Returns the node referenced by `key`, creating one that declares
    /// `features` when the key does not hold a node reference yet.
    pub(crate) fn resolve_model(
        &mut self,
        node: NodeId,
        key: &str,
        kind: FeatureKind,
        features: FeatureSet,
    ) -> Result<NodeId, TreeError> {
        self.require_property_map(node)?;
        if let Some(existing) = self.property(node, key).and_then(StructuredValue::as_node_ref) {
            if let Some(target) = self.nodes.get(&existing) {
                if !target.supports(kind) {
                    return Err(TreeError::UnsupportedFeature {
                        node: existing,
                        feature: kind,
                    });
                }
                return Ok(existing);
            }
        }
        let child = self.alloc(node, features)?;
        let old = self
            .node_entry(node)?
            .property_map_mut()?
            .put(key.to_owned(), StructuredValue::NodeRef(child));
        self.touch(node);
        debug!(node = %node, key, child = %child, "materialized {kind} under property");
        if old.is_some_and(|v| v.contains_node_ref()) {
            self.sweep();
        }
        Ok(child)
    }

    pub(crate) fn set_update_mode(
        &mut self,
        node: NodeId,
        key: &str,
        mode: ClientUpdateMode,
    ) -> Result<(), TreeError> {
        self.require_property_map(node)?;
        self.node_entry(node)?
            .property_map_mut()?
            .set_update_mode(key.to_owned(), mode);
        Ok(())
    }

    pub fn update_mode(&self, node: NodeId, key: &str) -> ClientUpdateMode {
        self.nodes
            .get(&node)
            .and_then(StateNode::property_map)
            .map_or(ClientUpdateMode::Allow, |m| m.update_mode(key))
    }

    /// Record that the remote side already holds the current value of `key`.
    pub(crate) fn acknowledge_property(&mut self, node: NodeId, key: &str) -> Result<(), TreeError> {
        self.node_entry(node)?.property_map_mut()?.acknowledge(key);
        Ok(())
    }
}
