use std::collections::BTreeMap;

use flowstate_value::StructuredValue;

use super::StateTree;
use crate::error::TreeError;
use crate::feature::FeatureKind;
use crate::NodeId;

impl StateTree {
    /// Deep-copies `source` into fresh nodes owned by `new_parent`.
    ///
    /// The copy declares the same features, holds copies of every property
    /// value (nested node references are copied too) and copies of every
    /// list item in order. Returns the id of the new top node, which is not
    /// yet referenced by anything.
    pub(crate) fn copy_subtree(&mut self, source: NodeId, new_parent: NodeId) -> Result<NodeId, TreeError> {
        let src = self.nodes.get(&source).ok_or(TreeError::UnknownNode(source))?;
        let declared = src.declared_features();
        let properties: Vec<(String, StructuredValue)> = src
            .property_map()
            .map(|m| m.iter().map(|(k, v)| (k.to_owned(), v.clone())).collect())
            .unwrap_or_default();
        let lists: Vec<(FeatureKind, Vec<NodeId>)> = [FeatureKind::ChildList, FeatureKind::ModelList]
            .into_iter()
            .filter_map(|kind| src.list(kind).map(|l| (kind, l.items().to_vec())))
            .collect();

        let copy = self.alloc(new_parent, declared)?;
        for (key, value) in properties {
            let value = value.try_map_node_refs(&mut |r| self.copy_subtree(r, copy).map(StructuredValue::NodeRef))?;
            self.node_entry(copy)?.property_map_mut()?.put(key, value);
        }
        for (kind, items) in lists {
            for (index, item) in items.into_iter().enumerate() {
                let item_copy = self.copy_subtree(item, copy)?;
                self.node_entry(copy)?.list_mut(kind)?.insert(index, item_copy)?;
            }
        }
        if self.nodes.get(&copy).is_some_and(|n| n.has_pending_changes()) {
            self.touch(copy);
        }
        Ok(copy)
    }

    /// A plain object holding the properties of `id`, with nested node
    /// references flattened the same way.
    pub fn snapshot(&self, id: NodeId) -> Result<StructuredValue, TreeError> {
        let node = self.nodes.get(&id).ok_or(TreeError::UnknownNode(id))?;
        let mut out = BTreeMap::new();
        if let Some(map) = node.property_map() {
            for (key, value) in map.iter() {
                let value = value.try_map_node_refs(&mut |r| self.snapshot(r))?;
                out.insert(key.to_owned(), value);
            }
        }
        Ok(StructuredValue::Object(out))
    }
}
