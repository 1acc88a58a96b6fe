//! Change collection: turns the pending state of a [`StateTree`] into a
//! [`DiffBatch`] and resets it.
//!
//! Collection runs in two phases. [`StateTree::pending_changes`] reads the
//! tree and builds the records without touching anything; only when that
//! succeeds does the commit phase clear the pending state. An invariant
//! violation therefore aborts the cycle with the tree unchanged.
//!
//! Record order within a batch:
//!
//! 1. `Attach` for every node the remote side has not seen, parents before
//!    children, otherwise by ascending id.
//! 2. `ChildRemove` for every child that left a list the remote side knows
//!    and now lives in another one, by list owner id.
//! 3. For each dirty node by ascending id: property records by key, then the
//!    records of each list feature in mutation order. Children covered by
//!    step 2, and children that entered and left a list within the cycle,
//!    do not appear here.
//! 4. `Detach` for every retired node the remote side had seen, by id.
//!
//! A child therefore never sits in two lists at once on the remote side.

use std::collections::{BTreeSet, HashSet};

use flowstate_value::NodeId;
use tracing::debug;

use crate::change::{Change, DiffBatch};
use crate::error::CollectError;
use crate::feature::{Feature, ListOp, PropertyChange};
use crate::tree::StateTree;

impl StateTree {
    /// Collects every change since the previous collection.
    pub fn collect_changes(&mut self) -> Result<DiffBatch, CollectError> {
        if self.checks_invariants() {
            self.validate_invariants()
                .map_err(CollectError::InvariantViolation)?;
        }
        let changes = self.pending_changes()?;
        self.commit_changes();
        let batch = DiffBatch {
            sync_id: self.sync_id,
            changes,
        };
        self.sync_id += 1;
        debug!(sync_id = batch.sync_id, records = batch.len(), "collected changes");
        Ok(batch)
    }

    /// The records the next collection would emit, without consuming them.
    pub fn pending_changes(&self) -> Result<Vec<Change>, CollectError> {
        let mut changes = self.pending_attaches()?;

        let live = |child: NodeId| self.nodes.contains_key(&child);
        let mut departures = self.retired_departures.clone();
        let mut contents = Vec::new();
        for &id in &self.dirty {
            let node = self.nodes.get(&id).ok_or_else(|| {
                CollectError::InvariantViolation(format!("dirty node {id} is not live"))
            })?;
            for feature in node.features() {
                match feature {
                    Feature::PropertyMap(map) => {
                        contents.extend(map.pending_changes().into_iter().map(|c| match c {
                            PropertyChange::Set(key, value) => Change::PropertySet {
                                node: id,
                                key,
                                value,
                            },
                            PropertyChange::Remove(key) => Change::PropertyRemove { node: id, key },
                        }));
                    }
                    Feature::ChildList(list) | Feature::ModelList(list) => {
                        let kind = feature.kind();
                        // Departed children leave up front; children that only
                        // passed through never show up in this list.
                        let departed = list.departed(live);
                        let mut hidden = list.transient();
                        hidden.extend(departed.iter().copied());
                        departures.extend(departed.into_iter().map(|child| (id, kind, child)));
                        let ops = list.replay(|c| !hidden.contains(&c)).map_err(|e| {
                            CollectError::InvariantViolation(format!("{kind} of node {id}: {e}"))
                        })?;
                        contents.extend(ops.into_iter().map(|op| match op {
                            ListOp::Insert { index, child } => Change::ChildInsert {
                                parent: id,
                                feature: kind,
                                index,
                                child,
                            },
                            ListOp::Remove { child } => Change::ChildRemove {
                                parent: id,
                                feature: kind,
                                child,
                            },
                            ListOp::Move { child, index } => Change::ChildMove {
                                parent: id,
                                feature: kind,
                                child,
                                index,
                            },
                        }));
                    }
                }
            }
        }

        changes.extend(
            departures
                .into_iter()
                .map(|(parent, feature, child)| Change::ChildRemove {
                    parent,
                    feature,
                    child,
                }),
        );
        changes.extend(contents);
        changes.extend(
            self.pending_detach
                .iter()
                .map(|&node| Change::Detach { node }),
        );
        Ok(changes)
    }

    /// `Attach` records for every unreported node, each parent before its
    /// children and otherwise by ascending id.
    fn pending_attaches(&self) -> Result<Vec<Change>, CollectError> {
        let unreported: BTreeSet<NodeId> = self
            .nodes
            .values()
            .filter(|n| !n.reported)
            .map(|n| n.id())
            .collect();
        let mut announced = HashSet::with_capacity(unreported.len());
        let mut attaches = Vec::with_capacity(unreported.len());
        for &id in &unreported {
            let mut chain = Vec::new();
            let mut cursor = id;
            while unreported.contains(&cursor) && !announced.contains(&cursor) {
                if chain.len() == unreported.len() {
                    return Err(CollectError::InvariantViolation(format!(
                        "parent chain of node {id} loops"
                    )));
                }
                let parent = self.parent(cursor).ok_or_else(|| {
                    CollectError::InvariantViolation(format!("unreported node {cursor} has no parent"))
                })?;
                chain.push((cursor, parent));
                cursor = parent;
            }
            for (node, parent) in chain.into_iter().rev() {
                announced.insert(node);
                attaches.push(Change::Attach {
                    node,
                    parent,
                    features: self.nodes[&node].declared_features().kinds(),
                });
            }
        }
        Ok(attaches)
    }

    fn commit_changes(&mut self) {
        for id in std::mem::take(&mut self.dirty) {
            if let Some(node) = self.nodes.get_mut(&id) {
                for feature in node.features_mut() {
                    feature.commit();
                }
            }
        }
        for node in self.nodes.values_mut() {
            node.reported = true;
        }
        self.pending_detach.clear();
        self.retired_departures.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::{FeatureKind, FeatureSet};

    #[test]
    fn first_batch_has_sync_id_zero() {
        let mut tree = StateTree::default();
        assert_eq!(tree.collect_changes().unwrap().sync_id, 0);
        assert_eq!(tree.collect_changes().unwrap().sync_id, 1);
        assert_eq!(tree.sync_id(), 2);
    }

    #[test]
    fn pending_changes_does_not_consume() {
        let mut tree = StateTree::default();
        let root = tree.root();
        tree.set_property(root, "x", 1.into()).unwrap();
        let preview = tree.pending_changes().unwrap();
        assert_eq!(tree.collect_changes().unwrap().changes, preview);
        assert!(tree.pending_changes().unwrap().is_empty());
    }

    #[test]
    fn attach_precedes_contents() {
        let mut tree = StateTree::default();
        let root = tree.root();
        let child = tree
            .insert_new_child(root, FeatureKind::ChildList, 0, FeatureSet::ELEMENT)
            .unwrap();
        tree.set_property(child, "label", "a".into()).unwrap();
        let batch = tree.collect_changes().unwrap();
        assert_eq!(
            batch.changes,
            vec![
                Change::Attach {
                    node: child,
                    parent: root,
                    features: vec![FeatureKind::PropertyMap, FeatureKind::ChildList],
                },
                Change::ChildInsert {
                    parent: root,
                    feature: FeatureKind::ChildList,
                    index: 0,
                    child,
                },
                Change::PropertySet {
                    node: child,
                    key: "label".into(),
                    value: "a".into(),
                },
            ]
        );
    }

    #[test]
    fn corrupt_list_aborts_collection_and_keeps_state() {
        let mut tree = StateTree::default();
        let root = tree.root();
        tree.insert_new_child(root, FeatureKind::ChildList, 0, FeatureSet::ELEMENT)
            .unwrap();
        // Mark a node dirty that is not live.
        tree.dirty.insert(NodeId::new(77));
        let err = tree.collect_changes().unwrap_err();
        assert!(matches!(err, CollectError::InvariantViolation(_)));
        assert_eq!(tree.sync_id(), 0);
        tree.dirty.remove(&NodeId::new(77));
        assert_eq!(tree.collect_changes().unwrap().len(), 2);
    }
}
