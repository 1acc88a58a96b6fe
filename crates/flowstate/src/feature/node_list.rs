use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::TreeError;
use crate::NodeId;

/// One structural list operation, in the order it was applied.
///
/// `Insert` and `Move` indices refer to the list as it stands right after the
/// operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum ListOp {
    Insert { index: usize, child: NodeId },
    Remove { child: NodeId },
    Move { child: NodeId, index: usize },
}

impl ListOp {
    pub fn child(&self) -> NodeId {
        match *self {
            ListOp::Insert { child, .. } | ListOp::Remove { child } | ListOp::Move { child, .. } => {
                child
            }
        }
    }
}

/// Ordered list of node ids with an operation log.
///
/// `baseline` is the list as the remote side last saw it and `ops` the
/// mutations applied since; replaying `ops` on `baseline` always yields
/// `items`.
#[derive(Debug, Clone, Default)]
pub struct NodeList {
    items: Vec<NodeId>,
    baseline: Vec<NodeId>,
    ops: Vec<ListOp>,
}

impl NodeList {
    pub fn items(&self) -> &[NodeId] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, child: NodeId) -> bool {
        self.items.contains(&child)
    }

    pub fn index_of(&self, child: NodeId) -> Option<usize> {
        self.items.iter().position(|c| *c == child)
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.ops.is_empty()
    }

    pub(crate) fn insert(&mut self, index: usize, child: NodeId) -> Result<(), TreeError> {
        if index > self.items.len() {
            return Err(TreeError::IndexOutOfBounds {
                index,
                len: self.items.len(),
            });
        }
        self.items.insert(index, child);
        self.ops.push(ListOp::Insert { index, child });
        Ok(())
    }

    /// Removes `child`, returning its former index.
    pub(crate) fn remove(&mut self, child: NodeId) -> Option<usize> {
        let pos = self.index_of(child)?;
        self.items.remove(pos);
        self.ops.push(ListOp::Remove { child });
        Some(pos)
    }

    /// Moves `child` so that it ends up at `index`.
    ///
    /// `Ok(None)` if the child is not in the list, `Ok(Some(false))` if it is
    /// already at `index`.
    pub(crate) fn move_to(&mut self, child: NodeId, index: usize) -> Result<Option<bool>, TreeError> {
        let Some(pos) = self.index_of(child) else {
            return Ok(None);
        };
        if index >= self.items.len() {
            return Err(TreeError::IndexOutOfBounds {
                index,
                len: self.items.len(),
            });
        }
        if pos == index {
            return Ok(Some(false));
        }
        self.items.remove(pos);
        self.items.insert(index, child);
        self.ops.push(ListOp::Move { child, index });
        Ok(Some(true))
    }

    pub(crate) fn commit(&mut self) {
        self.ops.clear();
        self.baseline.clone_from(&self.items);
    }

    /// Forget the remote view: the next collection re-inserts every item.
    pub(crate) fn reset_for_resync(&mut self) {
        self.baseline.clear();
        self.ops = self
            .items
            .iter()
            .enumerate()
            .map(|(index, &child)| ListOp::Insert { index, child })
            .collect();
    }

    /// Children the remote side holds in this list that have since moved to
    /// another list. `live` tells whether a node is still part of the tree.
    pub fn departed<F>(&self, live: F) -> BTreeSet<NodeId>
    where
        F: Fn(NodeId) -> bool,
    {
        self.baseline
            .iter()
            .copied()
            .filter(|c| !self.items.contains(c) && live(*c))
            .collect()
    }

    /// Children that entered and left the list since the last commit.
    pub fn transient(&self) -> BTreeSet<NodeId> {
        self.ops
            .iter()
            .map(ListOp::child)
            .filter(|c| !self.baseline.contains(c) && !self.items.contains(c))
            .collect()
    }

    /// Replays the op log on the baseline and returns the operations as the
    /// remote side must see them.
    ///
    /// Children rejected by `visible` are dropped from the output and the
    /// indices of the remaining operations are shifted to count visible
    /// children only. Fails if the log does not reproduce the current items.
    pub fn replay<F>(&self, visible: F) -> Result<Vec<ListOp>, String>
    where
        F: Fn(NodeId) -> bool,
    {
        let mut cur = self.baseline.clone();
        let mut out = Vec::with_capacity(self.ops.len());
        let visible_before =
            |list: &[NodeId], end: usize| list[..end].iter().filter(|c| visible(**c)).count();
        for op in &self.ops {
            match *op {
                ListOp::Insert { index, child } => {
                    if index > cur.len() {
                        return Err(format!(
                            "insert of {child} at {index} past end of list of length {}",
                            cur.len()
                        ));
                    }
                    cur.insert(index, child);
                    if visible(child) {
                        out.push(ListOp::Insert {
                            index: visible_before(&cur, index),
                            child,
                        });
                    }
                }
                ListOp::Remove { child } => {
                    let pos = cur
                        .iter()
                        .position(|c| *c == child)
                        .ok_or_else(|| format!("remove of {child} which is not in the list"))?;
                    cur.remove(pos);
                    if visible(child) {
                        out.push(ListOp::Remove { child });
                    }
                }
                ListOp::Move { child, index } => {
                    let pos = cur
                        .iter()
                        .position(|c| *c == child)
                        .ok_or_else(|| format!("move of {child} which is not in the list"))?;
                    cur.remove(pos);
                    if index > cur.len() {
                        return Err(format!(
                            "move of {child} to {index} past end of list of length {}",
                            cur.len() + 1
                        ));
                    }
                    cur.insert(index, child);
                    if visible(child) {
                        out.push(ListOp::Move {
                            child,
                            index: visible_before(&cur, index),
                        });
                    }
                }
            }
        }
        if cur != self.items {
            return Err(format!(
                "op log replays to {cur:?} but the list holds {:?}",
                self.items
            ));
        }
        Ok(out)
    }
}
