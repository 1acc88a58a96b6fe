#![allow(dead_code)]

use flowstate::{Change, DiffBatch, FeatureKind, MirrorTree, NodeId, StateTree};

/// A server tree and the client mirror fed by its batches.
pub struct Pair {
    pub tree: StateTree,
    pub mirror: MirrorTree,
}

impl Pair {
    pub fn new() -> Self {
        Self {
            tree: StateTree::default(),
            mirror: MirrorTree::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        self.tree.root()
    }

    /// Collects, applies the batch to the mirror and checks both sides agree.
    pub fn sync(&mut self) -> DiffBatch {
        let batch = self.tree.collect_changes().expect("collection must succeed");
        self.mirror
            .apply(&batch)
            .unwrap_or_else(|e| panic!("mirror rejected batch {batch:?}: {e}"));
        assert_eq!(
            self.mirror.view(self.mirror.root()),
            self.tree.view(self.tree.root()),
            "mirror diverged after batch {batch:?}"
        );
        batch
    }
}

pub fn insert(parent: NodeId, index: usize, child: NodeId) -> Change {
    Change::ChildInsert {
        parent,
        feature: FeatureKind::ChildList,
        index,
        child,
    }
}

pub fn set(node: NodeId, key: &str, value: impl Into<flowstate::StructuredValue>) -> Change {
    Change::PropertySet {
        node,
        key: key.to_owned(),
        value: value.into(),
    }
}
