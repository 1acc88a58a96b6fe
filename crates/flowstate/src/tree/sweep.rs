use std::collections::{HashSet, VecDeque};

use tracing::{debug, trace};

use super::StateTree;
use crate::feature::Feature;
use crate::NodeId;

impl StateTree {
    /// Ids reachable from the root, breadth-first.
    pub(crate) fn reachable(&self) -> HashSet<NodeId> {
        let mut seen = HashSet::with_capacity(self.nodes.len());
        let mut queue = VecDeque::from([self.root()]);
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id) {
                continue;
            }
            if let Some(node) = self.nodes.get(&id) {
                queue.extend(node.children());
            }
        }
        seen
    }

    /// Drops every node that is no longer reachable from the root.
    ///
    /// Retired nodes the remote side knows about are queued for a `Detach`
    /// record, along with any children adopted out of their lists; nodes that
    /// were never reported disappear without a trace.
    /// Returns the number of retired nodes.
    pub(crate) fn sweep(&mut self) -> usize {
        if self.nodes.len() == 1 {
            return 0;
        }
        let live = self.reachable();
        if live.len() == self.nodes.len() {
            return 0;
        }
        let mut dead: Vec<NodeId> = self
            .nodes
            .keys()
            .filter(|id| !live.contains(id))
            .copied()
            .collect();
        dead.sort_unstable();
        for id in &dead {
            let Some(node) = self.nodes.remove(id) else {
                continue;
            };
            self.dirty.remove(id);
            if node.reported {
                for feature in node.features() {
                    if let Feature::ChildList(list) | Feature::ModelList(list) = feature {
                        let kind = feature.kind();
                        for child in list.departed(|c| live.contains(&c)) {
                            self.retired_departures.insert((*id, kind, child));
                        }
                    }
                }
                self.pending_detach.insert(*id);
                trace!(node = %id, "node retired");
            } else {
                trace!(node = %id, "node discarded before it was reported");
            }
        }
        debug!(retired = dead.len(), live = self.nodes.len(), "reachability sweep");
        dead.len()
    }
}
