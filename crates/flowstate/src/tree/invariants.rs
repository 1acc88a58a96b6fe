use std::collections::HashSet;

use super::StateTree;

impl StateTree {
    /// Checks the structural invariants of the tree.
    ///
    /// Run before every collection in debug builds, and in release builds
    /// when invariant checks are enabled.
    pub fn validate_invariants(&self) -> Result<(), String> {
        let root = self
            .nodes
            .get(&self.root())
            .ok_or_else(|| "root points to missing node".to_string())?;
        if root.parent().is_some() {
            return Err(format!("root {} has a parent", root.id()));
        }

        let mut referenced = HashSet::new();
        for (id, node) in &self.nodes {
            if node.id() != *id {
                return Err(format!("node {} is indexed under {}", node.id(), id));
            }
            for child in node.children() {
                if !referenced.insert(child) {
                    return Err(format!("node {child} is referenced more than once"));
                }
                let Some(child_node) = self.nodes.get(&child) else {
                    return Err(format!("node {id} points to missing child {child}"));
                };
                if child_node.parent() != Some(*id) {
                    return Err(format!(
                        "node {child} is held by {id} but records parent {:?}",
                        child_node.parent()
                    ));
                }
            }
            if node.has_pending_changes() && !self.dirty.contains(id) {
                return Err(format!("node {id} has pending changes but is not dirty"));
            }
        }

        let live = self.reachable();
        if let Some(orphan) = self.nodes.keys().find(|id| !live.contains(id)) {
            return Err(format!("node {orphan} is indexed but not reachable"));
        }
        if let Some(dead) = self.dirty.iter().find(|id| !self.nodes.contains_key(id)) {
            return Err(format!("dirty node {dead} is not live"));
        }
        if let Some(both) = self.pending_detach.iter().find(|id| self.nodes.contains_key(id)) {
            return Err(format!("node {both} is live but queued for detach"));
        }
        for (parent, feature, child) in &self.retired_departures {
            if !self.pending_detach.contains(parent) {
                return Err(format!(
                    "departure of {child} from the {feature} of {parent} has no retired owner"
                ));
            }
        }
        Ok(())
    }
}
