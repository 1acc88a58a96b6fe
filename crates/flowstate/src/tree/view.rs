//! JSON rendering of a subtree, shared by [`StateTree`] and
//! [`MirrorTree`](crate::MirrorTree) so both sides can be compared directly.

use serde_json::{json, Map, Value};

use flowstate_value::{to_json, StructuredValue};

use super::StateTree;
use crate::feature::FeatureKind;
use crate::NodeId;

/// Read access to a node graph for rendering.
pub(crate) trait ViewSource {
    fn has_node(&self, id: NodeId) -> bool;
    fn view_properties(&self, id: NodeId) -> Vec<(&str, &StructuredValue)>;
    fn view_items(&self, id: NodeId, kind: FeatureKind) -> &[NodeId];
}

/// Renders `id` as `{"id", "properties", "children", "items"}`; node
/// references inside property values render as nested views. An unknown id
/// renders as `null`.
pub(crate) fn render<S: ViewSource + ?Sized>(src: &S, id: NodeId) -> Value {
    if !src.has_node(id) {
        return Value::Null;
    }
    let mut properties = Map::new();
    for (key, value) in src.view_properties(id) {
        properties.insert(key.to_owned(), render_value(src, value));
    }
    let children: Vec<Value> = src
        .view_items(id, FeatureKind::ChildList)
        .iter()
        .map(|c| render(src, *c))
        .collect();
    let items: Vec<Value> = src
        .view_items(id, FeatureKind::ModelList)
        .iter()
        .map(|c| render(src, *c))
        .collect();
    json!({
        "id": id.raw(),
        "properties": properties,
        "children": children,
        "items": items
    })
}

fn render_value<S: ViewSource + ?Sized>(src: &S, value: &StructuredValue) -> Value {
    match value {
        StructuredValue::NodeRef(r) if src.has_node(*r) => render(src, *r),
        StructuredValue::Array(items) => {
            Value::Array(items.iter().map(|v| render_value(src, v)).collect())
        }
        StructuredValue::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render_value(src, v)))
                .collect(),
        ),
        other => to_json(other),
    }
}

impl ViewSource for StateTree {
    fn has_node(&self, id: NodeId) -> bool {
        self.contains(id)
    }

    fn view_properties(&self, id: NodeId) -> Vec<(&str, &StructuredValue)> {
        self.node(id)
            .and_then(|n| n.property_map())
            .map(|m| m.iter().collect())
            .unwrap_or_default()
    }

    fn view_items(&self, id: NodeId, kind: FeatureKind) -> &[NodeId] {
        self.list_items(id, kind)
    }
}

impl StateTree {
    /// JSON rendering of the subtree at `id`.
    pub fn view(&self, id: NodeId) -> Value {
        render(self, id)
    }
}
