//! JSON codec for [`StructuredValue`].
//!
//! Scalars, arrays and objects map to their natural JSON form. A node
//! reference travels as an object with exactly one key, [`NODE_ID_KEY`],
//! holding the integer id:
//!
//! ```
//! use flowstate_value::{from_json, to_json, NodeId, StructuredValue};
//! use serde_json::json;
//!
//! let v = StructuredValue::NodeRef(NodeId::new(12));
//! assert_eq!(to_json(&v), json!({ "nodeId": 12 }));
//! assert_eq!(from_json(&json!({ "nodeId": 12 })), v);
//! ```

use serde_json::{Map, Number, Value};

use crate::node_id::NodeId;
use crate::value::StructuredValue;

/// Key of the single-entry object that encodes a node reference.
pub const NODE_ID_KEY: &str = "nodeId";

/// Largest integer that survives the trip through `f64` unchanged.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

pub fn to_json(value: &StructuredValue) -> Value {
    match value {
        StructuredValue::Null => Value::Null,
        StructuredValue::Bool(b) => Value::Bool(*b),
        StructuredValue::Number(n) => number_to_json(*n),
        StructuredValue::String(s) => Value::String(s.clone()),
        StructuredValue::Array(items) => Value::Array(items.iter().map(to_json).collect()),
        StructuredValue::Object(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                out.insert(k.clone(), to_json(v));
            }
            Value::Object(out)
        }
        StructuredValue::NodeRef(id) => {
            let mut out = Map::new();
            out.insert(NODE_ID_KEY.to_owned(), Value::from(id.raw()));
            Value::Object(out)
        }
    }
}

pub fn from_json(value: &Value) -> StructuredValue {
    match value {
        Value::Null => StructuredValue::Null,
        Value::Bool(b) => StructuredValue::Bool(*b),
        Value::Number(n) => StructuredValue::Number(n.as_f64().unwrap_or(0.0)),
        Value::String(s) => StructuredValue::String(s.clone()),
        Value::Array(items) => StructuredValue::Array(items.iter().map(from_json).collect()),
        Value::Object(map) => {
            if let Some(id) = node_ref_from_object(map) {
                return StructuredValue::NodeRef(id);
            }
            StructuredValue::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), from_json(v)))
                    .collect(),
            )
        }
    }
}

fn node_ref_from_object(map: &Map<String, Value>) -> Option<NodeId> {
    if map.len() != 1 {
        return None;
    }
    let raw = map.get(NODE_ID_KEY)?.as_u64()?;
    u32::try_from(raw).ok().map(NodeId::new)
}

fn number_to_json(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        return Value::Number(Number::from(n as i64));
    }
    // NaN and infinities have no JSON form.
    Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
}

impl From<Value> for StructuredValue {
    fn from(v: Value) -> Self {
        from_json(&v)
    }
}

impl From<StructuredValue> for Value {
    fn from(v: StructuredValue) -> Self {
        to_json(&v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn integral_numbers_render_without_fraction() {
        assert_eq!(to_json(&StructuredValue::Number(1.0)), json!(1));
        assert_eq!(to_json(&StructuredValue::Number(-7.0)), json!(-7));
        assert_eq!(to_json(&StructuredValue::Number(0.5)), json!(0.5));
    }

    #[test]
    fn non_finite_numbers_render_as_null() {
        assert_eq!(to_json(&StructuredValue::Number(f64::NAN)), Value::Null);
        assert_eq!(to_json(&StructuredValue::Number(f64::INFINITY)), Value::Null);
    }

    #[test]
    fn object_with_extra_keys_is_not_a_node_ref() {
        let v = from_json(&json!({ "nodeId": 3, "other": true }));
        assert!(matches!(v, StructuredValue::Object(_)));
    }

    #[test]
    fn object_with_non_integer_node_id_is_not_a_node_ref() {
        let v = from_json(&json!({ "nodeId": "3" }));
        assert!(matches!(v, StructuredValue::Object(_)));
        let v = from_json(&json!({ "nodeId": -1 }));
        assert!(matches!(v, StructuredValue::Object(_)));
    }

    #[test]
    fn serde_goes_through_json_form() {
        let v = StructuredValue::Array(vec![
            StructuredValue::NodeRef(NodeId::new(2)),
            "a".into(),
            true.into(),
        ]);
        let text = serde_json::to_string(&v).unwrap();
        assert_eq!(text, r#"[{"nodeId":2},"a",true]"#);
        let back: StructuredValue = serde_json::from_str(&text).unwrap();
        assert_eq!(back, v);
    }
}
