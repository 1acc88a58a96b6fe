use serde_json::Value;

use crate::value::StructuredValue;

/// Performs a structural equality check between two structured values.
///
/// Compared recursively:
/// - Primitives (null, bool, number, string)
/// - Arrays (element-by-element comparison)
/// - Objects (key-by-key comparison, independent of key order)
/// - Node references (by id)
///
/// Unlike `==` on `f64`, two `NaN` numbers are considered equal, so writing
/// `NaN` over `NaN` is not a change.
///
/// # Examples
///
/// ```
/// use flowstate_value::{deep_equal, StructuredValue};
///
/// let a = StructuredValue::from(vec![1, 2, 3]);
/// let b = StructuredValue::from(vec![1, 2, 3]);
/// let c = StructuredValue::from(vec![1, 2, 4]);
///
/// assert!(deep_equal(&a, &b));
/// assert!(!deep_equal(&a, &c));
/// ```
pub fn deep_equal(a: &StructuredValue, b: &StructuredValue) -> bool {
    match (a, b) {
        (StructuredValue::Null, StructuredValue::Null) => true,
        (StructuredValue::Bool(a), StructuredValue::Bool(b)) => a == b,
        (StructuredValue::Number(a), StructuredValue::Number(b)) => {
            a == b || (a.is_nan() && b.is_nan())
        }
        (StructuredValue::String(a), StructuredValue::String(b)) => a == b,
        (StructuredValue::NodeRef(a), StructuredValue::NodeRef(b)) => a == b,

        // Arrays
        (StructuredValue::Array(arr_a), StructuredValue::Array(arr_b)) => {
            arr_a.len() == arr_b.len()
                && arr_a.iter().zip(arr_b).all(|(x, y)| deep_equal(x, y))
        }

        // Objects
        (StructuredValue::Object(obj_a), StructuredValue::Object(obj_b)) => {
            if obj_a.len() != obj_b.len() {
                return false;
            }
            for (key, val_a) in obj_a {
                match obj_b.get(key) {
                    Some(val_b) => {
                        if !deep_equal(val_a, val_b) {
                            return false;
                        }
                    }
                    None => return false,
                }
            }
            true
        }

        // Different types are never equal
        _ => false,
    }
}

/// Deep equality between two JSON documents.
///
/// Used to compare rendered tree views, where object key order may differ
/// between the two sides.
pub fn deep_equal_json(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Array(arr_a), Value::Array(arr_b)) => {
            arr_a.len() == arr_b.len()
                && arr_a.iter().zip(arr_b).all(|(x, y)| deep_equal_json(x, y))
        }
        (Value::Object(obj_a), Value::Object(obj_b)) => {
            obj_a.len() == obj_b.len()
                && obj_a
                    .iter()
                    .all(|(key, val_a)| obj_b.get(key).is_some_and(|val_b| deep_equal_json(val_a, val_b)))
        }
        _ => false,
    }
}
