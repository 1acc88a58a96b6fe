//! [`StructuredValue`]: the universal payload type of the state tree.
//!
//! Covers what the remote client can hold:
//! - JSON-like scalars (null, bool, number, string)
//! - Arrays and string-keyed objects
//! - References to other nodes of the same tree

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::node_id::NodeId;

/// Tagged union used for property values and RPC arguments.
///
/// Objects keep their keys sorted so that rendering and comparison do not
/// depend on insertion order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "serde_json::Value", into = "serde_json::Value")]
pub enum StructuredValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<StructuredValue>),
    Object(BTreeMap<String, StructuredValue>),
    /// Reference to a node of the owning tree.
    NodeRef(NodeId),
}

impl StructuredValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, StructuredValue>> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_node_ref(&self) -> Option<NodeId> {
        match self {
            Self::NodeRef(id) => Some(*id),
            _ => None,
        }
    }

    /// Interpret the value as a list position: a finite, non-negative,
    /// integral number that fits in `usize`.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Self::Number(n) if n.is_finite() && *n >= 0.0 && n.fract() == 0.0 => {
                if *n <= u32::MAX as f64 {
                    Some(*n as usize)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Interpret the value as a node identity, either a `NodeRef` or an
    /// integral number (the form a client uses when it only knows the id).
    pub fn as_node_id(&self) -> Option<NodeId> {
        match self {
            Self::NodeRef(id) => Some(*id),
            Self::Number(_) => self
                .as_index()
                .and_then(|raw| u32::try_from(raw).ok())
                .map(NodeId::new),
            _ => None,
        }
    }

    /// Returns `true` if a `NodeRef` occurs anywhere inside the value.
    pub fn contains_node_ref(&self) -> bool {
        match self {
            Self::NodeRef(_) => true,
            Self::Array(items) => items.iter().any(Self::contains_node_ref),
            Self::Object(map) => map.values().any(Self::contains_node_ref),
            _ => false,
        }
    }

    /// All node references inside the value, depth-first, in document order.
    pub fn node_refs(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_node_refs(&mut out);
        out
    }

    fn collect_node_refs(&self, out: &mut Vec<NodeId>) {
        match self {
            Self::NodeRef(id) => out.push(*id),
            Self::Array(items) => {
                for item in items {
                    item.collect_node_refs(out);
                }
            }
            Self::Object(map) => {
                for v in map.values() {
                    v.collect_node_refs(out);
                }
            }
            _ => {}
        }
    }

    /// Rebuild the value, replacing every `NodeRef` with the result of `f`.
    ///
    /// Stops at the first error.
    pub fn try_map_node_refs<E, F>(&self, f: &mut F) -> Result<StructuredValue, E>
    where
        F: FnMut(NodeId) -> Result<StructuredValue, E>,
    {
        Ok(match self {
            Self::NodeRef(id) => f(*id)?,
            Self::Array(items) => Self::Array(
                items
                    .iter()
                    .map(|item| item.try_map_node_refs(f))
                    .collect::<Result<_, E>>()?,
            ),
            Self::Object(map) => {
                let mut next = BTreeMap::new();
                for (k, v) in map {
                    next.insert(k.clone(), v.try_map_node_refs(f)?);
                }
                Self::Object(next)
            }
            other => other.clone(),
        })
    }

    /// Short type label used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
            Self::NodeRef(_) => "node",
        }
    }
}

// ── From impls ──────────────────────────────────────────────────────────────

impl From<bool> for StructuredValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for StructuredValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for StructuredValue {
    fn from(n: i32) -> Self {
        Self::Number(n as f64)
    }
}

impl From<i64> for StructuredValue {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<u32> for StructuredValue {
    fn from(n: u32) -> Self {
        Self::Number(n as f64)
    }
}

impl From<usize> for StructuredValue {
    fn from(n: usize) -> Self {
        Self::Number(n as f64)
    }
}

impl From<&str> for StructuredValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for StructuredValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<NodeId> for StructuredValue {
    fn from(id: NodeId) -> Self {
        Self::NodeRef(id)
    }
}

impl<T: Into<StructuredValue>> From<Vec<T>> for StructuredValue {
    fn from(items: Vec<T>) -> Self {
        Self::Array(items.into_iter().map(Into::into).collect())
    }
}

impl From<BTreeMap<String, StructuredValue>> for StructuredValue {
    fn from(map: BTreeMap<String, StructuredValue>) -> Self {
        Self::Object(map)
    }
}

impl<T: Into<StructuredValue>> From<Option<T>> for StructuredValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn as_index_accepts_only_integral_non_negative() {
        assert_eq!(StructuredValue::from(3).as_index(), Some(3));
        assert_eq!(StructuredValue::from(0.0).as_index(), Some(0));
        assert_eq!(StructuredValue::from(1.5).as_index(), None);
        assert_eq!(StructuredValue::from(-1).as_index(), None);
        assert_eq!(StructuredValue::from(f64::NAN).as_index(), None);
        assert_eq!(StructuredValue::from("1").as_index(), None);
    }

    #[test]
    fn node_refs_are_found_in_nested_values() {
        let mut obj = BTreeMap::new();
        obj.insert("a".to_string(), StructuredValue::NodeRef(NodeId::new(4)));
        obj.insert(
            "b".to_string(),
            StructuredValue::Array(vec![1.into(), StructuredValue::NodeRef(NodeId::new(7))]),
        );
        let v = StructuredValue::Object(obj);
        assert!(v.contains_node_ref());
        assert_eq!(v.node_refs(), vec![NodeId::new(4), NodeId::new(7)]);
    }

    #[test]
    fn try_map_node_refs_replaces_references() {
        let v = StructuredValue::Array(vec![StructuredValue::NodeRef(NodeId::new(2)), "x".into()]);
        let mapped: Result<_, ()> =
            v.try_map_node_refs(&mut |id| Ok(StructuredValue::from(id.raw())));
        assert_eq!(
            mapped.unwrap(),
            StructuredValue::Array(vec![2.into(), "x".into()])
        );
    }

    #[test]
    fn as_node_id_accepts_numbers_and_refs() {
        assert_eq!(StructuredValue::from(5).as_node_id(), Some(NodeId::new(5)));
        assert_eq!(
            StructuredValue::NodeRef(NodeId::new(9)).as_node_id(),
            Some(NodeId::new(9))
        );
        assert_eq!(StructuredValue::from("5").as_node_id(), None);
    }
}
