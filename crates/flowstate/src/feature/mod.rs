//! Node features: the typed sub-stores a state node carries.
//!
//! | Kind          | Wire id | Store            | Change tracking                 |
//! |---------------|---------|------------------|---------------------------------|
//! | `PropertyMap` | 1       | [`PropertyMap`]  | modified keys vs. synced values |
//! | `ChildList`   | 2       | [`NodeList`]     | ordered structural op log       |
//! | `ModelList`   | 3       | [`NodeList`]     | ordered structural op log       |
//!
//! The set of kinds is closed; which kinds a node may carry is fixed by its
//! [`FeatureSet`] when the node is created.

mod node_list;
mod property_map;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::NodeId;

pub use node_list::{ListOp, NodeList};
pub use property_map::{ClientUpdateMode, PropertyChange, PropertyFilter, PropertyMap};

// ── FeatureKind ─────────────────────────────────────────────────────────────

/// Feature kinds, identified on the wire by their integer id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum FeatureKind {
    PropertyMap = 1,
    ChildList = 2,
    ModelList = 3,
}

impl FeatureKind {
    pub const ALL: [FeatureKind; 3] = [Self::PropertyMap, Self::ChildList, Self::ModelList];

    pub const fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Self::PropertyMap),
            2 => Some(Self::ChildList),
            3 => Some(Self::ModelList),
            _ => None,
        }
    }

    pub fn is_list(self) -> bool {
        matches!(self, Self::ChildList | Self::ModelList)
    }

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PropertyMap => "property map",
            Self::ChildList => "child list",
            Self::ModelList => "model list",
        };
        f.write_str(name)
    }
}

impl From<FeatureKind> for u8 {
    fn from(kind: FeatureKind) -> Self {
        kind.id()
    }
}

impl TryFrom<u8> for FeatureKind {
    type Error = String;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        Self::from_id(id).ok_or_else(|| format!("unknown feature id {id}"))
    }
}

// ── FeatureSet ──────────────────────────────────────────────────────────────

/// The capabilities a node declares at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FeatureSet(u8);

impl FeatureSet {
    pub const EMPTY: FeatureSet = FeatureSet(0);
    /// A DOM-like element: properties plus ordered children.
    pub const ELEMENT: FeatureSet =
        FeatureSet(FeatureKind::PropertyMap.bit() | FeatureKind::ChildList.bit());
    /// A synthesized model object.
    pub const MODEL_MAP: FeatureSet = FeatureSet(FeatureKind::PropertyMap.bit());
    /// A synthesized list of model items.
    pub const MODEL_LIST: FeatureSet = FeatureSet(FeatureKind::ModelList.bit());

    pub fn of(kinds: &[FeatureKind]) -> Self {
        Self(kinds.iter().fold(0, |acc, k| acc | k.bit()))
    }

    pub fn contains(self, kind: FeatureKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn with(self, kind: FeatureKind) -> Self {
        Self(self.0 | kind.bit())
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Kinds in the set, ordered by wire id.
    pub fn kinds(self) -> Vec<FeatureKind> {
        FeatureKind::ALL
            .into_iter()
            .filter(|k| self.contains(*k))
            .collect()
    }
}

impl FromIterator<FeatureKind> for FeatureSet {
    fn from_iter<I: IntoIterator<Item = FeatureKind>>(iter: I) -> Self {
        iter.into_iter().fold(Self::EMPTY, Self::with)
    }
}

// ── Feature ─────────────────────────────────────────────────────────────────

/// A materialized feature store.
#[derive(Debug, Clone)]
pub enum Feature {
    PropertyMap(PropertyMap),
    ChildList(NodeList),
    ModelList(NodeList),
}

impl Feature {
    pub fn new(kind: FeatureKind) -> Self {
        match kind {
            FeatureKind::PropertyMap => Self::PropertyMap(PropertyMap::default()),
            FeatureKind::ChildList => Self::ChildList(NodeList::default()),
            FeatureKind::ModelList => Self::ModelList(NodeList::default()),
        }
    }

    pub fn kind(&self) -> FeatureKind {
        match self {
            Self::PropertyMap(_) => FeatureKind::PropertyMap,
            Self::ChildList(_) => FeatureKind::ChildList,
            Self::ModelList(_) => FeatureKind::ModelList,
        }
    }

    pub fn as_property_map(&self) -> Option<&PropertyMap> {
        match self {
            Self::PropertyMap(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&NodeList> {
        match self {
            Self::ChildList(list) | Self::ModelList(list) => Some(list),
            Self::PropertyMap(_) => None,
        }
    }

    pub(crate) fn as_property_map_mut(&mut self) -> Option<&mut PropertyMap> {
        match self {
            Self::PropertyMap(map) => Some(map),
            _ => None,
        }
    }

    pub(crate) fn as_list_mut(&mut self) -> Option<&mut NodeList> {
        match self {
            Self::ChildList(list) | Self::ModelList(list) => Some(list),
            Self::PropertyMap(_) => None,
        }
    }

    pub fn has_pending_changes(&self) -> bool {
        match self {
            Self::PropertyMap(map) => map.has_pending_changes(),
            Self::ChildList(list) | Self::ModelList(list) => list.has_pending_changes(),
        }
    }

    /// Nodes this feature keeps alive, in feature order.
    pub fn referenced_nodes(&self) -> Vec<NodeId> {
        match self {
            Self::PropertyMap(map) => map.referenced_nodes(),
            Self::ChildList(list) | Self::ModelList(list) => list.items().to_vec(),
        }
    }

    pub(crate) fn commit(&mut self) {
        match self {
            Self::PropertyMap(map) => map.commit(),
            Self::ChildList(list) | Self::ModelList(list) => list.commit(),
        }
    }

    pub(crate) fn reset_for_resync(&mut self) {
        match self {
            Self::PropertyMap(map) => map.reset_for_resync(),
            Self::ChildList(list) | Self::ModelList(list) => list.reset_for_resync(),
        }
    }
}
