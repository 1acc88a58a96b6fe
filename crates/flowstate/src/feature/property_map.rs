use std::collections::{BTreeMap, BTreeSet};

use flowstate_value::{deep_equal, NodeId, StructuredValue};

/// Whether the remote client may write a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientUpdateMode {
    #[default]
    Allow,
    Deny,
}

/// A pending property change, as reported by [`PropertyMap::pending_changes`].
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyChange {
    Set(String, StructuredValue),
    Remove(String),
}

/// Keyed property store of a node.
///
/// Besides the current values the map remembers the values the remote side
/// was last told about (`synced`). A key touched since the last collection is
/// in `modified`; it is reported only if its current value differs from the
/// synced one, so a write that ends where it started produces no record.
#[derive(Debug, Clone, Default)]
pub struct PropertyMap {
    values: BTreeMap<String, StructuredValue>,
    synced: BTreeMap<String, StructuredValue>,
    modified: BTreeSet<String>,
    update_modes: BTreeMap<String, ClientUpdateMode>,
}

impl PropertyMap {
    pub fn get(&self, key: &str) -> Option<&StructuredValue> {
        self.values.get(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StructuredValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns `true` if storing `value` under `key` would change the map.
    pub fn differs(&self, key: &str, value: &StructuredValue) -> bool {
        match self.values.get(key) {
            Some(current) => !deep_equal(current, value),
            None => true,
        }
    }

    pub fn update_mode(&self, key: &str) -> ClientUpdateMode {
        self.update_modes.get(key).copied().unwrap_or_default()
    }

    pub(crate) fn set_update_mode(&mut self, key: String, mode: ClientUpdateMode) {
        match mode {
            ClientUpdateMode::Allow => {
                self.update_modes.remove(&key);
            }
            ClientUpdateMode::Deny => {
                self.update_modes.insert(key, mode);
            }
        }
    }

    /// Store `value` and record the key as modified. Returns the old value.
    pub(crate) fn put(&mut self, key: String, value: StructuredValue) -> Option<StructuredValue> {
        self.modified.insert(key.clone());
        self.values.insert(key, value)
    }

    /// Remove `key`, recording it as modified if it was present.
    pub(crate) fn take(&mut self, key: &str) -> Option<StructuredValue> {
        let old = self.values.remove(key)?;
        self.modified.insert(key.to_owned());
        Some(old)
    }

    /// Mark the current value of `key` as already known to the remote side.
    pub(crate) fn acknowledge(&mut self, key: &str) {
        match self.values.get(key) {
            Some(v) => {
                self.synced.insert(key.to_owned(), v.clone());
            }
            None => {
                self.synced.remove(key);
            }
        }
    }

    pub fn has_pending_changes(&self) -> bool {
        self.modified.iter().any(|key| self.is_unsynced(key))
    }

    fn is_unsynced(&self, key: &str) -> bool {
        match (self.values.get(key), self.synced.get(key)) {
            (Some(current), Some(synced)) => !deep_equal(current, synced),
            (None, None) => false,
            _ => true,
        }
    }

    /// Changes to report, in ascending key order.
    pub fn pending_changes(&self) -> Vec<PropertyChange> {
        self.modified
            .iter()
            .filter(|key| self.is_unsynced(key))
            .map(|key| match self.values.get(key) {
                Some(v) => PropertyChange::Set(key.clone(), v.clone()),
                None => PropertyChange::Remove(key.clone()),
            })
            .collect()
    }

    pub(crate) fn commit(&mut self) {
        for key in std::mem::take(&mut self.modified) {
            match self.values.get(&key) {
                Some(v) => {
                    self.synced.insert(key, v.clone());
                }
                None => {
                    self.synced.remove(&key);
                }
            }
        }
    }

    pub(crate) fn reset_for_resync(&mut self) {
        self.synced.clear();
        self.modified = self.values.keys().cloned().collect();
    }

    /// Node references held by the values, in key order.
    pub fn referenced_nodes(&self) -> Vec<NodeId> {
        self.values.values().flat_map(StructuredValue::node_refs).collect()
    }
}

/// Key filter for [`import`](crate::PropertyMapHandle::import).
///
/// With an include list only the listed keys pass; the exclude list always
/// wins over the include list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyFilter {
    include: Option<BTreeSet<String>>,
    exclude: BTreeSet<String>,
}

impl PropertyFilter {
    /// A filter that accepts every key.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn including<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include
            .get_or_insert_with(BTreeSet::new)
            .extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn excluding<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn accepts(&self, key: &str) -> bool {
        if self.exclude.contains(key) {
            return false;
        }
        match &self.include {
            Some(include) => include.contains(key),
            None => true,
        }
    }
}
