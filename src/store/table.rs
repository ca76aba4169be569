//! Keyed entity tables.

use std::collections::btree_map::{self, BTreeMap};

use serde::{Deserialize, Serialize};

use crate::error::ToolError;

/// A mapping from entity id to entity record.
///
/// Tables are ordered so that snapshots serialize canonically. There is no
/// removal API: once an id is present it stays present for the lifetime of
/// the store, which keeps identifiers from ever being reused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Table<T> {
    rows: BTreeMap<String, T>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self { rows: BTreeMap::new() }
    }
}

impl<T> Table<T> {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the table has no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns true if `id` is present.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.rows.contains_key(id)
    }

    /// Looks up a record.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&T> {
        self.rows.get(id)
    }

    /// Looks up a record for mutation.
    pub fn get_mut(&mut self, id: &str) -> Option<&mut T> {
        self.rows.get_mut(id)
    }

    /// Looks up a record, failing with a not-found error naming `kind`.
    pub fn require(&self, kind: &'static str, id: &str) -> Result<&T, ToolError> {
        self.rows.get(id).ok_or_else(|| ToolError::not_found(kind, id))
    }

    /// Inserts a record under an id that is not yet present.
    ///
    /// Returns false, leaving the existing record untouched, if the id is
    /// already taken.
    pub fn insert_fresh(&mut self, id: impl Into<String>, record: T) -> bool {
        match self.rows.entry(id.into()) {
            btree_map::Entry::Vacant(slot) => {
                slot.insert(record);
                true
            }
            btree_map::Entry::Occupied(_) => false,
        }
    }

    /// Iterates records in id order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, T> {
        self.rows.iter()
    }

    /// Iterates records in id order.
    pub fn values(&self) -> btree_map::Values<'_, String, T> {
        self.rows.values()
    }

    /// Iterates ids in order.
    pub fn ids(&self) -> btree_map::Keys<'_, String, T> {
        self.rows.keys()
    }
}

impl<T> FromIterator<(String, T)> for Table<T> {
    fn from_iter<I: IntoIterator<Item = (String, T)>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}

impl<'a, T> IntoIterator for &'a Table<T> {
    type Item = (&'a String, &'a T);
    type IntoIter = btree_map::Iter<'a, String, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}
