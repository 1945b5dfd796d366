//! Immutable, revisioned view of the item collection.
//!
//! A snapshot is built once from a full gateway emission and never changed
//! afterwards. The sync engine swaps whole `Arc<Snapshot>` values, so a
//! reader holding revision N keeps seeing revision N.

use std::collections::HashMap;

use tracing::warn;

use crate::gateway::Document;
use crate::types::{Item, ItemId};

/// Revision counter type
pub type Revision = u64;

/// Items in arrival order plus the revision that produced them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    revision: Revision,
    items: Vec<Item>,
    index: HashMap<ItemId, usize>,
}

impl Snapshot {
    /// The empty snapshot at revision 0
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a snapshot from items already in arrival order.
    ///
    /// A repeated id replaces the earlier entry in place, keeping the
    /// position of its first arrival. Items without an id are skipped.
    pub fn from_items(revision: Revision, items: impl IntoIterator<Item = Item>) -> Self {
        let mut snapshot = Self {
            revision,
            ..Self::default()
        };
        for item in items {
            if item.id.is_empty() {
                warn!(revision, name = %item.name, "Skipping record without id");
                continue;
            }
            match snapshot.index.get(&item.id) {
                Some(&pos) => snapshot.items[pos] = item,
                None => {
                    snapshot.index.insert(item.id.clone(), snapshot.items.len());
                    snapshot.items.push(item);
                }
            }
        }
        snapshot
    }

    /// Build a snapshot from a gateway emission.
    pub fn from_documents(revision: Revision, docs: &[Document]) -> Self {
        Self::from_items(revision, docs.iter().map(Item::from_document))
    }

    pub fn revision(&self) -> Revision {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Look up an item by id
    pub fn get(&self, id: &ItemId) -> Option<&Item> {
        self.index.get(id).map(|&pos| &self.items[pos])
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.index.contains_key(id)
    }

    /// Items in arrival order
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Item> {
        self.items.iter()
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = &'a Item;
    type IntoIter = std::slice::Iter<'a, Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
