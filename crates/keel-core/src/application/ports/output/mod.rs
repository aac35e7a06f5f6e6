//! Driven (output) ports - implemented by infrastructure.
//!
//! These traits define what the application needs from external systems.
//! The `keel-adapters` crate provides implementations.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::application::environment::EngineKind;
use crate::error::KeelResult;

/// Address of one stored document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocumentKey {
    pub collection: String,
    pub id: String,
}

impl DocumentKey {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// One staged operation, as seen by an engine applying a [`ChangeSet`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Change<'a> {
    Put {
        collection: &'a str,
        id: &'a str,
        doc: &'a Value,
    },
    Delete {
        collection: &'a str,
        id: &'a str,
    },
}

/// Staged writes of a unit of work.
///
/// Last write per key wins; iteration order is by key so every engine
/// applies the same set in the same order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    entries: BTreeMap<DocumentKey, Option<Value>>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage an insert-or-replace.
    pub fn put(&mut self, key: DocumentKey, doc: Value) {
        self.entries.insert(key, Some(doc));
    }

    /// Stage a removal.
    pub fn delete(&mut self, key: DocumentKey) {
        self.entries.insert(key, None);
    }

    /// What this change set says about `key`.
    ///
    /// `None`: untouched. `Some(None)`: deleted. `Some(Some(doc))`: written.
    pub fn staged(&self, key: &DocumentKey) -> Option<Option<&Value>> {
        self.entries.get(key).map(Option::as_ref)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = Change<'_>> {
        self.entries.iter().map(|(key, doc)| match doc {
            Some(doc) => Change::Put {
                collection: &key.collection,
                id: &key.id,
                doc,
            },
            None => Change::Delete {
                collection: &key.collection,
                id: &key.id,
            },
        })
    }
}

impl Serialize for ChangeSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

/// Port for the persistence backend.
///
/// Implemented by:
/// - `keel_adapters::database::MemoryEngine` (test)
/// - `keel_adapters::database::FileEngine` (dev)
/// - `keel_adapters::database::RemoteEngine` (staging, prod)
///
/// ## Design Notes
///
/// - Engines only see committed state; staging lives in the unit of work
/// - `apply` is all-or-nothing
/// - One engine handle is shared by every unit of work of a container
pub trait PersistenceEngine: Send + Sync + fmt::Debug {
    /// Which implementation this is.
    fn kind(&self) -> EngineKind;

    /// Human-readable location (path, URL host) for logs.
    fn location(&self) -> String {
        self.kind().to_string()
    }

    /// Read the committed document at `key`.
    fn load(&self, key: &DocumentKey) -> KeelResult<Option<Value>>;

    /// Atomically apply every change in `changes`.
    fn apply(&self, changes: &ChangeSet) -> KeelResult<()>;

    /// Verify the backend is reachable.
    fn ping(&self) -> KeelResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn last_write_per_key_wins() {
        let key = DocumentKey::new("users", "1");
        let mut changes = ChangeSet::new();
        changes.put(key.clone(), json!({"name": "a"}));
        changes.delete(key.clone());
        changes.put(key.clone(), json!({"name": "b"}));

        assert_eq!(changes.len(), 1);
        assert_eq!(changes.staged(&key), Some(Some(&json!({"name": "b"}))));
    }

    #[test]
    fn staged_distinguishes_deleted_from_untouched() {
        let mut changes = ChangeSet::new();
        changes.delete(DocumentKey::new("users", "gone"));

        assert_eq!(changes.staged(&DocumentKey::new("users", "gone")), Some(None));
        assert_eq!(changes.staged(&DocumentKey::new("users", "other")), None);
    }

    #[test]
    fn serializes_as_ordered_operations() {
        let mut changes = ChangeSet::new();
        changes.put(DocumentKey::new("b", "1"), json!(1));
        changes.delete(DocumentKey::new("a", "9"));

        let value = serde_json::to_value(&changes).unwrap();
        assert_eq!(
            value,
            json!([
                {"op": "delete", "collection": "a", "id": "9"},
                {"op": "put", "collection": "b", "id": "1", "doc": 1}
            ])
        );
    }
}
