//! In-memory persistence engine for the test environment.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use keel_core::{
    application::{
        ApplicationError, EngineKind,
        ports::{Change, ChangeSet, DocumentKey, PersistenceEngine},
    },
    error::KeelResult,
};
use serde_json::Value;

/// Process-local document store.
///
/// Clones share the same storage; every call to [`MemoryEngine::new`]
/// starts from an empty one, which is what keeps test containers apart.
#[derive(Debug, Clone)]
pub struct MemoryEngine {
    inner: Arc<RwLock<HashMap<DocumentKey, Value>>>,
}

impl MemoryEngine {
    /// Create a new empty engine.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of committed documents.
    pub fn len(&self) -> usize {
        self.inner.read().map(|docs| docs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PersistenceEngine for MemoryEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Memory
    }

    fn location(&self) -> String {
        "in-process".into()
    }

    fn load(&self, key: &DocumentKey) -> KeelResult<Option<Value>> {
        let docs = self
            .inner
            .read()
            .map_err(|_| ApplicationError::StoreLockError)?;
        Ok(docs.get(key).cloned())
    }

    fn apply(&self, changes: &ChangeSet) -> KeelResult<()> {
        let mut docs = self
            .inner
            .write()
            .map_err(|_| ApplicationError::StoreLockError)?;

        for change in changes.iter() {
            match change {
                Change::Put { collection, id, doc } => {
                    docs.insert(DocumentKey::new(collection, id), doc.clone());
                }
                Change::Delete { collection, id } => {
                    docs.remove(&DocumentKey::new(collection, id));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn applied_changes_become_visible() {
        let engine = MemoryEngine::new();
        let key = DocumentKey::new("users", "1");

        let mut changes = ChangeSet::new();
        changes.put(key.clone(), json!({"name": "ada"}));
        engine.apply(&changes).unwrap();

        assert_eq!(engine.load(&key).unwrap(), Some(json!({"name": "ada"})));
        assert_eq!(engine.len(), 1);

        let mut changes = ChangeSet::new();
        changes.delete(key.clone());
        engine.apply(&changes).unwrap();

        assert!(engine.load(&key).unwrap().is_none());
        assert!(engine.is_empty());
    }

    #[test]
    fn separate_engines_do_not_share_state() {
        let a = MemoryEngine::new();
        let b = MemoryEngine::new();

        let mut changes = ChangeSet::new();
        changes.put(DocumentKey::new("users", "1"), json!(1));
        a.apply(&changes).unwrap();

        assert_eq!(a.len(), 1);
        assert!(b.is_empty());
    }

    #[test]
    fn clones_share_state() {
        let a = MemoryEngine::new();
        let b = a.clone();

        let mut changes = ChangeSet::new();
        changes.put(DocumentKey::new("users", "1"), json!(1));
        a.apply(&changes).unwrap();

        assert_eq!(b.len(), 1);
    }
}
