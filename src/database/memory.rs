//! In-memory document store.
//!
//! Used when no database is configured and throughout the tests. Inserts are
//! serialized under one lock, so unique indexes hold under concurrency.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{matches_filter, Document, DocumentStore, Session, StoreError, UniqueIndex};

#[derive(Default)]
struct Inner {
    collections: Mutex<HashMap<String, Vec<Document>>>,
    unique: Vec<UniqueIndex>,
    open_sessions: AtomicUsize,
    unavailable: AtomicBool,
    fail_inserts: AtomicBool,
}

/// Cheap to clone; clones share the same data
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new(unique: Vec<UniqueIndex>) -> Self {
        Self {
            inner: Arc::new(Inner {
                unique,
                ..Inner::default()
            }),
        }
    }

    /// Make `open_session` fail, as if the backend were down
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make every insert fail with a write error
    pub fn set_fail_inserts(&self, fail: bool) {
        self.inner.fail_inserts.store(fail, Ordering::SeqCst);
    }

    /// Sessions handed out and not yet dropped
    pub fn open_sessions(&self) -> usize {
        self.inner.open_sessions.load(Ordering::SeqCst)
    }

    /// Count matching documents without opening a session
    pub async fn count(&self, collection: &str, filter: &Document) -> usize {
        let collections = self.inner.collections.lock().await;
        collections
            .get(collection)
            .map(|docs| docs.iter().filter(|d| matches_filter(d, filter)).count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn open_session(&self) -> Result<Box<dyn Session>, StoreError> {
        if self.inner.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store marked unavailable".to_string()));
        }
        self.inner.open_sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySession {
            inner: Arc::clone(&self.inner),
        }))
    }
}

struct MemorySession {
    inner: Arc<Inner>,
}

#[async_trait]
impl Session for MemorySession {
    async fn find(&mut self, collection: &str, filter: &Document) -> Result<Vec<Document>, StoreError> {
        let collections = self.inner.collections.lock().await;
        Ok(collections
            .get(collection)
            .map(|docs| docs.iter().filter(|d| matches_filter(d, filter)).cloned().collect())
            .unwrap_or_default())
    }

    async fn insert(&mut self, collection: &str, document: Document) -> Result<(), StoreError> {
        if self.inner.fail_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::QueryError("memory store rejecting writes".to_string()));
        }

        let mut collections = self.inner.collections.lock().await;
        let docs = collections.entry(collection.to_string()).or_default();

        for index in self.inner.unique.iter().filter(|i| i.collection == collection) {
            let Some(value) = document.get(&index.field) else { continue };
            if docs.iter().any(|d| d.get(&index.field) == Some(value)) {
                return Err(StoreError::Duplicate {
                    collection: index.collection.clone(),
                    field: index.field.clone(),
                });
            }
        }

        docs.push(document);
        Ok(())
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.inner.open_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{StoredEntry, ENTRIES};

    fn store() -> MemoryStore {
        MemoryStore::new(StoredEntry::unique_indexes())
    }

    #[tokio::test]
    async fn insert_then_find() {
        let store = store();
        let mut session = store.open_session().await.unwrap();
        session.insert(ENTRIES, StoredEntry::new("abc").to_document()).await.unwrap();

        let found = session.find(ENTRIES, &StoredEntry::filter_by_data_string("abc")).await.unwrap();
        assert_eq!(found.len(), 1);
        assert!(session.find(ENTRIES, &StoredEntry::filter_by_data_string("ABC")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unique_index_rejects_duplicates() {
        let store = store();
        let mut session = store.open_session().await.unwrap();
        session.insert(ENTRIES, StoredEntry::new("abc").to_document()).await.unwrap();

        let err = session.insert(ENTRIES, StoredEntry::new("abc").to_document()).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { .. }));
        assert_eq!(store.count(ENTRIES, &StoredEntry::filter_by_data_string("abc")).await, 1);
    }

    #[tokio::test]
    async fn unique_index_is_per_collection() {
        let store = store();
        let mut session = store.open_session().await.unwrap();
        session.insert("other", StoredEntry::new("abc").to_document()).await.unwrap();
        session.insert("other", StoredEntry::new("abc").to_document()).await.unwrap();
        assert_eq!(store.count("other", &Document::new()).await, 2);
    }

    #[tokio::test]
    async fn sessions_are_released_on_drop() {
        let store = store();
        {
            let _a = store.open_session().await.unwrap();
            let _b = store.open_session().await.unwrap();
            assert_eq!(store.open_sessions(), 2);
        }
        assert_eq!(store.open_sessions(), 0);
    }

    #[tokio::test]
    async fn unavailable_store_refuses_sessions() {
        let store = store();
        store.set_unavailable(true);
        assert!(matches!(store.open_session().await, Err(StoreError::Unavailable(_))));
        assert_eq!(store.open_sessions(), 0);
    }
}
