//! Document store seam.
//!
//! Handlers talk to a [`DocumentStore`] and the per-request [`Session`] it
//! hands out. A session is released when dropped, so every exit path of a
//! handler gives its connection back.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::DatabaseConfig;

pub mod memory;
pub mod models;
pub mod postgres;

pub use memory::MemoryStore;
pub use models::entry::{StoredEntry, ENTRIES};
pub use postgres::PgDocumentStore;

/// A schema-less document: a JSON object
pub type Document = Map<String, Value>;

/// Errors from document store backends
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Duplicate value for unique field '{field}' in '{collection}'")]
    Duplicate { collection: String, field: String },

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Declares that `field` must hold distinct values within `collection`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueIndex {
    pub collection: String,
    pub field: String,
}

impl UniqueIndex {
    pub fn new(collection: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            field: field.into(),
        }
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Acquire a session scoped to one request
    async fn open_session(&self) -> Result<Box<dyn Session>, StoreError>;

    /// Release backend resources once the server has stopped
    async fn close(&self) {}
}

#[async_trait]
pub trait Session: Send {
    /// Return every document in `collection` whose fields equal all fields of `filter`
    async fn find(&mut self, collection: &str, filter: &Document) -> Result<Vec<Document>, StoreError>;

    /// Insert one document, failing with [`StoreError::Duplicate`] when a unique index rejects it
    async fn insert(&mut self, collection: &str, document: Document) -> Result<(), StoreError>;
}

/// Exact, case-sensitive match of every filter field
pub fn matches_filter(document: &Document, filter: &Document) -> bool {
    filter.iter().all(|(key, value)| document.get(key) == Some(value))
}

/// Pick the backend named by configuration
pub fn build_store(config: &DatabaseConfig, unique: Vec<UniqueIndex>) -> Result<Arc<dyn DocumentStore>, StoreError> {
    match &config.url {
        Some(url) => {
            let store = PgDocumentStore::connect_lazy(url, config, unique)?;
            info!("Using PostgreSQL document store");
            Ok(Arc::new(store))
        }
        None => {
            warn!("DATABASE_URL not set, entries are kept in memory only");
            Ok(Arc::new(MemoryStore::new(unique)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn filter_matching_is_exact() {
        let d = doc(json!({"dataString": "Hello", "date": ""}));
        assert!(matches_filter(&d, &doc(json!({"dataString": "Hello"}))));
        assert!(!matches_filter(&d, &doc(json!({"dataString": "hello"}))));
        assert!(!matches_filter(&d, &doc(json!({"dataString": "Hello "}))));
        assert!(!matches_filter(&d, &doc(json!({"missing": "Hello"}))));
        assert!(matches_filter(&d, &Document::new()));
    }

    #[tokio::test]
    async fn builds_memory_store_without_url() {
        let config = DatabaseConfig {
            url: None,
            max_connections: 1,
            connection_timeout: 1,
        };
        let store = build_store(&config, vec![]).unwrap();
        let mut session = store.open_session().await.unwrap();
        assert!(session.find(ENTRIES, &Document::new()).await.unwrap().is_empty());
    }
}
