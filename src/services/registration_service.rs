use std::sync::Arc;

use tracing::{error, info, warn};

use crate::database::{DocumentStore, StoreError, StoredEntry, ENTRIES};
use crate::error::ApiError;

#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("Store unavailable while registering '{data_string}': {source}")]
    StoreUnavailable { data_string: String, source: StoreError },
    #[error("Entry already exists: {0}")]
    AlreadyExists(String),
    #[error("Insert failed for '{data_string}': {source}")]
    InsertFailed { data_string: String, source: StoreError },
}

impl From<RegistrationError> for ApiError {
    fn from(err: RegistrationError) -> Self {
        match err {
            RegistrationError::StoreUnavailable { data_string, .. } => ApiError::store_unavailable(data_string),
            RegistrationError::AlreadyExists(data_string) => ApiError::already_exists(data_string),
            RegistrationError::InsertFailed { data_string, .. } => ApiError::store_write(data_string),
        }
    }
}

/// Duplicate-checked registration of entries.
///
/// One read, then at most one write, in a single session. The read settles
/// the common case; the store's unique index on `dataString` settles races
/// between concurrent registrations of the same value.
#[derive(Clone)]
pub struct RegistrationService {
    store: Arc<dyn DocumentStore>,
}

impl RegistrationService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn register(&self, data_string: &str) -> Result<StoredEntry, RegistrationError> {
        let mut session = self
            .store
            .open_session()
            .await
            .map_err(|source| RegistrationError::StoreUnavailable {
                data_string: data_string.to_string(),
                source,
            })?;

        // (a) Existence check
        let filter = StoredEntry::filter_by_data_string(data_string);
        match session.find(ENTRIES, &filter).await {
            Ok(existing) if !existing.is_empty() => {
                info!("Entry '{}' already registered ({} matches)", data_string, existing.len());
                return Err(RegistrationError::AlreadyExists(data_string.to_string()));
            }
            Ok(_) => {}
            Err(e) => {
                // The unique index still guards the insert below
                warn!("Existence check failed for '{}': {}", data_string, e);
            }
        }

        // (b) Insert
        let entry = StoredEntry::new(data_string);
        match session.insert(ENTRIES, entry.to_document()).await {
            Ok(()) => {
                info!("Registered entry '{}'", data_string);
                Ok(entry)
            }
            Err(StoreError::Duplicate { .. }) => {
                info!("Entry '{}' registered concurrently, rejected by unique index", data_string);
                Err(RegistrationError::AlreadyExists(data_string.to_string()))
            }
            Err(source) => {
                error!("Failed to insert entry '{}': {}", data_string, source);
                Err(RegistrationError::InsertFailed {
                    data_string: data_string.to_string(),
                    source,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;

    fn service() -> (RegistrationService, MemoryStore) {
        let store = MemoryStore::new(StoredEntry::unique_indexes());
        (RegistrationService::new(Arc::new(store.clone())), store)
    }

    #[tokio::test]
    async fn registers_new_entry_once() {
        let (service, store) = service();
        let entry = service.register("hello").await.unwrap();
        assert_eq!(entry, StoredEntry::new("hello"));
        assert_eq!(store.count(ENTRIES, &StoredEntry::filter_by_data_string("hello")).await, 1);
        assert_eq!(store.open_sessions(), 0);
    }

    #[tokio::test]
    async fn second_registration_conflicts() {
        let (service, store) = service();
        service.register("hello").await.unwrap();
        let err = service.register("hello").await.unwrap_err();
        assert!(matches!(err, RegistrationError::AlreadyExists(ref s) if s == "hello"));
        assert_eq!(store.count(ENTRIES, &StoredEntry::filter_by_data_string("hello")).await, 1);
        assert_eq!(store.open_sessions(), 0);
    }

    #[tokio::test]
    async fn lookup_is_case_sensitive() {
        let (service, _store) = service();
        service.register("Hello").await.unwrap();
        assert!(service.register("hello").await.is_ok());
    }

    #[tokio::test]
    async fn unavailable_store_is_reported() {
        let (service, store) = service();
        store.set_unavailable(true);
        let err = service.register("hello").await.unwrap_err();
        assert!(matches!(err, RegistrationError::StoreUnavailable { .. }));
        assert_eq!(ApiError::from(err).status_code(), axum::http::StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn insert_failure_releases_session() {
        let (service, store) = service();
        store.set_fail_inserts(true);
        let err = service.register("hello").await.unwrap_err();
        assert!(matches!(err, RegistrationError::InsertFailed { .. }));
        assert_eq!(store.open_sessions(), 0);
        assert_eq!(
            ApiError::from(err).status_code(),
            axum::http::StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn concurrent_registrations_insert_once() {
        let (service, store) = service();
        let (a, b) = tokio::join!(service.register("race"), service.register("race"));
        assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
        assert_eq!(store.count(ENTRIES, &StoredEntry::filter_by_data_string("race")).await, 1);
    }
}
