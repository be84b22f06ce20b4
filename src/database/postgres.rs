//! PostgreSQL-backed document store.
//!
//! All collections share one `documents` table holding JSONB payloads.
//! Unique indexes are expression indexes on `document ->> field`, scoped to
//! their collection with a partial-index predicate.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{pool::PoolConnection, postgres::PgPoolOptions, PgConnection, PgPool, Postgres};
use tokio::sync::OnceCell;
use tracing::{info, warn};

use super::{Document, DocumentStore, Session, StoreError, UniqueIndex};
use crate::config::DatabaseConfig;

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS documents (
        id          BIGSERIAL PRIMARY KEY,
        collection  TEXT NOT NULL,
        document    JSONB NOT NULL,
        created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
    )
"#;

const CREATE_COLLECTION_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS documents_collection_idx ON documents (collection)";

pub struct PgDocumentStore {
    pool: PgPool,
    unique: Vec<UniqueIndex>,
    schema_ready: OnceCell<()>,
}

impl PgDocumentStore {
    /// Build a pool that connects on first use, so an unreachable database
    /// surfaces per request instead of at startup.
    pub fn connect_lazy(url: &str, config: &DatabaseConfig, unique: Vec<UniqueIndex>) -> Result<Self, StoreError> {
        for index in &unique {
            if !Self::is_valid_identifier(&index.collection) || !Self::is_valid_identifier(&index.field) {
                return Err(StoreError::InvalidIdentifier(format!("{}.{}", index.collection, index.field)));
            }
        }

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout))
            .connect_lazy(url)?;

        Ok(Self {
            pool,
            unique,
            schema_ready: OnceCell::new(),
        })
    }

    async fn ensure_schema(&self, conn: &mut PgConnection) -> Result<(), StoreError> {
        self.schema_ready
            .get_or_try_init(move || async move {
                sqlx::query(CREATE_TABLE).execute(&mut *conn).await?;
                sqlx::query(CREATE_COLLECTION_INDEX).execute(&mut *conn).await?;
                for index in &self.unique {
                    sqlx::query(&Self::unique_index_sql(index)).execute(&mut *conn).await?;
                }
                info!("Document store schema ready ({} unique indexes)", self.unique.len());
                Ok::<(), StoreError>(())
            })
            .await?;
        Ok(())
    }

    fn unique_index_sql(index: &UniqueIndex) -> String {
        let name = format!("documents_{}_{}_key", index.collection, index.field);
        format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {} ON documents ((document ->> '{}')) WHERE collection = '{}'",
            Self::quote_identifier(&name),
            index.field,
            index.collection
        )
    }

    /// Quote SQL identifier to prevent injection
    fn quote_identifier(name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Collections and indexed fields end up inside DDL, so only plain names
    /// are accepted: [a-zA-Z][a-zA-Z0-9_]*
    fn is_valid_identifier(name: &str) -> bool {
        let mut chars = name.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() => chars.all(|c| c.is_ascii_alphanumeric() || c == '_'),
            _ => false,
        }
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn open_session(&self) -> Result<Box<dyn Session>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            warn!("Failed to acquire database connection: {}", e);
            StoreError::Unavailable(e.to_string())
        })?;

        self.ensure_schema(&mut conn).await.map_err(|e| {
            warn!("Failed to prepare document schema: {}", e);
            StoreError::Unavailable(e.to_string())
        })?;

        Ok(Box::new(PgSession { conn }))
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("Closed document store pool");
    }
}

/// A pooled connection; returned to the pool on drop
struct PgSession {
    conn: PoolConnection<Postgres>,
}

#[async_trait]
impl Session for PgSession {
    async fn find(&mut self, collection: &str, filter: &Document) -> Result<Vec<Document>, StoreError> {
        let rows: Vec<Value> = sqlx::query_scalar(
            "SELECT document FROM documents WHERE collection = $1 AND document @> $2 ORDER BY id",
        )
        .bind(collection)
        .bind(Value::Object(filter.clone()))
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|v| match v {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect())
    }

    async fn insert(&mut self, collection: &str, document: Document) -> Result<(), StoreError> {
        let result = sqlx::query("INSERT INTO documents (collection, document) VALUES ($1, $2)")
            .bind(collection)
            .bind(Value::Object(document))
            .execute(&mut *self.conn)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Err(StoreError::Duplicate {
                collection: collection.to_string(),
                field: db_err.constraint().unwrap_or("unknown").to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}
