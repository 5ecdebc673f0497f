//! Postgres storage backend.
//!
//! Every document lives in a single `documents` table as JSONB, keyed by
//! `(collection, id)`. Open transactions are parked in a map keyed by
//! [`TransactionId`] so that the operation context can carry a plain handle.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{
    postgres::{PgPool, PgPoolOptions},
    Executor, Postgres, Row, Transaction,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::Instrument;

use super::{ensure_id, Document, Filter, Storage, TransactionId, UniqueViolation, ID_FIELD};

pub const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");

const EMAIL_UNIQUE_INDEX: &str = "documents_email_key";

type Parked = Arc<Mutex<Transaction<'static, Postgres>>>;

#[derive(Clone)]
pub struct PgStorage {
    pool: PgPool,
    open: Arc<Mutex<HashMap<TransactionId, Parked>>>,
}

impl std::fmt::Debug for PgStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgStorage").finish_non_exhaustive()
    }
}

fn db_span(operation: &'static str, statement: &'static str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn document_from(value: Value) -> Result<Document> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(anyhow!("stored document is not an object: {other}")),
    }
}

impl PgStorage {
    /// Connect to `dsn` using a small pool.
    ///
    /// # Errors
    /// Returns an error if the pool cannot be created.
    pub async fn connect(dsn: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(5)
            .max_lifetime(Duration::from_secs(60 * 2))
            .test_before_acquire(true)
            .connect(dsn)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::from_pool(pool))
    }

    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            open: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Create the `documents` table if needed.
    ///
    /// # Errors
    /// Returns an error if the schema statements fail.
    pub async fn migrate(&self) -> Result<()> {
        self.pool
            .execute(SCHEMA_SQL)
            .instrument(db_span("CREATE", "schema.sql"))
            .await
            .context("failed to apply schema")?;
        Ok(())
    }

    async fn parked(&self, tx: &TransactionId) -> Result<Parked> {
        self.open
            .lock()
            .await
            .get(tx)
            .cloned()
            .ok_or_else(|| anyhow!("unknown transaction {tx}"))
    }

    async fn take(&self, tx: &TransactionId) -> Option<Transaction<'static, Postgres>> {
        let parked = self.open.lock().await.remove(tx)?;
        match Arc::try_unwrap(parked) {
            Ok(mutex) => Some(mutex.into_inner()),
            Err(_) => {
                tracing::warn!(%tx, "transaction still in use while finishing");
                None
            }
        }
    }
}

#[async_trait]
impl Storage for PgStorage {
    async fn begin_transaction(&self) -> Result<TransactionId> {
        let transaction = self
            .pool
            .begin()
            .await
            .context("failed to begin transaction")?;
        let tx = TransactionId::new();
        self.open
            .lock()
            .await
            .insert(tx, Arc::new(Mutex::new(transaction)));
        Ok(tx)
    }

    async fn commit_transaction(&self, tx: TransactionId) -> Result<()> {
        let transaction = self
            .take(&tx)
            .await
            .ok_or_else(|| anyhow!("unknown transaction {tx}"))?;
        transaction
            .commit()
            .instrument(db_span("COMMIT", "COMMIT"))
            .await
            .context("failed to commit transaction")
    }

    async fn rollback_transaction(&self, tx: TransactionId) -> Result<()> {
        let Some(transaction) = self.take(&tx).await else {
            return Ok(());
        };
        transaction
            .rollback()
            .instrument(db_span("ROLLBACK", "ROLLBACK"))
            .await
            .context("failed to roll back transaction")
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
        tx: Option<&TransactionId>,
    ) -> Result<Option<Document>> {
        // containment narrows through the GIN index, equality keeps exact semantics
        let query = r"
            SELECT data FROM documents
            WHERE collection = $1
              AND data @> jsonb_build_object($2::text, $3::jsonb)
              AND data -> $2 = $3::jsonb
            LIMIT 1
        ";
        let q = sqlx::query(query)
            .bind(collection)
            .bind(&filter.field)
            .bind(&filter.equals);

        let row = match tx {
            Some(tx) => {
                let parked = self.parked(tx).await?;
                let mut guard = parked.lock().await;
                q.fetch_optional(&mut **guard)
                    .instrument(db_span("SELECT", query))
                    .await
            }
            None => {
                q.fetch_optional(&self.pool)
                    .instrument(db_span("SELECT", query))
                    .await
            }
        }
        .context("failed to find document")?;

        row.map(|row| document_from(row.get("data"))).transpose()
    }

    async fn update_one(
        &self,
        collection: &str,
        id: &str,
        patch: &Document,
        tx: Option<&TransactionId>,
    ) -> Result<Option<Document>> {
        let query = r"
            UPDATE documents
            SET data = data || $3::jsonb, updated_at = NOW()
            WHERE collection = $1 AND id = $2
            RETURNING data
        ";
        let mut patch = patch.clone();
        patch.remove(ID_FIELD);
        let q = sqlx::query(query)
            .bind(collection)
            .bind(id)
            .bind(Value::Object(patch));

        let row = match tx {
            Some(tx) => {
                let parked = self.parked(tx).await?;
                let mut guard = parked.lock().await;
                q.fetch_optional(&mut **guard)
                    .instrument(db_span("UPDATE", query))
                    .await
            }
            None => {
                q.fetch_optional(&self.pool)
                    .instrument(db_span("UPDATE", query))
                    .await
            }
        }
        .context("failed to update document")?;

        row.map(|row| document_from(row.get("data"))).transpose()
    }

    async fn insert_one(
        &self,
        collection: &str,
        mut doc: Document,
        tx: Option<&TransactionId>,
    ) -> Result<Document> {
        let query = r"
            INSERT INTO documents (collection, id, data)
            VALUES ($1, $2, $3)
            RETURNING data
        ";
        let id = ensure_id(&mut doc);
        let q = sqlx::query(query)
            .bind(collection)
            .bind(id)
            .bind(Value::Object(doc));

        let row = match tx {
            Some(tx) => {
                let parked = self.parked(tx).await?;
                let mut guard = parked.lock().await;
                q.fetch_one(&mut **guard)
                    .instrument(db_span("INSERT", query))
                    .await
            }
            None => {
                q.fetch_one(&self.pool)
                    .instrument(db_span("INSERT", query))
                    .await
            }
        }
        .map_err(|err| {
            let taken = err
                .as_database_error()
                .filter(|db| db.is_unique_violation())
                .map(|db| match db.constraint() {
                    Some(EMAIL_UNIQUE_INDEX) => "email",
                    _ => ID_FIELD,
                });
            match taken {
                Some(field) => anyhow::Error::new(UniqueViolation {
                    collection: collection.to_string(),
                    field: field.to_string(),
                }),
                None => anyhow::Error::new(err).context("failed to insert document"),
            }
        })?;

        document_from(row.get("data"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // Runs only when FOLIO_TEST_DSN points at a scratch database.
    async fn storage() -> Result<Option<PgStorage>> {
        let Ok(dsn) = std::env::var("FOLIO_TEST_DSN") else {
            return Ok(None);
        };
        let storage = PgStorage::connect(&dsn).await?;
        storage.migrate().await?;
        Ok(Some(storage))
    }

    #[tokio::test]
    async fn rollback_discards_insert() -> Result<()> {
        let Some(storage) = storage().await? else {
            return Ok(());
        };
        let email = format!("{}@example.com", ulid::Ulid::new());
        let mut doc = Document::new();
        doc.insert("email".into(), json!(email));

        let tx = storage.begin_transaction().await?;
        storage.insert_one("users", doc, Some(&tx)).await?;
        let inside = storage
            .find_one("users", &Filter::equals("email", email.as_str()), Some(&tx))
            .await?;
        assert!(inside.is_some());
        storage.rollback_transaction(tx).await?;

        let outside = storage
            .find_one("users", &Filter::equals("email", email.as_str()), None)
            .await?;
        assert!(outside.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_email_is_a_unique_violation() -> Result<()> {
        let Some(storage) = storage().await? else {
            return Ok(());
        };
        let email = format!("{}@example.com", ulid::Ulid::new());
        let mut doc = Document::new();
        doc.insert("email".into(), json!(email));
        storage.insert_one("users", doc.clone(), None).await?;

        let result = storage.insert_one("users", doc, None).await;
        let violation = result
            .as_ref()
            .err()
            .and_then(|err| err.downcast_ref::<UniqueViolation>());
        assert_eq!(violation.map(|v| v.field.as_str()), Some("email"));
        Ok(())
    }

    #[tokio::test]
    async fn find_one_filters_by_any_field() -> Result<()> {
        let Some(storage) = storage().await? else {
            return Ok(());
        };
        let slug = format!("{}", ulid::Ulid::new());
        let mut doc = Document::new();
        doc.insert("slug".into(), json!(slug));
        storage.insert_one("pages", doc, None).await?;

        let found = storage
            .find_one("pages", &Filter::equals("slug", slug.as_str()), None)
            .await?;
        assert_eq!(found.and_then(|d| d.get("slug").cloned()), Some(json!(slug)));

        let elsewhere = storage
            .find_one("posts", &Filter::equals("slug", slug.as_str()), None)
            .await?;
        assert!(elsewhere.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn update_merges_patch() -> Result<()> {
        let Some(storage) = storage().await? else {
            return Ok(());
        };
        let mut doc = Document::new();
        doc.insert("login_attempts".into(), json!(2));
        doc.insert("lock_until".into(), json!("2030-01-01T00:00:00Z"));
        let inserted = storage.insert_one("users", doc, None).await?;
        let id = inserted
            .get(ID_FIELD)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let mut patch = Document::new();
        patch.insert("login_attempts".into(), json!(0));
        patch.insert("lock_until".into(), Value::Null);
        let updated = storage.update_one("users", &id, &patch, None).await?;
        let updated = updated.unwrap_or_default();
        assert_eq!(updated.get("login_attempts"), Some(&json!(0)));
        assert_eq!(updated.get("lock_until"), Some(&Value::Null));
        Ok(())
    }
}
