//! Persistence port used by every operation.
//!
//! Documents are JSON objects keyed by collection slug and id. Implementations
//! must honour the transaction handle passed to each call: writes made under a
//! handle become visible to other readers only after `commit`.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStorage;
pub use postgres::PgStorage;

pub type Document = Map<String, Value>;

/// Field holding the primary key of every stored document.
pub const ID_FIELD: &str = "id";

/// Top-level fields that must be unique within a collection when present.
/// Matches the unique index in `sql/schema.sql`.
pub const UNIQUE_FIELDS: &[&str] = &["email"];

/// `insert_one` collided with an existing document on its id or on one of
/// [`UNIQUE_FIELDS`].
#[derive(Debug, thiserror::Error)]
#[error("{collection} already has a document with this {field}")]
pub struct UniqueViolation {
    pub collection: String,
    pub field: String,
}

/// Handle for an open storage transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TransactionId(Uuid);

impl TransactionId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Equality filter over a single top-level field.
#[derive(Clone, Debug, PartialEq)]
pub struct Filter {
    pub field: String,
    pub equals: Value,
}

impl Filter {
    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            equals: value.into(),
        }
    }

    pub fn id(id: impl Into<String>) -> Self {
        Self::equals(ID_FIELD, Value::String(id.into()))
    }

    #[must_use]
    pub fn matches(&self, doc: &Document) -> bool {
        doc.get(&self.field) == Some(&self.equals)
    }
}

#[async_trait]
pub trait Storage: Send + Sync {
    async fn begin_transaction(&self) -> Result<TransactionId>;

    async fn commit_transaction(&self, tx: TransactionId) -> Result<()>;

    /// Roll back `tx`. Rolling back an unknown or finished handle is a no-op.
    async fn rollback_transaction(&self, tx: TransactionId) -> Result<()>;

    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
        tx: Option<&TransactionId>,
    ) -> Result<Option<Document>>;

    /// Shallow-merge `patch` into the stored document. A `null` value stores
    /// `null`. Returns the merged document, or `None` if nothing matched.
    async fn update_one(
        &self,
        collection: &str,
        id: &str,
        patch: &Document,
        tx: Option<&TransactionId>,
    ) -> Result<Option<Document>>;

    /// Insert `doc`, assigning an id when it carries none.
    ///
    /// Fails with [`UniqueViolation`] when the id or a unique field is taken.
    async fn insert_one(
        &self,
        collection: &str,
        doc: Document,
        tx: Option<&TransactionId>,
    ) -> Result<Document>;
}

/// Shallow merge used by every backend so update semantics stay identical.
pub(crate) fn merge(target: &mut Document, patch: &Document) {
    for (key, value) in patch {
        if key == ID_FIELD {
            continue;
        }
        target.insert(key.clone(), value.clone());
    }
}

/// Return the id of `doc`, generating one when it is missing.
pub(crate) fn ensure_id(doc: &mut Document) -> String {
    match doc.get(ID_FIELD).and_then(Value::as_str) {
        Some(id) => id.to_string(),
        None => {
            let id = Uuid::new_v4().to_string();
            doc.insert(ID_FIELD.to_string(), Value::String(id.clone()));
            id
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => Document::new(),
        }
    }

    #[test]
    fn filter_matches_exact_values() {
        let d = doc(json!({"id": "1", "email": "a@b.co"}));
        assert!(Filter::equals("email", "a@b.co").matches(&d));
        assert!(!Filter::equals("email", "A@b.co").matches(&d));
        assert!(Filter::id("1").matches(&d));
        assert!(!Filter::equals("missing", Value::Null).matches(&d));
    }

    #[test]
    fn merge_keeps_id_and_stores_nulls() {
        let mut d = doc(json!({"id": "1", "lock_until": "x", "login_attempts": 3}));
        merge(
            &mut d,
            &doc(json!({"id": "2", "lock_until": null, "login_attempts": 0})),
        );
        assert_eq!(d, doc(json!({"id": "1", "lock_until": null, "login_attempts": 0})));
    }

    #[test]
    fn ensure_id_generates_once() {
        let mut d = Document::new();
        let id = ensure_id(&mut d);
        assert_eq!(ensure_id(&mut d), id);
    }
}
