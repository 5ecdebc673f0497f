//! In-process storage backend.
//!
//! Each open transaction keeps an overlay of the documents it wrote. Reads under
//! a handle see the overlay first, then committed state; `commit` moves the
//! overlay into committed state and `rollback` discards it.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{
    ensure_id, merge, Document, Filter, Storage, TransactionId, UniqueViolation, UNIQUE_FIELDS,
};

type Collections = BTreeMap<String, BTreeMap<String, Document>>;

#[derive(Debug, Default)]
struct State {
    committed: Collections,
    overlays: HashMap<TransactionId, Collections>,
}

impl State {
    fn find(
        &self,
        collection: &str,
        filter: &Filter,
        tx: Option<&TransactionId>,
    ) -> Result<Option<Document>> {
        let overlay = match tx {
            None => None,
            Some(tx) => Some(
                self.overlays
                    .get(tx)
                    .ok_or_else(|| anyhow!("unknown transaction {tx}"))?,
            ),
        };

        if let Some(found) = overlay
            .and_then(|o| o.get(collection))
            .and_then(|docs| docs.values().find(|doc| filter.matches(doc)))
        {
            return Ok(Some(found.clone()));
        }

        let shadowed = |id: &str| {
            overlay
                .and_then(|o| o.get(collection))
                .is_some_and(|docs| docs.contains_key(id))
        };

        Ok(self.committed.get(collection).and_then(|docs| {
            docs.iter()
                .find(|(id, doc)| !shadowed(id.as_str()) && filter.matches(doc))
                .map(|(_, doc)| doc.clone())
        }))
    }
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    state: Mutex<State>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of transactions begun but not yet committed or rolled back.
    #[must_use]
    pub fn open_transactions(&self) -> usize {
        self.lock().overlays.len()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn begin_transaction(&self) -> Result<TransactionId> {
        let tx = TransactionId::new();
        self.lock().overlays.insert(tx, Collections::new());
        Ok(tx)
    }

    async fn commit_transaction(&self, tx: TransactionId) -> Result<()> {
        let mut state = self.lock();
        let overlay = state
            .overlays
            .remove(&tx)
            .ok_or_else(|| anyhow!("unknown transaction {tx}"))?;
        for (collection, docs) in overlay {
            state.committed.entry(collection).or_default().extend(docs);
        }
        Ok(())
    }

    async fn rollback_transaction(&self, tx: TransactionId) -> Result<()> {
        self.lock().overlays.remove(&tx);
        Ok(())
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
        tx: Option<&TransactionId>,
    ) -> Result<Option<Document>> {
        self.lock().find(collection, filter, tx)
    }

    async fn update_one(
        &self,
        collection: &str,
        id: &str,
        patch: &Document,
        tx: Option<&TransactionId>,
    ) -> Result<Option<Document>> {
        let mut state = self.lock();
        let Some(mut doc) = state.find(collection, &Filter::id(id), tx)? else {
            return Ok(None);
        };
        merge(&mut doc, patch);

        let target = match tx {
            Some(tx) => state
                .overlays
                .get_mut(tx)
                .ok_or_else(|| anyhow!("unknown transaction {tx}"))?,
            None => &mut state.committed,
        };
        target
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), doc.clone());
        Ok(Some(doc))
    }

    async fn insert_one(
        &self,
        collection: &str,
        mut doc: Document,
        tx: Option<&TransactionId>,
    ) -> Result<Document> {
        let mut state = self.lock();
        let id = ensure_id(&mut doc);
        let mut taken = vec![Filter::id(id.clone())];
        taken.extend(UNIQUE_FIELDS.iter().filter_map(|field| {
            doc.get(*field)
                .filter(|value| !value.is_null())
                .map(|value| Filter::equals(*field, value.clone()))
        }));
        for filter in taken {
            if state.find(collection, &filter, tx)?.is_some() {
                return Err(UniqueViolation {
                    collection: collection.to_string(),
                    field: filter.field,
                }
                .into());
            }
        }

        let target = match tx {
            Some(tx) => state
                .overlays
                .get_mut(tx)
                .ok_or_else(|| anyhow!("unknown transaction {tx}"))?,
            None => &mut state.committed,
        };
        target
            .entry(collection.to_string())
            .or_default()
            .insert(id, doc.clone());
        Ok(doc)
    }
}
