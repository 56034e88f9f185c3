//! In-memory document store.
//!
//! Backs tests and the `memory` database backend. Each collection is a
//! vector in insertion order behind one `RwLock`, so every operation is
//! atomic with respect to every other.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use divelog_core::document::{document_id, ID_FIELD};
use divelog_core::{
    DiveLogResult, Document, EntityId, Filter, Patch, Projection, Query, StorageError,
};

use super::DocumentStore;

type Collections = HashMap<String, Vec<Document>>;

/// Document store that keeps everything in process memory.
#[derive(Debug, Default, Clone)]
pub struct InMemoryDocumentStore {
    collections: Arc<RwLock<Collections>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in `collection`.
    pub fn count(&self, collection: &str) -> DiveLogResult<usize> {
        let guard = self.collections.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(guard.get(collection).map_or(0, Vec::len))
    }
}

fn position(docs: &[Document], id: EntityId) -> Option<usize> {
    docs.iter().position(|doc| document_id(doc) == Some(id))
}

fn update_failed(collection: &str, id: EntityId, reason: impl ToString) -> StorageError {
    StorageError::UpdateFailed {
        resource: collection.to_string(),
        id,
        reason: reason.to_string(),
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn insert(&self, collection: &str, mut doc: Document) -> DiveLogResult<Document> {
        let id = match document_id(&doc) {
            Some(id) => id,
            None => {
                let id = EntityId::now_v7();
                doc.insert(ID_FIELD.to_string(), id.into());
                id
            }
        };

        let mut guard = self.collections.write().map_err(|_| StorageError::LockPoisoned)?;
        let docs = guard.entry(collection.to_string()).or_default();
        if position(docs, id).is_some() {
            return Err(StorageError::InsertFailed {
                resource: collection.to_string(),
                reason: format!("duplicate id {id}"),
            }
            .into());
        }
        docs.push(doc.clone());
        Ok(doc)
    }

    async fn find(&self, collection: &str, query: &Query) -> DiveLogResult<Vec<Document>> {
        let guard = self.collections.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(guard
            .get(collection)
            .map(|docs| query.run(docs.iter()))
            .unwrap_or_default())
    }

    async fn find_by_id(
        &self,
        collection: &str,
        id: EntityId,
        fields: Option<&Projection>,
    ) -> DiveLogResult<Option<Document>> {
        let guard = self.collections.read().map_err(|_| StorageError::LockPoisoned)?;
        let found = guard
            .get(collection)
            .and_then(|docs| docs.iter().find(|doc| document_id(doc) == Some(id)));
        Ok(found.map(|doc| match fields {
            Some(projection) => projection.apply(doc),
            None => doc.clone(),
        }))
    }

    async fn update_by_id(
        &self,
        collection: &str,
        id: EntityId,
        patch: &Patch,
    ) -> DiveLogResult<Option<Document>> {
        let mut guard = self.collections.write().map_err(|_| StorageError::LockPoisoned)?;
        let Some(docs) = guard.get_mut(collection) else {
            return Ok(None);
        };
        let Some(index) = position(docs, id) else {
            return Ok(None);
        };

        // Patch a copy so a rejected op leaves the stored document intact.
        let mut updated = docs[index].clone();
        patch.apply(&mut updated)?;
        if document_id(&updated) != Some(id) {
            return Err(update_failed(collection, id, "identifier changed").into());
        }
        docs[index] = updated.clone();
        Ok(Some(updated))
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Patch,
    ) -> DiveLogResult<u64> {
        let mut guard = self.collections.write().map_err(|_| StorageError::LockPoisoned)?;
        let Some(docs) = guard.get_mut(collection) else {
            return Ok(0);
        };

        let mut staged = Vec::new();
        for (index, doc) in docs.iter().enumerate() {
            if filter.matches(doc) {
                let mut updated = doc.clone();
                patch.apply(&mut updated)?;
                staged.push((index, updated));
            }
        }

        let matched = staged.len() as u64;
        for (index, updated) in staged {
            docs[index] = updated;
        }
        Ok(matched)
    }

    async fn delete_by_id(
        &self,
        collection: &str,
        id: EntityId,
    ) -> DiveLogResult<Option<Document>> {
        let mut guard = self.collections.write().map_err(|_| StorageError::LockPoisoned)?;
        let Some(docs) = guard.get_mut(collection) else {
            return Ok(None);
        };
        Ok(position(docs, id).map(|index| docs.remove(index)))
    }

    async fn drop_all(&self) -> DiveLogResult<()> {
        let mut guard = self.collections.write().map_err(|_| StorageError::LockPoisoned)?;
        guard.clear();
        Ok(())
    }
}
