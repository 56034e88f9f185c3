//! Document database abstraction.
//!
//! A [`DocumentStore`] holds one collection per entity kind and offers the
//! create/find/findById/findByIdAndUpdate/findByIdAndDelete/updateMany
//! primitives the resource layer is built on. A single `update_by_id` call is
//! atomic for its document; nothing spans documents.

mod memory;
mod postgres;

pub use memory::InMemoryDocumentStore;
pub use postgres::{DbConfig, PgDocumentStore};

use async_trait::async_trait;
use divelog_core::{
    DiveLogResult, Document, EntityId, Filter, Patch, Projection, Query, QueryOptions,
};

/// Storage backend trait for document collections.
///
/// Implementations must be thread-safe; one instance is shared by every
/// service in the process.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;

    /// Insert a document, assigning an identifier when it has none.
    ///
    /// Returns the stored document.
    async fn insert(&self, collection: &str, doc: Document) -> DiveLogResult<Document>;

    /// Documents matching `query`, in insertion order unless the query sorts.
    async fn find(&self, collection: &str, query: &Query) -> DiveLogResult<Vec<Document>>;

    /// A single document by id, optionally projected.
    async fn find_by_id(
        &self,
        collection: &str,
        id: EntityId,
        fields: Option<&Projection>,
    ) -> DiveLogResult<Option<Document>>;

    /// Apply `patch` atomically and return the post-update document.
    ///
    /// Returns `Ok(None)` when no document has that id.
    async fn update_by_id(
        &self,
        collection: &str,
        id: EntityId,
        patch: &Patch,
    ) -> DiveLogResult<Option<Document>>;

    /// Apply `patch` to every matching document. Returns the match count.
    async fn update_many(&self, collection: &str, filter: &Filter, patch: &Patch)
        -> DiveLogResult<u64>;

    /// Remove a document, returning its last state.
    async fn delete_by_id(&self, collection: &str, id: EntityId)
        -> DiveLogResult<Option<Document>>;

    /// Remove every document in every collection.
    async fn drop_all(&self) -> DiveLogResult<()>;

    /// Release connections. Further calls may fail.
    async fn close(&self) -> DiveLogResult<()> {
        Ok(())
    }

    /// First document matching `filter`.
    async fn find_one(&self, collection: &str, filter: &Filter) -> DiveLogResult<Option<Document>> {
        let query = Query::new(filter.clone()).with_options(QueryOptions::new().with_limit(1));
        Ok(self.find(collection, &query).await?.into_iter().next())
    }
}
