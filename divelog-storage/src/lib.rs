//! divelog Storage - Document Stores, Resource Stores and Query Cache
//!
//! The [`DocumentStore`] trait abstracts the document database, with an
//! in-memory backend for tests and a PostgreSQL JSONB backend. On top of it,
//! [`ResourceStore<T>`] provides typed CRUD for any [`Resource`], and the
//! [`cache`] module provides the read-through query cache.

pub mod cache;
pub mod document;
pub mod resource;
pub mod schema;

pub use cache::{
    CacheBackendKind, CacheConfig, CacheStats, HashCache, InMemoryHashCache, LmdbCacheError,
    LmdbHashCache, QueryCache,
};
pub use document::{DbConfig, DocumentStore, InMemoryDocumentStore, PgDocumentStore};
pub use resource::{Relation, Resource, ResourceHooks, ResourceStore};
pub use schema::{collections, dedupe_list, stamp_message};
