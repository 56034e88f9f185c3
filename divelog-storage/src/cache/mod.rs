//! Query cache over a pluggable hash store.
//!
//! [`HashCache`] is the key/field/payload store (in-memory or LMDB);
//! [`QueryCache`] layers read-through list caching for a
//! [`ResourceStore`](crate::ResourceStore) on top of it.
//!
//! # Example
//!
//! ```ignore
//! let cache = QueryCache::new(CacheConfig::from_env()?.open()?);
//! let dives = cache
//!     .query_with_cache(Some(resources::DIVE), &dive_store, &Query::new(Filter::all()))
//!     .await?;
//! // After any write to dives:
//! cache.clear_cache(resources::DIVE).await?;
//! ```

pub mod config;
pub mod lmdb_backend;
pub mod memory;
pub mod query_cache;
pub mod traits;

pub use config::{CacheBackendKind, CacheConfig};
pub use lmdb_backend::{LmdbCacheError, LmdbHashCache};
pub use memory::InMemoryHashCache;
pub use query_cache::QueryCache;
pub use traits::{CacheStats, HashCache};
