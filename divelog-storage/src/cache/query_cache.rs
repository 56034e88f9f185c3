//! Read-through cache for list queries.
//!
//! Results are cached per collection group: the group key names a hash bucket
//! and the serialized [`Query`] names the field inside it. Entries have no
//! expiry; writers invalidate a whole group with [`QueryCache::clear_cache`].
//!
//! Cache faults on the read path never fail a query. A failed read falls
//! back to the store and a failed write is logged and dropped.

use std::sync::Arc;

use divelog_core::{DiveLogResult, Query, StorageError};
use serde_json::Value;

use super::traits::{CacheStats, HashCache};
use crate::resource::{Resource, ResourceStore};

/// Query cache in front of [`ResourceStore::find`].
#[derive(Clone)]
pub struct QueryCache {
    client: Arc<dyn HashCache>,
}

impl QueryCache {
    pub fn new(client: Arc<dyn HashCache>) -> Self {
        Self { client }
    }

    /// The underlying hash cache.
    pub fn client(&self) -> &Arc<dyn HashCache> {
        &self.client
    }

    /// Field name for a query: its JSON form.
    pub fn cache_key(query: &Query) -> DiveLogResult<String> {
        serde_json::to_string(query).map_err(|e| {
            StorageError::Serialization {
                resource: "Query".to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Run `query` against `store`, serving repeated queries from the cache.
    ///
    /// A `None` or empty group bypasses the cache entirely.
    pub async fn query_with_cache<T: Resource>(
        &self,
        group: Option<&str>,
        store: &ResourceStore<T>,
        query: &Query,
    ) -> DiveLogResult<Vec<T>> {
        let Some(group) = group.filter(|g| !g.is_empty()) else {
            return store.find(query).await;
        };
        let key = Self::cache_key(query)?;

        match self.client.hget(group, &key).await {
            Ok(Some(payload)) => match decode(store, &payload) {
                Ok(hit) => {
                    tracing::debug!(group, resource = T::NAME, count = hit.len(), "Cache hit");
                    return Ok(hit);
                }
                Err(e) => {
                    tracing::warn!(group, error = %e, "Discarding undecodable cache entry");
                }
            },
            Ok(None) => tracing::debug!(group, resource = T::NAME, "Cache miss"),
            Err(e) => {
                tracing::warn!(group, error = %e, "Cache read failed; reading from store");
            }
        }

        let results = store.find(query).await?;
        match serde_json::to_string(&results) {
            Ok(payload) => {
                if let Err(e) = self.client.hset(group, &key, &payload).await {
                    tracing::warn!(group, error = %e, "Cache write failed");
                }
            }
            Err(e) => tracing::warn!(group, error = %e, "Could not serialize results for cache"),
        }
        Ok(results)
    }

    /// Drop every cached query of `group`. Returns the number removed.
    ///
    /// # Errors
    /// Backend errors propagate: a silently failed invalidation would keep
    /// serving stale results.
    pub async fn clear_cache(&self, group: &str) -> DiveLogResult<u64> {
        let removed = self.client.del(group).await?;
        tracing::debug!(group, removed, "Cache cleared");
        Ok(removed)
    }

    pub async fn stats(&self) -> DiveLogResult<CacheStats> {
        self.client.stats().await
    }

    pub async fn close(&self) -> DiveLogResult<()> {
        self.client.close().await
    }
}

/// Rebuild entities from a cached payload, list or single.
fn decode<T: Resource>(store: &ResourceStore<T>, payload: &str) -> DiveLogResult<Vec<T>> {
    let value: Value = serde_json::from_str(payload).map_err(|e| StorageError::Cache {
        reason: e.to_string(),
    })?;
    match value {
        Value::Array(items) => items.into_iter().map(|item| store.construct(item)).collect(),
        single => Ok(vec![store.construct(single)?]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryHashCache;
    use crate::document::{DocumentStore, InMemoryDocumentStore};
    use async_trait::async_trait;
    use divelog_core::{DiveLogError, Filter, Gear, Projection};

    struct BrokenCache;

    #[async_trait]
    impl HashCache for BrokenCache {
        fn backend_name(&self) -> &'static str {
            "broken"
        }

        async fn hget(&self, _group: &str, _field: &str) -> DiveLogResult<Option<String>> {
            Err(StorageError::Cache {
                reason: "connection refused".into(),
            }
            .into())
        }

        async fn hset(&self, _group: &str, _field: &str, _payload: &str) -> DiveLogResult<()> {
            Err(StorageError::Cache {
                reason: "connection refused".into(),
            }
            .into())
        }

        async fn del(&self, _group: &str) -> DiveLogResult<u64> {
            Err(StorageError::Cache {
                reason: "connection refused".into(),
            }
            .into())
        }

        async fn stats(&self) -> DiveLogResult<CacheStats> {
            Ok(CacheStats::default())
        }
    }

    fn gear(name: &str) -> Gear {
        Gear {
            name: Some(name.to_string()),
            ..Default::default()
        }
    }

    fn gear_store() -> ResourceStore<Gear> {
        let db: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
        ResourceStore::new(db)
    }

    #[tokio::test]
    async fn test_repeated_query_is_served_from_cache_until_cleared() {
        let store = gear_store();
        let cache = QueryCache::new(Arc::new(InMemoryHashCache::new()));
        let query = Query::new(Filter::all());

        store.create(&gear("fins")).await.unwrap();
        let first = cache.query_with_cache(Some("Gear"), &store, &query).await.unwrap();
        store.create(&gear("mask")).await.unwrap();
        let second = cache.query_with_cache(Some("Gear"), &store, &query).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(second.len(), 1);

        assert_eq!(cache.clear_cache("Gear").await.unwrap(), 1);
        let third = cache.query_with_cache(Some("Gear"), &store, &query).await.unwrap();
        assert_eq!(third.len(), 2);

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
    }

    #[tokio::test]
    async fn test_missing_group_bypasses_cache() {
        let store = gear_store();
        let cache = QueryCache::new(Arc::new(InMemoryHashCache::new()));
        let query = Query::new(Filter::all());

        cache.query_with_cache(None, &store, &query).await.unwrap();
        cache.query_with_cache(Some(""), &store, &query).await.unwrap();
        store.create(&gear("fins")).await.unwrap();
        let live = cache.query_with_cache(None, &store, &query).await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(cache.stats().await.unwrap(), CacheStats::default());
    }

    #[tokio::test]
    async fn test_distinct_queries_use_distinct_fields() {
        let store = gear_store();
        let cache = QueryCache::new(Arc::new(InMemoryHashCache::new()));
        store.create(&gear("fins")).await.unwrap();

        let all = Query::new(Filter::all());
        let projected = Query::new(Filter::all()).with_fields(Projection::new(["brand"]));
        cache.query_with_cache(Some("Gear"), &store, &all).await.unwrap();
        let names = cache.query_with_cache(Some("Gear"), &store, &projected).await.unwrap();
        assert!(names[0].name.is_none());
        assert_eq!(cache.stats().await.unwrap().entry_count, 2);
    }

    #[tokio::test]
    async fn test_single_object_payload_is_rebuilt() {
        let store = gear_store();
        let client = Arc::new(InMemoryHashCache::new());
        let cache = QueryCache::new(client.clone());
        let query = Query::new(Filter::all());
        let key = QueryCache::cache_key(&query).unwrap();
        client.hset("Gear", &key, r#"{"name":"fins"}"#).await.unwrap();

        let hit = cache.query_with_cache(Some("Gear"), &store, &query).await.unwrap();
        assert_eq!(hit, vec![gear("fins")]);
    }

    #[tokio::test]
    async fn test_cache_faults_fall_back_to_store() {
        let store = gear_store();
        store.create(&gear("fins")).await.unwrap();
        let cache = QueryCache::new(Arc::new(BrokenCache));

        let results = cache
            .query_with_cache(Some("Gear"), &store, &Query::new(Filter::all()))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_clear_cache_fault_propagates() {
        let cache = QueryCache::new(Arc::new(BrokenCache));
        let err = cache.clear_cache("Gear").await.unwrap_err();
        assert!(matches!(err, DiveLogError::Storage(StorageError::Cache { .. })));
    }
}
