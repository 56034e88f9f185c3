//! In-process hash cache on `DashMap`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use divelog_core::DiveLogResult;

use super::traits::{CacheStats, HashCache};

/// Hash cache held in process memory. Buckets are independent shards so
/// readers of one group never wait on writers of another.
#[derive(Debug, Default)]
pub struct InMemoryHashCache {
    buckets: DashMap<String, HashMap<String, String>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl InMemoryHashCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HashCache for InMemoryHashCache {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn hget(&self, group: &str, field: &str) -> DiveLogResult<Option<String>> {
        let payload = self
            .buckets
            .get(group)
            .and_then(|bucket| bucket.get(field).cloned());
        let counter = if payload.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(payload)
    }

    async fn hset(&self, group: &str, field: &str, payload: &str) -> DiveLogResult<()> {
        self.buckets
            .entry(group.to_string())
            .or_default()
            .insert(field.to_string(), payload.to_string());
        Ok(())
    }

    async fn del(&self, group: &str) -> DiveLogResult<u64> {
        Ok(self
            .buckets
            .remove(group)
            .map_or(0, |(_, bucket)| bucket.len() as u64))
    }

    async fn stats(&self) -> DiveLogResult<CacheStats> {
        let entry_count = self.buckets.iter().map(|b| b.value().len() as u64).sum();
        Ok(CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count,
        })
    }

    async fn close(&self) -> DiveLogResult<()> {
        self.buckets.clear();
        Ok(())
    }
}
