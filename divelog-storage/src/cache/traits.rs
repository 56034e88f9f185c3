//! Hash cache backend trait and statistics.

use async_trait::async_trait;
use divelog_core::DiveLogResult;

/// A store of string hashes: each group key names a bucket of
/// field -> payload entries.
///
/// Entries never expire; a bucket lives until [`del`](HashCache::del)
/// removes it. Implementations must be thread-safe.
#[async_trait]
pub trait HashCache: Send + Sync {
    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;

    /// Read one field of a bucket.
    async fn hget(&self, group: &str, field: &str) -> DiveLogResult<Option<String>>;

    /// Write one field of a bucket, replacing any previous payload.
    async fn hset(&self, group: &str, field: &str, payload: &str) -> DiveLogResult<()>;

    /// Remove a whole bucket. Returns the number of fields removed.
    async fn del(&self, group: &str) -> DiveLogResult<u64>;

    /// Get cache statistics.
    async fn stats(&self) -> DiveLogResult<CacheStats>;

    /// Release the backend. Further calls may fail.
    async fn close(&self) -> DiveLogResult<()> {
        Ok(())
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of fields currently cached, across all buckets.
    pub entry_count: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
