//! LMDB-backed hash cache.
//!
//! Uses the heed crate (Rust bindings for LMDB) to keep cached query results
//! in a memory-mapped file that survives restarts.
//!
//! # Key Layout
//!
//! Each hash field is one LMDB key: `group \0 sha256(field)`. A group name
//! never contains a NUL byte, so the `group \0` prefix addresses exactly one
//! bucket and `del` is a prefix scan. Fields are serialized queries of any
//! length; hashing them keeps keys under LMDB's 511-byte limit.
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. The backend uses:
//! - Read transactions for `hget`
//! - Write transactions for `hset` and `del`
//! - Statistics are tracked behind `RwLock`s

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use divelog_core::{DiveLogError, DiveLogResult, StorageError};
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use sha2::{Digest, Sha256};

use super::traits::{CacheStats, HashCache};

const SEPARATOR: u8 = 0;

/// Longest group name that still leaves room for the separator and digest.
const MAX_GROUP_LEN: usize = 511 - 1 - 32;

/// Error type for LMDB cache operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbCacheError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Stored payload is not valid UTF-8.
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Group key cannot be encoded.
    #[error("Invalid cache key: {0}")]
    InvalidKey(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convert LmdbCacheError to DiveLogError.
impl From<LmdbCacheError> for DiveLogError {
    fn from(e: LmdbCacheError) -> Self {
        DiveLogError::Storage(StorageError::Cache {
            reason: e.to_string(),
        })
    }
}

fn txn_error(e: heed::Error) -> LmdbCacheError {
    LmdbCacheError::Transaction(e.to_string())
}

/// Per-group statistics tracking.
#[derive(Debug, Default)]
struct GroupStatsInner {
    hits: u64,
    misses: u64,
    entries: u64,
}

/// LMDB-backed hash cache.
///
/// # Example
///
/// ```ignore
/// use divelog_storage::cache::{HashCache, LmdbHashCache};
///
/// let cache = LmdbHashCache::new("/tmp/divelog-cache", 64)?;
/// cache.hset("Dive", r#"{"filter":[]}"#, "[]").await?;
/// let hit = cache.hget("Dive", r#"{"filter":[]}"#).await?;
/// ```
pub struct LmdbHashCache {
    /// The LMDB environment.
    env: Env,
    /// The main database (single unnamed database).
    db: Database<Bytes, Bytes>,
    /// Per-group statistics.
    group_stats: Arc<RwLock<HashMap<String, GroupStatsInner>>>,
    /// Global statistics.
    global_stats: Arc<RwLock<CacheStats>>,
}

impl LmdbHashCache {
    /// Open (or create) an LMDB cache.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory cannot be created
    /// - LMDB environment cannot be opened
    /// - Database cannot be created
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbCacheError> {
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbCacheError::EnvOpen(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(txn_error)?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbCacheError::DbOpen(e.to_string()))?;
        // Entries persisted by a previous process still count.
        let existing = db.len(&wtxn).map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;

        Ok(Self {
            env,
            db,
            group_stats: Arc::new(RwLock::new(HashMap::new())),
            global_stats: Arc::new(RwLock::new(CacheStats {
                entry_count: existing,
                ..Default::default()
            })),
        })
    }

    fn group_prefix(group: &str) -> Result<Vec<u8>, LmdbCacheError> {
        if group.as_bytes().contains(&SEPARATOR) {
            return Err(LmdbCacheError::InvalidKey(format!(
                "group {group:?} contains a NUL byte"
            )));
        }
        if group.len() > MAX_GROUP_LEN {
            return Err(LmdbCacheError::InvalidKey(format!(
                "group name is {} bytes, limit is {MAX_GROUP_LEN}",
                group.len()
            )));
        }
        let mut prefix = Vec::with_capacity(group.len() + 1);
        prefix.extend_from_slice(group.as_bytes());
        prefix.push(SEPARATOR);
        Ok(prefix)
    }

    fn encode_key(group: &str, field: &str) -> Result<Vec<u8>, LmdbCacheError> {
        let mut key = Self::group_prefix(group)?;
        key.extend_from_slice(&Sha256::digest(field.as_bytes()));
        Ok(key)
    }

    fn record_hit(&self, group: &str) {
        if let Ok(mut stats) = self.group_stats.write() {
            stats.entry(group.to_string()).or_default().hits += 1;
        }
        if let Ok(mut stats) = self.global_stats.write() {
            stats.hits += 1;
        }
    }

    fn record_miss(&self, group: &str) {
        if let Ok(mut stats) = self.group_stats.write() {
            stats.entry(group.to_string()).or_default().misses += 1;
        }
        if let Ok(mut stats) = self.global_stats.write() {
            stats.misses += 1;
        }
    }

    /// Statistics for one bucket since this process opened the cache.
    pub fn group_stats(&self, group: &str) -> CacheStats {
        if let Ok(stats) = self.group_stats.read() {
            if let Some(group_stats) = stats.get(group) {
                return CacheStats {
                    hits: group_stats.hits,
                    misses: group_stats.misses,
                    entry_count: group_stats.entries,
                };
            }
        }
        CacheStats::default()
    }

    fn collect_keys_with_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>, LmdbCacheError> {
        let rtxn = self.env.read_txn().map_err(txn_error)?;
        let iter = self.db.prefix_iter(&rtxn, prefix).map_err(txn_error)?;

        let mut keys = Vec::new();
        for result in iter {
            let (key, _) = result.map_err(txn_error)?;
            keys.push(key.to_vec());
        }
        Ok(keys)
    }
}

#[async_trait]
impl HashCache for LmdbHashCache {
    fn backend_name(&self) -> &'static str {
        "lmdb"
    }

    async fn hget(&self, group: &str, field: &str) -> DiveLogResult<Option<String>> {
        let key = Self::encode_key(group, field)?;
        let rtxn = self.env.read_txn().map_err(txn_error)?;

        match self.db.get(&rtxn, &key) {
            Ok(Some(bytes)) => {
                self.record_hit(group);
                let payload = String::from_utf8(bytes.to_vec())
                    .map_err(|e| LmdbCacheError::Deserialization(e.to_string()))?;
                Ok(Some(payload))
            }
            Ok(None) => {
                self.record_miss(group);
                Ok(None)
            }
            Err(e) => {
                self.record_miss(group);
                Err(txn_error(e).into())
            }
        }
    }

    async fn hset(&self, group: &str, field: &str, payload: &str) -> DiveLogResult<()> {
        let key = Self::encode_key(group, field)?;

        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let is_new = self.db.get(&wtxn, &key).map_err(txn_error)?.is_none();
        self.db
            .put(&mut wtxn, &key, payload.as_bytes())
            .map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;

        if is_new {
            if let Ok(mut stats) = self.group_stats.write() {
                stats.entry(group.to_string()).or_default().entries += 1;
            }
            if let Ok(mut stats) = self.global_stats.write() {
                stats.entry_count += 1;
            }
        }
        Ok(())
    }

    async fn del(&self, group: &str) -> DiveLogResult<u64> {
        let prefix = Self::group_prefix(group)?;
        let keys_to_delete = self.collect_keys_with_prefix(&prefix)?;

        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let mut deleted = 0u64;
        for key in &keys_to_delete {
            if self.db.delete(&mut wtxn, key).map_err(txn_error)? {
                deleted += 1;
            }
        }
        wtxn.commit().map_err(txn_error)?;

        if let Ok(mut stats) = self.group_stats.write() {
            if let Some(group_stats) = stats.get_mut(group) {
                group_stats.entries = 0;
            }
        }
        if let Ok(mut stats) = self.global_stats.write() {
            stats.entry_count = stats.entry_count.saturating_sub(deleted);
        }
        Ok(deleted)
    }

    async fn stats(&self) -> DiveLogResult<CacheStats> {
        Ok(self
            .global_stats
            .read()
            .map(|s| s.clone())
            .unwrap_or_default())
    }

    async fn close(&self) -> DiveLogResult<()> {
        self.env.force_sync().map_err(txn_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_cache() -> (LmdbHashCache, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let cache = LmdbHashCache::new(temp_dir.path(), 10).expect("cache creation should succeed");
        (cache, temp_dir)
    }

    #[tokio::test]
    async fn test_hset_and_hget() {
        let (cache, _temp_dir) = create_test_cache();
        cache
            .hset("Dive", r#"{"filter":[]}"#, r#"[{"id":"a"}]"#)
            .await
            .expect("hset should succeed");

        let cached = cache
            .hget("Dive", r#"{"filter":[]}"#)
            .await
            .expect("hget should succeed");
        assert_eq!(cached.as_deref(), Some(r#"[{"id":"a"}]"#));
    }

    #[tokio::test]
    async fn test_hget_missing() {
        let (cache, _temp_dir) = create_test_cache();
        let cached = cache.hget("Dive", "nothing").await.expect("hget should succeed");
        assert!(cached.is_none());
    }

    #[tokio::test]
    async fn test_del_removes_only_its_group() {
        let (cache, _temp_dir) = create_test_cache();
        for i in 0..3 {
            cache
                .hset("Dive", &format!("q{i}"), "[]")
                .await
                .expect("hset should succeed");
        }
        cache.hset("Dives", "q0", "[]").await.expect("hset should succeed");
        cache.hset("User", "q0", "[]").await.expect("hset should succeed");

        let deleted = cache.del("Dive").await.expect("del should succeed");
        assert_eq!(deleted, 3);

        // A group whose name extends another is a separate bucket.
        assert!(cache.hget("Dives", "q0").await.unwrap().is_some());
        assert!(cache.hget("User", "q0").await.unwrap().is_some());
        assert!(cache.hget("Dive", "q1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_overwrite() {
        let (cache, _temp_dir) = create_test_cache();
        cache.hset("Gear", "q", "old").await.expect("hset should succeed");
        cache.hset("Gear", "q", "new").await.expect("hset should succeed");

        assert_eq!(cache.hget("Gear", "q").await.unwrap().as_deref(), Some("new"));
        assert_eq!(cache.stats().await.unwrap().entry_count, 1);
    }

    #[tokio::test]
    async fn test_stats() {
        let (cache, _temp_dir) = create_test_cache();
        let _ = cache.hget("Club", "q").await;
        cache.hset("Club", "q", "[]").await.expect("hset should succeed");
        let _ = cache.hget("Club", "q").await;
        let _ = cache.hget("Club", "q").await;

        let stats = cache.stats().await.expect("stats should succeed");
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.entry_count, 1);
    }

    #[tokio::test]
    async fn test_group_stats_are_isolated() {
        let (cache, _temp_dir) = create_test_cache();
        cache.hset("Club", "q", "[]").await.unwrap();
        let _ = cache.hget("Club", "q").await;
        let _ = cache.hget("Club", "q").await;
        let _ = cache.hget("Group", "q").await;

        assert_eq!(cache.group_stats("Club").hits, 2);
        assert_eq!(cache.group_stats("Club").entry_count, 1);
        assert_eq!(cache.group_stats("Group").misses, 1);
        assert_eq!(cache.group_stats("Gear"), CacheStats::default());
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let cache = LmdbHashCache::new(temp_dir.path(), 10).unwrap();
            cache.hset("User", "q", "[]").await.unwrap();
            cache.close().await.unwrap();
        }
        let cache = LmdbHashCache::new(temp_dir.path(), 10).unwrap();
        assert_eq!(cache.stats().await.unwrap().entry_count, 1);
        assert_eq!(cache.hget("User", "q").await.unwrap().as_deref(), Some("[]"));
    }

    #[tokio::test]
    async fn test_nul_in_group_is_rejected() {
        let (cache, _temp_dir) = create_test_cache();
        let err = cache.hset("bad\0group", "q", "[]").await.unwrap_err();
        assert!(matches!(err, DiveLogError::Storage(StorageError::Cache { .. })));
    }

    #[tokio::test]
    async fn test_long_query_fields_fit_the_key_limit() {
        let (cache, _temp_dir) = create_test_cache();
        let long = format!(r#"{{"filter":[{{"name":"{}"}}]}}"#, "x".repeat(2_000));
        let longer = format!("{long} ");

        cache.hset("Dive", &long, "[1]").await.expect("hset should succeed");
        cache.hset("Dive", &longer, "[2]").await.expect("hset should succeed");

        assert_eq!(cache.hget("Dive", &long).await.unwrap().as_deref(), Some("[1]"));
        assert_eq!(cache.hget("Dive", &longer).await.unwrap().as_deref(), Some("[2]"));
        assert_eq!(cache.del("Dive").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_oversized_group_is_rejected() {
        let (cache, _temp_dir) = create_test_cache();
        let group = "g".repeat(MAX_GROUP_LEN + 1);
        assert!(cache.hset(&group, "q", "[]").await.is_err());
        let group = "g".repeat(MAX_GROUP_LEN);
        cache.hset(&group, "q", "[]").await.expect("hset should succeed");
    }
}
