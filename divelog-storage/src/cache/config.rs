//! Cache backend selection.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use divelog_core::{ConfigError, DiveLogResult};

use super::lmdb_backend::LmdbHashCache;
use super::memory::InMemoryHashCache;
use super::traits::HashCache;

/// Which hash cache backs the query cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheBackendKind {
    #[default]
    Memory,
    Lmdb,
}

impl FromStr for CacheBackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "lmdb" => Ok(Self::Lmdb),
            other => Err(ConfigError::InvalidValue {
                field: "DIVELOG_CACHE_BACKEND".to_string(),
                value: other.to_string(),
                reason: "expected memory or lmdb".to_string(),
            }),
        }
    }
}

/// Configuration for the cache backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub backend: CacheBackendKind,
    /// LMDB directory.
    pub path: PathBuf,
    /// LMDB map size in megabytes.
    pub max_size_mb: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackendKind::Memory,
            path: PathBuf::from("./divelog-cache"),
            max_size_mb: 64,
        }
    }
}

impl CacheConfig {
    /// Read `DIVELOG_CACHE_*` variables.
    ///
    /// # Errors
    /// `ConfigError::InvalidValue` for an unknown backend name.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let backend = match std::env::var("DIVELOG_CACHE_BACKEND") {
            Ok(value) => value.parse()?,
            Err(_) => defaults.backend,
        };
        Ok(Self {
            backend,
            path: std::env::var("DIVELOG_CACHE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.path),
            max_size_mb: std::env::var("DIVELOG_CACHE_MAX_SIZE_MB")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_size_mb),
        })
    }

    pub fn with_backend(mut self, backend: CacheBackendKind) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    /// Open the configured backend.
    pub fn open(&self) -> DiveLogResult<Arc<dyn HashCache>> {
        let cache: Arc<dyn HashCache> = match self.backend {
            CacheBackendKind::Memory => Arc::new(InMemoryHashCache::new()),
            CacheBackendKind::Lmdb => Arc::new(LmdbHashCache::new(&self.path, self.max_size_mb)?),
        };
        tracing::info!(backend = cache.backend_name(), "Cache client ready");
        Ok(cache)
    }
}
