//! Process-wide service bundle.
//!
//! The document store and the cache client are opened once by
//! [`Services::launch`], shared by every service, and released once by
//! [`Services::close`].

use std::sync::Arc;

use divelog_core::DiveLogResult;
use divelog_storage::{
    DocumentStore, HashCache, InMemoryDocumentStore, InMemoryHashCache,
    PgDocumentStore, QueryCache,
};

use crate::auth::AuthConfig;
use crate::config::{DbBackendKind, DiveLogConfig};
use crate::services::{ClubService, DiveService, GearService, GroupService, UserService};

/// The five consistency services plus the shared connections behind them.
#[derive(Clone)]
pub struct Services {
    pub db: Arc<dyn DocumentStore>,
    pub cache: QueryCache,
    pub users: UserService,
    pub dives: DiveService,
    pub clubs: ClubService,
    pub gear: GearService,
    pub groups: GroupService,
}

impl Services {
    /// Build the services over already-open handles.
    pub fn new(db: Arc<dyn DocumentStore>, cache: Arc<dyn HashCache>, auth: AuthConfig) -> Self {
        Self {
            users: UserService::new(Arc::clone(&db), Arc::new(auth)),
            dives: DiveService::new(Arc::clone(&db)),
            clubs: ClubService::new(Arc::clone(&db)),
            gear: GearService::new(Arc::clone(&db)),
            groups: GroupService::new(Arc::clone(&db)),
            cache: QueryCache::new(cache),
            db,
        }
    }

    /// Install tracing, connect the configured document store and open the
    /// cache.
    ///
    /// A subscriber installed earlier in the process stays in place.
    ///
    /// # Errors
    /// Connection, migration or cache open failures.
    pub async fn launch(config: DiveLogConfig) -> DiveLogResult<Self> {
        if let Err(e) = crate::telemetry::init_tracing(config.log_json) {
            tracing::debug!(error = %e, "Keeping the installed tracing subscriber");
        }
        let db: Arc<dyn DocumentStore> = match config.db_backend {
            DbBackendKind::Memory => Arc::new(InMemoryDocumentStore::new()),
            DbBackendKind::Postgres => Arc::new(PgDocumentStore::from_config(&config.db).await?),
        };
        let cache = config.cache.open()?;

        tracing::info!(
            db_backend = db.backend_name(),
            cache_backend = cache.backend_name(),
            "Services launched"
        );
        Ok(Self::new(db, cache, config.auth))
    }

    /// In-memory store and cache, for tests and local tooling.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryDocumentStore::new()),
            Arc::new(InMemoryHashCache::new()),
            AuthConfig::default(),
        )
    }

    /// In-memory bundle with custom credential settings.
    pub fn in_memory_with_auth(auth: AuthConfig) -> Self {
        Self::new(
            Arc::new(InMemoryDocumentStore::new()),
            Arc::new(InMemoryHashCache::new()),
            auth,
        )
    }

    /// Release the database connection, then the cache client.
    ///
    /// Both are attempted; the first failure is returned.
    pub async fn close(self) -> DiveLogResult<()> {
        let db_closed = self.db.close().await;
        if db_closed.is_ok() {
            tracing::info!("Database connection closed.");
        }
        let cache_closed = self.cache.close().await;
        if cache_closed.is_ok() {
            tracing::info!("Cache client closed.");
        }
        db_closed.and(cache_closed)
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("db", &self.db.backend_name())
            .field("cache", &self.cache.client().backend_name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use divelog_storage::{CacheBackendKind, CacheConfig};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_launch_in_memory_and_close() {
        let services = Services::launch(DiveLogConfig::default()).await.unwrap();
        assert_eq!(services.db.backend_name(), "memory");
        services.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_launch_with_lmdb_cache() {
        let temp_dir = TempDir::new().unwrap();
        let config = DiveLogConfig::default().with_cache(
            CacheConfig::default()
                .with_backend(CacheBackendKind::Lmdb)
                .with_path(temp_dir.path().join("cache")),
        );
        let services = Services::launch(config).await.unwrap();
        assert_eq!(services.cache.client().backend_name(), "lmdb");
        services.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_launch_with_json_logs_twice() {
        let config = DiveLogConfig::default().with_log_json(true);
        let first = Services::launch(config.clone()).await.unwrap();
        let second = Services::launch(config).await.unwrap();
        first.close().await.unwrap();
        second.close().await.unwrap();
        assert!(crate::telemetry::init_tracing(false).is_err());
    }

    #[test]
    fn test_debug_names_backends() {
        let rendered = format!("{:?}", Services::in_memory());
        assert!(rendered.contains("memory"));
    }
}
