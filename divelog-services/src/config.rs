//! Process configuration, read from the environment.

use std::str::FromStr;

use divelog_core::ConfigError;
use divelog_storage::{CacheConfig, DbConfig};

use crate::auth::AuthConfig;

/// Which document store backs the services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DbBackendKind {
    #[default]
    Memory,
    Postgres,
}

impl FromStr for DbBackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            other => Err(ConfigError::InvalidValue {
                field: "DIVELOG_DB_BACKEND".to_string(),
                value: other.to_string(),
                reason: "expected memory or postgres".to_string(),
            }),
        }
    }
}

/// Everything [`Services::launch`](crate::Services::launch) needs.
#[derive(Debug, Clone, Default)]
pub struct DiveLogConfig {
    pub db_backend: DbBackendKind,
    pub db: DbConfig,
    pub cache: CacheConfig,
    pub auth: AuthConfig,
    /// Emit logs as JSON lines.
    pub log_json: bool,
}

impl DiveLogConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    /// - `DIVELOG_DB_BACKEND`: `memory` or `postgres` (default: memory)
    /// - `DIVELOG_DB_*`: PostgreSQL pool settings, see [`DbConfig::from_env`]
    /// - `DIVELOG_CACHE_*`: cache backend settings, see [`CacheConfig::from_env`]
    /// - `JWT_KEY`, `DIVELOG_TOKEN_TTL_SECS`, `DIVELOG_BCRYPT_COST`: credentials
    /// - `DIVELOG_LOG_JSON`: JSON log output (default: false)
    ///
    /// # Errors
    /// `ConfigError::InvalidValue` for an unknown backend name.
    pub fn from_env() -> Result<Self, ConfigError> {
        let db_backend = match std::env::var("DIVELOG_DB_BACKEND") {
            Ok(value) => value.parse()?,
            Err(_) => DbBackendKind::default(),
        };

        Ok(Self {
            db_backend,
            db: DbConfig::from_env(),
            cache: CacheConfig::from_env()?,
            auth: AuthConfig::from_env(),
            log_json: std::env::var("DIVELOG_LOG_JSON")
                .map(|s| s.to_lowercase() == "true")
                .unwrap_or(false),
        })
    }

    pub fn with_db_backend(mut self, backend: DbBackendKind) -> Self {
        self.db_backend = backend;
        self
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_log_json(mut self, log_json: bool) -> Self {
        self.log_json = log_json;
        self
    }

    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }
}
