//! PostgreSQL document store.
//!
//! Every collection lives in one `divelog_documents` table keyed by
//! `(collection, id)` with the document body in a JSONB column. Equality and
//! list-containment clauses are pushed down as `@>` containment so the GIN
//! index narrows the scan; the full [`Query`] is then re-evaluated in Rust so
//! filter semantics are identical to the in-memory backend.
//!
//! Patch updates lock the row with `SELECT ... FOR UPDATE` and write the
//! patched body back in the same transaction.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use divelog_core::document::{document_id, segments, ID_FIELD};
use divelog_core::{
    DiveLogError, DiveLogResult, Document, EntityId, Filter, FilterExpr, FilterOperator, Patch,
    Projection, Query, StorageError,
};
use serde_json::{Map, Value};
use tokio_postgres::error::SqlState;
use tokio_postgres::types::ToSql;
use tokio_postgres::NoTls;
use uuid::Uuid;

use super::DocumentStore;

const TABLE: &str = "divelog_documents";

/// Paths deeper than this are filtered in Rust only.
const MAX_PUSHDOWN_DEPTH: usize = 4;

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Connection timeout
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "divelog".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("DIVELOG_DB_HOST").unwrap_or(defaults.host),
            port: std::env::var("DIVELOG_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            dbname: std::env::var("DIVELOG_DB_NAME").unwrap_or(defaults.dbname),
            user: std::env::var("DIVELOG_DB_USER").unwrap_or(defaults.user),
            password: std::env::var("DIVELOG_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("DIVELOG_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_size),
            timeout: std::env::var("DIVELOG_DB_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }

    /// Create a connection pool from this configuration.
    ///
    /// No connection is opened until the pool is first used.
    pub fn create_pool(&self) -> DiveLogResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());
        cfg.connect_timeout = Some(self.timeout);
        cfg.pool = Some(PoolConfig::new(self.max_size));

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        cfg.create_pool(Some(Runtime::Tokio1), NoTls).map_err(|e| {
            StorageError::ConnectionFailed {
                reason: format!("Failed to create pool: {}", e),
            }
            .into()
        })
    }
}

// ============================================================================
// ERROR MAPPING
// ============================================================================

fn pool_error(e: deadpool_postgres::PoolError) -> DiveLogError {
    StorageError::ConnectionFailed {
        reason: e.to_string(),
    }
    .into()
}

fn query_error(e: tokio_postgres::Error) -> DiveLogError {
    StorageError::TransactionFailed {
        reason: e.to_string(),
    }
    .into()
}

fn decode_error(collection: &str, reason: impl ToString) -> DiveLogError {
    StorageError::Serialization {
        resource: collection.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

fn into_document(collection: &str, value: Value) -> DiveLogResult<Document> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(decode_error(
            collection,
            format!("stored body is not an object: {other}"),
        )),
    }
}

// ============================================================================
// CONTAINMENT PUSHDOWN
// ============================================================================

/// Nest `leaf` under the dotted `path`.
fn nest(path: &[&str], leaf: Value) -> Value {
    path.iter().rev().fold(leaf, |inner, segment| {
        let mut map = Map::new();
        map.insert(segment.to_string(), inner);
        Value::Object(map)
    })
}

/// Containment candidates for one clause, any of which may match.
///
/// `None` when the clause cannot be narrowed in SQL.
pub(crate) fn containment_candidates(expr: &FilterExpr) -> Option<Vec<Value>> {
    if !expr.is_containment() {
        return None;
    }
    let path = segments(&expr.field);
    if path.is_empty() || path.len() > MAX_PUSHDOWN_DEPTH {
        return None;
    }
    let as_member = nest(&path, Value::Array(vec![expr.value.clone()]));
    match expr.operator {
        FilterOperator::Eq => Some(vec![nest(&path, expr.value.clone()), as_member]),
        FilterOperator::Contains => Some(vec![as_member]),
        _ => None,
    }
}

/// SQL `WHERE` tail and its JSONB parameters, numbered from `first_param`.
pub(crate) fn pushdown(filter: &Filter, first_param: usize) -> (String, Vec<Value>) {
    let mut sql = String::new();
    let mut params = Vec::new();
    for candidates in filter.clauses().iter().filter_map(containment_candidates) {
        let alternatives: Vec<String> = candidates
            .into_iter()
            .map(|candidate| {
                params.push(candidate);
                format!("doc @> ${}", first_param + params.len() - 1)
            })
            .collect();
        sql.push_str(&format!(" AND ({})", alternatives.join(" OR ")));
    }
    (sql, params)
}

// ============================================================================
// STORE
// ============================================================================

/// Document store backed by a PostgreSQL JSONB table.
#[derive(Clone)]
pub struct PgDocumentStore {
    pool: Pool,
}

impl PgDocumentStore {
    /// Wrap an existing pool. Call [`migrate`](Self::migrate) before use.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create the pool and ensure the schema exists.
    pub async fn from_config(config: &DbConfig) -> DiveLogResult<Self> {
        let store = Self::new(config.create_pool()?);
        store.migrate().await?;
        tracing::info!(
            host = %config.host,
            port = config.port,
            dbname = %config.dbname,
            max_size = config.max_size,
            "PostgreSQL document store ready"
        );
        Ok(store)
    }

    /// Create the documents table and its indexes if missing.
    pub async fn migrate(&self) -> DiveLogResult<()> {
        let conn = self.get_conn().await?;
        conn.batch_execute(&format!(
            "CREATE TABLE IF NOT EXISTS {TABLE} (
                 collection TEXT NOT NULL,
                 id UUID NOT NULL,
                 seq BIGSERIAL,
                 doc JSONB NOT NULL,
                 PRIMARY KEY (collection, id)
             );
             CREATE INDEX IF NOT EXISTS {TABLE}_doc_gin ON {TABLE} USING GIN (doc jsonb_path_ops);
             CREATE INDEX IF NOT EXISTS {TABLE}_seq ON {TABLE} (collection, seq);"
        ))
        .await
        .map_err(query_error)
    }

    /// Get the current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    async fn get_conn(&self) -> DiveLogResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(pool_error)
    }

    /// Candidate rows for `filter`, in insertion order, without the Rust recheck.
    async fn candidates(&self, collection: &str, filter: &Filter) -> DiveLogResult<Vec<Document>> {
        let conn = self.get_conn().await?;
        let (tail, values) = pushdown(filter, 2);
        let sql = format!("SELECT doc FROM {TABLE} WHERE collection = $1{tail} ORDER BY seq");

        let mut params: Vec<&(dyn ToSql + Sync)> = vec![&collection];
        params.extend(values.iter().map(|v| v as &(dyn ToSql + Sync)));

        let rows = conn.query(sql.as_str(), &params).await.map_err(query_error)?;
        rows.into_iter()
            .map(|row| into_document(collection, row.get::<_, Value>(0)))
            .collect()
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn insert(&self, collection: &str, mut doc: Document) -> DiveLogResult<Document> {
        let id = match document_id(&doc) {
            Some(id) => id,
            None => {
                let id = EntityId::now_v7();
                doc.insert(ID_FIELD.to_string(), id.into());
                id
            }
        };

        let conn = self.get_conn().await?;
        let body = Value::Object(doc.clone());
        let uuid: Uuid = id.as_uuid();
        conn.execute(
            &format!("INSERT INTO {TABLE} (collection, id, doc) VALUES ($1, $2, $3)"),
            &[&collection, &uuid, &body],
        )
        .await
        .map_err(|e| {
            if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
                StorageError::InsertFailed {
                    resource: collection.to_string(),
                    reason: format!("duplicate id {id}"),
                }
                .into()
            } else {
                query_error(e)
            }
        })?;
        Ok(doc)
    }

    async fn find(&self, collection: &str, query: &Query) -> DiveLogResult<Vec<Document>> {
        let docs = self.candidates(collection, &query.filter).await?;
        Ok(query.run(docs.iter()))
    }

    async fn find_by_id(
        &self,
        collection: &str,
        id: EntityId,
        fields: Option<&Projection>,
    ) -> DiveLogResult<Option<Document>> {
        let conn = self.get_conn().await?;
        let uuid = id.as_uuid();
        let row = conn
            .query_opt(
                &format!("SELECT doc FROM {TABLE} WHERE collection = $1 AND id = $2"),
                &[&collection, &uuid],
            )
            .await
            .map_err(query_error)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let doc = into_document(collection, row.get::<_, Value>(0))?;
        Ok(Some(match fields {
            Some(projection) => projection.apply(&doc),
            None => doc,
        }))
    }

    async fn update_by_id(
        &self,
        collection: &str,
        id: EntityId,
        patch: &Patch,
    ) -> DiveLogResult<Option<Document>> {
        let mut conn = self.get_conn().await?;
        let tx = conn.transaction().await.map_err(query_error)?;
        let uuid = id.as_uuid();

        let row = tx
            .query_opt(
                &format!("SELECT doc FROM {TABLE} WHERE collection = $1 AND id = $2 FOR UPDATE"),
                &[&collection, &uuid],
            )
            .await
            .map_err(query_error)?;
        let Some(row) = row else {
            return Ok(None);
        };

        let mut doc = into_document(collection, row.get::<_, Value>(0))?;
        patch.apply(&mut doc)?;
        let body = Value::Object(doc.clone());

        tx.execute(
            &format!("UPDATE {TABLE} SET doc = $3 WHERE collection = $1 AND id = $2"),
            &[&collection, &uuid, &body],
        )
        .await
        .map_err(query_error)?;
        tx.commit().await.map_err(query_error)?;
        Ok(Some(doc))
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Patch,
    ) -> DiveLogResult<u64> {
        let mut conn = self.get_conn().await?;
        let tx = conn.transaction().await.map_err(query_error)?;

        let (tail, values) = pushdown(filter, 2);
        let sql = format!(
            "SELECT doc FROM {TABLE} WHERE collection = $1{tail} ORDER BY seq FOR UPDATE"
        );
        let mut params: Vec<&(dyn ToSql + Sync)> = vec![&collection];
        params.extend(values.iter().map(|v| v as &(dyn ToSql + Sync)));
        let rows = tx.query(sql.as_str(), &params).await.map_err(query_error)?;

        let update_sql = format!("UPDATE {TABLE} SET doc = $3 WHERE collection = $1 AND id = $2");
        let mut matched = 0u64;
        for row in rows {
            let mut doc = into_document(collection, row.get::<_, Value>(0))?;
            if !filter.matches(&doc) {
                continue;
            }
            let Some(id) = document_id(&doc) else {
                return Err(decode_error(collection, "stored document has no id"));
            };
            patch.apply(&mut doc)?;
            let uuid = id.as_uuid();
            let body = Value::Object(doc);
            tx.execute(update_sql.as_str(), &[&collection, &uuid, &body])
                .await
                .map_err(query_error)?;
            matched += 1;
        }

        tx.commit().await.map_err(query_error)?;
        Ok(matched)
    }

    async fn delete_by_id(
        &self,
        collection: &str,
        id: EntityId,
    ) -> DiveLogResult<Option<Document>> {
        let conn = self.get_conn().await?;
        let uuid = id.as_uuid();
        let row = conn
            .query_opt(
                &format!("DELETE FROM {TABLE} WHERE collection = $1 AND id = $2 RETURNING doc"),
                &[&collection, &uuid],
            )
            .await
            .map_err(query_error)?;
        row.map(|row| into_document(collection, row.get::<_, Value>(0)))
            .transpose()
    }

    async fn drop_all(&self) -> DiveLogResult<()> {
        let conn = self.get_conn().await?;
        conn.batch_execute(&format!("TRUNCATE {TABLE}"))
            .await
            .map_err(query_error)
    }

    async fn close(&self) -> DiveLogResult<()> {
        self.pool.close();
        Ok(())
    }
}
