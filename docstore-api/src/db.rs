//! PostgreSQL Content Store
//!
//! Connection pooling via deadpool-postgres and the [`ContentStore`]
//! implementation backed by a metadata table plus PostgreSQL large objects.
//!
//! File bytes live in large objects driven through the server-side `lo_*`
//! functions, so every large-object call runs inside the same transaction as
//! the row it belongs to. A failed or dropped transaction rolls back both.

use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolError, RecyclingMethod, Runtime};
use docstore_core::{
    AccessorKind, ContentRef, DocError, DocResult, DocumentId, DocumentMeta, Filter, FilterValue,
};
use docstore_storage::{ContentSink, ContentSource, ContentStore, CHUNK_SIZE};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_postgres::error::SqlState;
use tokio_postgres::types::ToSql;
use tokio_postgres::{NoTls, Row};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

/// Bootstrap schema, embedded at compile time.
const BOOTSTRAP_SQL: &str = include_str!("../sql/docstore_init.sql");

/// `lo_open` mode flags from `libpq/libpq-fs.h`.
const INV_WRITE: i32 = 0x0002_0000;
const INV_READ: i32 = 0x0004_0000;

const COLUMNS: &str =
    "id, owner, grantees, name, mime, is_file, content_oid, public, created_at, size";

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
    /// Metadata table, optionally schema-qualified
    pub table: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "docstore".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
            timeout: Duration::from_secs(30),
            table: "docs.meta".to_string(),
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("DOCSTORE_DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("DOCSTORE_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5432),
            dbname: std::env::var("DOCSTORE_DB_NAME").unwrap_or_else(|_| "docstore".to_string()),
            user: std::env::var("DOCSTORE_DB_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: std::env::var("DOCSTORE_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("DOCSTORE_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(16),
            timeout: Duration::from_secs(
                std::env::var("DOCSTORE_DB_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            table: std::env::var("DOCSTORE_DB_TABLE").unwrap_or_else(|_| "docs.meta".to_string()),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> ApiResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());
        cfg.connect_timeout = Some(self.timeout);

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool_cfg = deadpool_postgres::PoolConfig::new(self.max_size);
        pool_cfg.timeouts.wait = Some(self.timeout);
        cfg.pool = Some(pool_cfg);

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ApiError::database_error(format!("Failed to create pool: {}", e)))?;

        Ok(pool)
    }
}

/// Check that `table` is a plain or schema-qualified SQL identifier.
///
/// The table name is interpolated into statements, so anything beyond
/// `[A-Za-z_][A-Za-z0-9_]*` segments is refused.
pub fn validate_table_name(table: &str) -> ApiResult<()> {
    let parts: Vec<&str> = table.split('.').collect();
    let valid = parts.len() <= 2
        && parts.iter().all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        });
    if valid {
        Ok(())
    } else {
        Err(ApiError::invalid_input(format!("Invalid table name: {}", table)))
    }
}

// ============================================================================
// ERROR MAPPING
// ============================================================================

fn store_error(err: tokio_postgres::Error) -> DocError {
    tracing::error!("Database error: {:?}", err);
    DocError::store_unavailable(err.to_string())
}

fn pool_error(err: PoolError) -> DocError {
    tracing::error!("Connection pool error: {:?}", err);
    DocError::store_unavailable(err.to_string())
}

fn is_undefined_object(err: &tokio_postgres::Error) -> bool {
    err.code() == Some(&SqlState::UNDEFINED_OBJECT)
}

fn filter_param(value: &FilterValue) -> &(dyn ToSql + Sync) {
    match value {
        FilterValue::Text(v) => v,
        FilterValue::Bool(v) => v,
        FilterValue::Timestamp(v) => v,
    }
}

fn row_to_meta(row: &Row) -> DocumentMeta {
    let id: Uuid = row.get("id");
    let content_oid: Option<u32> = row.get("content_oid");
    DocumentMeta {
        id: DocumentId::from(id),
        owner: row.get("owner"),
        grant: row.get("grantees"),
        name: row.get("name"),
        mime: row.get("mime"),
        is_file: row.get("is_file"),
        content_ref: content_oid.map(ContentRef::new),
        public: row.get("public"),
        created_at: row.get("created_at"),
        size: row.get("size"),
    }
}

// ============================================================================
// POSTGRES CONTENT STORE
// ============================================================================

/// Content store backed by PostgreSQL rows and large objects.
#[derive(Clone)]
pub struct PgContentStore {
    pool: Pool,
    table: String,
}

impl PgContentStore {
    /// Create a store over `pool` using `table` for metadata rows.
    pub fn new(pool: Pool, table: impl Into<String>) -> ApiResult<Self> {
        let table = table.into();
        validate_table_name(&table)?;
        Ok(Self { pool, table })
    }

    /// Create a store from configuration.
    pub fn from_config(config: &DbConfig) -> ApiResult<Self> {
        Self::new(config.create_pool()?, config.table.clone())
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Create the schema, table and indexes if they do not exist yet.
    pub async fn migrate(&self) -> ApiResult<()> {
        let conn = self.pool.get().await?;

        if let Some((schema, _)) = self.table.split_once('.') {
            conn.batch_execute(&format!("CREATE SCHEMA IF NOT EXISTS {}", schema))
                .await?;
        }

        let sql = BOOTSTRAP_SQL
            .replace("{{table}}", &self.table)
            .replace("{{index_prefix}}", &self.table.replace('.', "_"));
        conn.batch_execute(&sql).await?;

        tracing::info!(table = %self.table, "Schema ready");
        Ok(())
    }

    async fn get_conn(&self) -> DocResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(pool_error)
    }
}

#[async_trait]
impl ContentStore for PgContentStore {
    async fn save(
        &self,
        owner: &str,
        content: Option<ContentSource<'_>>,
        payload: Option<&[u8]>,
        mut meta: DocumentMeta,
    ) -> DocResult<DocumentMeta> {
        let mut conn = self.get_conn().await?;
        let tx = conn.transaction().await.map_err(store_error)?;

        let (content_oid, payload, size) = if meta.is_file {
            let content = content
                .ok_or_else(|| DocError::invalid_document("file document without content"))?;

            let oid: u32 = tx
                .query_one("SELECT lo_create(0)", &[])
                .await
                .map_err(store_error)?
                .get(0);
            let fd: i32 = tx
                .query_one("SELECT lo_open($1, $2)", &[&oid, &INV_WRITE])
                .await
                .map_err(store_error)?
                .get(0);

            let mut buf = vec![0u8; CHUNK_SIZE];
            let mut size: i64 = 0;
            loop {
                let n = content.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                let chunk: &[u8] = &buf[..n];
                tx.execute("SELECT lowrite($1, $2)", &[&fd, &chunk])
                    .await
                    .map_err(|e| DocError::content_copy_failed(e.to_string()))?;
                size += n as i64;
            }

            tx.execute("SELECT lo_close($1)", &[&fd])
                .await
                .map_err(store_error)?;
            (Some(oid), None, size)
        } else {
            let payload =
                payload.ok_or_else(|| DocError::invalid_document("inline document without payload"))?;
            (None, Some(payload), payload.len() as i64)
        };

        let id = meta.id.as_uuid();
        let sql = format!(
            "INSERT INTO {} (id, owner, grantees, name, mime, is_file, content_oid, payload, public, size) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING created_at",
            self.table
        );
        let row = tx
            .query_one(
                &sql,
                &[
                    &id,
                    &owner,
                    &meta.grant,
                    &meta.name,
                    &meta.mime,
                    &meta.is_file,
                    &content_oid,
                    &payload,
                    &meta.public,
                    &size,
                ],
            )
            .await
            .map_err(store_error)?;

        tx.commit().await.map_err(store_error)?;

        meta.owner = owner.to_string();
        meta.content_ref = content_oid.map(ContentRef::new);
        meta.size = size;
        meta.created_at = row.get(0);

        tracing::debug!(
            document_id = %meta.id,
            owner = %meta.owner,
            content_oid = ?content_oid,
            size,
            "Saved document"
        );
        Ok(meta)
    }

    async fn list(
        &self,
        kind: AccessorKind,
        identity: &str,
        filter: &Filter,
        limit: usize,
    ) -> DocResult<Vec<DocumentMeta>> {
        let accessor = match kind {
            AccessorKind::Owner => "owner = $1",
            AccessorKind::Grantee => "$1 = ANY(grantees)",
        };
        let sql = format!(
            "SELECT {} FROM {} WHERE {} AND {} = $2 ORDER BY created_at DESC, id DESC LIMIT $3",
            COLUMNS,
            self.table,
            accessor,
            filter.key.column()
        );
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let conn = self.get_conn().await?;
        let rows = conn
            .query(&sql, &[&identity, filter_param(&filter.value), &limit])
            .await
            .map_err(store_error)?;

        Ok(rows.iter().map(row_to_meta).collect())
    }

    async fn get_metadata(&self, id: DocumentId) -> DocResult<DocumentMeta> {
        let sql = format!("SELECT {} FROM {} WHERE id = $1", COLUMNS, self.table);
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(&sql, &[&id.as_uuid()])
            .await
            .map_err(store_error)?
            .ok_or_else(|| DocError::not_found(id))?;
        Ok(row_to_meta(&row))
    }

    async fn read_content(&self, content_ref: ContentRef, sink: ContentSink<'_>) -> DocResult<u64> {
        let mut conn = self.get_conn().await?;
        let tx = conn.transaction().await.map_err(store_error)?;

        let oid = content_ref.oid();
        let fd: i32 = match tx
            .query_one("SELECT lo_open($1, $2)", &[&oid, &INV_READ])
            .await
        {
            Ok(row) => row.get(0),
            Err(err) if is_undefined_object(&err) => {
                return Err(DocError::ContentNotFound { content_ref })
            }
            Err(err) => return Err(store_error(err)),
        };

        let chunk_len = CHUNK_SIZE as i32;
        let mut copied: u64 = 0;
        loop {
            let chunk: Vec<u8> = tx
                .query_one("SELECT loread($1, $2)", &[&fd, &chunk_len])
                .await
                .map_err(|e| DocError::content_copy_failed(e.to_string()))?
                .get(0);
            if chunk.is_empty() {
                break;
            }
            sink.write_all(&chunk).await?;
            copied += chunk.len() as u64;
        }
        sink.flush().await?;

        tx.execute("SELECT lo_close($1)", &[&fd])
            .await
            .map_err(store_error)?;
        tx.commit().await.map_err(store_error)?;
        Ok(copied)
    }

    async fn read_payload(&self, id: DocumentId) -> DocResult<Vec<u8>> {
        let sql = format!("SELECT is_file, payload FROM {} WHERE id = $1", self.table);
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(&sql, &[&id.as_uuid()])
            .await
            .map_err(store_error)?
            .ok_or_else(|| DocError::not_found(id))?;

        let is_file: bool = row.get(0);
        if is_file {
            return Err(DocError::invalid_document("file documents have no inline payload"));
        }
        let payload: Option<Vec<u8>> = row.get(1);
        Ok(payload.unwrap_or_default())
    }

    async fn delete(&self, id: DocumentId) -> DocResult<()> {
        let uuid = id.as_uuid();
        let mut conn = self.get_conn().await?;
        let tx = conn.transaction().await.map_err(store_error)?;

        // The row lock keeps a concurrent delete from unlinking the same object.
        let lookup = format!("SELECT content_oid FROM {} WHERE id = $1 FOR UPDATE", self.table);
        let row = tx
            .query_opt(&lookup, &[&uuid])
            .await
            .map_err(store_error)?
            .ok_or_else(|| DocError::not_found(id))?;

        let content_oid: Option<u32> = row.get(0);
        if let Some(oid) = content_oid {
            tx.execute("SELECT lo_unlink($1)", &[&oid])
                .await
                .map_err(store_error)?;
        }

        let delete = format!("DELETE FROM {} WHERE id = $1", self.table);
        let affected = tx.execute(&delete, &[&uuid]).await.map_err(store_error)?;
        if affected == 0 {
            return Err(DocError::not_found(id));
        }

        tx.commit().await.map_err(store_error)?;
        tracing::debug!(document_id = %id, content_oid = ?content_oid, "Deleted document");
        Ok(())
    }

    async fn health_check(&self) -> DocResult<()> {
        let conn = self.get_conn().await?;
        conn.query_one("SELECT 1", &[]).await.map_err(store_error)?;
        Ok(())
    }
}
