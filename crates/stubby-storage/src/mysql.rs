use async_trait::async_trait;
use jiff::Timestamp;
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlPool, Row};
use stubby_core::repository::{NewUrlMapping, ReadRepository, Repository, Result, UrlMapping};
use stubby_core::{ShortCode, StorageError};
use tracing::debug;

/// Schema of the `url_mapping` table.
pub const SCHEMA: &str = include_str!("../ddl/mysql/url_mapping.sql");

/// MySQL implementation of the repository contract.
///
/// Soft delete is implemented with `is_deleted`. The unique key covers a
/// generated column that only holds the code of non-deleted rows, so a
/// deleted code can be inserted again while every row is kept for history.
/// Codes compare case-sensitively (`utf8mb4_bin`). Timestamps are stored as
/// unix milliseconds.
#[derive(Debug, Clone)]
pub struct MySqlRepository {
    pool: MySqlPool,
}

impl MySqlRepository {
    /// Creates a repository from an existing MySQL connection pool.
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Creates a repository by opening a new MySQL connection pool.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = MySqlPool::connect(database_url)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Self::new(pool))
    }

    /// Creates the `url_mapping` table if it does not exist.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        debug!("url_mapping schema is in place");
        Ok(())
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    async fn soft_delete_expired(&self, code: &ShortCode, now_millis: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE url_mapping
            SET is_deleted = 1,
                updated_at = ?
            WHERE short_code = ?
              AND is_deleted = 0
              AND expire_at IS NOT NULL
              AND expire_at <= ?
            "#,
        )
        .bind(now_millis)
        .bind(code.as_str())
        .bind(now_millis)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}

fn now_unix_millis() -> i64 {
    Timestamp::now().as_millisecond()
}

fn parse_millis(column: &str, millis: i64) -> Result<Timestamp> {
    Timestamp::from_millisecond(millis).map_err(|e| {
        StorageError::InvalidData(format!("invalid {column} timestamp '{millis}': {e}"))
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(sqlx::error::DatabaseError::is_unique_violation)
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolTimedOut => StorageError::Timeout(message),
        sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StorageError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StorageError::InvalidData(message),
        _ => StorageError::Query(message),
    }
}

fn mapping_from_row(row: &MySqlRow) -> Result<UrlMapping> {
    let short_code: String = row.try_get("short_code").map_err(map_sqlx_error)?;
    let short_code = ShortCode::new(short_code)
        .map_err(|e| StorageError::InvalidData(e.to_string()))?;
    let expire_at: Option<i64> = row.try_get("expire_at").map_err(map_sqlx_error)?;
    let created_at: i64 = row.try_get("created_at").map_err(map_sqlx_error)?;
    let updated_at: i64 = row.try_get("updated_at").map_err(map_sqlx_error)?;
    let is_deleted: i8 = row.try_get("is_deleted").map_err(map_sqlx_error)?;

    Ok(UrlMapping {
        id: row.try_get("id").map_err(map_sqlx_error)?,
        short_code,
        original_url: row.try_get("original_url").map_err(map_sqlx_error)?,
        expire_at: expire_at
            .map(|millis| parse_millis("expire_at", millis))
            .transpose()?,
        access_count: row.try_get("access_count").map_err(map_sqlx_error)?,
        created_at: parse_millis("created_at", created_at)?,
        updated_at: parse_millis("updated_at", updated_at)?,
        deleted: is_deleted != 0,
    })
}

#[async_trait]
impl ReadRepository for MySqlRepository {
    async fn find_by_code(&self, code: &ShortCode) -> Result<Option<UrlMapping>> {
        let row = sqlx::query(
            r#"
            SELECT id, short_code, original_url, expire_at, access_count,
                   created_at, updated_at, is_deleted
            FROM url_mapping
            WHERE short_code = ?
              AND is_deleted = 0
            LIMIT 1
            "#,
        )
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.as_ref().map(mapping_from_row).transpose()
    }

    async fn exists(&self, code: &ShortCode) -> Result<bool> {
        let exists = sqlx::query(
            r#"
            SELECT 1
            FROM url_mapping
            WHERE short_code = ?
              AND is_deleted = 0
              AND (expire_at IS NULL OR expire_at > ?)
            LIMIT 1
            "#,
        )
        .bind(code.as_str())
        .bind(now_unix_millis())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?
        .is_some();

        Ok(exists)
    }
}

#[async_trait]
impl Repository for MySqlRepository {
    async fn insert(&self, mapping: NewUrlMapping) -> Result<u64> {
        let now = now_unix_millis();
        let purged = self.soft_delete_expired(&mapping.short_code, now).await?;
        if purged > 0 {
            debug!(code = %mapping.short_code, "Soft-deleted expired mapping before reuse");
        }
        let expire_at = mapping.expire_at.map(|ts| ts.as_millisecond());

        let result = sqlx::query(
            r#"
            INSERT INTO url_mapping
                (short_code, original_url, expire_at, access_count, created_at, updated_at, is_deleted)
            VALUES (?, ?, ?, 0, ?, ?, 0)
            "#,
        )
        .bind(mapping.short_code.as_str())
        .bind(&mapping.original_url)
        .bind(expire_at)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => Ok(done.last_insert_id()),
            Err(err) if is_unique_violation(&err) => {
                Err(StorageError::Conflict(mapping.short_code.to_string()))
            }
            Err(err) => Err(map_sqlx_error(err)),
        }
    }

    async fn increment_access_count(&self, id: u64, delta: u64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE url_mapping
            SET access_count = access_count + ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(delta)
        .bind(now_unix_millis())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn delete(&self, code: &ShortCode) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE url_mapping
            SET is_deleted = 1,
                updated_at = ?
            WHERE short_code = ?
              AND is_deleted = 0
            "#,
        )
        .bind(now_unix_millis())
        .bind(code.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_expired(&self, code: &ShortCode, now: Timestamp) -> Result<bool> {
        let affected = self.soft_delete_expired(code, now.as_millisecond()).await?;
        Ok(affected > 0)
    }
}
