//! SQLite blob store for raw document bytes.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::domain::errors::DomainResult;
use crate::domain::ports::BlobStore;

#[derive(Clone)]
pub struct SqliteBlobStore {
    pool: SqlitePool,
}

impl SqliteBlobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BlobStore for SqliteBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO blobs (key, bytes, size_bytes) VALUES (?, ?, ?)
               ON CONFLICT(key) DO UPDATE SET bytes = excluded.bytes, size_bytes = excluded.size_bytes"#
        )
        .bind(key)
        .bind(bytes)
        .bind(bytes.len() as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> DomainResult<Option<Vec<u8>>> {
        let row: Option<(Vec<u8>,)> = sqlx::query_as("SELECT bytes FROM blobs WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(bytes,)| bytes))
    }

    async fn delete(&self, key: &str) -> DomainResult<bool> {
        let result = sqlx::query("DELETE FROM blobs WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
