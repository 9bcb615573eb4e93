use async_trait::async_trait;
use chrono::{DateTime, Utc};
use linkauth_core::{Error, error::StorageError, repositories::TokenRepository};
use sqlx::SqlitePool;

pub struct SqliteTokenRepository {
    pool: SqlitePool,
}

impl SqliteTokenRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenRepository for SqliteTokenRepository {
    async fn get_token_expiry(&self, token: &str) -> Result<Option<DateTime<Utc>>, Error> {
        let expires_at: Option<i64> =
            sqlx::query_scalar("SELECT expires_at FROM tokens WHERE token = ?1")
                .bind(token)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        expires_at
            .map(|millis| {
                DateTime::from_timestamp_millis(millis).ok_or_else(|| {
                    Error::Storage(StorageError::Database(format!(
                        "Invalid token expiry {millis}"
                    )))
                })
            })
            .transpose()
    }

    async fn put_token(&self, token: &str, expires_at: DateTime<Utc>) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO tokens (token, expires_at) VALUES (?1, ?2)
            ON CONFLICT(token) DO UPDATE SET expires_at = excluded.expires_at
            "#,
        )
        .bind(token)
        .bind(expires_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        Ok(())
    }

    async fn delete_token(&self, token: &str) -> Result<bool, Error> {
        let result = sqlx::query("DELETE FROM tokens WHERE token = ?1")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_tokens_by_prefix(&self, prefix: &str) -> Result<u64, Error> {
        if prefix.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query("DELETE FROM tokens WHERE substr(token, 1, length(?1)) = ?1")
            .bind(prefix)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        Ok(result.rows_affected())
    }

    async fn delete_expired_tokens(&self, now: DateTime<Utc>) -> Result<u64, Error> {
        let result = sqlx::query("DELETE FROM tokens WHERE expires_at < ?1")
            .bind(now.timestamp_millis())
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        Ok(result.rows_affected())
    }

    async fn count_tokens_by_prefix(&self, prefix: &str) -> Result<u64, Error> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM tokens WHERE substr(token, 1, length(?1)) = ?1",
        )
        .bind(prefix)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        Ok(count as u64)
    }
}
