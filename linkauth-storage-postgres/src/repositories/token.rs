use async_trait::async_trait;
use chrono::{DateTime, Utc};
use linkauth_core::{Error, error::StorageError, repositories::TokenRepository};
use sqlx::PgPool;

pub struct PostgresTokenRepository {
    pool: PgPool,
}

impl PostgresTokenRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenRepository for PostgresTokenRepository {
    async fn get_token_expiry(&self, token: &str) -> Result<Option<DateTime<Utc>>, Error> {
        let expires_at = sqlx::query_scalar("SELECT expires_at FROM tokens WHERE token = $1")
            .bind(token)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to get token");
                StorageError::Database("Failed to get token".to_string())
            })?;

        Ok(expires_at)
    }

    async fn put_token(&self, token: &str, expires_at: DateTime<Utc>) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO tokens (token, expires_at) VALUES ($1, $2)
            ON CONFLICT (token) DO UPDATE SET expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(token)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to store token");
            StorageError::Database("Failed to store token".to_string())
        })?;

        Ok(())
    }

    async fn delete_token(&self, token: &str) -> Result<bool, Error> {
        let result = sqlx::query("DELETE FROM tokens WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to delete token");
                StorageError::Database("Failed to delete token".to_string())
            })?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_tokens_by_prefix(&self, prefix: &str) -> Result<u64, Error> {
        if prefix.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query("DELETE FROM tokens WHERE starts_with(token, $1)")
            .bind(prefix)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to delete tokens by prefix");
                StorageError::Database("Failed to delete tokens by prefix".to_string())
            })?;

        Ok(result.rows_affected())
    }

    async fn delete_expired_tokens(&self, now: DateTime<Utc>) -> Result<u64, Error> {
        let result = sqlx::query("DELETE FROM tokens WHERE expires_at < $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to delete expired tokens");
                StorageError::Database("Failed to delete expired tokens".to_string())
            })?;

        Ok(result.rows_affected())
    }

    async fn count_tokens_by_prefix(&self, prefix: &str) -> Result<u64, Error> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tokens WHERE starts_with(token, $1)")
            .bind(prefix)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to count tokens");
                StorageError::Database("Failed to count tokens".to_string())
            })?;

        Ok(count as u64)
    }
}
