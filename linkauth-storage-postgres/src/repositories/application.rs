use async_trait::async_trait;
use chrono::{DateTime, Utc};
use linkauth_core::{
    Application, Error, crypto::constant_time_compare, error::StorageError,
    repositories::ApplicationRepository,
};
use sqlx::PgPool;

pub struct PostgresApplicationRepository {
    pool: PgPool,
}

impl PostgresApplicationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct PostgresApplication {
    id: String,
    name: String,
    admin_email: String,
    redirect_url: String,
    session_duration: i64,
    users_quota: i64,
    secret_hash: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PostgresApplication> for Application {
    fn from(row: PostgresApplication) -> Self {
        Application {
            id: row.id,
            name: row.name,
            admin_email: row.admin_email,
            redirect_url: row.redirect_url,
            session_duration: row.session_duration,
            users_quota: u64::try_from(row.users_quota).unwrap_or_default(),
            secret_hash: row.secret_hash,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl ApplicationRepository for PostgresApplicationRepository {
    async fn get_app_by_id(&self, app_id: &str) -> Result<Option<Application>, Error> {
        let row = sqlx::query_as::<_, PostgresApplication>(
            "SELECT * FROM applications WHERE id = $1",
        )
        .bind(app_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to get application");
            StorageError::Database("Failed to get application".to_string())
        })?;

        Ok(row.map(Application::from))
    }

    async fn get_app_by_secret_hash(
        &self,
        secret_hash: &str,
    ) -> Result<Option<Application>, Error> {
        let row = sqlx::query_as::<_, PostgresApplication>(
            r#"
            SELECT a.*
            FROM applications a
            JOIN app_secrets s ON s.app_id = a.id
            WHERE s.secret_hash = $1
            "#,
        )
        .bind(secret_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to get application by secret");
            StorageError::Database("Failed to get application by secret".to_string())
        })?;

        Ok(row.map(Application::from))
    }

    async fn put_app(&self, app: &Application) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO applications (id, name, admin_email, redirect_url, session_duration, users_quota, secret_hash, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                admin_email = EXCLUDED.admin_email,
                redirect_url = EXCLUDED.redirect_url,
                session_duration = EXCLUDED.session_duration,
                users_quota = EXCLUDED.users_quota,
                secret_hash = EXCLUDED.secret_hash,
                created_at = EXCLUDED.created_at,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&app.id)
        .bind(&app.name)
        .bind(&app.admin_email)
        .bind(&app.redirect_url)
        .bind(app.session_duration)
        .bind(i64::try_from(app.users_quota).unwrap_or(i64::MAX))
        .bind(&app.secret_hash)
        .bind(app.created_at)
        .bind(app.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to store application");
            StorageError::Database("Failed to store application".to_string())
        })?;

        Ok(())
    }

    async fn delete_app(&self, app_id: &str) -> Result<bool, Error> {
        let result = sqlx::query("DELETE FROM applications WHERE id = $1")
            .bind(app_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to delete application");
                StorageError::Database("Failed to delete application".to_string())
            })?;

        Ok(result.rows_affected() > 0)
    }

    async fn verify_secret(&self, secret_hash: &str, app_id: &str) -> Result<bool, Error> {
        let stored: Option<String> =
            sqlx::query_scalar("SELECT app_id FROM app_secrets WHERE secret_hash = $1")
                .bind(secret_hash)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, "Failed to verify secret");
                    StorageError::Database("Failed to verify secret".to_string())
                })?;

        Ok(stored.is_some_and(|stored| constant_time_compare(stored.as_bytes(), app_id.as_bytes())))
    }

    async fn put_secret(&self, secret_hash: &str, app_id: &str) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO app_secrets (secret_hash, app_id) VALUES ($1, $2)
            ON CONFLICT (secret_hash) DO UPDATE SET app_id = EXCLUDED.app_id
            "#,
        )
        .bind(secret_hash)
        .bind(app_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to store secret");
            StorageError::Database("Failed to store secret".to_string())
        })?;

        Ok(())
    }

    async fn delete_secret(&self, secret_hash: &str) -> Result<bool, Error> {
        let result = sqlx::query("DELETE FROM app_secrets WHERE secret_hash = $1")
            .bind(secret_hash)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to delete secret");
                StorageError::Database("Failed to delete secret".to_string())
            })?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_secrets_by_app(&self, app_id: &str) -> Result<u64, Error> {
        let result = sqlx::query("DELETE FROM app_secrets WHERE app_id = $1")
            .bind(app_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to delete secrets");
                StorageError::Database("Failed to delete secrets".to_string())
            })?;

        Ok(result.rows_affected())
    }
}
