use async_trait::async_trait;
use chrono::DateTime;
use linkauth_core::{
    Application, Error, crypto::constant_time_compare, error::StorageError,
    repositories::ApplicationRepository,
};
use sqlx::SqlitePool;

pub struct SqliteApplicationRepository {
    pool: SqlitePool,
}

impl SqliteApplicationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct SqliteApplication {
    id: String,
    name: String,
    admin_email: String,
    redirect_url: String,
    session_duration: i64,
    users_quota: i64,
    secret_hash: String,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<SqliteApplication> for Application {
    type Error = Error;

    fn try_from(row: SqliteApplication) -> Result<Self, Self::Error> {
        let timestamp = |secs: i64| {
            DateTime::from_timestamp(secs, 0).ok_or_else(|| {
                Error::Storage(StorageError::Database(format!(
                    "Invalid timestamp {secs} for application {}",
                    row.id
                )))
            })
        };

        Ok(Application {
            created_at: timestamp(row.created_at)?,
            updated_at: timestamp(row.updated_at)?,
            users_quota: u64::try_from(row.users_quota).unwrap_or_default(),
            id: row.id,
            name: row.name,
            admin_email: row.admin_email,
            redirect_url: row.redirect_url,
            session_duration: row.session_duration,
            secret_hash: row.secret_hash,
        })
    }
}

#[async_trait]
impl ApplicationRepository for SqliteApplicationRepository {
    async fn get_app_by_id(&self, app_id: &str) -> Result<Option<Application>, Error> {
        sqlx::query_as::<_, SqliteApplication>("SELECT * FROM applications WHERE id = ?1")
            .bind(app_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?
            .map(Application::try_from)
            .transpose()
    }

    async fn get_app_by_secret_hash(
        &self,
        secret_hash: &str,
    ) -> Result<Option<Application>, Error> {
        sqlx::query_as::<_, SqliteApplication>(
            r#"
            SELECT a.*
            FROM applications a
            JOIN app_secrets s ON s.app_id = a.id
            WHERE s.secret_hash = ?1
            "#,
        )
        .bind(secret_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?
        .map(Application::try_from)
        .transpose()
    }

    async fn put_app(&self, app: &Application) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO applications (id, name, admin_email, redirect_url, session_duration, users_quota, secret_hash, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                admin_email = excluded.admin_email,
                redirect_url = excluded.redirect_url,
                session_duration = excluded.session_duration,
                users_quota = excluded.users_quota,
                secret_hash = excluded.secret_hash,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&app.id)
        .bind(&app.name)
        .bind(&app.admin_email)
        .bind(&app.redirect_url)
        .bind(app.session_duration)
        .bind(i64::try_from(app.users_quota).unwrap_or(i64::MAX))
        .bind(&app.secret_hash)
        .bind(app.created_at.timestamp())
        .bind(app.updated_at.timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        Ok(())
    }

    async fn delete_app(&self, app_id: &str) -> Result<bool, Error> {
        let result = sqlx::query("DELETE FROM applications WHERE id = ?1")
            .bind(app_id)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        Ok(result.rows_affected() > 0)
    }

    async fn verify_secret(&self, secret_hash: &str, app_id: &str) -> Result<bool, Error> {
        let stored = sqlx::query_scalar::<_, String>(
            "SELECT app_id FROM app_secrets WHERE secret_hash = ?1",
        )
        .bind(secret_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        Ok(stored.is_some_and(|stored| constant_time_compare(stored.as_bytes(), app_id.as_bytes())))
    }

    async fn put_secret(&self, secret_hash: &str, app_id: &str) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO app_secrets (secret_hash, app_id) VALUES (?1, ?2)
            ON CONFLICT(secret_hash) DO UPDATE SET app_id = excluded.app_id
            "#,
        )
        .bind(secret_hash)
        .bind(app_id)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        Ok(())
    }

    async fn delete_secret(&self, secret_hash: &str) -> Result<bool, Error> {
        let result = sqlx::query("DELETE FROM app_secrets WHERE secret_hash = ?1")
            .bind(secret_hash)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_secrets_by_app(&self, app_id: &str) -> Result<u64, Error> {
        let result = sqlx::query("DELETE FROM app_secrets WHERE app_id = ?1")
            .bind(app_id)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        Ok(result.rows_affected())
    }
}
