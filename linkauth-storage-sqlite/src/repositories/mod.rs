//! Repository implementations for SQLite storage

pub mod application;
pub mod token;

pub use application::SqliteApplicationRepository;
pub use token::SqliteTokenRepository;

use async_trait::async_trait;
use linkauth_core::{
    Error,
    error::StorageError,
    repositories::{ApplicationRepositoryProvider, RepositoryProvider, TokenRepositoryProvider},
};
use linkauth_migration::MigrationManager;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use std::time::Duration;

use crate::migrations::{self, SqliteMigrationManager};

/// Repository provider implementation for SQLite
///
/// Both repositories share one pool.
pub struct SqliteRepositoryProvider {
    pool: SqlitePool,
    application: Arc<SqliteApplicationRepository>,
    token: Arc<SqliteTokenRepository>,
}

impl SqliteRepositoryProvider {
    pub fn new(pool: SqlitePool) -> Self {
        let application = Arc::new(SqliteApplicationRepository::new(pool.clone()));
        let token = Arc::new(SqliteTokenRepository::new(pool.clone()));

        Self {
            pool,
            application,
            token,
        }
    }

    /// Open a pool for `database_url`. Acquiring a connection gives up after five
    /// seconds so an unreachable database surfaces as an error instead of a hang.
    pub async fn connect(database_url: &str) -> Result<Self, Error> {
        let pool = SqlitePoolOptions::new()
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to connect to SQLite");
                Error::Storage(StorageError::Connection(e.to_string()))
            })?;

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl ApplicationRepositoryProvider for SqliteRepositoryProvider {
    type ApplicationRepo = SqliteApplicationRepository;

    fn application(&self) -> &Self::ApplicationRepo {
        &self.application
    }
}

impl TokenRepositoryProvider for SqliteRepositoryProvider {
    type TokenRepo = SqliteTokenRepository;

    fn token(&self) -> &Self::TokenRepo {
        &self.token
    }
}

#[async_trait]
impl RepositoryProvider for SqliteRepositoryProvider {
    async fn migrate(&self) -> Result<(), Error> {
        let manager = SqliteMigrationManager::new(self.pool.clone());
        let applied = manager.up(&migrations::all()).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to run migrations");
            Error::Storage(StorageError::Migration(e.to_string()))
        })?;

        if applied > 0 {
            tracing::info!(applied, "Database schema updated");
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<(), Error> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;
        Ok(())
    }
}
