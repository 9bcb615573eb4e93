//! Repository implementations for PostgreSQL storage

pub mod application;
pub mod token;

pub use application::PostgresApplicationRepository;
pub use token::PostgresTokenRepository;

use async_trait::async_trait;
use linkauth_core::{
    Error,
    error::StorageError,
    repositories::{ApplicationRepositoryProvider, RepositoryProvider, TokenRepositoryProvider},
};
use linkauth_migration::MigrationManager;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;

use crate::migrations::{self, PostgresMigrationManager};

/// Repository provider implementation for PostgreSQL
///
/// Both repositories share one pool.
pub struct PostgresRepositoryProvider {
    pool: PgPool,
    application: Arc<PostgresApplicationRepository>,
    token: Arc<PostgresTokenRepository>,
}

impl PostgresRepositoryProvider {
    pub fn new(pool: PgPool) -> Self {
        let application = Arc::new(PostgresApplicationRepository::new(pool.clone()));
        let token = Arc::new(PostgresTokenRepository::new(pool.clone()));

        Self {
            pool,
            application,
            token,
        }
    }

    /// Open a pool for `database_url`. Acquiring a connection gives up after five
    /// seconds so an unreachable database surfaces as an error instead of a hang.
    pub async fn connect(database_url: &str) -> Result<Self, Error> {
        let pool = PgPoolOptions::new()
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to connect to Postgres");
                Error::Storage(StorageError::Connection(e.to_string()))
            })?;

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl ApplicationRepositoryProvider for PostgresRepositoryProvider {
    type ApplicationRepo = PostgresApplicationRepository;

    fn application(&self) -> &Self::ApplicationRepo {
        &self.application
    }
}

impl TokenRepositoryProvider for PostgresRepositoryProvider {
    type TokenRepo = PostgresTokenRepository;

    fn token(&self) -> &Self::TokenRepo {
        &self.token
    }
}

#[async_trait]
impl RepositoryProvider for PostgresRepositoryProvider {
    async fn migrate(&self) -> Result<(), Error> {
        let manager = PostgresMigrationManager::new(self.pool.clone());
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
