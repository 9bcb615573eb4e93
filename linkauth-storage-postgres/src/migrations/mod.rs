//! Schema for the PostgreSQL backend. Expiries and timestamps are TIMESTAMPTZ; the
//! tracking table keeps unix seconds like every other backend.
use async_trait::async_trait;
use chrono::Utc;
use linkauth_migration::{MIGRATION_TABLE, Migration, MigrationError, MigrationManager, MigrationRecord};
use sqlx::{PgConnection, PgPool, Postgres};

/// A migration made of plain SQL statements, run in order.
#[derive(Debug, Clone, Copy)]
pub struct PostgresMigration {
    pub version: i64,
    pub name: &'static str,
    pub up: &'static [&'static str],
    pub down: &'static [&'static str],
}

const MIGRATIONS: [PostgresMigration; 3] = [
    PostgresMigration {
        version: 1,
        name: "CreateApplicationsTable",
        up: &[r#"
            CREATE TABLE IF NOT EXISTS applications (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                admin_email TEXT NOT NULL,
                redirect_url TEXT NOT NULL,
                session_duration BIGINT NOT NULL,
                users_quota BIGINT NOT NULL,
                secret_hash TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )"#],
        down: &["DROP TABLE IF EXISTS applications"],
    },
    PostgresMigration {
        version: 2,
        name: "CreateAppSecretsTable",
        up: &[
            r#"
            CREATE TABLE IF NOT EXISTS app_secrets (
                secret_hash TEXT PRIMARY KEY,
                app_id TEXT NOT NULL
            )"#,
            "CREATE INDEX IF NOT EXISTS idx_app_secrets_app_id ON app_secrets(app_id)",
        ],
        down: &["DROP TABLE IF EXISTS app_secrets"],
    },
    PostgresMigration {
        version: 3,
        name: "CreateTokensTable",
        up: &[
            r#"
            CREATE TABLE IF NOT EXISTS tokens (
                token TEXT PRIMARY KEY,
                expires_at TIMESTAMPTZ NOT NULL
            )"#,
            "CREATE INDEX IF NOT EXISTS idx_tokens_expires_at ON tokens(expires_at)",
        ],
        down: &["DROP TABLE IF EXISTS tokens"],
    },
];

/// Every migration of this backend, lowest version first.
pub fn all() -> Vec<Box<dyn Migration<Postgres>>> {
    MIGRATIONS
        .iter()
        .map(|m| Box::new(*m) as Box<dyn Migration<Postgres>>)
        .collect()
}

async fn run(conn: &mut PgConnection, statements: &[&str]) -> Result<(), MigrationError> {
    for &statement in statements {
        sqlx::query(statement).execute(&mut *conn).await?;
    }
    Ok(())
}

#[async_trait]
impl Migration<Postgres> for PostgresMigration {
    async fn up<'a>(&'a self, conn: &'a mut PgConnection) -> Result<(), MigrationError> {
        run(conn, self.up).await
    }

    async fn down<'a>(&'a self, conn: &'a mut PgConnection) -> Result<(), MigrationError> {
        run(conn, self.down).await
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn name(&self) -> &str {
        self.name
    }
}

pub struct PostgresMigrationManager {
    pool: PgPool,
}

impl PostgresMigrationManager {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MigrationManager<Postgres> for PostgresMigrationManager {
    async fn initialize(&self) -> Result<(), MigrationError> {
        let statement = format!(
            "CREATE TABLE IF NOT EXISTS {MIGRATION_TABLE} (
                version BIGINT PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at BIGINT NOT NULL
            )"
        );
        sqlx::query(&statement).execute(&self.pool).await?;
        Ok(())
    }

    async fn applied(&self) -> Result<Vec<MigrationRecord>, MigrationError> {
        let statement =
            format!("SELECT version, name, applied_at FROM {MIGRATION_TABLE} ORDER BY version");
        Ok(sqlx::query_as::<_, MigrationRecord>(&statement)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn apply(&self, migration: &dyn Migration<Postgres>) -> Result<(), MigrationError> {
        let mut tx = self.pool.begin().await?;
        migration.up(&mut *tx).await?;

        let statement =
            format!("INSERT INTO {MIGRATION_TABLE} (version, name, applied_at) VALUES ($1, $2, $3)");
        sqlx::query(&statement)
            .bind(migration.version())
            .bind(migration.name())
            .bind(Utc::now().timestamp())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn revert(&self, migration: &dyn Migration<Postgres>) -> Result<(), MigrationError> {
        let mut tx = self.pool.begin().await?;
        migration.down(&mut *tx).await?;

        let statement = format!("DELETE FROM {MIGRATION_TABLE} WHERE version = $1");
        sqlx::query(&statement)
            .bind(migration.version())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
