//! Schema for the SQLite backend. Timestamps are INTEGER columns: unix seconds,
//! except `tokens.expires_at` which holds unix milliseconds.
use async_trait::async_trait;
use chrono::Utc;
use linkauth_migration::{MIGRATION_TABLE, Migration, MigrationError, MigrationManager, MigrationRecord};
use sqlx::{Sqlite, SqliteConnection, SqlitePool};

/// A migration made of plain SQL statements, run in order.
#[derive(Debug, Clone, Copy)]
pub struct SqliteMigration {
    pub version: i64,
    pub name: &'static str,
    pub up: &'static [&'static str],
    pub down: &'static [&'static str],
}

const MIGRATIONS: [SqliteMigration; 3] = [
    SqliteMigration {
        version: 1,
        name: "CreateApplicationsTable",
        up: &[r#"
            CREATE TABLE IF NOT EXISTS applications (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                admin_email TEXT NOT NULL,
                redirect_url TEXT NOT NULL,
                session_duration INTEGER NOT NULL,
                users_quota INTEGER NOT NULL,
                secret_hash TEXT NOT NULL,
                created_at INTEGER NOT NULL DEFAULT (unixepoch()),
                updated_at INTEGER NOT NULL DEFAULT (unixepoch())
            )"#],
        down: &["DROP TABLE IF EXISTS applications"],
    },
    SqliteMigration {
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
    SqliteMigration {
        version: 3,
        name: "CreateTokensTable",
        up: &[
            r#"
            CREATE TABLE IF NOT EXISTS tokens (
                token TEXT PRIMARY KEY,
                expires_at INTEGER NOT NULL
            )"#,
            "CREATE INDEX IF NOT EXISTS idx_tokens_expires_at ON tokens(expires_at)",
        ],
        down: &["DROP TABLE IF EXISTS tokens"],
    },
];

/// Every migration of this backend, lowest version first.
pub fn all() -> Vec<Box<dyn Migration<Sqlite>>> {
    MIGRATIONS
        .iter()
        .map(|m| Box::new(*m) as Box<dyn Migration<Sqlite>>)
        .collect()
}

async fn run(conn: &mut SqliteConnection, statements: &[&str]) -> Result<(), MigrationError> {
    for &statement in statements {
        sqlx::query(statement).execute(&mut *conn).await?;
    }
    Ok(())
}

#[async_trait]
impl Migration<Sqlite> for SqliteMigration {
    async fn up<'a>(&'a self, conn: &'a mut SqliteConnection) -> Result<(), MigrationError> {
        run(conn, self.up).await
    }

    async fn down<'a>(&'a self, conn: &'a mut SqliteConnection) -> Result<(), MigrationError> {
        run(conn, self.down).await
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn name(&self) -> &str {
        self.name
    }
}

pub struct SqliteMigrationManager {
    pool: SqlitePool,
}

impl SqliteMigrationManager {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MigrationManager<Sqlite> for SqliteMigrationManager {
    async fn initialize(&self) -> Result<(), MigrationError> {
        let statement = format!(
            "CREATE TABLE IF NOT EXISTS {MIGRATION_TABLE} (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at INTEGER NOT NULL
            )"
        );
        sqlx::query(&statement).execute(&self.pool).await?;
        Ok(())
    }

    async fn applied(&self) -> Result<Vec<MigrationRecord>, MigrationError> {
        let statement =
            format!("SELECT version, name, applied_at FROM {MIGRATION_TABLE} ORDER BY version");
        Ok(sqlx::query_as::<_, MigrationRecord>(&statement).fetch_all(&self.pool).await?)
    }

    async fn apply(&self, migration: &dyn Migration<Sqlite>) -> Result<(), MigrationError> {
        let mut tx = self.pool.begin().await?;
        migration.up(&mut *tx).await?;

        let statement =
            format!("INSERT INTO {MIGRATION_TABLE} (version, name, applied_at) VALUES (?1, ?2, ?3)");
        sqlx::query(&statement)
            .bind(migration.version())
            .bind(migration.name())
            .bind(Utc::now().timestamp())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn revert(&self, migration: &dyn Migration<Sqlite>) -> Result<(), MigrationError> {
        let mut tx = self.pool.begin().await?;
        migration.down(&mut *tx).await?;

        let statement = format!("DELETE FROM {MIGRATION_TABLE} WHERE version = ?1");
        sqlx::query(&statement)
            .bind(migration.version())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
