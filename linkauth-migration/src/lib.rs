//! Versioned schema migrations shared by the SQL storage backends.
//!
//! A backend implements the four primitives of [`MigrationManager`] for its database
//! and lists its [`Migration`]s. Applied versions are recorded in a tracking table,
//! so [`MigrationManager::up`] can be run on every start.
use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Database;
use thiserror::Error;

/// Name of the table recording applied versions.
pub const MIGRATION_TABLE: &str = "_linkauth_migrations";

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Migration failed: {0}")]
    Migration(String),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, MigrationError>;

#[async_trait]
pub trait Migration<DB: Database>: Send + Sync {
    async fn up<'a>(&'a self, conn: &'a mut <DB as Database>::Connection) -> Result<()>;

    async fn down<'a>(&'a self, conn: &'a mut <DB as Database>::Connection) -> Result<()>;

    /// Unique, orders migrations
    fn version(&self) -> i64;

    fn name(&self) -> &str;
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    /// Unix seconds, stored the same way by every backend.
    pub applied_at: i64,
}

impl MigrationRecord {
    pub fn applied_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.applied_at, 0)
    }
}

#[async_trait]
pub trait MigrationManager<DB: Database>: Send + Sync {
    /// Create the tracking table if it does not exist.
    async fn initialize(&self) -> Result<()>;

    /// Applied migrations, lowest version first.
    async fn applied(&self) -> Result<Vec<MigrationRecord>>;

    /// Run `migration` and record it in one transaction.
    async fn apply(&self, migration: &dyn Migration<DB>) -> Result<()>;

    /// Roll back `migration` and remove its record in one transaction.
    async fn revert(&self, migration: &dyn Migration<DB>) -> Result<()>;

    /// Apply every migration that is not recorded yet, lowest version first.
    /// Returns how many ran.
    async fn up(&self, migrations: &[Box<dyn Migration<DB>>]) -> Result<usize> {
        check_versions(migrations)?;
        self.initialize().await?;

        let applied = self.applied_versions().await?;
        let mut pending: Vec<&dyn Migration<DB>> = migrations
            .iter()
            .map(|m| m.as_ref())
            .filter(|m| !applied.contains(&m.version()))
            .collect();
        pending.sort_by_key(|m| m.version());

        for migration in &pending {
            tracing::info!(
                version = migration.version(),
                name = migration.name(),
                "Applying migration"
            );
            self.apply(*migration).await?;
        }
        Ok(pending.len())
    }

    /// Roll back those of `migrations` that are recorded, highest version first.
    /// Returns how many were rolled back.
    async fn down(&self, migrations: &[Box<dyn Migration<DB>>]) -> Result<usize> {
        self.initialize().await?;

        let applied = self.applied_versions().await?;
        let mut recorded: Vec<&dyn Migration<DB>> = migrations
            .iter()
            .map(|m| m.as_ref())
            .filter(|m| applied.contains(&m.version()))
            .collect();
        recorded.sort_by_key(|m| std::cmp::Reverse(m.version()));

        for migration in &recorded {
            tracing::info!(
                version = migration.version(),
                name = migration.name(),
                "Rolling back migration"
            );
            self.revert(*migration).await?;
        }
        Ok(recorded.len())
    }

    async fn applied_versions(&self) -> Result<HashSet<i64>> {
        Ok(self.applied().await?.into_iter().map(|r| r.version).collect())
    }
}

/// Fails if two migrations share a version; [`MigrationManager::up`] would
/// otherwise skip the second one silently.
pub fn check_versions<DB: Database>(migrations: &[Box<dyn Migration<DB>>]) -> Result<()> {
    let mut seen = HashSet::new();
    for migration in migrations {
        if !seen.insert(migration.version()) {
            return Err(MigrationError::Migration(format!(
                "Duplicate migration version {} ({})",
                migration.version(),
                migration.name()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    type Any = sqlx::Any;

    struct Noop(i64);

    #[async_trait]
    impl Migration<Any> for Noop {
        async fn up<'a>(&'a self, _conn: &'a mut <Any as Database>::Connection) -> Result<()> {
            Ok(())
        }

        async fn down<'a>(&'a self, _conn: &'a mut <Any as Database>::Connection) -> Result<()> {
            Ok(())
        }

        fn version(&self) -> i64 {
            self.0
        }

        fn name(&self) -> &str {
            "Noop"
        }
    }

    /// Keeps records in memory and logs every apply and revert.
    #[derive(Default)]
    struct RecordingManager {
        records: Mutex<Vec<MigrationRecord>>,
        calls: Mutex<Vec<String>>,
    }

    impl RecordingManager {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MigrationManager<Any> for RecordingManager {
        async fn initialize(&self) -> Result<()> {
            Ok(())
        }

        async fn applied(&self) -> Result<Vec<MigrationRecord>> {
            let mut records = self.records.lock().unwrap().clone();
            records.sort_by_key(|r| r.version);
            Ok(records)
        }

        async fn apply(&self, migration: &dyn Migration<Any>) -> Result<()> {
            self.calls.lock().unwrap().push(format!("up {}", migration.version()));
            self.records.lock().unwrap().push(MigrationRecord {
                version: migration.version(),
                name: migration.name().to_string(),
                applied_at: 0,
            });
            Ok(())
        }

        async fn revert(&self, migration: &dyn Migration<Any>) -> Result<()> {
            self.calls.lock().unwrap().push(format!("down {}", migration.version()));
            self.records
                .lock()
                .unwrap()
                .retain(|r| r.version != migration.version());
            Ok(())
        }
    }

    fn migrations(versions: &[i64]) -> Vec<Box<dyn Migration<Any>>> {
        versions
            .iter()
            .map(|v| Box::new(Noop(*v)) as Box<dyn Migration<Any>>)
            .collect()
    }

    #[tokio::test]
    async fn test_up_runs_pending_in_order() {
        let manager = RecordingManager::default();

        assert_eq!(manager.up(&migrations(&[2, 1])).await.unwrap(), 2);
        assert_eq!(manager.up(&migrations(&[1, 2, 3])).await.unwrap(), 1);
        assert_eq!(manager.up(&migrations(&[1, 2, 3])).await.unwrap(), 0);

        assert_eq!(manager.calls(), vec!["up 1", "up 2", "up 3"]);
    }

    #[tokio::test]
    async fn test_down_runs_newest_first() {
        let manager = RecordingManager::default();
        manager.up(&migrations(&[1, 2, 3])).await.unwrap();

        assert_eq!(manager.down(&migrations(&[2, 3, 4])).await.unwrap(), 2);

        let versions: Vec<i64> = manager
            .applied()
            .await
            .unwrap()
            .iter()
            .map(|r| r.version)
            .collect();
        assert_eq!(versions, vec![1]);
        assert_eq!(manager.calls()[3..], ["down 3", "down 2"]);
    }

    #[tokio::test]
    async fn test_up_rejects_duplicate_versions() {
        let manager = RecordingManager::default();
        let result = manager.up(&migrations(&[1, 1])).await;

        assert!(matches!(result, Err(MigrationError::Migration(_))));
        assert!(manager.calls().is_empty());
    }

    #[test]
    fn test_record_timestamp() {
        let record = MigrationRecord {
            version: 1,
            name: "applications".to_string(),
            applied_at: 1_700_000_000,
        };
        assert_eq!(record.applied_at().map(|t| t.timestamp()), Some(1_700_000_000));
    }
}
