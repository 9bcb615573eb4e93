//! SQLite storage backend for linkauth.
//!
//! Application timestamps are stored as unix seconds and token expiries as unix
//! milliseconds. Token prefix scans compare a leading substring of the primary
//! key; the sweep uses an index on `expires_at`.
//!
//! ```rust,ignore
//! use linkauth_core::RepositoryProvider;
//! use linkauth_storage_sqlite::SqliteRepositoryProvider;
//!
//! let storage = SqliteRepositoryProvider::connect("sqlite://linkauth.db?mode=rwc").await?;
//! storage.migrate().await?;
//! ```
pub mod migrations;
pub mod repositories;

pub use repositories::{
    SqliteApplicationRepository, SqliteRepositoryProvider, SqliteTokenRepository,
};
