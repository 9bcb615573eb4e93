//! Postgres storage backend for linkauth.
//!
//! Token expiries are `TIMESTAMPTZ`; prefix scans use `starts_with` on the token
//! primary key.
pub mod migrations;
pub mod repositories;

pub use repositories::{
    PostgresApplicationRepository, PostgresRepositoryProvider, PostgresTokenRepository,
};
