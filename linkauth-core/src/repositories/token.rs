use crate::Error;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Repository for issued tokens, keyed by the full token string.
///
/// Prefix operations take the literal key prefix built by
/// [`app_prefix`](crate::id::app_prefix) or [`subject_prefix`](crate::id::subject_prefix).
/// An empty prefix deletes nothing and counts every token.
#[async_trait]
pub trait TokenRepository: Send + Sync + 'static {
    async fn get_token_expiry(&self, token: &str) -> Result<Option<DateTime<Utc>>, Error>;

    async fn put_token(&self, token: &str, expires_at: DateTime<Utc>) -> Result<(), Error>;

    /// Returns false if there was no such token
    async fn delete_token(&self, token: &str) -> Result<bool, Error>;

    /// Returns the number of tokens removed
    async fn delete_tokens_by_prefix(&self, prefix: &str) -> Result<u64, Error>;

    /// Remove every token whose expiry is strictly before `now`
    async fn delete_expired_tokens(&self, now: DateTime<Utc>) -> Result<u64, Error>;

    async fn count_tokens_by_prefix(&self, prefix: &str) -> Result<u64, Error>;
}
