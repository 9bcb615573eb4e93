//! Service layer for business logic
//!
//! [`ApplicationService`] owns application records and [`TokenService`] owns
//! tokens. Both are generic over the repository traits and bound every storage
//! call by [`TokenConfig::storage_timeout`](crate::config::TokenConfig).

pub mod registry;
pub mod token;

pub use registry::ApplicationService;
pub use token::TokenService;

use std::future::Future;
use std::time::Duration;

use crate::{Error, error::StorageError};

/// Runs a storage call with a deadline, mapping an elapsed deadline to
/// [`StorageError::Timeout`].
pub(crate) async fn bounded<T, F>(limit: Duration, operation: &str, call: F) -> Result<T, Error>
where
    F: Future<Output = Result<T, Error>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                operation = operation,
                timeout_ms = limit.as_millis() as u64,
                "Storage call timed out"
            );
            Err(Error::Storage(StorageError::Timeout(operation.to_string())))
        }
    }
}
