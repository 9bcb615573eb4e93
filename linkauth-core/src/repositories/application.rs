use crate::{Error, application::Application};
use async_trait::async_trait;

/// Repository for application records and the secret-hash to application-id mapping
#[async_trait]
pub trait ApplicationRepository: Send + Sync + 'static {
    async fn get_app_by_id(&self, app_id: &str) -> Result<Option<Application>, Error>;

    /// Resolve an application through the secret mapping
    async fn get_app_by_secret_hash(&self, secret_hash: &str)
    -> Result<Option<Application>, Error>;

    /// Insert or overwrite the record with the same id
    async fn put_app(&self, app: &Application) -> Result<(), Error>;

    /// Returns false if there was no such application
    async fn delete_app(&self, app_id: &str) -> Result<bool, Error>;

    /// True if `secret_hash` is mapped to `app_id`
    async fn verify_secret(&self, secret_hash: &str, app_id: &str) -> Result<bool, Error>;

    async fn put_secret(&self, secret_hash: &str, app_id: &str) -> Result<(), Error>;

    /// Returns false if there was no such mapping
    async fn delete_secret(&self, secret_hash: &str) -> Result<bool, Error>;

    /// Remove every secret mapped to `app_id` and return how many there were
    async fn delete_secrets_by_app(&self, app_id: &str) -> Result<u64, Error>;
}
