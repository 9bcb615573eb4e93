use crate::{
    Error,
    application::Application,
    repositories::{ApplicationRepository, RepositoryProvider, TokenRepository},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Adapter that wraps a RepositoryProvider and implements ApplicationRepository
pub struct ApplicationRepositoryAdapter<R: RepositoryProvider> {
    provider: Arc<R>,
}

impl<R: RepositoryProvider> ApplicationRepositoryAdapter<R> {
    pub fn new(provider: Arc<R>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<R: RepositoryProvider> ApplicationRepository for ApplicationRepositoryAdapter<R> {
    async fn get_app_by_id(&self, app_id: &str) -> Result<Option<Application>, Error> {
        self.provider.application().get_app_by_id(app_id).await
    }

    async fn get_app_by_secret_hash(
        &self,
        secret_hash: &str,
    ) -> Result<Option<Application>, Error> {
        self.provider
            .application()
            .get_app_by_secret_hash(secret_hash)
            .await
    }

    async fn put_app(&self, app: &Application) -> Result<(), Error> {
        self.provider.application().put_app(app).await
    }

    async fn delete_app(&self, app_id: &str) -> Result<bool, Error> {
        self.provider.application().delete_app(app_id).await
    }

    async fn verify_secret(&self, secret_hash: &str, app_id: &str) -> Result<bool, Error> {
        self.provider
            .application()
            .verify_secret(secret_hash, app_id)
            .await
    }

    async fn put_secret(&self, secret_hash: &str, app_id: &str) -> Result<(), Error> {
        self.provider
            .application()
            .put_secret(secret_hash, app_id)
            .await
    }

    async fn delete_secret(&self, secret_hash: &str) -> Result<bool, Error> {
        self.provider.application().delete_secret(secret_hash).await
    }

    async fn delete_secrets_by_app(&self, app_id: &str) -> Result<u64, Error> {
        self.provider.application().delete_secrets_by_app(app_id).await
    }
}

/// Adapter that wraps a RepositoryProvider and implements TokenRepository
pub struct TokenRepositoryAdapter<R: RepositoryProvider> {
    provider: Arc<R>,
}

impl<R: RepositoryProvider> TokenRepositoryAdapter<R> {
    pub fn new(provider: Arc<R>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<R: RepositoryProvider> TokenRepository for TokenRepositoryAdapter<R> {
    async fn get_token_expiry(&self, token: &str) -> Result<Option<DateTime<Utc>>, Error> {
        self.provider.token().get_token_expiry(token).await
    }

    async fn put_token(&self, token: &str, expires_at: DateTime<Utc>) -> Result<(), Error> {
        self.provider.token().put_token(token, expires_at).await
    }

    async fn delete_token(&self, token: &str) -> Result<bool, Error> {
        self.provider.token().delete_token(token).await
    }

    async fn delete_tokens_by_prefix(&self, prefix: &str) -> Result<u64, Error> {
        self.provider.token().delete_tokens_by_prefix(prefix).await
    }

    async fn delete_expired_tokens(&self, now: DateTime<Utc>) -> Result<u64, Error> {
        self.provider.token().delete_expired_tokens(now).await
    }

    async fn count_tokens_by_prefix(&self, prefix: &str) -> Result<u64, Error> {
        self.provider.token().count_tokens_by_prefix(prefix).await
    }
}
