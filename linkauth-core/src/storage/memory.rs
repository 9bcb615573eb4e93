use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    Error,
    application::Application,
    crypto::constant_time_compare,
    repositories::{
        ApplicationRepository, ApplicationRepositoryProvider, RepositoryProvider,
        TokenRepository, TokenRepositoryProvider,
    },
};

/// All maps sit behind a single lock so a prefix delete followed by an insert on
/// one repository is never interleaved with a count on the other.
#[derive(Debug, Default)]
struct MemoryState {
    apps: HashMap<String, Application>,
    secrets: HashMap<String, String>,
    tokens: BTreeMap<String, DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
struct SharedState(Arc<RwLock<MemoryState>>);

impl SharedState {
    fn read(&self) -> RwLockReadGuard<'_, MemoryState> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MemoryState> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MemoryState {
    fn token_keys_with_prefix<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Iterator<Item = &'a String> + 'a {
        self.tokens
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .map(|(key, _)| key)
            .take_while(move |key| key.starts_with(prefix))
    }
}

#[derive(Debug, Clone)]
pub struct MemoryApplicationRepository {
    state: SharedState,
}

#[async_trait]
impl ApplicationRepository for MemoryApplicationRepository {
    async fn get_app_by_id(&self, app_id: &str) -> Result<Option<Application>, Error> {
        Ok(self.state.read().apps.get(app_id).cloned())
    }

    async fn get_app_by_secret_hash(
        &self,
        secret_hash: &str,
    ) -> Result<Option<Application>, Error> {
        let state = self.state.read();
        Ok(state
            .secrets
            .get(secret_hash)
            .and_then(|app_id| state.apps.get(app_id))
            .cloned())
    }

    async fn put_app(&self, app: &Application) -> Result<(), Error> {
        self.state.write().apps.insert(app.id.clone(), app.clone());
        Ok(())
    }

    async fn delete_app(&self, app_id: &str) -> Result<bool, Error> {
        Ok(self.state.write().apps.remove(app_id).is_some())
    }

    async fn verify_secret(&self, secret_hash: &str, app_id: &str) -> Result<bool, Error> {
        Ok(self
            .state
            .read()
            .secrets
            .get(secret_hash)
            .is_some_and(|stored| constant_time_compare(stored.as_bytes(), app_id.as_bytes())))
    }

    async fn put_secret(&self, secret_hash: &str, app_id: &str) -> Result<(), Error> {
        self.state
            .write()
            .secrets
            .insert(secret_hash.to_string(), app_id.to_string());
        Ok(())
    }

    async fn delete_secret(&self, secret_hash: &str) -> Result<bool, Error> {
        Ok(self.state.write().secrets.remove(secret_hash).is_some())
    }

    async fn delete_secrets_by_app(&self, app_id: &str) -> Result<u64, Error> {
        let mut state = self.state.write();
        let before = state.secrets.len();
        state.secrets.retain(|_, stored| stored != app_id);
        Ok((before - state.secrets.len()) as u64)
    }
}

#[derive(Debug, Clone)]
pub struct MemoryTokenRepository {
    state: SharedState,
}

#[async_trait]
impl TokenRepository for MemoryTokenRepository {
    async fn get_token_expiry(&self, token: &str) -> Result<Option<DateTime<Utc>>, Error> {
        Ok(self.state.read().tokens.get(token).copied())
    }

    async fn put_token(&self, token: &str, expires_at: DateTime<Utc>) -> Result<(), Error> {
        self.state
            .write()
            .tokens
            .insert(token.to_string(), expires_at);
        Ok(())
    }

    async fn delete_token(&self, token: &str) -> Result<bool, Error> {
        Ok(self.state.write().tokens.remove(token).is_some())
    }

    async fn delete_tokens_by_prefix(&self, prefix: &str) -> Result<u64, Error> {
        if prefix.is_empty() {
            return Ok(0);
        }

        let mut state = self.state.write();
        let keys: Vec<String> = state.token_keys_with_prefix(prefix).cloned().collect();
        for key in &keys {
            state.tokens.remove(key);
        }
        Ok(keys.len() as u64)
    }

    async fn delete_expired_tokens(&self, now: DateTime<Utc>) -> Result<u64, Error> {
        let mut state = self.state.write();
        let before = state.tokens.len();
        state.tokens.retain(|_, expires_at| *expires_at >= now);
        Ok((before - state.tokens.len()) as u64)
    }

    async fn count_tokens_by_prefix(&self, prefix: &str) -> Result<u64, Error> {
        Ok(self.state.read().token_keys_with_prefix(prefix).count() as u64)
    }
}

/// In-memory storage. Everything is lost when the last clone is dropped.
#[derive(Debug, Clone)]
pub struct MemoryRepositoryProvider {
    applications: MemoryApplicationRepository,
    tokens: MemoryTokenRepository,
}

impl MemoryRepositoryProvider {
    pub fn new() -> Self {
        let state = SharedState::default();
        Self {
            applications: MemoryApplicationRepository {
                state: state.clone(),
            },
            tokens: MemoryTokenRepository { state },
        }
    }
}

impl Default for MemoryRepositoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ApplicationRepositoryProvider for MemoryRepositoryProvider {
    type ApplicationRepo = MemoryApplicationRepository;

    fn application(&self) -> &Self::ApplicationRepo {
        &self.applications
    }
}

impl TokenRepositoryProvider for MemoryRepositoryProvider {
    type TokenRepo = MemoryTokenRepository;

    fn token(&self) -> &Self::TokenRepo {
        &self.tokens
    }
}

#[async_trait]
impl RepositoryProvider for MemoryRepositoryProvider {
    async fn migrate(&self) -> Result<(), Error> {
        Ok(())
    }

    async fn health_check(&self) -> Result<(), Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn app(id: &str) -> Application {
        let now = Utc::now();
        Application {
            id: id.to_string(),
            name: "Test".to_string(),
            admin_email: "admin@x.com".to_string(),
            redirect_url: "https://x.com/cb".to_string(),
            session_duration: 3600,
            users_quota: 100,
            secret_hash: "secrethash".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_application_round_trip() {
        let storage = MemoryRepositoryProvider::new();
        let repo = storage.application();

        assert!(repo.get_app_by_id("aaaa0000").await.unwrap().is_none());
        repo.put_app(&app("aaaa0000")).await.unwrap();
        repo.put_secret("secrethash", "aaaa0000").await.unwrap();

        let found = repo.get_app_by_secret_hash("secrethash").await.unwrap();
        assert_eq!(found.unwrap().id, "aaaa0000");
        assert!(repo.verify_secret("secrethash", "aaaa0000").await.unwrap());
        assert!(!repo.verify_secret("secrethash", "bbbb1111").await.unwrap());
        assert!(!repo.verify_secret("otherhash", "aaaa0000").await.unwrap());

        assert!(repo.delete_secret("secrethash").await.unwrap());
        assert!(!repo.delete_secret("secrethash").await.unwrap());
        assert!(repo.delete_app("aaaa0000").await.unwrap());
        assert!(!repo.delete_app("aaaa0000").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_secrets_by_app() {
        let storage = MemoryRepositoryProvider::new();
        let repo = storage.application();

        repo.put_secret("hash-1", "aaaa0000").await.unwrap();
        repo.put_secret("hash-2", "aaaa0000").await.unwrap();
        repo.put_secret("hash-3", "bbbb1111").await.unwrap();

        assert_eq!(repo.delete_secrets_by_app("aaaa0000").await.unwrap(), 2);
        assert!(!repo.verify_secret("hash-1", "aaaa0000").await.unwrap());
        assert!(!repo.verify_secret("hash-2", "aaaa0000").await.unwrap());
        assert!(repo.verify_secret("hash-3", "bbbb1111").await.unwrap());
        assert_eq!(repo.delete_secrets_by_app("aaaa0000").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_token_prefix_operations() {
        let storage = MemoryRepositoryProvider::new();
        let repo = storage.token();
        let expires_at = Utc::now() + Duration::hours(1);

        for token in ["aaaa-1111-01", "aaaa-1111-02", "aaaa-2222-01", "aaab-1111-01"] {
            repo.put_token(token, expires_at).await.unwrap();
        }

        assert_eq!(repo.count_tokens_by_prefix("aaaa-").await.unwrap(), 3);
        assert_eq!(repo.count_tokens_by_prefix("aaaa-1111-").await.unwrap(), 2);
        assert_eq!(repo.count_tokens_by_prefix("").await.unwrap(), 4);

        assert_eq!(repo.delete_tokens_by_prefix("").await.unwrap(), 0);
        assert_eq!(repo.delete_tokens_by_prefix("aaaa-1111-").await.unwrap(), 2);
        assert_eq!(repo.delete_tokens_by_prefix("aaaa-1111-").await.unwrap(), 0);
        assert_eq!(repo.count_tokens_by_prefix("aaaa-").await.unwrap(), 1);
        assert!(repo.get_token_expiry("aaab-1111-01").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_expired_tokens() {
        let storage = MemoryRepositoryProvider::new();
        let repo = storage.token();
        let now = Utc::now();

        repo.put_token("aaaa-1111-01", now - Duration::seconds(1)).await.unwrap();
        repo.put_token("aaaa-2222-01", now + Duration::seconds(60)).await.unwrap();

        assert_eq!(repo.delete_expired_tokens(now).await.unwrap(), 1);
        assert!(repo.get_token_expiry("aaaa-1111-01").await.unwrap().is_none());
        assert!(repo.get_token_expiry("aaaa-2222-01").await.unwrap().is_some());
        assert!(repo.delete_token("aaaa-2222-01").await.unwrap());
        assert!(!repo.delete_token("aaaa-2222-01").await.unwrap());
    }

    #[tokio::test]
    async fn test_health_check() {
        let storage = MemoryRepositoryProvider::default();
        storage.migrate().await.unwrap();
        storage.health_check().await.unwrap();
    }
}
