//! Token lifecycle engine.
//!
//! Each `(application, subject)` slot is either empty or holds one live token.
//! Issuing a token clears the slot's prefix before storing the new token;
//! validation deletes a token it finds expired; the sweep task deletes every
//! expired token on a timer.
//!
//! Issuance holds an in-process mutex across the quota check, the prefix delete
//! and the insert, so concurrent issuances through one `TokenService` are
//! serialized and the last one wins. Another process issuing into the same store
//! is not covered by that mutex: for a short window two tokens of one slot can
//! both validate. Expired tokens are rejected at validation time whether or not
//! the sweep has run.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use crate::{
    Error,
    application::IssuedToken,
    config::TokenConfig,
    error::{ApplicationError, ValidationError},
    id::{TokenKey, app_prefix, hash_secret},
    link::build_magic_link,
    repositories::{ApplicationRepository, TokenRepository},
    services::bounded,
    validation::{expiry_after, validate_duration, validate_email, validate_redirect_url},
};

pub struct TokenService<A: ApplicationRepository, T: TokenRepository> {
    applications: Arc<A>,
    tokens: Arc<T>,
    config: TokenConfig,
    issuance: Mutex<()>,
}

impl<A: ApplicationRepository, T: TokenRepository> TokenService<A, T> {
    pub fn new(applications: Arc<A>, tokens: Arc<T>, config: TokenConfig) -> Self {
        Self {
            applications,
            tokens,
            config,
            issuance: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    /// Issue a token for `email` in the application owning `admin_secret`.
    ///
    /// `redirect_url` and `duration` (seconds) override the application's defaults
    /// when supplied and non-empty/non-zero. Any earlier token of the same subject
    /// is deleted. An admin obtains an admin session token by requesting a link for
    /// the admin email itself, whose subject id equals the application id.
    pub async fn issue_user_token(
        &self,
        admin_secret: &str,
        email: &str,
        redirect_url: Option<&str>,
        duration: Option<i64>,
    ) -> Result<IssuedToken, Error> {
        if admin_secret.is_empty() {
            return Err(ValidationError::MissingField("Admin secret is required".to_string()).into());
        }
        validate_email(email)?;

        let redirect_url = redirect_url.filter(|u| !u.is_empty());
        if let Some(redirect_url) = redirect_url {
            validate_redirect_url(redirect_url)?;
        }
        let duration = duration.filter(|d| *d != 0);
        if let Some(duration) = duration {
            validate_duration(duration, self.config.min_session_duration)?;
        }

        let limit = self.config.storage_timeout;
        let secret_hash = hash_secret(admin_secret)?;
        let app = bounded(
            limit,
            "get_app_by_secret_hash",
            self.applications.get_app_by_secret_hash(&secret_hash),
        )
        .await?
        .ok_or(Error::Application(ApplicationError::NotFound))?;

        let key = TokenKey::generate(&app.id, email)?;
        let token = key.to_string();
        let link = build_magic_link(redirect_url.unwrap_or(&app.redirect_url), &token)?;
        let ttl = duration.unwrap_or(app.session_duration);

        let _guard = self.issuance.lock().await;

        let current_users = bounded(
            limit,
            "count_tokens_by_prefix",
            self.tokens.count_tokens_by_prefix(&app_prefix(&app.id)),
        )
        .await?;
        if current_users >= app.users_quota {
            tracing::debug!(app_id = %app.id, quota = app.users_quota, "Users quota reached");
            return Err(ApplicationError::QuotaExceeded {
                quota: app.users_quota,
            }
            .into());
        }

        let expires_at = expiry_after(Utc::now(), ttl)?;
        let replaced = bounded(
            limit,
            "delete_tokens_by_prefix",
            self.tokens.delete_tokens_by_prefix(&key.subject_prefix()),
        )
        .await?;
        bounded(limit, "put_token", self.tokens.put_token(&token, expires_at)).await?;

        tracing::debug!(
            app_id = %app.id,
            admin = key.is_admin(),
            replaced,
            "Issued token"
        );

        Ok(IssuedToken {
            link,
            token,
            app_name: app.name,
            expires_at,
        })
    }

    /// True if `token` is live and `admin_secret` belongs to its application.
    /// Never fails: malformed input and storage errors yield `false`.
    pub async fn validate_user_token(&self, token: &str, admin_secret: &str) -> bool {
        self.live_token(token, admin_secret).await.is_some()
    }

    /// Returns the application id if `token` is a live admin session token of the
    /// application owning `admin_secret`.
    pub async fn validate_admin_token(&self, token: &str, admin_secret: &str) -> Option<String> {
        if !TokenKey::parse(token)?.is_admin() {
            return None;
        }
        self.live_token(token, admin_secret)
            .await
            .map(|key| key.app_id)
    }

    /// Delete a single token. Returns false if it did not exist.
    pub async fn revoke_token(&self, token: &str) -> Result<bool, Error> {
        bounded(
            self.config.storage_timeout,
            "delete_token",
            self.tokens.delete_token(token),
        )
        .await
    }

    /// Delete every expired token and return how many were removed.
    pub async fn sweep_expired(&self) -> Result<u64, Error> {
        sweep(self.tokens.as_ref(), &self.config).await
    }

    /// Spawn the periodic sweep. Failures are logged and the task keeps running
    /// until `shutdown` changes.
    pub fn start_sweep_task(&self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let tokens = Arc::clone(&self.tokens);
        let config = self.config.clone();

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(config.sweep_interval);

            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        match sweep(tokens.as_ref(), &config).await {
                            Ok(count) if count > 0 => {
                                tracing::info!(count = count, "Swept expired tokens");
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "Failed to sweep expired tokens");
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown.changed() => {
                        tracing::info!("Shutting down token sweep task");
                        break;
                    }
                }
            }
        })
    }

    async fn live_token(&self, token: &str, admin_secret: &str) -> Option<TokenKey> {
        if token.is_empty() || admin_secret.is_empty() {
            return None;
        }
        let key = TokenKey::parse(token)?;
        let secret_hash = hash_secret(admin_secret).ok()?;
        let limit = self.config.storage_timeout;

        let verified = bounded(
            limit,
            "verify_secret",
            self.applications.verify_secret(&secret_hash, &key.app_id),
        )
        .await
        .inspect_err(|e| tracing::warn!(error = %e, "Failed to verify admin secret"))
        .ok()?;
        if !verified {
            return None;
        }

        let expires_at = bounded(limit, "get_token_expiry", self.tokens.get_token_expiry(token))
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "Failed to read token expiry"))
            .ok()??;

        if Utc::now() > expires_at {
            if let Err(e) = bounded(limit, "delete_token", self.tokens.delete_token(token)).await {
                tracing::warn!(error = %e, "Failed to delete expired token");
            }
            return None;
        }

        Some(key)
    }
}

async fn sweep<T: TokenRepository + ?Sized>(tokens: &T, config: &TokenConfig) -> Result<u64, Error> {
    bounded(
        config.storage_timeout,
        "delete_expired_tokens",
        tokens.delete_expired_tokens(Utc::now()),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        application::NewApplication,
        config::MAX_SESSION_DURATION,
        error::StorageError,
        id::{app_id_for, subject_prefix},
        repositories::{ApplicationRepositoryProvider, TokenRepositoryProvider},
        services::ApplicationService,
        storage::{MemoryApplicationRepository, MemoryRepositoryProvider, MemoryTokenRepository},
    };
    use async_trait::async_trait;
    use chrono::{DateTime, Duration};
    use std::time::Duration as StdDuration;

    struct Fixture {
        registry: ApplicationService<MemoryApplicationRepository, MemoryTokenRepository>,
        tokens: TokenService<MemoryApplicationRepository, MemoryTokenRepository>,
        store: Arc<MemoryTokenRepository>,
    }

    fn fixture(config: TokenConfig) -> Fixture {
        let storage = MemoryRepositoryProvider::new();
        let applications = Arc::new(storage.application().clone());
        let store = Arc::new(storage.token().clone());
        Fixture {
            registry: ApplicationService::new(applications.clone(), store.clone(), config.clone()),
            tokens: TokenService::new(applications, store.clone(), config),
            store,
        }
    }

    async fn register(fixture: &Fixture) -> (String, String) {
        let registration = fixture
            .registry
            .register(&NewApplication::new(
                "App A",
                "admin@x.com",
                "https://x.com/cb",
                3600,
            ))
            .await
            .unwrap();
        (registration.app_id, registration.secret)
    }

    async fn expire(store: &MemoryTokenRepository, token: &str) {
        store
            .put_token(token, Utc::now() - Duration::seconds(1))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_issue_and_validate() {
        let fixture = fixture(TokenConfig::default());
        let (app_id, secret) = register(&fixture).await;

        let issued = fixture
            .tokens
            .issue_user_token(&secret, "user@y.com", None, None)
            .await
            .unwrap();

        assert_eq!(issued.app_name, "App A");
        assert_eq!(issued.link, format!("https://x.com/cb?token={}", issued.token));
        let key = TokenKey::parse(&issued.token).unwrap();
        assert_eq!(key.app_id, app_id);
        assert_eq!(key.nonce.len(), 16);
        assert!(key.nonce.chars().all(|c| c.is_ascii_hexdigit()));
        let ttl = issued.expires_at - Utc::now();
        assert!(ttl > Duration::seconds(3590) && ttl <= Duration::seconds(3600));

        assert!(fixture.tokens.validate_user_token(&issued.token, &secret).await);
        assert!(!fixture.tokens.validate_user_token(&issued.token, "wrong-secret").await);
        assert!(!fixture.tokens.validate_user_token(&issued.token, "").await);
        assert!(!fixture.tokens.validate_user_token("", &secret).await);
        assert!(!fixture.tokens.validate_user_token("garbage", &secret).await);
    }

    #[tokio::test]
    async fn test_issue_rejects_bad_input() {
        let fixture = fixture(TokenConfig::default());
        let (_, secret) = register(&fixture).await;

        let result = fixture.tokens.issue_user_token("", "user@y.com", None, None).await;
        assert!(matches!(result, Err(e) if e.is_validation_error()));

        let result = fixture.tokens.issue_user_token(&secret, "", None, None).await;
        assert!(matches!(result, Err(e) if e.is_validation_error()));

        let result = fixture
            .tokens
            .issue_user_token(&secret, "user@y.com", None, Some(10))
            .await;
        assert!(matches!(result, Err(e) if e.is_validation_error()));

        let result = fixture
            .tokens
            .issue_user_token(&secret, "user@y.com", Some("not a url"), None)
            .await;
        assert!(matches!(result, Err(e) if e.is_validation_error()));

        let result = fixture
            .tokens
            .issue_user_token("unknown-secret", "user@y.com", None, None)
            .await;
        assert!(matches!(result, Err(e) if e.is_not_found()));

        assert_eq!(fixture.store.count_tokens_by_prefix("").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_out_of_range_duration_is_rejected() {
        let fixture = fixture(TokenConfig::default());
        let (_, secret) = register(&fixture).await;

        for duration in [i64::MAX / 2, i64::MAX, MAX_SESSION_DURATION + 1] {
            let result = fixture
                .tokens
                .issue_user_token(&secret, "user@y.com", None, Some(duration))
                .await;
            assert!(
                matches!(&result, Err(e) if e.is_validation_error()),
                "expected validation error for {duration}"
            );
        }
        assert_eq!(fixture.store.count_tokens_by_prefix("").await.unwrap(), 0);

        let issued = fixture
            .tokens
            .issue_user_token(&secret, "user@y.com", None, Some(MAX_SESSION_DURATION))
            .await
            .unwrap();
        assert!(issued.expires_at > Utc::now() + Duration::days(3000));
    }

    #[tokio::test]
    async fn test_overrides() {
        let fixture = fixture(TokenConfig::default());
        let (_, secret) = register(&fixture).await;

        let issued = fixture
            .tokens
            .issue_user_token(&secret, "user@y.com", Some("https://y.com/in?ref=mail#top"), Some(120))
            .await
            .unwrap();

        assert_eq!(
            issued.link,
            format!("https://y.com/in?ref=mail&token={}#top", issued.token)
        );
        assert!(issued.expires_at - Utc::now() <= Duration::seconds(120));
    }

    #[tokio::test]
    async fn test_expired_token_is_rejected_and_deleted() {
        let fixture = fixture(TokenConfig::default());
        let (_, secret) = register(&fixture).await;
        let issued = fixture
            .tokens
            .issue_user_token(&secret, "user@y.com", None, None)
            .await
            .unwrap();

        expire(&fixture.store, &issued.token).await;

        assert!(!fixture.tokens.validate_user_token(&issued.token, &secret).await);
        assert!(
            fixture
                .store
                .get_token_expiry(&issued.token)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_reissue_invalidates_previous_token() {
        let fixture = fixture(TokenConfig::default());
        let (app_id, secret) = register(&fixture).await;

        let first = fixture
            .tokens
            .issue_user_token(&secret, "user@y.com", None, None)
            .await
            .unwrap();
        let second = fixture
            .tokens
            .issue_user_token(&secret, "user@y.com", None, None)
            .await
            .unwrap();

        assert_ne!(first.token, second.token);
        assert!(!fixture.tokens.validate_user_token(&first.token, &secret).await);
        assert!(fixture.tokens.validate_user_token(&second.token, &secret).await);

        let subject = TokenKey::parse(&second.token).unwrap().subject_id;
        let live = fixture
            .store
            .count_tokens_by_prefix(&subject_prefix(&app_id, &subject))
            .await
            .unwrap();
        assert_eq!(live, 1);
    }

    #[tokio::test]
    async fn test_admin_token_validation() {
        let fixture = fixture(TokenConfig::default());
        let (app_id, secret) = register(&fixture).await;

        let admin = fixture
            .tokens
            .issue_user_token(&secret, "admin@x.com", None, None)
            .await
            .unwrap();
        let user = fixture
            .tokens
            .issue_user_token(&secret, "user@y.com", None, None)
            .await
            .unwrap();

        assert_eq!(
            fixture.tokens.validate_admin_token(&admin.token, &secret).await,
            Some(app_id.clone())
        );
        assert_eq!(fixture.tokens.validate_admin_token(&user.token, &secret).await, None);
        assert_eq!(fixture.tokens.validate_admin_token(&admin.token, "wrong").await, None);
        assert_eq!(fixture.tokens.validate_admin_token("a-b", &secret).await, None);

        expire(&fixture.store, &admin.token).await;
        assert_eq!(fixture.tokens.validate_admin_token(&admin.token, &secret).await, None);
    }

    #[tokio::test]
    async fn test_quota() {
        let fixture = fixture(TokenConfig::default().with_users_quota(2));
        let (_, secret) = register(&fixture).await;

        let first = fixture
            .tokens
            .issue_user_token(&secret, "one@y.com", None, None)
            .await
            .unwrap();
        fixture
            .tokens
            .issue_user_token(&secret, "two@y.com", None, None)
            .await
            .unwrap();

        let result = fixture
            .tokens
            .issue_user_token(&secret, "three@y.com", None, None)
            .await;
        assert!(matches!(result, Err(e) if e.is_quota_exceeded()));

        assert!(fixture.tokens.revoke_token(&first.token).await.unwrap());
        assert!(!fixture.tokens.revoke_token(&first.token).await.unwrap());
        fixture
            .tokens
            .issue_user_token(&secret, "three@y.com", None, None)
            .await
            .unwrap();

        assert_eq!(fixture.store.count_tokens_by_prefix("").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_quota_frees_after_sweep() {
        let fixture = fixture(TokenConfig::default().with_users_quota(1));
        let (_, secret) = register(&fixture).await;

        let first = fixture
            .tokens
            .issue_user_token(&secret, "one@y.com", None, None)
            .await
            .unwrap();
        let result = fixture
            .tokens
            .issue_user_token(&secret, "two@y.com", None, None)
            .await;
        assert!(matches!(result, Err(e) if e.is_quota_exceeded()));

        expire(&fixture.store, &first.token).await;
        assert_eq!(fixture.tokens.sweep_expired().await.unwrap(), 1);

        fixture
            .tokens
            .issue_user_token(&secret, "two@y.com", None, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_deregister_invalidates_tokens() {
        let fixture = fixture(TokenConfig::default());
        let (app_id, secret) = register(&fixture).await;
        let issued = fixture
            .tokens
            .issue_user_token(&secret, "user@y.com", None, None)
            .await
            .unwrap();

        fixture.registry.deregister(&app_id).await.unwrap();

        assert!(!fixture.tokens.validate_user_token(&issued.token, &secret).await);
        let result = fixture
            .tokens
            .issue_user_token(&secret, "user@y.com", None, None)
            .await;
        assert!(matches!(result, Err(e) if e.is_not_found()));
    }

    #[tokio::test]
    async fn test_secret_from_before_deregistration_cannot_issue() {
        let fixture = fixture(TokenConfig::default());
        let (app_id, old_secret) = register(&fixture).await;
        let (_, replaced_secret) = register(&fixture).await;

        fixture.registry.deregister(&app_id).await.unwrap();
        let (_, new_secret) = register(&fixture).await;

        for secret in [&old_secret, &replaced_secret] {
            let result = fixture
                .tokens
                .issue_user_token(secret, "user@y.com", None, None)
                .await;
            assert!(matches!(result, Err(e) if e.is_not_found()));
        }

        let issued = fixture
            .tokens
            .issue_user_token(&new_secret, "user@y.com", None, None)
            .await
            .unwrap();
        assert!(!fixture.tokens.validate_user_token(&issued.token, &old_secret).await);
        assert!(fixture.tokens.validate_user_token(&issued.token, &new_secret).await);
    }

    #[tokio::test]
    async fn test_sweep_only_removes_expired() {
        let fixture = fixture(TokenConfig::default());
        let (_, secret) = register(&fixture).await;
        let stale = fixture
            .tokens
            .issue_user_token(&secret, "one@y.com", None, None)
            .await
            .unwrap();
        let fresh = fixture
            .tokens
            .issue_user_token(&secret, "two@y.com", None, None)
            .await
            .unwrap();
        expire(&fixture.store, &stale.token).await;

        assert_eq!(fixture.tokens.sweep_expired().await.unwrap(), 1);
        assert_eq!(fixture.tokens.sweep_expired().await.unwrap(), 0);
        assert!(fixture.tokens.validate_user_token(&fresh.token, &secret).await);
    }

    #[tokio::test]
    async fn test_sweep_task_runs_and_stops() {
        let config = TokenConfig::default().with_sweep_interval(StdDuration::from_millis(20));
        let fixture = fixture(config);
        let (_, secret) = register(&fixture).await;
        let issued = fixture
            .tokens
            .issue_user_token(&secret, "user@y.com", None, None)
            .await
            .unwrap();
        expire(&fixture.store, &issued.token).await;

        let (tx, rx) = watch::channel(false);
        let handle = fixture.tokens.start_sweep_task(rx);

        tokio::time::timeout(StdDuration::from_secs(5), async {
            while fixture.store.count_tokens_by_prefix("").await.unwrap() > 0 {
                tokio::time::sleep(StdDuration::from_millis(10)).await;
            }
        })
        .await
        .expect("sweep did not run");

        tx.send(true).unwrap();
        tokio::time::timeout(StdDuration::from_secs(5), handle)
            .await
            .expect("sweep task did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_issuance_leaves_one_token() {
        let fixture = Arc::new(fixture(TokenConfig::default()));
        let (app_id, secret) = register(&fixture).await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let fixture = Arc::clone(&fixture);
            let secret = secret.clone();
            handles.push(tokio::spawn(async move {
                fixture
                    .tokens
                    .issue_user_token(&secret, "user@y.com", None, None)
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let subject = crate::id::subject_id_for("user@y.com").unwrap();
        let live = fixture
            .store
            .count_tokens_by_prefix(&subject_prefix(&app_id, &subject))
            .await
            .unwrap();
        assert_eq!(live, 1);
        assert_eq!(app_id, app_id_for("admin@x.com").unwrap());
    }

    /// Token repository whose calls never finish in time.
    struct SlowTokenRepository;

    #[async_trait]
    impl TokenRepository for SlowTokenRepository {
        async fn get_token_expiry(&self, _token: &str) -> Result<Option<DateTime<Utc>>, Error> {
            tokio::time::sleep(StdDuration::from_secs(60)).await;
            Ok(None)
        }

        async fn put_token(&self, _token: &str, _expires_at: DateTime<Utc>) -> Result<(), Error> {
            tokio::time::sleep(StdDuration::from_secs(60)).await;
            Ok(())
        }

        async fn delete_token(&self, _token: &str) -> Result<bool, Error> {
            tokio::time::sleep(StdDuration::from_secs(60)).await;
            Ok(false)
        }

        async fn delete_tokens_by_prefix(&self, _prefix: &str) -> Result<u64, Error> {
            tokio::time::sleep(StdDuration::from_secs(60)).await;
            Ok(0)
        }

        async fn delete_expired_tokens(&self, _now: DateTime<Utc>) -> Result<u64, Error> {
            tokio::time::sleep(StdDuration::from_secs(60)).await;
            Ok(0)
        }

        async fn count_tokens_by_prefix(&self, _prefix: &str) -> Result<u64, Error> {
            tokio::time::sleep(StdDuration::from_secs(60)).await;
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_storage_calls_are_bounded() {
        let config = TokenConfig::default().with_storage_timeout(StdDuration::from_millis(20));
        let storage = MemoryRepositoryProvider::new();
        let applications = Arc::new(storage.application().clone());
        let registry = ApplicationService::new(
            applications.clone(),
            Arc::new(storage.token().clone()),
            config.clone(),
        );
        let registration = registry
            .register(&NewApplication::new("App", "admin@x.com", "https://x.com/cb", 3600))
            .await
            .unwrap();

        let service = TokenService::new(applications, Arc::new(SlowTokenRepository), config);

        let result = service
            .issue_user_token(&registration.secret, "user@y.com", None, None)
            .await;
        assert!(matches!(
            result,
            Err(Error::Storage(StorageError::Timeout(op))) if op == "count_tokens_by_prefix"
        ));

        let result = service.sweep_expired().await;
        assert!(matches!(result, Err(e) if e.is_storage_error()));

        assert!(
            !service
                .validate_user_token(&format!("{}-00000000-00", registration.app_id), &registration.secret)
                .await
        );
    }
}
