//! # linkauth
//!
//! Passwordless sign-in for many applications from one service. An application is
//! registered with an admin email and receives an id and a secret; with that secret
//! it can have a magic link mailed to any user. The link carries a token of the form
//! `<app_id>-<user_id>-<nonce>` which the application later checks with
//! [`LinkAuth::validate_user_token`].
//!
//! An admin signs in the same way, by requesting a link for the admin email itself.
//! The resulting admin token unlocks [`LinkAuth::app_metadata`],
//! [`LinkAuth::update_app`] and [`LinkAuth::delete_app`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use linkauth::{LinkAuthBuilder, LinkRequest, MailerConfig, NewApplication};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let linkauth = LinkAuthBuilder::new()
//!         .with_sqlite("sqlite://linkauth.db?mode=rwc")
//!         .await?
//!         .with_mailer_config(MailerConfig::from_env()?)
//!         .apply_migrations(true)
//!         .build()
//!         .await?;
//!     let workers = linkauth.start();
//!
//!     let registration = linkauth
//!         .register_app(&NewApplication::new("App A", "admin@x.com", "https://x.com/cb", 3600))
//!         .await?;
//!     linkauth
//!         .request_link(&registration.secret, &LinkRequest::new("user@y.com"))
//!         .await?;
//!
//!     workers.shutdown().await;
//!     Ok(())
//! }
//! ```
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use linkauth_core::{
    RepositoryProvider,
    error::ValidationError,
    repositories::{ApplicationRepositoryAdapter, TokenRepositoryAdapter},
    services::{ApplicationService, TokenService},
};
use linkauth_mailer::{
    AppCreatedEmail, AppDetails, AskamaTemplateEngine, DeliveryQueue, MagicLinkEmail, Mailer,
    MailerError, address_domain, is_valid_address,
};

mod builder;

pub use builder::{LinkAuthBuilder, LinkAuthBuilderError, NoStorage, WithStorage};

/// Re-export core types from linkauth_core
pub use linkauth_core::{
    AppRegistration, AppUpdate, AppView, Application, IssuedToken, MemoryRepositoryProvider,
    NewApplication, TokenConfig, TokenKey,
};

/// Re-export mailer configuration and types
pub use linkauth_mailer::{DomainList, MailerConfig, QueueConfig, TransportConfig};

#[cfg(feature = "sqlite")]
pub use linkauth_storage_sqlite::SqliteRepositoryProvider;

#[cfg(feature = "postgres")]
pub use linkauth_storage_postgres::PostgresRepositoryProvider;

/// Errors returned by [`LinkAuth`].
#[derive(Debug, thiserror::Error)]
pub enum LinkAuthError {
    #[error("{0}")]
    Core(#[from] linkauth_core::Error),

    #[error("Mailer error: {0}")]
    Mailer(#[from] MailerError),

    /// The confirmation email could not be queued. Whatever was stored for the
    /// request has been undone.
    #[error("Email delivery failed: {0}")]
    DeliveryFailed(String),

    /// No valid admin session for the application.
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Builder error: {0}")]
    Builder(#[from] LinkAuthBuilderError),
}

impl LinkAuthError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, LinkAuthError::Unauthorized)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, LinkAuthError::Core(e) if e.is_not_found())
    }

    pub fn is_validation_error(&self) -> bool {
        matches!(self, LinkAuthError::Core(e) if e.is_validation_error())
    }

    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, LinkAuthError::Core(e) if e.is_quota_exceeded())
    }

    pub fn is_disallowed_domain(&self) -> bool {
        matches!(self, LinkAuthError::Mailer(MailerError::DisallowedDomain(_)))
    }
}

/// A request for a user's magic link. Unset fields fall back to the application's
/// redirect URL and session duration.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct LinkRequest {
    pub email: String,
    pub redirect_url: Option<String>,
    /// Session duration in seconds
    pub duration: Option<i64>,
}

impl LinkRequest {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            ..Default::default()
        }
    }

    pub fn redirect_url(mut self, redirect_url: impl Into<String>) -> Self {
        self.redirect_url = Some(redirect_url.into());
        self
    }

    pub fn duration(mut self, seconds: i64) -> Self {
        self.duration = Some(seconds);
        self
    }
}

type Registry<R> = ApplicationService<ApplicationRepositoryAdapter<R>, TokenRepositoryAdapter<R>>;
type Tokens<R> = TokenService<ApplicationRepositoryAdapter<R>, TokenRepositoryAdapter<R>>;

/// Coordinates the registry, the token engine and the delivery queue.
///
/// Every operation that stores something and then queues an email undoes the store
/// when the email cannot be queued, so a caller never holds a registration or a
/// token whose email was refused.
pub struct LinkAuth<R: RepositoryProvider> {
    repositories: Arc<R>,
    registry: Registry<R>,
    tokens: Tokens<R>,
    queue: Arc<DeliveryQueue>,
    mailer: Arc<dyn Mailer>,
    templates: AskamaTemplateEngine,
    from_address: String,
}

impl<R: RepositoryProvider> LinkAuth<R> {
    /// Create a new instance over `repositories`. Most callers go through
    /// [`LinkAuthBuilder`] instead.
    pub fn new(
        repositories: Arc<R>,
        token_config: TokenConfig,
        queue: Arc<DeliveryQueue>,
        mailer: Arc<dyn Mailer>,
        from_address: impl Into<String>,
    ) -> Self {
        let applications = Arc::new(ApplicationRepositoryAdapter::new(repositories.clone()));
        let tokens = Arc::new(TokenRepositoryAdapter::new(repositories.clone()));

        Self {
            registry: ApplicationService::new(
                applications.clone(),
                tokens.clone(),
                token_config.clone(),
            ),
            tokens: TokenService::new(applications, tokens, token_config),
            repositories,
            queue,
            mailer,
            templates: AskamaTemplateEngine::new(),
            from_address: from_address.into(),
        }
    }

    pub async fn migrate(&self) -> Result<(), LinkAuthError> {
        self.repositories.migrate().await?;
        Ok(())
    }

    pub async fn health_check(&self) -> Result<(), LinkAuthError> {
        self.repositories.health_check().await?;
        Ok(())
    }

    pub fn queue(&self) -> &Arc<DeliveryQueue> {
        &self.queue
    }

    /// Register an application and mail its id and secret to the admin email.
    ///
    /// The secret is also returned here; it is not stored in plaintext and cannot
    /// be recovered later.
    pub async fn register_app(
        &self,
        new_app: &NewApplication,
    ) -> Result<AppRegistration, LinkAuthError> {
        self.check_recipient(&new_app.admin_email)?;

        let registration = self.registry.register(new_app).await?;

        let details = AppDetails {
            app_id: registration.app_id.clone(),
            app_name: new_app.name.clone(),
            redirect_url: new_app.redirect_url.clone(),
            secret: registration.secret.clone(),
        };
        let queued = match AppCreatedEmail::build(
            &self.templates,
            &self.from_address,
            &new_app.admin_email,
            &details,
        )
        .await
        {
            Ok(email) => self.queue.push(email),
            Err(e) => Err(e),
        };

        if let Err(e) = queued {
            tracing::error!(error = %e, app_id = %registration.app_id, "Failed to queue app created email");
            if let Err(rollback) = self.registry.rollback_registration(&registration).await {
                tracing::error!(error = %rollback, app_id = %registration.app_id, "Failed to roll back registration");
            }
            return Err(LinkAuthError::DeliveryFailed(e.to_string()));
        }

        Ok(registration)
    }

    /// Issue a token for `request.email` and mail the magic link.
    pub async fn request_link(
        &self,
        admin_secret: &str,
        request: &LinkRequest,
    ) -> Result<IssuedToken, LinkAuthError> {
        self.check_recipient(&request.email)?;

        let issued = self
            .tokens
            .issue_user_token(
                admin_secret,
                &request.email,
                request.redirect_url.as_deref(),
                request.duration,
            )
            .await?;

        let queued = match MagicLinkEmail::build(
            &self.templates,
            &self.from_address,
            &request.email,
            &issued.app_name,
            &issued.link,
            &issued.token,
        )
        .await
        {
            Ok(email) => self.queue.push(email),
            Err(e) => Err(e),
        };

        if let Err(e) = queued {
            tracing::error!(error = %e, "Failed to queue magic link email");
            if let Err(revoke) = self.tokens.revoke_token(&issued.token).await {
                tracing::error!(error = %revoke, "Failed to revoke undelivered token");
            }
            return Err(LinkAuthError::DeliveryFailed(e.to_string()));
        }

        Ok(issued)
    }

    pub async fn validate_user_token(&self, token: &str, admin_secret: &str) -> bool {
        self.tokens.validate_user_token(token, admin_secret).await
    }

    /// Returns the application id when `token` is a live admin session token.
    pub async fn validate_admin_token(&self, token: &str, admin_secret: &str) -> Option<String> {
        self.tokens.validate_admin_token(token, admin_secret).await
    }

    pub async fn app_metadata(
        &self,
        admin_token: &str,
        admin_secret: &str,
    ) -> Result<AppView, LinkAuthError> {
        let app_id = self.authorize(admin_token, admin_secret).await?;
        Ok(self.registry.metadata(&app_id).await?)
    }

    pub async fn update_app(
        &self,
        admin_token: &str,
        admin_secret: &str,
        update: &AppUpdate,
    ) -> Result<AppView, LinkAuthError> {
        let app_id = self.authorize(admin_token, admin_secret).await?;
        Ok(self.registry.update(&app_id, update).await?)
    }

    /// Deregister the application, invalidating every token it issued.
    pub async fn delete_app(&self, admin_token: &str, admin_secret: &str) -> Result<(), LinkAuthError> {
        let app_id = self.authorize(admin_token, admin_secret).await?;
        Ok(self.registry.deregister(&app_id).await?)
    }

    pub async fn revoke_token(&self, token: &str) -> Result<bool, LinkAuthError> {
        Ok(self.tokens.revoke_token(token).await?)
    }

    pub async fn sweep_expired(&self) -> Result<u64, LinkAuthError> {
        Ok(self.tokens.sweep_expired().await?)
    }

    /// Send everything queued on the calling task. For processes that exit before
    /// a worker would get to run.
    pub async fn deliver_pending(&self) -> usize {
        self.queue.deliver_pending(self.mailer.as_ref()).await
    }

    /// Spawn the delivery worker and the token sweep.
    pub fn start(&self) -> Workers {
        let (shutdown, receiver) = watch::channel(false);
        let handles = vec![
            self.queue
                .start_worker(Arc::clone(&self.mailer), receiver.clone()),
            self.tokens.start_sweep_task(receiver),
        ];

        Workers { shutdown, handles }
    }

    async fn authorize(&self, admin_token: &str, admin_secret: &str) -> Result<String, LinkAuthError> {
        self.tokens
            .validate_admin_token(admin_token, admin_secret)
            .await
            .ok_or(LinkAuthError::Unauthorized)
    }

    fn check_recipient(&self, email: &str) -> Result<(), LinkAuthError> {
        if self.queue.allowed(email) {
            return Ok(());
        }
        if !is_valid_address(email) {
            return Err(ValidationError::InvalidEmail(email.to_string()).into());
        }
        let domain = address_domain(email).unwrap_or_default();
        Err(MailerError::DisallowedDomain(domain).into())
    }
}

impl From<ValidationError> for LinkAuthError {
    fn from(error: ValidationError) -> Self {
        LinkAuthError::Core(error.into())
    }
}

/// Handles of the background tasks started by [`LinkAuth::start`].
pub struct Workers {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Workers {
    /// Stop both tasks and wait for them. Messages still queued are not sent.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Background task ended abnormally");
            }
        }
    }
}
