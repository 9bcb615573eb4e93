//! Application registry.
//!
//! Registers applications, serves their metadata to the owning admin, applies
//! partial updates and deregisters them together with all of their tokens.

use std::sync::Arc;

use chrono::Utc;

use crate::{
    Error,
    application::{AppRegistration, AppUpdate, AppView, Application, NewApplication},
    config::TokenConfig,
    error::ApplicationError,
    id::{SECRET_SIZE, app_id_for, app_prefix, hash_secret, random_secret},
    repositories::{ApplicationRepository, TokenRepository},
    services::bounded,
    validation::{validate_duration, validate_email, validate_name, validate_redirect_url},
};

pub struct ApplicationService<A: ApplicationRepository, T: TokenRepository> {
    applications: Arc<A>,
    tokens: Arc<T>,
    config: TokenConfig,
}

impl<A: ApplicationRepository, T: TokenRepository> ApplicationService<A, T> {
    pub fn new(applications: Arc<A>, tokens: Arc<T>, config: TokenConfig) -> Self {
        Self {
            applications,
            tokens,
            config,
        }
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    /// Register an application and return its id and plaintext secret.
    ///
    /// The id is derived from the admin email, so registering the same email again
    /// overwrites the stored record, keeping its `created_at`, and adds a second
    /// secret mapping. The earlier secret keeps verifying for that id until the
    /// application is deregistered. The overwritten record is returned in
    /// [`AppRegistration::previous`].
    pub async fn register(&self, new_app: &NewApplication) -> Result<AppRegistration, Error> {
        validate_name(&new_app.name)?;
        validate_email(&new_app.admin_email)?;
        validate_redirect_url(&new_app.redirect_url)?;
        validate_duration(new_app.session_duration, self.config.min_session_duration)?;

        let app_id = app_id_for(&new_app.admin_email)?;
        let limit = self.config.storage_timeout;

        let previous = bounded(limit, "get_app_by_id", self.applications.get_app_by_id(&app_id))
            .await?;
        if previous.is_some() {
            tracing::warn!(app_id = %app_id, "Re-registering an existing application id");
        }

        let secret = random_secret(SECRET_SIZE);
        let secret_hash = hash_secret(&secret)?;
        let now = Utc::now();
        let app = Application {
            id: app_id.clone(),
            name: new_app.name.clone(),
            admin_email: new_app.admin_email.clone(),
            redirect_url: new_app.redirect_url.clone(),
            session_duration: new_app.session_duration,
            users_quota: self.config.default_users_quota,
            secret_hash: secret_hash.clone(),
            created_at: previous.as_ref().map_or(now, |a| a.created_at),
            updated_at: now,
        };

        bounded(limit, "put_app", self.applications.put_app(&app)).await?;
        bounded(
            limit,
            "put_secret",
            self.applications.put_secret(&secret_hash, &app_id),
        )
        .await?;

        tracing::info!(app_id = %app_id, "Registered application");
        Ok(AppRegistration {
            app_id,
            secret,
            previous,
        })
    }

    /// Application metadata plus the number of live tokens under its prefix.
    pub async fn metadata(&self, app_id: &str) -> Result<AppView, Error> {
        let app = self.require_app(app_id).await?;
        let current_users = bounded(
            self.config.storage_timeout,
            "count_tokens_by_prefix",
            self.tokens.count_tokens_by_prefix(&app_prefix(app_id)),
        )
        .await?;
        Ok(AppView::new(app, current_users))
    }

    /// Apply the supplied, non-empty fields of `update`.
    pub async fn update(&self, app_id: &str, update: &AppUpdate) -> Result<AppView, Error> {
        let name = update.name.as_deref().filter(|n| !n.is_empty());
        let redirect_url = update.redirect_url.as_deref().filter(|u| !u.is_empty());
        let session_duration = update.session_duration.filter(|d| *d != 0);

        if let Some(name) = name {
            validate_name(name)?;
        }
        if let Some(redirect_url) = redirect_url {
            validate_redirect_url(redirect_url)?;
        }
        if let Some(duration) = session_duration {
            validate_duration(duration, self.config.min_session_duration)?;
        }

        let mut app = self.require_app(app_id).await?;
        if let Some(name) = name {
            app.name = name.to_string();
        }
        if let Some(redirect_url) = redirect_url {
            app.redirect_url = redirect_url.to_string();
        }
        if let Some(duration) = session_duration {
            app.session_duration = duration;
        }
        app.updated_at = Utc::now();

        bounded(
            self.config.storage_timeout,
            "put_app",
            self.applications.put_app(&app),
        )
        .await?;

        tracing::info!(app_id = %app_id, "Updated application");
        self.metadata(app_id).await
    }

    /// Delete every token of the application, then every secret mapped to it, then
    /// its record.
    ///
    /// Tokens go first: if the record deletion never happens the call can be
    /// repeated. Returns `NotFound` when there was no record, after purging any
    /// tokens and secrets left under its id.
    pub async fn deregister(&self, app_id: &str) -> Result<(), Error> {
        let limit = self.config.storage_timeout;
        let tokens = bounded(
            limit,
            "delete_tokens_by_prefix",
            self.tokens.delete_tokens_by_prefix(&app_prefix(app_id)),
        )
        .await?;
        let secrets = bounded(
            limit,
            "delete_secrets_by_app",
            self.applications.delete_secrets_by_app(app_id),
        )
        .await?;

        if !bounded(limit, "delete_app", self.applications.delete_app(app_id)).await? {
            return Err(ApplicationError::NotFound.into());
        }

        tracing::info!(app_id = %app_id, tokens, secrets, "Deregistered application");
        Ok(())
    }

    /// Undo a registration whose confirmation email could not be queued.
    ///
    /// The new secret mapping is always removed. A fresh registration is deleted
    /// together with any tokens under its prefix; a re-registration puts back the
    /// record it overwrote and leaves the application's tokens alone. Missing
    /// records are ignored.
    pub async fn rollback_registration(&self, registration: &AppRegistration) -> Result<(), Error> {
        let limit = self.config.storage_timeout;
        let secret_hash = hash_secret(&registration.secret)?;

        bounded(
            limit,
            "delete_secret",
            self.applications.delete_secret(&secret_hash),
        )
        .await?;

        match &registration.previous {
            Some(previous) => {
                bounded(limit, "put_app", self.applications.put_app(previous)).await?;
                tracing::info!(
                    app_id = %registration.app_id,
                    "Restored the previous application record"
                );
            }
            None => {
                bounded(
                    limit,
                    "delete_tokens_by_prefix",
                    self.tokens
                        .delete_tokens_by_prefix(&app_prefix(&registration.app_id)),
                )
                .await?;
                bounded(
                    limit,
                    "delete_app",
                    self.applications.delete_app(&registration.app_id),
                )
                .await?;
                tracing::info!(app_id = %registration.app_id, "Rolled back application registration");
            }
        }

        Ok(())
    }

    /// True only if `secret` is the admin secret of `app_id`. Unknown applications,
    /// wrong secrets and storage failures all yield `false`.
    pub async fn verify_admin_secret(&self, app_id: &str, secret: &str) -> bool {
        let Ok(secret_hash) = hash_secret(secret) else {
            return false;
        };

        match bounded(
            self.config.storage_timeout,
            "verify_secret",
            self.applications.verify_secret(&secret_hash, app_id),
        )
        .await
        {
            Ok(valid) => valid,
            Err(e) => {
                tracing::warn!(error = %e, app_id = %app_id, "Failed to verify admin secret");
                false
            }
        }
    }

    async fn require_app(&self, app_id: &str) -> Result<Application, Error> {
        bounded(
            self.config.storage_timeout,
            "get_app_by_id",
            self.applications.get_app_by_id(app_id),
        )
        .await?
        .ok_or(Error::Application(ApplicationError::NotFound))
    }
}
