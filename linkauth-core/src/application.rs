use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered application. Its `id` is derived from `admin_email`, and only the
/// hash of its admin secret is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: String,
    pub name: String,
    pub admin_email: String,
    pub redirect_url: String,
    /// Default token lifetime in seconds.
    pub session_duration: i64,
    /// Maximum number of live user tokens.
    pub users_quota: u64,
    #[serde(skip_serializing, default)]
    pub secret_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for registering an application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewApplication {
    pub name: String,
    pub admin_email: String,
    pub redirect_url: String,
    pub session_duration: i64,
}

impl NewApplication {
    pub fn new(
        name: impl Into<String>,
        admin_email: impl Into<String>,
        redirect_url: impl Into<String>,
        session_duration: i64,
    ) -> Self {
        Self {
            name: name.into(),
            admin_email: admin_email.into(),
            redirect_url: redirect_url.into(),
            session_duration,
        }
    }
}

/// A partial update. `None`, empty strings and a zero duration leave the stored
/// value untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppUpdate {
    pub name: Option<String>,
    pub redirect_url: Option<String>,
    pub session_duration: Option<i64>,
}

impl AppUpdate {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn redirect_url(mut self, redirect_url: impl Into<String>) -> Self {
        self.redirect_url = Some(redirect_url.into());
        self
    }

    pub fn session_duration(mut self, seconds: i64) -> Self {
        self.session_duration = Some(seconds);
        self
    }
}

/// Application metadata as shown to its admin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppView {
    pub id: String,
    pub name: String,
    pub admin_email: String,
    pub redirect_url: String,
    pub session_duration: i64,
    pub users_quota: u64,
    /// Live tokens under the application's prefix.
    pub current_users: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AppView {
    pub fn new(app: Application, current_users: u64) -> Self {
        Self {
            id: app.id,
            name: app.name,
            admin_email: app.admin_email,
            redirect_url: app.redirect_url,
            session_duration: app.session_duration,
            users_quota: app.users_quota,
            current_users,
            created_at: app.created_at,
            updated_at: app.updated_at,
        }
    }
}

/// The result of a registration: the application id and its plaintext secret.
/// The secret is not stored and cannot be retrieved again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppRegistration {
    pub app_id: String,
    pub secret: String,
    /// The record this registration overwrote when the admin email was already
    /// registered. Rolling back restores it.
    #[serde(skip)]
    pub previous: Option<Application>,
}

/// A freshly issued user token with everything needed to compose its email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedToken {
    pub link: String,
    pub token: String,
    pub app_name: String,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_hash_is_not_serialized() {
        let now = Utc::now();
        let app = Application {
            id: "0a1b2c3d".to_string(),
            name: "Test".to_string(),
            admin_email: "admin@x.com".to_string(),
            redirect_url: "https://x.com/cb".to_string(),
            session_duration: 3600,
            users_quota: 100,
            secret_hash: "deadbeef".to_string(),
            created_at: now,
            updated_at: now,
        };

        let json = serde_json::to_string(&app).unwrap();
        assert!(!json.contains("deadbeef"));
    }

    #[test]
    fn test_app_update_builder() {
        let update = AppUpdate::default().name("Renamed").session_duration(120);
        assert_eq!(update.name.as_deref(), Some("Renamed"));
        assert!(update.redirect_url.is_none());
        assert_eq!(update.session_duration, Some(120));
    }
}
