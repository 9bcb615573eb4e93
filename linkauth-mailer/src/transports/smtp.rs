use crate::{Email, Mailer, MailerError};
use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Per-command timeout used when none is configured.
pub const DEFAULT_SMTP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TlsMode {
    /// Plaintext. Only for local relays.
    None,
    #[default]
    StartTls,
    /// Implicit TLS, usually on port 465.
    Tls,
}

impl FromStr for TlsMode {
    type Err = MailerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(TlsMode::None),
            "starttls" => Ok(TlsMode::StartTls),
            "tls" => Ok(TlsMode::Tls),
            other => Err(MailerError::Config(format!("Unknown TLS mode: {other}"))),
        }
    }
}

/// Connection settings for an SMTP relay.
///
/// Authentication happens only when a password is set. The login defaults to the
/// sender address, so a mailbox that sends its own mail needs no username.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmtpSettings {
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub tls: TlsMode,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl SmtpSettings {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            username: None,
            password: None,
            tls: TlsMode::default(),
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SmtpTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpTransport {
    /// Prepare a pooled transport. No connection is opened until the first send.
    pub fn connect(settings: &SmtpSettings, sender: &str) -> Result<Self, MailerError> {
        let mut builder = match settings.tls {
            TlsMode::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.host),
            TlsMode::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)?,
            TlsMode::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)?,
        };

        if let Some(port) = settings.port {
            builder = builder.port(port);
        }

        if let Some(password) = &settings.password {
            let login = settings.username.as_deref().unwrap_or(sender);
            builder = builder.credentials(Credentials::new(login.to_string(), password.clone()));
        }

        let timeout = settings.timeout_secs.unwrap_or(DEFAULT_SMTP_TIMEOUT_SECS);
        builder = builder.timeout(Some(Duration::from_secs(timeout)));

        tracing::debug!(host = %settings.host, tls = ?settings.tls, "SMTP transport ready");
        Ok(Self {
            transport: builder.build(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpTransport {
    async fn send_email(&self, email: Email) -> Result<(), MailerError> {
        self.transport.send(email.into_message()?).await?;
        Ok(())
    }
}
