use crate::transports::{SmtpSettings, SmtpTransport, TlsMode};
use crate::{FileTransport, Mailer, MailerError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Default number of immediate send attempts per dequeued message.
pub const DEFAULT_SEND_RETRIES: u32 = 3;

/// Directory used by the file transport when nothing else is configured.
pub const DEFAULT_OUTPUT_DIR: &str = "./emails";

/// How outgoing mail leaves the process and who it is from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailerConfig {
    pub transport: TransportConfig,
    /// Sender address. Also the SMTP login when no username is set.
    pub from_address: String,
    pub from_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportConfig {
    Smtp(SmtpSettings),
    File { output_dir: PathBuf },
}

impl MailerConfig {
    /// Read `MAILER_*` variables.
    ///
    /// `MAILER_SMTP_HOST` selects SMTP, configured further by `MAILER_SMTP_PORT`,
    /// `MAILER_SMTP_USERNAME`, `MAILER_SMTP_PASSWORD`, `MAILER_SMTP_TLS`
    /// (`none`, `starttls` or `tls`) and `MAILER_SMTP_TIMEOUT` in seconds. Otherwise
    /// messages are written to `MAILER_FILE_OUTPUT_DIR`, or `./emails`. A variable
    /// that is set but cannot be parsed is an error.
    pub fn from_env() -> Result<Self, MailerError> {
        let transport = match env("MAILER_SMTP_HOST") {
            Some(host) => TransportConfig::Smtp(SmtpSettings {
                host,
                port: parsed_env("MAILER_SMTP_PORT")?,
                username: env("MAILER_SMTP_USERNAME"),
                password: env("MAILER_SMTP_PASSWORD"),
                tls: parsed_env::<TlsMode>("MAILER_SMTP_TLS")?.unwrap_or_default(),
                timeout_secs: parsed_env("MAILER_SMTP_TIMEOUT")?,
            }),
            None => TransportConfig::File {
                output_dir: env("MAILER_FILE_OUTPUT_DIR")
                    .unwrap_or_else(|| DEFAULT_OUTPUT_DIR.to_string())
                    .into(),
            },
        };

        let defaults = Self::default();
        Ok(Self {
            transport,
            from_address: env("MAILER_FROM_ADDRESS").unwrap_or(defaults.from_address),
            from_name: env("MAILER_FROM_NAME"),
        })
    }

    pub fn build_transport(&self) -> Result<Box<dyn Mailer>, MailerError> {
        match &self.transport {
            TransportConfig::Smtp(settings) => {
                Ok(Box::new(SmtpTransport::connect(settings, &self.from_address)?))
            }
            TransportConfig::File { output_dir } => Ok(Box::new(FileTransport::new(output_dir)?)),
        }
    }

    /// The `From` header value, with the display name when one is set.
    pub fn sender(&self) -> String {
        match &self.from_name {
            Some(name) => format!("{name} <{}>", self.from_address),
            None => self.from_address.clone(),
        }
    }
}

impl Default for MailerConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::File {
                output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            },
            from_address: "noreply@example.com".to_string(),
            from_name: None,
        }
    }
}

fn env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parsed_env<T: FromStr>(name: &str) -> Result<Option<T>, MailerError> {
    env(name)
        .map(|value| {
            value
                .parse()
                .map_err(|_| MailerError::Config(format!("Invalid value for {name}: {value}")))
        })
        .transpose()
}

/// Settings for the delivery queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Immediate send attempts before a message is dropped.
    /// Default: 3
    pub send_retries: u32,

    /// Where the disallowed domain list is loaded from, a URL or a file path.
    /// Default: none, every domain is allowed
    pub disposable_source: Option<String>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            send_retries: DEFAULT_SEND_RETRIES,
            disposable_source: None,
        }
    }
}

impl QueueConfig {
    /// Reads `LINKAUTH_SEND_RETRIES` and `LINKAUTH_DISPOSABLE_SRC`, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            send_retries: std::env::var("LINKAUTH_SEND_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.send_retries),
            disposable_source: std::env::var("LINKAUTH_DISPOSABLE_SRC")
                .ok()
                .filter(|s| !s.is_empty()),
        }
    }

    pub fn with_send_retries(mut self, send_retries: u32) -> Self {
        self.send_retries = send_retries;
        self
    }

    pub fn with_disposable_source<S: Into<String>>(mut self, source: S) -> Self {
        self.disposable_source = Some(source.into());
        self
    }
}
