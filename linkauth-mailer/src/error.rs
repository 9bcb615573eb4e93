use thiserror::Error;

#[derive(Error, Debug)]
pub enum MailerError {
    /// The recipient is missing or is not a valid address.
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    /// The recipient's domain is on the disallowed list.
    #[error("Disallowed domain: {0}")]
    DisallowedDomain(String),

    /// A message is missing a sender, a subject or a body.
    #[error("Email builder error: {0}")]
    Builder(String),

    #[error("Email address error: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("Email message error: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("File transport error: {0}")]
    File(#[from] lettre::transport::file::Error),

    #[error("Template error: {0}")]
    Template(#[from] askama::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to load domain list: {0}")]
    DomainList(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MailerError {
    /// Whether the message was refused before reaching a transport.
    pub fn is_recipient_error(&self) -> bool {
        matches!(
            self,
            MailerError::InvalidRecipient(_) | MailerError::DisallowedDomain(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, MailerError>;
