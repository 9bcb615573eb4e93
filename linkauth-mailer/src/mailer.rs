use crate::{Email, MailerError};
use async_trait::async_trait;
use std::sync::Arc;

/// A transport able to hand a composed [`Email`] to a mail server.
///
/// Implementations are expected to be safe to call again with the same message
/// after a failure; the delivery queue retries sends without any deduplication.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_email(&self, email: Email) -> Result<(), MailerError>;
}

#[async_trait]
impl<T: Mailer + ?Sized> Mailer for Arc<T> {
    async fn send_email(&self, email: Email) -> Result<(), MailerError> {
        (**self).send_email(email).await
    }
}

#[async_trait]
impl<T: Mailer + ?Sized> Mailer for Box<T> {
    async fn send_email(&self, email: Email) -> Result<(), MailerError> {
        (**self).send_email(email).await
    }
}
