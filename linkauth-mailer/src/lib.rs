//! Email composition, transports and the asynchronous delivery queue used by linkauth.
//!
//! Messages are built from the templates in [`email_types`], checked against a
//! [`DomainList`] of disallowed domains and pushed onto a [`DeliveryQueue`], whose
//! worker hands them to a [`Mailer`] transport (SMTP or file).
pub mod config;
pub mod disposable;
pub mod email;
pub mod email_types;
pub mod error;
pub mod mailer;
pub mod queue;
pub mod templates;
pub mod transports;

pub use config::{MailerConfig, QueueConfig, TransportConfig};
pub use disposable::DomainList;
pub use email::{Email, address_domain, address_handle, is_valid_address};
pub use email_types::{AppCreatedEmail, MagicLinkEmail};
pub use error::MailerError;
pub use mailer::Mailer;
pub use queue::DeliveryQueue;
pub use templates::{AppDetails, AskamaTemplateEngine, TemplateEngine};
pub use transports::{FileTransport, SmtpSettings, SmtpTransport, TlsMode};
