//! [`Mailer`](crate::Mailer) implementations backed by lettre.
mod file;
mod smtp;

pub use file::FileTransport;
pub use smtp::{DEFAULT_SMTP_TIMEOUT_SECS, SmtpSettings, SmtpTransport, TlsMode};
