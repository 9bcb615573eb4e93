use crate::MailerError;
use lettre::Message;
use lettre::message::{Mailbox, MultiPart, SinglePart};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static ADDRESS_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[\w.+-]+@([\w-]+\.)+[\w-]{2,}$").expect("Invalid address regex pattern")
});

/// Returns true if `address` looks like a deliverable mailbox (`local@domain.tld`).
pub fn is_valid_address(address: &str) -> bool {
    address.len() <= 254 && ADDRESS_REGEX.is_match(address)
}

/// Returns the domain part of an address, lowercased, or `None` if there is no `@`.
pub fn address_domain(address: &str) -> Option<String> {
    address
        .rsplit_once('@')
        .map(|(_, domain)| domain.to_ascii_lowercase())
}

/// Returns the local part of an address, used to greet the recipient.
pub fn address_handle(address: &str) -> &str {
    address.split('@').next().unwrap_or(address)
}

/// A composed message waiting to be handed to a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
    pub to: String,
    pub from: String,
    pub subject: String,
    pub html_body: Option<String>,
    pub text_body: Option<String>,
}

impl Email {
    /// Start a message without a body. Nothing is checked until [`Email::validate`].
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        subject: impl Into<String>,
    ) -> Self {
        Self {
            to: to.into(),
            from: from.into(),
            subject: subject.into(),
            html_body: None,
            text_body: None,
        }
    }

    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html_body = Some(html.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text_body = Some(text.into());
        self
    }

    /// A message is sendable when the recipient is a valid address, the sender and
    /// subject are set and at least one non-empty body is present.
    pub fn validate(&self) -> Result<(), MailerError> {
        if !is_valid_address(&self.to) {
            return Err(MailerError::InvalidRecipient(self.to.clone()));
        }
        if self.from.is_empty() {
            return Err(MailerError::Builder("From address is required".to_string()));
        }
        if self.subject.is_empty() {
            return Err(MailerError::Builder("Subject is required".to_string()));
        }
        if self.html().is_none() && self.text().is_none() {
            return Err(MailerError::Builder(
                "Either HTML or text body is required".to_string(),
            ));
        }
        Ok(())
    }

    fn html(&self) -> Option<&str> {
        self.html_body.as_deref().filter(|b| !b.is_empty())
    }

    fn text(&self) -> Option<&str> {
        self.text_body.as_deref().filter(|b| !b.is_empty())
    }

    /// Convert into a lettre message. With both renditions present the body is a
    /// `multipart/alternative` with the text part first.
    pub fn into_message(self) -> Result<Message, MailerError> {
        let builder = Message::builder()
            .from(self.from.parse::<Mailbox>()?)
            .to(self.to.parse::<Mailbox>()?)
            .subject(self.subject.as_str());

        let message = match (self.html(), self.text()) {
            (Some(html), Some(text)) => builder.multipart(MultiPart::alternative_plain_html(
                text.to_string(),
                html.to_string(),
            ))?,
            (Some(html), None) => builder.singlepart(SinglePart::html(html.to_string()))?,
            (None, Some(text)) => builder.singlepart(SinglePart::plain(text.to_string()))?,
            (None, None) => {
                return Err(MailerError::Builder(
                    "Either HTML or text body is required".to_string(),
                ));
            }
        };
        Ok(message)
    }
}
