mod engine;
mod link_templates;

pub use engine::{AskamaTemplateEngine, TemplateEngine};
pub use link_templates::{AppCreatedTemplate, AppDetails, MagicLinkTemplate};

use crate::MailerError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Named values handed to a template. Values are stored as JSON so that any
/// serializable type can be passed through the object-safe [`TemplateEngine`].
#[derive(Debug, Clone, Default)]
pub struct TemplateData {
    values: Map<String, Value>,
}

impl TemplateData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Serialize>(mut self, key: &str, value: T) -> Result<Self, MailerError> {
        self.values.insert(key.to_string(), serde_json::to_value(value)?);
        Ok(self)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Fetches a required string value, failing with a builder error naming the key.
    pub fn require_str(&self, key: &str) -> Result<String, MailerError> {
        self.get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| MailerError::Builder(format!("{key} is required")))
    }

    /// Deserializes a required structured value.
    pub fn require<T: DeserializeOwned>(&self, key: &str) -> Result<T, MailerError> {
        let value = self
            .get(key)
            .cloned()
            .ok_or_else(|| MailerError::Builder(format!("{key} is required")))?;
        Ok(serde_json::from_value(value)?)
    }
}
