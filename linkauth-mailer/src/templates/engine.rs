use crate::{MailerError, templates::TemplateData};
use askama::Template;
use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;

static TAG_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("Invalid tag regex pattern"));
static STYLE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<(style|title)[^>]*>.*?</(style|title)>").expect("Invalid style regex pattern")
});
static BLANK_LINES_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("Invalid whitespace regex pattern"));

#[async_trait]
pub trait TemplateEngine: Send + Sync {
    async fn render_html(
        &self,
        template_name: &str,
        data: TemplateData,
    ) -> Result<String, MailerError>;

    async fn render_text(
        &self,
        template_name: &str,
        data: TemplateData,
    ) -> Result<String, MailerError>;
}

/// Renders the built-in templates compiled in by askama.
#[derive(Debug, Clone, Default)]
pub struct AskamaTemplateEngine;

impl AskamaTemplateEngine {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TemplateEngine for AskamaTemplateEngine {
    async fn render_html(
        &self,
        template_name: &str,
        data: TemplateData,
    ) -> Result<String, MailerError> {
        match template_name {
            "magic_link" => Ok(crate::templates::MagicLinkTemplate::from_data(data)?.render()?),
            "app_created" => Ok(crate::templates::AppCreatedTemplate::from_data(data)?.render()?),
            other => Err(MailerError::Builder(format!("Unknown template: {other}"))),
        }
    }

    async fn render_text(
        &self,
        template_name: &str,
        data: TemplateData,
    ) -> Result<String, MailerError> {
        let html = self.render_html(template_name, data).await?;
        Ok(html_to_text(&html))
    }
}

/// Strips markup from a rendered template to produce the plain text alternative.
fn html_to_text(html: &str) -> String {
    let text = STYLE_REGEX.replace_all(html, "");
    let text = text
        .replace("<br>", "\n")
        .replace("<br/>", "\n")
        .replace("<br />", "\n")
        .replace("</p>", "\n\n")
        .replace("</div>", "\n");
    let text = TAG_REGEX.replace_all(&text, "");
    let text = text
        .replace("&#x2f;", "/")
        .replace("&#x27;", "'")
        .replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&");
    let text = BLANK_LINES_REGEX.replace_all(&text, "\n\n");

    text.lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn magic_link_data() -> TemplateData {
        TemplateData::new()
            .insert("app_name", "Test App")
            .unwrap()
            .insert("email_handle", "john")
            .unwrap()
            .insert("magic_link", "https://example.com/cb?token=abc")
            .unwrap()
            .insert("token", "0a1b2c3d-4e5f6a7b-0011223344556677")
            .unwrap()
    }

    #[tokio::test]
    async fn test_render_html() {
        let engine = AskamaTemplateEngine::new();
        let html = engine.render_html("magic_link", magic_link_data()).await.unwrap();

        assert!(html.contains("Test App"));
        assert!(html.contains("0a1b2c3d-4e5f6a7b-0011223344556677"));
    }

    #[tokio::test]
    async fn test_render_text_strips_markup() {
        let engine = AskamaTemplateEngine::new();
        let text = engine.render_text("magic_link", magic_link_data()).await.unwrap();

        assert!(!text.contains('<'));
        assert!(!text.contains("font-family"));
        assert!(text.contains("https://example.com/cb?token=abc"));
        assert!(text.starts_with("Hi john,"));
    }

    #[tokio::test]
    async fn test_unknown_template() {
        let engine = AskamaTemplateEngine::new();
        let result = engine.render_html("welcome", TemplateData::new()).await;
        assert!(matches!(result, Err(MailerError::Builder(_))));
    }
}
