use crate::{
    Email, MailerError, address_handle,
    templates::{AppDetails, TemplateData, TemplateEngine},
};

/// Message carrying a user's magic link and raw token.
pub struct MagicLinkEmail;

impl MagicLinkEmail {
    pub fn subject(app_name: &str) -> String {
        format!("Here is your magic link for '{app_name}' 🔐")
    }

    pub async fn build<T: TemplateEngine + ?Sized>(
        engine: &T,
        from: &str,
        to: &str,
        app_name: &str,
        magic_link: &str,
        token: &str,
    ) -> Result<Email, MailerError> {
        let template_data = TemplateData::new()
            .insert("app_name", app_name)?
            .insert("email_handle", address_handle(to))?
            .insert("magic_link", magic_link)?
            .insert("token", token)?;

        let html_body = engine
            .render_html("magic_link", template_data.clone())
            .await?;
        let text_body = engine.render_text("magic_link", template_data).await?;

        let email = Email::new(from, to, Self::subject(app_name))
            .with_html(html_body)
            .with_text(text_body);
        email.validate()?;
        Ok(email)
    }
}

/// Message handing a new application's id and one-time secret to its owner.
pub struct AppCreatedEmail;

impl AppCreatedEmail {
    pub fn subject(app_name: &str) -> String {
        format!("Your app '{app_name}' is ready! 🎉")
    }

    pub async fn build<T: TemplateEngine + ?Sized>(
        engine: &T,
        from: &str,
        to: &str,
        app: &AppDetails,
    ) -> Result<Email, MailerError> {
        let template_data = TemplateData::new()
            .insert("app", app)?
            .insert("email_handle", address_handle(to))?;

        let html_body = engine
            .render_html("app_created", template_data.clone())
            .await?;
        let text_body = engine.render_text("app_created", template_data).await?;

        let email = Email::new(from, to, Self::subject(&app.app_name))
            .with_html(html_body)
            .with_text(text_body);
        email.validate()?;
        Ok(email)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::AskamaTemplateEngine;

    #[tokio::test]
    async fn test_magic_link_email() {
        let engine = AskamaTemplateEngine::new();

        let email = MagicLinkEmail::build(
            &engine,
            "noreply@linkauth.dev",
            "john@example.com",
            "Test App",
            "https://testapp.com/cb?token=t",
            "0a1b2c3d-4e5f6a7b-0011223344556677",
        )
        .await
        .unwrap();

        assert_eq!(email.to, "john@example.com");
        assert_eq!(email.from, "noreply@linkauth.dev");
        assert_eq!(email.subject, "Here is your magic link for 'Test App' 🔐");
        assert!(email.html_body.is_some());
        assert!(
            email
                .text_body
                .as_deref()
                .unwrap()
                .contains("0a1b2c3d-4e5f6a7b-0011223344556677")
        );
    }

    #[tokio::test]
    async fn test_app_created_email() {
        let engine = AskamaTemplateEngine::new();
        let app = AppDetails {
            app_id: "0a1b2c3d".to_string(),
            app_name: "Test App".to_string(),
            redirect_url: "https://testapp.com/cb".to_string(),
            secret: "00112233445566778899aabbccddeeff".to_string(),
        };

        let email = AppCreatedEmail::build(&engine, "noreply@linkauth.dev", "owner@example.com", &app)
            .await
            .unwrap();

        assert_eq!(email.subject, "Your app 'Test App' is ready! 🎉");
        assert!(
            email
                .text_body
                .as_deref()
                .unwrap()
                .contains("00112233445566778899aabbccddeeff")
        );
    }

    #[tokio::test]
    async fn test_invalid_recipient_is_rejected() {
        let engine = AskamaTemplateEngine::new();
        let result = MagicLinkEmail::build(
            &engine,
            "noreply@linkauth.dev",
            "not-an-address",
            "Test App",
            "https://testapp.com/cb",
            "a-b-c",
        )
        .await;

        assert!(matches!(result, Err(MailerError::InvalidRecipient(_))));
    }
}
