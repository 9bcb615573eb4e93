use crate::{MailerError, templates::TemplateData};
use askama::Template;
use serde::{Deserialize, Serialize};

/// What the owner of a freshly registered application needs to start issuing links.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppDetails {
    pub app_id: String,
    pub app_name: String,
    pub redirect_url: String,
    pub secret: String,
}

#[derive(Template)]
#[template(
    source = r#"
<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Magic Link - {{ app_name }}</title>
    <style>
        body { font-family: Arial, sans-serif; line-height: 1.6; color: #333; margin: 0; padding: 20px; background-color: #f4f4f4; }
        .container { max-width: 600px; margin: 0 auto; background: white; padding: 30px; border-radius: 8px; box-shadow: 0 2px 10px rgba(0,0,0,0.1); }
        .button { display: inline-block; padding: 12px 24px; background-color: #007bff; color: white; text-decoration: none; border-radius: 4px; margin: 20px 0; }
        .code { word-break: break-all; background: #f8f9fa; padding: 10px; border-radius: 4px; font-family: monospace; }
    </style>
</head>
<body>
    <div class="container">
        <p>Hi {{ email_handle }},</p>

        <p>Use the button below to sign in to <strong>{{ app_name }}</strong>.</p>

        <div style="text-align: center;">
            <a href="{{ magic_link }}" class="button">Sign In</a>
        </div>

        <p>Or copy and paste this URL into your browser:</p>
        <p class="code">{{ magic_link }}</p>

        <p>If the application asks for a code instead, use this token:</p>
        <p class="code">{{ token }}</p>

        <p>If you didn't request this email, you can safely ignore it.</p>
    </div>
</body>
</html>
"#,
    ext = "html"
)]
pub struct MagicLinkTemplate {
    pub app_name: String,
    pub email_handle: String,
    pub magic_link: String,
    pub token: String,
}

impl MagicLinkTemplate {
    pub fn from_data(data: TemplateData) -> Result<Self, MailerError> {
        Ok(Self {
            app_name: data.require_str("app_name")?,
            email_handle: data.require_str("email_handle")?,
            magic_link: data.require_str("magic_link")?,
            token: data.require_str("token")?,
        })
    }
}

#[derive(Template)]
#[template(
    source = r#"
<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Your app {{ app_name }} is ready</title>
    <style>
        body { font-family: Arial, sans-serif; line-height: 1.6; color: #333; margin: 0; padding: 20px; background-color: #f4f4f4; }
        .container { max-width: 600px; margin: 0 auto; background: white; padding: 30px; border-radius: 8px; box-shadow: 0 2px 10px rgba(0,0,0,0.1); }
        .code { word-break: break-all; background: #f8f9fa; padding: 10px; border-radius: 4px; font-family: monospace; }
        .warning { background-color: #fff3cd; border: 1px solid #ffeeba; color: #856404; padding: 15px; border-radius: 4px; margin: 20px 0; }
    </style>
</head>
<body>
    <div class="container">
        <p>Hi {{ email_handle }},</p>

        <p>Your application <strong>{{ app_name }}</strong> has been registered.</p>

        <p>Application ID:</p>
        <p class="code">{{ app_id }}</p>

        <p>Magic links will redirect to:</p>
        <p class="code">{{ redirect_url }}</p>

        <p>Application secret:</p>
        <p class="code">{{ secret }}</p>

        <div class="warning">
            <p>This secret is shown only once and cannot be recovered. Store it somewhere safe and never share it publicly.</p>
        </div>
    </div>
</body>
</html>
"#,
    ext = "html"
)]
pub struct AppCreatedTemplate {
    pub app_id: String,
    pub app_name: String,
    pub redirect_url: String,
    pub secret: String,
    pub email_handle: String,
}

impl AppCreatedTemplate {
    pub fn from_data(data: TemplateData) -> Result<Self, MailerError> {
        let app: AppDetails = data.require("app")?;

        Ok(Self {
            app_id: app.app_id,
            app_name: app.app_name,
            redirect_url: app.redirect_url,
            secret: app.secret,
            email_handle: data.require_str("email_handle")?,
        })
    }
}
