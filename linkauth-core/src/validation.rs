use crate::{config::MAX_SESSION_DURATION, error::ValidationError};
use chrono::{DateTime, TimeDelta, Utc};
use regex::Regex;
use std::sync::LazyLock;
use url::Url;

/// Lazy-loaded email validation regex
///
/// This regex validates email addresses according to a practical subset of RFC 5322.
static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
        .expect("Invalid email regex pattern")
});

/// Validates an email address
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if email.is_empty() {
        return Err(ValidationError::MissingField(
            "Email is required".to_string(),
        ));
    }

    if email.len() > 254 {
        return Err(ValidationError::InvalidEmail(
            "Email is too long".to_string(),
        ));
    }

    if EMAIL_REGEX.is_match(email) {
        Ok(())
    } else {
        Err(ValidationError::InvalidEmail(format!(
            "Invalid email format: {email}"
        )))
    }
}

/// Validates a display name. Must be non-empty and at most 255 characters.
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::MissingField("Name is required".to_string()));
    }

    if name.chars().count() > 255 {
        return Err(ValidationError::InvalidField(
            "Name cannot exceed 255 characters".to_string(),
        ));
    }

    Ok(())
}

/// Parses a redirect URL; only absolute http(s) URLs are accepted.
pub fn validate_redirect_url(redirect_url: &str) -> Result<Url, ValidationError> {
    if redirect_url.is_empty() {
        return Err(ValidationError::MissingField(
            "Redirect URL is required".to_string(),
        ));
    }

    let url = Url::parse(redirect_url)
        .map_err(|e| ValidationError::InvalidUrl(format!("{redirect_url}: {e}")))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(ValidationError::InvalidUrl(format!(
            "Unsupported scheme: {scheme}"
        ))),
    }
}

/// Session durations are whole seconds, at least `min_secs` and at most
/// [`MAX_SESSION_DURATION`].
pub fn validate_duration(duration_secs: i64, min_secs: i64) -> Result<(), ValidationError> {
    if duration_secs < min_secs {
        return Err(ValidationError::InvalidDuration(format!(
            "Duration must be at least {min_secs} seconds, got {duration_secs}"
        )));
    }
    if duration_secs > MAX_SESSION_DURATION {
        return Err(ValidationError::InvalidDuration(format!(
            "Duration must be at most {MAX_SESSION_DURATION} seconds, got {duration_secs}"
        )));
    }
    Ok(())
}

/// The instant `duration_secs` after `now`, or `InvalidDuration` if it cannot be
/// represented.
pub fn expiry_after(
    now: DateTime<Utc>,
    duration_secs: i64,
) -> Result<DateTime<Utc>, ValidationError> {
    TimeDelta::try_seconds(duration_secs)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| {
            ValidationError::InvalidDuration(format!(
                "Duration of {duration_secs} seconds is out of range"
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("user.name+tag@example.co.uk").is_ok());

        assert!(matches!(
            validate_email(""),
            Err(ValidationError::MissingField(_))
        ));
        assert!(matches!(
            validate_email("invalid-email"),
            Err(ValidationError::InvalidEmail(_))
        ));
        let long_email = format!("{}@example.com", "a".repeat(250));
        assert!(validate_email(&long_email).is_err());
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("My App").is_ok());
        assert!(validate_name("   ").is_err());
        assert!(validate_name(&"a".repeat(256)).is_err());
    }

    #[test]
    fn test_validate_redirect_url() {
        let url = validate_redirect_url("https://x.com/cb?from=mail#top").unwrap();
        assert_eq!(url.path(), "/cb");

        assert!(matches!(
            validate_redirect_url(""),
            Err(ValidationError::MissingField(_))
        ));
        assert!(matches!(
            validate_redirect_url("/relative/path"),
            Err(ValidationError::InvalidUrl(_))
        ));
        assert!(matches!(
            validate_redirect_url("ftp://x.com/file"),
            Err(ValidationError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_validate_duration() {
        assert!(validate_duration(60, 60).is_ok());
        assert!(validate_duration(3600, 60).is_ok());
        assert!(matches!(
            validate_duration(59, 60),
            Err(ValidationError::InvalidDuration(_))
        ));
        assert!(validate_duration(MAX_SESSION_DURATION, 60).is_ok());
        assert!(matches!(
            validate_duration(MAX_SESSION_DURATION + 1, 60),
            Err(ValidationError::InvalidDuration(_))
        ));
        assert!(matches!(
            validate_duration(i64::MAX, 60),
            Err(ValidationError::InvalidDuration(_))
        ));
    }

    #[test]
    fn test_expiry_after() {
        let now = Utc::now();
        assert_eq!(expiry_after(now, 60).unwrap(), now + TimeDelta::seconds(60));
        assert!(matches!(
            expiry_after(now, i64::MAX / 2),
            Err(ValidationError::InvalidDuration(_))
        ));
        assert!(matches!(
            expiry_after(now, i64::MAX),
            Err(ValidationError::InvalidDuration(_))
        ));
    }
}
