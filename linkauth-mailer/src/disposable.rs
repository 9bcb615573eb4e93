//! Disallowed (disposable) email domains.
//!
//! The list is a plain newline separated file, one domain per line, in the format
//! used by the public disposable-email blocklists. It is loaded once at startup
//! from a local file or a remote URL and consulted by the delivery queue before
//! any message is accepted.

use crate::MailerError;
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

static DOMAIN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-z0-9]+(-[a-z0-9]+)*\.)+[a-z]{2,}$").expect("Invalid domain regex pattern")
});

/// Remote lists are fetched with this deadline so startup cannot hang on a slow host.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default)]
pub struct DomainList {
    domains: HashSet<String>,
}

impl DomainList {
    /// An empty list, which allows every domain.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parses newline separated domains. Blank lines, `#` comments and lines that
    /// are not well formed lowercase domains are skipped.
    pub fn parse(text: &str) -> Self {
        let domains = text
            .lines()
            .map(str::trim)
            .filter(|line| DOMAIN_REGEX.is_match(line))
            .map(str::to_string)
            .collect();
        Self { domains }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, MailerError> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::parse(&text))
    }

    pub async fn fetch(url: &str) -> Result<Self, MailerError> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| MailerError::DomainList(e.to_string()))?;

        let text = client
            .get(url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| MailerError::DomainList(e.to_string()))?
            .text()
            .await
            .map_err(|e| MailerError::DomainList(e.to_string()))?;

        let list = Self::parse(&text);
        tracing::info!(url = %url, domains = list.len(), "Loaded disallowed domain list");
        Ok(list)
    }

    /// Loads from `source`, which is fetched when it is an http(s) URL and read from
    /// disk otherwise.
    pub async fn load(source: &str) -> Result<Self, MailerError> {
        if source.starts_with("http://") || source.starts_with("https://") {
            Self::fetch(source).await
        } else {
            Self::from_file(source)
        }
    }

    pub fn contains(&self, domain: &str) -> bool {
        self.domains.contains(&domain.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for DomainList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            domains: iter
                .into_iter()
                .map(|d| d.into().to_ascii_lowercase())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_skips_invalid_lines() {
        let list = DomainList::parse(
            "# disposable domains\n\
             mailinator.com\n\
             \n\
             10minute-mail.net\n\
             Not A Domain\n\
             localhost\n\
             trash-mail.co.uk\n",
        );

        assert_eq!(list.len(), 3);
        assert!(list.contains("mailinator.com"));
        assert!(list.contains("MAILINATOR.COM"));
        assert!(list.contains("trash-mail.co.uk"));
        assert!(!list.contains("localhost"));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "yopmail.com").unwrap();
        writeln!(file, "guerrillamail.com").unwrap();

        let list = DomainList::from_file(file.path()).unwrap();
        assert_eq!(list.len(), 2);
        assert!(list.contains("yopmail.com"));
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let result = DomainList::load("/nonexistent/linkauth/domains.conf").await;
        assert!(matches!(result, Err(MailerError::Io(_))));
    }

    #[test]
    fn test_empty_list() {
        let list = DomainList::empty();
        assert!(list.is_empty());
        assert!(!list.contains("example.com"));
    }
}
