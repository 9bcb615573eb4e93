use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Shortest session a registration, update or issuance may ask for, in seconds.
pub const MIN_SESSION_DURATION: i64 = 60;
/// Longest session any application or link may ask for: ten years, in seconds.
pub const MAX_SESSION_DURATION: i64 = 10 * 365 * 24 * 60 * 60;
/// Users quota given to newly registered applications.
pub const DEFAULT_USERS_QUOTA: u64 = 100;

/// Configuration for the registry and the token engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Session duration used when a caller does not supply one, in seconds.
    /// Default: 3600
    pub default_session_duration: i64,

    /// Users quota for new applications.
    /// Default: 100
    pub default_users_quota: u64,

    /// Floor for every session duration, in seconds.
    /// Default: 60
    pub min_session_duration: i64,

    /// How often expired tokens are swept.
    /// Default: 30 minutes
    pub sweep_interval: Duration,

    /// Upper bound on a single storage call.
    /// Default: 5 seconds
    pub storage_timeout: Duration,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            default_session_duration: 3600,
            default_users_quota: DEFAULT_USERS_QUOTA,
            min_session_duration: MIN_SESSION_DURATION,
            sweep_interval: Duration::from_secs(30 * 60),
            storage_timeout: Duration::from_secs(5),
        }
    }
}

impl TokenConfig {
    /// Reads `LINKAUTH_SESSION_DURATION`, `LINKAUTH_USERS_QUOTA`,
    /// `LINKAUTH_SWEEP_INTERVAL` and `LINKAUTH_STORAGE_TIMEOUT` (all in seconds).
    /// Unset or unparsable variables keep their defaults.
    pub fn from_env() -> Self {
        fn var<T: std::str::FromStr>(name: &str) -> Option<T> {
            std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
        }

        let defaults = Self::default();
        Self {
            default_session_duration: var("LINKAUTH_SESSION_DURATION")
                .unwrap_or(defaults.default_session_duration),
            default_users_quota: var("LINKAUTH_USERS_QUOTA")
                .unwrap_or(defaults.default_users_quota),
            min_session_duration: defaults.min_session_duration,
            sweep_interval: var("LINKAUTH_SWEEP_INTERVAL")
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            storage_timeout: var("LINKAUTH_STORAGE_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(defaults.storage_timeout),
        }
    }

    pub fn with_default_session_duration(mut self, seconds: i64) -> Self {
        self.default_session_duration = seconds;
        self
    }

    pub fn with_users_quota(mut self, quota: u64) -> Self {
        self.default_users_quota = quota;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_storage_timeout(mut self, timeout: Duration) -> Self {
        self.storage_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TokenConfig::default();
        assert_eq!(config.default_session_duration, 3600);
        assert_eq!(config.default_users_quota, 100);
        assert_eq!(config.min_session_duration, 60);
        assert_eq!(config.sweep_interval, Duration::from_secs(1800));
        assert_eq!(config.storage_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_builder_methods() {
        let config = TokenConfig::default()
            .with_users_quota(2)
            .with_storage_timeout(Duration::from_millis(50));
        assert_eq!(config.default_users_quota, 2);
        assert_eq!(config.storage_timeout, Duration::from_millis(50));
    }
}
