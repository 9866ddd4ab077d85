//! Cache configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use lms_client::ClientConfig;
use lms_core::constants::{DEFAULT_HARD_TTL, DEFAULT_MAX_BACKGROUND_REFRESHES, DEFAULT_SOFT_TTL};
use lms_core::error::{LmsCacheError, Result};
use lms_core::FreshnessPolicy;

/// Environment variable overriding the soft TTL, in seconds.
pub const ENV_SOFT_TTL: &str = "LMS_CACHE_SOFT_TTL_SECS";
/// Environment variable overriding the hard TTL, in seconds.
pub const ENV_HARD_TTL: &str = "LMS_CACHE_HARD_TTL_SECS";
/// Environment variable overriding the background pool size.
pub const ENV_MAX_BACKGROUND: &str = "LMS_CACHE_MAX_BACKGROUND";
/// Environment variable overriding the upstream request timeout, in seconds.
pub const ENV_REQUEST_TIMEOUT: &str = "LMS_REQUEST_TIMEOUT_SECS";

/// Cache configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Upstream client settings
    pub client: ClientConfig,
    /// Age after which a cohort is refreshed in the background
    pub soft_ttl: Duration,
    /// Age after which a cohort is refetched before answering
    pub hard_ttl: Duration,
    /// Background refreshes allowed to run at once
    pub max_background_refreshes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            client: ClientConfig::default(),
            soft_ttl: DEFAULT_SOFT_TTL,
            hard_ttl: DEFAULT_HARD_TTL,
            max_background_refreshes: DEFAULT_MAX_BACKGROUND_REFRESHES,
        }
    }
}

impl CacheConfig {
    /// Loads configuration from the environment (and `.env`, if present).
    ///
    /// Unset variables keep their defaults; a set but unparsable variable is
    /// a `ConfigError`.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let mut config = Self::default();
        if let Some(secs) = env_u64(ENV_SOFT_TTL)? {
            config.soft_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64(ENV_HARD_TTL)? {
            config.hard_ttl = Duration::from_secs(secs);
        }
        if let Some(max) = env_u64(ENV_MAX_BACKGROUND)? {
            config.max_background_refreshes = max as usize;
        }
        if let Some(secs) = env_u64(ENV_REQUEST_TIMEOUT)? {
            config.client.request_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    /// Sets both TTLs.
    #[must_use]
    pub fn with_ttls(mut self, soft_ttl: Duration, hard_ttl: Duration) -> Self {
        self.soft_ttl = soft_ttl;
        self.hard_ttl = hard_ttl;
        self
    }

    /// Sets the background pool size.
    #[must_use]
    pub fn with_max_background_refreshes(mut self, max: usize) -> Self {
        self.max_background_refreshes = max;
        self
    }

    /// Sets the upstream client settings.
    #[must_use]
    pub fn with_client(mut self, client: ClientConfig) -> Self {
        self.client = client;
        self
    }

    /// Returns the freshness policy for these TTLs.
    pub fn policy(&self) -> FreshnessPolicy {
        FreshnessPolicy::new(self.soft_ttl, self.hard_ttl)
    }
}

fn env_u64(name: &str) -> Result<Option<u64>> {
    match std::env::var(name) {
        Ok(value) => parse_u64(name, &value).map(Some),
        Err(_) => Ok(None),
    }
}

fn parse_u64(name: &str, value: &str) -> Result<u64> {
    value.trim().parse().map_err(|_| {
        LmsCacheError::ConfigError(format!("{} must be a non-negative integer, got {:?}", name, value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.soft_ttl, Duration::from_secs(60));
        assert_eq!(config.hard_ttl, Duration::from_secs(7 * 24 * 60 * 60));
        assert_eq!(config.max_background_refreshes, 4);
        assert_eq!(config.client.request_timeout, Duration::from_secs(20));
    }

    #[test]
    fn test_builders_and_policy() {
        let config = CacheConfig::default()
            .with_ttls(Duration::from_secs(300), Duration::from_secs(60))
            .with_max_background_refreshes(1)
            .with_client(ClientConfig::default().with_timeout(Duration::from_secs(5)));

        assert_eq!(config.max_background_refreshes, 1);
        assert_eq!(config.client.request_timeout, Duration::from_secs(5));

        // Hard TTL is clamped up to the soft TTL
        let policy = config.policy();
        assert_eq!(policy.soft_ttl, Duration::from_secs(300));
        assert_eq!(policy.hard_ttl, Duration::from_secs(300));
    }

    #[test]
    fn test_parse_u64() {
        assert_eq!(parse_u64(ENV_SOFT_TTL, " 90 ").unwrap(), 90);
        assert!(parse_u64(ENV_SOFT_TTL, "ninety").is_err());
        assert!(parse_u64(ENV_SOFT_TTL, "-1").is_err());
    }

    #[test]
    fn test_from_env() {
        // Only test in this crate touching these variables.
        std::env::set_var(ENV_SOFT_TTL, "120");
        std::env::set_var(ENV_MAX_BACKGROUND, "2");
        std::env::set_var(ENV_REQUEST_TIMEOUT, "3");
        std::env::remove_var(ENV_HARD_TTL);

        let config = CacheConfig::from_env().unwrap();
        assert_eq!(config.soft_ttl, Duration::from_secs(120));
        assert_eq!(config.hard_ttl, DEFAULT_HARD_TTL);
        assert_eq!(config.max_background_refreshes, 2);
        assert_eq!(config.client.request_timeout, Duration::from_secs(3));

        std::env::set_var(ENV_HARD_TTL, "soon");
        let err = CacheConfig::from_env().unwrap_err();
        assert!(matches!(err, LmsCacheError::ConfigError(_)));

        for name in [ENV_SOFT_TTL, ENV_HARD_TTL, ENV_MAX_BACKGROUND, ENV_REQUEST_TIMEOUT] {
            std::env::remove_var(name);
        }
    }
}
