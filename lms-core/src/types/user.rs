//! Caller identity and LMS credentials.

use serde::{Deserialize, Serialize};

use super::course::CacheKey;

/// Credentials for the upstream LMS. Owned by the caller, never persisted.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// LMS base URL, e.g. `https://moodle.example.org`
    pub lms_base_url: String,
    /// Web-service token
    pub api_token: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("lms_base_url", &self.lms_base_url)
            .field("api_token", &"<redacted>")
            .finish()
    }
}

/// The user a course listing is requested for.
#[derive(Clone, Serialize, Deserialize)]
pub struct LmsUser {
    /// Application-side user id; owner of cached rows
    pub id: String,
    /// Numeric user id on the LMS (`userid` query parameter)
    pub lms_user_id: u64,
    /// Configured LMS base URL, if any
    pub lms_base_url: Option<String>,
    /// Configured web-service token, if any
    pub api_token: Option<String>,
}

impl LmsUser {
    /// Creates a user without any LMS integration configured.
    pub fn new(id: impl Into<String>, lms_user_id: u64) -> Self {
        Self {
            id: id.into(),
            lms_user_id,
            lms_base_url: None,
            api_token: None,
        }
    }

    /// Sets the LMS base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.lms_base_url = Some(url.into());
        self
    }

    /// Sets the web-service token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    /// Returns the cache key, or `None` without a usable base URL.
    pub fn cache_key(&self) -> Option<CacheKey> {
        self.lms_base_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .map(|url| CacheKey::new(self.id.clone(), url))
    }

    /// Returns credentials when both base URL and token are configured.
    pub fn credentials(&self) -> Option<Credentials> {
        match (self.lms_base_url.as_deref(), self.api_token.as_deref()) {
            (Some(url), Some(token)) if !url.trim().is_empty() && !token.is_empty() => {
                Some(Credentials {
                    lms_base_url: url.to_string(),
                    api_token: token.to_string(),
                })
            }
            _ => None,
        }
    }
}

impl std::fmt::Debug for LmsUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmsUser")
            .field("id", &self.id)
            .field("lms_user_id", &self.lms_user_id)
            .field("lms_base_url", &self.lms_base_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
