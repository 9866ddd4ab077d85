//! LMS web-service client implementation.
//!
//! Every call is a single GET bounded by `request_timeout` (connect, response,
//! and body together). Nothing is retried here.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};
use url::Url;

use lms_core::constants::{
    AJAX_NOLOGIN_PATH, DEFAULT_REQUEST_TIMEOUT_SECS, METHOD_PUBLIC_CONFIG, WEBSERVICE_REST_PATH,
    WSFUNCTION_USER_COURSES, WS_REST_FORMAT,
};
use lms_core::error::{LmsCacheError, Result};
use lms_core::traits::CourseSource;
use lms_core::types::{normalize_base_url, RawCourse};

/// Longest slice of an error body kept in error messages.
const MAX_ERROR_BODY: usize = 256;

/// LMS client configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Upper bound on one upstream call
    pub request_timeout: Duration,
    /// User-Agent header sent upstream
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            user_agent: concat!("lms-cache/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ClientConfig {
    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the User-Agent header.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// Client for the LMS REST and AJAX entry points.
#[derive(Clone, Debug)]
pub struct LmsClient {
    config: ClientConfig,
    http_client: reqwest::Client,
}

impl LmsClient {
    /// Creates a client with the default 20-second bound.
    pub fn new() -> Result<Self> {
        Self::with_config(ClientConfig::default())
    }

    /// Creates a client with the given config.
    pub fn with_config(config: ClientConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| {
                LmsCacheError::ConfigError(format!("failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// Returns the active configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Lists the courses `lms_user_id` is enrolled in.
    ///
    /// Returns the decoded JSON array unmodified.
    #[instrument(skip(self, token))]
    pub async fn fetch_courses(
        &self,
        base_url: &str,
        token: &str,
        lms_user_id: u64,
    ) -> Result<Vec<RawCourse>> {
        let endpoint = endpoint(base_url, WEBSERVICE_REST_PATH)?;
        let query = [
            ("wstoken", token.to_string()),
            ("wsfunction", WSFUNCTION_USER_COURSES.to_string()),
            ("moodlewsrestformat", WS_REST_FORMAT.to_string()),
            ("userid", lms_user_id.to_string()),
        ];

        let body = self.get_json(endpoint, &query).await?;

        match body {
            Value::Array(courses) => {
                debug!(count = courses.len(), "Fetched enrolled courses");
                Ok(courses)
            }
            Value::Object(ref obj) if obj.contains_key("exception") || obj.contains_key("errorcode") => {
                let message = obj
                    .get("message")
                    .and_then(Value::as_str)
                    .or_else(|| obj.get("errorcode").and_then(Value::as_str))
                    .unwrap_or("unknown error");
                warn!(error = message, "LMS rejected web-service call");
                Err(LmsCacheError::Upstream(format!("LMS exception: {}", message)))
            }
            other => Err(LmsCacheError::Upstream(format!(
                "expected a list of courses, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Fetches the public site configuration of an LMS.
    ///
    /// Requires no token; useful to check that a URL points at a working LMS
    /// before a user configures it.
    #[instrument(skip(self))]
    pub async fn fetch_site_info(&self, base_url: &str) -> Result<Value> {
        let endpoint = endpoint(base_url, AJAX_NOLOGIN_PATH)?;
        let args = serde_json::json!([{
            "index": 0,
            "methodname": METHOD_PUBLIC_CONFIG,
            "args": [],
        }]);
        let query = [("args", args.to_string())];

        let body = self.get_json(endpoint, &query).await?;

        let first = body
            .as_array()
            .and_then(|items| items.first())
            .ok_or_else(|| LmsCacheError::Upstream("LMS returned no site data".into()))?;

        if first.get("error").and_then(Value::as_bool).unwrap_or(false) {
            let message = first
                .pointer("/exception/message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(LmsCacheError::Upstream(format!("LMS exception: {}", message)));
        }

        first
            .get("data")
            .cloned()
            .ok_or_else(|| LmsCacheError::Upstream("LMS site data has no `data` field".into()))
    }

    /// Sends one GET and decodes the JSON body, all within the time bound.
    async fn get_json(&self, endpoint: Url, query: &[(&str, String)]) -> Result<Value> {
        let request = async {
            let response = self
                .http_client
                .get(endpoint)
                .query(query)
                .send()
                .await
                .map_err(|e| self.transport_error(e))?;

            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(LmsCacheError::UpstreamStatus {
                    status: status.as_u16(),
                    body: truncate(&text, MAX_ERROR_BODY),
                });
            }

            let bytes = response.bytes().await.map_err(|e| self.transport_error(e))?;
            serde_json::from_slice::<Value>(&bytes)
                .map_err(|e| LmsCacheError::Upstream(format!("invalid JSON body: {}", e)))
        };

        match tokio::time::timeout(self.config.request_timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(self.timeout_error()),
        }
    }

    fn transport_error(&self, err: reqwest::Error) -> LmsCacheError {
        if err.is_timeout() {
            return self.timeout_error();
        }
        // The URL carries the token, keep it out of messages.
        LmsCacheError::Upstream(err.without_url().to_string())
    }

    fn timeout_error(&self) -> LmsCacheError {
        LmsCacheError::Timeout {
            seconds: self.config.request_timeout.as_secs_f64().ceil() as u64,
        }
    }
}

#[async_trait]
impl CourseSource for LmsClient {
    async fn fetch_courses(
        &self,
        base_url: &str,
        token: &str,
        lms_user_id: u64,
    ) -> Result<Vec<RawCourse>> {
        LmsClient::fetch_courses(self, base_url, token, lms_user_id).await
    }
}

/// Joins a validated base URL with an entry-point path, keeping any subpath
/// the LMS is installed under.
fn endpoint(base_url: &str, path: &str) -> Result<Url> {
    let base = normalize_base_url(base_url);
    let parsed = Url::parse(&base)
        .map_err(|e| LmsCacheError::ConfigError(format!("invalid LMS URL '{}': {}", base, e)))?;

    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(LmsCacheError::ConfigError(format!(
            "LMS URL must be http(s) with a host: '{}'",
            base
        )));
    }

    Url::parse(&format!("{}{}", base, path))
        .map_err(|e| LmsCacheError::ConfigError(format!("invalid LMS URL '{}': {}", base, e)))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}
