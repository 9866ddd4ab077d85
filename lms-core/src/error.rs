//! Error types for the LMS course cache.
//!
//! Upstream failures (`Timeout`, `Upstream`, `UpstreamStatus`) never reach the
//! caller of the orchestrator; they are logged and degrade to "serve what we
//! have". Store failures must leave the previous cohort intact.

use thiserror::Error;

/// Result type alias using `LmsCacheError`.
pub type Result<T> = std::result::Result<T, LmsCacheError>;

/// Main error type for all cache operations.
#[derive(Debug, Error)]
pub enum LmsCacheError {
    // ═══════════════════════════════════════════════════════════════════════════
    // UPSTREAM ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// The upstream call exceeded its time bound.
    #[error("LMS request timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// The upstream answered with a non-success HTTP status.
    #[error("LMS returned HTTP {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    /// Connection failure or malformed upstream response.
    #[error("LMS upstream error: {0}")]
    Upstream(String),

    /// An upstream record could not be translated into a course.
    #[error("Invalid course record: {0}")]
    InvalidCourse(String),

    // ═══════════════════════════════════════════════════════════════════════════
    // STORAGE ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Persisting or deleting a cohort failed.
    #[error("Cache store error: {0}")]
    Store(String),

    /// File I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    // ═══════════════════════════════════════════════════════════════════════════
    // CONFIGURATION ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Configuration error (bad base URL, unusable HTTP client settings).
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl LmsCacheError {
    /// Returns true if a later attempt may succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            LmsCacheError::Timeout { .. }
                | LmsCacheError::Upstream(_)
                | LmsCacheError::UpstreamStatus { .. }
                | LmsCacheError::Store(_)
                | LmsCacheError::IoError(_)
        )
    }

    /// Returns true if the error originated at the upstream LMS.
    pub fn is_upstream_error(&self) -> bool {
        matches!(
            self,
            LmsCacheError::Timeout { .. }
                | LmsCacheError::Upstream(_)
                | LmsCacheError::UpstreamStatus { .. }
                | LmsCacheError::InvalidCourse(_)
        )
    }
}
