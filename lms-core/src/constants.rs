//! Constants for the LMS course cache.
//!
//! Upstream endpoint names follow the Moodle web-service REST protocol.

use std::time::Duration;

// ═══════════════════════════════════════════════════════════════════════════════
// FRESHNESS THRESHOLDS
// ═══════════════════════════════════════════════════════════════════════════════

/// Age after which a cohort is served but refreshed in the background.
pub const DEFAULT_SOFT_TTL: Duration = Duration::from_secs(60);

/// Age after which a cohort must be refetched before responding.
pub const DEFAULT_HARD_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

// ═══════════════════════════════════════════════════════════════════════════════
// UPSTREAM
// ═══════════════════════════════════════════════════════════════════════════════

/// Upper bound on a single upstream call (connect + response + body), in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 20;

/// REST entry point, relative to the LMS base URL.
pub const WEBSERVICE_REST_PATH: &str = "/webservice/rest/server.php";

/// Web-service function listing the courses a user is enrolled in.
pub const WSFUNCTION_USER_COURSES: &str = "core_enrol_get_users_courses";

/// Response format requested from the REST entry point.
pub const WS_REST_FORMAT: &str = "json";

/// Unauthenticated AJAX entry point, relative to the LMS base URL.
pub const AJAX_NOLOGIN_PATH: &str = "/lib/ajax/service-nologin.php";

/// AJAX method returning the public site configuration.
pub const METHOD_PUBLIC_CONFIG: &str = "tool_mobile_get_public_config";

// ═══════════════════════════════════════════════════════════════════════════════
// BACKGROUND REFRESH
// ═══════════════════════════════════════════════════════════════════════════════

/// Default number of background refreshes allowed to run at once.
pub const DEFAULT_MAX_BACKGROUND_REFRESHES: usize = 4;
