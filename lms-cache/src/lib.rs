//! # LMS Cache
//!
//! Stale-while-revalidate cache of LMS course enrollments.
//!
//! [`RefreshOrchestrator`] answers "which courses is this user enrolled in?"
//! from a [`CourseStore`](lms_core::CourseStore), and decides per request,
//! using the [`FreshnessPolicy`](lms_core::FreshnessPolicy), whether to serve
//! the cached cohort as-is, serve it while refreshing in the background, or
//! refetch before answering.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lms_cache::{CacheConfig, RefreshOrchestrator};
//! use lms_core::LmsUser;
//! use lms_store::MemoryCourseStore;
//!
//! # async fn run() -> lms_core::Result<()> {
//! let config = CacheConfig::from_env()?;
//! let orchestrator = RefreshOrchestrator::from_config(&config, Arc::new(MemoryCourseStore::new()))?;
//!
//! let user = LmsUser::new("user-1", 42)
//!     .with_base_url("https://moodle.example.org")
//!     .with_token("secret");
//! let courses = orchestrator.get_user_courses(&user).await;
//! println!("{} courses", courses.len());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

mod config;
mod inflight;
mod orchestrator;
mod stats;

pub use config::CacheConfig;
pub use orchestrator::RefreshOrchestrator;
pub use stats::CacheStats;
