//! # LMS Core
//!
//! Core types, errors, and traits for the LMS course-enrollment cache.
//!
//! This crate provides the foundational building blocks used by all other crates
//! in the workspace:
//!
//! - **Types**: Course records, cache keys, and caller identities
//! - **Errors**: The error taxonomy shared by client, store, and orchestrator
//! - **Constants**: Upstream endpoint names and default TTLs
//! - **Traits**: Seams for the upstream course source and the cache store
//! - **Freshness**: The policy that decides between serving, refreshing, or both
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//! use lms_core::{Freshness, FreshnessPolicy};
//!
//! let policy = FreshnessPolicy::default();
//! assert_eq!(policy.classify(None), Freshness::Missing);
//! assert_eq!(policy.classify(Some(Duration::from_secs(90))), Freshness::Stale);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, clippy::all)]

pub mod constants;
pub mod error;
pub mod freshness;
pub mod traits;
pub mod types;

// Re-export commonly used items at crate root
pub use constants::*;
pub use error::{LmsCacheError, Result};
pub use freshness::{cohort_age, Freshness, FreshnessPolicy};
pub use traits::*;
pub use types::*;
