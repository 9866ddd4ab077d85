//! # LMS Store
//!
//! Cohort storage for the course cache.
//!
//! This crate provides two backends for [`CourseStore`]:
//!
//! - **Memory**: Fast in-memory storage for development and testing
//! - **File**: Persistent snapshot-file storage for single-node deployments
//!
//! Both replace a key's cohort in one step, so readers never see a mix of
//! old and new rows.
//!
//! ## Example
//!
//! ```rust,ignore
//! use lms_store::{MemoryCourseStore, CourseStore};
//!
//! let store = MemoryCourseStore::new();
//! store.replace(&key, vec![Course::new(1, "Algebra")]).await?;
//! let cohort = store.get(&key).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod file;
mod memory;

pub use file::FileCourseStore;
pub use memory::MemoryCourseStore;

// Re-export the trait from core
pub use lms_core::traits::CourseStore;
