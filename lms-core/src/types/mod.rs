//! Domain types for the course cache.
//!
//! - [`Course`]: caller-facing course shape
//! - [`CourseRecord`]: a cached course stamped with its key and `cached_at`
//! - [`CacheKey`]: (owner user, LMS base URL), one enrollment snapshot per key
//! - [`LmsUser`]: caller identity plus optional LMS credentials

mod course;
mod user;

pub use course::*;
pub use user::*;
