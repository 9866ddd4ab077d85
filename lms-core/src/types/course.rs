//! Course types and the upstream-to-cache translation step.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{LmsCacheError, Result};

/// A course exactly as decoded from the upstream LMS, before translation.
pub type RawCourse = Value;

/// Opaque course identifier assigned by the LMS.
///
/// Moodle sends numeric ids, but other deployments may use strings, so the id
/// is kept as text and never interpreted.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CourseId(String);

impl CourseId {
    /// Creates an id from its textual form.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the textual form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Extracts an id from an upstream JSON value (number or non-empty string).
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Number(n) => Ok(Self(n.to_string())),
            Value::String(s) if !s.trim().is_empty() => Ok(Self(s.trim().to_string())),
            other => Err(LmsCacheError::InvalidCourse(format!(
                "unsupported course id: {}",
                other
            ))),
        }
    }
}

impl From<i32> for CourseId {
    fn from(id: i32) -> Self {
        Self(id.to_string())
    }
}

impl From<i64> for CourseId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<u64> for CourseId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for CourseId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for CourseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Caller-facing course shape.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    /// Identifier assigned by the LMS
    pub course_id: CourseId,
    /// Display name
    pub name: String,
    /// Teacher name, empty when unknown
    #[serde(default)]
    pub teacher: String,
}

impl Course {
    /// Creates a course with no teacher.
    pub fn new(course_id: impl Into<CourseId>, name: impl Into<String>) -> Self {
        Self {
            course_id: course_id.into(),
            name: name.into(),
            teacher: String::new(),
        }
    }

    /// Sets the teacher name.
    pub fn with_teacher(mut self, teacher: impl Into<String>) -> Self {
        self.teacher = teacher.into();
        self
    }

    /// Translates one upstream record.
    ///
    /// `id` becomes `course_id`, `displayname` becomes `name`, and `teacher`
    /// defaults to empty. Everything else the LMS sends is ignored.
    pub fn from_raw(raw: &RawCourse) -> Result<Self> {
        let obj = raw.as_object().ok_or_else(|| {
            LmsCacheError::InvalidCourse(format!("expected object, got {}", raw))
        })?;

        let course_id = obj
            .get("id")
            .ok_or_else(|| LmsCacheError::InvalidCourse("missing field `id`".into()))
            .and_then(CourseId::from_value)?;

        let name = obj
            .get("displayname")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                LmsCacheError::InvalidCourse(format!(
                    "course {} has no string `displayname`",
                    course_id
                ))
            })?
            .to_string();

        let teacher = obj
            .get("teacher")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Ok(Self {
            course_id,
            name,
            teacher,
        })
    }

    /// Translates a whole upstream listing. One bad record rejects the batch.
    pub fn from_raw_list(raw: &[RawCourse]) -> Result<Vec<Self>> {
        raw.iter().map(Self::from_raw).collect()
    }
}

/// Identifies one enrollment snapshot: (owner user, LMS base URL).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    owner_user_id: String,
    lms_base_url: String,
}

impl CacheKey {
    /// Creates a key, normalizing the base URL so `https://lms/` and
    /// `https://lms` address the same snapshot.
    pub fn new(owner_user_id: impl Into<String>, lms_base_url: impl AsRef<str>) -> Self {
        Self {
            owner_user_id: owner_user_id.into(),
            lms_base_url: normalize_base_url(lms_base_url.as_ref()),
        }
    }

    /// The user owning the cached courses.
    pub fn owner_user_id(&self) -> &str {
        &self.owner_user_id
    }

    /// The normalized LMS base URL.
    pub fn lms_base_url(&self) -> &str {
        &self.lms_base_url
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.owner_user_id, self.lms_base_url)
    }
}

/// Trims whitespace and trailing slashes from a base URL.
pub fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// A course as stored in the cache.
///
/// Rows are written in cohorts by a single refresh and never mutated in place.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseRecord {
    /// Identifier assigned by the LMS
    pub course_id: CourseId,
    /// Display name
    pub name: String,
    /// Teacher name, empty when unknown
    pub teacher: String,
    /// User the enrollment belongs to
    pub owner_user_id: String,
    /// Normalized LMS base URL the course came from
    pub lms_base_url: String,
    /// When the cohort containing this row was written
    pub cached_at: DateTime<Utc>,
}

impl CourseRecord {
    /// Stamps a course with its key and cache time.
    pub fn new(key: &CacheKey, course: Course, cached_at: DateTime<Utc>) -> Self {
        Self {
            course_id: course.course_id,
            name: course.name,
            teacher: course.teacher,
            owner_user_id: key.owner_user_id().to_string(),
            lms_base_url: key.lms_base_url().to_string(),
            cached_at,
        }
    }

    /// Returns the key this row belongs to.
    pub fn key(&self) -> CacheKey {
        CacheKey::new(self.owner_user_id.clone(), &self.lms_base_url)
    }

    /// Returns the caller-facing view.
    pub fn course(&self) -> Course {
        Course {
            course_id: self.course_id.clone(),
            name: self.name.clone(),
            teacher: self.teacher.clone(),
        }
    }
}

/// Summary of what a store currently holds.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Number of non-empty cohorts
    pub cohorts: usize,
    /// Total cached rows across all cohorts
    pub records: usize,
    /// Oldest `cached_at` in the store
    pub oldest_cached_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_raw_moodle_course() {
        let raw = json!({
            "id": 1,
            "shortname": "ALG",
            "displayname": "Algebra",
            "enrolledusercount": 27
        });
        let course = Course::from_raw(&raw).unwrap();
        assert_eq!(course.course_id, CourseId::from(1));
        assert_eq!(course.name, "Algebra");
        assert_eq!(course.teacher, "");
    }

    #[test]
    fn test_from_raw_keeps_teacher() {
        let raw = json!({"id": "c-7", "displayname": "History", "teacher": "Ms. Weber"});
        let course = Course::from_raw(&raw).unwrap();
        assert_eq!(course.course_id.as_str(), "c-7");
        assert_eq!(course.teacher, "Ms. Weber");
    }

    #[test]
    fn test_from_raw_rejects_missing_fields() {
        assert!(Course::from_raw(&json!({"displayname": "No id"})).is_err());
        assert!(Course::from_raw(&json!({"id": 3})).is_err());
        assert!(Course::from_raw(&json!({"id": null, "displayname": "x"})).is_err());
        assert!(Course::from_raw(&json!("not an object")).is_err());
    }

    #[test]
    fn test_from_raw_list_rejects_whole_batch() {
        let raw = vec![
            json!({"id": 1, "displayname": "Algebra"}),
            json!({"id": 2}),
        ];
        assert!(matches!(
            Course::from_raw_list(&raw),
            Err(LmsCacheError::InvalidCourse(_))
        ));
    }

    #[test]
    fn test_cache_key_normalizes_url() {
        let a = CacheKey::new("user-1", "https://moodle.example.org/");
        let b = CacheKey::new("user-1", "  https://moodle.example.org ");
        assert_eq!(a, b);
        assert_eq!(a.lms_base_url(), "https://moodle.example.org");
        assert_eq!(a.to_string(), "user-1@https://moodle.example.org");
    }

    #[test]
    fn test_record_key_roundtrip() {
        let key = CacheKey::new("user-1", "https://moodle.example.org");
        let record = CourseRecord::new(&key, Course::new(2, "History"), Utc::now());
        assert_eq!(record.key(), key);
        assert_eq!(record.course(), Course::new(2, "History"));
    }
}
