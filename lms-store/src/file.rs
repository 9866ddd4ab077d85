//! File-backed cohort store.
//!
//! Keeps the working set in a [`MemoryCourseStore`] and persists a full
//! snapshot on every write. Suitable for single-node deployments where the
//! cache should survive restarts.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::fs;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, instrument, warn};

use lms_core::error::{LmsCacheError, Result};
use lms_core::traits::CourseStore;
use lms_core::types::{CacheKey, Course, CourseRecord, StoreStats};

use crate::MemoryCourseStore;

/// File-backed cohort store.
///
/// Writers serialize on a lock, write the next snapshot to a temp file,
/// fsync, rename it over the old file, and only then publish the change in
/// memory. A failed write therefore leaves the previous cohort visible.
///
/// The write and the publish run together on a blocking thread that outlives
/// the calling future, so a cancelled caller cannot leave the file and the
/// working set disagreeing.
///
/// # File Format
///
/// ```text
/// magic (4 bytes): "LMSC"
/// version (1 byte): 1
/// count (8 bytes): number of rows, little endian
/// rows (variable): JSON array of course records
/// ```
pub struct FileCourseStore {
    /// Path to the snapshot file
    path: PathBuf,
    /// Working set
    memory: Arc<MemoryCourseStore>,
    /// Held for the whole write path of one mutation
    write_lock: Arc<Mutex<()>>,
}

/// File format magic bytes
const MAGIC: &[u8; 4] = b"LMSC";
/// Current file format version
const VERSION: u8 = 1;
/// Magic + version + count
const HEADER_LEN: usize = 13;

impl FileCourseStore {
    /// Opens the store at `path`.
    ///
    /// If the file exists it is loaded; otherwise the store starts empty and
    /// the file is created on the first write.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let store = Self {
            path: path.as_ref().to_path_buf(),
            memory: Arc::new(MemoryCourseStore::new()),
            write_lock: Arc::new(Mutex::new(())),
        };

        if fs::try_exists(&store.path).await? {
            store.load().await?;
        }

        Ok(store)
    }

    #[instrument(skip(self), fields(path = ?self.path))]
    async fn load(&self) -> Result<()> {
        let contents = fs::read(&self.path).await?;
        let records = decode_snapshot(&contents)?;
        let count = self.memory.import(records);
        info!(count, "Loaded course cache snapshot");
        Ok(())
    }

    async fn lock_writes(&self) -> OwnedMutexGuard<()> {
        Arc::clone(&self.write_lock).lock_owned().await
    }

    /// Persists `snapshot`, then applies `publish` to the working set.
    ///
    /// Runs to completion on a blocking thread even if the caller is dropped;
    /// the write lock travels with it.
    async fn commit<T, F>(
        &self,
        guard: OwnedMutexGuard<()>,
        snapshot: Vec<CourseRecord>,
        publish: F,
    ) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&MemoryCourseStore) -> T + Send + 'static,
    {
        let path = self.path.clone();
        let memory = Arc::clone(&self.memory);

        tokio::task::spawn_blocking(move || -> Result<T> {
            let _guard = guard;
            write_snapshot(&path, &snapshot)?;
            Ok(publish(&memory))
        })
        .await
        .map_err(|e| LmsCacheError::Store(format!("snapshot writer failed: {}", e)))?
    }

    /// Rows of every key except those in `skip`, followed by `extra`.
    fn next_snapshot(&self, skip: &[CacheKey], extra: &[CourseRecord]) -> Vec<CourseRecord> {
        let mut rows: Vec<CourseRecord> = self
            .memory
            .all_records()
            .into_iter()
            .filter(|r| !skip.contains(&r.key()))
            .collect();
        rows.extend_from_slice(extra);
        rows
    }

    /// Returns the snapshot file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the in-memory working set for direct access.
    pub fn memory(&self) -> &MemoryCourseStore {
        &self.memory
    }

    /// Returns a summary of the store contents.
    pub fn stats(&self) -> StoreStats {
        self.memory.stats()
    }

    /// Returns the number of cached cohorts.
    pub fn len(&self) -> usize {
        self.memory.len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }
}

#[async_trait]
impl CourseStore for FileCourseStore {
    async fn get(&self, key: &CacheKey) -> Result<Vec<CourseRecord>> {
        self.memory.get(key).await
    }

    #[instrument(skip(self, courses), fields(key = %key, count = courses.len()))]
    async fn replace(&self, key: &CacheKey, courses: Vec<Course>) -> Result<()> {
        let guard = self.lock_writes().await;

        let cohort = MemoryCourseStore::stamp(key, courses, Utc::now());
        let snapshot = self.next_snapshot(std::slice::from_ref(key), &cohort);
        let key = key.clone();
        self.commit(guard, snapshot, move |memory| memory.put_cohort(&key, cohort))
            .await
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn remove(&self, key: &CacheKey) -> Result<bool> {
        let guard = self.lock_writes().await;

        if self.memory.get(key).await?.is_empty() {
            return Ok(false);
        }
        let snapshot = self.next_snapshot(std::slice::from_ref(key), &[]);
        let key = key.clone();
        self.commit(guard, snapshot, move |memory| memory.remove_sync(&key))
            .await
    }

    #[instrument(skip(self))]
    async fn remove_owner(&self, owner_user_id: &str) -> Result<usize> {
        let guard = self.lock_writes().await;

        let keys = self.memory.keys_of_owner(owner_user_id);
        if keys.is_empty() {
            return Ok(0);
        }
        let snapshot = self.next_snapshot(&keys, &[]);
        self.commit(guard, snapshot, move |memory| {
            keys.iter().filter(|key| memory.remove_sync(key)).count()
        })
        .await
    }
}

/// Writes `records` as the new snapshot, atomically replacing the file.
fn write_snapshot(path: &Path, records: &[CourseRecord]) -> Result<()> {
    let contents = encode_snapshot(records)?;

    let temp_path = path.with_extension("tmp");
    let write = || -> std::io::Result<()> {
        let mut file = std::fs::File::create(&temp_path)?;
        file.write_all(&contents)?;
        file.sync_all()?;
        std::fs::rename(&temp_path, path)
    };

    if let Err(e) = write() {
        warn!(error = %e, path = ?path, "Failed to persist course cache");
        let _ = std::fs::remove_file(&temp_path);
        return Err(LmsCacheError::Store(format!(
            "failed to write {}: {}",
            path.display(),
            e
        )));
    }

    debug!(rows = records.len(), "Snapshot persisted");
    Ok(())
}

fn encode_snapshot(records: &[CourseRecord]) -> Result<Vec<u8>> {
    let serialized = serde_json::to_vec(records)?;

    let mut contents = Vec::with_capacity(HEADER_LEN + serialized.len());
    contents.extend_from_slice(MAGIC);
    contents.push(VERSION);
    contents.extend_from_slice(&(records.len() as u64).to_le_bytes());
    contents.extend_from_slice(&serialized);
    Ok(contents)
}

fn decode_snapshot(contents: &[u8]) -> Result<Vec<CourseRecord>> {
    if contents.len() < HEADER_LEN {
        return Err(LmsCacheError::Store("snapshot file too short".into()));
    }
    if &contents[0..4] != MAGIC {
        return Err(LmsCacheError::Store("invalid snapshot magic bytes".into()));
    }
    if contents[4] != VERSION {
        return Err(LmsCacheError::Store(format!(
            "unsupported snapshot version {} (expected {})",
            contents[4], VERSION
        )));
    }

    let mut count_bytes = [0u8; 8];
    count_bytes.copy_from_slice(&contents[5..HEADER_LEN]);
    let count = u64::from_le_bytes(count_bytes);

    let records: Vec<CourseRecord> = serde_json::from_slice(&contents[HEADER_LEN..])
        .map_err(|e| LmsCacheError::Store(format!("corrupt snapshot body: {}", e)))?;

    if records.len() as u64 != count {
        return Err(LmsCacheError::Store(format!(
            "snapshot row count mismatch: header says {}, body has {}",
            count,
            records.len()
        )));
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn key(owner: &str) -> CacheKey {
        CacheKey::new(owner, "https://moodle.example.org")
    }

    #[tokio::test]
    async fn test_open_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("courses.cache");

        let store = FileCourseStore::open(&path).await.unwrap();
        assert!(store.is_empty());
        assert!(!path.exists()); // File not created until first write
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("courses.cache");

        {
            let store = FileCourseStore::open(&path).await.unwrap();
            store
                .replace(&key("alice"), vec![Course::new(1, "Algebra"), Course::new(2, "History")])
                .await
                .unwrap();
            store.replace(&key("bob"), vec![Course::new(3, "Biology")]).await.unwrap();
        }

        let store = FileCourseStore::open(&path).await.unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(&key("alice")).await.unwrap().len(), 2);
        assert_eq!(store.get(&key("bob")).await.unwrap()[0].name, "Biology");
    }

    #[tokio::test]
    async fn test_replace_and_remove_persist() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("courses.cache");

        let store = FileCourseStore::open(&path).await.unwrap();
        store.replace(&key("alice"), vec![Course::new(1, "Algebra")]).await.unwrap();
        store.replace(&key("alice"), vec![Course::new(4, "Physics")]).await.unwrap();
        store.replace(&key("bob"), vec![Course::new(3, "Biology")]).await.unwrap();
        assert!(store.remove(&key("bob")).await.unwrap());
        assert!(!store.remove(&key("bob")).await.unwrap());

        let reopened = FileCourseStore::open(&path).await.unwrap();
        let cohort = reopened.get(&key("alice")).await.unwrap();
        assert_eq!(cohort.len(), 1);
        assert_eq!(cohort[0].name, "Physics");
        assert!(reopened.get(&key("bob")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_owner_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("courses.cache");

        let store = FileCourseStore::open(&path).await.unwrap();
        store.replace(&key("alice"), vec![Course::new(1, "Algebra")]).await.unwrap();
        store
            .replace(
                &CacheKey::new("alice", "https://other.example.org"),
                vec![Course::new(2, "History")],
            )
            .await
            .unwrap();
        store.replace(&key("bob"), vec![Course::new(3, "Biology")]).await.unwrap();

        assert_eq!(store.remove_owner("alice").await.unwrap(), 2);
        assert_eq!(store.remove_owner("alice").await.unwrap(), 0);

        let reopened = FileCourseStore::open(&path).await.unwrap();
        assert_eq!(reopened.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_write_keeps_old_cohort() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("courses.cache");

        // Parent directory does not exist, so every persist fails.
        let store = FileCourseStore::open(&path).await.unwrap();
        store
            .memory()
            .replace_at(&key("alice"), vec![Course::new(1, "Algebra")], Utc::now());

        let err = store
            .replace(&key("alice"), vec![Course::new(2, "History")])
            .await
            .unwrap_err();
        assert!(matches!(err, LmsCacheError::Store(_)));

        let cohort = store.get(&key("alice")).await.unwrap();
        assert_eq!(cohort.len(), 1);
        assert_eq!(cohort[0].name, "Algebra");
    }

    #[tokio::test]
    async fn test_invalid_file_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("courses.cache");

        fs::write(&path, b"invalid data").await.unwrap();
        assert!(FileCourseStore::open(&path).await.is_err());

        fs::write(&path, b"LMSC\x09\0\0\0\0\0\0\0\0[]").await.unwrap();
        let err = FileCourseStore::open(&path).await.err().unwrap();
        assert!(err.to_string().contains("version"));
    }

    #[tokio::test]
    async fn test_atomic_save() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("courses.cache");
        let temp_path = path.with_extension("tmp");

        let store = FileCourseStore::open(&path).await.unwrap();
        store.replace(&key("alice"), vec![Course::new(1, "Algebra")]).await.unwrap();

        // Temp file should not exist after save
        assert!(!temp_path.exists());
        // Main file should exist
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_cancelled_replace_still_publishes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("courses.cache");
        let store = FileCourseStore::open(&path).await.unwrap();

        // The first poll takes the uncontended lock and hands the write to the
        // blocking pool; the zero timeout then drops the caller.
        let alice = key("alice");
        let replace = store.replace(&alice, vec![Course::new(1, "Algebra")]);
        let _ = tokio::time::timeout(std::time::Duration::ZERO, replace).await;

        // Serialized behind the abandoned write by the write lock.
        store.replace(&key("bob"), vec![Course::new(3, "Biology")]).await.unwrap();

        let in_memory = store.get(&key("alice")).await.unwrap();
        let reopened = FileCourseStore::open(&path).await.unwrap();
        let on_disk = reopened.get(&key("alice")).await.unwrap();
        assert_eq!(in_memory.len(), 1);
        assert_eq!(in_memory, on_disk);
        assert_eq!(reopened.len(), 2);
    }

    #[test]
    fn test_snapshot_count_mismatch() {
        let k = key("alice");
        let records = vec![CourseRecord::new(&k, Course::new(1, "Algebra"), Utc::now())];
        let mut bytes = encode_snapshot(&records).unwrap();
        bytes[5] = 7;
        assert!(decode_snapshot(&bytes).is_err());
    }
}
