//! Point-in-time exports of every live object.
//!
//! A [`Snapshot`] records when it was taken. [`Snapshot::refresh`] asks the
//! store only for objects whose ticket changed after that instant and
//! replaces those entries, so keeping an export current costs one listing
//! call instead of a full scan.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::model::StoredObject;
use crate::store::ObjectStore;
use crate::tracker::Tracker;

/// Errors reading or writing snapshot files.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("failed to access snapshot {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed snapshot {}: {source}", .path.display())]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Every live object of one repository at `snapshot_time`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub snapshot_time: DateTime<Utc>,
    pub repository: String,
    pub objects: BTreeMap<String, StoredObject>,
}

impl Snapshot {
    /// Export every object listed by [`ObjectStore::list_all`], stamped now.
    ///
    /// # Errors
    ///
    /// Tracker failures.
    pub fn create<T: Tracker>(store: &ObjectStore<T>, repository: &str) -> Result<Self> {
        Self::create_at(store, repository, Utc::now())
    }

    /// Like [`Self::create`] with an explicit timestamp.
    ///
    /// The timestamp should come from the same clock as the tracker's
    /// `updated_at` values; refreshes compare against it.
    ///
    /// # Errors
    ///
    /// Tracker failures.
    pub fn create_at<T: Tracker>(
        store: &ObjectStore<T>,
        repository: &str,
        at: DateTime<Utc>,
    ) -> Result<Self> {
        let objects = store.list_all()?;
        info!(repository, count = objects.len(), "created snapshot");
        Ok(Self {
            snapshot_time: at,
            repository: repository.to_string(),
            objects,
        })
    }

    /// Pull objects changed since `snapshot_time` and advance it to now.
    /// Returns the number of entries replaced or added.
    ///
    /// # Errors
    ///
    /// Tracker failures. The snapshot is unchanged on error.
    pub fn refresh<T: Tracker>(&mut self, store: &ObjectStore<T>) -> Result<usize> {
        self.refresh_at(store, Utc::now())
    }

    /// Like [`Self::refresh`] with an explicit new timestamp.
    ///
    /// # Errors
    ///
    /// Tracker failures. The snapshot is unchanged on error.
    pub fn refresh_at<T: Tracker>(
        &mut self,
        store: &ObjectStore<T>,
        at: DateTime<Utc>,
    ) -> Result<usize> {
        let changed = store.list_updated_since(self.snapshot_time)?;
        let count = changed.len();
        self.objects.extend(changed);
        info!(
            repository = %self.repository,
            since = %self.snapshot_time,
            count,
            "refreshed snapshot"
        );
        self.snapshot_time = at;
        Ok(count)
    }

    /// Read a snapshot file.
    ///
    /// # Errors
    ///
    /// [`SnapshotError`] if the file is unreadable or not a snapshot.
    pub fn load(path: &Path) -> std::result::Result<Self, SnapshotError> {
        let raw = fs::read_to_string(path).map_err(|source| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| SnapshotError::Format {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write the snapshot as pretty JSON, creating parent directories.
    ///
    /// # Errors
    ///
    /// [`SnapshotError::Io`] on filesystem failures.
    pub fn save(&self, path: &Path) -> std::result::Result<(), SnapshotError> {
        let io = |source| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|source| SnapshotError::Format {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json + "\n").map_err(io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::tracker::RetryPolicy;
    use crate::tracker::memory::MemoryTracker;
    use serde_json::json;
    use tempfile::TempDir;

    fn store() -> ObjectStore<MemoryTracker> {
        ObjectStore::new(MemoryTracker::new("owner"), StoreConfig::default())
            .expect("store")
            .with_retry_policy(RetryPolicy::immediate(3))
    }

    #[test]
    fn refresh_picks_up_only_changed_objects() {
        let store = store();
        store.create("a", json!({"v": 1})).expect("create");
        store.create("b", json!({"v": 1})).expect("create");
        let mut snap =
            Snapshot::create_at(&store, "o/r", store.tracker().now()).expect("snapshot");
        assert_eq!(snap.objects.len(), 2);

        store.tracker().advance(10);
        store.update("a", json!({"v": 2})).expect("update");
        let issue = snap.objects["a"].meta.issue_number;
        store.process_updates(issue).expect("process");
        store.create("c", json!({})).expect("create");

        let changed = snap
            .refresh_at(&store, store.tracker().now())
            .expect("refresh");
        assert_eq!(changed, 2);
        assert_eq!(snap.objects["a"].data, json!({"v": 2}));
        assert_eq!(snap.objects["a"].meta.version, 2);
        assert_eq!(snap.objects["b"].data, json!({"v": 1}));
        assert!(snap.objects.contains_key("c"));

        assert_eq!(snap.refresh_at(&store, store.tracker().now()).expect("again"), 0);
    }

    #[test]
    fn save_and_load() {
        let store = store();
        store.create("a", json!({"nested": {"k": [1, 2]}})).expect("create");
        let snap = Snapshot::create(&store, "o/r").expect("snapshot");

        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("out").join("snapshot.json");
        snap.save(&path).expect("save");
        assert_eq!(Snapshot::load(&path).expect("load"), snap);
    }

    #[test]
    fn load_reports_bad_files() {
        let dir = TempDir::new().expect("tempdir");
        let missing = dir.path().join("missing.json");
        assert!(matches!(
            Snapshot::load(&missing),
            Err(SnapshotError::Io { .. })
        ));

        let bad = dir.path().join("bad.json");
        fs::write(&bad, "{\"objects\": 3}").expect("write");
        assert!(matches!(
            Snapshot::load(&bad),
            Err(SnapshotError::Format { .. })
        ));
    }
}
