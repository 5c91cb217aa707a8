use crate::config::HistoryConfig;
use crate::error::{DoorwatchError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// A single detection event as shown in the history feed.
///
/// Immutable once created; `time` is the display-formatted wall-clock
/// timestamp captured when the detection message arrived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub url: String,
    pub time: String,
}

impl DetectionRecord {
    pub fn new<S: Into<String>>(url: S, time: S) -> Self {
        Self {
            url: url.into(),
            time: time.into(),
        }
    }
}

/// Persisted, newest-first history of detection events.
///
/// The store owns the authoritative list; callers only observe snapshots.
/// Every append rewrites the whole persisted file. A crash between the
/// in-memory prepend and the persist loses that entry; the file is written
/// to a temp path and renamed so a partial write never corrupts it.
pub struct HistoryStore {
    config: HistoryConfig,
    records: Arc<RwLock<Vec<DetectionRecord>>>,
}

impl HistoryStore {
    pub fn new(config: HistoryConfig) -> Self {
        Self {
            config,
            records: Arc::new(RwLock::new(Vec::new())),
        }
    }

    fn path(&self) -> &Path {
        Path::new(&self.config.path)
    }

    /// Load persisted history at startup.
    ///
    /// A missing or malformed file starts an empty history; neither is
    /// surfaced as an error.
    pub async fn load(&self) -> Result<usize> {
        let loaded = read_history_file(self.path()).await;
        let count = loaded.len();

        let mut records = self.records.write().await;
        *records = loaded;

        info!("Loaded {} history entries from {}", count, self.config.path);
        Ok(count)
    }

    /// Prepend a record and persist the whole list.
    ///
    /// The write guard is held across the read-modify-write and the persist
    /// so concurrent appends cannot lose entries.
    pub async fn append(&self, record: DetectionRecord) -> Result<()> {
        let mut records = self.records.write().await;
        records.insert(0, record);

        if let Some(cap) = self.config.max_entries {
            if records.len() > cap {
                records.truncate(cap);
                debug!("History truncated to {} entries", cap);
            }
        }

        self.persist(&records).await
    }

    /// Re-read the persisted list, replacing the in-memory one.
    ///
    /// Used by the refresh gesture to reconcile against storage state,
    /// independent of the live connection.
    pub async fn refresh(&self) -> Result<usize> {
        let loaded = read_history_file(self.path()).await;
        let count = loaded.len();

        let mut records = self.records.write().await;
        *records = loaded;

        debug!("History refreshed from storage: {} entries", count);
        Ok(count)
    }

    /// Snapshot of the current history, newest first
    pub async fn records(&self) -> Vec<DetectionRecord> {
        self.records.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    async fn persist(&self, records: &[DetectionRecord]) -> Result<()> {
        let path = self.path();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    DoorwatchError::component(
                        "history",
                        &format!("Failed to create history directory: {}", e),
                    )
                })?;
            }
        }

        let serialized = serde_json::to_vec_pretty(records)?;

        // Write to a sibling temp file and rename so readers never observe
        // a half-written list.
        let tmp_path = temp_path(path);
        fs::write(&tmp_path, &serialized).await.map_err(|e| {
            DoorwatchError::component("history", &format!("Failed to write history: {}", e))
        })?;
        fs::rename(&tmp_path, path).await.map_err(|e| {
            DoorwatchError::component("history", &format!("Failed to replace history: {}", e))
        })?;

        debug!("Persisted {} history entries", records.len());
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "history".into());
    name.push(".tmp");
    path.with_file_name(name)
}

/// Read and parse the persisted history file.
///
/// Missing or malformed data yields an empty list; the failure is logged
/// and swallowed.
async fn read_history_file(path: &Path) -> Vec<DetectionRecord> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) => {
            debug!("No readable history at {}: {}", path.display(), e);
            return Vec::new();
        }
    };

    match serde_json::from_str::<Vec<DetectionRecord>>(&content) {
        Ok(records) => records,
        Err(e) => {
            warn!(
                "Malformed history file {}, starting empty: {}",
                path.display(),
                e
            );
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir, max_entries: Option<usize>) -> HistoryStore {
        HistoryStore::new(HistoryConfig {
            path: dir
                .path()
                .join("history.json")
                .to_string_lossy()
                .into_owned(),
            max_entries,
        })
    }

    #[tokio::test]
    async fn test_load_missing_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, None);

        assert_eq!(store.load().await.unwrap(), 0);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_load_malformed_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(&path, "not json {{{").unwrap();

        let store = HistoryStore::new(HistoryConfig {
            path: path.to_string_lossy().into_owned(),
            max_entries: None,
        });

        assert_eq!(store.load().await.unwrap(), 0);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_append_prepends_and_persists() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, None);
        store.load().await.unwrap();

        let r1 = DetectionRecord::new("https://x/a.png", "t1");
        let r2 = DetectionRecord::new("https://x/b.png", "t2");
        store.append(r1.clone()).await.unwrap();
        store.append(r2.clone()).await.unwrap();

        let records = store.records().await;
        assert_eq!(records, vec![r2.clone(), r1.clone()]);

        // A second store over the same file sees the persisted list
        let store2 = store_in(&dir, None);
        store2.load().await.unwrap();
        let records = store2.records().await;
        assert_eq!(records.first(), Some(&r2));
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn test_load_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, None);
        store
            .append(DetectionRecord::new("https://x/a.png", "t1"))
            .await
            .unwrap();

        store.load().await.unwrap();
        let first = store.records().await;
        store.load().await.unwrap();
        let second = store.records().await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_refresh_rereads_storage() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, None);
        store
            .append(DetectionRecord::new("https://x/a.png", "t1"))
            .await
            .unwrap();

        // Another handle writes a second entry behind this store's back
        let other = store_in(&dir, None);
        other.load().await.unwrap();
        other
            .append(DetectionRecord::new("https://x/b.png", "t2"))
            .await
            .unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(store.refresh().await.unwrap(), 2);
        assert_eq!(store.records().await[0].url, "https://x/b.png");
    }

    #[tokio::test]
    async fn test_max_entries_cap() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, Some(2));

        for i in 0..4 {
            store
                .append(DetectionRecord::new(
                    format!("https://x/{}.png", i),
                    format!("t{}", i),
                ))
                .await
                .unwrap();
        }

        let records = store.records().await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].url, "https://x/3.png");
        assert_eq!(records[1].url, "https://x/2.png");
    }

    #[tokio::test]
    async fn test_persisted_field_names() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, None);
        store
            .append(DetectionRecord::new("https://x/a.png", "t1"))
            .await
            .unwrap();

        let content = std::fs::read_to_string(dir.path().join("history.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value[0]["url"], "https://x/a.png");
        assert_eq!(value[0]["time"], "t1");
    }
}
