//! Resumable progress per `(destination_index, namespace)`.
//!
//! The file store keeps every checkpoint in one JSON document:
//!
//! ```json
//! {
//!   "version": 1,
//!   "checkpoints": {
//!     "docs-v2": {
//!       "faq": { "cursor": "tok-7", "pages_completed": 7, ... }
//!     }
//!   }
//! }
//! ```
//!
//! Writes go to a sibling temp file that is then renamed over the original,
//! so a crash mid-write leaves the previous state intact.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};

const FORMAT_VERSION: u32 = 1;

/// Progress of one namespace towards one destination index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Destination index the progress refers to.
    pub destination_index: String,
    /// Namespace within the destination.
    pub namespace: String,
    /// Source index the ids were listed from.
    #[serde(default)]
    pub source_index: String,
    /// Cursor of the next page to list; `None` before the first page.
    pub cursor: Option<String>,
    /// Pages fully handled.
    pub pages_completed: u64,
    /// Records written so far.
    pub vectors_transferred: u64,
    /// Ids whose upsert failed; retried first on the next run.
    #[serde(default)]
    pub failed_ids: BTreeSet<String>,
    /// Pagination reached the end of the namespace.
    pub completed: bool,
    /// Unix seconds of the last save.
    #[serde(default)]
    pub updated_at: u64,
}

impl Checkpoint {
    /// Fresh checkpoint at the start of a namespace.
    pub fn new(
        destination_index: impl Into<String>,
        namespace: impl Into<String>,
        source_index: impl Into<String>,
    ) -> Self {
        Self {
            destination_index: destination_index.into(),
            namespace: namespace.into(),
            source_index: source_index.into(),
            ..Self::default()
        }
    }

    /// Adds ids to the failed set.
    pub fn record_failures<'a>(&mut self, ids: impl IntoIterator<Item = &'a String>) {
        self.failed_ids.extend(ids.into_iter().cloned());
    }

    fn touch(&mut self) {
        self.updated_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
    }
}

/// Persistence for checkpoints.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Loads the checkpoint for a key, if any.
    async fn load(&self, destination_index: &str, namespace: &str) -> Result<Option<Checkpoint>>;

    /// Saves (replaces) the checkpoint for its key.
    async fn save(&self, checkpoint: &Checkpoint) -> Result<()>;

    /// Removes every checkpoint of a destination index.
    async fn clear(&self, destination_index: &str) -> Result<()>;
}

type CheckpointMap = BTreeMap<String, BTreeMap<String, Checkpoint>>;

#[derive(Debug, Default, Serialize, Deserialize)]
struct CheckpointFile {
    version: u32,
    #[serde(default)]
    checkpoints: CheckpointMap,
}

fn insert(map: &mut CheckpointMap, checkpoint: &Checkpoint) {
    let mut stored = checkpoint.clone();
    stored.touch();
    map.entry(stored.destination_index.clone())
        .or_default()
        .insert(stored.namespace.clone(), stored);
}

fn lookup(map: &CheckpointMap, destination_index: &str, namespace: &str) -> Option<Checkpoint> {
    map.get(destination_index)
        .and_then(|by_ns| by_ns.get(namespace))
        .cloned()
}

/// Checkpoints in a JSON file.
#[derive(Debug)]
pub struct FileCheckpointStore {
    path: PathBuf,
    state: Mutex<CheckpointMap>,
}

impl FileCheckpointStore {
    /// Opens the store, reading the file if it exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Checkpoint`] if the file exists but cannot be parsed.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let checkpoints = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let file: CheckpointFile = serde_json::from_slice(&bytes).map_err(|e| {
                    Error::Checkpoint(format!("{} is not a checkpoint file: {}", path.display(), e))
                })?;
                if file.version != FORMAT_VERSION {
                    return Err(Error::Checkpoint(format!(
                        "{} has unsupported version {}",
                        path.display(),
                        file.version
                    )));
                }
                file.checkpoints
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => CheckpointMap::new(),
            Err(e) => return Err(e.into()),
        };

        debug!(
            "Loaded checkpoints for {} destination(s) from {}",
            checkpoints.len(),
            path.display()
        );
        Ok(Self {
            path,
            state: Mutex::new(checkpoints),
        })
    }

    /// File backing this store.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, checkpoints: &CheckpointMap) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = CheckpointFile {
            version: FORMAT_VERSION,
            checkpoints: checkpoints.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&file)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(&self, destination_index: &str, namespace: &str) -> Result<Option<Checkpoint>> {
        Ok(lookup(&*self.state.lock().await, destination_index, namespace))
    }

    async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let mut state = self.state.lock().await;
        insert(&mut state, checkpoint);
        self.persist(&state).await
    }

    async fn clear(&self, destination_index: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.remove(destination_index).is_some() {
            info!("Cleared checkpoints for '{}'", destination_index);
            self.persist(&state).await?;
        }
        Ok(())
    }
}

/// Checkpoints kept only for the life of the process.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    state: Mutex<CheckpointMap>,
}

impl MemoryCheckpointStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self, destination_index: &str, namespace: &str) -> Result<Option<Checkpoint>> {
        Ok(lookup(&*self.state.lock().await, destination_index, namespace))
    }

    async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        insert(&mut *self.state.lock().await, checkpoint);
        Ok(())
    }

    async fn clear(&self, destination_index: &str) -> Result<()> {
        self.state.lock().await.remove(destination_index);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(dest: &str, ns: &str) -> Checkpoint {
        let mut cp = Checkpoint::new(dest, ns, "src");
        cp.cursor = Some("tok-3".to_string());
        cp.pages_completed = 3;
        cp.vectors_transferred = 300;
        cp
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("checkpoints.json");

        let store = FileCheckpointStore::open(&path).await.unwrap();
        store.save(&sample("dst", "faq")).await.unwrap();
        drop(store);

        let reopened = FileCheckpointStore::open(&path).await.unwrap();
        let cp = reopened.load("dst", "faq").await.unwrap().unwrap();
        assert_eq!(cp.cursor.as_deref(), Some("tok-3"));
        assert_eq!(cp.vectors_transferred, 300);
        assert!(cp.updated_at > 0);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_keys_are_isolated_by_destination() {
        let store = MemoryCheckpointStore::new();
        store.save(&sample("dst-a", "faq")).await.unwrap();

        assert!(store.load("dst-b", "faq").await.unwrap().is_none());
        assert!(store.load("dst-a", "other").await.unwrap().is_none());
        assert!(store.load("dst-a", "faq").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_clear_only_touches_one_destination() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::open(dir.path().join("cp.json"))
            .await
            .unwrap();
        store.save(&sample("dst-a", "")).await.unwrap();
        store.save(&sample("dst-b", "")).await.unwrap();

        store.clear("dst-a").await.unwrap();

        assert!(store.load("dst-a", "").await.unwrap().is_none());
        assert!(store.load("dst-b", "").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cp.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(matches!(
            FileCheckpointStore::open(&path).await,
            Err(Error::Checkpoint(_))
        ));
    }

    #[test]
    fn test_record_failures_dedups() {
        let mut cp = Checkpoint::new("dst", "", "src");
        let ids = vec!["a".to_string(), "b".to_string(), "a".to_string()];
        cp.record_failures(&ids);
        cp.record_failures(&ids[..1]);
        assert_eq!(cp.failed_ids.len(), 2);
        assert!(cp.failed_ids.contains("a") && cp.failed_ids.contains("b"));
    }

    #[test]
    fn test_bulk_failures_stay_cheap() {
        let mut cp = Checkpoint::new("dst", "", "src");
        let ids: Vec<String> = (0..60_000).map(|i| format!("id-{i:06}")).collect();

        let started = std::time::Instant::now();
        for page in ids.chunks(100) {
            cp.record_failures(page);
        }
        cp.record_failures(&ids[..500]);

        assert_eq!(cp.failed_ids.len(), 60_000);
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }

    #[test]
    fn test_failed_ids_serialize_as_list() {
        let mut cp = Checkpoint::new("dst", "", "src");
        cp.record_failures(&["b".to_string(), "a".to_string()]);

        let json = serde_json::to_value(&cp).unwrap();
        assert_eq!(json["failed_ids"], serde_json::json!(["a", "b"]));

        let back: Checkpoint = serde_json::from_value(json).unwrap();
        assert_eq!(back, cp);
    }
}
