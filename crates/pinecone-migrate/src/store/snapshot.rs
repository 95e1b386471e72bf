//! JSON Lines snapshot file store.
//!
//! Lets an index be exported to a local file or restored from one, using the
//! same engine as index-to-index migrations. The first line is a header
//! carrying the index schema; every following line is one vector record
//! tagged with its namespace. Upserts append, and on load later lines win, so
//! re-running an export never duplicates ids.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use super::memory::MemoryStore;
use super::VectorStore;
use crate::config::SnapshotConfig;
use crate::error::{Error, Result};
use crate::model::{FetchOutcome, IdPage, IndexSchema, Namespace, VectorRecord};

/// First line of a snapshot file.
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotHeader {
    index: String,
    schema: IndexSchema,
}

/// Vector store persisted as a JSON Lines file.
pub struct SnapshotStore {
    config: SnapshotConfig,
    name: String,
    inner: MemoryStore,
    writer: Mutex<()>,
}

impl SnapshotStore {
    /// Opens a snapshot, loading it when the file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn open(config: SnapshotConfig) -> Result<Self> {
        let name = config.index_name();
        let inner = MemoryStore::new(name.clone()).page_size(1000);

        if config.path.exists() {
            load_into(&config, &inner)?;
        }

        Ok(Self {
            config,
            name,
            inner,
            writer: Mutex::new(()),
        })
    }

    async fn append(&self, lines: String) -> Result<()> {
        let _guard = self.writer.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .open(&self.config.path)
            .await?;
        file.write_all(lines.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

fn load_into(config: &SnapshotConfig, store: &MemoryStore) -> Result<()> {
    let reader = BufReader::new(File::open(&config.path)?);
    let mut lines = reader.lines();

    let header_line = match lines.next() {
        Some(line) => line?,
        None => return Ok(()),
    };
    let header: SnapshotHeader = serde_json::from_str(&header_line).map_err(|e| {
        Error::Store(format!(
            "invalid snapshot header in {}: {e}",
            config.path.display()
        ))
    })?;
    store.seed_schema(header.schema);

    let mut loaded = 0usize;
    for (number, line) in lines.enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: VectorRecord = serde_json::from_str(&line).map_err(|e| {
            Error::Store(format!(
                "invalid record on line {} of {}: {e}",
                number + 2,
                config.path.display()
            ))
        })?;
        let namespace = record.namespace.clone();
        store.insert(&namespace, std::iter::once(record));
        loaded += 1;
    }
    debug!(
        "Loaded {} snapshot lines from {}",
        loaded,
        config.path.display()
    );
    Ok(())
}

#[async_trait]
impl VectorStore for SnapshotStore {
    fn store_type(&self) -> &'static str {
        "snapshot"
    }

    fn index_name(&self) -> &str {
        &self.name
    }

    async fn describe_index(&self) -> Result<IndexSchema> {
        self.inner.describe_index().await
    }

    async fn create_index(&self, schema: &IndexSchema) -> Result<()> {
        let existed = self.inner.describe_index().await.is_ok();
        self.inner.create_index(schema).await?;
        if existed {
            return Ok(());
        }

        let _guard = self.writer.lock().await;
        if let Some(parent) = self.config.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let header = SnapshotHeader {
            index: self.name.clone(),
            schema: schema.clone(),
        };
        let mut line = serde_json::to_string(&header)?;
        line.push('\n');
        tokio::fs::write(&self.config.path, line).await?;
        Ok(())
    }

    async fn list_namespaces(&self) -> Result<Vec<Namespace>> {
        self.inner.list_namespaces().await
    }

    async fn list_ids(
        &self,
        namespace: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<IdPage> {
        self.inner.list_ids(namespace, cursor, limit).await
    }

    async fn fetch(&self, namespace: &str, ids: &[String]) -> Result<FetchOutcome> {
        self.inner.fetch(namespace, ids).await
    }

    async fn upsert(&self, namespace: &str, records: &[VectorRecord]) -> Result<()> {
        // Validate against the schema before anything reaches the file.
        let schema = self.inner.describe_index().await?;
        if let Some(bad) = records
            .iter()
            .find(|r| r.values.len() != schema.dimension as usize)
        {
            return Err(Error::Validation(format!(
                "vector '{}' has dimension {}, index expects {}",
                bad.id,
                bad.values.len(),
                schema.dimension
            )));
        }

        let mut lines = String::new();
        for record in records {
            let mut tagged = record.clone();
            tagged.namespace = namespace.to_string();
            lines.push_str(&serde_json::to_string(&tagged)?);
            lines.push('\n');
        }
        self.append(lines).await?;
        self.inner.upsert(namespace, records).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Metric;

    fn config(dir: &tempfile::TempDir) -> SnapshotConfig {
        SnapshotConfig {
            path: dir.path().join("nested").join("backup.jsonl"),
            index: Some("backup".to_string()),
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_missing_index() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(config(&dir)).unwrap();
        assert!(matches!(
            store.describe_index().await,
            Err(Error::IndexNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_write_then_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let schema = IndexSchema::new(2, Metric::DotProduct);
        {
            let store = SnapshotStore::open(config(&dir)).unwrap();
            store.create_index(&schema).await.unwrap();
            store
                .upsert("docs", &[VectorRecord::new("a", vec![1.0, 2.0])])
                .await
                .unwrap();
            store
                .upsert("", &[VectorRecord::new("b", vec![3.0, 4.0])])
                .await
                .unwrap();
            // Overwrite keeps a single copy after reload.
            store
                .upsert("docs", &[VectorRecord::new("a", vec![5.0, 6.0])])
                .await
                .unwrap();
        }

        let reopened = SnapshotStore::open(config(&dir)).unwrap();
        assert_eq!(reopened.describe_index().await.unwrap(), schema);

        let docs = reopened.fetch("docs", &["a".to_string()]).await.unwrap();
        assert_eq!(docs.records.len(), 1);
        assert_eq!(docs.records[0].values, vec![5.0, 6.0]);

        let mut names: Vec<String> = reopened
            .list_namespaces()
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["".to_string(), "docs".to_string()]);
    }

    #[tokio::test]
    async fn test_bad_dimension_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(config(&dir)).unwrap();
        store
            .create_index(&IndexSchema::new(2, Metric::Cosine))
            .await
            .unwrap();
        let err = store
            .upsert("", &[VectorRecord::new("x", vec![1.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let content = std::fs::read_to_string(dir.path().join("nested").join("backup.jsonl")).unwrap();
        assert_eq!(content.lines().count(), 1);
    }

    #[test]
    fn test_corrupt_header_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = SnapshotConfig {
            path: dir.path().join("bad.jsonl"),
            index: None,
        };
        std::fs::write(&cfg.path, "not json\n").unwrap();
        assert!(matches!(SnapshotStore::open(cfg), Err(Error::Store(_))));
    }
}
