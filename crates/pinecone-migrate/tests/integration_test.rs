//! End-to-end migration tests over in-memory stores with injected faults.
//!
//! The last test talks to real Pinecone indexes and needs:
//! - `PINECONE_SOURCE_API_KEY` / `PINECONE_DEST_API_KEY`
//! - `PINECONE_TEST_SOURCE_INDEX` / `PINECONE_TEST_DEST_INDEX`
//!
//! Run it with: `cargo test --test integration_test -- --ignored`

#![allow(clippy::pedantic)]

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashSet;
use std::env;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

use pinecone_migrate::checkpoint::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
use pinecone_migrate::config::{ProvisioningConfig, SnapshotConfig};
use pinecone_migrate::model::{
    FetchOutcome, IdPage, IndexSchema, Metadata, Metric, Namespace, SparseValues, VectorRecord,
};
use pinecone_migrate::store::{MemoryStore, SnapshotStore, VectorStore};
use pinecone_migrate::{
    Error, MigrationConfig, MigrationContext, MigrationOptions, MigrationReport, NamespaceStatus,
    Orchestrator, Result, RunOutcome,
};

/// Memory store with switchable failures.
struct FaultyStore {
    inner: Arc<MemoryStore>,
    /// `list_ids` calls beyond this many fail with `Unavailable` while broken.
    fail_list_after: Option<usize>,
    broken: AtomicBool,
    list_calls: AtomicUsize,
    /// Upserts left to reject with 429.
    rate_limited_upserts: AtomicUsize,
    /// `describe_index` / `list_namespaces` calls left to reject with 429.
    rate_limited_control: AtomicUsize,
    /// Ids the backend refuses; any request containing one is rejected whole.
    rejected_ids: Mutex<HashSet<String>>,
    /// Ids that disappear between list and fetch.
    vanished_ids: HashSet<String>,
    upserts_ok: AtomicUsize,
    /// Raise the stop signal after this many successful upserts.
    stop_after_upserts: Option<(usize, watch::Sender<bool>)>,
}

impl FaultyStore {
    fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            fail_list_after: None,
            broken: AtomicBool::new(true),
            list_calls: AtomicUsize::new(0),
            rate_limited_upserts: AtomicUsize::new(0),
            rate_limited_control: AtomicUsize::new(0),
            rejected_ids: Mutex::new(HashSet::new()),
            vanished_ids: HashSet::new(),
            upserts_ok: AtomicUsize::new(0),
            stop_after_upserts: None,
        }
    }

    fn throttle_control_plane(&self) -> Result<()> {
        if self
            .rate_limited_control
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Error::RateLimit(Some(0)));
        }
        Ok(())
    }

    fn heal(&self) {
        self.broken.store(false, Ordering::SeqCst);
        self.rejected_ids.lock().unwrap().clear();
    }
}

#[async_trait]
impl VectorStore for FaultyStore {
    fn store_type(&self) -> &'static str {
        "faulty"
    }

    fn index_name(&self) -> &str {
        self.inner.index_name()
    }

    async fn describe_index(&self) -> Result<IndexSchema> {
        self.throttle_control_plane()?;
        self.inner.describe_index().await
    }

    async fn create_index(&self, schema: &IndexSchema) -> Result<()> {
        self.inner.create_index(schema).await
    }

    async fn list_namespaces(&self) -> Result<Vec<Namespace>> {
        self.throttle_control_plane()?;
        self.inner.list_namespaces().await
    }

    async fn list_ids(&self, namespace: &str, cursor: Option<&str>, limit: usize) -> Result<IdPage> {
        let n = self.list_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(healthy_calls) = self.fail_list_after {
            if n > healthy_calls && self.broken.load(Ordering::SeqCst) {
                return Err(Error::Unavailable("list backend down".to_string()));
            }
        }
        self.inner.list_ids(namespace, cursor, limit).await
    }

    async fn fetch(&self, namespace: &str, ids: &[String]) -> Result<FetchOutcome> {
        let mut outcome = self.inner.fetch(namespace, ids).await?;
        let (kept, gone): (Vec<_>, Vec<_>) = outcome
            .records
            .into_iter()
            .partition(|r| !self.vanished_ids.contains(&r.id));
        outcome.records = kept;
        outcome.missing_ids.extend(gone.into_iter().map(|r| r.id));
        Ok(outcome)
    }

    async fn upsert(&self, namespace: &str, records: &[VectorRecord]) -> Result<()> {
        if self
            .rate_limited_upserts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Error::RateLimit(None));
        }
        if let Some(bad) = {
            let rejected = self.rejected_ids.lock().unwrap();
            records.iter().find(|r| rejected.contains(&r.id)).map(|r| r.id.clone())
        } {
            return Err(Error::Validation(format!("metadata of '{bad}' exceeds 40KB")));
        }

        self.inner.upsert(namespace, records).await?;
        let done = self.upserts_ok.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((after, stop)) = &self.stop_after_upserts {
            if done == *after {
                let _ = stop.send(true);
            }
        }
        Ok(())
    }
}

const DIM: usize = 4;

fn record(i: usize) -> VectorRecord {
    let mut metadata = Metadata::new();
    metadata.insert("title".to_string(), json!(format!("doc {i}")));
    metadata.insert("rank".to_string(), json!(i));
    metadata.insert("tags".to_string(), json!(["a", "b"]));
    let mut record = VectorRecord::new(format!("id-{i:04}"), vec![i as f32, 0.5, -1.0, 0.25])
        .with_metadata(metadata);
    if i % 3 == 0 {
        record.sparse_values = Some(SparseValues {
            indices: vec![1, 10],
            values: vec![0.3, 0.7],
        });
    }
    record
}

fn source_index(namespaces: &[(&str, usize)]) -> Arc<MemoryStore> {
    let store = MemoryStore::with_schema("src", IndexSchema::new(DIM as u32, Metric::Cosine));
    for (name, count) in namespaces {
        store.insert(name, (0..*count).map(record));
    }
    Arc::new(store)
}

fn options(batch_size: usize) -> MigrationOptions {
    let mut options = MigrationOptions {
        batch_size,
        concurrency: 2,
        ..MigrationOptions::default()
    };
    options.retry.max_retries = 5;
    options.retry.initial_delay_ms = 1;
    options.retry.max_delay_ms = 2;
    options
}

fn context(
    source: Arc<dyn VectorStore>,
    destination: Arc<dyn VectorStore>,
    checkpoints: Arc<dyn CheckpointStore>,
    options: MigrationOptions,
) -> MigrationContext {
    MigrationContext {
        source,
        destination,
        checkpoints,
        options,
        provisioning: ProvisioningConfig::default(),
    }
}

fn running() -> watch::Receiver<bool> {
    watch::channel(false).1
}

async fn migrate(
    source: Arc<dyn VectorStore>,
    destination: Arc<dyn VectorStore>,
    checkpoints: Arc<dyn CheckpointStore>,
    options: MigrationOptions,
) -> MigrationReport {
    Orchestrator::new(context(source, destination, checkpoints, options))
        .run(running())
        .await
        .expect("migration should pass its preconditions")
}

#[tokio::test]
async fn test_every_record_arrives_intact() {
    let source = source_index(&[("", 23), ("docs", 57), ("faq", 9)]);
    let destination = Arc::new(MemoryStore::new("dst"));

    let report = migrate(
        source.clone(),
        destination.clone(),
        Arc::new(MemoryCheckpointStore::new()),
        options(10),
    )
    .await;

    assert_eq!(report.outcome, RunOutcome::Success);
    assert_eq!(report.outcome.exit_code(), 0);
    assert_eq!(report.totals().succeeded, 89);
    for ns in ["", "docs", "faq"] {
        assert_eq!(destination.records(ns), source.records(ns), "namespace {ns:?}");
    }
    assert_eq!(
        destination.describe_index().await.unwrap().dimension,
        DIM as u32
    );
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let source = source_index(&[("docs", 30)]);
    let destination = Arc::new(MemoryStore::new("dst"));

    migrate(
        source.clone(),
        destination.clone(),
        Arc::new(MemoryCheckpointStore::new()),
        options(7),
    )
    .await;
    let first = destination.records("docs");

    // Fresh checkpoints: everything is copied again over itself.
    let report = migrate(
        source.clone(),
        destination.clone(),
        Arc::new(MemoryCheckpointStore::new()),
        options(7),
    )
    .await;

    assert_eq!(report.totals().succeeded, 30);
    assert_eq!(destination.records("docs"), first);
    assert_eq!(destination.total_records(), 30);
}

#[tokio::test]
async fn test_resume_after_list_failure() {
    let memory = source_index(&[("docs", 50)]);
    let source = Arc::new(FaultyStore {
        fail_list_after: Some(3),
        ..FaultyStore::new(memory.clone())
    });
    let destination = Arc::new(MemoryStore::new("dst"));
    let checkpoints: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
    let mut opts = options(10);
    opts.retry.max_retries = 1;

    let report = migrate(source.clone(), destination.clone(), checkpoints.clone(), opts.clone()).await;

    let docs = &report.namespaces["docs"];
    assert_eq!(docs.status, NamespaceStatus::Failed);
    assert_eq!(docs.succeeded, 30);
    assert_eq!(report.outcome, RunOutcome::CompletedWithFailures);
    let cp = checkpoints.load("dst", "docs").await.unwrap().unwrap();
    assert_eq!(cp.pages_completed, 3);
    assert!(!cp.completed);

    source.heal();
    let lists_before = memory.calls().list;
    let report = migrate(source, destination.clone(), checkpoints, opts).await;

    assert_eq!(report.outcome, RunOutcome::Success);
    assert!(report.namespaces["docs"].resumed);
    assert_eq!(report.namespaces["docs"].succeeded, 20);
    assert_eq!(memory.calls().list - lists_before, 2);
    assert_eq!(destination.records("docs"), memory.records("docs"));
}

#[tokio::test]
async fn test_cancellation_saves_checkpoint() {
    let memory = source_index(&[("docs", 50)]);
    let (stop_tx, stop) = watch::channel(false);
    let target = Arc::new(MemoryStore::new("dst"));
    let destination = Arc::new(FaultyStore {
        stop_after_upserts: Some((2, stop_tx)),
        ..FaultyStore::new(target.clone())
    });
    let checkpoints: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());

    let report = Orchestrator::new(context(
        memory.clone(),
        destination,
        checkpoints.clone(),
        options(10),
    ))
    .run(stop)
    .await
    .unwrap();

    assert_eq!(report.outcome, RunOutcome::Interrupted);
    assert_eq!(report.outcome.exit_code(), 3);
    assert_eq!(report.namespaces["docs"].status, NamespaceStatus::Interrupted);
    let cp = checkpoints.load("dst", "docs").await.unwrap().unwrap();
    assert_eq!(cp.pages_completed, 2);
    assert_eq!(cp.vectors_transferred, 20);
    assert_eq!(target.total_records(), 20);

    let report = migrate(memory.clone(), target.clone(), checkpoints, options(10)).await;
    assert_eq!(report.outcome, RunOutcome::Success);
    assert_eq!(report.namespaces["docs"].succeeded, 30);
    assert_eq!(target.records("docs"), memory.records("docs"));
}

#[tokio::test]
async fn test_schema_mismatch_aborts_before_transfer() {
    let source = Arc::new(MemoryStore::with_schema("src", IndexSchema::new(768, Metric::Cosine)));
    source.insert("", (0..5).map(|i| VectorRecord::new(format!("v{i}"), vec![0.1; 768])));
    let destination = Arc::new(MemoryStore::with_schema("dst", IndexSchema::new(512, Metric::Cosine)));

    let err = Orchestrator::new(context(
        source.clone(),
        destination.clone(),
        Arc::new(MemoryCheckpointStore::new()),
        options(10),
    ))
    .run(running())
    .await
    .unwrap_err();

    assert!(err.is_fatal_precondition());
    assert_eq!(MigrationReport::fatal("src", "dst", &err).outcome.exit_code(), 2);
    assert_eq!(source.calls().fetch, 0);
    assert_eq!(destination.calls().upsert, 0);
    assert_eq!(destination.total_records(), 0);
}

#[tokio::test]
async fn test_one_rejected_record_fails_alone() {
    let source = source_index(&[("docs", 100)]);
    let target = Arc::new(MemoryStore::new("dst"));
    let destination = Arc::new(FaultyStore::new(target.clone()));
    destination
        .rejected_ids
        .lock()
        .unwrap()
        .insert("id-0042".to_string());
    let checkpoints: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());

    let report = migrate(source.clone(), destination.clone(), checkpoints.clone(), options(25)).await;

    let docs = &report.namespaces["docs"];
    assert_eq!(docs.succeeded, 99);
    assert_eq!(docs.failed, 1);
    assert_eq!(docs.status, NamespaceStatus::Completed);
    assert_eq!(docs.error_samples.len(), 1);
    assert_eq!(docs.error_samples[0].first_id.as_deref(), Some("id-0042"));
    assert_eq!(report.outcome.exit_code(), 1);
    assert_eq!(target.total_records(), 99);

    let cp = checkpoints.load("dst", "docs").await.unwrap().unwrap();
    assert_eq!(cp.failed_ids.iter().collect::<Vec<_>>(), ["id-0042"]);

    // Once the backend accepts it, a rerun retries only that id.
    destination.heal();
    let fetches_before = source.calls().fetch;
    let report = migrate(source.clone(), destination, checkpoints.clone(), options(25)).await;

    assert_eq!(report.outcome, RunOutcome::Success);
    assert_eq!(report.namespaces["docs"].succeeded, 1);
    assert_eq!(source.calls().fetch - fetches_before, 1);
    assert_eq!(target.records("docs"), source.records("docs"));
    assert!(checkpoints
        .load("dst", "docs")
        .await
        .unwrap()
        .unwrap()
        .failed_ids
        .is_empty());
}

#[tokio::test]
async fn test_rate_limit_recovery() {
    let source = source_index(&[("docs", 30)]);
    let target = Arc::new(MemoryStore::new("dst"));
    let destination = Arc::new(FaultyStore {
        rate_limited_upserts: AtomicUsize::new(2),
        ..FaultyStore::new(target.clone())
    });

    let report = migrate(
        source.clone(),
        destination,
        Arc::new(MemoryCheckpointStore::new()),
        options(10),
    )
    .await;

    assert_eq!(report.outcome, RunOutcome::Success);
    assert_eq!(report.totals().failed, 0);
    assert_eq!(target.records("docs"), source.records("docs"));
    assert_eq!(target.calls().upsert, 3);
}

#[tokio::test]
async fn test_rate_limited_discovery_does_not_abort() {
    let inner = source_index(&[("docs", 12), ("faq", 5)]);
    let source = Arc::new(FaultyStore {
        rate_limited_control: AtomicUsize::new(2),
        ..FaultyStore::new(inner.clone())
    });
    let destination = Arc::new(MemoryStore::new("dst"));

    let report = migrate(
        source,
        destination.clone(),
        Arc::new(MemoryCheckpointStore::new()),
        options(5),
    )
    .await;

    assert_eq!(report.outcome, RunOutcome::Success);
    assert_eq!(report.namespaces.len(), 2);
    assert_eq!(destination.records("docs"), inner.records("docs"));
    assert_eq!(destination.records("faq"), inner.records("faq"));
}

#[tokio::test]
async fn test_empty_index_makes_no_data_calls() {
    let source = Arc::new(MemoryStore::with_schema("src", IndexSchema::new(8, Metric::Euclidean)));
    let destination = Arc::new(MemoryStore::new("dst"));

    let report = migrate(
        source.clone(),
        destination.clone(),
        Arc::new(MemoryCheckpointStore::new()),
        options(10),
    )
    .await;

    assert_eq!(report.outcome, RunOutcome::Success);
    assert_eq!(report.namespaces[""].status, NamespaceStatus::Completed);
    assert_eq!(source.calls().fetch, 0);
    assert_eq!(destination.calls().upsert, 0);
}

#[tokio::test]
async fn test_ids_deleted_mid_run_are_skipped() {
    let memory = source_index(&[("docs", 20)]);
    let source = Arc::new(FaultyStore {
        vanished_ids: ["id-0003", "id-0017"].iter().map(|s| s.to_string()).collect(),
        ..FaultyStore::new(memory)
    });
    let destination = Arc::new(MemoryStore::new("dst"));

    let report = migrate(
        source,
        destination.clone(),
        Arc::new(MemoryCheckpointStore::new()),
        options(8),
    )
    .await;

    let docs = &report.namespaces["docs"];
    assert_eq!(docs.skipped_missing, 2);
    assert_eq!(docs.succeeded, 18);
    assert_eq!(docs.failed, 0);
    assert_eq!(report.outcome, RunOutcome::Success);
    assert_eq!(destination.total_records(), 18);
}

#[tokio::test]
async fn test_checkpoints_isolated_per_destination() {
    let dir = tempfile::tempdir().unwrap();
    let checkpoints: Arc<dyn CheckpointStore> = Arc::new(
        FileCheckpointStore::open(dir.path().join("checkpoints.json"))
            .await
            .unwrap(),
    );
    let source = source_index(&[("docs", 12)]);
    let first = Arc::new(MemoryStore::new("dst-a"));
    let second = Arc::new(MemoryStore::new("dst-b"));

    migrate(source.clone(), first.clone(), checkpoints.clone(), options(5)).await;
    let report = migrate(source.clone(), second.clone(), checkpoints.clone(), options(5)).await;

    assert!(!report.namespaces["docs"].resumed);
    assert_eq!(first.records("docs"), source.records("docs"));
    assert_eq!(second.records("docs"), source.records("docs"));

    let reopened = FileCheckpointStore::open(dir.path().join("checkpoints.json"))
        .await
        .unwrap();
    assert!(reopened.load("dst-a", "docs").await.unwrap().unwrap().completed);
    assert!(reopened.load("dst-b", "docs").await.unwrap().unwrap().completed);
}

#[tokio::test]
async fn test_payload_limit_splits_upserts() {
    let source = source_index(&[("docs", 40)]);
    let destination = Arc::new(MemoryStore::new("dst").max_upsert_records(6));

    let report = migrate(
        source.clone(),
        destination.clone(),
        Arc::new(MemoryCheckpointStore::new()),
        options(20),
    )
    .await;

    assert_eq!(report.totals().failed, 0);
    assert_eq!(destination.records("docs"), source.records("docs"));
}

#[tokio::test]
async fn test_snapshot_export_and_import() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("docs.jsonl");
    let source = source_index(&[("", 6), ("docs", 11)]);

    let snapshot: Arc<dyn VectorStore> = Arc::new(
        SnapshotStore::open(SnapshotConfig {
            path: path.clone(),
            index: Some("backup".to_string()),
        })
        .unwrap(),
    );
    let report = migrate(
        source.clone(),
        snapshot,
        Arc::new(MemoryCheckpointStore::new()),
        options(5),
    )
    .await;
    assert_eq!(report.totals().succeeded, 17);

    let reloaded: Arc<dyn VectorStore> = Arc::new(
        SnapshotStore::open(SnapshotConfig {
            path,
            index: Some("backup".to_string()),
        })
        .unwrap(),
    );
    let restored = Arc::new(MemoryStore::new("restored"));
    let report = migrate(
        reloaded,
        restored.clone(),
        Arc::new(MemoryCheckpointStore::new()),
        options(5),
    )
    .await;

    assert_eq!(report.outcome, RunOutcome::Success);
    assert_eq!(restored.records(""), source.records(""));
    assert_eq!(restored.records("docs"), source.records("docs"));
}

#[tokio::test]
#[ignore] // Run with --ignored flag when env vars are set
async fn test_real_pinecone_migration() {
    let (Ok(src_key), Ok(dst_key), Ok(src), Ok(dst)) = (
        env::var("PINECONE_SOURCE_API_KEY"),
        env::var("PINECONE_DEST_API_KEY"),
        env::var("PINECONE_TEST_SOURCE_INDEX"),
        env::var("PINECONE_TEST_DEST_INDEX"),
    ) else {
        eprintln!("Skipping: Pinecone test indexes not configured");
        return;
    };

    let mut config = MigrationConfig::between_indexes(src, src_key, dst, dst_key);
    config.options.checkpoint_enabled = false;
    config.validate().expect("valid config");

    let orchestrator = Orchestrator::new(MigrationContext::from_config(&config).await.unwrap());
    let report = orchestrator.run(running()).await.expect("migration failed");

    println!("✅ Migrated {} vectors", report.totals().succeeded);
    assert_eq!(report.totals().failed, 0);
}
