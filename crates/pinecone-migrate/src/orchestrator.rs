//! Runs a whole migration: validate, enumerate, transfer namespaces.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::info;

use crate::checkpoint::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
use crate::config::{MigrationConfig, MigrationOptions, ProvisioningConfig};
use crate::error::Result;
use crate::namespaces::enumerate_namespaces;
use crate::pipeline::{NamespaceTransfer, TransferOptions};
use crate::progress::MigrationProgress;
use crate::report::{MigrationReport, NamespaceReport};
use crate::store::{create_store, VectorStore};
use crate::validator::{validate_compatibility, Compatibility, DestinationStatus, ValidationMode};

/// Everything a run needs, resolved up front.
pub struct MigrationContext {
    /// Source-bound store.
    pub source: Arc<dyn VectorStore>,
    /// Destination-bound store.
    pub destination: Arc<dyn VectorStore>,
    /// Checkpoint persistence.
    pub checkpoints: Arc<dyn CheckpointStore>,
    /// Run options.
    pub options: MigrationOptions,
    /// How a missing destination is created.
    pub provisioning: ProvisioningConfig,
}

impl MigrationContext {
    /// Builds stores and the checkpoint store from a validated config.
    ///
    /// Checkpoints live in memory when disabled or on a dry run.
    ///
    /// # Errors
    ///
    /// Returns an error if a store cannot be constructed or the checkpoint
    /// file is unreadable.
    pub async fn from_config(config: &MigrationConfig) -> Result<Self> {
        let source = create_store(&config.source)?;
        let destination = create_store(&config.destination)?;

        let checkpoints: Arc<dyn CheckpointStore> = match config.options.resolved_checkpoint_path() {
            Some(path) if !config.options.dry_run => {
                info!("Checkpoints: {}", path.display());
                Arc::new(FileCheckpointStore::open(path).await?)
            }
            _ => Arc::new(MemoryCheckpointStore::new()),
        };

        Ok(Self {
            source,
            destination,
            checkpoints,
            options: config.options.clone(),
            provisioning: config.provisioning.clone(),
        })
    }
}

/// Migration driver.
pub struct Orchestrator {
    context: MigrationContext,
    progress: MigrationProgress,
}

impl Orchestrator {
    /// Creates an orchestrator without visible progress bars.
    pub fn new(context: MigrationContext) -> Self {
        Self {
            context,
            progress: MigrationProgress::hidden(),
        }
    }

    /// Draws progress on `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: MigrationProgress) -> Self {
        self.progress = progress;
        self
    }

    /// The resolved context.
    pub fn context(&self) -> &MigrationContext {
        &self.context
    }

    /// Compares schemas without creating or writing anything.
    ///
    /// # Errors
    ///
    /// Returns the precondition failure, if any.
    pub async fn check(&self) -> Result<Compatibility> {
        validate_compatibility(
            self.context.source.as_ref(),
            self.context.destination.as_ref(),
            &self.context.provisioning,
            &self.context.options.retry.to_retry_config(),
            ValidationMode::CheckOnly,
        )
        .await
    }

    /// Runs the migration until every namespace reaches a terminal state.
    ///
    /// Namespaces are transferred concurrently, up to `concurrency` at a
    /// time. Setting `stop` to `true` interrupts the run after in-flight
    /// upserts; rerunning resumes from the checkpoints.
    ///
    /// # Errors
    ///
    /// Only fatal preconditions are returned as errors (schema mismatch,
    /// missing source, credentials, checkpoint reset failure). Everything
    /// else ends up in the report.
    pub async fn run(&self, stop: watch::Receiver<bool>) -> Result<MigrationReport> {
        let ctx = &self.context;
        let started = Instant::now();
        let mut report = MigrationReport::new(ctx.source.index_name(), ctx.destination.index_name());
        report.dry_run = ctx.options.dry_run;

        info!(
            "Migrating '{}' ({}) -> '{}' ({})",
            ctx.source.index_name(),
            ctx.source.store_type(),
            ctx.destination.index_name(),
            ctx.destination.store_type()
        );

        let mode = if ctx.options.dry_run {
            info!("Dry run mode - not writing to destination");
            ValidationMode::CheckOnly
        } else {
            ValidationMode::Provision
        };
        let retry = ctx.options.retry.to_retry_config();
        let compat = validate_compatibility(
            ctx.source.as_ref(),
            ctx.destination.as_ref(),
            &ctx.provisioning,
            &retry,
            mode,
        )
        .await?;
        report.destination_created = compat.destination_status == DestinationStatus::Created;

        if ctx.options.reset_checkpoints && !ctx.options.dry_run {
            ctx.checkpoints.clear(ctx.destination.index_name()).await?;
        }

        let namespaces = enumerate_namespaces(ctx.source.as_ref(), &ctx.options.namespaces, &retry).await?;

        let options = TransferOptions::from(&ctx.options);
        let dimension = compat.destination.dimension;
        let results: Vec<NamespaceReport> = stream::iter(namespaces)
            .map(|namespace| {
                let bar = self.progress.namespace_bar(&namespace);
                let transfer = NamespaceTransfer::new(
                    ctx.source.clone(),
                    ctx.destination.clone(),
                    ctx.checkpoints.clone(),
                    options.clone(),
                    dimension,
                    namespace,
                )
                .with_progress(bar);
                let stop = stop.clone();
                async move { transfer.run(stop).await }
            })
            .buffer_unordered(ctx.options.concurrency.max(1))
            .collect()
            .await;

        for namespace in results {
            report.insert(namespace);
        }
        report.duration_secs = started.elapsed().as_secs_f64();
        report.finalize();

        let totals = report.totals();
        info!(
            "Migration {:?}: {} written, {} failed, {} missing in {:.2}s ({:.0} vectors/sec)",
            report.outcome,
            totals.succeeded,
            totals.failed,
            totals.skipped_missing,
            report.duration_secs,
            report.throughput()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::model::{IndexSchema, Metric, VectorRecord};
    use crate::report::{NamespaceStatus, RunOutcome};
    use crate::store::MemoryStore;

    fn context(source: Arc<MemoryStore>, destination: Arc<MemoryStore>) -> MigrationContext {
        let mut options = MigrationOptions {
            batch_size: 3,
            concurrency: 2,
            ..MigrationOptions::default()
        };
        options.retry.initial_delay_ms = 1;
        options.retry.max_delay_ms = 5;
        MigrationContext {
            source,
            destination,
            checkpoints: Arc::new(MemoryCheckpointStore::new()),
            options,
            provisioning: ProvisioningConfig::default(),
        }
    }

    fn source_with(namespaces: &[(&str, usize)]) -> Arc<MemoryStore> {
        let store = MemoryStore::with_schema("src", IndexSchema::new(2, Metric::Cosine));
        for (name, count) in namespaces {
            store.insert(
                name,
                (0..*count).map(|i| VectorRecord::new(format!("{name}-{i}"), vec![0.5, i as f32])),
            );
        }
        Arc::new(store)
    }

    fn running() -> watch::Receiver<bool> {
        watch::channel(false).1
    }

    #[tokio::test]
    async fn test_all_namespaces_copied() {
        let source = source_with(&[("a", 7), ("b", 2), ("c", 4)]);
        let destination = Arc::new(MemoryStore::new("dst"));

        let report = Orchestrator::new(context(source.clone(), destination.clone()))
            .run(running())
            .await
            .unwrap();

        assert_eq!(report.outcome, RunOutcome::Success);
        assert!(report.destination_created);
        assert_eq!(report.namespaces.len(), 3);
        for name in ["a", "b", "c"] {
            assert_eq!(destination.records(name), source.records(name));
            assert_eq!(report.namespaces[name].status, NamespaceStatus::Completed);
        }
    }

    #[tokio::test]
    async fn test_schema_mismatch_is_fatal_and_silent() {
        let source = Arc::new(MemoryStore::with_schema("src", IndexSchema::new(768, Metric::Cosine)));
        source.insert("", [VectorRecord::new("x", vec![0.0; 768])]);
        let destination = Arc::new(MemoryStore::with_schema("dst", IndexSchema::new(512, Metric::Cosine)));

        let err = Orchestrator::new(context(source.clone(), destination.clone()))
            .run(running())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::SchemaMismatch(_)));
        assert!(err.is_fatal_precondition());
        assert_eq!(source.calls().list, 0);
        assert_eq!(source.calls().fetch, 0);
        assert_eq!(destination.calls().upsert, 0);
    }

    #[tokio::test]
    async fn test_namespace_filter() {
        let source = source_with(&[("a", 2), ("b", 2)]);
        let destination = Arc::new(MemoryStore::new("dst"));
        let mut ctx = context(source, destination.clone());
        ctx.options.namespaces = vec!["b".to_string()];

        let report = Orchestrator::new(ctx).run(running()).await.unwrap();

        assert_eq!(report.namespaces.keys().collect::<Vec<_>>(), vec!["b"]);
        assert_eq!(destination.namespace_names(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_reset_checkpoints_forces_full_copy() {
        let source = source_with(&[("a", 4)]);
        let destination = Arc::new(MemoryStore::new("dst"));
        let orchestrator = Orchestrator::new(context(source.clone(), destination.clone()));
        orchestrator.run(running()).await.unwrap();
        let upserts_first = destination.calls().upsert;

        // Rerun without reset: nothing left to do.
        orchestrator.run(running()).await.unwrap();
        assert_eq!(destination.calls().upsert, upserts_first);

        let mut ctx = context(source, destination.clone());
        ctx.checkpoints = orchestrator.context().checkpoints.clone();
        ctx.options.reset_checkpoints = true;
        let report = Orchestrator::new(ctx).run(running()).await.unwrap();

        assert_eq!(report.namespaces["a"].succeeded, 4);
        assert!(!report.namespaces["a"].resumed);
        assert_eq!(destination.calls().upsert, upserts_first * 2);
    }

    #[tokio::test]
    async fn test_check_does_not_create_destination() {
        let source = source_with(&[("a", 1)]);
        let destination = Arc::new(MemoryStore::new("dst"));

        let compat = Orchestrator::new(context(source, destination.clone()))
            .check()
            .await
            .unwrap();

        assert_eq!(compat.destination_status, DestinationStatus::Missing);
        assert!(destination.describe_index().await.is_err());
    }
}
