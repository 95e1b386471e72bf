//! Batch transfer of one namespace.
//!
//! A producer lists id pages and fetches their records; a consumer upserts
//! them and saves the checkpoint. The two are joined over a bounded channel
//! so page `k + 1` is fetched while page `k` is written, while listing itself
//! stays strictly sequential.

use indicatif::ProgressBar;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::config::MigrationOptions;
use crate::error::{Error, Result};
use crate::model::{namespace_label, FetchOutcome, Namespace, VectorRecord};
use crate::report::{NamespaceReport, NamespaceStatus};
use crate::retry::{with_retry, RetryConfig};
use crate::store::VectorStore;

/// Where a namespace transfer stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    /// Not started.
    Pending,
    /// Listing the next page of ids.
    Paginating,
    /// Fetching records for a page.
    FetchingBatch,
    /// Writing records to the destination.
    Upserting,
    /// All pages handled.
    Completed,
    /// Listing failed.
    Failed,
    /// Stopped by the cancellation signal.
    Interrupted,
}

impl TransferState {
    /// Whether no further transition happens.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Interrupted)
    }

    /// Status reported for this state.
    pub const fn status(self) -> NamespaceStatus {
        match self {
            Self::Completed => NamespaceStatus::Completed,
            Self::Failed => NamespaceStatus::Failed,
            Self::Interrupted => NamespaceStatus::Interrupted,
            Self::Pending | Self::Paginating | Self::FetchingBatch | Self::Upserting => {
                NamespaceStatus::Pending
            }
        }
    }
}

/// Knobs for a namespace transfer.
#[derive(Debug, Clone)]
pub struct TransferOptions {
    /// Ids per page, and records per upsert before any split.
    pub batch_size: usize,
    /// Fetched pages buffered ahead of the writer.
    pub prefetch_pages: usize,
    /// Backoff for retryable store errors.
    pub retry: RetryConfig,
    /// Error messages kept per namespace.
    pub error_sample_limit: usize,
    /// Fetch and count, never write.
    pub dry_run: bool,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self::from(&MigrationOptions::default())
    }
}

impl From<&MigrationOptions> for TransferOptions {
    fn from(options: &MigrationOptions) -> Self {
        Self {
            batch_size: options.batch_size.max(1),
            prefetch_pages: options.prefetch_pages.max(1),
            retry: options.retry.to_retry_config(),
            error_sample_limit: options.error_sample_limit,
            dry_run: options.dry_run,
        }
    }
}

/// A listed page with its fetch result.
struct FetchedPage {
    ids: Vec<String>,
    fetched: Result<FetchOutcome>,
    next_cursor: Option<String>,
}

enum Produced {
    Page(FetchedPage),
    ListFailed(Error),
}

/// Moves every record of one namespace from source to destination.
pub struct NamespaceTransfer {
    source: Arc<dyn VectorStore>,
    destination: Arc<dyn VectorStore>,
    checkpoints: Arc<dyn CheckpointStore>,
    options: TransferOptions,
    dimension: u32,
    namespace: Namespace,
    state: watch::Sender<TransferState>,
    progress: ProgressBar,
}

impl NamespaceTransfer {
    /// Prepares a transfer; `dimension` is the destination's.
    pub fn new(
        source: Arc<dyn VectorStore>,
        destination: Arc<dyn VectorStore>,
        checkpoints: Arc<dyn CheckpointStore>,
        options: TransferOptions,
        dimension: u32,
        namespace: Namespace,
    ) -> Self {
        let (state, _) = watch::channel(TransferState::Pending);
        Self {
            source,
            destination,
            checkpoints,
            options,
            dimension,
            namespace,
            state,
            progress: ProgressBar::hidden(),
        }
    }

    /// Reports progress on `bar`.
    #[must_use]
    pub fn with_progress(mut self, bar: ProgressBar) -> Self {
        self.progress = bar;
        self
    }

    /// Follows state transitions.
    pub fn subscribe(&self) -> watch::Receiver<TransferState> {
        self.state.subscribe()
    }

    /// Current state.
    pub fn state(&self) -> TransferState {
        *self.state.borrow()
    }

    fn set_state(&self, state: TransferState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(
                "Namespace {}: {:?} -> {:?}",
                self.label(),
                previous,
                state
            );
            self.progress.set_message(format!("{} {:?}", self.label(), state));
        }
    }

    fn label(&self) -> &str {
        namespace_label(&self.namespace.name)
    }

    /// Runs the transfer to a terminal state and returns its report.
    ///
    /// Per-record and per-page errors are recorded, never returned.
    pub async fn run(&self, stop: watch::Receiver<bool>) -> NamespaceReport {
        let mut report = NamespaceReport::new(
            self.namespace.name.clone(),
            self.namespace.approximate_vector_count,
        );
        let mut checkpoint = self.load_checkpoint(&mut report).await;
        let loaded = checkpoint.clone();

        if !checkpoint.failed_ids.is_empty() {
            self.retry_failed(&mut checkpoint, &mut report, &stop).await;
        }

        let end = if checkpoint.completed {
            info!("Namespace {} already migrated; skipping", self.label());
            TransferState::Completed
        } else if *stop.borrow() {
            TransferState::Interrupted
        } else {
            self.transfer_pages(&mut checkpoint, &mut report, stop).await
        };

        if checkpoint != loaded {
            self.save_checkpoint(&checkpoint, &mut report).await;
        }
        self.set_state(end);
        report.status = end.status();

        match end {
            TransferState::Completed => self.progress.finish_with_message(format!(
                "{} done ({} written, {} failed)",
                self.label(),
                report.succeeded,
                report.failed
            )),
            _ => self.progress.abandon_with_message(format!("{} {:?}", self.label(), end)),
        }
        info!(
            "Namespace {}: {:?}, {} attempted, {} written, {} failed, {} missing",
            self.label(),
            end,
            report.attempted,
            report.succeeded,
            report.failed,
            report.skipped_missing
        );
        report
    }

    async fn load_checkpoint(&self, report: &mut NamespaceReport) -> Checkpoint {
        let destination = self.destination.index_name();
        let source = self.source.index_name();
        let fresh = || Checkpoint::new(destination, self.namespace.name.clone(), source);

        match self.checkpoints.load(destination, &self.namespace.name).await {
            Ok(Some(cp)) if cp.source_index.is_empty() || cp.source_index == source => {
                info!(
                    "Resuming namespace {} after {} page(s), {} pending retries",
                    self.label(),
                    cp.pages_completed,
                    cp.failed_ids.len()
                );
                report.resumed = true;
                self.progress.set_position(cp.vectors_transferred);
                cp
            }
            Ok(Some(cp)) => {
                warn!(
                    "Checkpoint for namespace {} was written for source '{}'; starting over",
                    self.label(),
                    cp.source_index
                );
                fresh()
            }
            Ok(None) => fresh(),
            Err(e) => {
                warn!("Could not load checkpoint for {}: {}", self.label(), e);
                report.record_error(&e, self.options.error_sample_limit);
                fresh()
            }
        }
    }

    async fn save_checkpoint(&self, checkpoint: &Checkpoint, report: &mut NamespaceReport) {
        if self.options.dry_run {
            return;
        }
        if let Err(e) = self.checkpoints.save(checkpoint).await {
            warn!("Could not save checkpoint for {}: {}", self.label(), e);
            report.record_error(&e, self.options.error_sample_limit);
        }
    }

    /// Retries ids that failed in a previous run, before new pages.
    async fn retry_failed(
        &self,
        checkpoint: &mut Checkpoint,
        report: &mut NamespaceReport,
        stop: &watch::Receiver<bool>,
    ) {
        let ids: Vec<String> = std::mem::take(&mut checkpoint.failed_ids).into_iter().collect();
        info!(
            "Retrying {} previously failed id(s) in namespace {}",
            ids.len(),
            self.label()
        );

        let batch_size = self.options.batch_size;
        for (n, chunk) in ids.chunks(batch_size).enumerate() {
            if *stop.borrow() {
                checkpoint.record_failures(&ids[n * batch_size..]);
                break;
            }
            self.set_state(TransferState::FetchingBatch);
            let fetched = self.fetch(chunk).await;
            self.write_page(chunk, fetched, checkpoint, report).await;
        }
        self.save_checkpoint(checkpoint, report).await;
    }

    async fn transfer_pages(
        &self,
        checkpoint: &mut Checkpoint,
        report: &mut NamespaceReport,
        stop: watch::Receiver<bool>,
    ) -> TransferState {
        let (tx, rx) = mpsc::channel(self.options.prefetch_pages);
        let producer = self.produce(checkpoint.cursor.clone(), tx, stop.clone());
        let consumer = self.consume(rx, checkpoint, report, stop);
        let ((), end) = tokio::join!(producer, consumer);
        end
    }

    async fn produce(
        &self,
        mut cursor: Option<String>,
        tx: mpsc::Sender<Produced>,
        stop: watch::Receiver<bool>,
    ) {
        let namespace = self.namespace.name.as_str();
        loop {
            if *stop.borrow() {
                debug!("Namespace {}: stop requested, no new pages", self.label());
                return;
            }

            self.set_state(TransferState::Paginating);
            let listed = with_retry(&self.options.retry, "list_ids", || {
                self.source
                    .list_ids(namespace, cursor.as_deref(), self.options.batch_size)
            })
            .await;
            let page = match listed {
                Ok(page) => page,
                Err(e) => {
                    let _ = tx.send(Produced::ListFailed(e)).await;
                    return;
                }
            };
            debug!(
                "Namespace {}: listed {} id(s), next cursor {:?}",
                self.label(),
                page.ids.len(),
                page.next_cursor
            );

            let fetched = if page.ids.is_empty() {
                Ok(FetchOutcome::default())
            } else {
                self.set_state(TransferState::FetchingBatch);
                self.fetch(&page.ids).await
            };

            let next_cursor = page.next_cursor;
            let item = Produced::Page(FetchedPage {
                ids: page.ids,
                fetched,
                next_cursor: next_cursor.clone(),
            });
            if tx.send(item).await.is_err() {
                return;
            }
            match next_cursor {
                Some(next) => cursor = Some(next),
                None => return,
            }
        }
    }

    async fn consume(
        &self,
        mut rx: mpsc::Receiver<Produced>,
        checkpoint: &mut Checkpoint,
        report: &mut NamespaceReport,
        stop: watch::Receiver<bool>,
    ) -> TransferState {
        while let Some(item) = rx.recv().await {
            if *stop.borrow() {
                return TransferState::Interrupted;
            }
            match item {
                Produced::ListFailed(e) => {
                    warn!("Listing namespace {} failed: {}", self.label(), e);
                    report.record_error(&e, self.options.error_sample_limit);
                    return TransferState::Failed;
                }
                Produced::Page(page) => {
                    let last = page.next_cursor.is_none();
                    let handled = page.ids.len() as u64;
                    self.write_page(&page.ids, page.fetched, checkpoint, report)
                        .await;

                    report.pages += 1;
                    checkpoint.pages_completed += 1;
                    checkpoint.cursor = page.next_cursor;
                    checkpoint.completed = last;
                    self.save_checkpoint(checkpoint, report).await;
                    self.progress.inc(handled);

                    if last {
                        return TransferState::Completed;
                    }
                }
            }
        }
        TransferState::Interrupted
    }

    async fn fetch(&self, ids: &[String]) -> Result<FetchOutcome> {
        with_retry(&self.options.retry, "fetch", || {
            self.source.fetch(&self.namespace.name, ids)
        })
        .await
    }

    /// Writes the records of one page, recording every failure.
    async fn write_page(
        &self,
        ids: &[String],
        fetched: Result<FetchOutcome>,
        checkpoint: &mut Checkpoint,
        report: &mut NamespaceReport,
    ) {
        let outcome = match fetched {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    "Fetching {} id(s) from namespace {} failed: {}",
                    ids.len(),
                    self.label(),
                    e
                );
                report.attempted += ids.len() as u64;
                report.record_failure(ids, &e, self.options.error_sample_limit);
                checkpoint.record_failures(ids);
                return;
            }
        };

        if outcome.is_partial() {
            debug!(
                "Namespace {}: {} id(s) vanished before fetch",
                self.label(),
                outcome.missing_ids.len()
            );
            report.skipped_missing += outcome.missing_ids.len() as u64;
        }
        self.write_records(outcome.records, checkpoint, report).await;
    }

    async fn write_records(
        &self,
        records: Vec<VectorRecord>,
        checkpoint: &mut Checkpoint,
        report: &mut NamespaceReport,
    ) {
        if records.is_empty() {
            return;
        }
        report.attempted += records.len() as u64;
        if self.options.dry_run {
            return;
        }

        let limit = self.options.error_sample_limit;
        let dimension = self.dimension as usize;
        let (valid, invalid): (Vec<_>, Vec<_>) = records
            .into_iter()
            .partition(|r| r.values.len() == dimension);
        for record in invalid {
            let err = Error::Validation(format!(
                "vector '{}' has dimension {}, destination expects {}",
                record.id,
                record.values.len(),
                dimension
            ));
            let ids = std::slice::from_ref(&record.id);
            report.record_failure(ids, &err, limit);
            checkpoint.record_failures(ids);
        }

        self.set_state(TransferState::Upserting);
        let namespace = self.namespace.name.as_str();
        let mut pending = vec![valid];
        while let Some(chunk) = pending.pop() {
            if chunk.is_empty() {
                continue;
            }
            let result = with_retry(&self.options.retry, "upsert", || {
                self.destination.upsert(namespace, &chunk)
            })
            .await;

            match result {
                Ok(()) => {
                    report.succeeded += chunk.len() as u64;
                    checkpoint.vectors_transferred += chunk.len() as u64;
                }
                Err(e @ (Error::PayloadTooLarge(_) | Error::Validation(_))) if chunk.len() > 1 => {
                    debug!(
                        "Namespace {}: splitting batch of {} after: {}",
                        self.label(),
                        chunk.len(),
                        e
                    );
                    let mut first = chunk;
                    let second = first.split_off(first.len() / 2);
                    pending.push(second);
                    pending.push(first);
                }
                Err(e) => {
                    let ids: Vec<String> = chunk.iter().map(|r| r.id.clone()).collect();
                    warn!(
                        "Upsert of {} record(s) into namespace {} failed: {}",
                        ids.len(),
                        self.label(),
                        e
                    );
                    report.record_failure(&ids, &e, limit);
                    checkpoint.record_failures(&ids);
                }
            }
        }
    }
}
