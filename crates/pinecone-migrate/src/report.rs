//! Migration report.
//!
//! Built incrementally by the pipeline (one [`NamespaceReport`] per
//! namespace) and merged by the orchestrator. It is always produced, even
//! when the run is interrupted or fails a precondition, and can be written
//! as JSON.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};

/// Terminal state of one namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamespaceStatus {
    /// Not started.
    Pending,
    /// Every page was listed and handled.
    Completed,
    /// Listing failed; the namespace stopped early.
    Failed,
    /// Stopped by a cancellation signal; resumable.
    Interrupted,
}

/// One sampled failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSample {
    /// Error code (`MIGRATE-xxx`).
    pub code: String,
    /// Error message.
    pub message: String,
    /// Number of records the error applied to.
    pub records: u64,
    /// First affected id, if the error concerned records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_id: Option<String>,
}

/// Counters and outcome for one namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamespaceReport {
    /// Namespace name (empty for the default namespace).
    pub namespace: String,
    /// Count reported by the source at enumeration time.
    pub approximate_count: u64,
    /// Records the pipeline tried to write in this run.
    pub attempted: u64,
    /// Records written.
    pub succeeded: u64,
    /// Records that could not be written.
    pub failed: u64,
    /// Ids listed but gone by the time they were fetched.
    pub skipped_missing: u64,
    /// Pages handled in this run.
    pub pages: u64,
    /// Terminal state.
    pub status: NamespaceStatus,
    /// Whether the run picked up from a checkpoint.
    pub resumed: bool,
    /// Sampled error messages, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub error_samples: Vec<ErrorSample>,
    /// Errors seen beyond the sample limit.
    #[serde(default)]
    pub errors_not_sampled: u64,
}

impl NamespaceReport {
    /// Empty report for a namespace.
    pub fn new(namespace: impl Into<String>, approximate_count: u64) -> Self {
        Self {
            namespace: namespace.into(),
            approximate_count,
            attempted: 0,
            succeeded: 0,
            failed: 0,
            skipped_missing: 0,
            pages: 0,
            status: NamespaceStatus::Pending,
            resumed: false,
            error_samples: Vec::new(),
            errors_not_sampled: 0,
        }
    }

    /// Counts `ids` as failed and samples the error.
    pub fn record_failure(&mut self, ids: &[String], error: &Error, sample_limit: usize) {
        self.failed += ids.len() as u64;
        self.sample(error, ids.len() as u64, ids.first().cloned(), sample_limit);
    }

    /// Samples an error that did not concern particular records.
    pub fn record_error(&mut self, error: &Error, sample_limit: usize) {
        self.sample(error, 0, None, sample_limit);
    }

    fn sample(&mut self, error: &Error, records: u64, first_id: Option<String>, limit: usize) {
        if self.error_samples.len() < limit {
            self.error_samples.push(ErrorSample {
                code: error.code().to_string(),
                message: error.to_string(),
                records,
                first_id,
            });
        } else {
            self.errors_not_sampled += 1;
        }
    }

    /// Whether the namespace needs attention.
    pub fn has_failures(&self) -> bool {
        self.failed > 0 || self.status == NamespaceStatus::Failed
    }
}

/// Outcome of a whole run, mapped onto the process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every namespace completed without failed records.
    Success,
    /// Finished, but some records or namespaces failed.
    CompletedWithFailures,
    /// Aborted before any transfer (schema, credentials, config).
    Fatal,
    /// Stopped by a cancellation signal; rerun to resume.
    Interrupted,
}

impl RunOutcome {
    /// Process exit code.
    pub const fn exit_code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::CompletedWithFailures => 1,
            Self::Fatal => 2,
            Self::Interrupted => 3,
        }
    }
}

/// Totals over all namespaces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    /// Records attempted.
    pub attempted: u64,
    /// Records written.
    pub succeeded: u64,
    /// Records failed.
    pub failed: u64,
    /// Ids gone before fetch.
    pub skipped_missing: u64,
    /// Pages handled.
    pub pages: u64,
}

/// Report of one migration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationReport {
    /// Source index name.
    pub source_index: String,
    /// Destination index name.
    pub destination_index: String,
    /// Unix seconds at start.
    pub started_at: u64,
    /// Wall-clock duration.
    pub duration_secs: f64,
    /// Nothing was written.
    pub dry_run: bool,
    /// The destination index was created by this run.
    pub destination_created: bool,
    /// Per-namespace results, keyed by namespace name.
    pub namespaces: BTreeMap<String, NamespaceReport>,
    /// Run-level error that stopped the migration, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fatal_error: Option<String>,
    /// Overall outcome.
    pub outcome: RunOutcome,
}

impl MigrationReport {
    /// Starts an empty report.
    pub fn new(source_index: impl Into<String>, destination_index: impl Into<String>) -> Self {
        Self {
            source_index: source_index.into(),
            destination_index: destination_index.into(),
            started_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
            duration_secs: 0.0,
            dry_run: false,
            destination_created: false,
            namespaces: BTreeMap::new(),
            fatal_error: None,
            outcome: RunOutcome::Success,
        }
    }

    /// Report for a run that stopped before transferring anything.
    ///
    /// Precondition failures are [`RunOutcome::Fatal`]; anything else (a
    /// backend still failing after retries) is
    /// [`RunOutcome::CompletedWithFailures`].
    pub fn fatal(
        source_index: impl Into<String>,
        destination_index: impl Into<String>,
        error: &Error,
    ) -> Self {
        let mut report = Self::new(source_index, destination_index);
        report.fatal_error = Some(error.to_string());
        report.outcome = if error.is_fatal_precondition() {
            RunOutcome::Fatal
        } else {
            RunOutcome::CompletedWithFailures
        };
        report
    }

    /// Adds a namespace result.
    pub fn insert(&mut self, namespace: NamespaceReport) {
        self.namespaces.insert(namespace.namespace.clone(), namespace);
    }

    /// Derives [`Self::outcome`] from the namespace results.
    pub fn finalize(&mut self) {
        if self.fatal_error.is_some() {
            return;
        }
        let mut namespaces = self.namespaces.values();
        self.outcome = if namespaces
            .clone()
            .any(|ns| matches!(ns.status, NamespaceStatus::Interrupted | NamespaceStatus::Pending))
        {
            RunOutcome::Interrupted
        } else if namespaces.any(NamespaceReport::has_failures) {
            RunOutcome::CompletedWithFailures
        } else {
            RunOutcome::Success
        };
    }

    /// Sums the per-namespace counters.
    pub fn totals(&self) -> Totals {
        self.namespaces.values().fold(Totals::default(), |acc, ns| Totals {
            attempted: acc.attempted + ns.attempted,
            succeeded: acc.succeeded + ns.succeeded,
            failed: acc.failed + ns.failed,
            skipped_missing: acc.skipped_missing + ns.skipped_missing,
            pages: acc.pages + ns.pages,
        })
    }

    /// Records written per second.
    #[must_use]
    pub fn throughput(&self) -> f64 {
        if self.duration_secs > 0.0 {
            self.totals().succeeded as f64 / self.duration_secs
        } else {
            0.0
        }
    }

    /// Writes the report as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }
}
