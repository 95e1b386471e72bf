//! Error types for `pinecone-migrate`.
//!
//! Every failure the engine can observe maps onto one variant here. The
//! variants fall into four classes that drive how the pipeline reacts:
//!
//! - fatal preconditions abort the run before any write happens,
//! - retryable errors are retried with backoff,
//! - data-level errors are recorded against the offending records,
//! - resource errors (`PayloadTooLarge`) trigger a batch split.
//!
//! Error codes follow the pattern `MIGRATE-XXX` for easy debugging.

use thiserror::Error;

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while migrating an index.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (MIGRATE-001).
    #[error("[MIGRATE-001] Configuration error: {0}")]
    Config(String),

    /// Index does not exist (MIGRATE-002).
    #[error("[MIGRATE-002] Index '{0}' not found")]
    IndexNotFound(String),

    /// Index already exists (MIGRATE-003).
    ///
    /// Stores translate this into success when the existing schema matches.
    #[error("[MIGRATE-003] Index '{0}' already exists")]
    AlreadyExists(String),

    /// Existing index has a different schema than the one requested (MIGRATE-004).
    #[error("[MIGRATE-004] Index '{index}' already exists with a different schema: {detail}")]
    SchemaConflict {
        /// Index name.
        index: String,
        /// Human-readable description of the difference.
        detail: String,
    },

    /// Source and destination schemas are incompatible (MIGRATE-005).
    #[error("[MIGRATE-005] Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Credentials rejected by the backend (MIGRATE-006).
    #[error("[MIGRATE-006] Authentication failed: {0}")]
    Authentication(String),

    /// Backend asked us to slow down (MIGRATE-007).
    ///
    /// Carries the suggested wait in seconds when the backend sent one.
    #[error("[MIGRATE-007] Rate limited (retry after {0:?}s)")]
    RateLimit(Option<u64>),

    /// Request body exceeded the backend's payload limit (MIGRATE-008).
    #[error("[MIGRATE-008] Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Backend rejected the records themselves (MIGRATE-009).
    #[error("[MIGRATE-009] Validation error: {0}")]
    Validation(String),

    /// Backend temporarily unavailable, 5xx or similar (MIGRATE-010).
    #[error("[MIGRATE-010] Service unavailable: {0}")]
    Unavailable(String),

    /// Operation not supported by this index or store (MIGRATE-011).
    #[error("[MIGRATE-011] Unsupported operation: {0}")]
    Unsupported(String),

    /// Index did not become ready in time (MIGRATE-012).
    #[error("[MIGRATE-012] Index '{0}' was not ready before the timeout")]
    NotReady(String),

    /// Unexpected backend answer (MIGRATE-013).
    #[error("[MIGRATE-013] Store error: {0}")]
    Store(String),

    /// Checkpoint persistence failed (MIGRATE-014).
    #[error("[MIGRATE-014] Checkpoint error: {0}")]
    Checkpoint(String),

    /// Run was stopped by a cancellation signal (MIGRATE-015).
    #[error("[MIGRATE-015] Migration cancelled")]
    Cancelled,

    /// HTTP transport error (MIGRATE-016).
    #[error("[MIGRATE-016] HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error (MIGRATE-017).
    #[error("[MIGRATE-017] IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error (MIGRATE-018).
    #[error("[MIGRATE-018] JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error (MIGRATE-019).
    #[error("[MIGRATE-019] YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Returns the error code (e.g., "MIGRATE-001").
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "MIGRATE-001",
            Self::IndexNotFound(_) => "MIGRATE-002",
            Self::AlreadyExists(_) => "MIGRATE-003",
            Self::SchemaConflict { .. } => "MIGRATE-004",
            Self::SchemaMismatch(_) => "MIGRATE-005",
            Self::Authentication(_) => "MIGRATE-006",
            Self::RateLimit(_) => "MIGRATE-007",
            Self::PayloadTooLarge(_) => "MIGRATE-008",
            Self::Validation(_) => "MIGRATE-009",
            Self::Unavailable(_) => "MIGRATE-010",
            Self::Unsupported(_) => "MIGRATE-011",
            Self::NotReady(_) => "MIGRATE-012",
            Self::Store(_) => "MIGRATE-013",
            Self::Checkpoint(_) => "MIGRATE-014",
            Self::Cancelled => "MIGRATE-015",
            Self::Http(_) => "MIGRATE-016",
            Self::Io(_) => "MIGRATE-017",
            Self::Json(_) => "MIGRATE-018",
            Self::Yaml(_) => "MIGRATE-019",
        }
    }

    /// Returns true if retrying the same request may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimit(_) | Self::Unavailable(_) => true,
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }

    /// Returns true if this error must stop the run before any transfer.
    #[must_use]
    pub const fn is_fatal_precondition(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::IndexNotFound(_)
                | Self::SchemaConflict { .. }
                | Self::SchemaMismatch(_)
                | Self::Authentication(_)
                | Self::NotReady(_)
        )
    }

    /// Suggested wait before the next attempt, when the backend sent one.
    #[must_use]
    pub const fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimit(secs) => *secs,
            _ => None,
        }
    }
}
