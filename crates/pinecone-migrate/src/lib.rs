// Migration tool - pedantic lints relaxed for CLI ergonomics
#![allow(clippy::pedantic)]

//! # Pinecone Migration Tool
//!
//! `pinecone-migrate` is a CLI tool and library for copying every vector,
//! its metadata and its namespace from one Pinecone index into another,
//! creating the destination index when it does not exist.
//!
//! ## Guarantees
//!
//! | Property | How |
//! |----------|-----|
//! | Schema gate | Dimension and metric are compared before any write |
//! | Completeness | Every listed id is written, reported failed, or reported missing |
//! | Idempotence | Upserts overwrite by id; reruns never duplicate |
//! | Resumability | Per-namespace checkpoints; reruns skip finished pages |
//! | Isolation | A bad record fails alone; the batch is split until it does |
//!
//! ## Quick Start
//!
//! ```bash
//! export PINECONE_SOURCE_API_KEY=...
//! export PINECONE_DEST_API_KEY=...
//!
//! # Copy "docs" into "docs-v2" (created if missing)
//! pinecone-migrate docs docs-v2
//!
//! # Compare schemas only
//! pinecone-migrate check docs docs-v2
//! ```
//!
//! ## Configuration Example
//!
//! ```yaml
//! source:
//!   type: pinecone
//!   index: docs
//!
//! destination:
//!   type: pinecone
//!   index: docs-v2
//!
//! options:
//!   batch_size: 100
//!   concurrency: 4
//! ```
//!
//! ## Library use
//!
//! ```no_run
//! use pinecone_migrate::{MigrationConfig, MigrationContext, Orchestrator};
//!
//! # async fn example() -> pinecone_migrate::Result<()> {
//! let config = MigrationConfig::between_indexes("docs", "src-key", "docs-v2", "dst-key");
//! config.validate()?;
//! let orchestrator = Orchestrator::new(MigrationContext::from_config(&config).await?);
//! let (_stop_tx, stop) = tokio::sync::watch::channel(false);
//! let report = orchestrator.run(stop).await?;
//! println!("{} vectors written", report.totals().succeeded);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod model;
pub mod namespaces;
pub mod orchestrator;
pub mod pipeline;
pub mod progress;
pub mod report;
pub mod retry;
pub mod store;
pub mod validator;
pub mod wizard;

pub use checkpoint::{Checkpoint, CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
pub use config::{MigrationConfig, MigrationOptions, StoreConfig};
pub use error::{Error, Result};
pub use model::{IndexSchema, Metric, Namespace, VectorRecord};
pub use orchestrator::{MigrationContext, Orchestrator};
pub use pipeline::{NamespaceTransfer, TransferState};
pub use report::{MigrationReport, NamespaceReport, NamespaceStatus, RunOutcome};
pub use store::{create_store, VectorStore};
pub use validator::{validate_compatibility, Compatibility, DestinationStatus};
