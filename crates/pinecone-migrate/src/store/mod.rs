//! Store clients: the read/write surface the engine needs from a vector index.
//!
//! The migration engine talks to both sides exclusively through
//! [`VectorStore`]. Concrete adapters are picked from configuration by
//! [`create_store`].

pub mod common;
pub mod memory;
pub mod pinecone;
pub mod snapshot;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::StoreConfig;
use crate::error::Result;
use crate::model::{FetchOutcome, IdPage, IndexSchema, Namespace, VectorRecord};

pub use memory::MemoryStore;
pub use pinecone::PineconeStore;
pub use snapshot::SnapshotStore;

/// Operations a vector index must support to take part in a migration.
///
/// Implement this trait to add support for a new backend.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Short backend name for logs.
    fn store_type(&self) -> &'static str;

    /// Name of the bound index.
    fn index_name(&self) -> &str;

    /// Describes the bound index.
    ///
    /// Fails with [`Error::IndexNotFound`](crate::Error::IndexNotFound) when
    /// it does not exist.
    async fn describe_index(&self) -> Result<IndexSchema>;

    /// Creates the bound index.
    ///
    /// Succeeds when an index with a matching schema already exists and
    /// fails with [`Error::SchemaConflict`](crate::Error::SchemaConflict)
    /// when the existing one differs.
    async fn create_index(&self, schema: &IndexSchema) -> Result<()>;

    /// Whether a freshly created index accepts reads and writes.
    async fn is_ready(&self) -> Result<bool> {
        Ok(true)
    }

    /// Lists namespaces with approximate counts.
    ///
    /// Backends that cannot enumerate namespaces report only the default one.
    async fn list_namespaces(&self) -> Result<Vec<Namespace>> {
        Ok(vec![Namespace::default_namespace()])
    }

    /// Returns one page of ids, starting at `cursor` (`None` = first page).
    async fn list_ids(&self, namespace: &str, cursor: Option<&str>, limit: usize)
        -> Result<IdPage>;

    /// Fetches values and metadata for `ids`.
    async fn fetch(&self, namespace: &str, ids: &[String]) -> Result<FetchOutcome>;

    /// Inserts or overwrites `records` in `namespace`.
    async fn upsert(&self, namespace: &str, records: &[VectorRecord]) -> Result<()>;
}

/// Create a store client from configuration.
///
/// # Errors
///
/// Returns an error if the client cannot be constructed (e.g. unreadable
/// snapshot file).
pub fn create_store(config: &StoreConfig) -> Result<Arc<dyn VectorStore>> {
    match config {
        StoreConfig::Pinecone(cfg) => Ok(Arc::new(PineconeStore::new(cfg.clone())?)),
        StoreConfig::Snapshot(cfg) => Ok(Arc::new(SnapshotStore::open(cfg.clone())?)),
    }
}

/// Splits `ids` into fetched records and missing ids, keeping request order.
pub(crate) fn collect_fetched<F>(namespace: &str, ids: &[String], mut lookup: F) -> FetchOutcome
where
    F: FnMut(&str) -> Option<VectorRecord>,
{
    let mut outcome = FetchOutcome::default();
    for id in ids {
        match lookup(id) {
            Some(mut record) => {
                record.namespace = namespace.to_string();
                outcome.records.push(record);
            }
            None => outcome.missing_ids.push(id.clone()),
        }
    }
    outcome
}
