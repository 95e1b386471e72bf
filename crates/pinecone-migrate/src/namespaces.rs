//! Namespace discovery on the source index.

use tracing::{info, warn};

use crate::error::Result;
use crate::model::Namespace;
use crate::retry::{with_retry, RetryConfig};
use crate::store::VectorStore;

/// Discovers the namespaces to migrate.
///
/// The default namespace is included when the backend reports none, so
/// untagged vectors are never skipped. When `only` is non-empty, the result
/// is restricted to those names; requested names the source does not report
/// are still migrated (their count is unknown, so 0).
///
/// Counts are approximate and only drive progress display. Transient
/// errors from the stats call are retried with `retry`.
pub async fn enumerate_namespaces(
    source: &dyn VectorStore,
    only: &[String],
    retry: &RetryConfig,
) -> Result<Vec<Namespace>> {
    let mut namespaces = with_retry(retry, "list_namespaces", || source.list_namespaces()).await?;

    if namespaces.is_empty() {
        namespaces.push(Namespace::default_namespace());
    }

    if !only.is_empty() {
        for wanted in only {
            if !namespaces.iter().any(|ns| &ns.name == wanted) {
                warn!(
                    "Namespace '{}' not reported by the source; migrating it anyway",
                    wanted
                );
                namespaces.push(Namespace::new(wanted.clone(), 0));
            }
        }
        namespaces.retain(|ns| only.contains(&ns.name));
    }

    namespaces.sort_by(|a, b| a.name.cmp(&b.name));
    namespaces.dedup_by(|a, b| a.name == b.name);

    let total: u64 = namespaces.iter().map(|ns| ns.approximate_vector_count).sum();
    info!(
        "Found {} namespace(s) in '{}', ~{} vectors",
        namespaces.len(),
        source.index_name(),
        total
    );
    Ok(namespaces)
}
