//! Schema compatibility gate.
//!
//! Runs before any vector moves. Either the destination already has the
//! source's dimension and metric, or it is created from the source schema;
//! anything else stops the migration with nothing written.

use std::time::Instant;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::ProvisioningConfig;
use crate::error::{Error, Result};
use crate::model::IndexSchema;
use crate::retry::{with_retry, RetryConfig};
use crate::store::VectorStore;

/// What the validator found or did.
#[derive(Debug, Clone, PartialEq)]
pub struct Compatibility {
    /// Schema of the source index.
    pub source: IndexSchema,
    /// Schema of the destination index (as found or as created).
    pub destination: IndexSchema,
    /// State of the destination after validation.
    pub destination_status: DestinationStatus,
}

/// How the destination looked to the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationStatus {
    /// Existed with a matching schema.
    Existing,
    /// Created by this run.
    Created,
    /// Absent; would be created by a real run.
    Missing,
}

/// Whether the validator may provision a missing destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// Create the destination when absent.
    Provision,
    /// Only compare; a missing destination is reported, not created.
    CheckOnly,
}

/// Compares source and destination schemas, provisioning the destination if
/// it does not exist.
///
/// Control-plane calls are retried with `retry` when the error is transient.
///
/// # Errors
///
/// - [`Error::IndexNotFound`] if the source index is missing.
/// - [`Error::SchemaMismatch`] if dimension or metric differ.
/// - [`Error::NotReady`] if a created index is not ready in time.
pub async fn validate_compatibility(
    source: &dyn VectorStore,
    destination: &dyn VectorStore,
    provisioning: &ProvisioningConfig,
    retry: &RetryConfig,
    mode: ValidationMode,
) -> Result<Compatibility> {
    let source_schema = with_retry(retry, "describe_source", || source.describe_index()).await?;
    info!(
        "Source '{}': dimension {}, metric {}",
        source.index_name(),
        source_schema.dimension,
        source_schema.metric
    );

    match with_retry(retry, "describe_destination", || destination.describe_index()).await {
        Ok(dest_schema) => {
            if let Some(detail) = source_schema.difference(&dest_schema) {
                return Err(Error::SchemaMismatch(format!(
                    "source '{}' and destination '{}' differ: {}",
                    source.index_name(),
                    destination.index_name(),
                    detail
                )));
            }
            info!(
                "Destination '{}' exists and matches the source schema",
                destination.index_name()
            );
            Ok(Compatibility {
                source: source_schema,
                destination: dest_schema,
                destination_status: DestinationStatus::Existing,
            })
        }
        Err(Error::IndexNotFound(_)) => {
            let request = IndexSchema {
                dimension: source_schema.dimension,
                metric: source_schema.metric,
                spec: provisioning.index_spec(),
            };
            if mode == ValidationMode::CheckOnly {
                info!(
                    "Destination '{}' does not exist and would be created",
                    destination.index_name()
                );
                return Ok(Compatibility {
                    source: source_schema,
                    destination: request,
                    destination_status: DestinationStatus::Missing,
                });
            }
            info!(
                "Destination '{}' does not exist; creating it ({} dims, {}, {:?})",
                destination.index_name(),
                request.dimension,
                request.metric,
                request.spec
            );
            with_retry(retry, "create_index", || destination.create_index(&request)).await?;
            wait_until_ready(destination, provisioning, retry).await?;
            Ok(Compatibility {
                source: source_schema,
                destination: request,
                destination_status: DestinationStatus::Created,
            })
        }
        Err(e) => Err(e),
    }
}

async fn wait_until_ready(
    store: &dyn VectorStore,
    provisioning: &ProvisioningConfig,
    retry: &RetryConfig,
) -> Result<()> {
    let started = Instant::now();
    loop {
        if with_retry(retry, "is_ready", || store.is_ready()).await? {
            info!("Index '{}' is ready", store.index_name());
            return Ok(());
        }
        if started.elapsed() >= provisioning.ready_timeout() {
            warn!(
                "Index '{}' not ready after {:?}",
                store.index_name(),
                provisioning.ready_timeout()
            );
            return Err(Error::NotReady(store.index_name().to_string()));
        }
        info!("Waiting for index '{}' provisioning...", store.index_name());
        sleep(provisioning.ready_poll_interval()).await;
    }
}
