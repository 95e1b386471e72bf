//! Pinecone store client over the REST API.
//!
//! Index management goes to the control plane (`/indexes`); vector
//! operations go to the index's data-plane host, which is taken from the
//! configuration or resolved once through `describe_index`.

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::num::NonZeroU32;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::common::{
    create_http_client, handle_http_error, normalize_host, retry_after_secs, validate_url,
};
use super::{collect_fetched, VectorStore};
use crate::config::PineconeConfig;
use crate::error::{Error, Result};
use crate::model::{
    FetchOutcome, IdPage, IndexSchema, IndexSpec, Metadata, Metric, Namespace, SparseValues,
    VectorRecord,
};

/// Largest page `GET /vectors/list` serves.
pub const MAX_LIST_LIMIT: usize = 100;

/// Index description from the control plane.
#[derive(Debug, Deserialize)]
struct IndexModel {
    dimension: u32,
    #[serde(default)]
    metric: Metric,
    host: Option<String>,
    #[serde(default)]
    spec: Option<IndexSpec>,
    #[serde(default)]
    status: Option<IndexStatus>,
}

#[derive(Debug, Deserialize)]
struct IndexStatus {
    #[serde(default)]
    ready: bool,
}

#[derive(Debug, Serialize)]
struct CreateIndexRequest<'a> {
    name: &'a str,
    dimension: u32,
    metric: Metric,
    spec: &'a IndexSpec,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexStats {
    #[serde(default)]
    namespaces: HashMap<String, NamespaceSummary>,
    #[serde(default)]
    total_vector_count: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NamespaceSummary {
    #[serde(default)]
    vector_count: u64,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    vectors: Vec<ListItem>,
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
struct ListItem {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FetchResponse {
    #[serde(default)]
    vectors: HashMap<String, FetchedVector>,
}

#[derive(Debug, Deserialize)]
struct FetchedVector {
    id: String,
    #[serde(default)]
    values: Vec<f32>,
    #[serde(default, rename = "sparseValues")]
    sparse_values: Option<SparseValues>,
    #[serde(default)]
    metadata: Option<Metadata>,
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<UpsertVector<'a>>,
    namespace: &'a str,
}

#[derive(Debug, Serialize)]
struct UpsertVector<'a> {
    id: &'a str,
    values: &'a [f32],
    #[serde(rename = "sparseValues", skip_serializing_if = "Option::is_none")]
    sparse_values: Option<&'a SparseValues>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<&'a Metadata>,
}

impl<'a> From<&'a VectorRecord> for UpsertVector<'a> {
    fn from(record: &'a VectorRecord) -> Self {
        Self {
            id: &record.id,
            values: &record.values,
            sparse_values: record.sparse_values.as_ref(),
            metadata: record.metadata.as_ref(),
        }
    }
}

/// Pinecone index client.
pub struct PineconeStore {
    config: PineconeConfig,
    client: Client,
    host: OnceCell<String>,
    limiter: Option<DefaultDirectRateLimiter>,
}

impl PineconeStore {
    /// Creates a client bound to `config.index`.
    ///
    /// # Errors
    ///
    /// Returns an error if the control-plane URL is malformed.
    pub fn new(config: PineconeConfig) -> Result<Self> {
        validate_url(&config.controller_url)?;

        let host = OnceCell::new_with(config.host.as_deref().map(normalize_host));
        let limiter = config
            .max_requests_per_second
            .and_then(NonZeroU32::new)
            .map(|rps| RateLimiter::direct(Quota::per_second(rps)));

        Ok(Self {
            config,
            client: create_http_client(),
            host,
            limiter,
        })
    }

    fn controller_url(&self, path: &str) -> String {
        format!("{}{}", self.config.controller_url.trim_end_matches('/'), path)
    }

    /// Makes an authenticated request.
    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("Api-Key", &self.config.api_key)
            .header("X-Pinecone-API-Version", &self.config.api_version)
    }

    /// Sends a request, waiting for the client-side quota first.
    async fn send(&self, req: RequestBuilder) -> Result<Response> {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
        let response = self.authorized(req).send().await?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let retry_after = retry_after_secs(response.headers());
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(handle_http_error(
            status,
            &body,
            &self.config.index,
            retry_after,
        ))
    }

    async fn describe(&self) -> Result<IndexModel> {
        let url = self.controller_url(&format!("/indexes/{}", self.config.index));
        let response = self.send(self.client.get(&url)).await?;
        response
            .json()
            .await
            .map_err(|e| Error::Store(format!("Failed to parse index description: {}", e)))
    }

    /// Data-plane base URL of the index.
    async fn data_url(&self, path: &str) -> Result<String> {
        let host = self
            .host
            .get_or_try_init(|| async {
                let model = self.describe().await?;
                let host = model.host.ok_or_else(|| {
                    Error::Store(format!(
                        "index '{}' has no data-plane host yet",
                        self.config.index
                    ))
                })?;
                debug!("Resolved host for '{}': {}", self.config.index, host);
                Ok::<_, Error>(normalize_host(&host))
            })
            .await?;
        Ok(format!("{host}{path}"))
    }
}

#[async_trait]
impl VectorStore for PineconeStore {
    fn store_type(&self) -> &'static str {
        "pinecone"
    }

    fn index_name(&self) -> &str {
        &self.config.index
    }

    async fn describe_index(&self) -> Result<IndexSchema> {
        let model = self.describe().await?;
        if let Some(host) = &model.host {
            let _ = self.host.set(normalize_host(host));
        }
        Ok(IndexSchema {
            dimension: model.dimension,
            metric: model.metric,
            spec: model.spec.unwrap_or_default(),
        })
    }

    async fn create_index(&self, schema: &IndexSchema) -> Result<()> {
        let body = CreateIndexRequest {
            name: &self.config.index,
            dimension: schema.dimension,
            metric: schema.metric,
            spec: &schema.spec,
        };
        let url = self.controller_url("/indexes");

        match self.send(self.client.post(&url).json(&body)).await {
            Ok(_) => {
                info!(
                    "Created index '{}' ({} dims, {})",
                    self.config.index, schema.dimension, schema.metric
                );
                Ok(())
            }
            Err(Error::AlreadyExists(_)) => {
                let existing = self.describe_index().await?;
                match existing.difference(schema) {
                    None => Ok(()),
                    Some(detail) => Err(Error::SchemaConflict {
                        index: self.config.index.clone(),
                        detail,
                    }),
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn is_ready(&self) -> Result<bool> {
        let model = self.describe().await?;
        Ok(model.status.map(|s| s.ready).unwrap_or(false) && model.host.is_some())
    }

    async fn list_namespaces(&self) -> Result<Vec<Namespace>> {
        let url = self.data_url("/describe_index_stats").await?;
        let response = self
            .send(self.client.post(&url).json(&serde_json::json!({})))
            .await?;
        let stats: IndexStats = response
            .json()
            .await
            .map_err(|e| Error::Store(format!("Failed to parse index stats: {}", e)))?;

        let mut namespaces: Vec<Namespace> = stats
            .namespaces
            .into_iter()
            .map(|(name, summary)| Namespace::new(name, summary.vector_count))
            .collect();
        if namespaces.is_empty() {
            namespaces.push(Namespace::new("", stats.total_vector_count));
        }
        namespaces.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(namespaces)
    }

    async fn list_ids(
        &self,
        namespace: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<IdPage> {
        let url = self.data_url("/vectors/list").await?;
        let limit = limit.clamp(1, MAX_LIST_LIMIT).to_string();
        let mut query = vec![("namespace", namespace), ("limit", limit.as_str())];
        if let Some(token) = cursor {
            query.push(("paginationToken", token));
        }

        // The data plane has no list route for pod-based indexes and answers 404.
        let response = match self.send(self.client.get(&url).query(&query)).await {
            Err(Error::IndexNotFound(_)) => {
                return Err(Error::Unsupported(format!(
                    "listing ids of index '{}' (pod-based indexes cannot be paginated)",
                    self.config.index
                )))
            }
            other => other?,
        };
        let list: ListResponse = response
            .json()
            .await
            .map_err(|e| Error::Store(format!("Failed to parse list response: {}", e)))?;

        Ok(IdPage {
            ids: list.vectors.into_iter().map(|v| v.id).collect(),
            next_cursor: list.pagination.and_then(|p| p.next),
        })
    }

    async fn fetch(&self, namespace: &str, ids: &[String]) -> Result<FetchOutcome> {
        if ids.is_empty() {
            return Ok(FetchOutcome::default());
        }
        let url = self.data_url("/vectors/fetch").await?;
        let mut query: Vec<(&str, &str)> = ids.iter().map(|id| ("ids", id.as_str())).collect();
        query.push(("namespace", namespace));

        let response = self.send(self.client.get(&url).query(&query)).await?;
        let mut fetched: FetchResponse = response
            .json()
            .await
            .map_err(|e| Error::Store(format!("Failed to parse fetch response: {}", e)))?;

        Ok(collect_fetched(namespace, ids, |id| {
            fetched.vectors.remove(id).map(|v| VectorRecord {
                id: v.id,
                values: v.values,
                sparse_values: v.sparse_values,
                metadata: v.metadata,
                namespace: String::new(),
            })
        }))
    }

    async fn upsert(&self, namespace: &str, records: &[VectorRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let url = self.data_url("/vectors/upsert").await?;
        let body = UpsertRequest {
            vectors: records.iter().map(UpsertVector::from).collect(),
            namespace,
        };
        self.send(self.client.post(&url).json(&body)).await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "pinecone_tests.rs"]
mod tests;
