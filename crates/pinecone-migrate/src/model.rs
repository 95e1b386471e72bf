//! Core data types moved between stores.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Metadata attached to a vector: a JSON object of scalars and lists.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Distance metric of an index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Cosine similarity (default).
    #[default]
    Cosine,
    /// Euclidean distance.
    Euclidean,
    /// Dot product.
    #[serde(rename = "dotproduct", alias = "dot_product", alias = "dot")]
    DotProduct,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cosine => f.write_str("cosine"),
            Self::Euclidean => f.write_str("euclidean"),
            Self::DotProduct => f.write_str("dotproduct"),
        }
    }
}

/// Capacity configuration of an index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexSpec {
    /// Serverless index in a cloud region.
    Serverless {
        /// Cloud provider (e.g. "aws").
        cloud: String,
        /// Region (e.g. "us-east-1").
        region: String,
    },
    /// Pod-based index.
    Pod {
        /// Pod environment (e.g. "us-east1-gcp").
        environment: String,
        /// Pod type (e.g. "p1.x1").
        pod_type: String,
        /// Number of pods.
        #[serde(default = "one")]
        pods: u32,
        /// Number of replicas.
        #[serde(default = "one")]
        replicas: u32,
        /// Number of shards.
        #[serde(default = "one")]
        shards: u32,
    },
}

fn one() -> u32 {
    1
}

impl Default for IndexSpec {
    fn default() -> Self {
        Self::Serverless {
            cloud: "aws".to_string(),
            region: "us-east-1".to_string(),
        }
    }
}

/// Shape of an index.
///
/// Two indexes are transfer-compatible when dimension and metric are equal;
/// the capacity spec is informational.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSchema {
    /// Vector dimension.
    pub dimension: u32,
    /// Distance metric.
    #[serde(default)]
    pub metric: Metric,
    /// Capacity configuration.
    #[serde(default)]
    pub spec: IndexSpec,
}

impl IndexSchema {
    /// Creates a serverless schema with default placement.
    #[must_use]
    pub fn new(dimension: u32, metric: Metric) -> Self {
        Self {
            dimension,
            metric,
            spec: IndexSpec::default(),
        }
    }

    /// Returns true if vectors can be copied between the two indexes as-is.
    #[must_use]
    pub fn is_compatible_with(&self, other: &Self) -> bool {
        self.dimension == other.dimension && self.metric == other.metric
    }

    /// Describes how `other` differs from `self`, if it does.
    #[must_use]
    pub fn difference(&self, other: &Self) -> Option<String> {
        let mut parts = Vec::new();
        if self.dimension != other.dimension {
            parts.push(format!(
                "dimension {} != {}",
                self.dimension, other.dimension
            ));
        }
        if self.metric != other.metric {
            parts.push(format!("metric {} != {}", self.metric, other.metric));
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        }
    }
}

/// A partition of an index. The empty name is the default namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    /// Namespace name.
    pub name: String,
    /// Approximate number of vectors; for progress only.
    #[serde(default)]
    pub approximate_vector_count: u64,
}

impl Namespace {
    /// Creates a namespace entry.
    pub fn new(name: impl Into<String>, approximate_vector_count: u64) -> Self {
        Self {
            name: name.into(),
            approximate_vector_count,
        }
    }

    /// The default (unnamed) namespace.
    #[must_use]
    pub fn default_namespace() -> Self {
        Self::new("", 0)
    }

    /// Name suitable for logs and reports.
    #[must_use]
    pub fn label(&self) -> &str {
        namespace_label(&self.name)
    }
}

/// Human-readable label for a namespace name.
#[must_use]
pub fn namespace_label(name: &str) -> &str {
    if name.is_empty() {
        "(default)"
    } else {
        name
    }
}

/// Sparse component of a hybrid vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseValues {
    /// Non-zero positions.
    pub indices: Vec<u32>,
    /// Values at those positions.
    pub values: Vec<f32>,
}

/// One vector with its payload, as read from the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Identifier, unique within the namespace.
    pub id: String,
    /// Dense values.
    #[serde(default)]
    pub values: Vec<f32>,
    /// Sparse values, if any.
    #[serde(default, rename = "sparseValues", skip_serializing_if = "Option::is_none")]
    pub sparse_values: Option<SparseValues>,
    /// Metadata, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    /// Namespace the record lives in.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
}

impl VectorRecord {
    /// Creates a dense record without metadata.
    pub fn new(id: impl Into<String>, values: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            values,
            sparse_values: None,
            metadata: None,
            namespace: String::new(),
        }
    }

    /// Sets the metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Sets the namespace.
    #[must_use]
    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }
}

/// One page of ids from cursor pagination.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdPage {
    /// Ids on this page, in backend order.
    pub ids: Vec<String>,
    /// Cursor for the next page; `None` on the last page.
    pub next_cursor: Option<String>,
}

impl IdPage {
    /// True for an empty page that ends the sequence.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.ids.is_empty() && self.next_cursor.is_none()
    }
}

/// Result of a fetch.
///
/// A non-empty `missing_ids` means the source changed underneath us; those
/// ids are skipped, not failed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchOutcome {
    /// Records found, in request order.
    pub records: Vec<VectorRecord>,
    /// Requested ids that no longer exist.
    pub missing_ids: Vec<String>,
}

impl FetchOutcome {
    /// True when some requested ids were not found.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        !self.missing_ids.is_empty()
    }
}
