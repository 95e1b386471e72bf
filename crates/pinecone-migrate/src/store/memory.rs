//! In-process vector store.
//!
//! Backs dry runs and tests. It behaves like a small Pinecone index: keyset
//! pagination over sorted ids, whole-request rejection on a dimension
//! mismatch, and an optional per-request record limit standing in for the
//! payload size cap.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::{collect_fetched, VectorStore};
use crate::error::{Error, Result};
use crate::model::{FetchOutcome, IdPage, IndexSchema, Namespace, VectorRecord};

type Namespaces = BTreeMap<String, BTreeMap<String, VectorRecord>>;

/// Number of calls served, per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    /// `list_ids` calls.
    pub list: usize,
    /// `fetch` calls.
    pub fetch: usize,
    /// `upsert` calls.
    pub upsert: usize,
}

/// Vector index held in memory.
pub struct MemoryStore {
    name: String,
    schema: Mutex<Option<IndexSchema>>,
    data: Mutex<Namespaces>,
    page_size: usize,
    max_upsert_records: Option<usize>,
    list_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
    upsert_calls: AtomicUsize,
}

impl MemoryStore {
    /// Creates a store whose index does not exist yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: Mutex::new(None),
            data: Mutex::new(BTreeMap::new()),
            page_size: 100,
            max_upsert_records: None,
            list_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
            upsert_calls: AtomicUsize::new(0),
        }
    }

    /// Creates a store with an existing, empty index.
    pub fn with_schema(name: impl Into<String>, schema: IndexSchema) -> Self {
        let store = Self::new(name);
        store.seed_schema(schema);
        store
    }

    pub(crate) fn seed_schema(&self, schema: IndexSchema) {
        *self.schema.lock().unwrap_or_else(|e| e.into_inner()) = Some(schema);
    }

    /// Caps the number of ids returned per `list_ids` page.
    #[must_use]
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Rejects upserts with more than `limit` records as too large.
    #[must_use]
    pub fn max_upsert_records(mut self, limit: usize) -> Self {
        self.max_upsert_records = Some(limit.max(1));
        self
    }

    /// Seeds records into a namespace without counting as an upsert call.
    pub fn insert(&self, namespace: &str, records: impl IntoIterator<Item = VectorRecord>) {
        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        let ns = data.entry(namespace.to_string()).or_default();
        for mut record in records {
            record.namespace = namespace.to_string();
            ns.insert(record.id.clone(), record);
        }
    }

    /// Removes a record, simulating a concurrent delete on the source.
    pub fn remove(&self, namespace: &str, id: &str) -> bool {
        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        data.get_mut(namespace)
            .and_then(|ns| ns.remove(id))
            .is_some()
    }

    /// All records of a namespace, sorted by id.
    pub fn records(&self, namespace: &str) -> Vec<VectorRecord> {
        let data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        data.get(namespace)
            .map(|ns| ns.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Names of namespaces holding at least one record.
    pub fn namespace_names(&self) -> Vec<String> {
        let data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        data.iter()
            .filter(|(_, ns)| !ns.is_empty())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Total number of records across namespaces.
    pub fn total_records(&self) -> usize {
        let data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        data.values().map(BTreeMap::len).sum()
    }

    /// Calls served so far.
    pub fn calls(&self) -> CallCounts {
        CallCounts {
            list: self.list_calls.load(Ordering::SeqCst),
            fetch: self.fetch_calls.load(Ordering::SeqCst),
            upsert: self.upsert_calls.load(Ordering::SeqCst),
        }
    }

    fn schema(&self) -> Result<MutexGuard<'_, Option<IndexSchema>>> {
        self.schema
            .lock()
            .map_err(|_| Error::Store("memory store schema lock poisoned".to_string()))
    }

    fn data(&self) -> Result<MutexGuard<'_, Namespaces>> {
        self.data
            .lock()
            .map_err(|_| Error::Store("memory store data lock poisoned".to_string()))
    }

    fn existing_schema(&self) -> Result<IndexSchema> {
        self.schema()?
            .clone()
            .ok_or_else(|| Error::IndexNotFound(self.name.clone()))
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    fn store_type(&self) -> &'static str {
        "memory"
    }

    fn index_name(&self) -> &str {
        &self.name
    }

    async fn describe_index(&self) -> Result<IndexSchema> {
        self.existing_schema()
    }

    async fn create_index(&self, schema: &IndexSchema) -> Result<()> {
        let mut current = self.schema()?;
        match current.as_ref() {
            Some(existing) => match existing.difference(schema) {
                None => Ok(()),
                Some(detail) => Err(Error::SchemaConflict {
                    index: self.name.clone(),
                    detail,
                }),
            },
            None => {
                *current = Some(schema.clone());
                Ok(())
            }
        }
    }

    async fn list_namespaces(&self) -> Result<Vec<Namespace>> {
        self.existing_schema()?;
        let data = self.data()?;
        let namespaces: Vec<Namespace> = data
            .iter()
            .filter(|(_, ns)| !ns.is_empty())
            .map(|(name, ns)| Namespace::new(name.clone(), ns.len() as u64))
            .collect();
        if namespaces.is_empty() {
            return Ok(vec![Namespace::default_namespace()]);
        }
        Ok(namespaces)
    }

    async fn list_ids(
        &self,
        namespace: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<IdPage> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.existing_schema()?;
        let limit = limit.clamp(1, self.page_size);
        let data = self.data()?;
        let Some(ns) = data.get(namespace) else {
            return Ok(IdPage::default());
        };

        let lower = match cursor {
            Some(c) => Bound::Excluded(c.to_string()),
            None => Bound::Unbounded,
        };
        let mut range = ns.range((lower, Bound::Unbounded));
        let ids: Vec<String> = range.by_ref().take(limit).map(|(id, _)| id.clone()).collect();
        let next_cursor = match (range.next(), ids.last()) {
            (Some(_), Some(last)) => Some(last.clone()),
            _ => None,
        };
        Ok(IdPage { ids, next_cursor })
    }

    async fn fetch(&self, namespace: &str, ids: &[String]) -> Result<FetchOutcome> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.existing_schema()?;
        let data = self.data()?;
        let ns = data.get(namespace);
        Ok(collect_fetched(namespace, ids, |id| {
            ns.and_then(|records| records.get(id)).cloned()
        }))
    }

    async fn upsert(&self, namespace: &str, records: &[VectorRecord]) -> Result<()> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        let schema = self.existing_schema()?;

        if let Some(limit) = self.max_upsert_records {
            if records.len() > limit {
                return Err(Error::PayloadTooLarge(format!(
                    "{} records exceed the limit of {}",
                    records.len(),
                    limit
                )));
            }
        }
        if let Some(bad) = records
            .iter()
            .find(|r| r.values.len() != schema.dimension as usize)
        {
            return Err(Error::Validation(format!(
                "vector '{}' has dimension {}, index expects {}",
                bad.id,
                bad.values.len(),
                schema.dimension
            )));
        }

        let mut data = self.data()?;
        let ns = data.entry(namespace.to_string()).or_default();
        for record in records {
            let mut stored = record.clone();
            stored.namespace = namespace.to_string();
            ns.insert(stored.id.clone(), stored);
        }
        Ok(())
    }
}
