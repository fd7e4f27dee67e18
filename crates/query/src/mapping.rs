//! Per-index field metadata cache.
//!
//! [`MappingCache::initialize`] fetches the mapping of every configured index
//! concurrently and installs the complete result in one atomic swap. Readers
//! load the current snapshot without locking, so they observe either the
//! previous complete cache or the new complete cache, never a partially
//! built one.
//!
//! A failed fetch leaves that index without an entry. Lookups against it
//! report [`QueryError::MappingUnavailable`] rather than an empty field list.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::{self, JoinSet};
use tracing::{debug, info, warn};

use crate::config::{IndexDescriptor, QueryConfig};
use crate::connection::Connection;
use crate::engine::SearchApi;
use crate::error::{QueryError, QueryResult};
use crate::types::{FieldTypeMap, IndexFields};

#[derive(Debug, Default)]
struct MappingSnapshot {
    initialized: bool,
    maps: HashMap<String, Arc<FieldTypeMap>>,
}

/// A mapping fetch that did not produce a field map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingFailure {
    /// Index whose mapping could not be loaded.
    pub index: String,
    /// Error message.
    pub error: String,
}

/// Outcome of one [`MappingCache::initialize`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingReport {
    /// Indices now present in the cache.
    pub loaded: Vec<String>,
    /// Indices whose fetch failed.
    pub failed: Vec<MappingFailure>,
}

impl MappingReport {
    /// Returns true if every configured index loaded.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Field metadata for every configured index.
pub struct MappingCache {
    connection: Arc<Connection>,
    indices: Vec<IndexDescriptor>,
    concurrency: Option<usize>,
    snapshot: ArcSwap<MappingSnapshot>,
    refresh: Mutex<()>,
}

impl std::fmt::Debug for MappingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot.load();
        f.debug_struct("MappingCache")
            .field("indices", &self.indices)
            .field("initialized", &snapshot.initialized)
            .field("cached", &snapshot.maps.len())
            .finish_non_exhaustive()
    }
}

impl MappingCache {
    /// Creates an empty cache for the indices named in `config`.
    pub fn new(connection: Arc<Connection>, config: &QueryConfig) -> Self {
        Self {
            connection,
            indices: config.indices.clone(),
            concurrency: config.mapping_concurrency,
            snapshot: ArcSwap::from_pointee(MappingSnapshot::default()),
            refresh: Mutex::new(()),
        }
    }

    /// Fetches every configured mapping and replaces the cache.
    ///
    /// Fetches run concurrently (bounded by `mapping_concurrency` when set)
    /// and the call returns once all of them have finished. Concurrent calls
    /// are serialized.
    pub async fn initialize(&self) -> MappingReport {
        let _writer = self.refresh.lock().await;

        let limit = self.concurrency.map(|n| Arc::new(Semaphore::new(n.max(1))));
        let mut tasks: JoinSet<QueryResult<FieldTypeMap>> = JoinSet::new();
        let mut pending: HashMap<task::Id, IndexDescriptor> = HashMap::new();

        for descriptor in &self.indices {
            let api = self.connection.shared_api();
            let limit = limit.clone();
            let fetched = descriptor.clone();

            let handle = tasks.spawn(async move {
                let _permit = match limit {
                    Some(semaphore) => semaphore.acquire_owned().await.ok(),
                    None => None,
                };
                fetch_field_types(api.as_ref(), &fetched).await
            });
            pending.insert(handle.id(), descriptor.clone());
        }

        let mut maps = HashMap::new();
        let mut report = MappingReport::default();

        while let Some(joined) = tasks.join_next_with_id().await {
            let (id, outcome) = match joined {
                Ok((id, result)) => (id, Ok(result)),
                Err(e) => (e.id(), Err(e)),
            };
            let Some(descriptor) = pending.remove(&id) else {
                continue;
            };

            match outcome {
                Ok(Ok(map)) => {
                    debug!(
                        index = %descriptor.index,
                        fields = map.len(),
                        "Loaded field mapping"
                    );
                    report.loaded.push(descriptor.index.clone());
                    maps.insert(descriptor.index, Arc::new(map));
                }
                Ok(Err(e)) => {
                    warn!(
                        index = %descriptor.index,
                        doc_type = %descriptor.doc_type,
                        error = %e,
                        "Failed to load field mapping"
                    );
                    report.failed.push(MappingFailure {
                        index: descriptor.index,
                        error: e.to_string(),
                    });
                }
                Err(e) => {
                    warn!(
                        index = %descriptor.index,
                        error = %e,
                        "Mapping fetch task failed"
                    );
                    report.failed.push(MappingFailure {
                        index: descriptor.index,
                        error: format!("mapping fetch task failed: {}", e),
                    });
                }
            }
        }

        report.loaded.sort();
        report.failed.sort_by(|a, b| a.index.cmp(&b.index));

        self.snapshot.store(Arc::new(MappingSnapshot {
            initialized: true,
            maps,
        }));

        info!(
            loaded = report.loaded.len(),
            failed = report.failed.len(),
            "Field mapping cache installed"
        );

        report
    }

    /// Returns true once [`MappingCache::initialize`] has completed.
    pub fn is_initialized(&self) -> bool {
        self.snapshot.load().initialized
    }

    /// The configured indices.
    pub fn descriptors(&self) -> &[IndexDescriptor] {
        &self.indices
    }

    /// Returns the cached field types of `index`.
    pub fn field_types(&self, index: &str) -> Option<Arc<FieldTypeMap>> {
        self.snapshot.load().maps.get(index).cloned()
    }

    /// Checks an `(index, type)` pair against the configuration.
    pub fn resolve(&self, index: &str, doc_type: &str) -> QueryResult<&IndexDescriptor> {
        if index.is_empty() {
            return Err(QueryError::bad_request("index is required"));
        }
        if doc_type.is_empty() {
            return Err(QueryError::bad_request("type is required"));
        }

        let descriptor = self.descriptor(index)?;
        if descriptor.doc_type != doc_type {
            return Err(QueryError::bad_request(format!(
                "unknown type '{}' for index '{}'",
                doc_type, index
            )));
        }
        Ok(descriptor)
    }

    /// Returns the configured index that stores `doc_type`.
    pub fn index_by_type(&self, doc_type: &str) -> QueryResult<&str> {
        self.indices
            .iter()
            .find(|d| d.doc_type == doc_type)
            .map(|d| d.index.as_str())
            .ok_or_else(|| QueryError::bad_request(format!("unknown type '{}'", doc_type)))
    }

    /// Returns the field listing of one index.
    pub fn fields(&self, index: &str) -> QueryResult<IndexFields> {
        let descriptor = self.descriptor(index)?;
        let map = self.require_field_types(index)?;
        Ok(IndexFields {
            index: descriptor.index.clone(),
            doc_type: descriptor.doc_type.clone(),
            fields: map.names(),
        })
    }

    /// Returns one field listing per configured index that has a cached
    /// mapping.
    pub fn all_fields(&self) -> Vec<IndexFields> {
        let snapshot = self.snapshot.load();
        self.indices
            .iter()
            .filter_map(|descriptor| {
                snapshot.maps.get(&descriptor.index).map(|map| IndexFields {
                    index: descriptor.index.clone(),
                    doc_type: descriptor.doc_type.clone(),
                    fields: map.names(),
                })
            })
            .collect()
    }

    /// Returns the field types of a configured index, or
    /// [`QueryError::MappingUnavailable`] when they are not cached.
    pub fn require_field_types(&self, index: &str) -> QueryResult<Arc<FieldTypeMap>> {
        self.field_types(index)
            .ok_or_else(|| QueryError::MappingUnavailable {
                index: index.to_string(),
            })
    }

    /// Checks that every name in `fields` is mapped in `index`.
    ///
    /// All unknown names are reported together.
    pub fn validate_fields(&self, index: &str, fields: &[String]) -> QueryResult<()> {
        if fields.is_empty() {
            return Ok(());
        }

        let map = self.require_field_types(index)?;
        let unknown: Vec<&str> = fields
            .iter()
            .filter(|f| !map.contains(f))
            .map(String::as_str)
            .collect();

        if unknown.is_empty() {
            Ok(())
        } else {
            Err(QueryError::bad_request(format!(
                "unknown field(s) for index '{}': {}",
                index,
                unknown.join(", ")
            )))
        }
    }

    fn descriptor(&self, index: &str) -> QueryResult<&IndexDescriptor> {
        self.indices
            .iter()
            .find(|d| d.index == index)
            .ok_or_else(|| QueryError::bad_request(format!("unknown index '{}'", index)))
    }
}

async fn fetch_field_types(
    api: &dyn SearchApi,
    descriptor: &IndexDescriptor,
) -> QueryResult<FieldTypeMap> {
    let response = api
        .get_mapping(&descriptor.index, &descriptor.doc_type)
        .await
        .map_err(|e| QueryError::from_engine("get mapping", e))?;
    FieldTypeMap::from_mapping_response(&response, &descriptor.index, &descriptor.doc_type)
}
