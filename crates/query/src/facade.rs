//! Public query surface.
//!
//! [`QueryService`] composes the connection, mapping cache, executor and
//! exporter, and delegates predicate construction to a [`FilterBuilder`] and
//! aggregation math to an [`AggregationEngine`]. It holds no state of its
//! own beyond those handles.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use quarry_query::{Connection, QueryConfig, QueryService};
//!
//! let config = QueryConfig::from_file("quarry.json")?;
//! let connection = Arc::new(Connection::connect(&config)?);
//! let service = QueryService::new(connection, &config)?;
//! service.initialize().await;
//!
//! let open = service
//!     .get_count("orders", "order", Some(&json!({ "term": { "status": "open" } })))
//!     .await?;
//! ```

use std::sync::Arc;

use serde_json::{Value, json};

use crate::config::QueryConfig;
use crate::connection::Connection;
use crate::error::{QueryError, QueryResult};
use crate::executor::QueryExecutor;
use crate::mapping::{MappingCache, MappingReport};
use crate::scroll::{ScrollExporter, ScrollRequest, ScrollStream};
use crate::types::{IndexFields, QueryBody, ResultBatch};

/// Name under which aggregation requests are placed in the search body.
pub const AGGREGATION_NAME: &str = "summary";

/// Turns a caller-facing filter into an engine-native predicate.
pub trait FilterBuilder: Send + Sync {
    /// Builds the predicate. `None` means "no filter".
    fn build(&self, filter: Option<&Value>) -> QueryResult<Value>;
}

/// Kind of summary requested from an [`AggregationEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationKind {
    /// Summary statistics over a numeric or date field.
    Numeric,
    /// Value buckets over a categorical field.
    Text,
}

/// Builds aggregation requests and turns raw aggregation responses into
/// summaries.
pub trait AggregationEngine: Send + Sync {
    /// Returns the aggregation request for `field`.
    fn request(&self, kind: AggregationKind, field: &str) -> QueryResult<Value>;

    /// Summarizes the aggregation named [`AGGREGATION_NAME`] in
    /// `aggregations`.
    fn summarize(&self, kind: AggregationKind, field: &str, aggregations: &Value)
    -> QueryResult<Value>;
}

/// Treats filters as already engine-native.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughFilter;

impl FilterBuilder for PassthroughFilter {
    fn build(&self, filter: Option<&Value>) -> QueryResult<Value> {
        match filter {
            None | Some(Value::Null) => Ok(json!({ "match_all": {} })),
            Some(predicate @ Value::Object(_)) => Ok(predicate.clone()),
            Some(other) => Err(QueryError::bad_request(format!(
                "filter must be a query object, got {}",
                other
            ))),
        }
    }
}

/// `stats` for numeric summaries and `terms` for text summaries, returned
/// as the engine computed them.
#[derive(Debug, Clone, Copy)]
pub struct TermsAndStats {
    /// Number of buckets for text summaries.
    pub terms_size: u32,
}

impl Default for TermsAndStats {
    fn default() -> Self {
        Self { terms_size: 10 }
    }
}

impl AggregationEngine for TermsAndStats {
    fn request(&self, kind: AggregationKind, field: &str) -> QueryResult<Value> {
        if field.is_empty() {
            return Err(QueryError::bad_request("aggregation field is required"));
        }
        let aggregation = match kind {
            AggregationKind::Numeric => json!({ "stats": { "field": field } }),
            AggregationKind::Text => {
                json!({ "terms": { "field": field, "size": self.terms_size } })
            }
        };
        Ok(json!({ AGGREGATION_NAME: aggregation }))
    }

    fn summarize(
        &self,
        _kind: AggregationKind,
        field: &str,
        aggregations: &Value,
    ) -> QueryResult<Value> {
        aggregations
            .get(AGGREGATION_NAME)
            .cloned()
            .ok_or_else(|| QueryError::Decode {
                message: format!("aggregation response for '{}' is missing", field),
            })
    }
}

/// Arguments of a single-page data request.
#[derive(Debug, Clone, Default)]
pub struct DataRequest {
    /// Caller-facing filter, handed to the [`FilterBuilder`].
    pub filter: Option<Value>,
    /// Fields to return; empty returns whole documents.
    pub fields: Vec<String>,
    /// Sort specification.
    pub sort: Option<Value>,
    /// Offset of the first document.
    pub from: Option<u64>,
    /// Page size.
    pub size: Option<u64>,
}

/// One page of documents.
#[derive(Debug, Clone, PartialEq)]
pub struct DataPage {
    /// Documents in engine order.
    pub documents: Vec<Value>,
    /// Total matching documents, when reported.
    pub total: Option<u64>,
}

/// The query layer's public surface.
pub struct QueryService {
    connection: Arc<Connection>,
    mappings: Arc<MappingCache>,
    executor: QueryExecutor,
    exporter: ScrollExporter,
    filters: Arc<dyn FilterBuilder>,
    aggregations: Arc<dyn AggregationEngine>,
}

impl std::fmt::Debug for QueryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryService")
            .field("connection", &self.connection)
            .field("mappings", &self.mappings)
            .finish_non_exhaustive()
    }
}

impl QueryService {
    /// Creates a service with [`PassthroughFilter`] and [`TermsAndStats`].
    pub fn new(connection: Arc<Connection>, config: &QueryConfig) -> QueryResult<Self> {
        Self::with_collaborators(
            connection,
            config,
            Arc::new(PassthroughFilter),
            Arc::new(TermsAndStats::default()),
        )
    }

    /// Creates a service with the given filter builder and aggregation
    /// engine.
    pub fn with_collaborators(
        connection: Arc<Connection>,
        config: &QueryConfig,
        filters: Arc<dyn FilterBuilder>,
        aggregations: Arc<dyn AggregationEngine>,
    ) -> QueryResult<Self> {
        let mappings = Arc::new(MappingCache::new(connection.clone(), config));
        let executor = QueryExecutor::new(connection.clone());
        let exporter = ScrollExporter::new(connection.clone(), mappings.clone(), config)?;

        Ok(Self {
            connection,
            mappings,
            executor,
            exporter,
            filters,
            aggregations,
        })
    }

    /// Loads the field mapping cache. Must complete before field-validated
    /// operations are used.
    pub async fn initialize(&self) -> MappingReport {
        self.mappings.initialize().await
    }

    /// The connection handle.
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// The mapping cache.
    pub fn mappings(&self) -> &Arc<MappingCache> {
        &self.mappings
    }

    /// Returns true if the last engine health probe succeeded.
    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Field listings for one index, or for every cached index.
    pub fn fields(&self, index: Option<&str>) -> QueryResult<Vec<IndexFields>> {
        match index {
            Some(index) => Ok(vec![self.mappings.fields(index)?]),
            None => Ok(self.mappings.all_fields()),
        }
    }

    /// The configured index storing `doc_type`.
    pub fn index_by_type(&self, doc_type: &str) -> QueryResult<&str> {
        self.mappings.index_by_type(doc_type)
    }

    /// Counts documents matching `filter`.
    pub async fn get_count(
        &self,
        index: &str,
        doc_type: &str,
        filter: Option<&Value>,
    ) -> QueryResult<u64> {
        let descriptor = self.mappings.resolve(index, doc_type)?;
        let predicate = self.filters.build(filter)?;
        self.executor.count(descriptor, predicate).await
    }

    /// Returns one page of documents.
    pub async fn get_data(
        &self,
        index: &str,
        doc_type: &str,
        request: DataRequest,
    ) -> QueryResult<DataPage> {
        let descriptor = self.mappings.resolve(index, doc_type)?;
        let predicate = self.filters.build(request.filter.as_ref())?;

        let mut body = QueryBody::new()
            .with_query(predicate)
            .with_source_fields(&request.fields);
        body.sort = request.sort;
        body.from = request.from.map(Value::from);
        body.size = request.size.map(Value::from);

        let response = self.executor.search(descriptor, &body).await?;
        let batch = ResultBatch::from_response(&response)?;
        Ok(DataPage {
            documents: batch.documents,
            total: batch.total,
        })
    }

    /// Exports every matching document, buffered. `request.filter` is a
    /// caller-facing filter and goes through the [`FilterBuilder`].
    pub async fn download_data(
        &self,
        index: &str,
        doc_type: &str,
        request: ScrollRequest,
    ) -> QueryResult<Vec<Value>> {
        let request = self.shape_export(request)?;
        self.exporter.scroll_query(index, doc_type, request).await
    }

    /// Like [`QueryService::download_data`], but returns a lazy stream.
    pub fn download_stream(
        &self,
        index: &str,
        doc_type: &str,
        request: ScrollRequest,
    ) -> QueryResult<ScrollStream> {
        let request = self.shape_export(request)?;
        self.exporter.open(index, doc_type, request)
    }

    /// Summary statistics of a numeric field over the matching documents.
    pub async fn numeric_aggregation(
        &self,
        index: &str,
        doc_type: &str,
        field: &str,
        filter: Option<&Value>,
    ) -> QueryResult<Value> {
        self.aggregate(AggregationKind::Numeric, index, doc_type, field, filter)
            .await
    }

    /// Value buckets of a categorical field over the matching documents.
    pub async fn text_aggregation(
        &self,
        index: &str,
        doc_type: &str,
        field: &str,
        filter: Option<&Value>,
    ) -> QueryResult<Value> {
        self.aggregate(AggregationKind::Text, index, doc_type, field, filter)
            .await
    }

    async fn aggregate(
        &self,
        kind: AggregationKind,
        index: &str,
        doc_type: &str,
        field: &str,
        filter: Option<&Value>,
    ) -> QueryResult<Value> {
        let descriptor = self.mappings.resolve(index, doc_type)?;
        let predicate = self.filters.build(filter)?;
        let aggs = self.aggregations.request(kind, field)?;

        let body = QueryBody::new()
            .with_query(predicate)
            .with_size(0)
            .with_aggs(aggs);

        let response = self.executor.search(descriptor, &body).await?;
        let aggregations = response
            .get("aggregations")
            .ok_or_else(|| QueryError::Decode {
                message: "search response has no aggregations".to_string(),
            })?;
        self.aggregations.summarize(kind, field, aggregations)
    }

    fn shape_export(&self, mut request: ScrollRequest) -> QueryResult<ScrollRequest> {
        request.filter = Some(self.filters.build(request.filter.as_ref())?);
        Ok(request)
    }
}
