//! Engine-native search request bodies.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::QueryResult;

/// A search request body with every optional part typed.
///
/// Absent parts never serialize, so the engine never sees a key whose value
/// is `null`. Keys the layer does not model are carried in `extra` with
/// null-valued entries dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryBody {
    /// Query predicate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<Value>,

    /// Field projection.
    #[serde(rename = "_source", default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Value>,

    /// Sort specification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<Value>,

    /// Offset of the first hit. Kept as sent; the engine validates it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Value>,

    /// Page size. Kept as sent; the engine validates it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<Value>,

    /// Aggregation requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggs: Option<Value>,

    /// Whether to count all hits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_total_hits: Option<Value>,

    /// Other top-level keys, passed through unchanged.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl QueryBody {
    /// Creates an empty body.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a body from a caller-supplied JSON object, dropping every
    /// top-level key whose value is null. All other keys are preserved.
    pub fn from_value(raw: Value) -> QueryResult<Self> {
        let mut body: QueryBody = serde_json::from_value(raw)?;
        body.extra.retain(|_, value| !value.is_null());
        Ok(body)
    }

    /// Sets the query predicate.
    pub fn with_query(mut self, query: Value) -> Self {
        self.query = Some(query);
        self
    }

    /// Sets the field projection. An empty list leaves the projection unset.
    pub fn with_source_fields(mut self, fields: &[String]) -> Self {
        if !fields.is_empty() {
            self.source = Some(Value::from(fields.to_vec()));
        }
        self
    }

    /// Sets the sort specification.
    pub fn with_sort(mut self, sort: Value) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Sets the page size.
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(Value::from(size));
        self
    }

    /// Sets the offset.
    pub fn with_from(mut self, from: u64) -> Self {
        self.from = Some(Value::from(from));
        self
    }

    /// Sets the aggregation requests.
    pub fn with_aggs(mut self, aggs: Value) -> Self {
        self.aggs = Some(aggs);
        self
    }

    /// Serializes the body for the engine.
    pub fn to_value(&self) -> QueryResult<Value> {
        Ok(serde_json::to_value(self)?)
    }
}
