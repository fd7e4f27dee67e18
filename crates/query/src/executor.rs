//! Single-page search and count execution.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::IndexDescriptor;
use crate::connection::Connection;
use crate::error::{QueryError, QueryResult};
use crate::types::QueryBody;

/// Executes one bounded search request per call.
///
/// The only validation performed here is dropping null-valued top-level keys
/// from the request body. Field names are not checked.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    connection: Arc<Connection>,
}

impl QueryExecutor {
    /// Creates an executor over `connection`.
    pub fn new(connection: Arc<Connection>) -> Self {
        Self { connection }
    }

    /// Runs a search and returns the engine response body.
    pub async fn query(&self, descriptor: &IndexDescriptor, raw_body: Value) -> QueryResult<Value> {
        let body = QueryBody::from_value(raw_body)?;
        self.search(descriptor, &body).await
    }

    /// Runs a search from an already typed body.
    pub async fn search(&self, descriptor: &IndexDescriptor, body: &QueryBody) -> QueryResult<Value> {
        let body = body.to_value()?;
        debug!(index = %descriptor.index, doc_type = %descriptor.doc_type, "Executing search");

        self.connection
            .api()
            .search(&descriptor.index, body, None)
            .await
            .map_err(|e| {
                warn!(index = %descriptor.index, error = %e, "Search request failed");
                QueryError::from_engine("search", e)
            })
    }

    /// Counts the documents matching `predicate`.
    pub async fn count(&self, descriptor: &IndexDescriptor, predicate: Value) -> QueryResult<u64> {
        let response = self
            .connection
            .api()
            .count(&descriptor.index, json!({ "query": predicate }))
            .await
            .map_err(|e| {
                warn!(index = %descriptor.index, error = %e, "Count request failed");
                QueryError::from_engine("count", e)
            })?;

        response
            .get("count")
            .and_then(|c| c.as_u64())
            .ok_or_else(|| QueryError::Decode {
                message: "count response has no count".to_string(),
            })
    }
}
