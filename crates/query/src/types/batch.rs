//! Pages of search hits and scroll cursors.

use std::time::Duration;

use serde_json::Value;

use crate::config::engine_time;
use crate::error::{QueryError, QueryResult};

/// A server-side scroll cursor and its keep-alive.
///
/// The id is opaque. It is refreshed (and may rotate) on every continuation
/// and must not be used again once released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrollCursor {
    id: String,
    keep_alive: Duration,
}

impl ScrollCursor {
    /// Creates a cursor handle.
    pub fn new(id: impl Into<String>, keep_alive: Duration) -> Self {
        Self {
            id: id.into(),
            keep_alive,
        }
    }

    /// The opaque cursor id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Time the engine keeps the cursor alive between requests.
    pub fn keep_alive(&self) -> Duration {
        self.keep_alive
    }

    /// The keep-alive in engine time syntax.
    pub fn keep_alive_param(&self) -> String {
        engine_time(self.keep_alive)
    }
}

/// One page of documents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultBatch {
    /// Documents in the order the engine returned them.
    pub documents: Vec<Value>,
    /// Cursor id returned with this page, if the request was a scroll.
    pub scroll_id: Option<String>,
    /// Total matching documents, when the engine reports it.
    pub total: Option<u64>,
}

impl ResultBatch {
    /// Parses a search or scroll response.
    ///
    /// Each hit contributes its `_source`; hits without a source (e.g. a
    /// projection of zero fields) contribute the hit object itself.
    pub fn from_response(response: &Value) -> QueryResult<Self> {
        let hits = response
            .get("hits")
            .and_then(|h| h.get("hits"))
            .and_then(|h| h.as_array())
            .ok_or_else(|| QueryError::Decode {
                message: "search response has no hits array".to_string(),
            })?;

        let documents = hits
            .iter()
            .map(|hit| hit.get("_source").cloned().unwrap_or_else(|| hit.clone()))
            .collect();

        let scroll_id = response
            .get("_scroll_id")
            .and_then(|s| s.as_str())
            .map(str::to_string);

        Ok(Self {
            documents,
            scroll_id,
            total: total_hits(response),
        })
    }

    /// Number of documents in the page.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Returns true if the page is empty, which ends a scroll.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Reads `hits.total` in either the object (`{"value": n}`) or the legacy
/// numeric form.
pub fn total_hits(response: &Value) -> Option<u64> {
    let total = response.get("hits")?.get("total")?;
    total
        .get("value")
        .and_then(|v| v.as_u64())
        .or_else(|| total.as_u64())
}
