//! Search engine transports.
//!
//! [`SearchApi`] is the seam between the query layer and the remote engine.
//! Every method returns a `Result`; a failed request is never reported as an
//! empty response.
//!
//! | Transport | Feature | Description |
//! |-----------|---------|-------------|
//! | [`ElasticsearchApi`] | `elasticsearch` (default) | Elasticsearch REST client |

use async_trait::async_trait;
use serde_json::Value;

use crate::error::EngineError;

#[cfg(feature = "elasticsearch")]
mod elasticsearch;

#[cfg(feature = "elasticsearch")]
pub use self::elasticsearch::ElasticsearchApi;

/// The read operations the query layer needs from a search engine.
#[async_trait]
pub trait SearchApi: Send + Sync {
    /// Checks that the engine is reachable and able to serve reads.
    async fn health(&self) -> Result<(), EngineError>;

    /// Returns the raw mapping description of `index`.
    async fn get_mapping(&self, index: &str, doc_type: &str) -> Result<Value, EngineError>;

    /// Runs a search. When `scroll` is set, the engine opens a cursor that
    /// stays alive for that long and returns its id with the first page.
    async fn search(
        &self,
        index: &str,
        body: Value,
        scroll: Option<&str>,
    ) -> Result<Value, EngineError>;

    /// Counts the documents matching the query in `body`.
    async fn count(&self, index: &str, body: Value) -> Result<Value, EngineError>;

    /// Fetches the next page of an open cursor and refreshes its keep-alive.
    async fn scroll(&self, scroll_id: &str, keep_alive: &str) -> Result<Value, EngineError>;

    /// Releases a cursor. Releasing an unknown or expired cursor succeeds.
    async fn clear_scroll(&self, scroll_id: &str) -> Result<(), EngineError>;
}
