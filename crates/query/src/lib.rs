//! Quarry Query Layer
//!
//! This crate sits between an application and a document search engine. It
//! validates requests against cached field metadata, runs single-page
//! searches and counts, and exports arbitrarily large result sets through
//! server-side scroll cursors that are always released.
//!
//! # Features
//!
//! - **Mapping cache**: per-index field types loaded concurrently and
//!   installed atomically
//! - **Validated requests**: unknown indices, types and fields are rejected
//!   before any network call
//! - **Null-free bodies**: null-valued top-level keys never reach the engine
//! - **Scroll export**: buffered or streaming, with cursor release on
//!   completion, failure, cancellation and drop
//!
//! Available transport features:
//! - `elasticsearch` (default) - Elasticsearch REST client
//!
//! # Architecture
//!
//! - [`config`] - Engine address, configured indices and scroll settings
//! - [`connection`] - Transport handle and health status
//! - [`engine`] - The [`SearchApi`] seam and its transports
//! - [`mapping`] - Field metadata cache
//! - [`executor`] - Single-page searches and counts
//! - [`scroll`] - Cursor-based export state machine
//! - [`facade`] - The [`QueryService`] surface
//! - [`types`] - Bodies, batches and field maps
//! - [`error`] - Error types for all operations
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use quarry_query::{Connection, IndexDescriptor, QueryConfig, QueryService, ScrollRequest};
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), quarry_query::QueryError> {
//! let config = QueryConfig {
//!     host: "http://localhost:9200".to_string(),
//!     indices: vec![IndexDescriptor::new("orders", "order")],
//!     ..Default::default()
//! };
//!
//! let connection = Arc::new(Connection::connect(&config)?);
//! let service = QueryService::new(connection, &config)?;
//! service.initialize().await;
//!
//! let open = service
//!     .get_count("orders", "order", Some(&json!({ "term": { "status": "open" } })))
//!     .await?;
//!
//! let rows = service
//!     .download_data(
//!         "orders",
//!         "order",
//!         ScrollRequest::new().with_fields(["id", "total"]),
//!     )
//!     .await?;
//! assert!(rows.len() as u64 >= open);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod executor;
pub mod facade;
pub mod mapping;
pub mod scroll;
pub mod types;

// Re-export commonly used types at crate root
pub use config::{EngineAuth, IndexDescriptor, QueryConfig};
pub use connection::{Connection, ConnectionStatus};
pub use engine::SearchApi;
pub use error::{EngineError, QueryError, QueryResult};
pub use executor::QueryExecutor;
pub use facade::{
    AggregationEngine, AggregationKind, DataPage, DataRequest, FilterBuilder, PassthroughFilter,
    QueryService, TermsAndStats,
};
pub use mapping::{MappingCache, MappingFailure, MappingReport};
pub use scroll::{ScrollExporter, ScrollPhase, ScrollRequest, ScrollStream};
pub use types::{FieldType, FieldTypeMap, IndexFields, QueryBody, ResultBatch};

#[cfg(feature = "elasticsearch")]
pub use engine::ElasticsearchApi;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
