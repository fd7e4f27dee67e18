//! Error types for the query layer.
//!
//! Two levels are defined here: [`EngineError`] is what a [`SearchApi`]
//! transport reports, and [`QueryError`] is what callers of the query layer
//! see. Conversion between them happens at the call site so the operation
//! name ends up in the error and in the log line.
//!
//! [`SearchApi`]: crate::engine::SearchApi

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use thiserror::Error;

/// The error type for all query, count, mapping and export operations.
#[derive(Error, Debug)]
pub enum QueryError {
    /// The caller asked for something the configuration or mapping rejects.
    #[error("bad request: {message}")]
    BadRequest { message: String },

    /// The engine could not be reached.
    #[error("search engine unavailable during {operation}: {message}")]
    UpstreamUnavailable { operation: String, message: String },

    /// The engine answered with a non-success status.
    #[error("search engine rejected {operation} (status {status}): {message}")]
    Engine {
        operation: String,
        status: u16,
        message: String,
    },

    /// A scroll continuation referenced a cursor the engine no longer knows.
    #[error("scroll cursor expired or not found: {cursor}")]
    CursorExpired { cursor: String },

    /// Field metadata for the index is not in the cache.
    #[error("field mapping unavailable for index '{index}'")]
    MappingUnavailable { index: String },

    /// The operation was cancelled by the caller.
    #[error("operation cancelled")]
    Cancelled,

    /// The engine response did not have the expected shape.
    #[error("failed to decode search engine response: {message}")]
    Decode { message: String },

    /// The configuration is unusable.
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl QueryError {
    /// Creates a [`QueryError::BadRequest`].
    pub fn bad_request(message: impl Into<String>) -> Self {
        QueryError::BadRequest {
            message: message.into(),
        }
    }

    /// Returns the HTTP-like status code for this error.
    ///
    /// Caller errors map to 400; everything originating at the engine or the
    /// transport uses a 5xx code so that it can never be mistaken for an
    /// empty result.
    pub fn status_code(&self) -> u16 {
        match self {
            QueryError::BadRequest { .. } => 400,
            QueryError::CursorExpired { .. } => 410,
            QueryError::Cancelled => 499,
            QueryError::Engine { .. } => 502,
            QueryError::UpstreamUnavailable { .. } | QueryError::MappingUnavailable { .. } => 503,
            QueryError::Decode { .. } | QueryError::InvalidConfig { .. } => 500,
        }
    }

    /// Returns true if the error was caused by the caller's input.
    pub fn is_bad_request(&self) -> bool {
        matches!(self, QueryError::BadRequest { .. })
    }

    /// Converts a transport-level error into a query error for `operation`.
    pub fn from_engine(operation: &str, err: EngineError) -> Self {
        match err {
            EngineError::Transport(message) => QueryError::UpstreamUnavailable {
                operation: operation.to_string(),
                message,
            },
            EngineError::Status { status, body } => QueryError::Engine {
                operation: operation.to_string(),
                status,
                message: body,
            },
            EngineError::Decode(message) => QueryError::Decode { message },
        }
    }
}

/// Errors reported by a [`SearchApi`](crate::engine::SearchApi) implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// No response was received (connection refused, timeout, TLS, ...).
    #[error("transport error: {0}")]
    Transport(String),

    /// The engine answered with a non-success status code.
    #[error("status {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

impl EngineError {
    /// Returns true if the engine reported that a scroll context is gone.
    ///
    /// Elasticsearch answers an unknown or expired scroll id with a 404 whose
    /// body names `search_context_missing_exception`.
    pub fn is_missing_search_context(&self) -> bool {
        match self {
            EngineError::Status { status, body } => {
                *status == 404 || body.contains("search_context_missing_exception")
            }
            _ => false,
        }
    }
}

/// Result type alias for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

impl From<serde_json::Error> for QueryError {
    fn from(err: serde_json::Error) -> Self {
        QueryError::Decode {
            message: err.to_string(),
        }
    }
}
