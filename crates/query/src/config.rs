//! Configuration for the query layer.
//!
//! [`QueryConfig`] names the engine endpoint and the full universe of
//! `(index, type)` pairs that may be queried. Anything outside that list is
//! rejected before a request is built.
//!
//! # Example
//!
//! ```
//! use quarry_query::config::{IndexDescriptor, QueryConfig};
//!
//! let config = QueryConfig {
//!     host: "http://search.internal:9200".to_string(),
//!     indices: vec![IndexDescriptor::new("orders", "order")],
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! assert_eq!(config.scroll_page_size, 1000);
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{QueryError, QueryResult};

/// One queryable index and the document type stored in it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexDescriptor {
    /// Index name.
    pub index: String,
    /// Document type within the index.
    #[serde(rename = "type")]
    pub doc_type: String,
}

impl IndexDescriptor {
    /// Creates a new descriptor.
    pub fn new(index: impl Into<String>, doc_type: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            doc_type: doc_type.into(),
        }
    }
}

impl std::fmt::Display for IndexDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.index, self.doc_type)
    }
}

/// Authentication for the search engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineAuth {
    /// Basic username/password authentication.
    Basic {
        /// The username for basic auth.
        username: String,
        /// The password for basic auth.
        password: String,
    },
    /// Bearer token authentication.
    Bearer {
        /// The bearer token.
        token: String,
    },
}

/// Configuration for the query layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Engine endpoint (default: `http://localhost:9200`).
    #[serde(default = "default_host")]
    pub host: String,

    /// Every `(index, type)` pair the system may query.
    #[serde(default)]
    pub indices: Vec<IndexDescriptor>,

    /// Optional authentication.
    #[serde(default)]
    pub auth: Option<EngineAuth>,

    /// Request timeout in milliseconds (default: 30000).
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Whether to disable certificate validation (default: false).
    /// Only use for development/testing.
    #[serde(default)]
    pub disable_certificate_validation: bool,

    /// Documents per scroll page (default: 1000).
    #[serde(default = "default_scroll_page_size")]
    pub scroll_page_size: u32,

    /// Scroll cursor keep-alive, e.g. `"1m"` or `"90s"` (default: `"1m"`).
    #[serde(default = "default_scroll_keep_alive")]
    pub scroll_keep_alive: String,

    /// Maximum number of concurrent mapping fetches during cache
    /// initialization. `None` starts one fetch per configured index.
    #[serde(default)]
    pub mapping_concurrency: Option<usize>,
}

fn default_host() -> String {
    "http://localhost:9200".to_string()
}

fn default_request_timeout_ms() -> u64 {
    30000
}

fn default_scroll_page_size() -> u32 {
    1000
}

fn default_scroll_keep_alive() -> String {
    "1m".to_string()
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            indices: Vec::new(),
            auth: None,
            request_timeout_ms: default_request_timeout_ms(),
            disable_certificate_validation: false,
            scroll_page_size: default_scroll_page_size(),
            scroll_keep_alive: default_scroll_keep_alive(),
            mapping_concurrency: None,
        }
    }
}

impl QueryConfig {
    /// Loads a configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> QueryResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| QueryError::InvalidConfig {
            message: format!("cannot read {}: {}", path.display(), e),
        })?;
        serde_json::from_str(&raw).map_err(|e| QueryError::InvalidConfig {
            message: format!("cannot parse {}: {}", path.display(), e),
        })
    }

    /// Returns the scroll keep-alive as a duration.
    pub fn keep_alive(&self) -> QueryResult<Duration> {
        parse_keep_alive(&self.scroll_keep_alive)
    }

    /// Validates the configuration and returns errors if any.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.host.trim().is_empty() {
            errors.push("Host cannot be empty".to_string());
        }

        if self.scroll_page_size == 0 {
            errors.push("Scroll page size cannot be 0".to_string());
        }

        if let Err(e) = self.keep_alive() {
            errors.push(e.to_string());
        }

        if self.mapping_concurrency == Some(0) {
            errors.push("Mapping concurrency cannot be 0".to_string());
        }

        let mut seen = HashSet::new();
        for descriptor in &self.indices {
            if descriptor.index.is_empty() || descriptor.doc_type.is_empty() {
                errors.push(format!(
                    "Index entries need both an index and a type (got '{}')",
                    descriptor
                ));
            }
            if !seen.insert(descriptor.index.as_str()) {
                errors.push(format!("Index '{}' is configured twice", descriptor.index));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Parses a keep-alive such as `"1m"` or `"500ms"`.
pub fn parse_keep_alive(value: &str) -> QueryResult<Duration> {
    let duration = humantime::parse_duration(value).map_err(|e| QueryError::InvalidConfig {
        message: format!("invalid scroll keep-alive '{}': {}", value, e),
    })?;
    if duration.is_zero() {
        return Err(QueryError::InvalidConfig {
            message: "scroll keep-alive cannot be zero".to_string(),
        });
    }
    Ok(duration)
}

/// Formats a duration as an engine time value (`"60000ms"`).
pub fn engine_time(duration: Duration) -> String {
    format!("{}ms", duration.as_millis())
}
