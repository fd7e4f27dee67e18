//! Command line and configuration for the `quarry` binary.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `QUARRY_CONFIG` | - | JSON configuration file |
//! | `QUARRY_HOST` | http://localhost:9200 | Engine endpoint |
//! | `QUARRY_INDICES` | - | Comma-separated `index:type` pairs |
//! | `QUARRY_LOG_LEVEL` | info | Log level |
//!
//! Flags and environment variables override the configuration file.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use quarry_query::{IndexDescriptor, QueryConfig, ScrollRequest};
use serde_json::Value;

/// Query, count and export documents from a search engine.
#[derive(Debug, Clone, Parser)]
#[command(name = "quarry", version)]
#[command(about = "Query, count and export documents from a search engine")]
pub struct Cli {
    /// JSON configuration file.
    #[arg(short, long, env = "QUARRY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Engine endpoint.
    #[arg(long, env = "QUARRY_HOST")]
    pub host: Option<String>,

    /// Queryable indices as `index:type` pairs (comma-separated).
    #[arg(long, env = "QUARRY_INDICES", value_delimiter = ',')]
    pub indices: Vec<String>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, env = "QUARRY_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

/// What to run once the mapping cache is loaded.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// List the fields of one or every configured index.
    Fields {
        /// Restrict the listing to this index.
        #[arg(long)]
        index: Option<String>,
    },

    /// Count the documents matching a filter.
    Count {
        /// Index to query.
        #[arg(long)]
        index: String,

        /// Document type stored in the index.
        #[arg(long = "type")]
        doc_type: String,

        /// Query predicate as JSON.
        #[arg(long)]
        filter: Option<String>,
    },

    /// Write every matching document to stdout as NDJSON.
    Export {
        /// Index to export.
        #[arg(long)]
        index: String,

        /// Document type stored in the index.
        #[arg(long = "type")]
        doc_type: String,

        /// Fields to include (comma-separated); all fields when omitted.
        #[arg(long, value_delimiter = ',')]
        fields: Vec<String>,

        /// Sort specification as JSON.
        #[arg(long)]
        sort: Option<String>,

        /// Query predicate as JSON.
        #[arg(long)]
        filter: Option<String>,
    },
}

impl Cli {
    /// Builds the query configuration from the file (if any) and overrides.
    pub fn query_config(&self) -> anyhow::Result<QueryConfig> {
        let mut config = match &self.config {
            Some(path) => QueryConfig::from_file(path)
                .with_context(|| format!("failed to load {}", path.display()))?,
            None => QueryConfig::default(),
        };

        if let Some(host) = &self.host {
            config.host = host.clone();
        }

        if !self.indices.is_empty() {
            config.indices = self
                .indices
                .iter()
                .map(|pair| parse_index(pair))
                .collect::<anyhow::Result<_>>()?;
        }

        Ok(config)
    }
}

impl Command {
    /// Builds the export request for [`Command::Export`].
    pub fn export_request(
        fields: &[String],
        sort: Option<&str>,
        filter: Option<&str>,
    ) -> anyhow::Result<ScrollRequest> {
        let mut request = ScrollRequest::new().with_fields(fields.iter().cloned());
        if let Some(sort) = parse_json_arg("sort", sort)? {
            request = request.with_sort(sort);
        }
        if let Some(filter) = parse_json_arg("filter", filter)? {
            request = request.with_filter(filter);
        }
        Ok(request)
    }
}

/// Parses an `index:type` pair.
fn parse_index(pair: &str) -> anyhow::Result<IndexDescriptor> {
    match pair.trim().split_once(':') {
        Some((index, doc_type)) if !index.is_empty() && !doc_type.is_empty() => {
            Ok(IndexDescriptor::new(index, doc_type))
        }
        _ => anyhow::bail!("invalid index '{}', expected index:type", pair),
    }
}

/// Parses an optional JSON flag value.
pub fn parse_json_arg(name: &str, raw: Option<&str>) -> anyhow::Result<Option<Value>> {
    raw.map(|raw| {
        serde_json::from_str(raw).with_context(|| format!("--{} is not valid JSON", name))
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_index() {
        let descriptor = parse_index("orders:order").unwrap();
        assert_eq!(descriptor.index, "orders");
        assert_eq!(descriptor.doc_type, "order");

        assert!(parse_index("orders").is_err());
        assert!(parse_index(":order").is_err());
        assert!(parse_index("orders:").is_err());
    }

    #[test]
    fn test_overrides_apply() {
        let cli = Cli::parse_from([
            "quarry",
            "--host",
            "http://es:9200",
            "--indices",
            "orders:order,customers:customer",
            "fields",
        ]);
        let config = cli.query_config().unwrap();

        assert_eq!(config.host, "http://es:9200");
        assert_eq!(config.indices.len(), 2);
        assert_eq!(config.indices[1].index, "customers");
    }

    #[test]
    fn test_export_arguments() {
        let cli = Cli::parse_from([
            "quarry",
            "export",
            "--index",
            "orders",
            "--type",
            "order",
            "--fields",
            "id,total",
            "--filter",
            r#"{"term":{"status":"open"}}"#,
        ]);

        let Command::Export {
            fields,
            sort,
            filter,
            ..
        } = cli.command
        else {
            panic!("expected export");
        };

        let request =
            Command::export_request(&fields, sort.as_deref(), filter.as_deref()).unwrap();
        assert_eq!(request.fields, vec!["id".to_string(), "total".to_string()]);
        assert_eq!(request.filter, Some(json!({ "term": { "status": "open" } })));
        assert!(request.sort.is_none());
    }

    #[test]
    fn test_invalid_json_flag() {
        let err = parse_json_arg("filter", Some("{not json")).unwrap_err();
        assert!(err.to_string().contains("--filter"));
        assert!(parse_json_arg("filter", None).unwrap().is_none());
    }
}
