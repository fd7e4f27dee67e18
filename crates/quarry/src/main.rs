//! Quarry
//!
//! Operator CLI over the query layer: list fields, count matches, and export
//! documents as NDJSON.

mod cli;

use std::io::Write;
use std::sync::Arc;

use clap::Parser;
use futures::TryStreamExt;
use quarry_query::{Connection, QueryConfig, QueryService, ScrollRequest};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::{Cli, Command, parse_json_arg};

/// Initializes logging to stderr so stdout carries only command output.
///
/// `RUST_LOG` overrides `level`.
fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("quarry={},quarry_query={}", level, level)));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Connects to Elasticsearch.
#[cfg(feature = "elasticsearch")]
fn connect(config: &QueryConfig) -> anyhow::Result<Connection> {
    Ok(Connection::connect(config)?)
}

/// Fallback when no transport feature is enabled.
#[cfg(not(feature = "elasticsearch"))]
fn connect(_config: &QueryConfig) -> anyhow::Result<Connection> {
    anyhow::bail!(
        "No search engine transport compiled in. \
         Build with: cargo build -p quarry --features elasticsearch"
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let config = cli.query_config()?;
    if let Err(errors) = config.validate() {
        for error in &errors {
            eprintln!("Configuration error: {}", error);
        }
        std::process::exit(1);
    }

    info!(
        host = %config.host,
        indices = config.indices.len(),
        "Starting quarry"
    );

    // Commands still run against an unreachable engine and report per call.
    let connection = Arc::new(connect(&config)?);
    if !connection.ready().await.is_connected() {
        warn!(host = %config.host, "Search engine unreachable; continuing");
    }

    let service = QueryService::new(connection, &config)?;
    let report = service.initialize().await;
    if !report.is_complete() {
        warn!(
            failed = report.failed.len(),
            "Some field mappings could not be loaded"
        );
    }

    match cli.command {
        Command::Fields { index } => {
            let fields = service.fields(index.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&fields)?);
        }
        Command::Count {
            index,
            doc_type,
            filter,
        } => {
            let filter = parse_json_arg("filter", filter.as_deref())?;
            let count = service
                .get_count(&index, &doc_type, filter.as_ref())
                .await?;
            println!("{}", count);
        }
        Command::Export {
            index,
            doc_type,
            fields,
            sort,
            filter,
        } => {
            let request = Command::export_request(&fields, sort.as_deref(), filter.as_deref())?;
            export(&service, &index, &doc_type, request).await?;
        }
    }

    Ok(())
}

/// Streams every matching document to stdout, one JSON object per line.
///
/// Ctrl-C stops the export; the cursor is released before exiting.
async fn export(
    service: &QueryService,
    index: &str,
    doc_type: &str,
    request: ScrollRequest,
) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let stream = service.download_stream(index, doc_type, request.with_cancel(cancel))?;
    let mut documents = Box::pin(stream.into_documents());

    let stdout = std::io::stdout();
    let mut out = std::io::BufWriter::new(stdout.lock());
    let mut written: u64 = 0;

    let result = async {
        while let Some(document) = documents.try_next().await? {
            serde_json::to_writer(&mut out, &document)?;
            out.write_all(b"\n")?;
            written += 1;
        }
        out.flush()?;
        Ok::<_, anyhow::Error>(())
    }
    .await;

    interrupt.abort();
    info!(index = %index, documents = written, "Export finished");
    result
}
