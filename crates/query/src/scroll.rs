//! Cursor-based export of large result sets.
//!
//! A scroll opens a server-side cursor with the first page and then pulls
//! continuation pages with nothing but the cursor id until the engine
//! returns an empty page. The cursor pins resources on the engine, so it is
//! released on every way out of the loop:
//!
//! - normal completion (empty page)
//! - a failed or expired continuation
//! - cancellation through [`ScrollRequest::cancel`]
//! - dropping the [`ScrollStream`] early (release is spawned on the runtime)
//!
//! A failed first page has no cursor and releases nothing.
//!
//! ```text
//!   Init ──first page──▶ Fetching ──empty page──▶ Done ──release──▶ Cleaned
//!                          │  ▲                                       ▲
//!                          └──┘ continuation                          │
//!                          └──────────── error / cancel ──────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use futures::TryStreamExt;
//!
//! let stream = exporter.open("orders", "order", ScrollRequest::default())?;
//! let mut documents = Box::pin(stream.into_documents());
//! while let Some(doc) = documents.try_next().await? {
//!     println!("{}", doc);
//! }
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, TryStreamExt};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{QueryConfig, engine_time};
use crate::connection::Connection;
use crate::engine::SearchApi;
use crate::error::{QueryError, QueryResult};
use crate::mapping::MappingCache;
use crate::types::{QueryBody, ResultBatch, ScrollCursor};

/// What to export.
#[derive(Debug, Clone, Default)]
pub struct ScrollRequest {
    /// Engine-native query predicate; `None` matches every document.
    pub filter: Option<Value>,
    /// Fields to return; empty returns whole documents.
    pub fields: Vec<String>,
    /// Sort specification; `None` sorts by index order (`_doc`).
    pub sort: Option<Value>,
    /// Aborts the export between or during page requests.
    pub cancel: Option<CancellationToken>,
}

impl ScrollRequest {
    /// Creates a request that exports everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the query predicate.
    pub fn with_filter(mut self, filter: Value) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Sets the field projection.
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the sort specification.
    pub fn with_sort(mut self, sort: Value) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Sets the cancellation token.
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Runs scroll exports against configured indices.
#[derive(Debug, Clone)]
pub struct ScrollExporter {
    connection: Arc<Connection>,
    mappings: Arc<MappingCache>,
    page_size: u32,
    keep_alive: Duration,
}

impl ScrollExporter {
    /// Creates an exporter using the scroll settings in `config`.
    pub fn new(
        connection: Arc<Connection>,
        mappings: Arc<MappingCache>,
        config: &QueryConfig,
    ) -> QueryResult<Self> {
        Ok(Self::with_settings(
            connection,
            mappings,
            config.scroll_page_size,
            config.keep_alive()?,
        ))
    }

    /// Creates an exporter with explicit page size and keep-alive.
    pub fn with_settings(
        connection: Arc<Connection>,
        mappings: Arc<MappingCache>,
        page_size: u32,
        keep_alive: Duration,
    ) -> Self {
        Self {
            connection,
            mappings,
            page_size: page_size.max(1),
            keep_alive,
        }
    }

    /// Validates the request and prepares a stream. No request is sent until
    /// the first call to [`ScrollStream::next_batch`].
    ///
    /// Fails with [`QueryError::BadRequest`] when the index or type is
    /// missing or not configured, or when any requested field is not mapped
    /// in the index.
    pub fn open(&self, index: &str, doc_type: &str, request: ScrollRequest) -> QueryResult<ScrollStream> {
        let descriptor = self.mappings.resolve(index, doc_type)?;
        self.mappings.validate_fields(&descriptor.index, &request.fields)?;

        let body = QueryBody::new()
            .with_query(request.filter.unwrap_or_else(|| json!({ "match_all": {} })))
            .with_source_fields(&request.fields)
            .with_sort(request.sort.unwrap_or_else(|| json!(["_doc"])))
            .with_size(u64::from(self.page_size))
            .to_value()?;

        Ok(ScrollStream {
            api: self.connection.shared_api(),
            index: descriptor.index.clone(),
            keep_alive: self.keep_alive,
            cancel: request.cancel,
            state: ScrollState::Init { body },
            pages: 0,
            documents: 0,
        })
    }

    /// Exports every matching document, buffered in memory.
    ///
    /// Documents keep page order, and engine order within a page. Use
    /// [`ScrollExporter::open`] for exports that should not be buffered.
    pub async fn scroll_query(
        &self,
        index: &str,
        doc_type: &str,
        request: ScrollRequest,
    ) -> QueryResult<Vec<Value>> {
        let mut stream = self.open(index, doc_type, request)?;
        let mut documents = Vec::new();
        while let Some(batch) = stream.next_batch().await? {
            documents.extend(batch.documents);
        }
        Ok(documents)
    }
}

/// Observable position of a [`ScrollStream`] in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollPhase {
    /// No request sent yet.
    Init,
    /// A cursor is open and more pages may follow.
    Fetching,
    /// The last page was empty; the cursor is being released.
    Done,
    /// The cursor was released (or never opened). No more pages.
    Cleaned,
}

#[derive(Debug)]
enum ScrollState {
    Init { body: Value },
    Fetching { cursor: ScrollCursor },
    Done { cursor: ScrollCursor },
    Cleaned,
}

/// A forward-only, non-restartable sequence of result pages.
///
/// Exclusive access (`&mut self`) per page keeps a cursor from being driven
/// by two callers at once.
pub struct ScrollStream {
    api: Arc<dyn SearchApi>,
    index: String,
    keep_alive: Duration,
    cancel: Option<CancellationToken>,
    state: ScrollState,
    pages: usize,
    documents: usize,
}

impl std::fmt::Debug for ScrollStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScrollStream")
            .field("index", &self.index)
            .field("phase", &self.phase())
            .field("pages", &self.pages)
            .field("documents", &self.documents)
            .finish_non_exhaustive()
    }
}

impl ScrollStream {
    /// Current lifecycle phase.
    pub fn phase(&self) -> ScrollPhase {
        match self.state {
            ScrollState::Init { .. } => ScrollPhase::Init,
            ScrollState::Fetching { .. } => ScrollPhase::Fetching,
            ScrollState::Done { .. } => ScrollPhase::Done,
            ScrollState::Cleaned => ScrollPhase::Cleaned,
        }
    }

    /// Index being exported.
    pub fn index(&self) -> &str {
        &self.index
    }

    /// Non-empty pages returned so far.
    pub fn pages_fetched(&self) -> usize {
        self.pages
    }

    /// Documents returned so far.
    pub fn documents_fetched(&self) -> usize {
        self.documents
    }

    /// Fetches the next page.
    ///
    /// Returns `Ok(None)` once the export is complete; the cursor has been
    /// released by then. After an error the stream is finished and the
    /// cursor, if any, has been released.
    pub async fn next_batch(&mut self) -> QueryResult<Option<ResultBatch>> {
        match &self.state {
            ScrollState::Init { .. } => self.first_page().await,
            ScrollState::Fetching { cursor } => {
                let cursor = cursor.clone();
                self.next_page(cursor).await
            }
            ScrollState::Done { .. } => {
                self.release().await;
                Ok(None)
            }
            ScrollState::Cleaned => Ok(None),
        }
    }

    /// Releases the cursor without reading further pages.
    pub async fn close(mut self) {
        self.release().await;
    }

    /// Turns the stream into a stream of documents.
    ///
    /// The cursor is released when the stream ends, fails, or is dropped.
    pub fn into_documents(self) -> impl Stream<Item = QueryResult<Value>> + Send {
        futures::stream::try_unfold(self, |mut stream| async move {
            let batch = stream.next_batch().await?;
            Ok::<_, QueryError>(batch.map(|batch| {
                let documents = futures::stream::iter(
                    batch.documents.into_iter().map(Ok::<Value, QueryError>),
                );
                (documents, stream)
            }))
        })
        .try_flatten()
    }

    async fn first_page(&mut self) -> QueryResult<Option<ResultBatch>> {
        let body = match std::mem::replace(&mut self.state, ScrollState::Cleaned) {
            ScrollState::Init { body } => body,
            other => {
                self.state = other;
                return Ok(None);
            }
        };

        let keep_alive = engine_time(self.keep_alive);
        let outcome = until_cancelled(
            self.cancel.as_ref(),
            self.api.search(&self.index, body, Some(&keep_alive)),
        )
        .await;

        let response = match outcome {
            None => {
                debug!(index = %self.index, "Scroll cancelled before the first page");
                return Err(QueryError::Cancelled);
            }
            Some(Err(e)) => {
                warn!(index = %self.index, error = %e, "Scroll search failed");
                return Err(QueryError::from_engine("scroll search", e));
            }
            Some(Ok(response)) => response,
        };

        match response.get("_scroll_id").and_then(|s| s.as_str()) {
            Some(id) => {
                self.state = ScrollState::Fetching {
                    cursor: ScrollCursor::new(id, self.keep_alive),
                };
            }
            None => {
                return Err(QueryError::Decode {
                    message: "scroll search response has no _scroll_id".to_string(),
                });
            }
        }

        self.accept_response(&response).await
    }

    async fn next_page(&mut self, cursor: ScrollCursor) -> QueryResult<Option<ResultBatch>> {
        let keep_alive = cursor.keep_alive_param();
        let outcome = until_cancelled(
            self.cancel.as_ref(),
            self.api.scroll(cursor.id(), &keep_alive),
        )
        .await;

        let response = match outcome {
            None => {
                debug!(index = %self.index, "Scroll cancelled");
                self.release().await;
                return Err(QueryError::Cancelled);
            }
            Some(Err(e)) => {
                let err = if e.is_missing_search_context() {
                    warn!(index = %self.index, "Scroll cursor expired");
                    QueryError::CursorExpired {
                        cursor: cursor.id().to_string(),
                    }
                } else {
                    warn!(index = %self.index, error = %e, "Scroll continuation failed");
                    QueryError::from_engine("scroll", e)
                };
                self.release().await;
                return Err(err);
            }
            Some(Ok(response)) => response,
        };

        // The engine may hand back a different cursor id.
        if let Some(id) = response.get("_scroll_id").and_then(|s| s.as_str()) {
            if id != cursor.id() {
                debug!(index = %self.index, "Scroll cursor rotated");
                self.state = ScrollState::Fetching {
                    cursor: ScrollCursor::new(id, cursor.keep_alive()),
                };
            }
        }

        self.accept_response(&response).await
    }

    async fn accept_response(&mut self, response: &Value) -> QueryResult<Option<ResultBatch>> {
        let batch = match ResultBatch::from_response(response) {
            Ok(batch) => batch,
            Err(e) => {
                self.release().await;
                return Err(e);
            }
        };

        if batch.is_empty() {
            if let ScrollState::Fetching { cursor } =
                std::mem::replace(&mut self.state, ScrollState::Cleaned)
            {
                self.state = ScrollState::Done { cursor };
            }
            self.release().await;
            info!(
                index = %self.index,
                pages = self.pages,
                documents = self.documents,
                "Scroll export complete"
            );
            return Ok(None);
        }

        self.pages += 1;
        self.documents += batch.len();
        debug!(
            index = %self.index,
            page = self.pages,
            size = batch.len(),
            "Fetched scroll page"
        );
        Ok(Some(batch))
    }

    /// Releases the current cursor, if any, and finishes the stream.
    ///
    /// The cursor stays in the state until the release call returns so that
    /// a drop during the call still releases it.
    async fn release(&mut self) {
        let cursor = match &self.state {
            ScrollState::Fetching { cursor } | ScrollState::Done { cursor } => cursor.clone(),
            _ => {
                self.state = ScrollState::Cleaned;
                return;
            }
        };

        self.state = ScrollState::Done {
            cursor: cursor.clone(),
        };
        match self.api.clear_scroll(cursor.id()).await {
            Ok(()) => debug!(index = %self.index, "Released scroll cursor"),
            Err(e) => warn!(index = %self.index, error = %e, "Failed to release scroll cursor"),
        }
        self.state = ScrollState::Cleaned;
    }
}

impl Drop for ScrollStream {
    fn drop(&mut self) {
        let cursor = match std::mem::replace(&mut self.state, ScrollState::Cleaned) {
            ScrollState::Fetching { cursor } | ScrollState::Done { cursor } => cursor,
            _ => return,
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let api = self.api.clone();
                let index = std::mem::take(&mut self.index);
                handle.spawn(async move {
                    if let Err(e) = api.clear_scroll(cursor.id()).await {
                        warn!(index = %index, error = %e, "Failed to release dropped scroll cursor");
                    }
                });
            }
            Err(_) => warn!(
                index = %self.index,
                "Scroll stream dropped outside a runtime; cursor left to expire"
            ),
        }
    }
}

/// Runs `fut` unless `cancel` fires first. Returns `None` on cancellation.
async fn until_cancelled<F: Future>(
    cancel: Option<&CancellationToken>,
    fut: F,
) -> Option<F::Output> {
    match cancel {
        Some(token) => {
            tokio::select! {
                biased;
                _ = token.cancelled() => None,
                output = fut => Some(output),
            }
        }
        None => Some(fut.await),
    }
}
