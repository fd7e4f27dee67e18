//! Connection to the search engine.
//!
//! A [`Connection`] owns the transport and tracks whether the engine answered
//! its last health probe. Constructing one never blocks and never fails
//! because the engine is down: the first probe runs in the background and a
//! failure only logs a warning and marks the connection disconnected.
//! [`Connection::ready`] waits for that first result; the embedding
//! application decides whether to call [`Connection::probe`] again.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::SearchApi;
use crate::error::{QueryError, QueryResult};

#[cfg(feature = "elasticsearch")]
use crate::config::QueryConfig;

/// Result of the most recent health probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No probe has completed yet.
    Pending,
    /// The last probe succeeded.
    Connected {
        /// When the probe completed.
        checked_at: DateTime<Utc>,
    },
    /// The last probe failed.
    Disconnected {
        /// When the probe completed.
        checked_at: DateTime<Utc>,
        /// Why it failed.
        reason: String,
    },
}

impl ConnectionStatus {
    /// Returns true for [`ConnectionStatus::Connected`].
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected { .. })
    }
}

/// Handle to the search engine shared by every query component.
pub struct Connection {
    api: Arc<dyn SearchApi>,
    status: Arc<RwLock<ConnectionStatus>>,
    initial_probe: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("status", &*self.status.read())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Builds an Elasticsearch connection and starts a background probe.
    ///
    /// Fails only if the configuration cannot produce a client.
    #[cfg(feature = "elasticsearch")]
    pub fn connect(config: &QueryConfig) -> QueryResult<Self> {
        let api = crate::engine::ElasticsearchApi::new(config)?;
        debug!(host = %config.host, "Connecting to search engine");
        Ok(Self::with_api(Arc::new(api)))
    }

    /// Wraps an existing transport and starts a background probe.
    ///
    /// Outside a tokio runtime no probe is started and the status stays
    /// [`ConnectionStatus::Pending`] until [`Connection::probe`] is called.
    pub fn with_api(api: Arc<dyn SearchApi>) -> Self {
        let connection = Self {
            api,
            status: Arc::new(RwLock::new(ConnectionStatus::Pending)),
            initial_probe: Mutex::new(None),
        };
        connection.spawn_probe();
        connection
    }

    fn spawn_probe(&self) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let api = self.api.clone();
                let status = self.status.clone();
                let probe = handle.spawn(async move {
                    let _ = run_probe(api.as_ref(), &status).await;
                });
                *self.initial_probe.lock() = Some(probe);
            }
            Err(_) => debug!("No async runtime; initial health probe deferred"),
        }
    }

    /// Waits for the probe started at construction and returns the status.
    ///
    /// Never fails: an unreachable engine is reported as
    /// [`ConnectionStatus::Disconnected`]. Without a construction probe
    /// (no runtime at the time) this runs one now.
    pub async fn ready(&self) -> ConnectionStatus {
        let probe = self.initial_probe.lock().take();
        match probe {
            Some(probe) => {
                if let Err(e) = probe.await {
                    warn!(error = %e, "Initial health probe did not complete");
                }
            }
            None if matches!(*self.status.read(), ConnectionStatus::Pending) => {
                let _ = self.probe().await;
            }
            None => {}
        }
        self.status()
    }

    /// Probes the engine now and records the outcome.
    pub async fn probe(&self) -> QueryResult<()> {
        run_probe(self.api.as_ref(), &self.status).await
    }

    /// Returns true if the last probe succeeded.
    pub fn is_connected(&self) -> bool {
        self.status.read().is_connected()
    }

    /// Returns the outcome of the last probe.
    pub fn status(&self) -> ConnectionStatus {
        self.status.read().clone()
    }

    /// Returns the transport.
    pub fn api(&self) -> &dyn SearchApi {
        self.api.as_ref()
    }

    /// Returns a shared handle to the transport.
    pub fn shared_api(&self) -> Arc<dyn SearchApi> {
        self.api.clone()
    }
}

async fn run_probe(api: &dyn SearchApi, status: &RwLock<ConnectionStatus>) -> QueryResult<()> {
    match api.health().await {
        Ok(()) => {
            info!("Search engine connection established");
            *status.write() = ConnectionStatus::Connected {
                checked_at: Utc::now(),
            };
            Ok(())
        }
        Err(e) => {
            warn!(error = %e, "Search engine health probe failed");
            *status.write() = ConnectionStatus::Disconnected {
                checked_at: Utc::now(),
                reason: e.to_string(),
            };
            Err(QueryError::from_engine("health probe", e))
        }
    }
}
