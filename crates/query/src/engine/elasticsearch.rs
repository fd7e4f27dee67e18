//! Elasticsearch transport.

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use elasticsearch::auth::Credentials;
use elasticsearch::cert::CertificateValidation;
use elasticsearch::cluster::ClusterHealthParts;
use elasticsearch::http::response::Response;
use elasticsearch::http::transport::{SingleNodeConnectionPool, TransportBuilder};
use elasticsearch::indices::IndicesGetMappingParts;
use elasticsearch::{ClearScrollParts, CountParts, Elasticsearch, ScrollParts, SearchParts};
use serde_json::{Value, json};

use crate::config::{EngineAuth, QueryConfig};
use crate::error::{EngineError, QueryError, QueryResult};

use super::SearchApi;

/// [`SearchApi`] over the official Elasticsearch client.
#[derive(Clone)]
pub struct ElasticsearchApi {
    client: Elasticsearch,
    host: String,
}

impl Debug for ElasticsearchApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElasticsearchApi")
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

impl ElasticsearchApi {
    /// Builds a client from configuration. Does not contact the engine.
    pub fn new(config: &QueryConfig) -> QueryResult<Self> {
        let parsed_url: elasticsearch::http::Url =
            config.host.parse().map_err(|e| QueryError::InvalidConfig {
                message: format!("invalid engine URL '{}': {}", config.host, e),
            })?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);

        let mut builder = TransportBuilder::new(conn_pool)
            .timeout(Duration::from_millis(config.request_timeout_ms));

        if config.disable_certificate_validation {
            builder = builder.cert_validation(CertificateValidation::None);
        }

        if let Some(ref auth) = config.auth {
            builder = match auth {
                EngineAuth::Basic { username, password } => {
                    builder.auth(Credentials::Basic(username.clone(), password.clone()))
                }
                EngineAuth::Bearer { token } => builder.auth(Credentials::Bearer(token.clone())),
            };
        }

        let transport = builder.build().map_err(|e| QueryError::InvalidConfig {
            message: format!("failed to build transport: {}", e),
        })?;

        Ok(Self {
            client: Elasticsearch::new(transport),
            host: config.host.clone(),
        })
    }

    /// Returns the underlying client.
    pub fn client(&self) -> &Elasticsearch {
        &self.client
    }
}

/// Turns a sent request into a JSON body, mapping non-2xx answers to
/// [`EngineError::Status`].
async fn read_json(
    response: Result<Response, elasticsearch::Error>,
) -> Result<Value, EngineError> {
    let response = response.map_err(|e| EngineError::Transport(e.to_string()))?;

    let status = response.status_code();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(EngineError::Status {
            status: status.as_u16(),
            body,
        });
    }

    response
        .json::<Value>()
        .await
        .map_err(|e| EngineError::Decode(e.to_string()))
}

#[async_trait]
impl SearchApi for ElasticsearchApi {
    async fn health(&self) -> Result<(), EngineError> {
        let response = self
            .client
            .cluster()
            .health(ClusterHealthParts::None)
            .send()
            .await;
        let body = read_json(response).await?;

        let cluster_status = body
            .get("status")
            .and_then(|s| s.as_str())
            .unwrap_or("unknown");

        if cluster_status == "red" {
            return Err(EngineError::Status {
                status: 503,
                body: format!("cluster status is red: {}", body),
            });
        }

        Ok(())
    }

    async fn get_mapping(&self, index: &str, _doc_type: &str) -> Result<Value, EngineError> {
        // Typed clusters nest the type under `mappings`; the response is
        // handed back whole and the caller picks the type.
        let response = self
            .client
            .indices()
            .get_mapping(IndicesGetMappingParts::Index(&[index]))
            .send()
            .await;
        read_json(response).await
    }

    async fn search(
        &self,
        index: &str,
        body: Value,
        scroll: Option<&str>,
    ) -> Result<Value, EngineError> {
        let indices = [index];
        let mut request = self.client.search(SearchParts::Index(&indices)).body(body);
        if let Some(keep_alive) = scroll {
            request = request.scroll(keep_alive);
        }
        read_json(request.send().await).await
    }

    async fn count(&self, index: &str, body: Value) -> Result<Value, EngineError> {
        let response = self
            .client
            .count(CountParts::Index(&[index]))
            .body(body)
            .send()
            .await;
        read_json(response).await
    }

    async fn scroll(&self, scroll_id: &str, keep_alive: &str) -> Result<Value, EngineError> {
        let response = self
            .client
            .scroll(ScrollParts::None)
            .body(json!({
                "scroll": keep_alive,
                "scroll_id": scroll_id
            }))
            .send()
            .await;
        read_json(response).await
    }

    async fn clear_scroll(&self, scroll_id: &str) -> Result<(), EngineError> {
        let response = self
            .client
            .clear_scroll(ClearScrollParts::None)
            .body(json!({ "scroll_id": [scroll_id] }))
            .send()
            .await;

        match read_json(response).await {
            Ok(_) => Ok(()),
            // Already released or expired
            Err(EngineError::Status { status: 404, .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
