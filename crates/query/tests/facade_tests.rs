//! QueryService tests against the scripted engine.

mod common;

use std::sync::Arc;

use common::{MockEngine, docs, order_properties, test_config};
use futures::TryStreamExt;
use quarry_query::{
    AggregationEngine, AggregationKind, Connection, ConnectionStatus, DataRequest, FilterBuilder, QueryError,
    QueryResult, QueryService, ScrollRequest,
};
use serde_json::{Value, json};

async fn service(engine: &MockEngine) -> QueryService {
    let config = test_config(&[("orders", "order"), ("customers", "customer")]);
    let connection = Arc::new(Connection::with_api(Arc::new(engine.clone())));
    let service = QueryService::new(connection, &config).unwrap();
    service.initialize().await;
    service
}

fn engine() -> MockEngine {
    MockEngine::new()
        .with_mapping("orders", order_properties())
        .with_mapping("customers", json!({ "email": { "type": "keyword" } }))
}

/// Turns `{"field": value}` into a conjunction of term queries.
struct TermFilter;

impl FilterBuilder for TermFilter {
    fn build(&self, filter: Option<&Value>) -> QueryResult<Value> {
        let Some(Value::Object(terms)) = filter else {
            return Ok(json!({ "match_all": {} }));
        };
        let must: Vec<Value> = terms
            .iter()
            .map(|(field, value)| json!({ "term": { field: value } }))
            .collect();
        Ok(json!({ "bool": { "must": must } }))
    }
}

#[tokio::test]
async fn test_get_count() {
    let engine = engine();
    engine.set_count(7);
    let service = service(&engine).await;

    let count = service.get_count("orders", "order", None).await.unwrap();

    assert_eq!(count, 7);
    assert_eq!(engine.counts(), vec![json!({ "query": { "match_all": {} } })]);
}

#[tokio::test]
async fn test_get_count_rejects_unknown_type() {
    let engine = engine();
    let service = service(&engine).await;

    let err = service
        .get_count("orders", "customer", None)
        .await
        .unwrap_err();

    assert!(err.is_bad_request());
    assert_eq!(engine.count_calls(), 0);
}

#[tokio::test]
async fn test_get_data_shapes_request() {
    let engine = engine();
    engine.set_search_response(json!({
        "hits": {
            "total": { "value": 12, "relation": "eq" },
            "hits": [
                { "_source": { "id": "o-1" } },
                { "_source": { "id": "o-2" } }
            ]
        }
    }));
    let service = service(&engine).await;

    let page = service
        .get_data(
            "orders",
            "order",
            DataRequest {
                filter: Some(json!({ "term": { "status": "open" } })),
                fields: vec!["id".to_string()],
                sort: Some(json!([{ "placed_at": "desc" }])),
                from: Some(10),
                size: Some(2),
            },
        )
        .await
        .unwrap();

    assert_eq!(page.total, Some(12));
    assert_eq!(page.documents, vec![json!({ "id": "o-1" }), json!({ "id": "o-2" })]);
    assert_eq!(
        engine.searches()[0].body,
        json!({
            "query": { "term": { "status": "open" } },
            "_source": ["id"],
            "sort": [{ "placed_at": "desc" }],
            "from": 10,
            "size": 2,
        })
    );
}

#[tokio::test]
async fn test_get_data_omits_unset_parts() {
    let engine = engine();
    let service = service(&engine).await;

    service
        .get_data("orders", "order", DataRequest::default())
        .await
        .unwrap();

    assert_eq!(
        engine.searches()[0].body,
        json!({ "query": { "match_all": {} } })
    );
}

#[tokio::test]
async fn test_download_data_uses_filter_builder() {
    let engine = engine();
    engine.script_pages(vec![docs("a", 2), docs("b", 1)]);
    let config = test_config(&[("orders", "order")]);
    let connection = Arc::new(Connection::with_api(Arc::new(engine.clone())));
    let service = QueryService::with_collaborators(
        connection,
        &config,
        Arc::new(TermFilter),
        Arc::new(quarry_query::TermsAndStats::default()),
    )
    .unwrap();
    service.initialize().await;

    let rows = service
        .download_data(
            "orders",
            "order",
            ScrollRequest::new().with_filter(json!({ "status": "open" })),
        )
        .await
        .unwrap();

    assert_eq!(rows.len(), 3);
    assert_eq!(
        engine.searches()[0].body["query"],
        json!({ "bool": { "must": [{ "term": { "status": "open" } }] } })
    );
    assert_eq!(engine.cleared().len(), 1);
}

#[tokio::test]
async fn test_download_data_rejects_unknown_field() {
    let engine = engine();
    let service = service(&engine).await;

    let err = service
        .download_data(
            "orders",
            "order",
            ScrollRequest::new().with_fields(["email"]),
        )
        .await
        .unwrap_err();

    assert!(err.is_bad_request());
    assert_eq!(engine.data_calls(), 0);
}

#[tokio::test]
async fn test_download_stream() {
    let engine = engine();
    engine.script_pages(vec![docs("a", 2), docs("b", 2)]);
    let service = service(&engine).await;

    let stream = service
        .download_stream("orders", "order", ScrollRequest::new())
        .unwrap();
    let rows: Vec<Value> = stream.into_documents().try_collect().await.unwrap();

    assert_eq!(rows.len(), 4);
    assert_eq!(engine.cleared().len(), 1);
}

#[tokio::test]
async fn test_numeric_aggregation() {
    let engine = engine();
    engine.set_search_response(json!({
        "hits": { "hits": [] },
        "aggregations": {
            "summary": { "count": 3, "min": 1.0, "max": 5.0, "avg": 3.0, "sum": 9.0 }
        }
    }));
    let service = service(&engine).await;

    let summary = service
        .numeric_aggregation("orders", "order", "total", None)
        .await
        .unwrap();

    assert_eq!(summary["max"], 5.0);
    assert_eq!(
        engine.searches()[0].body,
        json!({
            "query": { "match_all": {} },
            "size": 0,
            "aggs": { "summary": { "stats": { "field": "total" } } },
        })
    );
}

#[tokio::test]
async fn test_text_aggregation() {
    let engine = engine();
    engine.set_search_response(json!({
        "hits": { "hits": [] },
        "aggregations": {
            "summary": { "buckets": [{ "key": "open", "doc_count": 4 }] }
        }
    }));
    let service = service(&engine).await;

    let summary = service
        .text_aggregation(
            "orders",
            "order",
            "status",
            Some(&json!({ "range": { "total": { "gte": 10 } } })),
        )
        .await
        .unwrap();

    assert_eq!(summary["buckets"][0]["key"], "open");
    let body = &engine.searches()[0].body;
    assert_eq!(body["aggs"]["summary"]["terms"]["field"], "status");
    assert_eq!(body["query"], json!({ "range": { "total": { "gte": 10 } } }));
}

#[tokio::test]
async fn test_aggregation_without_aggregations_is_an_error() {
    let engine = engine();
    let service = service(&engine).await;

    let err = service
        .numeric_aggregation("orders", "order", "total", None)
        .await
        .unwrap_err();

    assert!(matches!(err, QueryError::Decode { .. }));
}

struct Histogram;

impl AggregationEngine for Histogram {
    fn request(&self, _kind: AggregationKind, field: &str) -> QueryResult<Value> {
        Ok(json!({ "summary": { "histogram": { "field": field, "interval": 10 } } }))
    }

    fn summarize(
        &self,
        _kind: AggregationKind,
        _field: &str,
        aggregations: &Value,
    ) -> QueryResult<Value> {
        let buckets = aggregations["summary"]["buckets"]
            .as_array()
            .map(|b| b.len())
            .unwrap_or(0);
        Ok(json!({ "buckets": buckets }))
    }
}

#[tokio::test]
async fn test_custom_aggregation_engine() {
    let engine = engine();
    engine.set_search_response(json!({
        "hits": { "hits": [] },
        "aggregations": { "summary": { "buckets": [{}, {}, {}] } }
    }));
    let config = test_config(&[("orders", "order")]);
    let connection = Arc::new(Connection::with_api(Arc::new(engine.clone())));
    let service = QueryService::with_collaborators(
        connection,
        &config,
        Arc::new(quarry_query::PassthroughFilter),
        Arc::new(Histogram),
    )
    .unwrap();

    let summary = service
        .numeric_aggregation("orders", "order", "total", None)
        .await
        .unwrap();

    assert_eq!(summary, json!({ "buckets": 3 }));
}

#[tokio::test]
async fn test_fields_and_index_lookup() {
    let engine = engine();
    let service = service(&engine).await;

    let all = service.fields(None).unwrap();
    assert_eq!(all.len(), 2);

    let orders = service.fields(Some("orders")).unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].doc_type, "order");

    assert_eq!(service.index_by_type("customer").unwrap(), "customers");
    assert!(service.fields(Some("invoices")).is_err());
}

#[tokio::test]
async fn test_connection_status() {
    let engine = engine();
    let service = service(&engine).await;
    service.connection().probe().await.unwrap();
    assert!(service.is_connected());

    engine.set_unhealthy();
    let err = service.connection().probe().await.unwrap_err();
    assert!(matches!(err, QueryError::UpstreamUnavailable { .. }));
    assert!(!service.is_connected());
}

#[tokio::test]
async fn test_construction_never_fails_on_unreachable_engine() {
    let engine = engine();
    engine.set_unhealthy();
    let config = test_config(&[("orders", "order")]);

    let connection = Arc::new(Connection::with_api(Arc::new(engine.clone())));
    let service = QueryService::new(connection, &config);

    assert!(service.is_ok());
}

#[tokio::test]
async fn test_startup_continues_past_unreachable_engine() {
    let engine = engine();
    engine.set_unhealthy();
    let config = test_config(&[("orders", "order")]);
    let connection = Arc::new(Connection::with_api(Arc::new(engine.clone())));

    let status = connection.ready().await;
    assert!(matches!(status, ConnectionStatus::Disconnected { .. }));
    // Waiting on the construction check does not start another one.
    assert_eq!(engine.health_calls(), 1);
    assert_eq!(connection.ready().await, status);
    assert_eq!(engine.health_calls(), 1);

    let service = QueryService::new(connection, &config).unwrap();
    let report = service.initialize().await;
    assert!(report.is_complete());
    assert!(service.fields(Some("orders")).is_ok());
}
