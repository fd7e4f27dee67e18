//! Scripted in-memory search engine for integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use quarry_query::{
    Connection, EngineError, IndexDescriptor, MappingCache, QueryConfig, SearchApi,
};
use serde_json::{Value, json};

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedSearch {
    pub index: String,
    pub body: Value,
    pub scroll: Option<String>,
}

#[derive(Debug, Default)]
struct MockState {
    unhealthy: bool,
    mappings: HashMap<String, Value>,
    failing_mappings: HashSet<String>,
    panicking_mappings: HashSet<String>,
    mapping_delays: HashMap<String, Duration>,
    mappings_in_flight: usize,
    max_mappings_in_flight: usize,

    pages: VecDeque<Vec<Value>>,
    rotate_cursor: bool,
    cursor_counter: u64,
    fail_search: Option<EngineError>,
    fail_scroll_on: Option<(usize, EngineError)>,
    search_response: Option<Value>,
    count: u64,

    health_calls: usize,
    mapping_calls: usize,
    search_calls: usize,
    count_calls: usize,
    scroll_calls: usize,
    searches: Vec<RecordedSearch>,
    counts: Vec<Value>,
    scrolled_ids: Vec<String>,
    cleared: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MockEngine {
    state: Arc<Mutex<MockState>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mapping(self, index: &str, properties: Value) -> Self {
        self.set_mapping(index, properties);
        self
    }

    pub fn set_mapping(&self, index: &str, properties: Value) {
        let mut state = self.state.lock().unwrap();
        state.mappings.insert(
            index.to_string(),
            json!({ index: { "mappings": { "properties": properties } } }),
        );
    }

    pub fn fail_mapping(&self, index: &str) {
        let mut state = self.state.lock().unwrap();
        state.failing_mappings.insert(index.to_string());
    }

    /// Makes the fetch task for `index` panic instead of answering.
    pub fn panic_mapping(&self, index: &str) {
        let mut state = self.state.lock().unwrap();
        state.panicking_mappings.insert(index.to_string());
    }

    pub fn delay_mapping(&self, index: &str, delay: Duration) {
        let mut state = self.state.lock().unwrap();
        state.mapping_delays.insert(index.to_string(), delay);
    }

    pub fn set_unhealthy(&self) {
        self.state.lock().unwrap().unhealthy = true;
    }

    /// Queues one page per entry. The first page answers the opening search;
    /// the rest answer continuations. Once drained, pages are empty.
    pub fn script_pages(&self, pages: Vec<Vec<Value>>) {
        let mut state = self.state.lock().unwrap();
        state.pages = pages.into();
    }

    pub fn rotate_cursor(&self) {
        self.state.lock().unwrap().rotate_cursor = true;
    }

    pub fn fail_search(&self, error: EngineError) {
        self.state.lock().unwrap().fail_search = Some(error);
    }

    /// Fails the `call`-th continuation (1-based).
    pub fn fail_scroll_on(&self, call: usize, error: EngineError) {
        self.state.lock().unwrap().fail_scroll_on = Some((call, error));
    }

    pub fn set_search_response(&self, response: Value) {
        self.state.lock().unwrap().search_response = Some(response);
    }

    pub fn set_count(&self, count: u64) {
        self.state.lock().unwrap().count = count;
    }

    pub fn health_calls(&self) -> usize {
        self.state.lock().unwrap().health_calls
    }

    pub fn mapping_calls(&self) -> usize {
        self.state.lock().unwrap().mapping_calls
    }

    pub fn max_mappings_in_flight(&self) -> usize {
        self.state.lock().unwrap().max_mappings_in_flight
    }

    pub fn search_calls(&self) -> usize {
        self.state.lock().unwrap().search_calls
    }

    pub fn count_calls(&self) -> usize {
        self.state.lock().unwrap().count_calls
    }

    pub fn scroll_calls(&self) -> usize {
        self.state.lock().unwrap().scroll_calls
    }

    /// Every call that reached the engine, excluding health probes.
    pub fn data_calls(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.search_calls + state.count_calls + state.scroll_calls + state.cleared.len()
    }

    pub fn searches(&self) -> Vec<RecordedSearch> {
        self.state.lock().unwrap().searches.clone()
    }

    pub fn counts(&self) -> Vec<Value> {
        self.state.lock().unwrap().counts.clone()
    }

    pub fn scrolled_ids(&self) -> Vec<String> {
        self.state.lock().unwrap().scrolled_ids.clone()
    }

    pub fn cleared(&self) -> Vec<String> {
        self.state.lock().unwrap().cleared.clone()
    }
}

impl MockState {
    fn next_cursor(&mut self) -> String {
        self.cursor_counter += 1;
        format!("cursor-{}", self.cursor_counter)
    }

    fn next_page(&mut self) -> Vec<Value> {
        self.pages.pop_front().unwrap_or_default()
    }
}

fn page_response(scroll_id: &str, page: Vec<Value>) -> Value {
    let total = page.len();
    let hits: Vec<Value> = page
        .into_iter()
        .enumerate()
        .map(|(i, source)| json!({ "_id": i.to_string(), "_source": source }))
        .collect();
    json!({
        "_scroll_id": scroll_id,
        "hits": {
            "total": { "value": total, "relation": "eq" },
            "hits": hits,
        },
    })
}

#[async_trait]
impl SearchApi for MockEngine {
    async fn health(&self) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        state.health_calls += 1;
        if state.unhealthy {
            Err(EngineError::Transport("connection refused".to_string()))
        } else {
            Ok(())
        }
    }

    async fn get_mapping(&self, index: &str, _doc_type: &str) -> Result<Value, EngineError> {
        let (delay, panics) = {
            let mut state = self.state.lock().unwrap();
            state.mapping_calls += 1;
            state.mappings_in_flight += 1;
            state.max_mappings_in_flight =
                state.max_mappings_in_flight.max(state.mappings_in_flight);
            (
                state.mapping_delays.get(index).copied(),
                state.panicking_mappings.contains(index),
            )
        };

        // Panic with the lock released so the state stays usable.
        if panics {
            panic!("mapping fetch for '{}' blew up", index);
        }

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        state.mappings_in_flight -= 1;
        if state.failing_mappings.contains(index) {
            return Err(EngineError::Status {
                status: 500,
                body: "mapping fetch failed".to_string(),
            });
        }
        state
            .mappings
            .get(index)
            .cloned()
            .ok_or_else(|| EngineError::Status {
                status: 404,
                body: "index_not_found_exception".to_string(),
            })
    }

    async fn search(
        &self,
        index: &str,
        body: Value,
        scroll: Option<&str>,
    ) -> Result<Value, EngineError> {
        let mut state = self.state.lock().unwrap();
        state.search_calls += 1;
        state.searches.push(RecordedSearch {
            index: index.to_string(),
            body,
            scroll: scroll.map(str::to_string),
        });

        if let Some(error) = state.fail_search.take() {
            return Err(error);
        }

        if scroll.is_some() {
            let id = state.next_cursor();
            let page = state.next_page();
            return Ok(page_response(&id, page));
        }

        Ok(state
            .search_response
            .clone()
            .unwrap_or_else(|| json!({ "hits": { "total": { "value": 0 }, "hits": [] } })))
    }

    async fn count(&self, _index: &str, body: Value) -> Result<Value, EngineError> {
        let mut state = self.state.lock().unwrap();
        state.count_calls += 1;
        state.counts.push(body);
        Ok(json!({ "count": state.count }))
    }

    async fn scroll(&self, scroll_id: &str, _keep_alive: &str) -> Result<Value, EngineError> {
        let mut state = self.state.lock().unwrap();
        state.scroll_calls += 1;
        state.scrolled_ids.push(scroll_id.to_string());

        if let Some((call, error)) = state.fail_scroll_on.clone()
            && call == state.scroll_calls
        {
            return Err(error);
        }

        let id = if state.rotate_cursor {
            state.next_cursor()
        } else {
            scroll_id.to_string()
        };
        let page = state.next_page();
        Ok(page_response(&id, page))
    }

    async fn clear_scroll(&self, scroll_id: &str) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        state.cleared.push(scroll_id.to_string());
        Ok(())
    }
}

pub fn order_properties() -> Value {
    json!({
        "id": { "type": "keyword" },
        "status": { "type": "keyword" },
        "total": { "type": "double" },
        "placed_at": { "type": "date" },
        "customer": {
            "properties": {
                "name": {
                    "type": "text",
                    "fields": { "raw": { "type": "keyword" } }
                }
            }
        }
    })
}

pub fn docs(prefix: &str, n: usize) -> Vec<Value> {
    (0..n)
        .map(|i| json!({ "id": format!("{}-{}", prefix, i), "status": "open" }))
        .collect()
}

pub fn test_config(indices: &[(&str, &str)]) -> QueryConfig {
    QueryConfig {
        indices: indices
            .iter()
            .map(|(index, doc_type)| IndexDescriptor::new(*index, *doc_type))
            .collect(),
        scroll_page_size: 2,
        ..Default::default()
    }
}

/// An engine with an `orders`/`order` index and an initialized cache.
pub async fn orders_fixture() -> (MockEngine, Arc<Connection>, Arc<MappingCache>, QueryConfig) {
    let engine = MockEngine::new().with_mapping("orders", order_properties());
    let config = test_config(&[("orders", "order")]);
    let connection = Arc::new(Connection::with_api(Arc::new(engine.clone())));
    let mappings = Arc::new(MappingCache::new(connection.clone(), &config));
    let report = mappings.initialize().await;
    assert!(report.is_complete());
    (engine, connection, mappings, config)
}
