#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Common test utilities for integration tests.
//!
//! Builds a registry over the in-memory store seeded with the
//! `docgraph-test-utils` fixtures, and drives the HTTP router in-process.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use docgraph::query::GraphService;
use docgraph::registry::CollectionDef;
use docgraph::state::{AppState, register_all};
use docgraph::store::{DocumentStore, MemoryStore};
use docgraph::routes;
use docgraph_test_utils::{articles, people, users};

/// Collection definitions used by the fixtures.
pub fn definitions() -> Vec<CollectionDef> {
    vec![
        CollectionDef::new("people"),
        CollectionDef::new("users").with_restricted_fields(["password"]),
        CollectionDef::new("articles")
            .with_text_fields(["title", "body"])
            .with_relation("author", "users", "_id"),
    ]
}

/// An in-memory store holding every fixture collection.
pub fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.insert_many("people", people());
    store.insert_many("users", users());
    store.insert_many("articles", articles());
    store
}

/// A query engine over the fixture collections.
pub fn graph() -> GraphService {
    let store: Arc<dyn DocumentStore> = seeded_store();
    GraphService::new(register_all(definitions(), store).unwrap())
}

/// The HTTP router over the fixture collections.
pub fn app() -> Router {
    routes::router().with_state(AppState::with_graph(graph(), None))
}

/// Send a request and return status plus parsed JSON body.
pub async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

pub async fn get(uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(app(), request).await
}

pub async fn post_json(uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app(), request).await
}

/// Values of `field` across `rows`, in order.
pub fn column<'a>(rows: &'a [serde_json::Map<String, Value>], field: &str) -> Vec<&'a Value> {
    rows.iter().filter_map(|r| r.get(field)).collect()
}
