#![allow(clippy::unwrap_used, clippy::expect_used)]
//! HTTP API integration tests.

mod common;

use axum::http::StatusCode;
use serde_json::{Value, json};

use common::{get, post_json};

fn rows(body: &Value) -> &Vec<Value> {
    body["data"].as_array().unwrap()
}

fn strings<'a>(body: &'a Value, field: &str) -> Vec<&'a str> {
    rows(body)
        .iter()
        .filter_map(|r| r[field].as_str())
        .collect()
}

#[tokio::test]
async fn health_reports_memory_store() {
    let (status, body) = get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "healthy", "store": "memory", "collections": 3}));
}

#[tokio::test]
async fn lists_collections() {
    let (status, body) = get("/api/collections").await;
    assert_eq!(status, StatusCode::OK);

    let articles = body
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["name"] == "articles")
        .unwrap();
    assert_eq!(articles["relations"], json!(["author"]));
    assert_eq!(articles["searchable"], json!(["title", "body"]));
    assert_eq!(articles["id_field"], json!("_id"));
}

#[tokio::test]
async fn query_string_filters_sort_and_page() {
    let (status, body) = get("/api/collections/people?age_gt=20&sort=-age").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(strings(&body, "name"), vec!["Bob", "Alice"]);

    let metadata = &body["metadata"];
    assert_eq!(metadata["totalCount"], json!(2));
    assert_eq!(metadata["currentPage"], json!(1));
    assert_eq!(metadata["pageSize"], json!(10));
    assert_eq!(metadata["hasNextPage"], json!(false));
    assert_eq!(metadata["query"]["filters"], json!({"age": {"$gt": 20}}));
}

#[tokio::test]
async fn query_string_selection_and_expansion() {
    let (status, body) =
        get("/api/collections/articles?_id=a3&fields=title,author&expand=author(name)").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        rows(&body)[0],
        json!({"_id": "a3", "title": "Query tips", "author": {"_id": "u1", "name": "Ada"}})
    );
}

#[tokio::test]
async fn query_string_text_search() {
    let (status, body) =
        get("/api/collections/articles?search=mongodb%20tutorial&sortByScore=true").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(strings(&body, "_id"), vec!["a1", "a4", "a3"]);
    assert!(rows(&body).iter().all(|r| r["score"].is_number()));
    assert_eq!(body["metadata"]["query"]["search"], json!("mongodb tutorial"));
}

#[tokio::test]
async fn restricted_fields_are_never_returned() {
    for uri in [
        "/api/collections/users",
        "/api/collections/users?fields=name,password",
        "/api/collections/users?password=hunter2",
        "/api/collections/users?sort=password",
    ] {
        let (status, body) = get(uri).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
        assert_eq!(rows(&body).len(), 2, "{uri}");
        assert!(
            rows(&body).iter().all(|r| r.get("password").is_none()),
            "{uri}"
        );
    }
}

#[tokio::test]
async fn unknown_collection_is_not_found() {
    let (status, body) = get("/api/collections/planets").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("planets"));
}

#[tokio::test]
async fn json_body_query() {
    let (status, body) = post_json(
        "/api/collections/people/query",
        json!({
            "filters": {"isActive": true},
            "sort": [{"field": "age", "order": "desc"}],
            "pagination": {"page": 1, "limit": 1},
            "fields": ["name"]
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rows(&body)[0], json!({"_id": "bob", "name": "Bob"}));
    assert_eq!(body["metadata"]["totalCount"], json!(2));
    assert_eq!(body["metadata"]["hasNextPage"], json!(true));
}

#[tokio::test]
async fn json_body_without_pagination_returns_everything() {
    let (status, body) =
        post_json("/api/collections/articles/query", json!({"filters": {"status": "published"}}))
            .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rows(&body).len(), 3);
    assert_eq!(body["metadata"]["totalCount"], json!(3));
    assert_eq!(body["metadata"]["pageSize"], json!(3));
}

#[tokio::test]
async fn json_body_rejects_default_filters() {
    let (status, body) = post_json(
        "/api/collections/people/query",
        json!({"defaultFilters": {"isActive": false}}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn warnings_are_reported() {
    let (status, body) = post_json(
        "/api/collections/people/query",
        json!({"filters": {"age_between": "young,old"}, "expand": "friends"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rows(&body).len(), 3);
    assert_eq!(body["metadata"]["warnings"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn aggregate_endpoint() {
    let (status, body) = post_json(
        "/api/collections/articles/aggregate",
        json!([{"$match": {"author": "u1"}}, {"$count": "n"}]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([{"n": 2}]));
}

#[tokio::test]
async fn aggregate_rejects_unsupported_stage() {
    let (status, _) = post_json(
        "/api/collections/articles/aggregate",
        json!([{"$lookup": {"from": "users"}}]),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn invalid_collection_name_is_bad_request() {
    let (status, _) = get("/api/collections/no-dash").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
