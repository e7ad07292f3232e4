#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Query engine integration tests.
//!
//! Runs full queries through `GraphService` against the in-memory store.

mod common;

use std::sync::Arc;

use serde_json::{Value, json};

use docgraph::QueryError;
use docgraph::query::{
    ExpandSpec, FullTextSearch, GraphService, PaginationSpec, QueryConfig, SelectSpec, SortSpec,
};
use docgraph::registry::CollectionDef;
use docgraph::state::register_all;
use docgraph::store::{Document, DocumentStore, MemoryStore};

use common::{column, graph};

fn doc(value: Value) -> Document {
    value.as_object().cloned().unwrap()
}

fn names(rows: &[Document]) -> Vec<&str> {
    column(rows, "name")
        .into_iter()
        .filter_map(Value::as_str)
        .collect()
}

fn ids(rows: &[Document]) -> Vec<&str> {
    column(rows, "_id")
        .into_iter()
        .filter_map(Value::as_str)
        .collect()
}

// -------------------------------------------------------------------------
// Filters
// -------------------------------------------------------------------------

#[tokio::test]
async fn comparison_filter() {
    let envelope = graph()
        .execute(QueryConfig::new("people").with_filter("age_gt", 20))
        .await
        .unwrap();

    assert_eq!(envelope.data.len(), 2);
    assert!(
        envelope
            .data
            .iter()
            .all(|p| p["age"].as_i64().unwrap() > 20)
    );
}

#[tokio::test]
async fn default_and_user_filters_both_hold() {
    let envelope = graph()
        .execute(
            QueryConfig::new("people")
                .with_default_filters(doc(json!({"isActive": true})))
                .with_filter("age_gt", 25),
        )
        .await
        .unwrap();

    assert_eq!(names(&envelope.data), vec!["Bob"]);
}

#[tokio::test]
async fn conflicting_equalities_match_nothing() {
    let envelope = graph()
        .execute(
            QueryConfig::new("articles")
                .with_default_filters(doc(json!({"status": "published"})))
                .with_filter("status", "draft"),
        )
        .await
        .unwrap();

    assert!(envelope.data.is_empty());
    assert_eq!(envelope.metadata.total_count, 0);
}

#[tokio::test]
async fn identical_equalities_match_like_either_alone() {
    let alone = graph()
        .execute(QueryConfig::new("articles").with_filter("status", "published"))
        .await
        .unwrap();
    let both = graph()
        .execute(
            QueryConfig::new("articles")
                .with_default_filters(doc(json!({"status": "published"})))
                .with_filter("status", "published"),
        )
        .await
        .unwrap();

    assert_eq!(ids(&alone.data), ids(&both.data));
    assert_eq!(alone.data.len(), 3);
}

#[tokio::test]
async fn string_filter_values_are_coerced() {
    let envelope = graph()
        .execute(
            QueryConfig::new("people")
                .with_filter("age_between", "30,21")
                .with_filter("tags_in", "dev, ops")
                .with_filter("name_regex", "/^b/i"),
        )
        .await
        .unwrap();

    assert_eq!(names(&envelope.data), vec!["Bob"]);
}

#[tokio::test]
async fn malformed_clauses_are_reported_not_fatal() {
    let envelope = graph()
        .execute(
            QueryConfig::new("people")
                .with_filter("age_between", "young,old")
                .with_sort(SortSpec::Text("age:sideways".into())),
        )
        .await
        .unwrap();

    assert_eq!(envelope.data.len(), 3);
    assert_eq!(envelope.metadata.warnings.len(), 2);
}

#[tokio::test]
async fn operator_map_values_are_coerced() {
    let envelope = graph()
        .execute(
            QueryConfig::new("people")
                .with_filter("age", json!({"$gte": "21"}))
                .with_filter("tags", json!({"$in": "dev,ops"})),
        )
        .await
        .unwrap();

    assert_eq!(names(&envelope.data), vec!["Alice", "Bob"]);
    assert!(envelope.metadata.warnings.is_empty());
}

#[tokio::test]
async fn malformed_operator_map_values_are_warnings() {
    let envelope = graph()
        .execute(
            QueryConfig::new("people")
                .with_filter("name", json!({"$regex": "("}))
                .with_filter("tags", json!({"$size": "lots"})),
        )
        .await
        .unwrap();

    assert_eq!(envelope.data.len(), 3);
    assert_eq!(envelope.metadata.warnings.len(), 2);
}

#[tokio::test]
async fn operator_injection_is_dropped() {
    let envelope = graph()
        .execute(QueryConfig::new("people").with_filter("$or", json!([{"age": 20}])))
        .await
        .unwrap();

    assert_eq!(envelope.data.len(), 3);
    assert_eq!(envelope.metadata.warnings.len(), 1);
}

// -------------------------------------------------------------------------
// Sort, pagination, selection
// -------------------------------------------------------------------------

#[tokio::test]
async fn two_key_sort() {
    let envelope = graph()
        .execute(QueryConfig::new("people").with_sort(
            serde_json::from_value(json!([
                {"field": "isActive", "order": "desc"},
                {"field": "age", "order": "asc"}
            ]))
            .unwrap(),
        ))
        .await
        .unwrap();

    assert_eq!(names(&envelope.data), vec!["Alice", "Bob", "Carol"]);
}

#[tokio::test]
async fn first_page_of_two() {
    let envelope = graph()
        .execute(QueryConfig::new("people").with_pagination(PaginationSpec::page(1, 2)))
        .await
        .unwrap();

    let m = &envelope.metadata;
    assert_eq!(envelope.data.len(), 2);
    assert_eq!(m.total_count, 3);
    assert_eq!(m.total_pages, 2);
    assert!(m.has_next_page);
    assert!(!m.has_prev_page);
}

#[tokio::test]
async fn limit_is_capped() {
    let envelope = graph()
        .execute(QueryConfig::new("people").with_pagination(PaginationSpec::page(1, 10_000)))
        .await
        .unwrap();

    assert_eq!(envelope.metadata.page_size, 100);
    assert_eq!(envelope.data.len(), 3);
}

#[tokio::test]
async fn selection_keeps_identity() {
    let envelope = graph()
        .execute(
            QueryConfig::new("people")
                .with_filter("name", "Alice")
                .with_fields(SelectSpec::Text("name".into())),
        )
        .await
        .unwrap();

    assert_eq!(
        Value::Object(envelope.data[0].clone()),
        json!({"_id": "alice", "name": "Alice"})
    );
}

// -------------------------------------------------------------------------
// Expansion
// -------------------------------------------------------------------------

#[tokio::test]
async fn expansion_never_returns_restricted_fields() {
    let envelope = graph()
        .execute(
            QueryConfig::new("articles")
                .with_filter("_id", "a1")
                .with_expand(ExpandSpec::Text("author".into())),
        )
        .await
        .unwrap();

    let author = envelope.data[0]["author"].as_object().unwrap();
    assert_eq!(author["name"], json!("Ada"));
    assert!(!author.contains_key("password"));
}

#[tokio::test]
async fn expansion_respects_target_default_filters() {
    let store = Arc::new(MemoryStore::new());
    store.insert_many(
        "users",
        vec![
            doc(json!({"_id": "u1", "name": "Ada", "tenant": "t1"})),
            doc(json!({"_id": "u2", "name": "Mallory", "tenant": "t2"})),
        ],
    );
    store.insert_many(
        "posts",
        vec![
            doc(json!({"_id": "p1", "author": "u2", "editors": ["u1", "u2"]})),
            doc(json!({"_id": "p2", "author": "u1", "editors": []})),
        ],
    );
    let store: Arc<dyn DocumentStore> = store;
    let definitions = vec![
        CollectionDef::new("users").with_default_filters(doc(json!({"tenant": "t1"}))),
        CollectionDef::new("posts")
            .with_relation("author", "users", "_id")
            .with_relation("editors", "users", "_id"),
    ];
    let service = GraphService::new(register_all(definitions, store).unwrap());

    let direct = service
        .execute(QueryConfig::new("users").with_filter("_id", "u2"))
        .await
        .unwrap();
    assert!(direct.data.is_empty());

    let posts = service
        .execute(
            QueryConfig::new("posts")
                .with_sort(SortSpec::Text("_id".into()))
                .with_expand(ExpandSpec::Text("author(name),editors(name)".into())),
        )
        .await
        .unwrap();
    assert_eq!(posts.data[0]["author"], Value::Null);
    assert_eq!(posts.data[0]["editors"], json!([{"_id": "u1", "name": "Ada"}]));
    assert_eq!(posts.data[1]["author"], json!({"_id": "u1", "name": "Ada"}));
}

#[tokio::test]
async fn expansion_sub_selection() {
    let envelope = graph()
        .execute(
            QueryConfig::new("articles")
                .with_filter("_id", "a2")
                .with_expand(serde_json::from_value(json!([
                    {"path": "author", "select": ["email"]}
                ]))
                .unwrap()),
        )
        .await
        .unwrap();

    assert_eq!(
        envelope.data[0]["author"],
        json!({"_id": "u2", "email": "grace@example.com"})
    );
}

// -------------------------------------------------------------------------
// Full-text search
// -------------------------------------------------------------------------

#[tokio::test]
async fn text_search_ordered_by_relevance() {
    let envelope = graph()
        .execute(
            QueryConfig::new("articles")
                .with_full_text_search(FullTextSearch::new("mongodb tutorial").sorted_by_score()),
        )
        .await
        .unwrap();

    assert_eq!(ids(&envelope.data), vec!["a1", "a4", "a3"]);
    let scores: Vec<f64> = column(&envelope.data, "score")
        .into_iter()
        .map(|s| s.as_f64().unwrap())
        .collect();
    assert_eq!(scores.len(), 3);
    assert!(scores.windows(2).all(|w| w[0] >= w[1]));
}

#[tokio::test]
async fn text_search_combines_with_filters() {
    let envelope = graph()
        .execute(
            QueryConfig::new("articles")
                .with_filter("status", "published")
                .with_full_text_search(FullTextSearch::new("tutorial"))
                .with_pagination(PaginationSpec::page(1, 10)),
        )
        .await
        .unwrap();

    assert_eq!(ids(&envelope.data), vec!["a1"]);
    assert_eq!(envelope.metadata.total_count, 1);
    assert!(envelope.data[0].get("score").is_none());
}

#[tokio::test]
async fn blank_search_is_ignored() {
    let envelope = graph()
        .execute(QueryConfig::new("articles").with_full_text_search(FullTextSearch::new("   ")))
        .await
        .unwrap();

    assert_eq!(envelope.data.len(), 4);
}

// -------------------------------------------------------------------------
// Resolution and aggregation
// -------------------------------------------------------------------------

#[tokio::test]
async fn unknown_collection() {
    let err = graph().execute(QueryConfig::new("planets")).await.unwrap_err();
    assert!(matches!(err, QueryError::EntityNotFound(_)));
}

#[tokio::test]
async fn handle_passes_through() {
    let service = graph();
    let handle = service.registry().get("people").unwrap();
    let envelope = service.execute(QueryConfig::new(handle)).await.unwrap();
    assert_eq!(envelope.data.len(), 3);
}

#[tokio::test]
async fn aggregation_pipeline() {
    let rows = graph()
        .aggregate(
            "articles",
            vec![
                doc(json!({"$match": {"status": "published"}})),
                doc(json!({"$sort": {"views": -1}})),
                doc(json!({"$limit": 2})),
                doc(json!({"$project": {"title": 1, "_id": 0}})),
            ],
        )
        .await
        .unwrap();

    assert_eq!(
        rows,
        vec![
            doc(json!({"title": "Rust ownership"})),
            doc(json!({"title": "MongoDB tutorial"})),
        ]
    );
}

#[tokio::test]
async fn unsupported_stage_is_a_storage_error() {
    let err = graph()
        .aggregate("articles", vec![doc(json!({"$group": {"_id": "$status"}}))])
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::Storage(_)));
}
