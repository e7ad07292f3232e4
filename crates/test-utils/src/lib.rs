//! Docgraph test utilities.
//!
//! Record builders and canned collections for integration tests.

use serde_json::{Map, Value as JsonValue, json};
use uuid::Uuid;

/// Create a test record with a fresh UUIDv7 identity.
pub fn test_record() -> TestRecord {
    TestRecord {
        id: Uuid::now_v7().to_string(),
        fields: Map::new(),
    }
}

/// A record builder for creating test fixtures.
#[derive(Debug, Clone)]
pub struct TestRecord {
    pub id: String,
    pub fields: Map<String, JsonValue>,
}

impl TestRecord {
    /// Set a custom ID.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set one field.
    pub fn with(mut self, field: &str, value: impl Into<JsonValue>) -> Self {
        self.fields.insert(field.to_string(), value.into());
        self
    }

    /// Build the document, identity first, under `id_field`.
    pub fn build_with_id_field(self, id_field: &str) -> Map<String, JsonValue> {
        let mut doc = Map::new();
        doc.insert(id_field.to_string(), JsonValue::String(self.id));
        doc.extend(self.fields);
        doc
    }

    /// Build the document under `_id`.
    pub fn build(self) -> Map<String, JsonValue> {
        self.build_with_id_field("_id")
    }
}

/// Three people: Alice (25, active), Bob (30, active), Carol (20, inactive).
pub fn people() -> Vec<Map<String, JsonValue>> {
    vec![
        test_record()
            .with_id("alice")
            .with("name", "Alice")
            .with("age", 25)
            .with("isActive", true)
            .with("tags", json!(["admin", "dev"]))
            .build(),
        test_record()
            .with_id("bob")
            .with("name", "Bob")
            .with("age", 30)
            .with("isActive", true)
            .with("tags", json!(["dev"]))
            .build(),
        test_record()
            .with_id("carol")
            .with("name", "Carol")
            .with("age", 20)
            .with("isActive", false)
            .with("tags", json!(["ops"]))
            .build(),
    ]
}

/// Two authors, each with a restricted `password` field.
pub fn users() -> Vec<Map<String, JsonValue>> {
    vec![
        test_record()
            .with_id("u1")
            .with("name", "Ada")
            .with("email", "ada@example.com")
            .with("password", "hunter2")
            .build(),
        test_record()
            .with_id("u2")
            .with("name", "Grace")
            .with("email", "grace@example.com")
            .with("password", "correct horse")
            .build(),
    ]
}

/// Four articles referencing [`users`] through `author`.
///
/// Two mention "mongodb tutorial"; the first mentions both words twice.
pub fn articles() -> Vec<Map<String, JsonValue>> {
    vec![
        test_record()
            .with_id("a1")
            .with("title", "MongoDB tutorial")
            .with("body", "A mongodb tutorial for beginners, with a tutorial on indexes.")
            .with("author", "u1")
            .with("status", "published")
            .with("views", 120)
            .build(),
        test_record()
            .with_id("a2")
            .with("title", "Rust ownership")
            .with("body", "Borrowing and lifetimes explained.")
            .with("author", "u2")
            .with("status", "published")
            .with("views", 300)
            .build(),
        test_record()
            .with_id("a3")
            .with("title", "Query tips")
            .with("body", "A short mongodb note.")
            .with("author", "u1")
            .with("status", "published")
            .with("views", 45)
            .build(),
        test_record()
            .with_id("a4")
            .with("title", "Draft: mongodb tutorial")
            .with("body", "Unfinished.")
            .with("author", "u2")
            .with("status", "draft")
            .with("views", 0)
            .build(),
    ]
}
