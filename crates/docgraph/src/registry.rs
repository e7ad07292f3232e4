//! Collection registry.
//!
//! Collections are registered once at startup with their definition (identity
//! field, text-indexed fields, relations, enforced default filters, restricted
//! fields) and the store that holds them. Queries name a collection and the
//! registry resolves the name to a [`CollectionHandle`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::QueryError;
use crate::query::EntityRef;
use crate::store::{DEFAULT_ID_FIELD, Document, DocumentStore};

fn default_id_field() -> String {
    DEFAULT_ID_FIELD.to_string()
}

/// A relation from a field of one collection to records of another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationDef {
    /// Target collection name.
    pub collection: String,
    /// Field in the target the stored references match (default `_id`).
    #[serde(default = "default_id_field")]
    pub foreign_field: String,
}

/// Static description of a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionDef {
    pub name: String,

    /// Identity field (default `_id`).
    #[serde(default = "default_id_field")]
    pub id_field: String,

    /// Fields covered by the text index. Empty means every string field.
    #[serde(default)]
    pub text_fields: Vec<String>,

    /// Expandable relations keyed by the local field holding the reference.
    #[serde(default)]
    pub relations: BTreeMap<String, RelationDef>,

    /// Filters always applied to queries against this collection.
    #[serde(default)]
    pub default_filters: Document,

    /// Fields clients may never filter, select, sort or expand.
    #[serde(default)]
    pub restricted_fields: Vec<String>,
}

impl CollectionDef {
    /// A definition with defaults for everything but the name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id_field: default_id_field(),
            text_fields: Vec::new(),
            relations: BTreeMap::new(),
            default_filters: Document::new(),
            restricted_fields: Vec::new(),
        }
    }

    pub fn with_id_field(mut self, field: impl Into<String>) -> Self {
        self.id_field = field.into();
        self
    }

    pub fn with_text_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.text_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_relation(
        mut self,
        path: impl Into<String>,
        collection: impl Into<String>,
        foreign_field: impl Into<String>,
    ) -> Self {
        self.relations.insert(
            path.into(),
            RelationDef {
                collection: collection.into(),
                foreign_field: foreign_field.into(),
            },
        );
        self
    }

    pub fn with_default_filters(mut self, filters: Document) -> Self {
        self.default_filters = filters;
        self
    }

    pub fn with_restricted_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.restricted_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Whether `field` (or a parent path of it) is restricted.
    pub fn is_restricted(&self, field: &str) -> bool {
        is_restricted_path(field, &self.restricted_fields)
    }
}

/// Whether `field` is one of `restricted` or lies beneath one of them.
pub fn is_restricted_path(field: &str, restricted: &[String]) -> bool {
    restricted.iter().any(|r| {
        field == r
            || field
                .strip_prefix(r.as_str())
                .is_some_and(|rest| rest.starts_with('.'))
    })
}

/// A resolved collection: its definition plus the store holding it.
#[derive(Clone)]
pub struct CollectionHandle {
    pub def: Arc<CollectionDef>,
    pub store: Arc<dyn DocumentStore>,
}

impl CollectionHandle {
    pub fn new(def: CollectionDef, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            def: Arc::new(def),
            store,
        }
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }
}

impl fmt::Debug for CollectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionHandle")
            .field("def", &self.def)
            .finish_non_exhaustive()
    }
}

/// Validate a collection name.
///
/// Allows only `[a-zA-Z_][a-zA-Z0-9_]*` with max 63 chars, so names are also
/// usable as PostgreSQL table names.
pub fn is_valid_collection_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 63
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && name.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_')
}

/// Registered collections by name.
#[derive(Default)]
pub struct CollectionRegistry {
    collections: DashMap<String, CollectionHandle>,
}

impl CollectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a collection, replacing any previous registration of the same name.
    pub fn register(
        &self,
        def: CollectionDef,
        store: Arc<dyn DocumentStore>,
    ) -> Result<CollectionHandle, QueryError> {
        if !is_valid_collection_name(&def.name) {
            return Err(QueryError::InvalidEntityReference(def.name));
        }
        for relation in def.relations.values() {
            if !is_valid_collection_name(&relation.collection) {
                return Err(QueryError::InvalidEntityReference(relation.collection.clone()));
            }
        }

        let handle = CollectionHandle::new(def, store);
        tracing::debug!(collection = %handle.name(), "registered collection");
        self.collections
            .insert(handle.name().to_string(), handle.clone());
        Ok(handle)
    }

    /// Resolve an entity reference to a registered collection.
    pub fn resolve(&self, entity: &EntityRef) -> Result<CollectionHandle, QueryError> {
        match entity {
            EntityRef::ByName(name) => {
                if !is_valid_collection_name(name) {
                    return Err(QueryError::InvalidEntityReference(name.clone()));
                }
                self.get(name)
                    .ok_or_else(|| QueryError::EntityNotFound(name.clone()))
            }
            EntityRef::ByHandle(handle) => {
                if !is_valid_collection_name(handle.name()) {
                    return Err(QueryError::InvalidEntityReference(
                        handle.name().to_string(),
                    ));
                }
                Ok(handle.clone())
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<CollectionHandle> {
        self.collections.get(name).map(|entry| entry.value().clone())
    }

    /// Registered definitions, sorted by name.
    pub fn definitions(&self) -> Vec<Arc<CollectionDef>> {
        let mut defs: Vec<Arc<CollectionDef>> = self
            .collections
            .iter()
            .map(|entry| entry.value().def.clone())
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.definitions().iter().map(|d| d.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn store() -> Arc<dyn DocumentStore> {
        Arc::new(MemoryStore::new())
    }

    #[test]
    fn collection_names() {
        assert!(is_valid_collection_name("users"));
        assert!(is_valid_collection_name("_audit_log2"));
        assert!(!is_valid_collection_name(""));
        assert!(!is_valid_collection_name("2fast"));
        assert!(!is_valid_collection_name("users; DROP TABLE x"));
        assert!(!is_valid_collection_name(&"a".repeat(64)));
    }

    #[test]
    fn register_and_resolve() {
        let registry = CollectionRegistry::new();
        registry
            .register(CollectionDef::new("users"), store())
            .unwrap();

        let handle = registry
            .resolve(&EntityRef::ByName("users".to_string()))
            .unwrap();
        assert_eq!(handle.name(), "users");

        let passed = registry.resolve(&EntityRef::ByHandle(handle)).unwrap();
        assert_eq!(passed.name(), "users");
    }

    #[test]
    fn resolve_failures() {
        let registry = CollectionRegistry::new();
        assert!(matches!(
            registry.resolve(&EntityRef::ByName("ghosts".to_string())),
            Err(QueryError::EntityNotFound(name)) if name == "ghosts"
        ));
        assert!(matches!(
            registry.resolve(&EntityRef::ByName("bad name".to_string())),
            Err(QueryError::InvalidEntityReference(_))
        ));
        let bogus = CollectionHandle::new(CollectionDef::new("no-dash"), store());
        assert!(matches!(
            registry.resolve(&EntityRef::ByHandle(bogus)),
            Err(QueryError::InvalidEntityReference(_))
        ));
    }

    #[test]
    fn register_rejects_invalid_names() {
        let registry = CollectionRegistry::new();
        assert!(registry.register(CollectionDef::new("x y"), store()).is_err());
        let def = CollectionDef::new("posts").with_relation("author", "bad target", "_id");
        assert!(registry.register(def, store()).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn names_are_sorted() {
        let registry = CollectionRegistry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry.register(CollectionDef::new(name), store()).unwrap();
        }
        assert_eq!(registry.names(), vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn restricted_paths_cover_children() {
        let def = CollectionDef::new("users").with_restricted_fields(["password", "secrets"]);
        assert!(def.is_restricted("password"));
        assert!(def.is_restricted("secrets.api_key"));
        assert!(!def.is_restricted("passwords"));
        assert!(!def.is_restricted("name"));
    }

    #[test]
    fn definitions_deserialize_from_toml() {
        let def: CollectionDef = toml::from_str(
            r#"
            name = "posts"
            text_fields = ["title", "body"]
            restricted_fields = ["internal_notes"]

            [default_filters]
            published = true

            [relations.author]
            collection = "users"
            "#,
        )
        .unwrap();
        assert_eq!(def.id_field, "_id");
        assert_eq!(def.relations["author"].foreign_field, "_id");
        assert_eq!(def.default_filters["published"], serde_json::json!(true));
    }
}
