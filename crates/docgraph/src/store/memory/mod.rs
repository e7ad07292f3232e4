//! In-process document store.
//!
//! Holds every collection as a vector of JSON documents behind a
//! `parking_lot::RwLock`. Queries clone the matching documents out under the
//! read lock and do the rest of their work unlocked, so the lock is never held
//! across an await point.

mod matcher;
mod text;

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Value, json};
use uuid::Uuid;

use self::matcher::Predicate;
use super::document::{get_path, project, sort_order};
use super::populate::populate;
use super::query::{DEFAULT_ID_FIELD, Document, FindQuery, SortDirection, SortKey, Stage};
use super::{DocumentStore, StoreError};
use crate::registry::CollectionDef;

/// A matched document and its text score, if a `$text` clause produced one.
type Row = (Document, Option<f64>);

/// Document store backed by process memory.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a seed document shaped `{"collection": [doc, ...], ...}`.
    pub fn from_seed(seed: &Value) -> Result<Self, StoreError> {
        let collections = seed.as_object().ok_or_else(|| {
            StoreError::InvalidQuery("seed data must be an object of collections".to_string())
        })?;

        let store = Self::new();
        for (name, docs) in collections {
            let docs = docs.as_array().ok_or_else(|| {
                StoreError::InvalidQuery(format!("seed collection '{name}' must be an array"))
            })?;
            let docs = docs
                .iter()
                .map(|d| {
                    d.as_object().cloned().ok_or_else(|| {
                        StoreError::InvalidQuery(format!(
                            "seed collection '{name}' contains a non-object document"
                        ))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            store.insert_many(name, docs);
        }
        Ok(store)
    }

    /// Insert a document, assigning a UUIDv7 `_id` when it has none.
    ///
    /// Returns the document's identity.
    pub fn insert(&self, collection: &str, mut doc: Document) -> Value {
        let id = doc
            .entry(DEFAULT_ID_FIELD)
            .or_insert_with(|| Value::String(Uuid::now_v7().to_string()))
            .clone();
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .push(doc);
        id
    }

    pub fn insert_many(&self, collection: &str, docs: Vec<Document>) {
        for doc in docs {
            self.insert(collection, doc);
        }
    }

    /// Number of documents stored in `collection`.
    pub fn len(&self, collection: &str) -> usize {
        self.collections.read().get(collection).map_or(0, Vec::len)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    /// Clone out every document of `collection` that satisfies `predicate`.
    fn matching(&self, collection: &str, predicate: &Predicate) -> Vec<Row> {
        let guard = self.collections.read();
        let Some(docs) = guard.get(collection) else {
            return Vec::new();
        };
        docs.iter()
            .filter_map(|doc| {
                let mut score = None;
                predicate
                    .matches(doc, &mut score)
                    .then(|| (doc.clone(), score))
            })
            .collect()
    }

    fn all(&self, collection: &str) -> Vec<Row> {
        self.collections
            .read()
            .get(collection)
            .map(|docs| docs.iter().map(|d| (d.clone(), None)).collect())
            .unwrap_or_default()
    }
}

/// Stable multi-key sort.
fn sort_rows(rows: &mut [Row], keys: &[SortKey]) {
    if keys.is_empty() {
        return;
    }
    rows.sort_by(|(a, a_score), (b, b_score)| {
        for key in keys {
            let ordering = match key {
                SortKey::Field { field, direction } => {
                    let null = Value::Null;
                    let left = get_path(a, field).unwrap_or(&null);
                    let right = get_path(b, field).unwrap_or(&null);
                    let ordering = sort_order(left, right);
                    match direction {
                        SortDirection::Asc => ordering,
                        SortDirection::Desc => ordering.reverse(),
                    }
                }
                SortKey::TextScore => {
                    let left = a_score.unwrap_or(f64::NEG_INFINITY);
                    let right = b_score.unwrap_or(f64::NEG_INFINITY);
                    right.partial_cmp(&left).unwrap_or(Ordering::Equal)
                }
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

fn to_usize(n: u64) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find(
        &self,
        collection: &CollectionDef,
        query: &FindQuery,
    ) -> Result<Vec<Document>, StoreError> {
        let predicate = Predicate::compile(&query.filter, &collection.text_fields)?;
        let mut rows = self.matching(&collection.name, &predicate);
        sort_rows(&mut rows, &query.sort);

        let skip = query.skip.map_or(0, to_usize);
        let limit = query.limit.map_or(usize::MAX, to_usize);
        let mut docs: Vec<Document> = rows
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|(doc, score)| project(&doc, &query.projection, score))
            .collect();

        if !query.populate.is_empty() {
            populate(self, &mut docs, &query.populate).await?;
        }

        tracing::debug!(
            collection = %collection.name,
            returned = docs.len(),
            "memory find"
        );
        Ok(docs)
    }

    async fn count(&self, collection: &CollectionDef, filter: &Document) -> Result<u64, StoreError> {
        let predicate = Predicate::compile(filter, &collection.text_fields)?;
        let guard = self.collections.read();
        let count = guard.get(&collection.name).map_or(0, |docs| {
            docs.iter()
                .filter(|doc| predicate.matches(doc, &mut None))
                .count()
        });
        Ok(count as u64)
    }

    async fn aggregate(
        &self,
        collection: &CollectionDef,
        pipeline: &[Document],
    ) -> Result<Vec<Document>, StoreError> {
        let stages = pipeline
            .iter()
            .map(Stage::parse)
            .collect::<Result<Vec<_>, _>>()?;

        let mut rows = self.all(&collection.name);
        for stage in stages {
            match stage {
                Stage::Match(filter) => {
                    let predicate = Predicate::compile(&filter, &collection.text_fields)?;
                    rows.retain_mut(|(doc, score)| predicate.matches(doc, score));
                }
                Stage::Sort(keys) => sort_rows(&mut rows, &keys),
                Stage::Skip(n) => {
                    let n = to_usize(n).min(rows.len());
                    rows.drain(..n);
                }
                Stage::Limit(n) => rows.truncate(to_usize(n)),
                Stage::Project(projection) => {
                    for (doc, score) in rows.iter_mut() {
                        *doc = project(doc, &projection, *score);
                    }
                }
                Stage::Count(field) => {
                    let mut counted = Document::new();
                    counted.insert(field, json!(rows.len()));
                    rows = vec![(counted, None)];
                }
            }
        }

        Ok(rows.into_iter().map(|(doc, _)| doc).collect())
    }
}
