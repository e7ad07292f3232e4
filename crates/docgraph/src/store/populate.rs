//! Batched relation population shared by the store backends.
//!
//! For each clause: collect the distinct reference values across all parent
//! documents, load the referenced records with a single `$in` query, then
//! replace each reference in place with the record it points to.

use std::collections::{HashMap, HashSet};

use serde_json::{Value, json};

use super::document::{get_path, remove_path, set_path, value_key};
use super::query::{Document, FindQuery, PopulateClause, ProjectionFields};
use super::{DocumentStore, StoreError};
use crate::query::merge_filters;
use crate::registry::CollectionDef;

/// Replace relation references in `docs` with the records they reference.
///
/// A scalar reference becomes the matching record, or `null` when the target
/// no longer exists or is hidden by the target's default filters. An array of references keeps its order and drops
/// entries whose target is missing.
pub async fn populate(
    store: &dyn DocumentStore,
    docs: &mut [Document],
    clauses: &[PopulateClause],
) -> Result<(), StoreError> {
    for clause in clauses {
        // 1. Collect and deduplicate reference values
        let mut seen = HashSet::new();
        let mut references = Vec::new();
        for doc in docs.iter() {
            for value in reference_values(doc, &clause.path) {
                if seen.insert(value_key(value)) {
                    references.push(value.clone());
                }
            }
        }

        if references.is_empty() {
            continue;
        }

        // 2. One batched query for every referenced record
        let mut projection = clause.projection.clone();
        let strip_foreign = match &projection.fields {
            ProjectionFields::All => false,
            ProjectionFields::Include(fields) => !fields.contains(&clause.foreign_field),
            ProjectionFields::Exclude(fields) => fields.contains(&clause.foreign_field),
        };
        projection.ensure_included(&clause.foreign_field);

        let mut by_reference = Document::new();
        by_reference.insert(clause.foreign_field.clone(), json!({ "$in": references }));
        let filter = merge_filters(&clause.filter, &by_reference);
        let query = FindQuery {
            filter,
            projection,
            ..Default::default()
        };

        let target = CollectionDef::new(&clause.from);
        let children = store.find(&target, &query).await?;
        tracing::debug!(
            path = %clause.path,
            from = %clause.from,
            references = references.len(),
            loaded = children.len(),
            "populated relation"
        );

        // 3. Index children by the field the references match
        let mut by_key: HashMap<String, Value> = HashMap::with_capacity(children.len());
        for mut child in children {
            let Some(key) = get_path(&child, &clause.foreign_field).map(value_key) else {
                continue;
            };
            if strip_foreign {
                remove_path(&mut child, &clause.foreign_field);
            }
            by_key.entry(key).or_insert(Value::Object(child));
        }

        // 4. Swap references for records
        for doc in docs.iter_mut() {
            let Some(current) = get_path(doc, &clause.path) else {
                continue;
            };
            let replacement = match current {
                Value::Array(items) => Value::Array(
                    items
                        .iter()
                        .filter_map(|item| by_key.get(&value_key(item)).cloned())
                        .collect(),
                ),
                Value::Null => Value::Null,
                scalar => by_key
                    .get(&value_key(scalar))
                    .cloned()
                    .unwrap_or(Value::Null),
            };
            set_path(doc, &clause.path, replacement);
        }
    }

    Ok(())
}

/// Reference values stored at `path`: the scalar itself, or each scalar in an array.
fn reference_values<'a>(doc: &'a Document, path: &str) -> Vec<&'a Value> {
    match get_path(doc, path) {
        Some(Value::Array(items)) => items.iter().filter(|v| is_reference(v)).collect(),
        Some(value) if is_reference(value) => vec![value],
        _ => Vec::new(),
    }
}

fn is_reference(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Number(_))
}
