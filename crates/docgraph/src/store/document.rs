//! Helpers for working with JSON documents: dotted paths, value ordering and
//! projection. Shared by every backend so results look the same regardless of
//! where they came from.

use std::cmp::Ordering;

use chrono::DateTime;
use serde_json::Value;

use super::query::{Document, Projection, ProjectionFields};

/// Get the value at a dotted path without descending into arrays.
pub fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = doc.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Resolve every value reachable at a dotted path.
///
/// Arrays met on the way are traversed element-wise, so `items.sku` over
/// `{"items": [{"sku": "a"}, {"sku": "b"}]}` yields both SKUs. A numeric
/// segment also indexes into an array. Missing paths yield nothing.
pub fn lookup<'a>(doc: &'a Document, path: &str) -> Vec<&'a Value> {
    let mut segments = path.split('.');
    let Some(first) = segments.next() else {
        return Vec::new();
    };
    let mut current: Vec<&Value> = doc.get(first).into_iter().collect();

    for segment in segments {
        let mut next = Vec::new();
        for value in current {
            match value {
                Value::Object(map) => next.extend(map.get(segment)),
                Value::Array(items) => {
                    if let Ok(index) = segment.parse::<usize>() {
                        next.extend(items.get(index));
                    }
                    for item in items {
                        if let Value::Object(map) = item {
                            next.extend(map.get(segment));
                        }
                    }
                }
                _ => {}
            }
        }
        current = next;
    }

    current
}

/// Set the value at a dotted path, creating intermediate objects as needed.
pub fn set_path(doc: &mut Document, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            doc.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = doc
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Document::new()));
            if !entry.is_object() {
                *entry = Value::Object(Document::new());
            }
            if let Value::Object(child) = entry {
                set_path(child, rest, value);
            }
        }
    }
}

/// Remove the value at a dotted path, keeping the order of remaining keys.
pub fn remove_path(doc: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            *doc = std::mem::take(doc)
                .into_iter()
                .filter(|(key, _)| key != path)
                .collect();
        }
        Some((head, rest)) => match doc.get_mut(head) {
            Some(Value::Object(child)) => remove_path(child, rest),
            Some(Value::Array(items)) => {
                for item in items {
                    if let Value::Object(child) = item {
                        remove_path(child, rest);
                    }
                }
            }
            _ => {}
        },
    }
}

/// Apply a projection to a document, attaching the relevance score if asked.
pub fn project(doc: &Document, projection: &Projection, score: Option<f64>) -> Document {
    let mut out = match &projection.fields {
        ProjectionFields::All => doc.clone(),
        ProjectionFields::Include(fields) => {
            let mut out = Document::new();
            for field in fields {
                if let Some(value) = get_path(doc, field) {
                    set_path(&mut out, field, value.clone());
                }
            }
            out
        }
        ProjectionFields::Exclude(fields) => {
            let mut out = doc.clone();
            for field in fields {
                remove_path(&mut out, field);
            }
            out
        }
    };

    if let Some(ref field) = projection.score_field {
        let value = score
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null);
        out.insert(field.clone(), value);
    }

    out
}

/// Stable string key for a JSON value, used to match references.
pub fn value_key(value: &Value) -> String {
    value.to_string()
}

/// Compare two values of the same kind.
///
/// Numbers compare numerically; strings compare as instants when both parse as
/// RFC 3339 timestamps and lexically otherwise; booleans compare with
/// `false < true`. Values of different kinds are not comparable.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(compare_strings(x, y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn compare_strings(a: &str, b: &str) -> Ordering {
    match (DateTime::parse_from_rfc3339(a), DateTime::parse_from_rfc3339(b)) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}

/// Rank of a value's kind in the cross-type sort order.
fn kind_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 5,
    }
}

/// Total order over JSON values used for sorting.
///
/// Missing fields sort as null, before every other kind.
pub fn sort_order(a: &Value, b: &Value) -> Ordering {
    let rank = kind_rank(a).cmp(&kind_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }
    match (a, b) {
        (Value::Array(x), Value::Array(y)) => x
            .iter()
            .zip(y.iter())
            .map(|(l, r)| sort_order(l, r))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        (Value::Object(_), Value::Object(_)) => a.to_string().cmp(&b.to_string()),
        _ => compare_values(a, b).unwrap_or(Ordering::Equal),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn lookup_traverses_arrays_of_subdocuments() {
        let d = doc(json!({"items": [{"sku": "a"}, {"sku": "b"}, {"qty": 1}]}));
        let skus: Vec<&Value> = lookup(&d, "items.sku");
        assert_eq!(skus, vec![&json!("a"), &json!("b")]);
        assert!(lookup(&d, "missing.path").is_empty());
    }

    #[test]
    fn lookup_numeric_index() {
        let d = doc(json!({"tags": ["x", "y"]}));
        assert_eq!(lookup(&d, "tags.1"), vec![&json!("y")]);
    }

    #[test]
    fn set_and_remove_nested_paths() {
        let mut d = Document::new();
        set_path(&mut d, "meta.source", json!("wire"));
        set_path(&mut d, "meta.rank", json!(3));
        assert_eq!(Value::Object(d.clone()), json!({"meta": {"source": "wire", "rank": 3}}));

        remove_path(&mut d, "meta.source");
        assert_eq!(Value::Object(d), json!({"meta": {"rank": 3}}));
    }

    #[test]
    fn remove_keeps_key_order() {
        let mut d = doc(json!({"a": 1, "b": 2, "c": 3}));
        remove_path(&mut d, "a");
        let keys: Vec<&String> = d.keys().collect();
        assert_eq!(keys, vec!["b", "c"]);
    }

    #[test]
    fn project_include_nested() {
        let d = doc(json!({"_id": 1, "name": "Ada", "meta": {"a": 1, "b": 2}}));
        let p = Projection {
            fields: ProjectionFields::Include(vec!["_id".into(), "meta.b".into()]),
            score_field: None,
        };
        assert_eq!(Value::Object(project(&d, &p, None)), json!({"_id": 1, "meta": {"b": 2}}));
    }

    #[test]
    fn project_exclude_and_score() {
        let d = doc(json!({"_id": 1, "name": "Ada", "password": "x"}));
        let p = Projection {
            fields: ProjectionFields::Exclude(vec!["password".into()]),
            score_field: Some("score".into()),
        };
        assert_eq!(
            Value::Object(project(&d, &p, Some(2.0))),
            json!({"_id": 1, "name": "Ada", "score": 2.0})
        );
    }

    #[test]
    fn compare_dates_as_instants() {
        let earlier = json!("2024-01-01T10:00:00+02:00");
        let later = json!("2024-01-01T09:00:00Z");
        assert_eq!(compare_values(&earlier, &later), Some(Ordering::Less));
    }

    #[test]
    fn compare_mixed_kinds_is_undefined() {
        assert_eq!(compare_values(&json!(1), &json!("1")), None);
        assert_eq!(compare_values(&json!(2), &json!(10)), Some(Ordering::Less));
    }

    #[test]
    fn sort_order_places_null_first_and_bools_last() {
        let mut values = vec![json!(true), json!("b"), json!(3), Value::Null, json!(1)];
        values.sort_by(sort_order);
        assert_eq!(values, vec![Value::Null, json!(1), json!(3), json!("b"), json!(true)]);
    }
}
