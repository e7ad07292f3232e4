//! Field selection normalization.
//!
//! Accepts `"a,b,-c"`, `["a", "b"]` or `{"a": 1, "c": 0}` and produces an
//! ordered, de-duplicated list where a `-` prefix marks an exclusion.

use serde_json::Value;

use super::types::SelectSpec;
use crate::registry::is_restricted_path;

/// Normalize a selection.
///
/// When any inclusion is present, exclusions are dropped, except an explicit
/// exclusion of `id_field`.
pub fn normalize_select(spec: &SelectSpec, id_field: &str) -> Vec<String> {
    let mut fields = selection_entries(spec);
    if fields.iter().any(|f| !f.starts_with('-')) {
        let id_exclusion = format!("-{id_field}");
        fields.retain(|f| !f.starts_with('-') || *f == id_exclusion);
    }
    fields
}

/// Every selection entry in order, de-duplicated, exclusions still present.
pub fn selection_entries(spec: &SelectSpec) -> Vec<String> {
    let raw: Vec<String> = match spec {
        SelectSpec::Text(text) => split_fields(text),
        SelectSpec::List(items) => items.iter().flat_map(|s| split_fields(s)).collect(),
        SelectSpec::Map(map) => map
            .iter()
            .filter_map(|(field, flag)| {
                let field = field.trim();
                if field.is_empty() {
                    return None;
                }
                Some(if is_inclusion(flag) {
                    field.to_string()
                } else {
                    format!("-{}", field.trim_start_matches('-'))
                })
            })
            .collect(),
    };

    let mut fields: Vec<String> = Vec::with_capacity(raw.len());
    for field in raw {
        if !fields.contains(&field) {
            fields.push(field);
        }
    }
    fields
}

/// Split a comma-separated field list, trimming entries and skipping blanks.
pub fn split_fields(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != "-")
        .map(str::to_string)
        .collect()
}

/// Remove restricted fields from a selection and make sure they stay hidden.
///
/// Inclusions of restricted fields are dropped. When no inclusion is left the
/// selection falls back to exclusion mode and every restricted field is
/// excluded explicitly.
pub fn restrict_selection(fields: Vec<String>, restricted: &[String]) -> Vec<String> {
    if restricted.is_empty() {
        return fields;
    }
    let mut kept: Vec<String> = fields
        .into_iter()
        .filter(|f| f.starts_with('-') || !is_restricted_path(f, restricted))
        .collect();
    if !kept.iter().any(|f| !f.starts_with('-')) {
        for field in restricted {
            let exclusion = format!("-{field}");
            if !kept.contains(&exclusion) {
                kept.push(exclusion);
            }
        }
    }
    kept
}

fn is_inclusion(flag: &Value) -> bool {
    match flag {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64() != Some(0.0),
        Value::String(s) => !matches!(s.trim(), "0" | "false"),
        Value::Null => false,
        _ => true,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn select(value: Value) -> Vec<String> {
        normalize_select(&serde_json::from_value(value).unwrap(), "_id")
    }

    #[test]
    fn shapes_agree() {
        let expected = vec!["name".to_string(), "email".to_string()];
        assert_eq!(select(json!("name, email")), expected);
        assert_eq!(select(json!(["name", "email"])), expected);
        assert_eq!(select(json!({"name": 1, "email": true})), expected);
    }

    #[test]
    fn exclusions() {
        assert_eq!(select(json!("-password,-token")), vec!["-password", "-token"]);
        assert_eq!(select(json!({"password": 0, "token": false})), vec!["-password", "-token"]);
    }

    #[test]
    fn inclusion_wins_except_identity() {
        assert_eq!(select(json!("name,-password")), vec!["name"]);
        assert_eq!(select(json!("name,-_id,-password")), vec!["name", "-_id"]);
    }

    #[test]
    fn duplicates_and_blanks() {
        assert_eq!(select(json!("a,,a, b ,-,b")), vec!["a", "b"]);
        assert!(select(json!("")).is_empty());
    }

    #[test]
    fn restricted_fields_stay_hidden() {
        let restricted = vec!["password".to_string()];
        assert_eq!(
            restrict_selection(select(json!("name,password,password.hash")), &restricted),
            vec!["name"]
        );
        assert_eq!(
            restrict_selection(select(json!("password")), &restricted),
            vec!["-password"]
        );
        assert_eq!(restrict_selection(Vec::new(), &restricted), vec!["-password"]);
        assert_eq!(
            restrict_selection(select(json!("-password,-email")), &restricted),
            vec!["-password", "-email"]
        );
        assert_eq!(restrict_selection(select(json!("a")), &[]), vec!["a"]);
    }

    #[test]
    fn idempotent() {
        for input in [json!("b,a,-_id,-c,a"), json!({"x": 0, "y": 0}), json!(["q"])] {
            let once = select(input);
            let twice = normalize_select(&SelectSpec::List(once.clone()), "_id");
            assert_eq!(once, twice);
        }
    }
}
