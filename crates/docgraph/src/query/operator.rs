//! Filter operator mapping.
//!
//! Filters arrive as a flat map whose keys follow the `field_operator`
//! convention (`age_gte`, `tags_in`, `price_between`). A bare field is an
//! equality test. The key is split at its last underscore; an unrecognized
//! suffix means the whole key is a field name. A field literally named like
//! `price_gte` therefore cannot be filtered by equality through this form.

use serde_json::{Number, Value, json};

use crate::error::QueryError;
use crate::store::{Document, is_operator_map};

/// Operators reachable through a key suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Nin,
    All,
    Exists,
    Regex,
    Size,
    ElemMatch,
}

impl FilterOperator {
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        Some(match suffix {
            "eq" => Self::Eq,
            "ne" => Self::Ne,
            "gt" => Self::Gt,
            "gte" => Self::Gte,
            "lt" => Self::Lt,
            "lte" => Self::Lte,
            "in" => Self::In,
            "nin" => Self::Nin,
            "all" => Self::All,
            "exists" => Self::Exists,
            "regex" => Self::Regex,
            "size" => Self::Size,
            "elemMatch" | "elemmatch" => Self::ElemMatch,
            _ => return None,
        })
    }

    /// The operator behind a native key such as `$gte`.
    pub fn from_native(key: &str) -> Option<Self> {
        key.strip_prefix('$').and_then(Self::from_suffix)
    }

    /// The native operator key.
    pub fn native(self) -> &'static str {
        match self {
            Self::Eq => "$eq",
            Self::Ne => "$ne",
            Self::Gt => "$gt",
            Self::Gte => "$gte",
            Self::Lt => "$lt",
            Self::Lte => "$lte",
            Self::In => "$in",
            Self::Nin => "$nin",
            Self::All => "$all",
            Self::Exists => "$exists",
            Self::Regex => "$regex",
            Self::Size => "$size",
            Self::ElemMatch => "$elemMatch",
        }
    }
}

/// Operator parsed from a filter key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOperator {
    Native(FilterOperator),
    /// Expands into `$gte` + `$lte`.
    Between,
}

/// Split a filter key into field and operator.
pub fn parse_key(key: &str) -> (&str, Option<KeyOperator>) {
    if let Some((field, suffix)) = key.rsplit_once('_')
        && !field.is_empty()
    {
        if suffix == "between" {
            return (field, Some(KeyOperator::Between));
        }
        if let Some(op) = FilterOperator::from_suffix(suffix) {
            return (field, Some(KeyOperator::Native(op)));
        }
    }
    (key, None)
}

/// Where a filter map came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trust {
    /// Caller-enforced defaults: may carry `$and` / `$or` / `$nor`.
    Trusted,
    /// Client input: operator keys outside the known set are dropped.
    Untrusted,
}

/// Operators a client may use inside a native operator map.
const CLIENT_OPERATORS: &[&str] = &[
    "$eq", "$ne", "$gt", "$gte", "$lt", "$lte", "$in", "$nin", "$all", "$exists", "$regex",
    "$options", "$size", "$elemMatch",
];

const LOGICAL_KEYS: &[&str] = &["$and", "$or", "$nor"];

/// Native clauses plus the problems found building them.
#[derive(Debug, Default)]
pub struct MappedFilters {
    pub clauses: Document,
    pub diagnostics: Vec<QueryError>,
}

/// Translate a `field_operator` filter map into native clauses.
///
/// Several keys on one field fold into a single operator map, so
/// `price_gte` + `price_lte` become `{"price": {"$gte": .., "$lte": ..}}`.
/// Malformed values drop their clause and are reported as diagnostics.
pub fn map_filters(filters: &Document, trust: Trust) -> MappedFilters {
    let mut out = MappedFilters::default();

    for (key, value) in filters {
        if key.starts_with('$') {
            if trust == Trust::Trusted && LOGICAL_KEYS.contains(&key.as_str()) {
                out.clauses.insert(key.clone(), value.clone());
            } else {
                out.diagnostics.push(QueryError::malformed_filter(
                    key,
                    "operator keys are not accepted as filter fields",
                ));
            }
            continue;
        }

        match parse_key(key) {
            (field, None) => {
                if trust == Trust::Untrusted
                    && is_operator_map(value)
                    && let Some(bad) = unknown_operator(value)
                {
                    out.diagnostics.push(QueryError::malformed_filter(
                        key,
                        format!("unsupported operator '{bad}'"),
                    ));
                    continue;
                }
                if let Some(ops) = value.as_object().filter(|_| is_operator_map(value)) {
                    for (op, arg) in ops {
                        match FilterOperator::from_native(op) {
                            Some(native) => {
                                apply_operator(&mut out, &format!("{key}.{op}"), field, native, arg);
                            }
                            None => fold_operator(&mut out.clauses, field, op, arg.clone()),
                        }
                    }
                } else {
                    fold_equality(&mut out.clauses, field, value.clone());
                }
            }
            (field, Some(KeyOperator::Between)) => match between_bounds(value) {
                Ok((min, max)) => {
                    fold_operator(&mut out.clauses, field, "$gte", min);
                    fold_operator(&mut out.clauses, field, "$lte", max);
                }
                Err(reason) => out
                    .diagnostics
                    .push(QueryError::malformed_filter(key, reason)),
            },
            (field, Some(KeyOperator::Native(op))) => {
                apply_operator(&mut out, key, field, op, value);
            }
        }
    }

    out
}

/// Coerce one operator argument and fold it into `field`'s clause, or record
/// why it was dropped.
fn apply_operator(
    out: &mut MappedFilters,
    key: &str,
    field: &str,
    op: FilterOperator,
    value: &Value,
) {
    match coerce(op, value) {
        Ok(Coerced::Single(native)) => {
            fold_operator(&mut out.clauses, field, op.native(), native);
        }
        Ok(Coerced::Regex { pattern, options }) => {
            fold_operator(&mut out.clauses, field, "$regex", Value::String(pattern));
            if let Some(options) = options {
                fold_operator(&mut out.clauses, field, "$options", Value::String(options));
            }
        }
        Err(reason) => out
            .diagnostics
            .push(QueryError::malformed_filter(key, reason)),
    }
}

fn unknown_operator(value: &Value) -> Option<&str> {
    value
        .as_object()?
        .keys()
        .find(|k| !CLIENT_OPERATORS.contains(&k.as_str()))
        .map(String::as_str)
}

/// Add an equality test for `field`.
///
/// A second, different equality on the same field becomes `$all`, which holds
/// only when both values match.
fn fold_equality(clauses: &mut Document, field: &str, value: Value) {
    match clauses.get_mut(field) {
        None => {
            clauses.insert(field.to_string(), value);
        }
        Some(existing) if is_operator_map(existing) => {
            if let Some(ops) = existing.as_object_mut() {
                fold_eq_into_ops(ops, value);
            }
        }
        Some(existing) => {
            if *existing != value {
                let first = existing.take();
                *existing = json!({ "$all": [first, value] });
            }
        }
    }
}

fn fold_eq_into_ops(ops: &mut Document, value: Value) {
    match ops.get("$eq").cloned() {
        None => {
            ops.insert("$eq".to_string(), value);
        }
        Some(first) if first == value => {}
        Some(_) => {
            let all = ops
                .entry("$all")
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(items) = all {
                items.push(value);
            }
        }
    }
}

/// Add `op: value` to `field`'s operator map. A later value for the same
/// operator replaces the earlier one.
fn fold_operator(clauses: &mut Document, field: &str, op: &str, value: Value) {
    if op == "$eq" {
        fold_equality(clauses, field, value);
        return;
    }

    let entry = clauses
        .entry(field.to_string())
        .or_insert_with(|| Value::Object(Document::new()));
    if !is_operator_map(entry) && !entry.as_object().is_some_and(Document::is_empty) {
        let literal = entry.take();
        *entry = json!({ "$eq": literal });
    }
    if let Some(ops) = entry.as_object_mut() {
        ops.insert(op.to_string(), value);
    }
}

enum Coerced {
    Single(Value),
    Regex {
        pattern: String,
        options: Option<String>,
    },
}

fn coerce(op: FilterOperator, value: &Value) -> Result<Coerced, String> {
    use FilterOperator::*;

    Ok(Coerced::Single(match op {
        Eq | Ne => value.clone(),
        Gt | Gte | Lt | Lte => match value {
            Value::String(s) => parse_number(s).unwrap_or_else(|| value.clone()),
            other => other.clone(),
        },
        In | Nin | All => match value {
            Value::String(s) => Value::Array(
                s.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| Value::String(s.to_string()))
                    .collect(),
            ),
            Value::Array(_) => value.clone(),
            other => Value::Array(vec![other.clone()]),
        },
        Exists => Value::Bool(string_form(value).eq_ignore_ascii_case("true")),
        Regex => {
            let raw = value
                .as_str()
                .ok_or_else(|| "regex filters expect a string".to_string())?;
            let (pattern, options) = split_regex_literal(raw);
            let mut builder = regex::RegexBuilder::new(&pattern);
            builder.case_insensitive(options.as_deref().is_some_and(|o| o.contains('i')));
            builder
                .build()
                .map_err(|e| format!("invalid regular expression: {e}"))?;
            return Ok(Coerced::Regex { pattern, options });
        }
        Size => {
            let n = match value {
                Value::Number(n) => n.as_u64(),
                Value::String(s) => s.trim().parse::<u64>().ok(),
                _ => None,
            };
            Value::from(n.ok_or_else(|| "size expects a non-negative integer".to_string())?)
        }
        ElemMatch => match value {
            Value::Object(_) => value.clone(),
            Value::String(s) => match serde_json::from_str::<Value>(s) {
                Ok(parsed @ Value::Object(_)) => parsed,
                _ => return Err("elemMatch expects a JSON object".to_string()),
            },
            _ => return Err("elemMatch expects a JSON object".to_string()),
        },
    }))
}

/// `/pattern/flags` → (`pattern`, `flags`); anything else is a bare pattern.
fn split_regex_literal(raw: &str) -> (String, Option<String>) {
    if let Some(body) = raw.strip_prefix('/')
        && let Some((pattern, flags)) = body.rsplit_once('/')
        && flags.chars().all(|c| matches!(c, 'i' | 'm' | 's' | 'x'))
    {
        let flags = (!flags.is_empty()).then(|| flags.to_string());
        return (pattern.to_string(), flags);
    }
    (raw.to_string(), None)
}

/// Min and max of a two-element list or `"a,b"` string, in either order.
fn between_bounds(value: &Value) -> Result<(Value, Value), String> {
    let parts: Vec<Value> = match value {
        Value::Array(items) => items.clone(),
        Value::String(s) => s
            .split(',')
            .map(|p| Value::String(p.trim().to_string()))
            .collect(),
        _ => return Err("between expects two values".to_string()),
    };
    if parts.len() != 2 {
        return Err(format!("between expects two values, got {}", parts.len()));
    }

    let numbers: Vec<Value> = parts
        .iter()
        .map(|p| match p {
            Value::Number(_) => Some(p.clone()),
            Value::String(s) => parse_number(s),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| "between expects numeric bounds".to_string())?;

    let (a, b) = (&numbers[0], &numbers[1]);
    let (af, bf) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
    if af <= bf {
        Ok((a.clone(), b.clone()))
    } else {
        Ok((b.clone(), a.clone()))
    }
}

/// A number for numeric-looking strings.
fn parse_number(s: &str) -> Option<Value> {
    let s = s.trim();
    if let Ok(i) = s.parse::<i64>() {
        return Some(Value::from(i));
    }
    s.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

fn string_form(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
