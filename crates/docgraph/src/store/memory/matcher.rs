//! Compiles native filter documents into predicates and evaluates them.

use std::cmp::Ordering;

use regex::{Regex, RegexBuilder};
use serde_json::Value;

use super::text::TextMatcher;
use crate::store::StoreError;
use crate::store::document::{compare_values, lookup};
use crate::store::query::{Document, TextQuery, is_operator_map};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CmpOp {
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CmpOp {
    fn holds(self, ordering: Ordering) -> bool {
        match self {
            Self::Gt => ordering == Ordering::Greater,
            Self::Gte => ordering != Ordering::Less,
            Self::Lt => ordering == Ordering::Less,
            Self::Lte => ordering != Ordering::Greater,
        }
    }
}

/// A compiled filter.
#[derive(Debug, Clone)]
pub(crate) enum Predicate {
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Nor(Vec<Predicate>),
    Field { path: String, test: FieldTest },
    Text(TextMatcher),
}

/// A compiled test against the values found at one field path.
#[derive(Debug, Clone)]
pub(crate) enum FieldTest {
    Eq(Value),
    Ne(Value),
    Cmp(CmpOp, Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    All(Vec<Value>),
    Exists(bool),
    Regex(Regex),
    Size(usize),
    ElemMatchDocument(Box<Predicate>),
    ElemMatchValue(Box<FieldTest>),
    AllOf(Vec<FieldTest>),
}

impl Predicate {
    /// Compile a filter document. `text_fields` scopes `$text` clauses.
    pub(crate) fn compile(filter: &Document, text_fields: &[String]) -> Result<Self, StoreError> {
        let mut parts = Vec::with_capacity(filter.len());
        for (key, value) in filter {
            let part = match key.as_str() {
                "$and" => Predicate::And(compile_list(key, value, text_fields)?),
                "$or" => Predicate::Or(compile_list(key, value, text_fields)?),
                "$nor" => Predicate::Nor(compile_list(key, value, text_fields)?),
                "$text" => {
                    let query = TextQuery::from_clause(value)?;
                    Predicate::Text(TextMatcher::new(&query, text_fields))
                }
                other if other.starts_with('$') => {
                    return Err(StoreError::InvalidQuery(format!(
                        "unknown top-level operator '{other}'"
                    )));
                }
                path => Predicate::Field {
                    path: path.to_string(),
                    test: if is_operator_map(value) {
                        compile_operators(path, value)?
                    } else {
                        FieldTest::Eq(value.clone())
                    },
                },
            };
            parts.push(part);
        }
        Ok(Predicate::And(parts))
    }

    /// Evaluate against `doc`, recording the text score when a `$text` clause matches.
    pub(crate) fn matches(&self, doc: &Document, score: &mut Option<f64>) -> bool {
        match self {
            Self::And(parts) => parts.iter().all(|p| p.matches(doc, score)),
            Self::Or(parts) => parts.iter().any(|p| p.matches(doc, score)),
            Self::Nor(parts) => !parts.iter().any(|p| p.matches(doc, &mut None)),
            Self::Field { path, test } => test.matches(&lookup(doc, path)),
            Self::Text(matcher) => match matcher.score(doc) {
                Some(s) => {
                    *score = Some(s);
                    true
                }
                None => false,
            },
        }
    }
}

fn compile_list(
    key: &str,
    value: &Value,
    text_fields: &[String],
) -> Result<Vec<Predicate>, StoreError> {
    let items = value
        .as_array()
        .filter(|items| !items.is_empty())
        .ok_or_else(|| StoreError::InvalidQuery(format!("{key} expects a non-empty array")))?;
    items
        .iter()
        .map(|item| {
            item.as_object()
                .ok_or_else(|| StoreError::InvalidQuery(format!("{key} entries must be objects")))
                .and_then(|doc| Predicate::compile(doc, text_fields))
        })
        .collect()
}

fn compile_operators(path: &str, value: &Value) -> Result<FieldTest, StoreError> {
    let Some(ops) = value.as_object() else {
        return Ok(FieldTest::Eq(value.clone()));
    };

    let mut tests = Vec::with_capacity(ops.len());
    for (op, arg) in ops {
        let test = match op.as_str() {
            "$eq" => FieldTest::Eq(arg.clone()),
            "$ne" => FieldTest::Ne(arg.clone()),
            "$gt" => FieldTest::Cmp(CmpOp::Gt, arg.clone()),
            "$gte" => FieldTest::Cmp(CmpOp::Gte, arg.clone()),
            "$lt" => FieldTest::Cmp(CmpOp::Lt, arg.clone()),
            "$lte" => FieldTest::Cmp(CmpOp::Lte, arg.clone()),
            "$in" => FieldTest::In(expect_array(path, op, arg)?),
            "$nin" => FieldTest::Nin(expect_array(path, op, arg)?),
            "$all" => FieldTest::All(expect_array(path, op, arg)?),
            "$exists" => FieldTest::Exists(is_truthy(arg)),
            "$regex" => {
                let pattern = arg.as_str().ok_or_else(|| {
                    StoreError::InvalidQuery(format!("$regex on '{path}' expects a string"))
                })?;
                let options = ops.get("$options").and_then(Value::as_str).unwrap_or("");
                FieldTest::Regex(build_regex(pattern, options)?)
            }
            // Consumed by $regex.
            "$options" => continue,
            "$size" => FieldTest::Size(
                arg.as_u64()
                    .and_then(|n| usize::try_from(n).ok())
                    .ok_or_else(|| {
                        StoreError::InvalidQuery(format!(
                            "$size on '{path}' expects a non-negative integer"
                        ))
                    })?,
            ),
            "$elemMatch" => {
                if is_operator_map(arg) {
                    FieldTest::ElemMatchValue(Box::new(compile_operators(path, arg)?))
                } else if let Some(doc) = arg.as_object() {
                    FieldTest::ElemMatchDocument(Box::new(Predicate::compile(doc, &[])?))
                } else {
                    return Err(StoreError::InvalidQuery(format!(
                        "$elemMatch on '{path}' expects an object"
                    )));
                }
            }
            other => {
                return Err(StoreError::InvalidQuery(format!(
                    "unknown operator '{other}' on '{path}'"
                )));
            }
        };
        tests.push(test);
    }

    Ok(match tests.len() {
        1 => tests.remove(0),
        _ => FieldTest::AllOf(tests),
    })
}

fn expect_array(path: &str, op: &str, arg: &Value) -> Result<Vec<Value>, StoreError> {
    arg.as_array()
        .cloned()
        .ok_or_else(|| StoreError::InvalidQuery(format!("{op} on '{path}' expects an array")))
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64() != Some(0.0),
        Value::Null => false,
        _ => true,
    }
}

fn build_regex(pattern: &str, options: &str) -> Result<Regex, StoreError> {
    RegexBuilder::new(pattern)
        .case_insensitive(options.contains('i'))
        .multi_line(options.contains('m'))
        .dot_matches_new_line(options.contains('s'))
        .ignore_whitespace(options.contains('x'))
        .build()
        .map_err(|e| StoreError::InvalidQuery(format!("invalid regex '{pattern}': {e}")))
}

impl FieldTest {
    /// `values` are every value reachable at the field path; empty means missing.
    pub(crate) fn matches(&self, values: &[&Value]) -> bool {
        match self {
            Self::Eq(target) => eq_matches(values, target),
            Self::Ne(target) => !eq_matches(values, target),
            Self::Cmp(op, target) => candidates(values)
                .any(|c| compare_values(c, target).is_some_and(|o| op.holds(o))),
            Self::In(targets) => targets.iter().any(|t| eq_matches(values, t)),
            Self::Nin(targets) => !targets.iter().any(|t| eq_matches(values, t)),
            Self::All(targets) => {
                !targets.is_empty() && targets.iter().all(|t| eq_matches(values, t))
            }
            Self::Exists(expected) => !values.is_empty() == *expected,
            Self::Regex(re) => candidates(values).any(|c| c.as_str().is_some_and(|s| re.is_match(s))),
            Self::Size(n) => values
                .iter()
                .any(|v| v.as_array().is_some_and(|items| items.len() == *n)),
            Self::ElemMatchDocument(predicate) => values.iter().any(|v| {
                v.as_array().is_some_and(|items| {
                    items.iter().any(|item| {
                        item.as_object()
                            .is_some_and(|doc| predicate.matches(doc, &mut None))
                    })
                })
            }),
            Self::ElemMatchValue(test) => values.iter().any(|v| {
                v.as_array()
                    .is_some_and(|items| items.iter().any(|item| test.matches(&[item])))
            }),
            Self::AllOf(tests) => tests.iter().all(|t| t.matches(values)),
        }
    }
}

/// Each value plus, for arrays, each of its elements.
fn candidates<'a>(values: &'a [&'a Value]) -> impl Iterator<Item = &'a Value> + 'a {
    values.iter().flat_map(|v| {
        let elements: Box<dyn Iterator<Item = &'a Value>> = match v {
            Value::Array(items) => Box::new(items.iter()),
            _ => Box::new(std::iter::empty()),
        };
        std::iter::once(*v).chain(elements)
    })
}

fn eq_matches(values: &[&Value], target: &Value) -> bool {
    if target.is_null() && values.is_empty() {
        return true;
    }
    candidates(values).any(|c| values_equal(c, target))
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare_values(a, b) == Some(Ordering::Equal),
        _ => a == b,
    }
}
