//! Default/user filter merging.
//!
//! Both inputs are native clause maps. The result must satisfy every default
//! constraint and every user constraint at once:
//!
//! | default             | user                 | merged                                          |
//! |---------------------|----------------------|-------------------------------------------------|
//! | `status: "active"`  | `price: {$gte: 10}`  | both keys                                       |
//! | `status: "active"`  | `status: "active"`   | `status: "active"`                              |
//! | `status: "active"`  | `status: "deleted"`  | `$and: [{status: "active"}, {status: "deleted"}]` |
//! | `age: {$gte: 18}`   | `age: {$lte: 30}`    | `age: {$gte: 18, $lte: 30}`                     |

use serde_json::{Value, json};

use crate::store::{Document, is_operator_map};

enum Resolution {
    Keep,
    Insert(Value),
    Replace(Value),
    Conjoin,
}

/// Merge trusted defaults with untrusted user clauses.
///
/// Two operator maps on one field are shallow-merged with the user winning
/// per operator key. Any other disagreement keeps both clauses verbatim as
/// `$and` conjuncts. A `$and` list already present in the defaults is
/// extended.
pub fn merge_filters(defaults: &Document, user: &Document) -> Document {
    let mut conjuncts: Vec<Value> = Vec::new();
    let mut resolutions: Vec<(&String, Resolution)> = Vec::with_capacity(user.len());

    for (field, user_value) in user {
        let resolution = match defaults.get(field) {
            _ if field.starts_with('$') => {
                conjuncts.push(json!({ field.as_str(): user_value }));
                continue;
            }
            None => Resolution::Insert(user_value.clone()),
            Some(default_value) if default_value == user_value => Resolution::Keep,
            Some(default_value) if is_operator_map(default_value) && is_operator_map(user_value) => {
                Resolution::Replace(shallow_merge(default_value, user_value))
            }
            Some(_) => Resolution::Conjoin,
        };
        resolutions.push((field, resolution));
    }

    let mut merged = Document::new();
    for (field, default_value) in defaults {
        if field == "$and" {
            continue;
        }
        match resolutions.iter().find(|(f, _)| *f == field).map(|(_, r)| r) {
            Some(Resolution::Replace(value)) => {
                merged.insert(field.clone(), value.clone());
            }
            Some(Resolution::Conjoin) => {
                let user_value = user.get(field).cloned().unwrap_or(Value::Null);
                conjuncts.push(json!({ field.as_str(): default_value }));
                conjuncts.push(json!({ field.as_str(): user_value }));
            }
            _ => {
                merged.insert(field.clone(), default_value.clone());
            }
        }
    }
    for (field, resolution) in resolutions {
        if let Resolution::Insert(value) = resolution {
            merged.insert(field.clone(), value);
        }
    }

    let mut all_of = match defaults.get("$and") {
        Some(Value::Array(existing)) => existing.clone(),
        Some(other) => vec![other.clone()],
        None => Vec::new(),
    };
    if !all_of.is_empty() || !conjuncts.is_empty() {
        all_of.extend(conjuncts);
        merged.insert("$and".to_string(), Value::Array(all_of));
    }

    merged
}

fn shallow_merge(defaults: &Value, user: &Value) -> Value {
    let mut ops = defaults.as_object().cloned().unwrap_or_default();
    if let Some(user_ops) = user.as_object() {
        for (op, value) in user_ops {
            ops.insert(op.clone(), value.clone());
        }
    }
    Value::Object(ops)
}
