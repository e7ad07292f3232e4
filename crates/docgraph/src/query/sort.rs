//! Sort normalization.
//!
//! | input                                   | output                 |
//! |-----------------------------------------|------------------------|
//! | `"price:desc,name:asc"`                 | price desc, name asc   |
//! | `["price:desc", "name"]`                | price desc, name asc   |
//! | `[{"field": "price", "order": -1}]`     | price desc             |
//! | `"-price"`                              | price desc             |
//! | `"price:sideways"`                      | dropped, diagnostic    |

use serde_json::Value;

use super::types::{SortEntry, SortField, SortSpec};
use crate::error::QueryError;
use crate::store::SortDirection;

/// Normalize a sort spec into ordered, de-duplicated keys.
///
/// Input order is kept. A field listed twice keeps its first occurrence.
pub fn normalize_sort(spec: &SortSpec) -> (Vec<SortField>, Vec<QueryError>) {
    let mut fields: Vec<SortField> = Vec::new();
    let mut diagnostics = Vec::new();

    let mut push = |parsed: Result<Option<SortField>, QueryError>| match parsed {
        Ok(Some(field)) => {
            if !fields.iter().any(|f| f.field == field.field) {
                fields.push(field);
            }
        }
        Ok(None) => {}
        Err(e) => diagnostics.push(e),
    };

    match spec {
        SortSpec::Text(text) => text.split(',').for_each(|part| push(parse_text(part))),
        SortSpec::List(entries) => {
            for entry in entries {
                match entry {
                    SortEntry::Text(text) => {
                        text.split(',').for_each(|part| push(parse_text(part)));
                    }
                    SortEntry::Record { field, order } => push(parse_record(field, order.as_ref())),
                }
            }
        }
    }

    (fields, diagnostics)
}

/// Parse `field`, `-field` or `field:direction`.
fn parse_text(part: &str) -> Result<Option<SortField>, QueryError> {
    let part = part.trim();
    if part.is_empty() {
        return Ok(None);
    }

    let Some((field, direction)) = part.split_once(':') else {
        let (field, direction) = match part.strip_prefix('-') {
            Some(field) => (field, SortDirection::Desc),
            None => (part.trim_start_matches('+'), SortDirection::Asc),
        };
        let field = field.trim();
        return Ok((!field.is_empty()).then(|| SortField::new(field, direction)));
    };

    let field = field.trim();
    if field.is_empty() {
        return Ok(None);
    }
    let direction = direction.trim();
    if direction.is_empty() {
        return Ok(Some(SortField::new(field, SortDirection::Asc)));
    }
    SortDirection::parse(direction)
        .map(|d| Some(SortField::new(field, d)))
        .ok_or_else(|| QueryError::MalformedSortDirection {
            field: field.to_string(),
            direction: direction.to_string(),
        })
}

fn parse_record(field: &str, order: Option<&Value>) -> Result<Option<SortField>, QueryError> {
    let field = field.trim();
    if field.is_empty() {
        return Ok(None);
    }
    let direction = match order {
        None | Some(Value::Null) => Some(SortDirection::Asc),
        Some(Value::String(s)) if s.trim().is_empty() => Some(SortDirection::Asc),
        Some(Value::String(s)) => SortDirection::parse(s),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(1) => Some(SortDirection::Asc),
            Some(-1) => Some(SortDirection::Desc),
            _ => None,
        },
        Some(_) => None,
    };
    direction
        .map(|d| Some(SortField::new(field, d)))
        .ok_or_else(|| QueryError::MalformedSortDirection {
            field: field.to_string(),
            direction: order.map(|o| o.to_string()).unwrap_or_default(),
        })
}
