//! Full-text search compilation.

use serde_json::{Value, json};

use super::types::FullTextSearch;
use crate::error::QueryError;
use crate::store::{Document, Projection, SortKey};

/// Name of the computed relevance field added when ordering by score.
pub const TEXT_SCORE_FIELD: &str = "score";

/// Compile a search request into a native `$text` clause value.
///
/// Blank search text compiles to nothing.
pub fn compile_text(search: &FullTextSearch) -> Option<Value> {
    let text = search.search_text.trim();
    if text.is_empty() {
        return None;
    }

    let mut clause = json!({
        "$search": text,
        "$caseSensitive": search.case_sensitive,
        "$diacriticSensitive": search.diacritic_sensitive,
    });
    if let Some(language) = search.language.as_deref().map(str::trim).filter(|l| !l.is_empty())
        && let Some(obj) = clause.as_object_mut()
    {
        obj.insert("$language".to_string(), Value::String(language.to_string()));
    }
    Some(clause)
}

/// AND the text clause into a merged filter.
///
/// The text clause lives at the top level of the filter, and a filter holds
/// at most one. A different clause already present is kept and the new one
/// is reported back as dropped.
pub fn apply_text(filter: &mut Document, clause: Value) -> Result<(), QueryError> {
    match filter.get("$text") {
        None => {
            filter.insert("$text".to_string(), clause);
            Ok(())
        }
        Some(existing) if *existing == clause => Ok(()),
        Some(_) => Err(QueryError::malformed_filter(
            "$text",
            "a text search is already enforced for this collection, search ignored",
        )),
    }
}

/// Append the relevance ordering after any explicit keys.
pub fn apply_score_sort(sort: &mut Vec<SortKey>) {
    if !sort.contains(&SortKey::TextScore) {
        sort.push(SortKey::TextScore);
    }
}

/// Add the relevance pseudo-field to a projection.
pub fn apply_score_projection(projection: &mut Projection) {
    projection.score_field = Some(TEXT_SCORE_FIELD.to_string());
}
