//! Relation expansion normalization.
//!
//! Grammar: a comma-separated list of relation paths, each optionally
//! followed by one parenthesized sub-selection.
//!
//! ```text
//! author(name,email),tags     -> author [name, email], tags
//! author(profile(bio))        -> dropped, nesting too deep
//! author(name                 -> dropped, unbalanced
//! ```

use super::select::{selection_entries, split_fields};
use super::types::{ExpandEntry, ExpandSpec, PopulateOption};
use crate::error::QueryError;

/// Normalize an expansion spec.
///
/// Paths keep the position of their first mention; a later mention that
/// carries a sub-selection replaces the earlier sub-selection.
pub fn normalize_expand(spec: &ExpandSpec) -> (Vec<PopulateOption>, Vec<QueryError>) {
    let mut options: Vec<PopulateOption> = Vec::new();
    let mut diagnostics = Vec::new();

    let mut push = |parsed: Result<Option<PopulateOption>, QueryError>| match parsed {
        Ok(Some(option)) => {
            match options.iter_mut().find(|o| o.path == option.path) {
                Some(existing) => {
                    if option.select.is_some() {
                        existing.select = option.select;
                    }
                }
                None => options.push(option),
            }
        }
        Ok(None) => {}
        Err(e) => diagnostics.push(e),
    };

    match spec {
        ExpandSpec::Text(text) => split_top_level(text)
            .into_iter()
            .for_each(|e| push(e.and_then(parse_entry))),
        ExpandSpec::List(entries) => {
            for entry in entries {
                match entry {
                    ExpandEntry::Text(text) => split_top_level(text)
                        .into_iter()
                        .for_each(|e| push(e.and_then(parse_entry))),
                    ExpandEntry::Record { path, select } => {
                        let path = path.trim();
                        if path.is_empty() {
                            continue;
                        }
                        if !is_valid_path(path) {
                            push(Err(QueryError::malformed_expansion(path, "invalid relation path")));
                            continue;
                        }
                        let select = select
                            .as_ref()
                            .map(selection_entries)
                            .filter(|fields| !fields.is_empty());
                        push(Ok(Some(PopulateOption {
                            path: path.to_string(),
                            select,
                        })));
                    }
                }
            }
        }
    }

    (options, diagnostics)
}

/// Split at commas outside parentheses.
///
/// An entry whose parentheses do not balance comes back as an error; the
/// scan resynchronizes at the next top-level comma.
fn split_top_level(text: &str) -> Vec<Result<&str, QueryError>> {
    top_level_entries(text).into_iter().map(balanced).collect()
}

/// Raw entries of a compact expansion string, split at commas outside
/// parentheses. A stray `)` does not open a new level.
pub(crate) fn top_level_entries(text: &str) -> Vec<&str> {
    let mut entries = Vec::new();
    let mut depth: u32 = 0;
    let mut start = 0;

    for (i, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                entries.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    entries.push(&text[start..]);

    entries
}

/// The relation path an entry names, before any sub-selection.
pub(crate) fn entry_path(entry: &str) -> &str {
    entry.split('(').next().unwrap_or(entry).trim()
}

fn balanced(entry: &str) -> Result<&str, QueryError> {
    let mut depth: i32 = 0;
    for c in entry.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    break;
                }
            }
            _ => {}
        }
    }
    if depth != 0 {
        Err(QueryError::malformed_expansion(entry.trim(), "unbalanced parentheses"))
    } else {
        Ok(entry)
    }
}

/// Parse one balanced entry: `path` or `path(a,b)`.
fn parse_entry(entry: &str) -> Result<Option<PopulateOption>, QueryError> {
    let entry = entry.trim();
    if entry.is_empty() {
        return Ok(None);
    }

    let Some((path, rest)) = entry.split_once('(') else {
        if !is_valid_path(entry) {
            return Err(QueryError::malformed_expansion(entry, "invalid relation path"));
        }
        return Ok(Some(PopulateOption::new(entry)));
    };

    let path = path.trim();
    let Some(inner) = rest.trim_end().strip_suffix(')') else {
        return Err(QueryError::malformed_expansion(
            entry,
            "unexpected text after sub-selection",
        ));
    };
    if inner.contains('(') || inner.contains(')') {
        return Err(QueryError::malformed_expansion(
            entry,
            "only one level of nesting is supported",
        ));
    }
    if !is_valid_path(path) {
        return Err(QueryError::malformed_expansion(entry, "invalid relation path"));
    }

    let mut fields: Vec<String> = Vec::new();
    for field in split_fields(inner) {
        if !fields.contains(&field) {
            fields.push(field);
        }
    }
    Ok(Some(PopulateOption {
        path: path.to_string(),
        select: (!fields.is_empty()).then_some(fields),
    }))
}

fn is_valid_path(path: &str) -> bool {
    !path.is_empty()
        && path
            .split('.')
            .all(|seg| !seg.is_empty() && seg.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
}
