//! Query normalization.
//!
//! Runs every per-concern normalizer once and gathers the results into
//! [`NormalizedQueryOptions`]. Each section is independent; a problem in one
//! never affects another.

use super::expand::normalize_expand;
use super::merge::merge_filters;
use super::operator::{Trust, map_filters};
use super::select::normalize_select;
use super::sort::normalize_sort;
use super::types::{GraphSettings, NormalizedQueryOptions, QueryConfig, ResolvedPagination};
use crate::registry::CollectionDef;

/// Normalize a query config against its collection.
///
/// User filters are mapped as untrusted input. Trusted defaults come from the
/// collection definition and from the config; both sets are kept, the
/// config's winning per operator key where the two constrain one field with
/// operator maps.
pub fn normalize(
    config: &QueryConfig,
    def: &CollectionDef,
    settings: &GraphSettings,
) -> NormalizedQueryOptions {
    let mut out = NormalizedQueryOptions::default();

    let user = map_filters(&config.filters, Trust::Untrusted);
    out.filters = user.clauses;
    out.diagnostics.extend(user.diagnostics);

    let collection_defaults = map_filters(&def.default_filters, Trust::Trusted);
    let config_defaults = map_filters(&config.default_filters, Trust::Trusted);
    out.default_filters = merge_filters(&collection_defaults.clauses, &config_defaults.clauses);
    out.diagnostics.extend(collection_defaults.diagnostics);
    out.diagnostics.extend(config_defaults.diagnostics);

    if let Some(sort) = &config.sort {
        let (sorting, diagnostics) = normalize_sort(sort);
        out.sorting = sorting;
        out.diagnostics.extend(diagnostics);
    }

    out.pagination = config
        .pagination
        .as_ref()
        .map(|spec| ResolvedPagination::resolve(spec, settings));

    if let Some(fields) = &config.fields {
        out.select_fields = normalize_select(fields, &def.id_field);
    }

    if let Some(expand) = &config.expand {
        let (populate, diagnostics) = normalize_expand(expand);
        out.populate = populate;
        out.diagnostics.extend(diagnostics);
    }

    out.full_text_search = config
        .full_text_search
        .clone()
        .filter(|fts| !fts.search_text.trim().is_empty());

    for field in def.restricted_fields.iter().chain(&config.restricted_fields) {
        if !out.restricted_fields.contains(field) {
            out.restricted_fields.push(field.clone());
        }
    }

    out
}
