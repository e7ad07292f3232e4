//! Request-to-config adapter.
//!
//! Turns a flat query-string map, or a JSON request body, into a
//! [`QueryConfig`]. Reserved parameters configure paging, sorting, selection,
//! expansion and search; every other parameter is a filter. Restricted fields
//! are stripped here, before the query engine sees the request.

use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;
use serde_json::Value;

use crate::query::expand::{entry_path, top_level_entries};
use crate::query::select::{restrict_selection, selection_entries};
use crate::query::{
    EntityRef, ExpandEntry, ExpandSpec, FullTextSearch, PaginationSpec, QueryConfig, SelectSpec,
    SortEntry, SortSpec, parse_key,
};
use crate::registry::{CollectionDef, is_restricted_path};
use crate::store::Document;

/// Query parameters that are never treated as filters.
pub const RESERVED_PARAMS: &[&str] = &[
    "page",
    "limit",
    "offset",
    "cursor",
    "sort",
    "fields",
    "select",
    "expand",
    "populate",
    "search",
    "q",
    "language",
    "caseSensitive",
    "diacriticSensitive",
    "sortByScore",
];

/// Build a query config from query-string parameters.
///
/// Query-string requests are always paginated.
pub fn config_from_params(
    entity: impl Into<EntityRef>,
    params: &HashMap<String, String>,
    def: &CollectionDef,
) -> QueryConfig {
    let get = |names: &[&str]| {
        names
            .iter()
            .find_map(|n| params.get(*n))
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    };
    let number = |name: &str| get(&[name]).and_then(|v| v.parse::<u64>().ok());

    // Sorted for a stable filter order.
    let filters: BTreeMap<&String, &String> = params
        .iter()
        .filter(|(k, _)| !RESERVED_PARAMS.contains(&k.as_str()))
        .collect();

    let mut config = QueryConfig::new(entity).with_pagination(PaginationSpec {
        page: number("page"),
        limit: number("limit"),
        offset: number("offset"),
        cursor: get(&["cursor"]).map(str::to_string),
    });
    config.filters = filters
        .into_iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    config.sort = get(&["sort"]).map(|s| SortSpec::Text(s.to_string()));
    config.fields = get(&["fields", "select"]).map(|s| SelectSpec::Text(s.to_string()));
    config.expand = get(&["expand", "populate"]).map(|s| ExpandSpec::Text(s.to_string()));
    config.full_text_search = get(&["search", "q"]).map(|text| FullTextSearch {
        search_text: text.to_string(),
        language: get(&["language"]).map(str::to_string),
        case_sensitive: get(&["caseSensitive"]).is_some_and(parse_flag),
        diacritic_sensitive: get(&["diacriticSensitive"]).is_some_and(parse_flag),
        sort_by_score: get(&["sortByScore"]).is_some_and(parse_flag),
    });

    enforce_restrictions(config, def)
}

/// JSON body accepted by the query endpoint.
///
/// Default filters are server-side only and are not accepted here.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct QueryRequest {
    #[serde(default)]
    pub filters: Document,
    #[serde(default)]
    pub sort: Option<SortSpec>,
    #[serde(default)]
    pub pagination: Option<PaginationSpec>,
    #[serde(default, alias = "select")]
    pub fields: Option<SelectSpec>,
    #[serde(default, alias = "populate")]
    pub expand: Option<ExpandSpec>,
    #[serde(default, alias = "search")]
    pub full_text_search: Option<FullTextSearch>,
}

impl QueryRequest {
    pub fn into_config(self, entity: impl Into<EntityRef>, def: &CollectionDef) -> QueryConfig {
        let mut config = QueryConfig::new(entity).with_filters(self.filters);
        config.sort = self.sort;
        config.pagination = self.pagination;
        config.fields = self.fields;
        config.expand = self.expand;
        config.full_text_search = self.full_text_search;
        enforce_restrictions(config, def)
    }
}

/// Strip restricted fields from every client-controlled section.
///
/// Filters and sort keys on restricted fields are dropped, restricted
/// relation paths are not expanded, and the selection is rewritten so
/// restricted fields are never returned.
pub fn enforce_restrictions(mut config: QueryConfig, def: &CollectionDef) -> QueryConfig {
    for field in &def.restricted_fields {
        if !config.restricted_fields.contains(field) {
            config.restricted_fields.push(field.clone());
        }
    }
    let restricted = config.restricted_fields.clone();
    if restricted.is_empty() {
        return config;
    }
    let blocked = |field: &str| is_restricted_path(field, &restricted);

    config.filters.retain(|key, _| {
        let (field, _) = parse_key(key);
        let keep = !blocked(field) && !blocked(key);
        if !keep {
            tracing::warn!(key = %key, "dropping filter on restricted field");
        }
        keep
    });

    config.sort = config.sort.take().map(|sort| restrict_sort(sort, &blocked));

    let selection = config
        .fields
        .as_ref()
        .map(selection_entries)
        .unwrap_or_default();
    config.fields = Some(SelectSpec::List(restrict_selection(selection, &restricted)));

    config.expand = config.expand.take().map(|expand| restrict_expand(expand, &blocked));

    config
}

fn restrict_sort(sort: SortSpec, blocked: &impl Fn(&str) -> bool) -> SortSpec {
    let text_allowed = |part: &&str| {
        let field = part.trim().trim_start_matches(['-', '+']);
        let field = field.split(':').next().unwrap_or(field).trim();
        let keep = !blocked(field);
        if !keep {
            tracing::warn!(field = %field, "dropping sort on restricted field");
        }
        keep
    };
    let restrict_text = |text: &str| {
        text.split(',')
            .filter(|part| text_allowed(part))
            .collect::<Vec<_>>()
            .join(",")
    };

    match sort {
        SortSpec::Text(text) => SortSpec::Text(restrict_text(&text)),
        SortSpec::List(entries) => SortSpec::List(
            entries
                .into_iter()
                .filter_map(|entry| match entry {
                    SortEntry::Text(text) => Some(SortEntry::Text(restrict_text(&text))),
                    SortEntry::Record { field, order } => {
                        if blocked(field.trim()) {
                            tracing::warn!(field = %field, "dropping sort on restricted field");
                            None
                        } else {
                            Some(SortEntry::Record { field, order })
                        }
                    }
                })
                .collect(),
        ),
    }
}

fn restrict_expand(expand: ExpandSpec, blocked: &impl Fn(&str) -> bool) -> ExpandSpec {
    let allowed = |path: &str| {
        let keep = !blocked(path);
        if !keep {
            tracing::warn!(path = %path, "dropping expansion of restricted field");
        }
        keep
    };
    let restrict_text = |text: &str| {
        top_level_entries(text)
            .into_iter()
            .filter(|entry| allowed(entry_path(entry)))
            .collect::<Vec<_>>()
            .join(",")
    };

    match expand {
        ExpandSpec::Text(text) => ExpandSpec::Text(restrict_text(&text)),
        ExpandSpec::List(entries) => ExpandSpec::List(
            entries
                .into_iter()
                .filter_map(|entry| match entry {
                    ExpandEntry::Text(text) => Some(ExpandEntry::Text(restrict_text(&text))),
                    ExpandEntry::Record { path, select } => {
                        allowed(path.trim()).then_some(ExpandEntry::Record { path, select })
                    }
                })
                .collect(),
        ),
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}
