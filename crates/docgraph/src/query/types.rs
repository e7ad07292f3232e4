//! Query engine types.
//!
//! Provides type definitions for the declarative query layer:
//! - QueryConfig: what the caller asks for, in any accepted shape
//! - NormalizedQueryOptions: the canonical form every later stage reads
//! - ResponseEnvelope / Metadata: what comes back

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::QueryError;
use crate::registry::CollectionHandle;
use crate::store::{Document, SortDirection};

/// Default page size when the caller does not give one.
pub const DEFAULT_PAGE_SIZE: u64 = 10;

/// Maximum page size (enforced by performance guardrails).
pub const MAX_PAGE_SIZE: u64 = 100;

/// Which collection a query targets.
#[derive(Debug, Clone)]
pub enum EntityRef {
    /// Looked up in the registry.
    ByName(String),
    /// Already resolved; passed through.
    ByHandle(CollectionHandle),
}

impl From<&str> for EntityRef {
    fn from(name: &str) -> Self {
        Self::ByName(name.to_string())
    }
}

impl From<String> for EntityRef {
    fn from(name: String) -> Self {
        Self::ByName(name)
    }
}

impl From<CollectionHandle> for EntityRef {
    fn from(handle: CollectionHandle) -> Self {
        Self::ByHandle(handle)
    }
}

/// Sort request in any accepted shape.
///
/// - `"price:desc,name:asc"`
/// - `["price:desc", "name"]`
/// - `[{"field": "price", "order": "desc"}, {"field": "name"}]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SortSpec {
    Text(String),
    List(Vec<SortEntry>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SortEntry {
    Text(String),
    Record {
        field: String,
        /// Direction token or `1` / `-1`.
        #[serde(default, alias = "direction")]
        order: Option<Value>,
    },
}

/// Field selection in any accepted shape.
///
/// - `"name,email,-password"`
/// - `["name", "email"]`
/// - `{"name": 1, "password": 0}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SelectSpec {
    Text(String),
    List(Vec<String>),
    Map(serde_json::Map<String, Value>),
}

/// Relation expansion in any accepted shape.
///
/// - `"author(name,email),tags"`
/// - `["author", {"path": "tags", "select": ["label"]}]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExpandSpec {
    Text(String),
    List(Vec<ExpandEntry>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExpandEntry {
    Text(String),
    Record {
        path: String,
        #[serde(default, alias = "fields")]
        select: Option<SelectSpec>,
    },
}

/// Requested page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationSpec {
    /// 1-based page number (default 1).
    #[serde(default)]
    pub page: Option<u64>,
    /// Page size (default 10, capped).
    #[serde(default)]
    pub limit: Option<u64>,
    /// Absolute offset; overrides `page` when present.
    #[serde(default)]
    pub offset: Option<u64>,
    /// Opaque cursor, echoed back untouched.
    #[serde(default)]
    pub cursor: Option<String>,
}

impl PaginationSpec {
    pub fn page(page: u64, limit: u64) -> Self {
        Self {
            page: Some(page),
            limit: Some(limit),
            ..Default::default()
        }
    }
}

/// Full-text search request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullTextSearch {
    #[serde(alias = "search")]
    pub search_text: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default)]
    pub diacritic_sensitive: bool,
    /// Add a relevance score field and order by it.
    #[serde(default)]
    pub sort_by_score: bool,
}

impl FullTextSearch {
    pub fn new(search_text: impl Into<String>) -> Self {
        Self {
            search_text: search_text.into(),
            ..Default::default()
        }
    }

    pub fn sorted_by_score(mut self) -> Self {
        self.sort_by_score = true;
        self
    }
}

/// A query request.
///
/// Only `filters` are merged (with `default_filters`); every other section
/// is used as given when present.
#[derive(Debug, Clone)]
pub struct QueryConfig {
    pub entity: EntityRef,
    /// User-supplied filters in `field` / `field_operator` form. Untrusted.
    pub filters: Document,
    /// Caller-enforced filters in the same form. Trusted and always applied.
    pub default_filters: Document,
    pub sort: Option<SortSpec>,
    /// `None` means "not paginated": every match is returned.
    pub pagination: Option<PaginationSpec>,
    pub fields: Option<SelectSpec>,
    pub expand: Option<ExpandSpec>,
    pub full_text_search: Option<FullTextSearch>,
    /// Fields that may never be filtered, selected, sorted or expanded.
    pub restricted_fields: Vec<String>,
}

impl QueryConfig {
    pub fn new(entity: impl Into<EntityRef>) -> Self {
        Self {
            entity: entity.into(),
            filters: Document::new(),
            default_filters: Document::new(),
            sort: None,
            pagination: None,
            fields: None,
            expand: None,
            full_text_search: None,
            restricted_fields: Vec::new(),
        }
    }

    pub fn with_filters(mut self, filters: Document) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    pub fn with_default_filters(mut self, filters: Document) -> Self {
        self.default_filters = filters;
        self
    }

    pub fn with_sort(mut self, sort: SortSpec) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn with_pagination(mut self, pagination: PaginationSpec) -> Self {
        self.pagination = Some(pagination);
        self
    }

    pub fn with_fields(mut self, fields: SelectSpec) -> Self {
        self.fields = Some(fields);
        self
    }

    pub fn with_expand(mut self, expand: ExpandSpec) -> Self {
        self.expand = Some(expand);
        self
    }

    pub fn with_full_text_search(mut self, search: FullTextSearch) -> Self {
        self.full_text_search = Some(search);
        self
    }

    pub fn with_restricted_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.restricted_fields = fields.into_iter().map(Into::into).collect();
        self
    }
}

/// Engine-wide limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphSettings {
    pub default_limit: u64,
    pub max_limit: u64,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_PAGE_SIZE,
            max_limit: MAX_PAGE_SIZE,
        }
    }
}

/// One normalized sort key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SortField {
    pub field: String,
    pub direction: SortDirection,
}

impl SortField {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }
}

/// One normalized relation expansion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PopulateOption {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub select: Option<Vec<String>>,
}

impl PopulateOption {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            select: None,
        }
    }
}

/// Resolved page window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedPagination {
    pub page: u64,
    pub limit: u64,
    pub skip: u64,
    pub offset: Option<u64>,
    pub cursor: Option<String>,
}

impl ResolvedPagination {
    /// Resolve a requested page against the engine limits.
    ///
    /// A missing or zero limit takes the default; a limit above the maximum
    /// is capped. An explicit offset wins over the page number, and the page
    /// reported is the one containing that offset.
    pub fn resolve(spec: &PaginationSpec, settings: &GraphSettings) -> Self {
        let requested = spec
            .limit
            .filter(|l| *l > 0)
            .unwrap_or(settings.default_limit)
            .max(1);
        let max_limit = settings.max_limit.max(1);
        let limit = if requested > max_limit {
            tracing::warn!(
                requested = requested,
                capped = max_limit,
                "limit exceeds maximum, capping"
            );
            max_limit
        } else {
            requested
        };

        let (page, skip) = match spec.offset {
            Some(offset) => (offset / limit + 1, offset),
            None => {
                let page = spec.page.unwrap_or(1).max(1);
                (page, (page - 1).saturating_mul(limit))
            }
        };

        Self {
            page,
            limit,
            skip,
            offset: spec.offset,
            cursor: spec.cursor.clone(),
        }
    }
}

/// Canonical query options. Nothing downstream re-parses strings.
#[derive(Debug, Default)]
pub struct NormalizedQueryOptions {
    /// Native user clauses.
    pub filters: Document,
    /// Native default clauses.
    pub default_filters: Document,
    pub sorting: Vec<SortField>,
    pub pagination: Option<ResolvedPagination>,
    pub select_fields: Vec<String>,
    pub populate: Vec<PopulateOption>,
    /// Present only when there is non-blank search text.
    pub full_text_search: Option<FullTextSearch>,
    pub restricted_fields: Vec<String>,
    /// Recoverable problems found while normalizing.
    pub diagnostics: Vec<QueryError>,
}

/// Normalized parameters echoed back in the metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryEcho {
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub filters: Document,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expand: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

/// Pagination and execution metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub total_count: u64,
    pub current_page: u64,
    pub page_size: u64,
    pub total_pages: u64,
    pub has_next_page: bool,
    pub has_prev_page: bool,
    pub execution_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    #[serde(default)]
    pub query: QueryEcho,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl Metadata {
    /// Metadata with paging calculations.
    pub fn new(total_count: u64, current_page: u64, page_size: u64) -> Self {
        let total_pages = if page_size > 0 {
            total_count.div_ceil(page_size)
        } else {
            0
        };

        Self {
            total_count,
            current_page,
            page_size,
            total_pages,
            has_next_page: current_page < total_pages,
            has_prev_page: current_page > 1,
            execution_time_ms: 0,
            cursor: None,
            query: QueryEcho::default(),
            warnings: Vec::new(),
        }
    }
}

/// Query response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub data: Vec<Document>,
    pub metadata: Metadata,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn metadata_pagination() {
        let m = Metadata::new(25, 2, 10);
        assert_eq!(m.total_pages, 3);
        assert!(m.has_next_page);
        assert!(m.has_prev_page);
    }

    #[test]
    fn metadata_first_and_last_page() {
        let first = Metadata::new(20, 1, 10);
        assert_eq!(first.total_pages, 2);
        assert!(first.has_next_page);
        assert!(!first.has_prev_page);

        let last = Metadata::new(20, 2, 10);
        assert!(!last.has_next_page);
        assert!(last.has_prev_page);
    }

    #[test]
    fn metadata_empty() {
        let m = Metadata::new(0, 1, 10);
        assert_eq!(m.total_pages, 0);
        assert!(!m.has_next_page);
        assert!(!m.has_prev_page);
        assert_eq!(Metadata::new(0, 1, 0).total_pages, 0);
    }

    #[test]
    fn metadata_serializes_camel_case() {
        let value = serde_json::to_value(Metadata::new(5, 1, 10)).unwrap();
        assert_eq!(value["totalCount"], json!(5));
        assert_eq!(value["hasNextPage"], json!(false));
        assert!(value.get("cursor").is_none());
    }

    #[test]
    fn pagination_defaults_and_cap() {
        let settings = GraphSettings::default();
        let p = ResolvedPagination::resolve(&PaginationSpec::default(), &settings);
        assert_eq!((p.page, p.limit, p.skip), (1, 10, 0));

        let p = ResolvedPagination::resolve(&PaginationSpec::page(3, 500), &settings);
        assert_eq!((p.page, p.limit, p.skip), (3, 100, 200));

        let p = ResolvedPagination::resolve(&PaginationSpec::page(0, 0), &settings);
        assert_eq!((p.page, p.limit, p.skip), (1, 10, 0));
    }

    #[test]
    fn pagination_offset_wins() {
        let spec = PaginationSpec {
            page: Some(9),
            limit: Some(10),
            offset: Some(25),
            cursor: Some("opaque".into()),
        };
        let p = ResolvedPagination::resolve(&spec, &GraphSettings::default());
        assert_eq!((p.page, p.skip), (3, 25));
        assert_eq!(p.cursor.as_deref(), Some("opaque"));
    }

    #[test]
    fn sort_spec_shapes_deserialize() {
        let text: SortSpec = serde_json::from_value(json!("price:desc")).unwrap();
        assert_eq!(text, SortSpec::Text("price:desc".into()));

        let records: SortSpec =
            serde_json::from_value(json!([{"field": "price", "direction": -1}, "name"])).unwrap();
        assert_eq!(
            records,
            SortSpec::List(vec![
                SortEntry::Record {
                    field: "price".into(),
                    order: Some(json!(-1))
                },
                SortEntry::Text("name".into()),
            ])
        );
    }

    #[test]
    fn select_and_expand_shapes_deserialize() {
        let map: SelectSpec = serde_json::from_value(json!({"name": 1, "password": 0})).unwrap();
        assert!(matches!(map, SelectSpec::Map(_)));

        let expand: ExpandSpec =
            serde_json::from_value(json!(["author", {"path": "tags", "fields": "label"}])).unwrap();
        assert_eq!(
            expand,
            ExpandSpec::List(vec![
                ExpandEntry::Text("author".into()),
                ExpandEntry::Record {
                    path: "tags".into(),
                    select: Some(SelectSpec::Text("label".into()))
                },
            ])
        );
    }

    #[test]
    fn full_text_search_accepts_alias() {
        let fts: FullTextSearch =
            serde_json::from_value(json!({"search": "rust", "sortByScore": true})).unwrap();
        assert_eq!(fts.search_text, "rust");
        assert!(fts.sort_by_score);
        assert!(!fts.case_sensitive);
    }
}
