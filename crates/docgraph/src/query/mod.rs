//! Declarative query engine.
//!
//! A [`QueryConfig`] describes what the caller wants: filters in the
//! `field_operator` convention, sort, pagination, field selection, relation
//! expansion and full-text search, each in whichever shape is convenient.
//! Normalization turns every section into one canonical form, the merge step
//! combines enforced defaults with user filters, and [`GraphService`] runs
//! the assembled query against the collection's store.

pub mod expand;
pub mod graph;
pub mod merge;
pub mod normalize;
pub mod operator;
pub mod search;
pub mod select;
pub mod sort;
pub mod types;

pub use expand::normalize_expand;
pub use graph::GraphService;
pub use merge::merge_filters;
pub use normalize::normalize;
pub use operator::{FilterOperator, KeyOperator, MappedFilters, Trust, map_filters, parse_key};
pub use search::{TEXT_SCORE_FIELD, compile_text};
pub use select::{normalize_select, split_fields};
pub use sort::normalize_sort;
pub use types::{
    DEFAULT_PAGE_SIZE, EntityRef, ExpandEntry, ExpandSpec, FullTextSearch, GraphSettings,
    MAX_PAGE_SIZE, Metadata, NormalizedQueryOptions, PaginationSpec, PopulateOption, QueryConfig,
    QueryEcho, ResolvedPagination, ResponseEnvelope, SelectSpec, SortEntry, SortField, SortSpec,
};
