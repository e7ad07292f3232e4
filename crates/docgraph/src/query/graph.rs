//! Query orchestration.
//!
//! [`GraphService`] is the single entrypoint: it resolves the collection,
//! normalizes the config, assembles a [`FindQuery`] in a fixed order
//! (filter, text search, sort, projection, population, pagination), runs it
//! and wraps the result in a [`ResponseEnvelope`].

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;

use super::merge::merge_filters;
use super::normalize::normalize;
use super::operator::{Trust, map_filters};
use super::select::restrict_selection;
use super::search::{apply_score_projection, apply_score_sort, apply_text, compile_text};
use super::types::{
    EntityRef, GraphSettings, Metadata, NormalizedQueryOptions, QueryConfig, QueryEcho,
    ResponseEnvelope,
};
use crate::error::QueryError;
use crate::registry::{CollectionDef, CollectionRegistry, is_restricted_path};
use crate::store::{Document, FindQuery, PopulateClause, Projection, SortKey};

/// Executes declarative queries against registered collections.
///
/// Holds only shared, immutable state and can serve concurrent callers.
#[derive(Clone)]
pub struct GraphService {
    registry: Arc<CollectionRegistry>,
    settings: GraphSettings,
}

impl GraphService {
    pub fn new(registry: Arc<CollectionRegistry>) -> Self {
        Self {
            registry,
            settings: GraphSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: GraphSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn registry(&self) -> &Arc<CollectionRegistry> {
        &self.registry
    }

    pub fn settings(&self) -> &GraphSettings {
        &self.settings
    }

    /// Run a query and return one page of results with metadata.
    ///
    /// Unknown or malformed collection references and storage failures abort
    /// the call. Malformed clauses are dropped and listed in
    /// `metadata.warnings`.
    pub async fn execute(&self, config: QueryConfig) -> Result<ResponseEnvelope, QueryError> {
        let start = Instant::now();

        let handle = self.registry.resolve(&config.entity)?;
        let def = handle.def.as_ref();

        let mut options = normalize(&config, def, &self.settings);

        let mut filter = merge_filters(&options.default_filters, &options.filters);
        if let Some(fts) = &options.full_text_search
            && let Some(clause) = compile_text(fts)
            && let Err(dropped) = apply_text(&mut filter, clause)
        {
            options.diagnostics.push(dropped);
        }

        let sort = self.build_sort(&options);
        let populate = self.build_populate(def, &mut options);
        let projection = self.build_projection(def, &options);

        let (skip, limit) = match &options.pagination {
            Some(p) => (Some(p.skip), Some(p.limit)),
            None => (None, None),
        };

        for diagnostic in &options.diagnostics {
            tracing::warn!(collection = %def.name, error = %diagnostic, "dropped query clause");
        }

        let query = FindQuery {
            filter,
            sort,
            projection,
            populate,
            skip,
            limit,
        };
        tracing::debug!(collection = %def.name, query = ?query, "executing find");

        let data = handle.store.find(def, &query).await?;

        let total_count = match &options.pagination {
            Some(_) => handle.store.count(def, &query.filter).await?,
            None => data.len() as u64,
        };

        let mut metadata = match &options.pagination {
            Some(p) => {
                let mut m = Metadata::new(total_count, p.page, p.limit);
                m.cursor = p.cursor.clone();
                m
            }
            None => Metadata::new(total_count, 1, total_count),
        };
        metadata.query = echo(&options);
        metadata.warnings = options.diagnostics.iter().map(ToString::to_string).collect();
        metadata.execution_time_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        tracing::debug!(
            collection = %def.name,
            returned = data.len(),
            total = total_count,
            elapsed_ms = metadata.execution_time_ms,
            "query complete"
        );

        Ok(ResponseEnvelope { data, metadata })
    }

    /// Pass a raw aggregation pipeline through to the collection's store.
    pub async fn aggregate(
        &self,
        entity: impl Into<EntityRef>,
        pipeline: Vec<Document>,
    ) -> Result<Vec<Document>, QueryError> {
        let handle = self.registry.resolve(&entity.into())?;
        tracing::debug!(collection = %handle.name(), stages = pipeline.len(), "running pipeline");
        Ok(handle.store.aggregate(&handle.def, &pipeline).await?)
    }

    fn build_sort(&self, options: &NormalizedQueryOptions) -> Vec<SortKey> {
        let mut sort: Vec<SortKey> = options
            .sorting
            .iter()
            .map(|s| SortKey::field(s.field.clone(), s.direction))
            .collect();
        if options
            .full_text_search
            .as_ref()
            .is_some_and(|fts| fts.sort_by_score)
        {
            apply_score_sort(&mut sort);
        }
        sort
    }

    fn build_projection(&self, def: &CollectionDef, options: &NormalizedQueryOptions) -> Projection {
        let selection =
            restrict_selection(options.select_fields.clone(), &options.restricted_fields);
        let mut projection = Projection::from_selection(&selection, &def.id_field);
        for populate in &options.populate {
            projection.ensure_included(&populate.path);
        }
        if options
            .full_text_search
            .as_ref()
            .is_some_and(|fts| fts.sort_by_score)
        {
            apply_score_projection(&mut projection);
        }
        projection
    }

    /// Resolve expansions against the collection's declared relations.
    ///
    /// Restricted paths are skipped. Paths with no declared relation, or whose
    /// target collection is not registered, are dropped with a diagnostic.
    /// The target's restricted fields never appear in populated records, and
    /// its default filters hold for them as they do for direct queries.
    fn build_populate(
        &self,
        def: &CollectionDef,
        options: &mut NormalizedQueryOptions,
    ) -> Vec<PopulateClause> {
        let mut clauses = Vec::with_capacity(options.populate.len());
        for populate in &options.populate {
            if is_restricted_path(&populate.path, &options.restricted_fields) {
                tracing::warn!(
                    collection = %def.name,
                    path = %populate.path,
                    "restricted expansion skipped"
                );
                continue;
            }
            let relation = def.relations.get(&populate.path);
            let target = relation.and_then(|r| self.registry.get(&r.collection));
            let (Some(relation), Some(target)) = (relation, target) else {
                options.diagnostics.push(QueryError::UnknownRelation {
                    collection: def.name.clone(),
                    path: populate.path.clone(),
                });
                continue;
            };

            let selection = restrict_selection(
                populate.select.clone().unwrap_or_default(),
                &target.def.restricted_fields,
            );
            let defaults = map_filters(&target.def.default_filters, Trust::Trusted);
            options.diagnostics.extend(defaults.diagnostics);
            clauses.push(PopulateClause {
                path: populate.path.clone(),
                from: relation.collection.clone(),
                foreign_field: relation.foreign_field.clone(),
                filter: defaults.clauses,
                projection: Projection::from_selection(&selection, &target.def.id_field),
            });
        }
        options
            .populate
            .retain(|p| clauses.iter().any(|c| c.path == p.path));
        clauses
    }
}

fn echo(options: &NormalizedQueryOptions) -> QueryEcho {
    QueryEcho {
        filters: options.filters.clone(),
        sort: options
            .sorting
            .iter()
            .filter_map(|s| serde_json::to_value(s).ok())
            .collect(),
        fields: options.select_fields.clone(),
        expand: options
            .populate
            .iter()
            .filter_map(|p| serde_json::to_value(p).ok())
            .collect::<Vec<Value>>(),
        search: options
            .full_text_search
            .as_ref()
            .map(|fts| fts.search_text.trim().to_string()),
    }
}
