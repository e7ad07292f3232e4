//! Collection query API routes.
//!
//! REST endpoints for listing collections and running queries against them.

use std::collections::HashMap;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use crate::adapter::{QueryRequest, config_from_params};
use crate::error::{AppError, AppResult, QueryError};
use crate::query::{EntityRef, ResponseEnvelope};
use crate::registry::CollectionHandle;
use crate::state::AppState;
use crate::store::Document;

/// Create the collections router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/collections", get(list_collections))
        .route("/api/collections/{name}", get(query_collection))
        .route("/api/collections/{name}/query", post(query_collection_body))
        .route("/api/collections/{name}/aggregate", post(aggregate_collection))
}

// -------------------------------------------------------------------------
// Response types
// -------------------------------------------------------------------------

#[derive(Serialize)]
struct CollectionSummary {
    name: String,
    id_field: String,
    relations: Vec<String>,
    searchable: Vec<String>,
}

// -------------------------------------------------------------------------
// Handlers
// -------------------------------------------------------------------------

async fn list_collections(State(state): State<AppState>) -> Json<Vec<CollectionSummary>> {
    Json(
        state
            .registry()
            .definitions()
            .into_iter()
            .map(|def| CollectionSummary {
                name: def.name.clone(),
                id_field: def.id_field.clone(),
                relations: def.relations.keys().cloned().collect(),
                searchable: def.text_fields.clone(),
            })
            .collect(),
    )
}

async fn query_collection(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> AppResult<Json<ResponseEnvelope>> {
    let handle = resolve(&state, name)?;
    let config = config_from_params(handle.clone(), &params, &handle.def);
    let envelope = state.graph().execute(config).await?;
    Ok(Json(envelope))
}

async fn query_collection_body(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> AppResult<Json<ResponseEnvelope>> {
    let handle = resolve(&state, name)?;
    let Json(request) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let config = request.into_config(handle.clone(), &handle.def);
    let envelope = state.graph().execute(config).await?;
    Ok(Json(envelope))
}

async fn aggregate_collection(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Result<Json<Vec<Document>>, JsonRejection>,
) -> AppResult<Json<Vec<Document>>> {
    let handle = resolve(&state, name)?;
    let Json(pipeline) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let rows = state.graph().aggregate(handle, pipeline).await?;
    Ok(Json(rows))
}

/// Resolve the path segment once so the adapter can read the definition.
fn resolve(state: &AppState, name: String) -> Result<CollectionHandle, QueryError> {
    state.registry().resolve(&EntityRef::ByName(name))
}
