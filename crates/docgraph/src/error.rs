//! Error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::store::StoreError;

/// Errors raised while normalizing or executing a query.
///
/// The malformed-input variants are recoverable: the offending clause is
/// dropped, the error is logged at `warn` and reported in
/// `metadata.warnings`. Resolution and storage failures abort the query.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("collection not found: {0}")]
    EntityNotFound(String),

    #[error("invalid collection reference: {0:?}")]
    InvalidEntityReference(String),

    #[error("malformed filter value for '{key}': {reason}")]
    MalformedFilterValue { key: String, reason: String },

    #[error("malformed sort direction '{direction}' for field '{field}'")]
    MalformedSortDirection { field: String, direction: String },

    #[error("malformed expansion '{entry}': {reason}")]
    MalformedExpansion { entry: String, reason: String },

    #[error("unknown relation '{path}' on collection '{collection}'")]
    UnknownRelation { collection: String, path: String },

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl QueryError {
    pub fn malformed_filter(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedFilterValue {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn malformed_expansion(entry: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedExpansion {
            entry: entry.into(),
            reason: reason.into(),
        }
    }

    /// Whether the query can continue after dropping the offending clause.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::MalformedFilterValue { .. }
                | Self::MalformedSortDirection { .. }
                | Self::MalformedExpansion { .. }
                | Self::UnknownRelation { .. }
        )
    }
}

/// HTTP-facing errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("{0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("database error")]
    Database(#[from] sqlx::Error),
}

impl From<QueryError> for AppError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::EntityNotFound(_) => AppError::NotFound(err.to_string()),
            QueryError::Storage(StoreError::Database(e)) => AppError::Database(e),
            other => AppError::BadRequest(other.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Internal details are logged, never returned
        let error = match &self {
            AppError::Internal(e) => {
                tracing::error!(error = %e, "internal server error");
                "internal server error".to_string()
            }
            AppError::Database(e) => {
                tracing::error!(error = %e, "database error");
                "internal server error".to_string()
            }
            _ => self.to_string(),
        };

        (status, Json(ErrorResponse { error })).into_response()
    }
}

/// Result type alias using AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_errors_map_to_statuses() {
        let not_found: AppError = QueryError::EntityNotFound("ghosts".into()).into();
        assert_eq!(not_found.into_response().status(), StatusCode::NOT_FOUND);

        let invalid: AppError = QueryError::InvalidEntityReference("a b".into()).into();
        assert_eq!(invalid.into_response().status(), StatusCode::BAD_REQUEST);

        let unsupported: AppError =
            QueryError::Storage(StoreError::Unsupported("$group".into())).into();
        assert_eq!(unsupported.into_response().status(), StatusCode::BAD_REQUEST);

        let db: AppError = QueryError::Storage(StoreError::Database(sqlx::Error::PoolTimedOut)).into();
        assert_eq!(db.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn recoverable_variants() {
        assert!(QueryError::malformed_filter("age_between", "needs two values").is_recoverable());
        assert!(!QueryError::EntityNotFound("x".into()).is_recoverable());
    }
}
