//! HTTP route handlers.

pub mod collections;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// All routes, without middleware layers.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(collections::router())
}
