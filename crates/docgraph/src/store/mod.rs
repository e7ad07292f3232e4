//! Storage collaborators.
//!
//! The query engine never talks to a database directly; it hands a
//! [`FindQuery`] to a [`DocumentStore`] and reads back documents. Two
//! backends ship with the crate:
//! - [`MemoryStore`]: evaluates the native filter language over in-process JSON
//! - [`PgStore`]: one JSONB table per collection, SQL generated with SeaQuery

pub mod document;
pub mod memory;
pub mod populate;
pub mod postgres;
pub mod query;

use async_trait::async_trait;
use thiserror::Error;

use crate::registry::CollectionDef;

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use query::{
    DEFAULT_ID_FIELD, Document, FindQuery, PopulateClause, Projection, ProjectionFields, SortDirection,
    SortKey, Stage, TextQuery, is_operator_map,
};

/// Errors raised by a storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("unsupported by this store: {0}")]
    Unsupported(String),

    #[error("database error")]
    Database(#[from] sqlx::Error),
}

/// A document database the query engine can run against.
///
/// Implementations must be safe to share across concurrent requests; every
/// method takes `&self` and receives the collection definition it operates on.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Run a filter + sort + projection + population + skip/limit query.
    async fn find(
        &self,
        collection: &CollectionDef,
        query: &FindQuery,
    ) -> Result<Vec<Document>, StoreError>;

    /// Count documents matching `filter`.
    async fn count(&self, collection: &CollectionDef, filter: &Document)
    -> Result<u64, StoreError>;

    /// Run a raw aggregation pipeline and return its output unmodified.
    async fn aggregate(
        &self,
        collection: &CollectionDef,
        pipeline: &[Document],
    ) -> Result<Vec<Document>, StoreError>;
}
