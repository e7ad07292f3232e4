//! Docgraph
//!
//! A declarative query layer over document stores. Requests describe
//! filters, sort, pagination, field selection, relation expansion and
//! full-text search in URL-friendly shapes; the engine normalizes them,
//! merges enforced default filters, runs the native query and returns the
//! page with pagination metadata.
//!
//! The main entry point for running the server is the `docgraph` binary.

pub mod adapter;
pub mod config;
pub mod db;
pub mod error;
pub mod query;
pub mod registry;
pub mod routes;
pub mod state;
pub mod store;

pub use error::{AppError, AppResult, QueryError};
pub use query::{GraphService, QueryConfig, ResponseEnvelope};
pub use registry::{CollectionDef, CollectionHandle, CollectionRegistry};
pub use store::{DocumentStore, MemoryStore, PgStore, StoreError};
